//! Create user command handler

use crate::cli::CreateUserArgs;
use crate::config::Config;
use crate::services::{IdentityError, IdentityService};
use crate::validation::IdentityAttributes;

use super::{identity_service, print_field_errors, read_password};

pub async fn cmd_create_user(config: &Config, args: CreateUserArgs) -> anyhow::Result<()> {
    let service = identity_service(config).await?;
    let password = if args.set_password {
        Some(read_password("Password")?)
    } else {
        None
    };
    let derived = password.is_none();

    let attributes = IdentityAttributes {
        full_name: args.full_name,
        national_id: args.national_id,
        phone: args.phone,
        email: args.email,
        password,
        role_id: args.role,
        status_id: args.status,
    };

    match service.create_identity(attributes).await {
        Ok(identity) => {
            let info = service.describe(&identity).await?;
            println!("Created identity #{} <{}>", info.id, info.email);
            println!("  Role: {} | Status: {}", info.role_name, info.status_name);
            if derived {
                println!("  Initial password derived from full name and national ID.");
            }
            Ok(())
        }
        Err(err @ IdentityError::Validation(_)) => {
            println!("Could not create identity:");
            print_field_errors(&err);
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
