//! Password reset command handlers

use crate::config::Config;
use crate::services::{IdentityError, IdentityService};

use super::{identity_service, print_field_errors, read_password};

pub async fn cmd_reset_token(config: &Config, email: &str) -> anyhow::Result<()> {
    let service = identity_service(config).await?;

    let Some(identity) = service.find_by_email(email).await? else {
        println!("No active identity with email {email}");
        return Ok(());
    };

    let issued = service.generate_password_reset_token(identity.id).await?;
    let expires = chrono::DateTime::from_timestamp(issued.expires_at, 0)
        .map_or_else(|| issued.expires_at.to_string(), |t| t.to_rfc3339());

    println!("Reset token for {email}:");
    println!("  {}", issued.token);
    println!("  Expires: {expires}");
    Ok(())
}

pub async fn cmd_reset_password(config: &Config, token: &str) -> anyhow::Result<()> {
    let password = read_password("New password")?;
    let service = identity_service(config).await?;

    match service.reset_password(token, &password).await {
        Ok(identity) => {
            println!("Password updated for {}", identity.email);
            Ok(())
        }
        Err(err @ IdentityError::Validation(_)) => {
            println!("Password rejected:");
            print_field_errors(&err);
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
