mod reference;
mod reset;
mod user;

pub use reference::{cmd_list_roles, cmd_list_statuses};
pub use reset::{cmd_reset_password, cmd_reset_token};
pub use user::cmd_create_user;

use anyhow::Context;
use std::io::{BufRead, Write};

use crate::config::Config;
use crate::db::Store;
use crate::services::SeaOrmIdentityService;

async fn identity_service(config: &Config) -> anyhow::Result<SeaOrmIdentityService> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;
    SeaOrmIdentityService::from_config(store, config)
}

fn print_field_errors(err: &crate::services::IdentityError) {
    if let crate::services::IdentityError::Validation(errors) = err {
        for field in errors.fields() {
            for message in errors.get(field) {
                println!("  {field}: {message}");
            }
        }
    }
}

pub const PASSWORD_ENV: &str = "SILOR_PASSWORD";

/// Password from `SILOR_PASSWORD`, or one line read from stdin.
fn read_password(prompt: &str) -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    eprint!("{prompt}: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
