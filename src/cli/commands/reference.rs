//! Role and status listing

use crate::config::Config;
use crate::services::IdentityService;

use super::identity_service;

pub async fn cmd_list_roles(config: &Config) -> anyhow::Result<()> {
    let service = identity_service(config).await?;

    println!("Roles");
    println!("{:-<30}", "");
    for (value, name) in service.role_list().await? {
        println!("{value:>5}  {name}");
    }
    Ok(())
}

pub async fn cmd_list_statuses(config: &Config) -> anyhow::Result<()> {
    let service = identity_service(config).await?;

    println!("Statuses");
    println!("{:-<30}", "");
    for (value, name) in service.status_list().await? {
        println!("{value:>5}  {name}");
    }
    Ok(())
}
