pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod identity;
pub mod security;
pub mod services;
pub mod validation;

use clap::Parser;
use tokio::signal;

use cli::{
    Cli, Commands, cmd_create_user, cmd_list_roles, cmd_list_statuses, cmd_reset_password,
    cmd_reset_token,
};
pub use config::Config;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Init)) {
        if Config::create_default_if_missing()? {
            println!("✓ Config file created. Edit config.toml and run again.");
        } else {
            println!("config.toml already exists.");
        }
        return Ok(());
    }

    let config = Config::load()?;
    config.validate()?;

    init_tracing(&config);

    match cli.command {
        None | Some(Commands::Serve) => run_server(config).await,
        Some(Commands::CreateUser(args)) => cmd_create_user(&config, args).await,
        Some(Commands::ResetToken { email }) => cmd_reset_token(&config, &email).await,
        Some(Commands::ResetPassword { token }) => cmd_reset_password(&config, &token).await,
        Some(Commands::Roles) => cmd_list_roles(&config).await,
        Some(Commands::Statuses) => cmd_list_statuses(&config).await,
        Some(Commands::Init) => Ok(()),
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.general.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    if !config.server.enabled {
        warn!("Server is disabled in config.toml ([server] enabled = false)");
        return Ok(());
    }

    let port = config.server.port;
    let state = api::create_app_state_from_config(config).await?;
    state.store().ping().await?;

    let app = api::router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web Server running at http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}
