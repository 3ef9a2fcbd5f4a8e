use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::db::Store;
use crate::services::{IdentityService, SeaOrmIdentityService};

pub mod auth;
mod error;
mod observability;
mod types;
mod users;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub identity_service: Arc<dyn IdentityService>,
}

impl AppState {
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let identity_service = Arc::new(SeaOrmIdentityService::from_config(store.clone(), &config)?);

    Ok(create_app_state(config, store, identity_service))
}

#[must_use]
pub fn create_app_state(
    config: Config,
    store: Store,
    identity_service: Arc<dyn IdentityService>,
) -> Arc<AppState> {
    Arc::new(AppState {
        config,
        store,
        identity_service,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = state.config.server.clone();

    let protected_routes = create_protected_router(state.clone());

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            server.session_inactivity_minutes,
        )));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/auth/password-reset/confirm",
            post(auth::confirm_password_reset),
        )
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if server.cors_allowed_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_routes = Router::new()
        .route("/users", post(users::create_user))
        .route("/users/{id}", get(users::get_user).put(users::update_user))
        .route(
            "/users/{id}/password-reset",
            post(users::issue_password_reset),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_middleware,
        ));

    Router::new()
        .route("/auth/me", get(auth::get_current_identity))
        .route(
            "/auth/auth-key/regenerate",
            post(auth::regenerate_auth_key),
        )
        .route("/roles", get(users::list_roles))
        .route("/statuses", get(users::list_statuses))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
