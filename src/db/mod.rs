use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::identity::{Identity, NewIdentity};

pub mod migrator;
pub mod repositories;

pub use repositories::identity::StoreError;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn identity_repo(&self) -> repositories::identity::IdentityRepository {
        repositories::identity::IdentityRepository::new(self.conn.clone())
    }

    fn reference_repo(&self) -> repositories::reference::ReferenceRepository {
        repositories::reference::ReferenceRepository::new(self.conn.clone())
    }

    pub async fn insert_identity(
        &self,
        new: NewIdentity,
        now: &str,
    ) -> Result<Identity, StoreError> {
        self.identity_repo().insert(new, now).await
    }

    pub async fn update_identity_profile(
        &self,
        identity: &Identity,
        now: &str,
    ) -> Result<Identity, StoreError> {
        self.identity_repo().update_profile(identity, now).await
    }

    pub async fn set_auth_key(&self, id: i32, auth_key: &str, now: &str) -> Result<bool> {
        self.identity_repo().set_auth_key(id, auth_key, now).await
    }

    pub async fn replace_reset_token(
        &self,
        id: i32,
        expected: Option<&str>,
        token: &str,
        now: &str,
    ) -> Result<bool> {
        self.identity_repo()
            .replace_reset_token(id, expected, token, now)
            .await
    }

    pub async fn consume_reset_token(
        &self,
        identity: &Identity,
        token: &str,
        now: &str,
    ) -> Result<bool> {
        self.identity_repo()
            .consume_reset_token(identity, token, now)
            .await
    }

    pub async fn find_identity_by_id(&self, id: i32) -> Result<Option<Identity>> {
        self.identity_repo().find_by_id(id).await
    }

    pub async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.identity_repo().find_by_email(email).await
    }

    pub async fn find_identity_by_auth_key(&self, auth_key: &str) -> Result<Option<Identity>> {
        self.identity_repo().find_by_auth_key(auth_key).await
    }

    pub async fn find_identity_by_reset_token(&self, token: &str) -> Result<Option<Identity>> {
        self.identity_repo().find_by_reset_token(token).await
    }

    pub async fn email_taken(&self, email: &str, except_id: Option<i32>) -> Result<bool> {
        self.identity_repo().email_taken(email, except_id).await
    }

    pub async fn role_list(&self) -> Result<BTreeMap<i32, String>> {
        self.reference_repo().role_list().await
    }

    pub async fn status_list(&self) -> Result<BTreeMap<i32, String>> {
        self.reference_repo().status_list().await
    }

    pub async fn role_name(&self, value: i32) -> Result<Option<String>> {
        self.reference_repo().role_name(value).await
    }

    pub async fn status_name(&self, value: i32) -> Result<Option<String>> {
        self.reference_repo().status_name(value).await
    }
}
