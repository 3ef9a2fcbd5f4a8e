//! Service-level tests for the credential lifecycle against a real SQLite file.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::ConnectionTrait;
use silor::config::Config;
use silor::db::Store;
use silor::security::{Argon2Security, CredentialSecurity, MockClock};
use silor::services::{IdentityError, IdentityService, SeaOrmIdentityService};
use silor::validation::IdentityAttributes;

const START: i64 = 1_700_000_000;

const HASH_DELAY: Duration = Duration::from_millis(400);

fn test_config() -> Config {
    let mut config = Config::default();
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config
}

/// Hashing that takes long enough for other requests to interleave.
struct SlowSecurity {
    inner: Argon2Security,
    delay: Duration,
}

impl CredentialSecurity for SlowSecurity {
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        std::thread::sleep(self.delay);
        self.inner.hash_password(password)
    }

    fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        self.inner.verify_password(password, password_hash)
    }

    fn random_string(&self, length: usize) -> String {
        self.inner.random_string(length)
    }
}

async fn setup_with(
    security: impl FnOnce(&Config) -> Arc<dyn CredentialSecurity>,
) -> (SeaOrmIdentityService, MockClock, Store) {
    let db_path =
        std::env::temp_dir().join(format!("silor-identity-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = test_config();
    config.general.database_path = format!("sqlite:{}", db_path.display());

    let store = Store::new(&config.general.database_path)
        .await
        .expect("failed to open store");
    let clock = MockClock::new(START);

    let service = SeaOrmIdentityService::new(
        store.clone(),
        security(&config),
        Arc::new(clock.clone()),
        &config,
    );
    (service, clock, store)
}

fn seeded_security(config: &Config) -> Arc<dyn CredentialSecurity> {
    Arc::new(Argon2Security::seeded(&config.security, 7).expect("bad argon2 params"))
}

fn slow_security(config: &Config) -> Arc<dyn CredentialSecurity> {
    Arc::new(SlowSecurity {
        inner: Argon2Security::seeded(&config.security, 7).expect("bad argon2 params"),
        delay: HASH_DELAY,
    })
}

async fn setup() -> (SeaOrmIdentityService, MockClock) {
    let (service, clock, _) = setup_with(seeded_security).await;
    (service, clock)
}

async fn setup_slow() -> (SeaOrmIdentityService, MockClock) {
    let (service, clock, _) = setup_with(slow_security).await;
    (service, clock)
}

fn maria() -> IdentityAttributes {
    IdentityAttributes {
        full_name: "Maria Lopez".to_string(),
        national_id: "12345678".to_string(),
        phone: "555-0100".to_string(),
        email: "maria@example.com".to_string(),
        ..Default::default()
    }
}

fn validation_errors(err: IdentityError) -> silor::validation::ValidationErrors {
    match err {
        IdentityError::Validation(errors) => errors,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_derives_initial_password() {
    let (service, _) = setup().await;

    let identity = service.create_identity(maria()).await.unwrap();
    assert!(identity.id > 0);
    assert_eq!(identity.role_id, 10);
    assert_eq!(identity.status_id, 10);
    assert_eq!(identity.auth_key.len(), 32);
    assert!(identity.password_hash.starts_with("$argon2id$"));
    assert!(identity.password_reset_token.is_none());

    let login = service
        .login("maria@example.com", "M12345678Z")
        .await
        .unwrap();
    assert_eq!(login.id, identity.id);

    let err = service
        .login("maria@example.com", "m12345678z")
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::InvalidCredentials));
}

#[tokio::test]
async fn test_create_with_explicit_password() {
    let (service, _) = setup().await;

    let mut attributes = maria();
    attributes.password = Some("correct horse".to_string());
    service.create_identity(attributes).await.unwrap();

    assert!(service.login("maria@example.com", "correct horse").await.is_ok());
    assert!(service.login("maria@example.com", "M12345678Z").await.is_err());
}

#[tokio::test]
async fn test_create_trims_input() {
    let (service, _) = setup().await;

    let mut attributes = maria();
    attributes.full_name = "  Maria Lopez ".to_string();
    attributes.email = " maria@example.com ".to_string();
    let identity = service.create_identity(attributes).await.unwrap();

    assert_eq!(identity.full_name, "Maria Lopez");
    assert_eq!(identity.email, "maria@example.com");
    assert!(service.login("maria@example.com", "M12345678Z").await.is_ok());
}

#[tokio::test]
async fn test_create_collects_every_field_error() {
    let (service, _) = setup().await;

    let attributes = IdentityAttributes {
        full_name: String::new(),
        national_id: "X".repeat(36),
        phone: String::new(),
        email: "not-an-email".to_string(),
        role_id: Some(99),
        ..Default::default()
    };

    let errors = validation_errors(service.create_identity(attributes).await.unwrap_err());
    assert_eq!(errors.get("full_name"), ["Full name cannot be blank."]);
    assert_eq!(
        errors.get("national_id"),
        ["National ID should contain at most 35 characters."]
    );
    assert_eq!(errors.get("phone"), ["Phone cannot be blank."]);
    assert_eq!(errors.get("email"), ["Email is not a valid email address."]);
    assert_eq!(errors.get("role_id"), ["Role is invalid."]);
    assert!(!errors.has("status_id"));
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let (service, _) = setup().await;
    service.create_identity(maria()).await.unwrap();

    let mut other = maria();
    other.full_name = "Mario Lopez".to_string();
    let errors = validation_errors(service.create_identity(other).await.unwrap_err());

    assert_eq!(
        errors.get("email"),
        ["Email \"maria@example.com\" has already been taken."]
    );
}

#[tokio::test]
async fn test_concurrent_duplicate_email_has_one_winner() {
    let (service, _) = setup().await;

    let (first, second) = tokio::join!(
        service.create_identity(maria()),
        service.create_identity(maria())
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(validation_errors(err).has("email"));
}

#[tokio::test]
async fn test_inactive_identity_lookups() {
    let (service, _) = setup().await;

    let mut attributes = maria();
    attributes.status_id = Some(0);
    let identity = service.create_identity(attributes).await.unwrap();

    assert!(service.find_by_id(identity.id).await.unwrap().is_none());
    assert!(
        service
            .find_by_email("maria@example.com")
            .await
            .unwrap()
            .is_none()
    );

    // Auth keys resolve whatever the status
    let found = service
        .find_by_access_token(&identity.auth_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, identity.id);

    let err = service
        .login("maria@example.com", "M12345678Z")
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::InvalidCredentials));
}

#[tokio::test]
async fn test_access_token_lookup() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    assert!(service.find_by_access_token("").await.unwrap().is_none());
    assert!(
        service
            .find_by_access_token("no-such-key")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        service
            .find_by_access_token(&identity.auth_key)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_login_rotates_auth_key() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let login = service
        .login("maria@example.com", "M12345678Z")
        .await
        .unwrap();
    assert_ne!(login.auth_key, identity.auth_key);

    assert!(
        service
            .find_by_access_token(&identity.auth_key)
            .await
            .unwrap()
            .is_none()
    );
    let found = service
        .find_by_access_token(&login.auth_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, identity.id);
}

#[tokio::test]
async fn test_update_keeps_password_hash() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let mut attributes = maria();
    attributes.full_name = "Ana Ruiz".to_string();
    attributes.national_id = "87654321".to_string();
    attributes.password = Some("ignored on update".to_string());
    attributes.role_id = Some(20);

    let updated = service
        .update_identity(identity.id, attributes)
        .await
        .unwrap();
    assert_eq!(updated.full_name, "Ana Ruiz");
    assert_eq!(updated.role_id, 20);
    assert_eq!(updated.password_hash, identity.password_hash);
    assert_eq!(updated.created_at, identity.created_at);

    assert!(service.login("maria@example.com", "M12345678Z").await.is_ok());
    assert!(service.login("maria@example.com", "A87654321Z").await.is_err());
}

#[tokio::test]
async fn test_update_allows_own_email_but_not_anothers() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let mut other = maria();
    other.email = "ana@example.com".to_string();
    service.create_identity(other).await.unwrap();

    assert!(service.update_identity(identity.id, maria()).await.is_ok());

    let mut taken = maria();
    taken.email = "ana@example.com".to_string();
    let errors = validation_errors(
        service
            .update_identity(identity.id, taken)
            .await
            .unwrap_err(),
    );
    assert!(errors.has("email"));
}

#[tokio::test]
async fn test_update_missing_identity() {
    let (service, _) = setup().await;
    let err = service.update_identity(404, maria()).await.unwrap_err();
    assert!(matches!(err, IdentityError::NotFound));
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (service, clock) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let issued = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();
    assert!(issued.token.ends_with(&format!("_{START}")));
    assert_eq!(issued.expires_at, START + 3600);
    assert!(service.is_password_reset_token_valid(&issued.token));

    clock.advance(60);
    let found = service
        .find_by_password_reset_token(&issued.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, identity.id);

    let updated = service
        .reset_password(&issued.token, "brand new secret")
        .await
        .unwrap();
    assert!(updated.password_reset_token.is_none());
    assert_eq!(updated.auth_key, identity.auth_key);

    assert!(
        service
            .login("maria@example.com", "brand new secret")
            .await
            .is_ok()
    );
    assert!(service.login("maria@example.com", "M12345678Z").await.is_err());

    // Tokens are single use
    let err = service
        .reset_password(&issued.token, "another secret")
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::InvalidResetToken));
}

#[tokio::test]
async fn test_concurrent_resets_consume_token_once() {
    let (service, _) = setup_slow().await;
    let identity = service.create_identity(maria()).await.unwrap();
    let issued = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        service.reset_password(&issued.token, "first secret"),
        service.reset_password(&issued.token, "second secret")
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(err, IdentityError::InvalidResetToken));

    let first_ok = service
        .login("maria@example.com", "first secret")
        .await
        .is_ok();
    let second_ok = service
        .login("maria@example.com", "second secret")
        .await
        .is_ok();
    assert!(first_ok ^ second_ok);
}

#[tokio::test]
async fn test_reset_does_not_undo_concurrent_deactivation() {
    let (service, _) = setup_slow().await;
    let identity = service.create_identity(maria()).await.unwrap();
    let issued = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();

    let mut deactivate = maria();
    deactivate.status_id = Some(0);
    deactivate.role_id = Some(20);

    // The update lands while the new password is still being hashed
    let (reset, update) = tokio::join!(
        service.reset_password(&issued.token, "brand new secret"),
        async {
            tokio::time::sleep(HASH_DELAY / 4).await;
            service.update_identity(identity.id, deactivate).await
        }
    );
    let reset = reset.unwrap();
    update.unwrap();

    assert_eq!(reset.status_id, 0);
    assert!(reset.password_reset_token.is_none());

    let stored = service
        .find_by_access_token(&identity.auth_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status_id, 0);
    assert_eq!(stored.role_id, 20);
    assert_ne!(stored.password_hash, identity.password_hash);
}

#[tokio::test]
async fn test_update_does_not_touch_credentials() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();
    let issued = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();
    let auth_key = service.regenerate_auth_key(identity.id).await.unwrap();

    let mut attributes = maria();
    attributes.phone = "555-0199".to_string();
    let updated = service
        .update_identity(identity.id, attributes)
        .await
        .unwrap();

    assert_eq!(updated.phone, "555-0199");
    assert_eq!(updated.auth_key, auth_key);
    assert_eq!(
        updated.password_reset_token.as_deref(),
        Some(issued.token.as_str())
    );
    assert_eq!(updated.password_hash, identity.password_hash);
}

#[tokio::test]
async fn test_regenerate_auth_key_keeps_profile() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let mut attributes = maria();
    attributes.status_id = Some(0);
    service
        .update_identity(identity.id, attributes)
        .await
        .unwrap();

    let key = service.regenerate_auth_key(identity.id).await.unwrap();
    let stored = service
        .find_by_access_token(&key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status_id, 0);
}

#[tokio::test]
async fn test_password_reset_token_expiry() {
    let (service, clock) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let issued = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();

    clock.advance(3600);
    assert!(
        service
            .find_by_password_reset_token(&issued.token)
            .await
            .unwrap()
            .is_some()
    );

    clock.advance(1);
    assert!(!service.is_password_reset_token_valid(&issued.token));
    assert!(
        service
            .find_by_password_reset_token(&issued.token)
            .await
            .unwrap()
            .is_none()
    );

    // The row still holds the expired token
    let stored = service.find_by_id(identity.id).await.unwrap().unwrap();
    assert_eq!(stored.password_reset_token.as_deref(), Some(issued.token.as_str()));

    let err = service
        .reset_password(&issued.token, "brand new secret")
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::InvalidResetToken));

    // An expired token is replaced on the next request
    let reissued = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();
    assert_ne!(reissued.token, issued.token);
    assert_eq!(reissued.expires_at, START + 3601 + 3600);
}

#[tokio::test]
async fn test_pending_reset_token_is_reused() {
    let (service, clock) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let first = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();
    clock.advance(120);
    let second = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();

    assert_eq!(first.token, second.token);
    assert_eq!(first.expires_at, second.expires_at);
}

#[tokio::test]
async fn test_reset_password_rejects_short_password() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();
    let issued = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap();

    let errors = validation_errors(
        service
            .reset_password(&issued.token, "abc")
            .await
            .unwrap_err(),
    );
    assert_eq!(
        errors.get("password"),
        ["Password should contain at least 6 characters."]
    );

    // The token survives a rejected attempt
    assert!(
        service
            .find_by_password_reset_token(&issued.token)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_malformed_reset_tokens() {
    let (service, _) = setup().await;

    for token in ["", "no-separator", "abc_", "abc_12x", "abc_99999999999999999999999"] {
        assert!(!service.is_password_reset_token_valid(token), "{token}");
        assert!(
            service
                .find_by_password_reset_token(token)
                .await
                .unwrap()
                .is_none()
        );
    }
}

#[tokio::test]
async fn test_reset_token_for_inactive_identity() {
    let (service, _) = setup().await;

    let mut attributes = maria();
    attributes.status_id = Some(0);
    let identity = service.create_identity(attributes).await.unwrap();

    let err = service
        .generate_password_reset_token(identity.id)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::NotFound));
}

#[tokio::test]
async fn test_regenerate_auth_key() {
    let (service, _) = setup().await;
    let identity = service.create_identity(maria()).await.unwrap();

    let key = service.regenerate_auth_key(identity.id).await.unwrap();
    assert_ne!(key, identity.auth_key);
    assert_eq!(key.len(), 32);

    let err = service.regenerate_auth_key(404).await.unwrap_err();
    assert!(matches!(err, IdentityError::NotFound));
}

#[tokio::test]
async fn test_reference_lists_and_names() {
    let (service, _) = setup().await;

    let roles = service.role_list().await.unwrap();
    assert_eq!(roles.get(&10).map(String::as_str), Some("User"));
    assert_eq!(roles.get(&20).map(String::as_str), Some("Administrator"));

    let statuses = service.status_list().await.unwrap();
    assert_eq!(statuses.get(&0).map(String::as_str), Some("Inactive"));
    assert_eq!(statuses.get(&10).map(String::as_str), Some("Active"));

    let identity = service.create_identity(maria()).await.unwrap();
    let info = service.describe(&identity).await.unwrap();
    assert_eq!(info.role_name, "User");
    assert_eq!(info.status_name, "Active");
}

#[tokio::test]
async fn test_missing_reference_rows_fall_back() {
    let (service, _, store) = setup_with(seeded_security).await;

    let mut attributes = maria();
    attributes.role_id = Some(20);
    let identity = service.create_identity(attributes).await.unwrap();

    store
        .conn
        .execute_unprepared("DELETE FROM roles WHERE role_value = 20")
        .await
        .unwrap();
    store
        .conn
        .execute_unprepared("DELETE FROM statuses WHERE status_value = 10")
        .await
        .unwrap();

    let stored = service
        .find_by_access_token(&identity.auth_key)
        .await
        .unwrap()
        .unwrap();
    let info = service.describe(&stored).await.unwrap();
    assert_eq!(info.role_id, 20);
    assert_eq!(info.role_name, "- no role -");
    assert_eq!(info.status_name, "- no status -");
}
