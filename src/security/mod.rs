//! Hashing and randomness used by the credential lifecycle.
//!
//! Everything that needs a password hash or a random token goes through
//! [`CredentialSecurity`] so callers can swap in a seeded generator for tests.

mod clock;

pub use clock::{Clock, MockClock, SystemClock};

use anyhow::Result;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use std::sync::{Mutex, PoisonError};
use subtle::ConstantTimeEq;

use crate::config::SecurityConfig;

/// URL-safe alphabet, same character set as a base64url encoded string.
const RANDOM_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const SALT_LEN: usize = 16;

/// Password hashing and random string generation.
pub trait CredentialSecurity: Send + Sync {
    /// Hashes `password` with a fresh salt and returns the PHC string.
    fn hash_password(&self, password: &str) -> Result<String>;

    /// Returns false on mismatch and on a hash that cannot be parsed.
    fn verify_password(&self, password: &str, password_hash: &str) -> bool;

    /// Cryptographically random string of `length` URL-safe characters.
    fn random_string(&self, length: usize) -> String;
}

enum RngSource {
    Thread,
    Seeded(Mutex<StdRng>),
}

/// Argon2id hashing backed by the thread-local CSPRNG, or by a seeded
/// generator when built with [`Argon2Security::seeded`].
pub struct Argon2Security {
    params: Params,
    rng: RngSource,
}

impl Argon2Security {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        Ok(Self {
            params: params_from_config(config)?,
            rng: RngSource::Thread,
        })
    }

    /// Deterministic random strings and salts, for tests only.
    pub fn seeded(config: &SecurityConfig, seed: u64) -> Result<Self> {
        Ok(Self {
            params: params_from_config(config)?,
            rng: RngSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
        })
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        match &self.rng {
            RngSource::Thread => f(&mut rand::rng()),
            RngSource::Seeded(rng) => {
                let mut guard = rng.lock().unwrap_or_else(PoisonError::into_inner);
                f(&mut *guard)
            }
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl CredentialSecurity for Argon2Security {
    fn hash_password(&self, password: &str) -> Result<String> {
        let salt_bytes = self.with_rng(|rng| {
            let mut bytes = [0u8; SALT_LEN];
            rng.fill_bytes(&mut bytes);
            bytes
        });
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to encode salt: {e}"))?;

        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(password_hash) else {
            return false;
        };

        // Params are read from the PHC string, so hashes made with older costs still verify.
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn random_string(&self, length: usize) -> String {
        self.with_rng(|rng| {
            (0..length)
                .map(|_| char::from(RANDOM_ALPHABET[rng.random_range(0..RANDOM_ALPHABET.len())]))
                .collect()
        })
    }
}

fn params_from_config(config: &SecurityConfig) -> Result<Params> {
    Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))
}

/// Compares two secrets without short-circuiting on the first differing byte.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
pub(crate) fn test_security(seed: u64) -> Argon2Security {
    let config = SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        ..SecurityConfig::default()
    };
    Argon2Security::seeded(&config, seed).expect("valid test params")
}
