//! Author identity hashing
//!
//! Author ids are stored only as salted SHA-256 digests. In ephemeral mode the
//! salt is drawn at random for each run and never persisted, so hashes cannot
//! be linked across runs. Longitudinal mode uses a configured fixed salt.

use crate::config::{PrivacyConfig, PrivacyMode};
use crate::ConfigError;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// One-way hasher for author identifiers
#[derive(Clone)]
pub struct AuthorHasher {
    salt: Vec<u8>,
}

impl AuthorHasher {
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.as_bytes().to_vec(),
        }
    }

    /// Returns the hex digest of `identifier`, or None for an empty id
    pub fn hash(&self, identifier: &str) -> Option<String> {
        if identifier.is_empty() {
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(&self.salt);
        hasher.update([0u8]);
        hasher.update(identifier.as_bytes());
        Some(hex::encode(hasher.finalize()))
    }
}

impl std::fmt::Debug for AuthorHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorHasher").finish_non_exhaustive()
    }
}

/// Builds the hasher for the configured privacy mode
pub fn build_hasher(config: &PrivacyConfig) -> Result<AuthorHasher, ConfigError> {
    match config.mode {
        PrivacyMode::Ephemeral => {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            Ok(AuthorHasher::new(&hex::encode(bytes)))
        }
        PrivacyMode::Longitudinal => match config.fixed_salt.as_deref() {
            Some(salt) if !salt.is_empty() => Ok(AuthorHasher::new(salt)),
            _ => Err(ConfigError::Validation(
                "privacy.fixed_salt must be provided when privacy.mode = \"longitudinal\""
                    .to_string(),
            )),
        },
    }
}
