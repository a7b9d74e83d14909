//! Vault configuration.

use crate::crypto::keyring::UserKeyParameters;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_ITERATIONS: u32 = 1_000;
pub const MIN_ITEM_ENCRYPTION_KEY_BITS: usize = 1024;

/// Tunables for key derivation and key generation.
///
/// `authentication_iterations` must be the same on every device of an
/// account, otherwise token requests from the other devices are refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// PBKDF2 iterations for new master key derivation information
    pub key_derivation_iterations: u32,
    /// PBKDF2 iterations for the client-side authentication hash
    pub authentication_iterations: u32,
    /// PBKDF2 iterations for the stored, salted authentication hash
    pub server_authentication_iterations: u32,
    /// RSA modulus size for new item encryption key pairs
    pub item_encryption_key_bits: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key_derivation_iterations: 100_000,
            authentication_iterations: 100_000,
            server_authentication_iterations: 10_000,
            item_encryption_key_bits: crate::crypto::asymmetric::DEFAULT_KEY_BITS,
        }
    }
}

impl VaultConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("key_derivation_iterations", self.key_derivation_iterations),
            ("authentication_iterations", self.authentication_iterations),
            (
                "server_authentication_iterations",
                self.server_authentication_iterations,
            ),
        ] {
            if value < MIN_ITERATIONS {
                return Err(Error::Config(format!(
                    "{} must be at least {}, got {}",
                    name, MIN_ITERATIONS, value
                )));
            }
        }
        if self.item_encryption_key_bits < MIN_ITEM_ENCRYPTION_KEY_BITS {
            return Err(Error::Config(format!(
                "item_encryption_key_bits must be at least {}, got {}",
                MIN_ITEM_ENCRYPTION_KEY_BITS, self.item_encryption_key_bits
            )));
        }
        Ok(())
    }

    pub fn key_parameters(&self) -> UserKeyParameters {
        UserKeyParameters {
            key_derivation_iterations: self.key_derivation_iterations,
            authentication_iterations: self.authentication_iterations,
            server_authentication_iterations: self.server_authentication_iterations,
            item_encryption_key_bits: self.item_encryption_key_bits,
        }
    }
}
