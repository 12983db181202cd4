//! Engine configuration.
//!
//! Parsed from TOML by the enclosing service and handed to the engine at
//! construction. There are no process-wide singletons: the secret, the TTL,
//! and the policy toggles all live here. Rotating the signing secret is an
//! administrative act that requires constructing a new engine; claims signed
//! with the old secret stop verifying at that point.

use std::path::Path;

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Default claim TTL: 30 minutes.
const DEFAULT_CLAIM_TTL_SECS: i64 = 30 * 60;

/// Default opaque code identifier width in bits.
const DEFAULT_CODE_LENGTH_BITS: u32 = 128;

/// Minimum entropy accepted for the signing secret, in bits.
const MIN_SECRET_BITS: usize = 128;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML was invalid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The signing secret is missing or not valid hex.
    #[error("signing_secret must be a hex string")]
    InvalidSecretEncoding,

    /// The signing secret carries too little entropy.
    #[error("signing_secret has {bits} bits of entropy; at least {MIN_SECRET_BITS} required")]
    WeakSecret {
        /// Bits supplied.
        bits: usize,
    },

    /// The code length is outside the supported range.
    #[error("code_length_bits must be a multiple of 8 between 64 and 256, got {bits}")]
    InvalidCodeLength {
        /// Bits requested.
        bits: u32,
    },

    /// The claim TTL is not positive.
    #[error("claim_ttl_secs must be positive, got {secs}")]
    InvalidTtl {
        /// Seconds requested.
        secs: i64,
    },
}

/// Tie-break policy when an employee is eligible for more than one benefit
/// type in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Prefer the benefit the cycle marks as primary; fall back to the
    /// lowest benefit id when the cycle names none.
    #[default]
    CyclePrimary,
    /// Always pick the lowest benefit id.
    LowestId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEngineConfig {
    signing_secret: String,
    #[serde(default = "default_ttl_secs")]
    claim_ttl_secs: i64,
    #[serde(default = "default_true")]
    cycle_active_window_check: bool,
    #[serde(default = "default_code_bits")]
    code_length_bits: u32,
    #[serde(default = "default_true")]
    auto_pick_box_on_validate: bool,
    #[serde(default)]
    benefit_tie_break: TieBreak,
    #[serde(default)]
    reprint_rotates_code: bool,
}

fn default_ttl_secs() -> i64 {
    DEFAULT_CLAIM_TTL_SECS
}

fn default_true() -> bool {
    true
}

fn default_code_bits() -> u32 {
    DEFAULT_CODE_LENGTH_BITS
}

/// Validated engine configuration.
///
/// The secret is held as a [`SecretString`] and is neither logged nor
/// serialised back out.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    signing_secret: SecretString,
    claim_ttl_secs: i64,
    /// Whether issuance checks that the cycle window contains today.
    pub cycle_active_window_check: bool,
    /// Width of the opaque code identifier.
    pub code_length_bits: u32,
    /// Whether validation picks the first free box when none is scanned.
    pub auto_pick_box_on_validate: bool,
    /// Benefit selection policy for multi-eligible employees.
    pub benefit_tie_break: TieBreak,
    /// Whether a reprint rotates the opaque code identifier.
    pub reprint_rotates_code: bool,
}

impl EngineConfig {
    /// Builds a configuration from an already-decoded secret and defaults
    /// everywhere else. Intended for tests and embedding services that do
    /// not go through TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WeakSecret`] if the secret is shorter than
    /// 128 bits.
    pub fn with_secret(secret: &[u8]) -> Result<Self, ConfigError> {
        let bits = secret.len() * 8;
        if bits < MIN_SECRET_BITS {
            return Err(ConfigError::WeakSecret { bits });
        }
        Ok(Self {
            signing_secret: SecretString::new(hex::encode(secret)),
            claim_ttl_secs: DEFAULT_CLAIM_TTL_SECS,
            cycle_active_window_check: true,
            code_length_bits: DEFAULT_CODE_LENGTH_BITS,
            auto_pick_box_on_validate: true,
            benefit_tie_break: TieBreak::default(),
            reprint_rotates_code: false,
        })
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, the secret is not hex or
    /// carries fewer than 128 bits, the code length is unsupported, or the
    /// TTL is not positive.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawEngineConfig = toml::from_str(content)?;

        let secret_bytes =
            hex::decode(raw.signing_secret.trim()).map_err(|_| ConfigError::InvalidSecretEncoding)?;
        let bits = secret_bytes.len() * 8;
        if bits < MIN_SECRET_BITS {
            return Err(ConfigError::WeakSecret { bits });
        }
        if raw.code_length_bits < 64 || raw.code_length_bits > 256 || raw.code_length_bits % 8 != 0
        {
            return Err(ConfigError::InvalidCodeLength {
                bits: raw.code_length_bits,
            });
        }
        if raw.claim_ttl_secs <= 0 {
            return Err(ConfigError::InvalidTtl {
                secs: raw.claim_ttl_secs,
            });
        }

        Ok(Self {
            signing_secret: SecretString::new(raw.signing_secret.trim().to_string()),
            claim_ttl_secs: raw.claim_ttl_secs,
            cycle_active_window_check: raw.cycle_active_window_check,
            code_length_bits: raw.code_length_bits,
            auto_pick_box_on_validate: raw.auto_pick_box_on_validate,
            benefit_tie_break: raw.benefit_tie_break,
            reprint_rotates_code: raw.reprint_rotates_code,
        })
    }

    /// The configured claim TTL.
    #[must_use]
    pub fn claim_ttl(&self) -> Duration {
        Duration::seconds(self.claim_ttl_secs)
    }

    /// Decoded secret bytes for keying the signer.
    #[must_use]
    pub(crate) fn secret_bytes(&self) -> Vec<u8> {
        // Validated at construction; a decode failure here is unreachable.
        hex::decode(self.signing_secret.expose_secret()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_HEX: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config =
            EngineConfig::from_toml(&format!("signing_secret = \"{SECRET_HEX}\"")).unwrap();
        assert_eq!(config.claim_ttl(), Duration::minutes(30));
        assert!(config.cycle_active_window_check);
        assert_eq!(config.code_length_bits, 128);
        assert!(config.auto_pick_box_on_validate);
        assert_eq!(config.benefit_tie_break, TieBreak::CyclePrimary);
        assert!(!config.reprint_rotates_code);
    }

    #[test]
    fn rejects_short_secret() {
        let err = EngineConfig::from_toml("signing_secret = \"00010203\"").unwrap_err();
        assert!(matches!(err, ConfigError::WeakSecret { bits: 32 }));
    }

    #[test]
    fn rejects_non_hex_secret() {
        let err = EngineConfig::from_toml("signing_secret = \"not-hex!\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSecretEncoding));
    }

    #[test]
    fn rejects_unknown_keys() {
        let toml = format!("signing_secret = \"{SECRET_HEX}\"\nsocket = \"legacy\"\n");
        assert!(EngineConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn rejects_bad_code_length() {
        let toml = format!("signing_secret = \"{SECRET_HEX}\"\ncode_length_bits = 100\n");
        let err = EngineConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCodeLength { bits: 100 }));
    }

    #[test]
    fn rejects_non_positive_ttl() {
        let toml = format!("signing_secret = \"{SECRET_HEX}\"\nclaim_ttl_secs = 0\n");
        let err = EngineConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTtl { secs: 0 }));
    }

    #[test]
    fn tie_break_parses_kebab_case() {
        let toml = format!(
            "signing_secret = \"{SECRET_HEX}\"\nbenefit_tie_break = \"lowest-id\"\n"
        );
        let config = EngineConfig::from_toml(&toml).unwrap();
        assert_eq!(config.benefit_tie_break, TieBreak::LowestId);
    }
}
