//! Operator terms, parsed from a TOML file plus environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.
//!
//! ```toml
//! network = "signet"
//! server_pubkey = "02..."
//! dust_sats = 330
//! unilateral_exit_delay = { type = "seconds", value = 86016 }
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, Network};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::{parse_public_key, KeyError};
use crate::locktime::{LocktimeError, RelativeLocktime};

#[derive(Error, Debug)]
pub enum TermsError {
    #[error("failed to read terms file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse terms TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("server key: {0}")]
    ServerKey(#[from] KeyError),

    #[error("delay: {0}")]
    Delay(#[from] LocktimeError),

    #[error("{0}")]
    Invalid(String),
}

/// Round parameters the operator publishes. Treated as trusted per round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArkTerms {
    /// "bitcoin", "testnet", "signet", "regtest"
    #[serde(default = "default_network")]
    pub network: String,

    /// Operator signing key (33-byte compressed hex)
    pub server_pubkey: String,

    /// Outputs below this are not representable as VTXOs
    #[serde(default = "default_dust")]
    pub dust_sats: u64,

    /// Delay on the owner's unilateral exit path of a VTXO
    #[serde(default = "default_unilateral_exit_delay")]
    pub unilateral_exit_delay: RelativeLocktime,

    /// Delay on the owner's exit path of a boarding output
    #[serde(default = "default_boarding_exit_delay")]
    pub boarding_exit_delay: RelativeLocktime,

    /// Delay after which the operator may sweep a batch output
    #[serde(default = "default_sweep_delay")]
    pub batch_sweep_delay: RelativeLocktime,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_dust() -> u64 {
    330
}

fn default_unilateral_exit_delay() -> RelativeLocktime {
    RelativeLocktime::Seconds(86_016) // 168 intervals, ~1 day
}

fn default_boarding_exit_delay() -> RelativeLocktime {
    RelativeLocktime::Seconds(7_776_256) // ~90 days
}

fn default_sweep_delay() -> RelativeLocktime {
    RelativeLocktime::Seconds(604_672) // ~7 days
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl ArkTerms {
    pub fn from_file(path: &Path) -> Result<Self, TermsError> {
        log::debug!("loading terms from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| TermsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, TermsError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `ARK_NETWORK`
    /// - `ARK_SERVER_PUBKEY`
    /// - `ARK_DUST_SATS`
    /// - `ARK_UNILATERAL_EXIT_DELAY` (`blocks:<n>` or `seconds:<n>`)
    /// - `ARK_BOARDING_EXIT_DELAY`
    /// - `ARK_SWEEP_DELAY`
    ///
    /// A variable that is set but malformed is an error, not ignored.
    pub fn apply_env_overrides(&mut self) -> Result<(), TermsError> {
        if let Ok(v) = std::env::var("ARK_NETWORK") {
            log::info!("terms: ARK_NETWORK overrides the file value");
            self.network = v;
        }
        if let Ok(v) = std::env::var("ARK_SERVER_PUBKEY") {
            log::info!("terms: ARK_SERVER_PUBKEY overrides the file value");
            self.server_pubkey = v;
        }
        if let Ok(v) = std::env::var("ARK_DUST_SATS") {
            log::info!("terms: ARK_DUST_SATS overrides the file value");
            self.dust_sats = v.parse::<u64>().map_err(|e| TermsError::InvalidEnv {
                var: "ARK_DUST_SATS",
                reason: e.to_string(),
            })?;
        }
        if let Ok(v) = std::env::var("ARK_UNILATERAL_EXIT_DELAY") {
            log::info!("terms: ARK_UNILATERAL_EXIT_DELAY overrides the file value");
            self.unilateral_exit_delay = parse_delay("ARK_UNILATERAL_EXIT_DELAY", &v)?;
        }
        if let Ok(v) = std::env::var("ARK_BOARDING_EXIT_DELAY") {
            log::info!("terms: ARK_BOARDING_EXIT_DELAY overrides the file value");
            self.boarding_exit_delay = parse_delay("ARK_BOARDING_EXIT_DELAY", &v)?;
        }
        if let Ok(v) = std::env::var("ARK_SWEEP_DELAY") {
            log::info!("terms: ARK_SWEEP_DELAY overrides the file value");
            self.batch_sweep_delay = parse_delay("ARK_SWEEP_DELAY", &v)?;
        }
        Ok(())
    }

    pub fn network(&self) -> Result<Network, TermsError> {
        match self.network.as_str() {
            "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
            "testnet" | "testnet3" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => Err(TermsError::UnknownNetwork(other.to_string())),
        }
    }

    pub fn server_key(&self) -> Result<PublicKey, TermsError> {
        Ok(parse_public_key(&self.server_pubkey)?)
    }

    pub fn dust(&self) -> Amount {
        Amount::from_sat(self.dust_sats)
    }

    /// Validate that the terms are usable.
    pub fn validate(&self) -> Result<(), TermsError> {
        self.network()?;
        self.server_key()?;

        if self.dust_sats == 0 {
            return Err(TermsError::Invalid("dust_sats must be > 0".into()));
        }
        if self.unilateral_exit_delay.is_seconds() != self.boarding_exit_delay.is_seconds() {
            return Err(TermsError::Invalid(
                "unilateral and boarding exit delays must use the same unit".into(),
            ));
        }
        if self.boarding_exit_delay < self.unilateral_exit_delay {
            return Err(TermsError::Invalid(
                "boarding_exit_delay must not be shorter than unilateral_exit_delay".into(),
            ));
        }
        log::debug!(
            "terms valid: network {}, dust {} sat, exit delay {}",
            self.network,
            self.dust_sats,
            self.unilateral_exit_delay
        );
        Ok(())
    }
}

fn parse_delay(var: &'static str, value: &str) -> Result<RelativeLocktime, TermsError> {
    let invalid = |reason: String| TermsError::InvalidEnv { var, reason };

    let (unit, amount) = value
        .split_once(':')
        .ok_or_else(|| invalid(format!("expected blocks:<n> or seconds:<n>, got {:?}", value)))?;
    let amount = u64::from_str(amount.trim()).map_err(|e| invalid(e.to_string()))?;

    match unit.trim() {
        "blocks" => RelativeLocktime::from_blocks(amount).map_err(|e| invalid(e.to_string())),
        "seconds" => RelativeLocktime::from_seconds(amount).map_err(|e| invalid(e.to_string())),
        other => Err(invalid(format!("unknown unit {:?}", other))),
    }
}

// ============================================================================
// Tests
// ============================================================================
