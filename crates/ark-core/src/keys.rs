//! Public key parsing.
//!
//! Every key that enters a contract goes through [`parse_public_key`], so the
//! curve-point check happens once at the boundary.

use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::PublicKey;
use thiserror::Error;

/// BIP-341 "nothing up my sleeve" point: `lift_x(sha256(G))`.
///
/// Used as the internal key of every contract output so the key path is
/// provably unspendable.
pub const UNSPENDABLE_KEY: &str = "50929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("invalid public key encoding: expected 32 or 33 bytes, got {0}")]
    InvalidLength(usize),
}

/// Parse a hex public key.
///
/// Accepts 33-byte compressed keys and 32-byte x-only keys (lifted to even Y).
pub fn parse_public_key(hex_str: &str) -> Result<PublicKey, KeyError> {
    let bytes =
        hex::decode(hex_str.trim()).map_err(|e| KeyError::InvalidKey(format!("bad hex: {}", e)))?;
    public_key_from_slice(&bytes)
}

/// Same as [`parse_public_key`] for raw bytes.
pub fn public_key_from_slice(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    match bytes.len() {
        33 => PublicKey::from_slice(bytes).map_err(|e| KeyError::InvalidKey(e.to_string())),
        32 => {
            let xonly = XOnlyPublicKey::from_slice(bytes)
                .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
            Ok(xonly.public_key(bitcoin::secp256k1::Parity::Even))
        }
        n => Err(KeyError::InvalidLength(n)),
    }
}

/// The unspendable internal key as an x-only key.
pub fn unspendable_key() -> Result<XOnlyPublicKey, KeyError> {
    let bytes = hex::decode(UNSPENDABLE_KEY).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
    XOnlyPublicKey::from_slice(&bytes).map_err(|e| KeyError::InvalidKey(e.to_string()))
}

/// Compressed hex encoding used for persisted key fields.
pub fn public_key_to_hex(pk: &PublicKey) -> String {
    hex::encode(pk.serialize())
}
