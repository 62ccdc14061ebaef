//! Cosigner keys stored as unknown PSBT fields on a node's first input.
//!
//! Each key is one entry with key type `0xde`, key data
//! `"cosigner" || u32 big-endian index` and the 33-byte compressed key as
//! value.

use std::collections::BTreeMap;

use bitcoin::psbt::{raw, Psbt};
use bitcoin::secp256k1::PublicKey;
use thiserror::Error;

pub const COSIGNER_KEY_TYPE: u8 = 0xde;
const COSIGNER_PREFIX: &[u8] = b"cosigner";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CosignerError {
    #[error("psbt has no inputs")]
    NoInputs,

    #[error("malformed cosigner field key: {0}")]
    MalformedKey(String),

    #[error("cosigner {index}: {reason}")]
    InvalidPublicKey { index: u32, reason: String },

    #[error("cosigner {key} is listed more than once")]
    DuplicateKey { key: PublicKey },
}

/// Record `key` as cosigner number `index` of the PSBT's first input.
pub fn add_cosigner_key(psbt: &mut Psbt, index: u32, key: &PublicKey) -> Result<(), CosignerError> {
    let input = psbt.inputs.first_mut().ok_or(CosignerError::NoInputs)?;
    let mut key_data = COSIGNER_PREFIX.to_vec();
    key_data.extend_from_slice(&index.to_be_bytes());
    input.unknown.insert(
        raw::Key {
            type_value: COSIGNER_KEY_TYPE,
            key: key_data,
        },
        key.serialize().to_vec(),
    );
    Ok(())
}

/// Cosigner keys of the PSBT's first input in index order.
pub fn cosigner_keys(psbt: &Psbt) -> Result<Vec<PublicKey>, CosignerError> {
    let input = psbt.inputs.first().ok_or(CosignerError::NoInputs)?;

    let mut by_index = BTreeMap::new();
    for (key, value) in &input.unknown {
        if key.type_value != COSIGNER_KEY_TYPE || !key.key.starts_with(COSIGNER_PREFIX) {
            continue;
        }
        let index_bytes: [u8; 4] = key.key[COSIGNER_PREFIX.len()..]
            .try_into()
            .map_err(|_| CosignerError::MalformedKey(hex::encode(&key.key)))?;
        let index = u32::from_be_bytes(index_bytes);
        let pubkey = PublicKey::from_slice(value).map_err(|e| CosignerError::InvalidPublicKey {
            index,
            reason: e.to_string(),
        })?;
        if by_index.values().any(|k| *k == pubkey) {
            return Err(CosignerError::DuplicateKey { key: pubkey });
        }
        by_index.insert(index, pubkey);
    }

    Ok(by_index.into_values().collect())
}
