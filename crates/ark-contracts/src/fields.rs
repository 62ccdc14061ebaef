//! Flat string-keyed field maps used for persistence.
//!
//! Keys are 33-byte compressed hex, hashes are hex, relative delays are the
//! decimal BIP-68 sequence value and absolute locktimes are the decimal
//! consensus value.

use std::collections::BTreeMap;

use ark_core::keys::{parse_public_key, public_key_to_hex};
use ark_core::locktime::RelativeLocktime;
use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Sequence;

use crate::error::ContractError;

pub type FieldMap = BTreeMap<String, String>;

pub(crate) struct FieldReader<'a> {
    contract: &'static str,
    map: &'a FieldMap,
}

impl<'a> FieldReader<'a> {
    pub fn new(contract: &'static str, map: &'a FieldMap) -> Self {
        Self { contract, map }
    }

    pub fn text(&self, field: &'static str) -> Result<&'a str, ContractError> {
        self.map
            .get(field)
            .map(String::as_str)
            .ok_or(ContractError::MissingField {
                contract: self.contract,
                field,
            })
    }

    pub fn key(&self, field: &'static str) -> Result<PublicKey, ContractError> {
        parse_public_key(self.text(field)?).map_err(|e| ContractError::InvalidField {
            field,
            reason: e.to_string(),
        })
    }

    pub fn bytes(&self, field: &'static str) -> Result<Vec<u8>, ContractError> {
        hex::decode(self.text(field)?).map_err(|e| ContractError::InvalidField {
            field,
            reason: e.to_string(),
        })
    }

    fn number(&self, field: &'static str) -> Result<u32, ContractError> {
        self.text(field)?
            .parse::<u32>()
            .map_err(|e| ContractError::InvalidField {
                field,
                reason: e.to_string(),
            })
    }

    pub fn delay(&self, field: &'static str) -> Result<RelativeLocktime, ContractError> {
        let raw = self.number(field)?;
        RelativeLocktime::from_sequence(Sequence::from_consensus(raw)).map_err(|e| {
            ContractError::InvalidField {
                field,
                reason: e.to_string(),
            }
        })
    }

    pub fn locktime(&self, field: &'static str) -> Result<LockTime, ContractError> {
        Ok(LockTime::from_consensus(self.number(field)?))
    }
}

#[derive(Default)]
pub(crate) struct FieldWriter(FieldMap);

impl FieldWriter {
    pub fn text(mut self, field: &str, value: impl Into<String>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn key(self, field: &str, key: &PublicKey) -> Self {
        self.text(field, public_key_to_hex(key))
    }

    pub fn bytes(self, field: &str, bytes: &[u8]) -> Self {
        self.text(field, hex::encode(bytes))
    }

    pub fn delay(self, field: &str, delay: RelativeLocktime) -> Self {
        self.text(field, delay.to_sequence().to_consensus_u32().to_string())
    }

    pub fn locktime(self, field: &str, locktime: LockTime) -> Self {
        self.text(field, locktime.to_consensus_u32().to_string())
    }

    pub fn finish(self) -> FieldMap {
        self.0
    }
}
