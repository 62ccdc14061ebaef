//! Register and delete requests carried by an intent.

use bitcoin::secp256k1::PublicKey;
use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("valid_at ({valid_at}) must be before expire_at ({expire_at})")]
    EmptyWindow { valid_at: u64, expire_at: u64 },

    #[error("register message lists no inputs")]
    NoInputs,

    #[error("on-chain output index {index} out of range ({outputs} outputs)")]
    OutputIndex { index: u32, outputs: usize },

    #[error("malformed intent message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ask to take part in the next round with the listed coins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMessage {
    pub inputs: Vec<OutPoint>,
    /// Declared outputs that leave the Ark and settle on chain.
    #[serde(default)]
    pub onchain_output_indexes: Vec<u32>,
    /// Unix seconds.
    pub valid_at: u64,
    pub expire_at: u64,
    /// Keys the holder will use to cosign the batch tree.
    pub cosigners_public_keys: Vec<PublicKey>,
}

/// Withdraw a pending registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessage {
    pub expire_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentMessage {
    Register(RegisterMessage),
    Delete(DeleteMessage),
}

impl IntentMessage {
    /// Check the message against the number of outputs the intent declares.
    pub fn validate(&self, outputs: usize) -> Result<(), MessageError> {
        let Self::Register(register) = self else {
            return Ok(());
        };
        if register.valid_at >= register.expire_at {
            return Err(MessageError::EmptyWindow {
                valid_at: register.valid_at,
                expire_at: register.expire_at,
            });
        }
        if register.inputs.is_empty() {
            return Err(MessageError::NoInputs);
        }
        if let Some(&index) = register
            .onchain_output_indexes
            .iter()
            .find(|&&i| i as usize >= outputs)
        {
            return Err(MessageError::OutputIndex { index, outputs });
        }
        Ok(())
    }

    pub fn expire_at(&self) -> u64 {
        match self {
            Self::Register(r) => r.expire_at,
            Self::Delete(d) => d.expire_at,
        }
    }

    /// Bytes that get signed.
    pub fn to_payload(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_core::test_utils::test_keypair;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    fn register() -> RegisterMessage {
        RegisterMessage {
            inputs: vec![OutPoint::new(Txid::from_byte_array([1; 32]), 0)],
            onchain_output_indexes: vec![1],
            valid_at: 1_700_000_000,
            expire_at: 1_700_000_000 + 30 * 24 * 3600,
            cosigners_public_keys: vec![test_keypair(1).1],
        }
    }

    #[test]
    fn test_json_shape() {
        let msg = IntentMessage::Register(register());
        let json: serde_json::Value = serde_json::from_slice(&msg.to_payload().unwrap()).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["onchain_output_indexes"][0], 1);
        assert!(json["inputs"][0].as_str().unwrap().ends_with(":0"));
        assert_eq!(IntentMessage::from_payload(&msg.to_payload().unwrap()).unwrap(), msg);

        let delete = IntentMessage::Delete(DeleteMessage { expire_at: 5 });
        assert_eq!(
            String::from_utf8(delete.to_payload().unwrap()).unwrap(),
            r#"{"type":"delete","expire_at":5}"#
        );
    }

    #[test]
    fn test_validation() {
        assert!(IntentMessage::Register(register()).validate(2).is_ok());
        assert!(matches!(
            IntentMessage::Register(register()).validate(1),
            Err(MessageError::OutputIndex { index: 1, outputs: 1 })
        ));

        let mut r = register();
        r.expire_at = r.valid_at;
        assert!(matches!(
            IntentMessage::Register(r).validate(2),
            Err(MessageError::EmptyWindow { .. })
        ));

        let mut r = register();
        r.inputs.clear();
        assert!(matches!(
            IntentMessage::Register(r).validate(2),
            Err(MessageError::NoInputs)
        ));

        assert!(IntentMessage::Delete(DeleteMessage { expire_at: 0 })
            .validate(0)
            .is_ok());
    }
}
