//! Checking a signed intent against what it claims to commit to.

use bitcoin::consensus::Encodable;
use bitcoin::hashes::Hash;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot;
use bitcoin::{OutPoint, Transaction, TxOut};
use thiserror::Error;

use crate::message::IntentMessage;
use crate::proof::to_spend;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("expected {expected} inputs, found {found}")]
    InputCount { expected: usize, found: usize },

    #[error("input 0 does not spend the message commitment")]
    NotBoundToMessage,

    #[error("register message lists other coins than the intent spends")]
    InputsMismatch,

    #[error("outputs differ from the declared outputs")]
    OutputsMismatch,

    #[error("input 0 carries no key-path signature")]
    MissingSignature,

    #[error("message signature: {0}")]
    InvalidSignature(String),

    #[error("input {index} fails script verification: {reason}")]
    Script { index: usize, reason: String },

    #[error("transaction encoding: {0}")]
    Encoding(String),
}

/// Verify an intent transaction.
///
/// `prevouts` are the committed outputs spent by the holder inputs (input 1
/// onwards). When `expected_outputs` is given the transaction must declare
/// exactly those outputs. A message that decodes as a register request must
/// list exactly the coins spent by inputs 1 onwards, in order.
pub fn verify_intent(
    message: &[u8],
    message_key: &XOnlyPublicKey,
    tx: &Transaction,
    prevouts: &[TxOut],
    expected_outputs: Option<&[TxOut]>,
) -> Result<(), VerifyError> {
    let commitment = to_spend(message, *message_key);

    if tx.input.len() != prevouts.len() + 1 {
        return Err(VerifyError::InputCount {
            expected: prevouts.len() + 1,
            found: tx.input.len(),
        });
    }
    if tx.input[0].previous_output != OutPoint::new(commitment.compute_txid(), 0) {
        return Err(VerifyError::NotBoundToMessage);
    }
    if let Ok(IntentMessage::Register(register)) = IntentMessage::from_payload(message) {
        let spent = tx.input[1..].iter().map(|i| i.previous_output);
        if !register.inputs.iter().copied().eq(spent) {
            return Err(VerifyError::InputsMismatch);
        }
    }
    if let Some(expected) = expected_outputs {
        if tx.output != expected {
            return Err(VerifyError::OutputsMismatch);
        }
    }

    let mut all_prevouts = Vec::with_capacity(prevouts.len() + 1);
    all_prevouts.push(commitment.output[0].clone());
    all_prevouts.extend_from_slice(prevouts);

    let raw_sig = tx.input[0]
        .witness
        .nth(0)
        .ok_or(VerifyError::MissingSignature)?;
    let sig = taproot::Signature::from_slice(raw_sig)
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;
    let sighash = SighashCache::new(tx)
        .taproot_key_spend_signature_hash(0, &Prevouts::All(&all_prevouts), sig.sighash_type)
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(
        &sig.signature,
        &Message::from_digest(sighash.to_byte_array()),
        message_key,
    )
    .map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;

    verify_scripts(tx, &all_prevouts)?;
    log::debug!("intent {} verified", tx.compute_txid());
    Ok(())
}

/// Run every input through libbitcoinconsensus with all prevouts supplied.
pub fn verify_scripts(tx: &Transaction, prevouts: &[TxOut]) -> Result<(), VerifyError> {
    let mut tx_bytes = Vec::new();
    tx.consensus_encode(&mut tx_bytes)
        .map_err(|e| VerifyError::Encoding(e.to_string()))?;

    let utxos: Vec<bitcoinconsensus::Utxo> = prevouts
        .iter()
        .map(|o| {
            let script = o.script_pubkey.as_bytes();
            bitcoinconsensus::Utxo {
                script_pubkey: script.as_ptr(),
                script_pubkey_len: script.len() as u32,
                value: o.value.to_sat() as i64,
            }
        })
        .collect();

    for (index, prevout) in prevouts.iter().enumerate() {
        bitcoinconsensus::verify(
            prevout.script_pubkey.as_bytes(),
            prevout.value.to_sat(),
            &tx_bytes,
            Some(&utxos),
            index,
        )
        .map_err(|e| VerifyError::Script {
            index,
            reason: format!("{:?}", e),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::{build_intent, IntentInput};
    use ark_contracts::{ArkContract, PaymentContract};
    use ark_core::locktime::RelativeLocktime;
    use ark_core::signer::ArkSigner;
    use ark_core::test_utils::{test_keypair, test_signer};
    use bitcoin::{Amount, ScriptBuf, Txid};

    async fn signed() -> (crate::proof::Intent, XOnlyPublicKey, Vec<TxOut>) {
        let contract: ArkContract = PaymentContract::new(
            test_keypair(1).1,
            test_keypair(2).1,
            RelativeLocktime::Blocks(10),
        )
        .unwrap()
        .into();
        let user = test_signer(2);
        let input = IntentInput {
            outpoint: OutPoint::new(Txid::from_byte_array([4; 32]), 0),
            prevout: TxOut {
                value: Amount::from_sat(10_000),
                script_pubkey: contract.script_pubkey(),
            },
            contract: &contract,
            path: "unilateral",
            signers: vec![&user as &dyn ArkSigner],
            preimage: None,
        };
        let outputs = vec![TxOut {
            value: Amount::from_sat(9_000),
            script_pubkey: ScriptBuf::new_op_return([1u8; 4]),
        }];
        let msg_signer = test_signer(8);
        let intent = build_intent(b"hello", &msg_signer, &[input], &outputs)
            .await
            .unwrap();
        (intent, msg_signer.x_only_public_key(), outputs)
    }

    #[tokio::test]
    async fn test_verifies_and_binds_message() {
        let (intent, key, outputs) = signed().await;
        let tx = intent.transaction();
        let prevouts = intent.prevouts();
        verify_intent(b"hello", &key, &tx, &prevouts, Some(&outputs)).unwrap();

        assert_eq!(
            verify_intent(b"hullo", &key, &tx, &prevouts, None),
            Err(VerifyError::NotBoundToMessage)
        );
        let other = test_keypair(3).1.x_only_public_key().0;
        assert_eq!(
            verify_intent(b"hello", &other, &tx, &prevouts, None),
            Err(VerifyError::NotBoundToMessage)
        );
    }

    #[tokio::test]
    async fn test_wrong_prevout_amount_fails() {
        let (intent, key, _) = signed().await;
        let tx = intent.transaction();
        let mut prevouts = intent.prevouts();
        prevouts[0].value = Amount::from_sat(10_001);
        assert!(matches!(
            verify_intent(b"hello", &key, &tx, &prevouts, None),
            Err(VerifyError::InvalidSignature(_))
        ));
    }
}
