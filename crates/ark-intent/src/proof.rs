//! Building signed intents.

use ark_contracts::{ArkContract, ContractError, SpendInfo};
use ark_core::signer::{ArkSigner, SignerError};
use bitcoin::absolute::LockTime;
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::key::{TweakedPublicKey, XOnlyPublicKey};
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::opcodes::OP_0;
use bitcoin::psbt::Psbt;
use bitcoin::script::Builder;
use bitcoin::secp256k1::PublicKey;
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::{self, TapLeafHash};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, TapSighashType, Transaction, TxIn, TxOut, Witness,
};
use thiserror::Error;

use crate::message::{IntentMessage, MessageError};

const MESSAGE_TAG: &[u8] = b"BIP0322-signed-message";

#[derive(Error, Debug)]
pub enum IntentError {
    #[error("intent needs at least one input")]
    NoInputs,

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("input {index}: prevout script does not match the {contract} contract")]
    PrevoutMismatch { index: usize, contract: &'static str },

    #[error("input {index}: no signer for key {key}")]
    MissingSigner { index: usize, key: PublicKey },

    #[error("input {index}: path {path} needs a preimage")]
    MissingPreimage { index: usize, path: &'static str },

    #[error("input {index}: preimage does not open the hash lock")]
    WrongPreimage { index: usize },

    #[error("register message lists other coins than the intent spends")]
    InputsMismatch,

    #[error("inputs mix block-height and timestamp locktimes")]
    MixedLocktimes,

    #[error("sighash: {0}")]
    Sighash(String),

    #[error("signer returned a signature for {got}, expected {expected}")]
    SignerKeyMismatch {
        expected: XOnlyPublicKey,
        got: XOnlyPublicKey,
    },

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("psbt: {0}")]
    Psbt(String),
}

/// A coin the intent spends, with what it takes to spend it.
pub struct IntentInput<'a> {
    pub outpoint: OutPoint,
    pub prevout: TxOut,
    pub contract: &'a ArkContract,
    /// Spend path name, e.g. `"unilateral"`.
    pub path: &'a str,
    /// One signer per key the path requires; extra signers are ignored.
    pub signers: Vec<&'a dyn ArkSigner>,
    pub preimage: Option<Vec<u8>>,
}

/// A finalized intent proof.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub message: Vec<u8>,
    pub psbt: Psbt,
}

impl Intent {
    pub fn transaction(&self) -> Transaction {
        self.psbt.clone().extract_tx_unchecked_fee_rate()
    }

    /// Prevouts of the holder inputs, as committed in the PSBT.
    pub fn prevouts(&self) -> Vec<TxOut> {
        self.psbt
            .inputs
            .iter()
            .skip(1)
            .filter_map(|i| i.witness_utxo.clone())
            .collect()
    }

    pub fn decode_message(&self) -> Result<IntentMessage, MessageError> {
        IntentMessage::from_payload(&self.message)
    }
}

/// BIP-340 tagged hash of the message.
pub fn message_hash(message: &[u8]) -> [u8; 32] {
    let tag = sha256::Hash::hash(MESSAGE_TAG);
    let mut engine = sha256::Hash::engine();
    engine.input(tag.as_ref());
    engine.input(tag.as_ref());
    engine.input(message);
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// Commitment output script for the message-signing key.
fn commitment_script(message_key: XOnlyPublicKey) -> ScriptBuf {
    ScriptBuf::new_p2tr_tweaked(TweakedPublicKey::dangerous_assume_tweaked(message_key))
}

/// The virtual transaction committing to `message` and `message_key`.
pub fn to_spend(message: &[u8], message_key: XOnlyPublicKey) -> Transaction {
    let script_sig = Builder::new()
        .push_opcode(OP_0)
        .push_slice(message_hash(message))
        .into_script();

    Transaction {
        version: Version(0),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: commitment_script(message_key),
        }],
    }
}

fn placeholder_output() -> TxOut {
    TxOut {
        value: Amount::ZERO,
        script_pubkey: Builder::new().push_opcode(OP_RETURN).into_script(),
    }
}

/// Largest absolute lock any input path needs.
fn required_locktime(infos: &[SpendInfo]) -> Result<LockTime, IntentError> {
    let mut locktime = LockTime::ZERO;
    for lock in infos.iter().filter_map(|i| i.absolute_timelock) {
        if locktime == LockTime::ZERO {
            locktime = lock;
            continue;
        }
        if !locktime.is_same_unit(lock) {
            return Err(IntentError::MixedLocktimes);
        }
        if lock.to_consensus_u32() > locktime.to_consensus_u32() {
            locktime = lock;
        }
    }
    Ok(locktime)
}

/// Build and sign an intent over `message`.
///
/// Holder inputs are signed through their contract leaves first; input 0 is
/// signed last by `message_signer`, over the completed transaction.
pub async fn build_intent(
    message: &[u8],
    message_signer: &dyn ArkSigner,
    inputs: &[IntentInput<'_>],
    outputs: &[TxOut],
) -> Result<Intent, IntentError> {
    if inputs.is_empty() {
        return Err(IntentError::NoInputs);
    }
    let message_key = message_signer.public_key().x_only_public_key().0;
    let commitment = to_spend(message, message_key);

    let mut infos = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let index = i + 1;
        if input.prevout.script_pubkey != input.contract.script_pubkey() {
            return Err(IntentError::PrevoutMismatch {
                index,
                contract: input.contract.type_tag(),
            });
        }
        let info = input.contract.spend_info(input.path)?;
        if let Some(lock) = &info.hash_lock {
            let preimage = input.preimage.as_deref().ok_or(IntentError::MissingPreimage {
                index,
                path: info.path,
            })?;
            if !lock.opens(preimage) {
                return Err(IntentError::WrongPreimage { index });
            }
        }
        infos.push(info);
    }

    let mut tx_inputs = vec![TxIn {
        previous_output: OutPoint::new(commitment.compute_txid(), 0),
        sequence: Sequence::ZERO,
        ..Default::default()
    }];
    tx_inputs.extend(inputs.iter().zip(&infos).map(|(input, info)| TxIn {
        previous_output: input.outpoint,
        sequence: info.sequence(),
        ..Default::default()
    }));

    let tx = Transaction {
        version: Version::TWO,
        lock_time: required_locktime(&infos)?,
        input: tx_inputs,
        output: if outputs.is_empty() {
            vec![placeholder_output()]
        } else {
            outputs.to_vec()
        },
    };

    let mut prevouts = vec![commitment.output[0].clone()];
    prevouts.extend(inputs.iter().map(|i| i.prevout.clone()));

    let mut psbt = Psbt::from_unsigned_tx(tx).map_err(|e| IntentError::Psbt(e.to_string()))?;
    for (psbt_input, prevout) in psbt.inputs.iter_mut().zip(&prevouts) {
        psbt_input.witness_utxo = Some(prevout.clone());
    }

    let mut cache = SighashCache::new(psbt.unsigned_tx.clone());
    for (i, (input, info)) in inputs.iter().zip(&infos).enumerate() {
        let index = i + 1;
        let leaf_hash = TapLeafHash::from_script(info.leaf.script(), info.leaf.version());
        let sighash = cache
            .taproot_script_spend_signature_hash(
                index,
                &Prevouts::All(&prevouts),
                leaf_hash,
                TapSighashType::Default,
            )
            .map_err(|e| IntentError::Sighash(e.to_string()))?
            .to_byte_array();

        // Script order: the first key is checked first, so its signature is
        // on top of the stack, right under any preimage.
        let mut stack: Vec<Vec<u8>> = Vec::with_capacity(info.signers.len() + 3);
        for key in info.signers.iter().rev() {
            let signer = input
                .signers
                .iter()
                .find(|s| s.public_key() == *key)
                .ok_or(IntentError::MissingSigner { index, key: *key })?;
            let expected = key.x_only_public_key().0;
            let (signature, got) = signer.sign(&sighash).await?;
            if got != expected {
                return Err(IntentError::SignerKeyMismatch { expected, got });
            }
            let sig = taproot::Signature {
                signature,
                sighash_type: TapSighashType::Default,
            };
            psbt.inputs[index]
                .tap_script_sigs
                .insert((expected, leaf_hash), sig);
            stack.push(sig.to_vec());
        }
        if let Some(preimage) = &input.preimage {
            if info.needs_preimage() {
                stack.push(preimage.clone());
            }
        }
        stack.push(info.leaf.script().to_bytes());
        stack.push(info.control_block.serialize());

        let psbt_input = &mut psbt.inputs[index];
        psbt_input.tap_scripts.insert(
            info.control_block.clone(),
            (info.leaf.script().clone(), info.leaf.version()),
        );
        psbt_input.final_script_witness = Some(Witness::from_slice(&stack));
        log::debug!("signed intent input {} via {}", index, info.path);
    }

    let sighash = cache
        .taproot_key_spend_signature_hash(0, &Prevouts::All(&prevouts), TapSighashType::Default)
        .map_err(|e| IntentError::Sighash(e.to_string()))?
        .to_byte_array();
    let (signature, got) = message_signer.sign(&sighash).await?;
    if got != message_key {
        return Err(IntentError::SignerKeyMismatch {
            expected: message_key,
            got,
        });
    }
    let sig = taproot::Signature {
        signature,
        sighash_type: TapSighashType::Default,
    };
    psbt.inputs[0].tap_key_sig = Some(sig);
    psbt.inputs[0].final_script_witness = Some(Witness::from_slice(&[sig.to_vec()]));

    Ok(Intent {
        message: message.to_vec(),
        psbt,
    })
}

/// Sign a register message and the matching delete message over the same
/// coins.
pub async fn build_register_and_delete(
    register: &IntentMessage,
    delete: &IntentMessage,
    message_signer: &dyn ArkSigner,
    inputs: &[IntentInput<'_>],
    outputs: &[TxOut],
) -> Result<(Intent, Intent), IntentError> {
    register.validate(outputs.len())?;
    if let IntentMessage::Register(r) = register {
        if !r.inputs.iter().copied().eq(inputs.iter().map(|i| i.outpoint)) {
            return Err(IntentError::InputsMismatch);
        }
    }
    let register_intent =
        build_intent(&register.to_payload()?, message_signer, inputs, outputs).await?;
    let delete_intent = build_intent(&delete.to_payload()?, message_signer, inputs, &[]).await?;
    Ok((register_intent, delete_intent))
}
