//! Per-node signing context: who signs, what they spend, what they sign.
//!
//! Participants and the coordinator compute this independently. Any
//! disagreement in the cosigner set, the prevout or the tweak yields a
//! different sighash or aggregate key and the round fails.

use ark_core::musig::{self, MusigError};
use bitcoin::hashes::Hash;
use bitcoin::key::{TweakedPublicKey, XOnlyPublicKey};
use bitcoin::secp256k1::PublicKey;
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::TapNodeHash;
use bitcoin::{Amount, ScriptBuf, TapSighashType, TxOut, Txid};
use musig2::KeyAggContext;
use thiserror::Error;

use crate::cosigner::{cosigner_keys, CosignerError};
use crate::tx_tree::{TxTree, TxTreeNode};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("node {txid}: {source}")]
    Cosigner { txid: Txid, source: CosignerError },

    #[error("node {0} lists no cosigners")]
    NoCosigners(Txid),

    #[error("node {0} spends an output its parent does not have")]
    UnknownParent(Txid),

    #[error("node {txid}: {source}")]
    Musig { txid: Txid, source: MusigError },

    #[error("sighash for node {txid}: {reason}")]
    Sighash { txid: Txid, reason: String },
}

impl ContextError {
    /// True when the tree itself is malformed: a node with missing or
    /// unreadable cosigner entries, or one whose parent lacks the spent
    /// output.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::Cosigner { .. } | Self::NoCosigners(_) | Self::UnknownParent(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct NodeContext {
    pub txid: Txid,
    /// Sorted cosigner keys.
    pub cosigners: Vec<PublicKey>,
    pub prevout: TxOut,
    pub sighash: [u8; 32],
    /// Aggregation context already tweaked with the tree's script root.
    pub key_agg_ctx: KeyAggContext,
    pub output_key: XOnlyPublicKey,
}

impl NodeContext {
    pub fn includes(&self, key: &PublicKey) -> bool {
        self.cosigners.contains(key)
    }
}

/// P2TR script of an output shared by `cosigners` with sweep paths under
/// `script_root`.
pub fn shared_output_script(
    cosigners: &[PublicKey],
    script_root: &TapNodeHash,
) -> Result<ScriptBuf, MusigError> {
    let (_, output_key) = musig::key_agg_tweaked(cosigners, script_root)?;
    Ok(ScriptBuf::new_p2tr_tweaked(
        TweakedPublicKey::dangerous_assume_tweaked(output_key),
    ))
}

/// Compute the signing context of one node.
///
/// The root spends the batch output: `root_amount` locked to the cosigners'
/// aggregate key tweaked by `script_root`. Every other node spends its
/// parent's output.
pub fn node_context(
    tree: &TxTree,
    node: &TxTreeNode,
    script_root: &TapNodeHash,
    root_amount: Amount,
) -> Result<NodeContext, ContextError> {
    let txid = node.txid();
    let keys = cosigner_keys(&node.psbt).map_err(|source| ContextError::Cosigner { txid, source })?;
    if keys.is_empty() {
        return Err(ContextError::NoCosigners(txid));
    }
    let cosigners = musig::sort_keys(&keys);

    let (key_agg_ctx, output_key) = musig::key_agg_tweaked(&cosigners, script_root)
        .map_err(|source| ContextError::Musig { txid, source })?;

    let prevout = if tree.is_root(&txid) {
        TxOut {
            value: root_amount,
            script_pubkey: ScriptBuf::new_p2tr_tweaked(TweakedPublicKey::dangerous_assume_tweaked(
                output_key,
            )),
        }
    } else {
        let vout = node
            .spends()
            .map(|o| o.vout)
            .ok_or(ContextError::UnknownParent(txid))?;
        tree.parent(&txid)
            .and_then(|parent| parent.output(vout))
            .cloned()
            .ok_or(ContextError::UnknownParent(txid))?
    };

    let sighash = SighashCache::new(&node.psbt.unsigned_tx)
        .taproot_key_spend_signature_hash(
            0,
            &Prevouts::All(&[prevout.clone()]),
            TapSighashType::Default,
        )
        .map_err(|e| ContextError::Sighash {
            txid,
            reason: e.to_string(),
        })?
        .to_byte_array();

    Ok(NodeContext {
        txid,
        cosigners,
        prevout,
        sighash,
        key_agg_ctx,
        output_key,
    })
}

/// Contexts of every node, in tree order.
pub fn tree_contexts(
    tree: &TxTree,
    script_root: &TapNodeHash,
    root_amount: Amount,
) -> Result<Vec<NodeContext>, ContextError> {
    tree.iter()
        .map(|node| node_context(tree, node, script_root, root_amount))
        .collect()
}
