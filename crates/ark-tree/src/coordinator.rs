//! Operator side of a tree signing round.
//!
//! Collects public nonces from every cosigner, hands back the aggregates,
//! checks each partial signature as it arrives and finally writes the
//! aggregated key-path signature into every node.

use std::collections::BTreeMap;

use ark_core::musig::{self, MusigError};
use bitcoin::secp256k1::{schnorr, PublicKey};
use bitcoin::taproot::{self, TapNodeHash};
use bitcoin::{Amount, TapSighashType, Txid, Witness};
use musig2::{PartialSignature, PubNonce};
use thiserror::Error;

use crate::context::{tree_contexts, ContextError, NodeContext};
use crate::session::NonceSet;
use crate::tx_tree::TxTree;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("unknown node {0}")]
    UnknownNode(Txid),

    #[error("{cosigner} is not a cosigner of node {txid}")]
    NotACosigner { txid: Txid, cosigner: PublicKey },

    #[error("node {txid} is still missing {missing} nonce(s)")]
    IncompleteNonces { txid: Txid, missing: usize },

    #[error("nonces have not been aggregated yet")]
    NoncesNotAggregated,

    #[error("nonces were already aggregated")]
    NoncesAlreadyAggregated,

    #[error("invalid partial signature from {cosigner} on node {txid}")]
    InvalidPartialSignature { txid: Txid, cosigner: PublicKey },

    #[error("node {txid} is still missing {missing} partial signature(s)")]
    IncompleteSignatures { txid: Txid, missing: usize },

    #[error("node {txid}: {source}")]
    Musig { txid: Txid, source: MusigError },

    #[error("aggregated signature for node {0} does not verify")]
    InvalidSignature(Txid),
}

struct NodeRound {
    context: NodeContext,
    pubnonces: BTreeMap<PublicKey, PubNonce>,
    aggregate: Option<NonceSet>,
    partials: BTreeMap<PublicKey, PartialSignature>,
}

pub struct RoundCoordinator {
    tree: TxTree,
    /// Tree order.
    nodes: Vec<NodeRound>,
}

impl RoundCoordinator {
    pub fn new(
        tree: TxTree,
        script_root: &TapNodeHash,
        root_amount: Amount,
    ) -> Result<Self, CoordinatorError> {
        let nodes = tree_contexts(&tree, script_root, root_amount)?
            .into_iter()
            .map(|context| NodeRound {
                context,
                pubnonces: BTreeMap::new(),
                aggregate: None,
                partials: BTreeMap::new(),
            })
            .collect();
        Ok(Self { tree, nodes })
    }

    pub fn tree(&self) -> &TxTree {
        &self.tree
    }

    fn node_mut(&mut self, txid: &Txid) -> Result<&mut NodeRound, CoordinatorError> {
        self.nodes
            .iter_mut()
            .find(|n| n.context.txid == *txid)
            .ok_or(CoordinatorError::UnknownNode(*txid))
    }

    /// Record one cosigner's public nonces.
    pub fn add_nonces(
        &mut self,
        cosigner: PublicKey,
        nonces: &BTreeMap<Txid, PubNonce>,
    ) -> Result<(), CoordinatorError> {
        if self.nodes.iter().any(|n| n.aggregate.is_some()) {
            return Err(CoordinatorError::NoncesAlreadyAggregated);
        }
        for (txid, nonce) in nonces {
            let node = self.node_mut(txid)?;
            if !node.context.includes(&cosigner) {
                return Err(CoordinatorError::NotACosigner {
                    txid: *txid,
                    cosigner,
                });
            }
            node.pubnonces.insert(cosigner, nonce.clone());
        }
        log::debug!("nonces from {} for {} nodes", cosigner, nonces.len());
        Ok(())
    }

    /// Aggregate the nonces of every node once all cosigners have sent theirs.
    pub fn aggregate_nonces(&mut self) -> Result<BTreeMap<Txid, NonceSet>, CoordinatorError> {
        for node in &self.nodes {
            let missing = node.context.cosigners.len() - node.pubnonces.len();
            if missing > 0 {
                return Err(CoordinatorError::IncompleteNonces {
                    txid: node.context.txid,
                    missing,
                });
            }
        }

        let mut sets = BTreeMap::new();
        for node in &mut self.nodes {
            let list: Vec<PubNonce> = node.pubnonces.values().cloned().collect();
            let set = NonceSet {
                pubnonces: node.pubnonces.clone(),
                aggregate: musig::aggregate_nonces(&list),
            };
            sets.insert(node.context.txid, set.clone());
            node.aggregate = Some(set);
        }
        Ok(sets)
    }

    /// Record and verify one cosigner's partial signatures.
    pub fn add_partial_signatures(
        &mut self,
        cosigner: PublicKey,
        signatures: &[(Txid, PartialSignature)],
    ) -> Result<(), CoordinatorError> {
        for (txid, partial) in signatures {
            let node = self.node_mut(txid)?;
            let set = node
                .aggregate
                .as_ref()
                .ok_or(CoordinatorError::NoncesNotAggregated)?;
            let pubnonce = set
                .pubnonces
                .get(&cosigner)
                .ok_or(CoordinatorError::NotACosigner {
                    txid: *txid,
                    cosigner,
                })?;

            let ctx = &node.context;
            if !musig::verify_partial_signature(
                &ctx.key_agg_ctx,
                partial,
                &set.aggregate,
                &cosigner,
                pubnonce,
                &ctx.sighash,
            ) {
                log::warn!("rejected partial signature from {} on {}", cosigner, txid);
                return Err(CoordinatorError::InvalidPartialSignature {
                    txid: *txid,
                    cosigner,
                });
            }
            node.partials.insert(cosigner, *partial);
        }
        Ok(())
    }

    /// Aggregate every node's signature and finalize its PSBT input.
    pub fn finalize(mut self) -> Result<TxTree, CoordinatorError> {
        for node in &self.nodes {
            let ctx = &node.context;
            let txid = ctx.txid;
            let missing = ctx.cosigners.len() - node.partials.len();
            if missing > 0 {
                return Err(CoordinatorError::IncompleteSignatures { txid, missing });
            }
            let set = node
                .aggregate
                .as_ref()
                .ok_or(CoordinatorError::NoncesNotAggregated)?;

            let partials: Vec<PartialSignature> = node.partials.values().copied().collect();
            let sig = musig::aggregate_signatures(
                &ctx.key_agg_ctx,
                &set.aggregate,
                &partials,
                &ctx.sighash,
            )
            .map_err(|source| CoordinatorError::Musig { txid, source })?;
            if !musig::verify_aggregated_signature(&ctx.output_key, &sig, &ctx.sighash) {
                return Err(CoordinatorError::InvalidSignature(txid));
            }
            let signature = schnorr::Signature::from_slice(&sig)
                .map_err(|_| CoordinatorError::InvalidSignature(txid))?;

            let tree_node = self
                .tree
                .get_mut(&txid)
                .ok_or(CoordinatorError::UnknownNode(txid))?;
            let input = &mut tree_node.psbt.inputs[0];
            input.witness_utxo = Some(ctx.prevout.clone());
            input.tap_key_sig = Some(taproot::Signature {
                signature,
                sighash_type: TapSighashType::Default,
            });
            // SIGHASH_DEFAULT: 64-byte signature, no type byte.
            input.final_script_witness = Some(Witness::from_slice(&[sig.to_vec()]));
        }

        log::info!("finalized {} tree transactions", self.nodes.len());
        Ok(self.tree)
    }
}
