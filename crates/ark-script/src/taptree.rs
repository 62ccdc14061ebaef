//! Taproot tree assembly.
//!
//! Leaves are combined Huffman-style: the two lightest nodes are merged until
//! one root remains. Ties are broken by node hash, so the result depends only
//! on the *set* of leaves and never on the order they were supplied in. This
//! is the same rule `TaprootBuilder::with_huffman_tree` follows, which keeps
//! us byte-compatible with other taproot tooling.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use bitcoin::key::{TweakedPublicKey, XOnlyPublicKey};
use bitcoin::secp256k1::{Parity, Secp256k1};
use bitcoin::taproot::{ControlBlock, NodeInfo, TapNodeHash, TaprootSpendInfo};
use bitcoin::{Address, Network, ScriptBuf};
use thiserror::Error;

use crate::fragment::Leaf;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("taproot tree needs at least one leaf")]
    NoLeaves,

    #[error("duplicate leaf script: {0}")]
    DuplicateLeaf(String),

    #[error("leaf weight overflow")]
    WeightOverflow,

    #[error("taproot construction failed: {0}")]
    Taproot(String),

    #[error("leaf is not part of this tree: {0}")]
    UnknownLeaf(String),
}

/// A taproot output committing to a set of leaves.
#[derive(Debug, Clone)]
pub struct TaprootTree {
    internal_key: XOnlyPublicKey,
    leaves: Vec<Leaf>,
    spend_info: TaprootSpendInfo,
}

impl TaprootTree {
    /// Assemble with every leaf weighted equally.
    pub fn assemble(internal_key: XOnlyPublicKey, leaves: &[Leaf]) -> Result<Self, TreeError> {
        let weighted: Vec<(u32, Leaf)> = leaves.iter().map(|l| (1, l.clone())).collect();
        Self::assemble_weighted(internal_key, &weighted)
    }

    /// Assemble with caller-chosen weights. Heavier leaves end up closer to
    /// the root and get shorter control blocks.
    pub fn assemble_weighted(
        internal_key: XOnlyPublicKey,
        leaves: &[(u32, Leaf)],
    ) -> Result<Self, TreeError> {
        if leaves.is_empty() {
            return Err(TreeError::NoLeaves);
        }

        let mut seen = HashSet::new();
        for (_, leaf) in leaves {
            if !seen.insert(leaf.leaf_hash()) {
                return Err(TreeError::DuplicateLeaf(leaf.script().to_hex_string()));
            }
        }

        let mut heap: BinaryHeap<(Reverse<u32>, NodeInfo)> = leaves
            .iter()
            .map(|(weight, leaf)| {
                let node = NodeInfo::new_leaf_with_ver(leaf.script().clone(), leaf.version());
                (Reverse(*weight), node)
            })
            .collect();

        while heap.len() > 1 {
            let (Some((Reverse(w1), a)), Some((Reverse(w2), b))) = (heap.pop(), heap.pop()) else {
                break;
            };
            let weight = w1.checked_add(w2).ok_or(TreeError::WeightOverflow)?;
            let branch = NodeInfo::combine(a, b).map_err(|e| TreeError::Taproot(e.to_string()))?;
            heap.push((Reverse(weight), branch));
        }

        let (_, root) = heap.pop().ok_or(TreeError::NoLeaves)?;
        let secp = Secp256k1::verification_only();
        let spend_info = TaprootSpendInfo::from_node_info(&secp, internal_key, root);

        log::debug!(
            "assembled taproot tree: {} leaves, output key {}",
            leaves.len(),
            spend_info.output_key()
        );

        Ok(Self {
            internal_key,
            leaves: leaves.iter().map(|(_, l)| l.clone()).collect(),
            spend_info,
        })
    }

    pub fn internal_key(&self) -> XOnlyPublicKey {
        self.internal_key
    }

    pub fn output_key(&self) -> TweakedPublicKey {
        self.spend_info.output_key()
    }

    pub fn parity(&self) -> Parity {
        self.spend_info.output_key_parity()
    }

    pub fn merkle_root(&self) -> Option<TapNodeHash> {
        self.spend_info.merkle_root()
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn spend_info(&self) -> &TaprootSpendInfo {
        &self.spend_info
    }

    pub fn control_block(&self, leaf: &Leaf) -> Result<ControlBlock, TreeError> {
        self.spend_info
            .control_block(&(leaf.script().clone(), leaf.version()))
            .ok_or_else(|| TreeError::UnknownLeaf(leaf.script().to_hex_string()))
    }

    /// Check a control block against this tree's output key.
    pub fn verify_control_block(&self, leaf: &Leaf, control_block: &ControlBlock) -> bool {
        let secp = Secp256k1::verification_only();
        control_block.verify_taproot_commitment(
            &secp,
            self.output_key().to_x_only_public_key(),
            leaf.script(),
        )
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(self.output_key())
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2tr_tweaked(self.output_key(), network)
    }
}
