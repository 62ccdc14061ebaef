//! Batch transaction tree, stored as an arena keyed by txid.

use std::collections::{BTreeMap, HashMap, HashSet};

use bitcoin::psbt::Psbt;
use bitcoin::{OutPoint, Transaction, TxOut, Txid};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxTreeError {
    #[error("transaction tree is empty")]
    Empty,

    #[error("node {0} appears more than once")]
    DuplicateNode(Txid),

    #[error("node {0} must have exactly one input")]
    InputCount(Txid),

    #[error("node {parent} lists unknown child {child}")]
    UnknownChild { parent: Txid, child: Txid },

    #[error("node {child} does not spend output {vout} of {parent}")]
    BrokenLink { parent: Txid, vout: u32, child: Txid },

    #[error("node {0} has more than one parent")]
    MultipleParents(Txid),

    #[error("expected one root, found {0}")]
    RootCount(usize),

    #[error("node {0} is not reachable from the root")]
    Unreachable(Txid),
}

/// One transaction of the tree plus the txids spending its outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct TxTreeNode {
    pub psbt: Psbt,
    /// Output index to child txid.
    pub children: BTreeMap<u32, Txid>,
}

impl TxTreeNode {
    pub fn new(psbt: Psbt) -> Self {
        Self {
            psbt,
            children: BTreeMap::new(),
        }
    }

    pub fn with_child(mut self, vout: u32, child: Txid) -> Self {
        self.children.insert(vout, child);
        self
    }

    pub fn txid(&self) -> Txid {
        self.psbt.unsigned_tx.compute_txid()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The outpoint this node spends.
    pub fn spends(&self) -> Option<OutPoint> {
        self.psbt.unsigned_tx.input.first().map(|i| i.previous_output)
    }

    pub fn output(&self, vout: u32) -> Option<&TxOut> {
        self.psbt.unsigned_tx.output.get(vout as usize)
    }

    /// The transaction with whatever final witnesses the PSBT carries.
    pub fn signed_tx(&self) -> Transaction {
        self.psbt.clone().extract_tx_unchecked_fee_rate()
    }
}

#[derive(Debug, Clone)]
pub struct TxTree {
    root: Txid,
    nodes: HashMap<Txid, TxTreeNode>,
    parents: HashMap<Txid, Txid>,
}

impl TxTree {
    /// Build the arena, checking that the nodes form one tree in which every
    /// child spends its parent at the mapped output.
    pub fn new(nodes: Vec<TxTreeNode>) -> Result<Self, TxTreeError> {
        if nodes.is_empty() {
            return Err(TxTreeError::Empty);
        }

        let mut arena = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let txid = node.txid();
            if node.psbt.unsigned_tx.input.len() != 1 {
                return Err(TxTreeError::InputCount(txid));
            }
            if arena.insert(txid, node).is_some() {
                return Err(TxTreeError::DuplicateNode(txid));
            }
        }

        let mut parents = HashMap::new();
        for (&parent, node) in &arena {
            for (&vout, &child) in &node.children {
                let child_node = arena
                    .get(&child)
                    .ok_or(TxTreeError::UnknownChild { parent, child })?;
                if node.output(vout).is_none()
                    || child_node.spends() != Some(OutPoint::new(parent, vout))
                {
                    return Err(TxTreeError::BrokenLink {
                        parent,
                        vout,
                        child,
                    });
                }
                if parents.insert(child, parent).is_some() {
                    return Err(TxTreeError::MultipleParents(child));
                }
            }
        }

        let roots: Vec<Txid> = arena
            .keys()
            .filter(|txid| !parents.contains_key(*txid))
            .copied()
            .collect();
        let &[root] = roots.as_slice() else {
            return Err(TxTreeError::RootCount(roots.len()));
        };

        let tree = Self {
            root,
            nodes: arena,
            parents,
        };

        // One parent each and one root: anything left over sits on a cycle.
        let seen: HashSet<Txid> = tree.iter().map(TxTreeNode::txid).collect();
        if let Some(missing) = tree.nodes.keys().find(|t| !seen.contains(*t)) {
            return Err(TxTreeError::Unreachable(*missing));
        }

        log::debug!("tx tree with {} nodes, root {}", tree.nodes.len(), root);
        Ok(tree)
    }

    pub fn root_txid(&self) -> Txid {
        self.root
    }

    pub fn root(&self) -> &TxTreeNode {
        &self.nodes[&self.root]
    }

    pub fn get(&self, txid: &Txid) -> Option<&TxTreeNode> {
        self.nodes.get(txid)
    }

    /// Mutable access for attaching signatures. Changing the unsigned
    /// transaction through this breaks the tree.
    pub fn get_mut(&mut self, txid: &Txid) -> Option<&mut TxTreeNode> {
        self.nodes.get_mut(txid)
    }

    pub fn parent(&self, txid: &Txid) -> Option<&TxTreeNode> {
        self.parents.get(txid).and_then(|p| self.nodes.get(p))
    }

    pub fn is_root(&self, txid: &Txid) -> bool {
        *txid == self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first pre-order, children in output index order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Nodes without children (the VTXO transactions).
    pub fn leaves(&self) -> impl Iterator<Item = &TxTreeNode> {
        self.iter().filter(|n| n.is_leaf())
    }
}

pub struct Iter<'a> {
    tree: &'a TxTree,
    stack: Vec<Txid>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a TxTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let txid = self.stack.pop()?;
        let node = self.tree.nodes.get(&txid)?;
        self.stack.extend(node.children.values().rev());
        Some(node)
    }
}
