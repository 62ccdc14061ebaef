//! # ark-tree
//!
//! Signing of batch transaction trees.
//!
//! A batch output is split into VTXOs by a tree of pre-signed transactions.
//! Every node spends one output of its parent through a MuSig2 key-path
//! spend, so each participant listed as a cosigner of a node must contribute
//! a partial signature before the round can commit.
//!
//! - [`tx_tree`]: the validated arena of node PSBTs
//! - [`cosigner`]: cosigner keys embedded in a node's first input
//! - [`context`]: per-node prevout, sighash and key aggregation
//! - [`session`]: one participant's signing state machine
//! - [`coordinator`]: nonce and signature aggregation on the operator side

pub mod context;
pub mod coordinator;
pub mod cosigner;
pub mod session;
pub mod tx_tree;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{node_context, ContextError, NodeContext};
pub use coordinator::{CoordinatorError, RoundCoordinator};
pub use cosigner::{add_cosigner_key, cosigner_keys, CosignerError};
pub use session::{IntegrityError, NonceSet, Precondition, SessionError, Stage, TreeSignerSession};
pub use tx_tree::{TxTree, TxTreeError, TxTreeNode};
