//! # ark-script
//!
//! Tapscript building blocks for Ark contracts.
//!
//! - [`fragment`]: hash locks, time locks, N-of-N multisig and the
//!   collaborative/unilateral path shapes, composable by concatenation
//! - [`taptree`]: order-invariant Huffman assembly of leaves into a taproot
//!   output with per-leaf control blocks
//!
//! # Example
//!
//! ```ignore
//! let leaf = Leaf::new(&Collaborative::new(server, &[owner], None)?);
//! let tree = TaprootTree::assemble(unspendable_key()?, &[leaf])?;
//! let spk = tree.script_pubkey();
//! ```

pub mod fragment;
pub mod taptree;

pub use fragment::{
    AbsoluteTimelock, Collaborative, Fragment, HashKind, HashLock, Leaf, NofNMultisig,
    ScriptError, ScriptFragment, ScriptOp, UnilateralExit,
};
pub use taptree::{TaprootTree, TreeError};
