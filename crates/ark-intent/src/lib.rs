//! # ark-intent
//!
//! Intents let a VTXO holder join or leave a batch round without
//! broadcasting anything. An intent is a BIP-322 style proof of ownership:
//!
//! - `to_spend` commits to the message and to the message-signing key
//! - `to_sign` spends `to_spend:0` as input 0, followed by the holder's coins
//!   spent through their contract leaves, and declares the outputs the holder
//!   wants from the round
//!
//! The transaction is never valid on chain (input 0 spends a transaction
//! that was never mined) but every input's witness is checked under the same
//! script rules.

pub mod message;
pub mod proof;
pub mod verify;

pub use message::{DeleteMessage, IntentMessage, MessageError, RegisterMessage};
pub use proof::{
    build_intent, build_register_and_delete, message_hash, to_spend, Intent, IntentError,
    IntentInput,
};
pub use verify::{verify_intent, VerifyError};
