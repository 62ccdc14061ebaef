//! # ark-contracts
//!
//! Typed Ark contracts. Each variant turns its parameters into a set of
//! named tapscript spend paths, commits them to a taproot output under the
//! unspendable internal key, and round-trips through a flat string map so an
//! external store can persist it.
//!
//! | tag          | paths |
//! |--------------|-------|
//! | `payment`    | `collaborative`, `unilateral` |
//! | `hashlocked` | `collaborative`, `unilateral` |
//! | `vhtlc`      | `claim`, `refund`, `refund_without_receiver`, `unilateral_claim`, `unilateral_refund`, `unilateral_refund_without_receiver` |

pub mod address;
pub mod contract;
pub mod error;
pub mod fields;
pub mod hashlock;
pub mod payment;
pub mod registry;
pub mod spend;
pub mod vhtlc;

pub use address::ArkAddress;
pub use contract::ArkContract;
pub use error::ContractError;
pub use hashlock::HashLockedContract;
pub use payment::PaymentContract;
pub use registry::{ContractRecord, ContractRegistry};
pub use spend::{SpendInfo, SpendPath};
pub use vhtlc::{VhtlcContract, VhtlcOptions};
