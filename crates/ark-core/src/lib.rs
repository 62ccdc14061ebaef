//! # ark-core
//!
//! Primitives shared by every Ark crate in this workspace:
//!
//! - [`keys`]: public key parsing and the unspendable taproot internal key
//! - [`locktime`]: BIP-68 relative delays with the 512 second quantum
//! - [`musig`]: MuSig2 (BIP-327) helpers bridging `bitcoin` and `musig2` types
//! - [`signer`]: the abstract signing capability consumed by sessions and intents
//! - [`terms`]: operator terms loaded from TOML with environment overrides

pub mod keys;
pub mod locktime;
pub mod musig;
pub mod signer;
pub mod terms;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use keys::{parse_public_key, unspendable_key, KeyError, UNSPENDABLE_KEY};
pub use locktime::{LocktimeError, RelativeLocktime, SECONDS_QUANTUM};
pub use signer::{ArkSigner, KeypairSigner, SignerError};
pub use terms::ArkTerms;
