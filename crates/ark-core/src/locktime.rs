//! Relative time locks (BIP-68 / BIP-112).
//!
//! Ark delays come in two units. Block delays are 1..=65535 blocks. Second
//! delays must be expressed in whole 512 second intervals because that is the
//! granularity of the sequence field; anything else is rejected rather than
//! rounded.

use std::fmt;

use bitcoin::Sequence;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Granularity of time-based relative locks, in seconds.
pub const SECONDS_QUANTUM: u64 = 512;

const MAX_UNITS: u64 = u16::MAX as u64;
const MAX_SECONDS: u64 = MAX_UNITS * SECONDS_QUANTUM;

const DISABLE_FLAG: u32 = 1 << 31;
const TYPE_FLAG: u32 = 1 << 22;
const VALUE_MASK: u32 = 0x0000_ffff;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocktimeError {
    #[error("relative delay of {0} seconds is below the minimum of 512 seconds")]
    BelowMinimumSeconds(u64),

    #[error("relative delay of {0} seconds is not a multiple of 512")]
    NotMultipleOfQuantum(u64),

    #[error("relative delay of {0} seconds exceeds the maximum of 33553920 seconds")]
    TooManySeconds(u64),

    #[error("relative delay must be at least one block")]
    ZeroBlocks,

    #[error("relative delay of {0} blocks exceeds the maximum of 65535 blocks")]
    TooManyBlocks(u64),

    #[error("sequence {0:#010x} does not encode a relative time lock")]
    NotRelative(u32),
}

/// A validated relative delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "LocktimeRepr", into = "LocktimeRepr")]
pub enum RelativeLocktime {
    Blocks(u16),
    /// Always a non-zero multiple of [`SECONDS_QUANTUM`].
    Seconds(u32),
}

impl RelativeLocktime {
    pub fn from_blocks(blocks: u64) -> Result<Self, LocktimeError> {
        if blocks == 0 {
            return Err(LocktimeError::ZeroBlocks);
        }
        if blocks > MAX_UNITS {
            return Err(LocktimeError::TooManyBlocks(blocks));
        }
        Ok(Self::Blocks(blocks as u16))
    }

    pub fn from_seconds(seconds: u64) -> Result<Self, LocktimeError> {
        if seconds < SECONDS_QUANTUM {
            return Err(LocktimeError::BelowMinimumSeconds(seconds));
        }
        if seconds % SECONDS_QUANTUM != 0 {
            return Err(LocktimeError::NotMultipleOfQuantum(seconds));
        }
        if seconds > MAX_SECONDS {
            return Err(LocktimeError::TooManySeconds(seconds));
        }
        Ok(Self::Seconds(seconds as u32))
    }

    /// Decode a consensus sequence value.
    ///
    /// Only the bits BIP-68 assigns meaning to are accepted; a disabled lock,
    /// stray bits, or a zero delay are errors.
    pub fn from_sequence(sequence: Sequence) -> Result<Self, LocktimeError> {
        let raw = sequence.to_consensus_u32();
        if raw & DISABLE_FLAG != 0 || raw & !(TYPE_FLAG | VALUE_MASK) != 0 {
            return Err(LocktimeError::NotRelative(raw));
        }
        let value = (raw & VALUE_MASK) as u64;
        if raw & TYPE_FLAG != 0 {
            Self::from_seconds(value * SECONDS_QUANTUM)
        } else {
            Self::from_blocks(value)
        }
    }

    pub fn to_sequence(&self) -> Sequence {
        match *self {
            Self::Blocks(blocks) => Sequence::from_height(blocks),
            Self::Seconds(seconds) => {
                Sequence::from_512_second_intervals((seconds as u64 / SECONDS_QUANTUM) as u16)
            }
        }
    }

    /// The number pushed before `OP_CHECKSEQUENCEVERIFY`.
    pub fn script_value(&self) -> i64 {
        self.to_sequence().to_consensus_u32() as i64
    }

    pub fn is_seconds(&self) -> bool {
        matches!(self, Self::Seconds(_))
    }
}

impl fmt::Display for RelativeLocktime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocks(b) => write!(f, "{} blocks", b),
            Self::Seconds(s) => write!(f, "{} seconds", s),
        }
    }
}

/// Wire form: `{"type": "blocks" | "seconds", "value": n}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
enum LocktimeRepr {
    Blocks(u64),
    Seconds(u64),
}

impl TryFrom<LocktimeRepr> for RelativeLocktime {
    type Error = LocktimeError;

    fn try_from(repr: LocktimeRepr) -> Result<Self, Self::Error> {
        match repr {
            LocktimeRepr::Blocks(b) => Self::from_blocks(b),
            LocktimeRepr::Seconds(s) => Self::from_seconds(s),
        }
    }
}

impl From<RelativeLocktime> for LocktimeRepr {
    fn from(lt: RelativeLocktime) -> Self {
        match lt {
            RelativeLocktime::Blocks(b) => Self::Blocks(b as u64),
            RelativeLocktime::Seconds(s) => Self::Seconds(s as u64),
        }
    }
}
