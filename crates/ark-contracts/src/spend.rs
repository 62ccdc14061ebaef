//! Named spend paths and the data needed to spend through one.

use ark_core::locktime::RelativeLocktime;
use ark_script::{AbsoluteTimelock, Collaborative, Fragment, HashLock, Leaf, UnilateralExit};
use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::ControlBlock;
use bitcoin::Sequence;

/// One tapscript leaf of a contract plus what satisfying it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPath {
    name: &'static str,
    fragment: Fragment,
    signers: Vec<PublicKey>,
    sequence: Option<RelativeLocktime>,
    locktime: Option<LockTime>,
    hash_lock: Option<HashLock>,
}

fn hash_lock_of(condition: Option<&Fragment>) -> Option<HashLock> {
    match condition {
        Some(Fragment::HashLock(lock)) => Some(lock.clone()),
        _ => None,
    }
}

impl SpendPath {
    pub fn collaborative(name: &'static str, path: Collaborative) -> Self {
        Self {
            name,
            signers: path.signers().to_vec(),
            sequence: None,
            locktime: None,
            hash_lock: hash_lock_of(path.condition()),
            fragment: path.into(),
        }
    }

    pub fn unilateral(name: &'static str, path: UnilateralExit) -> Self {
        Self {
            name,
            signers: path.signers().to_vec(),
            sequence: Some(path.timeout()),
            locktime: None,
            hash_lock: hash_lock_of(path.condition()),
            fragment: path.into(),
        }
    }

    /// Gate the path behind an absolute time lock.
    pub fn after(self, lock: AbsoluteTimelock) -> Self {
        Self {
            locktime: Some(lock.locktime()),
            fragment: Fragment::Composite(vec![lock.into(), self.fragment]),
            ..self
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn leaf(&self) -> Leaf {
        Leaf::new(&self.fragment)
    }

    /// Keys that sign this leaf, in script order.
    pub fn signers(&self) -> &[PublicKey] {
        &self.signers
    }

    pub fn relative_timelock(&self) -> Option<RelativeLocktime> {
        self.sequence
    }

    pub fn absolute_timelock(&self) -> Option<LockTime> {
        self.locktime
    }

    pub fn hash_lock(&self) -> Option<&HashLock> {
        self.hash_lock.as_ref()
    }
}

/// Everything needed to build a witness for one path of a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendInfo {
    pub path: &'static str,
    pub leaf: Leaf,
    pub control_block: ControlBlock,
    pub signers: Vec<PublicKey>,
    pub relative_timelock: Option<RelativeLocktime>,
    pub absolute_timelock: Option<LockTime>,
    pub hash_lock: Option<HashLock>,
}

impl SpendInfo {
    /// Input sequence that satisfies this path.
    ///
    /// The CSV value when there is one; otherwise a final-but-locktime-enabled
    /// sequence when a CLTV applies, else `Sequence::MAX`.
    pub fn sequence(&self) -> Sequence {
        match (self.relative_timelock, self.absolute_timelock) {
            (Some(delay), _) => delay.to_sequence(),
            (None, Some(_)) => Sequence::ENABLE_LOCKTIME_NO_RBF,
            (None, None) => Sequence::MAX,
        }
    }

    pub fn needs_preimage(&self) -> bool {
        self.hash_lock.is_some()
    }
}
