//! Script fragments.
//!
//! Each fragment produces an ordered list of [`ScriptOp`]s. Fragments nest
//! through [`Fragment`], and a finished fragment becomes a tapscript [`Leaf`].
//!
//! # Path shapes
//!
//! ```text
//! Collaborative:  [cond OP_VERIFY] <owner_1> CHECKSIGVERIFY ... <server> CHECKSIG
//! UnilateralExit: [cond OP_VERIFY] <seq> CSV DROP <owner_1> CHECKSIGVERIFY ... <owner_n> CHECKSIG
//! ```

use std::collections::BTreeSet;
use std::fmt;

use ark_core::locktime::{LocktimeError, RelativeLocktime};
use bitcoin::absolute::LockTime;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_CLTV, OP_CSV, OP_DROP, OP_EQUAL, OP_HASH160, OP_SHA256,
    OP_VERIFY,
};
use bitcoin::opcodes::Opcode;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::LeafVersion;
use bitcoin::{Script, ScriptBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("expected a {expected} byte hash for {kind}, got {got} bytes")]
    HashLength {
        kind: HashKind,
        expected: usize,
        got: usize,
    },

    #[error("multisig needs at least one key")]
    NoKeys,

    #[error("duplicate key in multisig: {0}")]
    DuplicateKey(XOnlyPublicKey),

    #[error("{threshold}-of-{keys} multisig is not supported, every key must sign")]
    UnsupportedThreshold { threshold: usize, keys: usize },

    #[error("absolute locktime must be non-zero")]
    ZeroLocktime,

    #[error("relative locktime: {0}")]
    Locktime(#[from] LocktimeError),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("script is not minimally encoded")]
    NonCanonical,
}

/// A single script element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOp {
    Op(Opcode),
    /// Minimal integer push (`OP_0`, `OP_1..OP_16` or a script number).
    Int(i64),
    Push(PushBytesBuf),
}

/// Anything that renders to script operations.
pub trait ScriptFragment {
    fn build(&self) -> Vec<ScriptOp>;

    fn to_script(&self) -> ScriptBuf {
        ops_to_script(&self.build())
    }
}

pub fn ops_to_script(ops: &[ScriptOp]) -> ScriptBuf {
    ops.iter()
        .fold(Builder::new(), |b, op| match op {
            ScriptOp::Op(code) => b.push_opcode(*code),
            ScriptOp::Int(n) => b.push_int(*n),
            ScriptOp::Push(data) => b.push_slice(data),
        })
        .into_script()
}

fn push_key(key: &XOnlyPublicKey) -> ScriptOp {
    ScriptOp::Push(PushBytesBuf::from(key.serialize()))
}

// ─── Hash lock ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKind {
    Sha256,
    Hash160,
}

impl HashKind {
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Hash160 => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Hash160 => "hash160",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sha256" => Some(Self::Sha256),
            "hash160" => Some(Self::Hash160),
            _ => None,
        }
    }

    fn opcode(&self) -> Opcode {
        match self {
            Self::Sha256 => OP_SHA256,
            Self::Hash160 => OP_HASH160,
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// `OP_SHA256|OP_HASH160 <hash> OP_EQUAL`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashLock {
    kind: HashKind,
    hash: PushBytesBuf,
}

impl HashLock {
    pub fn new(kind: HashKind, hash: &[u8]) -> Result<Self, ScriptError> {
        if hash.len() != kind.digest_len() {
            return Err(ScriptError::HashLength {
                kind,
                expected: kind.digest_len(),
                got: hash.len(),
            });
        }
        let hash = PushBytesBuf::try_from(hash.to_vec())
            .map_err(|e| ScriptError::InvalidScript(e.to_string()))?;
        Ok(Self { kind, hash })
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    pub fn hash(&self) -> &[u8] {
        self.hash.as_bytes()
    }

    /// Whether `preimage` satisfies this lock.
    pub fn opens(&self, preimage: &[u8]) -> bool {
        use bitcoin::hashes::{hash160, sha256, Hash};

        match self.kind {
            HashKind::Sha256 => sha256::Hash::hash(preimage).as_byte_array() == self.hash(),
            HashKind::Hash160 => hash160::Hash::hash(preimage).as_byte_array() == self.hash(),
        }
    }
}

impl ScriptFragment for HashLock {
    fn build(&self) -> Vec<ScriptOp> {
        vec![
            ScriptOp::Op(self.kind.opcode()),
            ScriptOp::Push(self.hash.clone()),
            ScriptOp::Op(OP_EQUAL),
        ]
    }
}

// ─── Time locks ─────────────────────────────────────────────────────────────

/// `<locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbsoluteTimelock(LockTime);

impl AbsoluteTimelock {
    pub fn new(locktime: LockTime) -> Result<Self, ScriptError> {
        if locktime.to_consensus_u32() == 0 {
            return Err(ScriptError::ZeroLocktime);
        }
        Ok(Self(locktime))
    }

    pub fn locktime(&self) -> LockTime {
        self.0
    }
}

impl ScriptFragment for AbsoluteTimelock {
    fn build(&self) -> Vec<ScriptOp> {
        vec![
            ScriptOp::Int(self.0.to_consensus_u32() as i64),
            ScriptOp::Op(OP_CLTV),
            ScriptOp::Op(OP_DROP),
        ]
    }
}

// ─── Multisig ───────────────────────────────────────────────────────────────

/// Every key signs: `<k1> CHECKSIGVERIFY ... <kn> CHECKSIG`.
///
/// The final check leaves its result on the stack so the fragment can end a
/// leaf. Keys keep the order they were given in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NofNMultisig {
    keys: Vec<PublicKey>,
}

impl NofNMultisig {
    pub fn new(keys: &[PublicKey]) -> Result<Self, ScriptError> {
        if keys.is_empty() {
            return Err(ScriptError::NoKeys);
        }
        let mut seen = BTreeSet::new();
        for key in keys {
            let xonly = key.x_only_public_key().0;
            if !seen.insert(xonly.serialize()) {
                return Err(ScriptError::DuplicateKey(xonly));
            }
        }
        Ok(Self {
            keys: keys.to_vec(),
        })
    }

    /// Only `threshold == keys.len()` is accepted.
    pub fn with_threshold(threshold: usize, keys: &[PublicKey]) -> Result<Self, ScriptError> {
        if threshold != keys.len() {
            return Err(ScriptError::UnsupportedThreshold {
                threshold,
                keys: keys.len(),
            });
        }
        Self::new(keys)
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn x_only_keys(&self) -> Vec<XOnlyPublicKey> {
        self.keys.iter().map(|k| k.x_only_public_key().0).collect()
    }
}

impl ScriptFragment for NofNMultisig {
    fn build(&self) -> Vec<ScriptOp> {
        let keys = self.x_only_keys();
        let last = keys.len() - 1;
        keys.iter()
            .enumerate()
            .flat_map(|(i, key)| {
                let check = if i == last { OP_CHECKSIG } else { OP_CHECKSIGVERIFY };
                [push_key(key), ScriptOp::Op(check)]
            })
            .collect()
    }
}

// ─── Path shapes ────────────────────────────────────────────────────────────

fn condition_ops(condition: &Option<Box<Fragment>>) -> Vec<ScriptOp> {
    match condition {
        Some(cond) => {
            let mut ops = cond.build();
            ops.push(ScriptOp::Op(OP_VERIFY));
            ops
        }
        None => Vec::new(),
    }
}

/// Owners plus the operator, with an optional condition in front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collaborative {
    server: PublicKey,
    multisig: NofNMultisig,
    condition: Option<Box<Fragment>>,
}

impl Collaborative {
    pub fn new(
        server: PublicKey,
        owners: &[PublicKey],
        condition: Option<Fragment>,
    ) -> Result<Self, ScriptError> {
        let mut keys = owners.to_vec();
        keys.push(server);
        Ok(Self {
            server,
            multisig: NofNMultisig::new(&keys)?,
            condition: condition.map(Box::new),
        })
    }

    pub fn server(&self) -> PublicKey {
        self.server
    }

    /// Signing keys in script order (owners first, operator last).
    pub fn signers(&self) -> &[PublicKey] {
        self.multisig.keys()
    }

    pub fn condition(&self) -> Option<&Fragment> {
        self.condition.as_deref()
    }
}

impl ScriptFragment for Collaborative {
    fn build(&self) -> Vec<ScriptOp> {
        let mut ops = condition_ops(&self.condition);
        ops.extend(self.multisig.build());
        ops
    }
}

/// Owners alone after a relative delay, with an optional condition in front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnilateralExit {
    timeout: RelativeLocktime,
    owners: NofNMultisig,
    condition: Option<Box<Fragment>>,
}

impl UnilateralExit {
    pub fn new(
        timeout: RelativeLocktime,
        owners: &[PublicKey],
        condition: Option<Fragment>,
    ) -> Result<Self, ScriptError> {
        Ok(Self {
            timeout,
            owners: NofNMultisig::new(owners)?,
            condition: condition.map(Box::new),
        })
    }

    pub fn timeout(&self) -> RelativeLocktime {
        self.timeout
    }

    pub fn signers(&self) -> &[PublicKey] {
        self.owners.keys()
    }

    pub fn condition(&self) -> Option<&Fragment> {
        self.condition.as_deref()
    }
}

impl ScriptFragment for UnilateralExit {
    fn build(&self) -> Vec<ScriptOp> {
        let mut ops = condition_ops(&self.condition);
        ops.push(ScriptOp::Int(self.timeout.script_value()));
        ops.push(ScriptOp::Op(OP_CSV));
        ops.push(ScriptOp::Op(OP_DROP));
        ops.extend(self.owners.build());
        ops
    }
}

// ─── Composition ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    HashLock(HashLock),
    AbsoluteTimelock(AbsoluteTimelock),
    Multisig(NofNMultisig),
    Collaborative(Collaborative),
    UnilateralExit(UnilateralExit),
    /// Inner operations followed by `OP_VERIFY`.
    Verify(Box<Fragment>),
    /// Externally supplied script, kept as decoded operations.
    Raw(Vec<ScriptOp>),
    Composite(Vec<Fragment>),
}

impl Fragment {
    pub fn verify(inner: Fragment) -> Self {
        Self::Verify(Box::new(inner))
    }

    /// Decode an external script. Non-minimal encodings are rejected so the
    /// fragment always renders back to the exact input bytes.
    pub fn raw(script: &Script) -> Result<Self, ScriptError> {
        let ops = script
            .instructions()
            .map(|ins| match ins {
                Ok(Instruction::Op(op)) => Ok(ScriptOp::Op(op)),
                Ok(Instruction::PushBytes(data)) => Ok(ScriptOp::Push(data.to_owned())),
                Err(e) => Err(ScriptError::InvalidScript(e.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if ops_to_script(&ops).as_bytes() != script.as_bytes() {
            return Err(ScriptError::NonCanonical);
        }
        Ok(Self::Raw(ops))
    }
}

impl ScriptFragment for Fragment {
    fn build(&self) -> Vec<ScriptOp> {
        match self {
            Self::HashLock(f) => f.build(),
            Self::AbsoluteTimelock(f) => f.build(),
            Self::Multisig(f) => f.build(),
            Self::Collaborative(f) => f.build(),
            Self::UnilateralExit(f) => f.build(),
            Self::Verify(inner) => {
                let mut ops = inner.build();
                ops.push(ScriptOp::Op(OP_VERIFY));
                ops
            }
            Self::Raw(ops) => ops.clone(),
            Self::Composite(parts) => parts.iter().flat_map(|p| p.build()).collect(),
        }
    }
}

macro_rules! impl_from_fragment {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Fragment {
                fn from(f: $ty) -> Self {
                    Fragment::$ty(f)
                }
            }
        )*
    };
}

impl_from_fragment!(HashLock, AbsoluteTimelock, Collaborative, UnilateralExit);

impl From<NofNMultisig> for Fragment {
    fn from(f: NofNMultisig) -> Self {
        Fragment::Multisig(f)
    }
}

// ─── Leaf ───────────────────────────────────────────────────────────────────

/// A tapscript leaf: script bytes plus leaf version `0xc0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Leaf {
    script: ScriptBuf,
    version: LeafVersion,
}

impl Leaf {
    pub fn new<F: ScriptFragment + ?Sized>(fragment: &F) -> Self {
        Self::from_script(fragment.to_script())
    }

    pub fn from_script(script: ScriptBuf) -> Self {
        Self {
            script,
            version: LeafVersion::TapScript,
        }
    }

    pub fn script(&self) -> &ScriptBuf {
        &self.script
    }

    pub fn version(&self) -> LeafVersion {
        self.version
    }

    pub fn leaf_hash(&self) -> bitcoin::taproot::TapLeafHash {
        bitcoin::taproot::TapLeafHash::from_script(&self.script, self.version)
    }
}
