//! Virtual hashed time-locked contract for swaps.
//!
//! Sender `A` pays receiver `B` against the preimage of `H`, with the
//! operator `S` co-signing the off-chain paths:
//!
//! ```text
//! claim:                              HASH160 <H> EQUAL VERIFY  B + S
//! refund:                                                       A + B + S
//! refund_without_receiver:            <T> CLTV DROP             A + S
//! unilateral_claim:                   HASH160 <H> EQUAL VERIFY  <d1> CSV DROP  B
//! unilateral_refund:                                            <d2> CSV DROP  A + B
//! unilateral_refund_without_receiver:                           <d3> CSV DROP  A
//! ```

use ark_core::locktime::RelativeLocktime;
use ark_script::{AbsoluteTimelock, Collaborative, HashKind, HashLock, TaprootTree, UnilateralExit};
use bitcoin::absolute::LockTime;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::PublicKey;

use crate::contract::{assemble, Contract};
use crate::error::ContractError;
use crate::fields::{FieldMap, FieldReader, FieldWriter};
use crate::spend::SpendPath;

pub const CLAIM: &str = "claim";
pub const REFUND: &str = "refund";
pub const REFUND_WITHOUT_RECEIVER: &str = "refund_without_receiver";
pub const UNILATERAL_CLAIM: &str = "unilateral_claim";
pub const UNILATERAL_REFUND: &str = "unilateral_refund";
pub const UNILATERAL_REFUND_WITHOUT_RECEIVER: &str = "unilateral_refund_without_receiver";

/// Parameters of a VHTLC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhtlcOptions {
    pub server: PublicKey,
    pub sender: PublicKey,
    pub receiver: PublicKey,
    /// HASH160 of the preimage
    pub preimage_hash: Vec<u8>,
    pub refund_locktime: LockTime,
    pub unilateral_claim_delay: RelativeLocktime,
    pub unilateral_refund_delay: RelativeLocktime,
    pub unilateral_refund_without_receiver_delay: RelativeLocktime,
}

#[derive(Debug, Clone)]
pub struct VhtlcContract {
    options: VhtlcOptions,
    paths: Vec<SpendPath>,
    tree: TaprootTree,
}

/// HASH160 of a swap preimage, as committed by the claim paths.
pub fn preimage_hash(preimage: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(preimage).to_byte_array()
}

impl VhtlcContract {
    pub fn new(options: VhtlcOptions) -> Result<Self, ContractError> {
        let VhtlcOptions {
            server,
            sender,
            receiver,
            ..
        } = options;

        for (first, a, second, b) in [
            ("server", server, "sender", sender),
            ("server", server, "receiver", receiver),
            ("sender", sender, "receiver", receiver),
        ] {
            if a == b {
                return Err(ContractError::DuplicateParty { first, second });
            }
        }

        let hash_lock = HashLock::new(HashKind::Hash160, &options.preimage_hash)?;
        if options.refund_locktime.to_consensus_u32() == 0 {
            return Err(ContractError::ZeroRefundLocktime);
        }
        let refund_lock = AbsoluteTimelock::new(options.refund_locktime)?;

        let paths = vec![
            SpendPath::collaborative(
                CLAIM,
                Collaborative::new(server, &[receiver], Some(hash_lock.clone().into()))?,
            ),
            SpendPath::collaborative(REFUND, Collaborative::new(server, &[sender, receiver], None)?),
            SpendPath::collaborative(
                REFUND_WITHOUT_RECEIVER,
                Collaborative::new(server, &[sender], None)?,
            )
            .after(refund_lock),
            SpendPath::unilateral(
                UNILATERAL_CLAIM,
                UnilateralExit::new(
                    options.unilateral_claim_delay,
                    &[receiver],
                    Some(hash_lock.into()),
                )?,
            ),
            SpendPath::unilateral(
                UNILATERAL_REFUND,
                UnilateralExit::new(options.unilateral_refund_delay, &[sender, receiver], None)?,
            ),
            SpendPath::unilateral(
                UNILATERAL_REFUND_WITHOUT_RECEIVER,
                UnilateralExit::new(options.unilateral_refund_without_receiver_delay, &[sender], None)?,
            ),
        ];
        let tree = assemble(&paths)?;

        log::debug!(
            "vhtlc built: locktime {}, delays {}/{}/{}",
            options.refund_locktime,
            options.unilateral_claim_delay,
            options.unilateral_refund_delay,
            options.unilateral_refund_without_receiver_delay
        );

        Ok(Self {
            options,
            paths,
            tree,
        })
    }

    pub fn options(&self) -> &VhtlcOptions {
        &self.options
    }

    pub fn sender(&self) -> PublicKey {
        self.options.sender
    }

    pub fn receiver(&self) -> PublicKey {
        self.options.receiver
    }
}

impl PartialEq for VhtlcContract {
    fn eq(&self, other: &Self) -> bool {
        self.options == other.options
    }
}

impl Eq for VhtlcContract {}

impl Contract for VhtlcContract {
    const TYPE: &'static str = "vhtlc";

    fn server(&self) -> PublicKey {
        self.options.server
    }

    fn paths(&self) -> &[SpendPath] {
        &self.paths
    }

    fn taproot_tree(&self) -> &TaprootTree {
        &self.tree
    }

    fn to_fields(&self) -> FieldMap {
        let o = &self.options;
        FieldWriter::default()
            .key("server", &o.server)
            .key("sender", &o.sender)
            .key("receiver", &o.receiver)
            .bytes("preimage_hash", &o.preimage_hash)
            .locktime("refund_locktime", o.refund_locktime)
            .delay("unilateral_claim_delay", o.unilateral_claim_delay)
            .delay("unilateral_refund_delay", o.unilateral_refund_delay)
            .delay(
                "unilateral_refund_without_receiver_delay",
                o.unilateral_refund_without_receiver_delay,
            )
            .finish()
    }

    fn from_fields(fields: &FieldMap) -> Result<Self, ContractError> {
        let r = FieldReader::new(Self::TYPE, fields);
        Self::new(VhtlcOptions {
            server: r.key("server")?,
            sender: r.key("sender")?,
            receiver: r.key("receiver")?,
            preimage_hash: r.bytes("preimage_hash")?,
            refund_locktime: r.locktime("refund_locktime")?,
            unilateral_claim_delay: r.delay("unilateral_claim_delay")?,
            unilateral_refund_delay: r.delay("unilateral_refund_delay")?,
            unilateral_refund_without_receiver_delay: r
                .delay("unilateral_refund_without_receiver_delay")?,
        })
    }
}
