//! The closed set of contract variants and the behaviour they share.

use std::hash::{Hash, Hasher};

use ark_core::keys::unspendable_key;
use ark_script::TaprootTree;
use bitcoin::key::TweakedPublicKey;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Network, ScriptBuf};

use crate::address::ArkAddress;
use crate::error::ContractError;
use crate::fields::FieldMap;
use crate::hashlock::HashLockedContract;
use crate::payment::PaymentContract;
use crate::spend::{SpendInfo, SpendPath};
use crate::vhtlc::VhtlcContract;

/// Shared surface of every contract variant.
pub trait Contract: Sized {
    /// Stable tag used at the persistence boundary.
    const TYPE: &'static str;

    fn server(&self) -> PublicKey;

    fn paths(&self) -> &[SpendPath];

    fn taproot_tree(&self) -> &TaprootTree;

    fn to_fields(&self) -> FieldMap;

    fn from_fields(fields: &FieldMap) -> Result<Self, ContractError>;

    fn spend_info(&self, path: &str) -> Result<SpendInfo, ContractError> {
        let spend = self
            .paths()
            .iter()
            .find(|p| p.name() == path)
            .ok_or_else(|| ContractError::UnknownPath {
                contract: Self::TYPE,
                path: path.to_string(),
            })?;
        let leaf = spend.leaf();
        let control_block = self.taproot_tree().control_block(&leaf)?;

        Ok(SpendInfo {
            path: spend.name(),
            leaf,
            control_block,
            signers: spend.signers().to_vec(),
            relative_timelock: spend.relative_timelock(),
            absolute_timelock: spend.absolute_timelock(),
            hash_lock: spend.hash_lock().cloned(),
        })
    }
}

/// Commit a contract's paths under the unspendable internal key.
pub(crate) fn assemble(paths: &[SpendPath]) -> Result<TaprootTree, ContractError> {
    let leaves: Vec<_> = paths.iter().map(SpendPath::leaf).collect();
    Ok(TaprootTree::assemble(unspendable_key()?, &leaves)?)
}

/// Any Ark contract.
///
/// Two contracts are equal, and hash equal, when they lock to the same
/// output script.
#[derive(Debug, Clone)]
pub enum ArkContract {
    Payment(PaymentContract),
    HashLocked(HashLockedContract),
    Vhtlc(VhtlcContract),
}

macro_rules! each_variant {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            ArkContract::Payment($c) => $body,
            ArkContract::HashLocked($c) => $body,
            ArkContract::Vhtlc($c) => $body,
        }
    };
}

impl ArkContract {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Payment(_) => PaymentContract::TYPE,
            Self::HashLocked(_) => HashLockedContract::TYPE,
            Self::Vhtlc(_) => VhtlcContract::TYPE,
        }
    }

    pub fn server(&self) -> PublicKey {
        each_variant!(self, c => c.server())
    }

    pub fn paths(&self) -> &[SpendPath] {
        each_variant!(self, c => c.paths())
    }

    pub fn taproot_tree(&self) -> &TaprootTree {
        each_variant!(self, c => c.taproot_tree())
    }

    pub fn spend_info(&self, path: &str) -> Result<SpendInfo, ContractError> {
        each_variant!(self, c => c.spend_info(path))
    }

    pub fn taproot_output_key(&self) -> TweakedPublicKey {
        self.taproot_tree().output_key()
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        self.taproot_tree().script_pubkey()
    }

    /// On-chain P2TR address of the contract output.
    pub fn address(&self, network: Network) -> Address {
        self.taproot_tree().address(network)
    }

    /// Off-chain Ark address (operator key plus contract output key).
    pub fn ark_address(&self, network: Network) -> ArkAddress {
        ArkAddress::new(
            network,
            self.server().x_only_public_key().0,
            self.taproot_output_key(),
        )
    }

    /// `(type tag, fields)` for an external store.
    pub fn serialize(&self) -> (String, FieldMap) {
        (
            self.type_tag().to_string(),
            each_variant!(self, c => c.to_fields()),
        )
    }
}

impl PartialEq for ArkContract {
    fn eq(&self, other: &Self) -> bool {
        self.script_pubkey() == other.script_pubkey()
    }
}

impl Eq for ArkContract {}

impl Hash for ArkContract {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.script_pubkey().hash(state);
    }
}

impl From<PaymentContract> for ArkContract {
    fn from(c: PaymentContract) -> Self {
        Self::Payment(c)
    }
}

impl From<HashLockedContract> for ArkContract {
    fn from(c: HashLockedContract) -> Self {
        Self::HashLocked(c)
    }
}

impl From<VhtlcContract> for ArkContract {
    fn from(c: VhtlcContract) -> Self {
        Self::Vhtlc(c)
    }
}
