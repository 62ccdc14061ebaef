//! Default VTXO contract.
//!
//! ```text
//! collaborative: <user> CHECKSIGVERIFY <server> CHECKSIG
//! unilateral:    <exit_delay> CSV DROP <user> CHECKSIG
//! ```

use ark_core::locktime::RelativeLocktime;
use ark_script::{Collaborative, TaprootTree, UnilateralExit};
use bitcoin::secp256k1::PublicKey;

use crate::contract::{assemble, Contract};
use crate::error::ContractError;
use crate::fields::{FieldMap, FieldReader, FieldWriter};
use crate::spend::SpendPath;

#[derive(Debug, Clone)]
pub struct PaymentContract {
    server: PublicKey,
    user: PublicKey,
    exit_delay: RelativeLocktime,
    paths: Vec<SpendPath>,
    tree: TaprootTree,
}

impl PaymentContract {
    pub fn new(
        server: PublicKey,
        user: PublicKey,
        exit_delay: RelativeLocktime,
    ) -> Result<Self, ContractError> {
        if server == user {
            return Err(ContractError::DuplicateParty {
                first: "server",
                second: "user",
            });
        }
        let paths = vec![
            SpendPath::collaborative("collaborative", Collaborative::new(server, &[user], None)?),
            SpendPath::unilateral("unilateral", UnilateralExit::new(exit_delay, &[user], None)?),
        ];
        let tree = assemble(&paths)?;

        Ok(Self {
            server,
            user,
            exit_delay,
            paths,
            tree,
        })
    }

    pub fn user(&self) -> PublicKey {
        self.user
    }

    pub fn exit_delay(&self) -> RelativeLocktime {
        self.exit_delay
    }
}

impl PartialEq for PaymentContract {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server && self.user == other.user && self.exit_delay == other.exit_delay
    }
}

impl Eq for PaymentContract {}

impl Contract for PaymentContract {
    const TYPE: &'static str = "payment";

    fn server(&self) -> PublicKey {
        self.server
    }

    fn paths(&self) -> &[SpendPath] {
        &self.paths
    }

    fn taproot_tree(&self) -> &TaprootTree {
        &self.tree
    }

    fn to_fields(&self) -> FieldMap {
        FieldWriter::default()
            .key("server", &self.server)
            .key("user", &self.user)
            .delay("exit_delay", self.exit_delay)
            .finish()
    }

    fn from_fields(fields: &FieldMap) -> Result<Self, ContractError> {
        let r = FieldReader::new(Self::TYPE, fields);
        Self::new(r.key("server")?, r.key("user")?, r.delay("exit_delay")?)
    }
}
