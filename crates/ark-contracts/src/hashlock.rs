//! Payment that additionally requires a hash preimage on every path.
//!
//! ```text
//! collaborative: HASH <h> EQUAL VERIFY <user> CHECKSIGVERIFY <server> CHECKSIG
//! unilateral:    HASH <h> EQUAL VERIFY <exit_delay> CSV DROP <user> CHECKSIG
//! ```

use ark_core::locktime::RelativeLocktime;
use ark_script::{Collaborative, HashKind, HashLock, TaprootTree, UnilateralExit};
use bitcoin::secp256k1::PublicKey;

use crate::contract::{assemble, Contract};
use crate::error::ContractError;
use crate::fields::{FieldMap, FieldReader, FieldWriter};
use crate::spend::SpendPath;

#[derive(Debug, Clone)]
pub struct HashLockedContract {
    server: PublicKey,
    user: PublicKey,
    hash_lock: HashLock,
    exit_delay: RelativeLocktime,
    paths: Vec<SpendPath>,
    tree: TaprootTree,
}

impl HashLockedContract {
    pub fn new(
        server: PublicKey,
        user: PublicKey,
        hash_kind: HashKind,
        hash: &[u8],
        exit_delay: RelativeLocktime,
    ) -> Result<Self, ContractError> {
        if server == user {
            return Err(ContractError::DuplicateParty {
                first: "server",
                second: "user",
            });
        }
        let hash_lock = HashLock::new(hash_kind, hash)?;

        let paths = vec![
            SpendPath::collaborative(
                "collaborative",
                Collaborative::new(server, &[user], Some(hash_lock.clone().into()))?,
            ),
            SpendPath::unilateral(
                "unilateral",
                UnilateralExit::new(exit_delay, &[user], Some(hash_lock.clone().into()))?,
            ),
        ];
        let tree = assemble(&paths)?;

        Ok(Self {
            server,
            user,
            hash_lock,
            exit_delay,
            paths,
            tree,
        })
    }

    pub fn user(&self) -> PublicKey {
        self.user
    }

    pub fn hash_lock(&self) -> &HashLock {
        &self.hash_lock
    }

    pub fn exit_delay(&self) -> RelativeLocktime {
        self.exit_delay
    }
}

impl PartialEq for HashLockedContract {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server
            && self.user == other.user
            && self.hash_lock == other.hash_lock
            && self.exit_delay == other.exit_delay
    }
}

impl Eq for HashLockedContract {}

impl Contract for HashLockedContract {
    const TYPE: &'static str = "hashlocked";

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
            .bytes("hash", self.hash_lock.hash())
            .text("hash_kind", self.hash_lock.kind().as_str())
            .delay("exit_delay", self.exit_delay)
            .finish()
    }

    fn from_fields(fields: &FieldMap) -> Result<Self, ContractError> {
        let r = FieldReader::new(Self::TYPE, fields);
        let kind_str = r.text("hash_kind")?;
        let kind = HashKind::parse(kind_str).ok_or_else(|| ContractError::InvalidField {
            field: "hash_kind",
            reason: format!("unknown hash kind {:?}", kind_str),
        })?;
        Self::new(
            r.key("server")?,
            r.key("user")?,
            kind,
            &r.bytes("hash")?,
            r.delay("exit_delay")?,
        )
    }
}
