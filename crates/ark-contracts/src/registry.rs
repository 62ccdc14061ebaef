//! Tag-keyed parsing of persisted contracts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::contract::{ArkContract, Contract};
use crate::error::ContractError;
use crate::fields::FieldMap;
use crate::hashlock::HashLockedContract;
use crate::payment::PaymentContract;
use crate::vhtlc::VhtlcContract;

pub type ContractParser = fn(&FieldMap) -> Result<ArkContract, ContractError>;

/// A persisted contract: its type tag and field map.
///
/// ```json
/// { "type": "payment", "fields": { "server": "02..", "user": "03..", "exit_delay": "144" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    #[serde(rename = "type")]
    pub tag: String,
    pub fields: FieldMap,
}

impl From<&ArkContract> for ContractRecord {
    fn from(contract: &ArkContract) -> Self {
        let (tag, fields) = contract.serialize();
        Self { tag, fields }
    }
}

/// Maps a contract type tag to the parser that rebuilds it.
#[derive(Clone)]
pub struct ContractRegistry {
    parsers: HashMap<String, ContractParser>,
}

fn parse_as<C>(fields: &FieldMap) -> Result<ArkContract, ContractError>
where
    C: Contract + Into<ArkContract>,
{
    C::from_fields(fields).map(Into::into)
}

impl ContractRegistry {
    /// A registry with no parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register (or replace) the parser for `tag`.
    pub fn register(&mut self, tag: &str, parser: ContractParser) -> Option<ContractParser> {
        self.parsers.insert(tag.to_string(), parser)
    }

    pub fn parse(&self, tag: &str, fields: &FieldMap) -> Result<ArkContract, ContractError> {
        let parser = self
            .parsers
            .get(tag)
            .ok_or_else(|| ContractError::UnknownType(tag.to_string()))?;
        parser(fields)
    }

    pub fn parse_record(&self, record: &ContractRecord) -> Result<ArkContract, ContractError> {
        self.parse(&record.tag, &record.fields)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl Default for ContractRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(PaymentContract::TYPE, parse_as::<PaymentContract>);
        registry.register(HashLockedContract::TYPE, parse_as::<HashLockedContract>);
        registry.register(VhtlcContract::TYPE, parse_as::<VhtlcContract>);
        registry
    }
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_core::locktime::RelativeLocktime;
    use ark_core::test_utils::test_keypair;

    #[test]
    fn test_default_tags() {
        assert_eq!(
            ContractRegistry::default().tags(),
            vec!["hashlocked", "payment", "vhtlc"]
        );
    }

    #[test]
    fn test_parse_serialized() {
        let contract: ArkContract = PaymentContract::new(
            test_keypair(1).1,
            test_keypair(2).1,
            RelativeLocktime::Blocks(144),
        )
        .unwrap()
        .into();
        let (tag, fields) = contract.serialize();
        let parsed = ContractRegistry::default().parse(&tag, &fields).unwrap();
        assert_eq!(parsed, contract);
    }

    #[test]
    fn test_record_json() {
        let contract: ArkContract = PaymentContract::new(
            test_keypair(1).1,
            test_keypair(2).1,
            RelativeLocktime::Blocks(144),
        )
        .unwrap()
        .into();
        let json = serde_json::to_string(&ContractRecord::from(&contract)).unwrap();
        assert!(json.starts_with(r#"{"type":"payment","fields":{"#));

        let record: ContractRecord = serde_json::from_str(&json).unwrap();
        let parsed = ContractRegistry::default().parse_record(&record).unwrap();
        assert_eq!(parsed, contract);
    }

    #[test]
    fn test_unknown_tag() {
        let err = ContractRegistry::default()
            .parse("escrow", &FieldMap::new())
            .unwrap_err();
        assert_eq!(err, ContractError::UnknownType("escrow".into()));
        assert!(ContractRegistry::empty()
            .parse("payment", &FieldMap::new())
            .is_err());
    }

    #[test]
    fn test_missing_field_names_contract() {
        let err = ContractRegistry::default()
            .parse("vhtlc", &FieldMap::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "incomplete vhtlc contract: missing field server");
    }
}
