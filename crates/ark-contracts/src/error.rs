use ark_core::keys::KeyError;
use ark_core::locktime::LocktimeError;
use ark_script::{ScriptError, TreeError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Locktime(#[from] LocktimeError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("refund locktime must be non-zero")]
    ZeroRefundLocktime,

    #[error("{first} and {second} must be different keys")]
    DuplicateParty {
        first: &'static str,
        second: &'static str,
    },

    #[error("unknown contract type: {0}")]
    UnknownType(String),

    #[error("incomplete {contract} contract: missing field {field}")]
    MissingField {
        contract: &'static str,
        field: &'static str,
    },

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown spend path {path} for {contract} contract")]
    UnknownPath {
        contract: &'static str,
        path: String,
    },

    #[error("invalid ark address: {0}")]
    Address(String),
}
