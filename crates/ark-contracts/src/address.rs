//! Ark addresses.
//!
//! An Ark address names a VTXO output under a given operator: bech32m with
//! HRP `ark` on mainnet and `tark` elsewhere, over
//! `version (0) || operator x-only key || vtxo taproot output key`.

use std::fmt;
use std::str::FromStr;

use bitcoin::bech32::{self, Bech32m, Hrp};
use bitcoin::key::{TweakedPublicKey, XOnlyPublicKey};
use bitcoin::{Network, ScriptBuf};

use crate::error::ContractError;

const MAINNET_HRP: &str = "ark";
const TESTNET_HRP: &str = "tark";
const VERSION: u8 = 0;
const PAYLOAD_LEN: usize = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArkAddress {
    mainnet: bool,
    server: XOnlyPublicKey,
    vtxo_key: TweakedPublicKey,
}

impl ArkAddress {
    pub fn new(network: Network, server: XOnlyPublicKey, vtxo_key: TweakedPublicKey) -> Self {
        Self {
            mainnet: network == Network::Bitcoin,
            server,
            vtxo_key,
        }
    }

    pub fn is_mainnet(&self) -> bool {
        self.mainnet
    }

    pub fn server(&self) -> XOnlyPublicKey {
        self.server
    }

    pub fn vtxo_key(&self) -> TweakedPublicKey {
        self.vtxo_key
    }

    /// P2TR script of the VTXO this address points at.
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(self.vtxo_key)
    }

    fn hrp(&self) -> &'static str {
        if self.mainnet {
            MAINNET_HRP
        } else {
            TESTNET_HRP
        }
    }

    pub fn encode(&self) -> Result<String, ContractError> {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.push(VERSION);
        payload.extend_from_slice(&self.server.serialize());
        payload.extend_from_slice(&self.vtxo_key.to_x_only_public_key().serialize());

        let hrp = Hrp::parse(self.hrp()).map_err(|e| ContractError::Address(e.to_string()))?;
        bech32::encode::<Bech32m>(hrp, &payload).map_err(|e| ContractError::Address(e.to_string()))
    }

    pub fn decode(s: &str) -> Result<Self, ContractError> {
        let (hrp, payload) = bech32::decode(s).map_err(|e| ContractError::Address(e.to_string()))?;

        // bech32::decode accepts both checksums; re-encode to pin bech32m.
        let canonical = bech32::encode::<Bech32m>(hrp, &payload)
            .map_err(|e| ContractError::Address(e.to_string()))?;
        if canonical.to_lowercase() != s.to_lowercase() {
            return Err(ContractError::Address("not a bech32m string".into()));
        }

        let mainnet = match hrp.to_string().to_lowercase().as_str() {
            MAINNET_HRP => true,
            TESTNET_HRP => false,
            other => return Err(ContractError::Address(format!("unknown prefix {}", other))),
        };
        if payload.len() != PAYLOAD_LEN {
            return Err(ContractError::Address(format!(
                "expected {} byte payload, got {}",
                PAYLOAD_LEN,
                payload.len()
            )));
        }
        if payload[0] != VERSION {
            return Err(ContractError::Address(format!(
                "unsupported version {}",
                payload[0]
            )));
        }

        let server = XOnlyPublicKey::from_slice(&payload[1..33])
            .map_err(|e| ContractError::Address(format!("server key: {}", e)))?;
        let vtxo = XOnlyPublicKey::from_slice(&payload[33..])
            .map_err(|e| ContractError::Address(format!("vtxo key: {}", e)))?;

        Ok(Self {
            mainnet,
            server,
            vtxo_key: TweakedPublicKey::dangerous_assume_tweaked(vtxo),
        })
    }
}

impl fmt::Display for ArkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl FromStr for ArkAddress {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
