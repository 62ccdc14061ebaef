//! VHTLC conformance fixtures: addresses and taproot keys another
//! implementation derived from the same parameters, plus the error each
//! invalid parameter set must produce.

use anyhow::{anyhow, Context, Result};
use ark_contracts::contract::Contract;
use ark_contracts::{ArkAddress, ArkContract, ContractRegistry, VhtlcContract, VhtlcOptions};
use ark_core::keys::parse_public_key;
use ark_core::locktime::RelativeLocktime;
use bitcoin::absolute::LockTime;
use bitcoin::Network;
use serde::Deserialize;

#[derive(Deserialize)]
struct FixtureFile {
    network: String,
    valid: Vec<Case>,
    invalid: Vec<Case>,
}

#[derive(Deserialize)]
struct Case {
    description: String,
    server: String,
    sender: String,
    receiver: String,
    preimage_hash: String,
    refund_locktime: u32,
    unilateral_claim_delay: serde_json::Value,
    unilateral_refund_delay: serde_json::Value,
    unilateral_refund_without_receiver_delay: serde_json::Value,
    expected_taproot_key: Option<String>,
    expected_address: Option<String>,
    error: Option<String>,
}

fn fixtures() -> FixtureFile {
    serde_json::from_str(include_str!("fixtures/vhtlc.json")).unwrap()
}

fn delay(value: &serde_json::Value) -> Result<RelativeLocktime> {
    serde_json::from_value(value.clone()).map_err(|e| anyhow!("{}", e))
}

fn build(case: &Case) -> Result<VhtlcContract> {
    let options = VhtlcOptions {
        server: parse_public_key(&case.server)?,
        sender: parse_public_key(&case.sender)?,
        receiver: parse_public_key(&case.receiver)?,
        preimage_hash: hex::decode(&case.preimage_hash)?,
        refund_locktime: LockTime::from_consensus(case.refund_locktime),
        unilateral_claim_delay: delay(&case.unilateral_claim_delay)?,
        unilateral_refund_delay: delay(&case.unilateral_refund_delay)?,
        unilateral_refund_without_receiver_delay: delay(
            &case.unilateral_refund_without_receiver_delay,
        )?,
    };
    Ok(VhtlcContract::new(options)?)
}

fn network(name: &str) -> Network {
    match name {
        "bitcoin" => Network::Bitcoin,
        "testnet" => Network::Testnet,
        "signet" => Network::Signet,
        _ => Network::Regtest,
    }
}

#[test]
fn test_valid_vhtlc_fixtures() {
    let file = fixtures();
    let net = network(&file.network);
    assert!(!file.valid.is_empty());

    for case in &file.valid {
        let contract: ArkContract = build(case)
            .with_context(|| case.description.clone())
            .unwrap()
            .into();

        let key = contract.taproot_output_key().to_x_only_public_key().serialize();
        assert_eq!(
            Some(hex::encode(key)),
            case.expected_taproot_key,
            "{}",
            case.description
        );
        assert_eq!(
            Some(contract.ark_address(net).to_string()),
            case.expected_address,
            "{}",
            case.description
        );
    }
}

#[test]
fn test_invalid_vhtlc_fixtures() {
    let file = fixtures();
    assert!(!file.invalid.is_empty());

    for case in &file.invalid {
        let expected = case.error.as_deref().unwrap_or_default();
        match build(case) {
            Ok(_) => panic!("{}: expected failure", case.description),
            Err(e) => assert!(
                e.to_string().contains(expected),
                "{}: {:?} does not mention {:?}",
                case.description,
                e.to_string(),
                expected
            ),
        }
    }
}

#[test]
fn test_fixture_addresses_decode() {
    let file = fixtures();
    for case in &file.valid {
        let Some(expected) = &case.expected_address else {
            continue;
        };
        let addr: ArkAddress = expected.parse().unwrap();
        assert!(!addr.is_mainnet());
        assert_eq!(addr.to_string(), *expected);
        assert_eq!(
            addr.server().serialize().to_vec(),
            hex::decode(&case.server[2..]).unwrap()
        );
    }
}

#[test]
fn test_fixtures_survive_persistence() {
    let registry = ContractRegistry::default();
    for case in &fixtures().valid {
        let contract = build(case).unwrap();
        let fields = contract.to_fields();
        let parsed = registry.parse(VhtlcContract::TYPE, &fields).unwrap();

        let ArkContract::Vhtlc(inner) = &parsed else {
            panic!("{}: parsed into the wrong variant", case.description);
        };
        assert_eq!(*inner, contract);
        assert_eq!(parsed.serialize().1, fields);
    }
}

#[test]
fn test_control_blocks_are_deterministic() {
    let case = &fixtures().valid[0];
    let a = build(case).unwrap();
    let b = build(case).unwrap();
    for path in a.paths() {
        let ca = a.spend_info(path.name()).unwrap();
        let cb = b.spend_info(path.name()).unwrap();
        assert_eq!(ca.control_block.serialize(), cb.control_block.serialize());
        assert!(a
            .taproot_tree()
            .verify_control_block(&ca.leaf, &ca.control_block));
    }
}
