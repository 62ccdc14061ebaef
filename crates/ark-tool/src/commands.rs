//! Command implementations.

use std::path::Path;

use anyhow::{bail, Context, Result};
use ark_contracts::{
    ArkContract, ContractRecord, ContractRegistry, PaymentContract, VhtlcContract, VhtlcOptions,
};
use ark_core::keys::parse_public_key;
use ark_core::locktime::RelativeLocktime;
use ark_core::signer::ArkSigner;
use ark_core::KeypairSigner;
use ark_intent::{build_intent, verify_intent, DeleteMessage, IntentInput, IntentMessage};
use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Amount, OutPoint, TxOut};
use serde::Deserialize;

use crate::Options;

pub fn load_contract(path: &Path) -> Result<ArkContract> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read contract file {}", path.display()))?;
    let record: ContractRecord =
        serde_json::from_str(&contents).context("Contract file is not a valid contract record")?;
    let contract = ContractRegistry::default()
        .parse_record(&record)
        .with_context(|| format!("Invalid {} contract", record.tag))?;
    log::debug!("loaded {} contract from {}", record.tag, path.display());
    Ok(contract)
}

fn warn_on_foreign_server(options: &Options, contract: &ArkContract) {
    let Some(terms) = &options.terms else {
        return;
    };
    match terms.server_key() {
        Ok(key) if key != contract.server() => {
            log::warn!("contract server key {} differs from the operator's {}", contract.server(), key);
        }
        _ => {}
    }
}

pub fn show_terms(options: &Options) -> Result<()> {
    let terms = options
        .terms
        .as_ref()
        .context("terms requires --terms <PATH>")?;

    println!("✅ Operator terms are valid.");
    println!("  Network:              {}", terms.network);
    println!("  Server key:           {}", terms.server_pubkey);
    println!("  Dust:                 {}", terms.dust());
    println!("  Unilateral exit:      {}", terms.unilateral_exit_delay);
    println!("  Boarding exit:        {}", terms.boarding_exit_delay);
    println!("  Batch sweep:          {}", terms.batch_sweep_delay);
    Ok(())
}

pub fn address(options: &Options, path: &Path) -> Result<()> {
    let contract = load_contract(path)?;
    warn_on_foreign_server(options, &contract);

    println!("type:          {}", contract.type_tag());
    println!(
        "output key:    {}",
        hex::encode(contract.taproot_output_key().to_x_only_public_key().serialize())
    );
    println!("address:       {}", contract.address(options.network));
    println!("ark address:   {}", contract.ark_address(options.network));
    Ok(())
}

pub fn paths(options: &Options, path: &Path) -> Result<()> {
    let contract = load_contract(path)?;
    warn_on_foreign_server(options, &contract);

    for spend in contract.paths() {
        let info = contract.spend_info(spend.name())?;
        println!("{}", info.path);
        println!("  script:        {}", info.leaf.script().to_hex_string());
        println!("  control block: {}", hex::encode(info.control_block.serialize()));
        println!("  sequence:      {:#010x}", info.sequence().to_consensus_u32());
        if let Some(lock) = info.absolute_timelock {
            println!("  locktime:      {}", lock);
        }
        println!("  signers:       {}", info.signers.len());
        if info.needs_preimage() {
            println!("  needs preimage");
        }
    }
    Ok(())
}

pub fn payment(options: &Options, user: &str) -> Result<()> {
    let terms = options
        .terms
        .as_ref()
        .context("payment requires --terms <PATH>")?;
    let user = parse_public_key(user).context("Invalid user public key")?;
    let contract: ArkContract =
        PaymentContract::new(terms.server_key()?, user, terms.unilateral_exit_delay)?.into();

    let record = ContractRecord::from(&contract);
    println!("{}", serde_json::to_string_pretty(&record)?);
    log::info!("ark address {}", contract.ark_address(options.network));
    Ok(())
}

#[derive(Deserialize)]
struct FixtureFile {
    network: String,
    valid: Vec<FixtureCase>,
    #[serde(default)]
    invalid: Vec<FixtureCase>,
}

#[derive(Deserialize)]
struct FixtureCase {
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

fn fixture_contract(case: &FixtureCase) -> Result<VhtlcContract> {
    let delay = |v: &serde_json::Value| -> Result<RelativeLocktime> {
        serde_json::from_value(v.clone()).map_err(|e| anyhow::anyhow!("{}", e))
    };
    Ok(VhtlcContract::new(VhtlcOptions {
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
    })?)
}

pub fn check_fixtures(path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixtures {}", path.display()))?;
    let file: FixtureFile = serde_json::from_str(&contents).context("Malformed fixture file")?;
    let network = file
        .network
        .parse::<bitcoin::Network>()
        .with_context(|| format!("Unknown fixture network {}", file.network))?;

    let mut failures = 0usize;
    for case in &file.valid {
        let result = fixture_contract(case).map(ArkContract::from).map(|c| {
            (
                hex::encode(c.taproot_output_key().to_x_only_public_key().serialize()),
                c.ark_address(network).to_string(),
            )
        });
        match result {
            Ok((key, addr))
                if Some(&key) == case.expected_taproot_key.as_ref()
                    && Some(&addr) == case.expected_address.as_ref() =>
            {
                println!("✅ {}", case.description);
            }
            Ok((key, addr)) => {
                failures += 1;
                println!("❌ {}: got {} / {}", case.description, key, addr);
            }
            Err(e) => {
                failures += 1;
                println!("❌ {}: {:#}", case.description, e);
            }
        }
    }
    for case in &file.invalid {
        let expected = case.error.as_deref().unwrap_or_default();
        match fixture_contract(case) {
            Err(e) if format!("{:#}", e).contains(expected) => {
                println!("✅ {} (rejected)", case.description);
            }
            Err(e) => {
                failures += 1;
                println!("❌ {}: wrong error {:#}", case.description, e);
            }
            Ok(_) => {
                failures += 1;
                println!("❌ {}: accepted", case.description);
            }
        }
    }

    if failures > 0 {
        bail!("{} fixture(s) failed", failures);
    }
    Ok(())
}

/// `sign-intent <CONTRACT.json> <PATH> <TXID:VOUT> <SATS> <SECRET_HEX> [EXPIRE_AT]`
///
/// The secret key signs both the spend path and the message.
pub async fn sign_intent(options: &Options, params: &[String]) -> Result<()> {
    let [contract_path, path, outpoint, sats, secret, rest @ ..] = params else {
        bail!("sign-intent needs <CONTRACT.json> <PATH> <TXID:VOUT> <SATS> <SECRET_HEX>");
    };
    let contract = load_contract(Path::new(contract_path))?;
    warn_on_foreign_server(options, &contract);
    let outpoint: OutPoint = outpoint.parse().context("Invalid outpoint")?;
    let value = Amount::from_sat(sats.parse().context("Invalid amount")?);
    let secret = SecretKey::from_slice(&hex::decode(secret).context("Secret key is not hex")?)
        .context("Invalid secret key")?;
    let expire_at = match rest.first() {
        Some(v) => v.parse().context("Invalid expire_at")?,
        None => 0,
    };

    let signer = KeypairSigner::new(secret);
    let message = IntentMessage::Delete(DeleteMessage { expire_at }).to_payload()?;
    let input = IntentInput {
        outpoint,
        prevout: TxOut {
            value,
            script_pubkey: contract.script_pubkey(),
        },
        contract: &contract,
        path,
        signers: vec![&signer as &dyn ArkSigner],
        preimage: None,
    };
    let intent = build_intent(&message, &signer, &[input], &[]).await?;

    let tx = intent.transaction();
    verify_intent(
        &message,
        &signer.x_only_public_key(),
        &tx,
        &intent.prevouts(),
        None,
    )
    .context("Signed intent does not verify")?;

    println!("message: {}", String::from_utf8_lossy(&intent.message));
    println!("psbt:    {}", hex::encode(intent.psbt.serialize()));
    Ok(())
}
