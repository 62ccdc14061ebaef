//! ark-tool: inspect Ark contracts from the command line.
//!
//! # Usage
//!
//! ```bash
//! ark-tool --terms terms.toml terms
//! ark-tool --network signet address contract.json
//! ark-tool paths contract.json
//! ark-tool check-fixtures crates/ark-contracts/tests/fixtures/vhtlc.json
//! ```

mod commands;

use anyhow::{Context, Result};
use ark_core::ArkTerms;
use bitcoin::Network;
use std::path::PathBuf;

/// Options shared by every command.
pub struct Options {
    pub terms: Option<ArkTerms>,
    pub network: Network,
}

fn main() -> Result<()> {
    // Parse CLI args (minimal, no clap)
    let args: Vec<String> = std::env::args().collect();

    let mut terms_path: Option<PathBuf> = None;
    let mut network_arg: Option<String> = None;
    let mut log_level = String::from("info");
    let mut rest: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--terms" | "-t" => {
                i += 1;
                let path = args.get(i).context("--terms requires a path argument")?;
                terms_path = Some(PathBuf::from(path));
            }
            "--network" | "-n" => {
                i += 1;
                network_arg = Some(args.get(i).context("--network requires a name")?.clone());
            }
            "--log-level" => {
                i += 1;
                log_level = args.get(i).context("--log-level requires a level")?.clone();
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("ark-tool {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    // RUST_LOG wins over --log-level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level)).init();

    let terms = match &terms_path {
        Some(path) => {
            let mut terms = ArkTerms::from_file(path)
                .with_context(|| format!("Failed to load terms from {}", path.display()))?;
            terms
                .apply_env_overrides()
                .context("Invalid ARK_* environment override")?;
            terms.validate().context("Operator terms validation failed")?;
            Some(terms)
        }
        None => None,
    };

    let network = match (&network_arg, &terms) {
        (Some(name), _) => name
            .parse::<Network>()
            .with_context(|| format!("Unknown network: {}", name))?,
        (None, Some(terms)) => terms.network()?,
        (None, None) => Network::Regtest,
    };
    log::debug!("using network {}", network);

    let options = Options { terms, network };

    let Some((command, params)) = rest.split_first() else {
        print_help();
        anyhow::bail!("no command given");
    };

    match command.as_str() {
        "terms" => commands::show_terms(&options),
        "address" => commands::address(&options, &one_path(params, "address")?),
        "paths" => commands::paths(&options, &one_path(params, "paths")?),
        "payment" => {
            let user = params.first().context("payment requires a user public key")?;
            commands::payment(&options, user)
        }
        "check-fixtures" => commands::check_fixtures(&one_path(params, "check-fixtures")?),
        "sign-intent" => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
            rt.block_on(commands::sign_intent(&options, params))
        }
        other => anyhow::bail!("Unknown command: {}", other),
    }
}

fn one_path(params: &[String], command: &str) -> Result<PathBuf> {
    match params {
        [path] => Ok(PathBuf::from(path)),
        _ => anyhow::bail!("{} takes exactly one file argument", command),
    }
}

fn print_help() {
    println!(
        r#"ark-tool: Ark contract helper

USAGE:
    ark-tool [OPTIONS] <COMMAND> [ARGS]

OPTIONS:
    -t, --terms <PATH>      Operator terms file (TOML)
    -n, --network <NAME>    bitcoin/testnet/signet/regtest (default: from terms, else regtest)
    --log-level <LEVEL>     error/warn/info/debug/trace (RUST_LOG takes precedence)
    -h, --help              Show this help message
    -V, --version           Show version

COMMANDS:
    terms                           Validate the operator terms and print them
    address <CONTRACT.json>         Print output key, on-chain address and Ark address
    paths <CONTRACT.json>           Print every spend path with its leaf and control block
    payment <USER_PUBKEY>           Print the default VTXO contract for a user (needs --terms)
    check-fixtures <VHTLC.json>     Re-derive every VHTLC fixture vector
    sign-intent <CONTRACT.json> <PATH> <TXID:VOUT> <SATS> <SECRET_HEX> [EXPIRE_AT]
                                    Sign a delete intent for one coin and verify it

ENVIRONMENT VARIABLES (override the terms file):
    ARK_NETWORK                 Network name
    ARK_SERVER_PUBKEY           Operator public key (hex)
    ARK_DUST_SATS               Dust limit in sats
    ARK_UNILATERAL_EXIT_DELAY   blocks:<n> or seconds:<n>
    ARK_BOARDING_EXIT_DELAY     blocks:<n> or seconds:<n>
    ARK_SWEEP_DELAY             blocks:<n> or seconds:<n>

CONTRACT FILES:
    {{ "type": "vhtlc", "fields": {{ "server": "02..", ... }} }}
"#
    );
}
