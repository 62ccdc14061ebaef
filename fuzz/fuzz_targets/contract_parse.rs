#![no_main]

use ark_contracts::{ContractRecord, ContractRegistry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Persisted records come from an external store and are untrusted.
    let Ok(record) = serde_json::from_slice::<ContractRecord>(data) else {
        return;
    };
    let registry = ContractRegistry::default();
    if let Ok(contract) = registry.parse_record(&record) {
        // Anything that parses must serialize back to a record that parses
        // to the same output script.
        let again = registry
            .parse_record(&ContractRecord::from(&contract))
            .expect("reserialized contract must parse");
        assert_eq!(again.script_pubkey(), contract.script_pubkey());
    }
});
