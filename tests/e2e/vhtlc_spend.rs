//! Every VHTLC leaf, spent through an intent and checked by consensus.

use ark_contracts::vhtlc::{
    preimage_hash, CLAIM, REFUND, REFUND_WITHOUT_RECEIVER, UNILATERAL_CLAIM, UNILATERAL_REFUND,
    UNILATERAL_REFUND_WITHOUT_RECEIVER,
};
use ark_contracts::{ArkContract, ContractRecord, ContractRegistry, VhtlcContract, VhtlcOptions};
use ark_core::locktime::RelativeLocktime;
use ark_core::test_utils::{test_keypair, test_signer};
use ark_core::ArkSigner;
use ark_intent::{build_intent, verify_intent, IntentInput};
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::{Amount, Network, OutPoint, TxOut, Txid};

const PREIMAGE: [u8; 32] = [0x2a; 32];
const REFUND_HEIGHT: u32 = 880_000;

fn options() -> VhtlcOptions {
    VhtlcOptions {
        server: test_keypair(1).1,
        sender: test_keypair(2).1,
        receiver: test_keypair(3).1,
        preimage_hash: preimage_hash(&PREIMAGE).to_vec(),
        refund_locktime: LockTime::from_height(REFUND_HEIGHT).unwrap(),
        unilateral_claim_delay: RelativeLocktime::Blocks(17),
        unilateral_refund_delay: RelativeLocktime::Blocks(144),
        unilateral_refund_without_receiver_delay: RelativeLocktime::from_seconds(512 * 300)
            .unwrap(),
    }
}

fn vhtlc() -> ArkContract {
    VhtlcContract::new(options()).unwrap().into()
}

#[test]
fn test_vhtlc_is_reproducible() {
    let a = vhtlc();
    let b = vhtlc();
    assert_eq!(a.serialize(), b.serialize());
    assert_eq!(a.script_pubkey(), b.script_pubkey());
    assert_eq!(
        a.ark_address(Network::Testnet).encode().unwrap(),
        b.ark_address(Network::Testnet).encode().unwrap()
    );
    for path in a.paths() {
        let (x, y) = (
            a.spend_info(path.name()).unwrap(),
            b.spend_info(path.name()).unwrap(),
        );
        assert_eq!(x.control_block.serialize(), y.control_block.serialize());
    }

    // Persist and restore through the registry.
    let json = serde_json::to_string(&ContractRecord::from(&a)).unwrap();
    let record: ContractRecord = serde_json::from_str(&json).unwrap();
    let restored = ContractRegistry::default().parse_record(&record).unwrap();
    assert_eq!(restored, a);
    assert_eq!(restored.taproot_output_key(), a.taproot_output_key());
}

#[tokio::test]
async fn test_every_leaf_spends() {
    let contract = vhtlc();
    let (server, sender, receiver) = (test_signer(1), test_signer(2), test_signer(3));
    let signers: Vec<&dyn ArkSigner> = vec![&server, &sender, &receiver];

    let paths = [
        CLAIM,
        REFUND,
        REFUND_WITHOUT_RECEIVER,
        UNILATERAL_CLAIM,
        UNILATERAL_REFUND,
        UNILATERAL_REFUND_WITHOUT_RECEIVER,
    ];
    assert_eq!(contract.paths().len(), paths.len());

    for (i, path) in paths.into_iter().enumerate() {
        let prevout = TxOut {
            value: Amount::from_sat(21_000),
            script_pubkey: contract.script_pubkey(),
        };
        let info = contract.spend_info(path).unwrap();
        let input = IntentInput {
            outpoint: OutPoint::new(Txid::from_byte_array([i as u8 + 1; 32]), 0),
            prevout: prevout.clone(),
            contract: &contract,
            path,
            signers: signers.clone(),
            preimage: info.needs_preimage().then(|| PREIMAGE.to_vec()),
        };

        let intent = build_intent(path.as_bytes(), &sender, &[input], &[])
            .await
            .unwrap_or_else(|e| panic!("{}: {}", path, e));
        let tx = intent.transaction();

        if path == REFUND_WITHOUT_RECEIVER {
            assert_eq!(tx.lock_time.to_consensus_u32(), REFUND_HEIGHT);
        } else {
            assert_eq!(tx.lock_time, LockTime::ZERO);
        }
        assert_eq!(tx.input[1].sequence, info.sequence());

        verify_intent(
            path.as_bytes(),
            &sender.x_only_public_key(),
            &tx,
            &[prevout],
            None,
        )
        .unwrap_or_else(|e| panic!("{}: {}", path, e));
    }
}

#[tokio::test]
async fn test_claim_without_receiver_fails() {
    let contract = vhtlc();
    let (server, sender) = (test_signer(1), test_signer(2));
    let input = IntentInput {
        outpoint: OutPoint::new(Txid::from_byte_array([9; 32]), 0),
        prevout: TxOut {
            value: Amount::from_sat(21_000),
            script_pubkey: contract.script_pubkey(),
        },
        contract: &contract,
        path: CLAIM,
        signers: vec![&server as &dyn ArkSigner, &sender],
        preimage: Some(PREIMAGE.to_vec()),
    };
    assert!(build_intent(b"steal", &sender, &[input], &[]).await.is_err());
}
