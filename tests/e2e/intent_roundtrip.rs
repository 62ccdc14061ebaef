//! Register and delete intents, signed and checked end to end.
//!
//! Every verification runs the full witness of each input through
//! libbitcoinconsensus, so these tests also pin the witness layout the
//! contract paths expect.

use ark_contracts::{ArkContract, HashLockedContract, PaymentContract};
use ark_core::locktime::RelativeLocktime;
use ark_core::test_utils::{test_keypair, test_signer};
use ark_core::ArkSigner;
use ark_intent::{
    build_intent, build_register_and_delete, verify_intent, DeleteMessage, IntentError,
    IntentInput, IntentMessage, RegisterMessage, VerifyError,
};
use ark_script::HashKind;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::{Amount, OutPoint, ScriptBuf, TxOut, Txid};

const VALID_AT: u64 = 1_700_000_000;
const THIRTY_DAYS: u64 = 30 * 24 * 60 * 60;

fn payment() -> ArkContract {
    PaymentContract::new(
        test_keypair(1).1,
        test_keypair(2).1,
        RelativeLocktime::Blocks(144),
    )
    .unwrap()
    .into()
}

fn coin(contract: &ArkContract, seed: u8, sats: u64) -> (OutPoint, TxOut) {
    (
        OutPoint::new(Txid::from_byte_array([seed; 32]), seed as u32),
        TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: contract.script_pubkey(),
        },
    )
}

fn outputs() -> Vec<TxOut> {
    let (_, owner) = test_keypair(2);
    let onchain = ScriptBuf::new_p2tr(
        &bitcoin::secp256k1::Secp256k1::verification_only(),
        owner.x_only_public_key().0,
        None,
    );
    vec![
        TxOut {
            value: Amount::from_sat(30_000),
            script_pubkey: onchain,
        },
        TxOut {
            value: Amount::from_sat(19_000),
            script_pubkey: payment().script_pubkey(),
        },
    ]
}

#[tokio::test]
async fn test_register_and_delete_verify() {
    let contract = payment();
    let (server, user) = (test_signer(1), test_signer(2));
    let (outpoint_a, prevout_a) = coin(&contract, 10, 25_000);
    let (outpoint_b, prevout_b) = coin(&contract, 11, 25_000);

    let inputs = vec![
        IntentInput {
            outpoint: outpoint_a,
            prevout: prevout_a.clone(),
            contract: &contract,
            path: "collaborative",
            signers: vec![&user as &dyn ArkSigner, &server],
            preimage: None,
        },
        IntentInput {
            outpoint: outpoint_b,
            prevout: prevout_b.clone(),
            contract: &contract,
            path: "unilateral",
            signers: vec![&user as &dyn ArkSigner],
            preimage: None,
        },
    ];

    let register = IntentMessage::Register(RegisterMessage {
        inputs: vec![outpoint_a, outpoint_b],
        onchain_output_indexes: vec![0],
        valid_at: VALID_AT,
        expire_at: VALID_AT + THIRTY_DAYS,
        cosigners_public_keys: vec![test_keypair(2).1],
    });
    let delete = IntentMessage::Delete(DeleteMessage {
        expire_at: VALID_AT + THIRTY_DAYS,
    });

    let declared = outputs();
    let (reg, del) = build_register_and_delete(&register, &delete, &user, &inputs, &declared)
        .await
        .unwrap();

    let key = user.x_only_public_key();
    let prevouts = vec![prevout_a, prevout_b];
    assert_eq!(reg.prevouts(), prevouts);
    assert_eq!(reg.decode_message().unwrap(), register);
    assert_eq!(del.decode_message().unwrap(), delete);

    verify_intent(&reg.message, &key, &reg.transaction(), &prevouts, Some(&declared)).unwrap();
    verify_intent(&del.message, &key, &del.transaction(), &prevouts, None).unwrap();

    // The delete proof declares nothing.
    assert_eq!(del.transaction().output.len(), 1);
    assert!(del.transaction().output[0].script_pubkey.is_op_return());

    // Proofs are bound to their own message.
    assert_eq!(
        verify_intent(&del.message, &key, &reg.transaction(), &prevouts, None),
        Err(VerifyError::NotBoundToMessage)
    );
}

#[tokio::test]
async fn test_register_must_list_spent_coins() {
    let contract = payment();
    let user = test_signer(2);
    let (outpoint, prevout) = coin(&contract, 14, 50_000);
    let inputs = [IntentInput {
        outpoint,
        prevout: prevout.clone(),
        contract: &contract,
        path: "unilateral",
        signers: vec![&user as &dyn ArkSigner],
        preimage: None,
    }];

    let elsewhere = OutPoint::new(Txid::from_byte_array([0x77; 32]), 5);
    let register = IntentMessage::Register(RegisterMessage {
        inputs: vec![elsewhere],
        onchain_output_indexes: vec![],
        valid_at: VALID_AT,
        expire_at: VALID_AT + THIRTY_DAYS,
        cosigners_public_keys: vec![test_keypair(2).1],
    });
    let delete = IntentMessage::Delete(DeleteMessage {
        expire_at: VALID_AT + THIRTY_DAYS,
    });
    let declared = outputs();

    let err = build_register_and_delete(&register, &delete, &user, &inputs, &declared)
        .await
        .unwrap_err();
    assert!(matches!(err, IntentError::InputsMismatch));

    // Signed anyway through the bare builder, the proof still fails.
    let payload = register.to_payload().unwrap();
    let intent = build_intent(&payload, &user, &inputs, &declared)
        .await
        .unwrap();
    assert_eq!(
        verify_intent(
            &payload,
            &user.x_only_public_key(),
            &intent.transaction(),
            &[prevout],
            Some(&declared),
        ),
        Err(VerifyError::InputsMismatch)
    );
}

#[tokio::test]
async fn test_tampered_outputs_are_rejected() {
    let contract = payment();
    let user = test_signer(2);
    let (outpoint, prevout) = coin(&contract, 12, 50_000);
    let inputs = [IntentInput {
        outpoint,
        prevout: prevout.clone(),
        contract: &contract,
        path: "unilateral",
        signers: vec![&user as &dyn ArkSigner],
        preimage: None,
    }];

    let declared = outputs();
    let intent = build_intent(b"register", &user, &inputs, &declared)
        .await
        .unwrap();

    let mut tx = intent.transaction();
    tx.output[0].value = Amount::from_sat(31_000);
    let key = user.x_only_public_key();

    assert_eq!(
        verify_intent(b"register", &key, &tx, &[prevout.clone()], Some(&declared)),
        Err(VerifyError::OutputsMismatch)
    );
    assert!(matches!(
        verify_intent(b"register", &key, &tx, &[prevout], None),
        Err(VerifyError::InvalidSignature(_))
    ));
}

#[tokio::test]
async fn test_wrong_prevout_amount_fails_scripts() {
    let contract = payment();
    let user = test_signer(2);
    let (outpoint, prevout) = coin(&contract, 13, 50_000);
    let inputs = [IntentInput {
        outpoint,
        prevout: prevout.clone(),
        contract: &contract,
        path: "unilateral",
        signers: vec![&user as &dyn ArkSigner],
        preimage: None,
    }];
    let intent = build_intent(b"hello", &user, &inputs, &[]).await.unwrap();

    // Amounts are committed by every taproot sighash.
    let mut lied = prevout;
    lied.value = Amount::from_sat(50_001);
    assert!(verify_intent(
        b"hello",
        &user.x_only_public_key(),
        &intent.transaction(),
        &[lied],
        None
    )
    .is_err());
}

#[tokio::test]
async fn test_hashlocked_unilateral_spend() {
    let preimage = b"open sesame, but thirty two byte";
    let hash = sha256::Hash::hash(preimage);
    let contract: ArkContract = HashLockedContract::new(
        test_keypair(1).1,
        test_keypair(3).1,
        HashKind::Sha256,
        hash.as_byte_array(),
        RelativeLocktime::from_seconds(1024).unwrap(),
    )
    .unwrap()
    .into();
    let holder = test_signer(3);
    let (outpoint, prevout) = coin(&contract, 14, 10_000);

    let input = |preimage: Option<Vec<u8>>| IntentInput {
        outpoint,
        prevout: prevout.clone(),
        contract: &contract,
        path: "unilateral",
        signers: vec![&holder as &dyn ArkSigner],
        preimage,
    };

    let err = build_intent(b"claim", &holder, &[input(None)], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, IntentError::MissingPreimage { index: 1, .. }));

    let err = build_intent(b"claim", &holder, &[input(Some(vec![0; 32]))], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, IntentError::WrongPreimage { index: 1 }));

    let intent = build_intent(b"claim", &holder, &[input(Some(preimage.to_vec()))], &[])
        .await
        .unwrap();
    let tx = intent.transaction();
    // sig, preimage, script, control block
    assert_eq!(tx.input[1].witness.len(), 4);
    assert_eq!(tx.input[1].witness.nth(1), Some(&preimage[..]));
    assert!(tx.input[1].sequence.is_time_locked());

    verify_intent(
        b"claim",
        &holder.x_only_public_key(),
        &tx,
        &intent.prevouts(),
        None,
    )
    .unwrap();
}
