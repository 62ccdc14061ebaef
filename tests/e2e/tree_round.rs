//! Full batch tree signing round.
//!
//! Three participants cosign a three-node tree, the coordinator aggregates
//! their nonces and partial signatures, and every finalized transaction is
//! checked by libbitcoinconsensus against the output it spends.

use ark_core::locktime::RelativeLocktime;
use ark_core::test_utils::{test_keypair, test_signer};
use ark_core::KeypairSigner;
use ark_script::{Leaf, UnilateralExit};
use ark_tree::context::shared_output_script;
use ark_tree::{add_cosigner_key, RoundCoordinator, TreeSignerSession, TxTree, TxTreeNode};
use bitcoin::consensus::Encodable;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::TapNodeHash;
use bitcoin::transaction::Version;
use bitcoin::{absolute, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid};

const ROOT_AMOUNT: Amount = Amount::from_sat(100_000);

/// Consensus-verify a single-input transaction against its prevout.
fn consensus_verify(tx: &Transaction, prevout: &TxOut) {
    let mut tx_bytes = Vec::new();
    tx.consensus_encode(&mut tx_bytes).unwrap();

    let script = prevout.script_pubkey.as_bytes();
    let utxo = bitcoinconsensus::Utxo {
        script_pubkey: script.as_ptr(),
        script_pubkey_len: script.len() as u32,
        value: prevout.value.to_sat() as i64,
    };
    let result = bitcoinconsensus::verify(
        script,
        prevout.value.to_sat(),
        &tx_bytes,
        Some(&[utxo]),
        0,
    );
    assert!(
        result.is_ok(),
        "consensus verification failed for {}: {:?}",
        tx.compute_txid(),
        result.err()
    );
}

fn sweep_root() -> TapNodeHash {
    let (_, operator) = test_keypair(50);
    let sweep = UnilateralExit::new(
        RelativeLocktime::from_seconds(604_672).unwrap(),
        &[operator],
        None,
    )
    .unwrap();
    TapNodeHash::from(Leaf::new(&sweep).leaf_hash())
}

fn node_psbt(spends: OutPoint, outputs: Vec<TxOut>, cosigners: &[PublicKey]) -> Psbt {
    let tx = Transaction {
        version: Version(3),
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: spends,
            sequence: Sequence::MAX,
            ..Default::default()
        }],
        output: outputs,
    };
    let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
    for (i, key) in cosigners.iter().enumerate() {
        add_cosigner_key(&mut psbt, i as u32, key).unwrap();
    }
    psbt
}

fn vtxo(owner: &PublicKey, value: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(value),
        script_pubkey: ScriptBuf::new_p2tr(
            &bitcoin::secp256k1::Secp256k1::verification_only(),
            owner.x_only_public_key().0,
            None,
        ),
    }
}

/// root (p1, p2, p3) -> a (p1, p2) -> vtxo(p1)
///                   -> b (p2, p3) -> vtxo(p3)
fn batch_tree(p: &[PublicKey; 3]) -> TxTree {
    let root_script = sweep_root();
    let shared = |keys: &[PublicKey], value: u64| TxOut {
        value: Amount::from_sat(value),
        script_pubkey: shared_output_script(keys, &root_script).unwrap(),
    };

    let batch_outpoint = OutPoint::new(Txid::from_byte_array([0xba; 32]), 0);
    let root = node_psbt(
        batch_outpoint,
        vec![shared(&[p[0], p[1]], 60_000), shared(&[p[1], p[2]], 40_000)],
        p,
    );
    let root_id = root.unsigned_tx.compute_txid();
    let a = node_psbt(OutPoint::new(root_id, 0), vec![vtxo(&p[0], 60_000)], &[p[0], p[1]]);
    let b = node_psbt(OutPoint::new(root_id, 1), vec![vtxo(&p[2], 40_000)], &[p[2], p[1]]);
    let (a_id, b_id) = (a.unsigned_tx.compute_txid(), b.unsigned_tx.compute_txid());

    TxTree::new(vec![
        TxTreeNode::new(b),
        TxTreeNode::new(root).with_child(0, a_id).with_child(1, b_id),
        TxTreeNode::new(a),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_three_party_round_passes_consensus() {
    let p = [test_keypair(1).1, test_keypair(2).1, test_keypair(3).1];
    let tree = batch_tree(&p);
    let script_root = sweep_root();

    let mut coordinator = RoundCoordinator::new(tree.clone(), &script_root, ROOT_AMOUNT).unwrap();
    let mut sessions: Vec<TreeSignerSession<KeypairSigner>> = (1..=3)
        .map(|seed| TreeSignerSession::new(tree.clone(), test_signer(seed), script_root, ROOT_AMOUNT))
        .collect();

    // Round 1: nonces
    for session in sessions.iter_mut() {
        let nonces = session.generate_nonces().unwrap();
        coordinator.add_nonces(session.public_key(), &nonces).unwrap();
    }
    // p1 only cosigns root and a, p3 only root and b
    assert_eq!(sessions[0].contexts().unwrap().len(), 2);
    assert_eq!(sessions[1].contexts().unwrap().len(), 3);
    assert_eq!(sessions[2].contexts().unwrap().len(), 2);

    let nonce_sets = coordinator.aggregate_nonces().unwrap();

    // Round 2: partial signatures
    for session in sessions.iter_mut() {
        session.verify_aggregated_nonces(&nonce_sets).unwrap();
        let partials = session.sign().await.unwrap();
        coordinator
            .add_partial_signatures(session.public_key(), &partials)
            .unwrap();
    }

    let signed = coordinator.finalize().unwrap();
    let root_prevout = TxOut {
        value: ROOT_AMOUNT,
        script_pubkey: shared_output_script(&p, &script_root).unwrap(),
    };

    let mut verified = 0;
    for node in signed.iter() {
        let tx = node.signed_tx();
        let prevout = match signed.parent(&node.txid()) {
            Some(parent) => parent.output(node.spends().unwrap().vout).unwrap().clone(),
            None => root_prevout.clone(),
        };
        consensus_verify(&tx, &prevout);
        // Signing never changes the txid.
        assert_eq!(tx.compute_txid(), node.txid());
        verified += 1;
    }
    assert_eq!(verified, 3);
}

#[tokio::test]
async fn test_tampered_aggregate_stops_the_round() {
    let p = [test_keypair(1).1, test_keypair(2).1, test_keypair(3).1];
    let tree = batch_tree(&p);
    let script_root = sweep_root();

    let mut coordinator = RoundCoordinator::new(tree.clone(), &script_root, ROOT_AMOUNT).unwrap();
    let mut sessions: Vec<TreeSignerSession<KeypairSigner>> = (1..=3)
        .map(|seed| TreeSignerSession::new(tree.clone(), test_signer(seed), script_root, ROOT_AMOUNT))
        .collect();
    for session in sessions.iter_mut() {
        let nonces = session.generate_nonces().unwrap();
        coordinator.add_nonces(session.public_key(), &nonces).unwrap();
    }
    let mut nonce_sets = coordinator.aggregate_nonces().unwrap();

    // A coordinator that quietly drops p3 from the root's nonce set.
    let root = tree.root_txid();
    let set = nonce_sets.get_mut(&root).unwrap();
    set.pubnonces.remove(&p[2]);
    let remaining: Vec<_> = set.pubnonces.values().cloned().collect();
    set.aggregate = ark_core::musig::aggregate_nonces(&remaining);

    for session in sessions.iter_mut() {
        let err = session.verify_aggregated_nonces(&nonce_sets).unwrap_err();
        assert!(err.is_integrity(), "{}", err);
        assert!(session.is_aborted());
        assert!(session.sign().await.is_err());
    }
}
