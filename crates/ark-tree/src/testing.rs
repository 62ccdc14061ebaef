//! Tree builders shared by the unit tests.

use ark_core::test_utils::test_keypair;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::TapNodeHash;
use bitcoin::transaction::Version;
use bitcoin::{absolute, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid};

use crate::context::shared_output_script;
use crate::cosigner::add_cosigner_key;
use crate::tx_tree::{TxTree, TxTreeNode};

pub const LEAF_AMOUNT: Amount = Amount::from_sat(40_000);

pub fn script_root() -> TapNodeHash {
    TapNodeHash::from_byte_array([0x5e; 32])
}

fn tx(spends: OutPoint, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version(3),
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: spends,
            sequence: Sequence::MAX,
            ..Default::default()
        }],
        output: outputs,
    }
}

fn placeholder_outputs(n: usize) -> Vec<TxOut> {
    (0..n)
        .map(|i| TxOut {
            value: Amount::from_sat(1_000 + i as u64),
            script_pubkey: ScriptBuf::new(),
        })
        .collect()
}

pub fn unsigned_psbt(outputs: usize) -> Psbt {
    let batch = OutPoint::new(Txid::from_byte_array([0xab; 32]), 0);
    Psbt::from_unsigned_tx(tx(batch, placeholder_outputs(outputs))).unwrap()
}

pub fn child_psbt(spends: OutPoint, outputs: usize) -> Psbt {
    Psbt::from_unsigned_tx(tx(spends, placeholder_outputs(outputs))).unwrap()
}

fn with_cosigners(mut psbt: Psbt, keys: &[PublicKey]) -> Psbt {
    for (i, key) in keys.iter().enumerate() {
        add_cosigner_key(&mut psbt, i as u32, key).unwrap();
    }
    psbt
}

/// A root paying two leaves; each node lists the given cosigners.
pub fn sample_tree(root: &[PublicKey], a: &[PublicKey], b: &[PublicKey]) -> (TxTree, Amount) {
    let shared = |keys: &[PublicKey]| TxOut {
        value: LEAF_AMOUNT,
        script_pubkey: shared_output_script(keys, &script_root()).unwrap(),
    };
    let batch = OutPoint::new(Txid::from_byte_array([0xab; 32]), 0);
    let root_tx = tx(batch, vec![shared(a), shared(b)]);
    let root_id = root_tx.compute_txid();

    let vtxo = |seed: u8| TxOut {
        value: LEAF_AMOUNT,
        script_pubkey: ScriptBuf::new_p2tr(
            &bitcoin::secp256k1::Secp256k1::verification_only(),
            test_keypair(seed).1.x_only_public_key().0,
            None,
        ),
    };
    let a_tx = tx(OutPoint::new(root_id, 0), vec![vtxo(10)]);
    let b_tx = tx(OutPoint::new(root_id, 1), vec![vtxo(11)]);
    let (a_id, b_id) = (a_tx.compute_txid(), b_tx.compute_txid());

    let nodes = vec![
        TxTreeNode::new(with_cosigners(Psbt::from_unsigned_tx(root_tx).unwrap(), root))
            .with_child(0, a_id)
            .with_child(1, b_id),
        TxTreeNode::new(with_cosigners(Psbt::from_unsigned_tx(a_tx).unwrap(), a)),
        TxTreeNode::new(with_cosigners(Psbt::from_unsigned_tx(b_tx).unwrap(), b)),
    ];
    (TxTree::new(nodes).unwrap(), LEAF_AMOUNT * 2)
}
