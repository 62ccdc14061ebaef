//! Deterministic key material for tests.

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::signer::KeypairSigner;

/// Keypair with secret `0x01 00 .. 00 seed`.
pub fn test_keypair(seed: u8) -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let mut bytes = [0u8; 32];
    bytes[31] = seed;
    bytes[0] = 0x01;
    let sk = SecretKey::from_slice(&bytes).expect("valid test secret key");
    let pk = sk.public_key(&secp);
    (sk, pk)
}

pub fn test_signer(seed: u8) -> KeypairSigner {
    KeypairSigner::new(test_keypair(seed).0)
}
