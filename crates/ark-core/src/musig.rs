//! MuSig2 (BIP-327) helpers for batch tree signing.
//!
//! Bridges between `bitcoin`'s secp256k1 types and the musig2 crate's types
//! via byte serialization. Both use libsecp256k1 underneath.
//!
//! Cosigner keys are always sorted by their compressed encoding before
//! aggregation so every participant derives the same aggregate key no matter
//! which order the cosigner list arrived in.

use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::taproot::TapNodeHash;
use musig2::{AggNonce, KeyAggContext, LiftedSignature, PartialSignature, PubNonce, SecNonce};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusigError {
    #[error("key conversion failed: {0}")]
    KeyConversion(String),

    #[error("key aggregation failed: {0}")]
    KeyAggregation(String),

    #[error("taproot tweak failed: {0}")]
    Tweak(String),

    #[error("partial signing failed: {0}")]
    Signing(String),

    #[error("signature aggregation failed: {0}")]
    Aggregation(String),
}

// ─── Type conversion helpers ────────────────────────────────────────────────

pub fn pubkey_to_musig(pk: &PublicKey) -> Result<musig2::secp256k1::PublicKey, MusigError> {
    musig2::secp256k1::PublicKey::from_slice(&pk.serialize())
        .map_err(|e| MusigError::KeyConversion(format!("pubkey: {}", e)))
}

pub fn seckey_to_musig(sk: &SecretKey) -> Result<musig2::secp256k1::SecretKey, MusigError> {
    #[allow(deprecated)]
    musig2::secp256k1::SecretKey::from_slice(&sk.secret_bytes())
        .map_err(|e| MusigError::KeyConversion(format!("seckey: {}", e)))
}

fn xonly_from_musig(pk: &musig2::secp256k1::PublicKey) -> Result<XOnlyPublicKey, MusigError> {
    let (xonly, _parity) = pk.x_only_public_key();
    XOnlyPublicKey::from_slice(&xonly.serialize())
        .map_err(|e| MusigError::KeyConversion(format!("xonly: {}", e)))
}

// ─── Key Aggregation ────────────────────────────────────────────────────────

/// Sort keys by their 33-byte compressed encoding (BIP-327 `KeySort`).
pub fn sort_keys(keys: &[PublicKey]) -> Vec<PublicKey> {
    let mut sorted = keys.to_vec();
    sorted.sort_by_key(|k| k.serialize());
    sorted
}

/// Aggregate cosigner keys.
///
/// Returns the context and the untweaked aggregate x-only key, which is the
/// taproot internal key of the shared output.
pub fn key_agg(cosigners: &[PublicKey]) -> Result<(KeyAggContext, XOnlyPublicKey), MusigError> {
    if cosigners.is_empty() {
        return Err(MusigError::KeyAggregation("no cosigners".into()));
    }
    let keys = sort_keys(cosigners)
        .iter()
        .map(pubkey_to_musig)
        .collect::<Result<Vec<_>, _>>()?;

    let ctx = KeyAggContext::new(keys).map_err(|e| MusigError::KeyAggregation(e.to_string()))?;
    let agg_pk: musig2::secp256k1::PublicKey = ctx.aggregated_pubkey();
    let xonly = xonly_from_musig(&agg_pk)?;

    Ok((ctx, xonly))
}

/// Aggregate cosigner keys and apply the BIP-341 tweak for `merkle_root`.
///
/// Partial signatures made with the returned context aggregate to a valid
/// key-path signature for `P2TR(internal, merkle_root)`. The second element is
/// that output key.
pub fn key_agg_tweaked(
    cosigners: &[PublicKey],
    merkle_root: &TapNodeHash,
) -> Result<(KeyAggContext, XOnlyPublicKey), MusigError> {
    let (ctx, _internal) = key_agg(cosigners)?;
    let root = bitcoin::hashes::Hash::to_byte_array(*merkle_root);

    let tweaked = ctx
        .with_taproot_tweak(&root)
        .map_err(|e| MusigError::Tweak(e.to_string()))?;
    let tweaked_pk: musig2::secp256k1::PublicKey = tweaked.aggregated_pubkey();
    let output_key = xonly_from_musig(&tweaked_pk)?;

    Ok((tweaked, output_key))
}

/// Everything a signer needs to produce one partial signature.
#[derive(Debug, Clone)]
pub struct SigningContext {
    pub key_agg_ctx: KeyAggContext,
    pub agg_nonce: AggNonce,
    pub message: [u8; 32],
}

// ─── Nonce Generation ───────────────────────────────────────────────────────

/// Generate a nonce pair bound to `message` and the context's aggregate key.
///
/// The returned SecNonce MUST be used exactly once and then dropped.
/// Reusing a SecNonce across different messages reveals the private key.
pub fn generate_nonce(
    seckey: Option<&SecretKey>,
    key_agg_ctx: &KeyAggContext,
    message: &[u8; 32],
) -> Result<(SecNonce, PubNonce), MusigError> {
    let agg_pk: musig2::secp256k1::PublicKey = key_agg_ctx.aggregated_pubkey();

    let mut nonce_seed = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce_seed);

    let mut builder = SecNonce::build(nonce_seed)
        .with_aggregated_pubkey(agg_pk)
        .with_message(message);

    if let Some(sk) = seckey {
        builder = builder.with_seckey(seckey_to_musig(sk)?);
    }

    let secnonce = builder.build();
    let pubnonce = secnonce.public_nonce();

    Ok((secnonce, pubnonce))
}

/// Compute the aggregate nonce from all parties' PubNonces.
pub fn aggregate_nonces(pubnonces: &[PubNonce]) -> AggNonce {
    AggNonce::sum(pubnonces)
}

// ─── Partial Signing ────────────────────────────────────────────────────────

/// Produce a partial signature. The SecNonce is consumed to prevent reuse.
pub fn partial_sign(
    seckey: &SecretKey,
    secnonce: SecNonce,
    key_agg_ctx: &KeyAggContext,
    agg_nonce: &AggNonce,
    message: &[u8; 32],
) -> Result<PartialSignature, MusigError> {
    let sk_m = seckey_to_musig(seckey)?;

    musig2::sign_partial(key_agg_ctx, sk_m, secnonce, agg_nonce, message)
        .map_err(|e| MusigError::Signing(e.to_string()))
}

/// Verify a partial signature from a specific signer.
pub fn verify_partial_signature(
    key_agg_ctx: &KeyAggContext,
    partial_sig: &PartialSignature,
    agg_nonce: &AggNonce,
    signer_pubkey: &PublicKey,
    signer_pubnonce: &PubNonce,
    message: &[u8; 32],
) -> bool {
    let pk_m = match pubkey_to_musig(signer_pubkey) {
        Ok(pk) => pk,
        Err(_) => return false,
    };

    musig2::verify_partial(
        key_agg_ctx,
        *partial_sig,
        agg_nonce,
        pk_m,
        signer_pubnonce,
        message,
    )
    .is_ok()
}

// ─── Signature Aggregation ──────────────────────────────────────────────────

/// Aggregate partial signatures into a final 64-byte BIP-340 signature.
pub fn aggregate_signatures(
    key_agg_ctx: &KeyAggContext,
    agg_nonce: &AggNonce,
    partial_sigs: &[PartialSignature],
    message: &[u8; 32],
) -> Result<[u8; 64], MusigError> {
    let sig: LiftedSignature = musig2::aggregate_partial_signatures(
        key_agg_ctx,
        agg_nonce,
        partial_sigs.iter().copied(),
        message,
    )
    .map_err(|e| MusigError::Aggregation(e.to_string()))?;

    Ok(sig.serialize())
}

/// Verify a final Schnorr signature against an x-only key.
pub fn verify_aggregated_signature(
    aggregate_xonly: &XOnlyPublicKey,
    signature: &[u8; 64],
    message: &[u8; 32],
) -> bool {
    let secp = Secp256k1::verification_only();
    let sig = match bitcoin::secp256k1::schnorr::Signature::from_slice(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let msg = bitcoin::secp256k1::Message::from_digest(*message);

    secp.verify_schnorr(&sig, &msg, aggregate_xonly).is_ok()
}
