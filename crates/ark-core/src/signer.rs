//! The signing capability consumed by tree sessions and intent builders.
//!
//! Implementations may suspend (hardware wallets, remote signers), so every
//! signing call is async. Sessions never hold borrowed state across these
//! calls beyond their own `&mut self`.

use async_trait::async_trait;
use bitcoin::key::{Keypair, XOnlyPublicKey};
use bitcoin::secp256k1::{schnorr, Message, PublicKey, Secp256k1, SecretKey};
use musig2::{PartialSignature, SecNonce};
use thiserror::Error;

use crate::musig::{self, MusigError, SigningContext};

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("MuSig2 error: {0}")]
    Musig(#[from] MusigError),

    #[error("signer unavailable: {0}")]
    Unavailable(String),

    #[error("signer refused: {0}")]
    Refused(String),
}

#[async_trait]
pub trait ArkSigner: Send + Sync {
    /// The key this signer controls.
    fn public_key(&self) -> PublicKey;

    /// BIP-340 signature over a 32-byte digest.
    ///
    /// Must be deterministic for a given key and digest.
    async fn sign(&self, hash: &[u8; 32])
        -> Result<(schnorr::Signature, XOnlyPublicKey), SignerError>;

    /// MuSig2 partial signature, consuming the secret nonce.
    async fn sign_musig(
        &self,
        context: &SigningContext,
        secnonce: SecNonce,
    ) -> Result<PartialSignature, SignerError>;
}

/// In-memory signer backed by a single keypair.
#[derive(Clone)]
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        Self {
            keypair: Keypair::from_secret_key(&secp, &secret_key),
        }
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }
}

impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("public_key", &self.keypair.public_key())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ArkSigner for KeypairSigner {
    fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    async fn sign(
        &self,
        hash: &[u8; 32],
    ) -> Result<(schnorr::Signature, XOnlyPublicKey), SignerError> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest(*hash);
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &self.keypair);
        Ok((sig, self.x_only_public_key()))
    }

    async fn sign_musig(
        &self,
        context: &SigningContext,
        secnonce: SecNonce,
    ) -> Result<PartialSignature, SignerError> {
        let sk = self.keypair.secret_key();
        let partial = musig::partial_sign(
            &sk,
            secnonce,
            &context.key_agg_ctx,
            &context.agg_nonce,
            &context.message,
        )?;
        Ok(partial)
    }
}
