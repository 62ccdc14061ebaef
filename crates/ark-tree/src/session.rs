//! One participant's side of a tree signing round.
//!
//! ```text
//! Created -> ContextsBuilt -> NoncesGenerated -> NoncesVerified -> Signed
//!                 \________________\___________________\______-> Aborted
//! ```
//!
//! Each state carries exactly the data valid in it. Secret nonces live only
//! in `NoncesGenerated`/`NoncesVerified` and are consumed by signing.

use std::collections::BTreeMap;
use std::fmt;

use ark_core::musig::{self, MusigError, SigningContext};
use ark_core::signer::{ArkSigner, SignerError};
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::TapNodeHash;
use bitcoin::{Amount, Txid};
use musig2::{AggNonce, PartialSignature, PubNonce, SecNonce};
use thiserror::Error;

use crate::context::{tree_contexts, ContextError, NodeContext};
use crate::tx_tree::TxTree;

/// What a stage needs that has not happened yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Contexts,
    Nonces,
    AggregateNonce,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Contexts => "contexts",
            Self::Nonces => "nonces",
            Self::AggregateNonce => "aggregate nonce",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Contexts,
    Nonces,
    NonceVerification,
    Signing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Contexts => "contexts already built",
            Self::Nonces => "nonces already generated",
            Self::NonceVerification => "aggregate nonces already verified",
            Self::Signing => "already signed",
        })
    }
}

/// Protocol violations by the coordinator or another participant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("no nonces supplied for node {0}")]
    MissingNonces(Txid),

    #[error("node {txid}: no nonce from cosigner {cosigner}")]
    MissingCosigner { txid: Txid, cosigner: PublicKey },

    #[error("node {txid}: nonce from non-cosigner {cosigner}")]
    UnexpectedCosigner { txid: Txid, cosigner: PublicKey },

    #[error("node {txid}: our public nonce was replaced")]
    OwnNonceReplaced { txid: Txid },

    #[error("node {txid}: aggregate nonce does not match the cosigner nonces")]
    NonceMismatch { txid: Txid },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("not ready: missing {0}")]
    NotReady(Precondition),

    #[error("{0}")]
    AlreadyDone(Stage),

    #[error("integrity failure: {0}")]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Musig(#[from] MusigError),

    #[error("signer failed on node {txid}: {source}")]
    Signer { txid: Txid, source: SignerError },

    #[error("session aborted")]
    Aborted,
}

impl SessionError {
    /// True for errors that mean a counterparty misbehaved. These must be
    /// propagated and the round abandoned.
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Integrity(_) => true,
            Self::Context(e) => e.is_integrity(),
            _ => false,
        }
    }
}

/// Nonces for one node as distributed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceSet {
    pub pubnonces: BTreeMap<PublicKey, PubNonce>,
    pub aggregate: AggNonce,
}

struct NodeNonce {
    secnonce: SecNonce,
    pubnonce: PubNonce,
}

enum State {
    Created,
    ContextsBuilt {
        contexts: Vec<NodeContext>,
    },
    NoncesGenerated {
        contexts: Vec<NodeContext>,
        nonces: Vec<NodeNonce>,
    },
    NoncesVerified {
        contexts: Vec<NodeContext>,
        nonces: Vec<NodeNonce>,
        aggregates: Vec<AggNonce>,
    },
    Signed,
    Aborted,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ContextsBuilt { .. } => "contexts built",
            Self::NoncesGenerated { .. } => "nonces generated",
            Self::NoncesVerified { .. } => "nonces verified",
            Self::Signed => "signed",
            Self::Aborted => "aborted",
        }
    }
}

/// Signs the nodes of a [`TxTree`] that list this signer as a cosigner.
pub struct TreeSignerSession<S> {
    tree: TxTree,
    signer: S,
    script_root: TapNodeHash,
    root_amount: Amount,
    state: State,
}

impl<S: ArkSigner> TreeSignerSession<S> {
    pub fn new(tree: TxTree, signer: S, script_root: TapNodeHash, root_amount: Amount) -> Self {
        Self {
            tree,
            signer,
            script_root,
            root_amount,
            state: State::Created,
        }
    }

    pub fn tree(&self) -> &TxTree {
        &self.tree
    }

    pub fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, State::Aborted)
    }

    /// Contexts of the nodes this signer takes part in, once built.
    pub fn contexts(&self) -> Option<&[NodeContext]> {
        match &self.state {
            State::ContextsBuilt { contexts }
            | State::NoncesGenerated { contexts, .. }
            | State::NoncesVerified { contexts, .. } => Some(contexts),
            _ => None,
        }
    }

    fn transition(&mut self, next: State) {
        log::debug!("tree session: {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn abort(&mut self, err: SessionError) -> SessionError {
        log::warn!("tree session aborted: {}", err);
        self.transition(State::Aborted);
        err
    }

    /// Compute the signing context of every node we cosign.
    pub fn build_contexts(&mut self) -> Result<(), SessionError> {
        match self.state {
            State::Created => {}
            State::Aborted => return Err(SessionError::Aborted),
            _ => return Err(SessionError::AlreadyDone(Stage::Contexts)),
        }

        let me = self.signer.public_key();
        let all = match tree_contexts(&self.tree, &self.script_root, self.root_amount) {
            Ok(all) => all,
            Err(e) if e.is_integrity() => return Err(self.abort(e.into())),
            Err(e) => return Err(e.into()),
        };
        let total = all.len();
        let contexts: Vec<NodeContext> = all.into_iter().filter(|c| c.includes(&me)).collect();
        log::debug!(
            "cosigning {} of {} nodes, skipping {}",
            contexts.len(),
            total,
            total - contexts.len()
        );

        self.transition(State::ContextsBuilt { contexts });
        Ok(())
    }

    /// Generate a nonce pair per cosigned node and return the public halves.
    ///
    /// Builds contexts first when that has not happened yet.
    pub fn generate_nonces(&mut self) -> Result<BTreeMap<Txid, PubNonce>, SessionError> {
        if matches!(self.state, State::Created) {
            self.build_contexts()?;
        }
        let contexts = match std::mem::replace(&mut self.state, State::Aborted) {
            State::ContextsBuilt { contexts } => contexts,
            other => {
                let err = match other {
                    State::Aborted => SessionError::Aborted,
                    _ => SessionError::AlreadyDone(Stage::Nonces),
                };
                self.state = other;
                return Err(err);
            }
        };

        let mut nonces = Vec::with_capacity(contexts.len());
        for ctx in &contexts {
            let (secnonce, pubnonce) = musig::generate_nonce(None, &ctx.key_agg_ctx, &ctx.sighash)?;
            nonces.push(NodeNonce { secnonce, pubnonce });
        }
        let public = contexts
            .iter()
            .zip(&nonces)
            .map(|(c, n)| (c.txid, n.pubnonce.clone()))
            .collect();

        self.transition(State::NoncesGenerated { contexts, nonces });
        Ok(public)
    }

    /// Check the coordinator's aggregate nonces against the cosigner nonces
    /// it claims they were built from.
    ///
    /// Any mismatch aborts the session.
    pub fn verify_aggregated_nonces(
        &mut self,
        nonce_sets: &BTreeMap<Txid, NonceSet>,
    ) -> Result<(), SessionError> {
        let (contexts, nonces) = match std::mem::replace(&mut self.state, State::Aborted) {
            State::NoncesGenerated { contexts, nonces } => (contexts, nonces),
            other => {
                let err = match other {
                    State::Created | State::ContextsBuilt { .. } => {
                        SessionError::NotReady(Precondition::Nonces)
                    }
                    State::Aborted => SessionError::Aborted,
                    _ => SessionError::AlreadyDone(Stage::NonceVerification),
                };
                self.state = other;
                return Err(err);
            }
        };

        let me = self.signer.public_key();
        let mut aggregates = Vec::with_capacity(contexts.len());
        for (ctx, own) in contexts.iter().zip(&nonces) {
            match check_nonce_set(ctx, &me, &own.pubnonce, nonce_sets.get(&ctx.txid)) {
                Ok(agg) => aggregates.push(agg),
                // State is already Aborted; the secret nonces drop here.
                Err(e) => return Err(self.abort(e.into())),
            }
        }

        self.transition(State::NoncesVerified {
            contexts,
            nonces,
            aggregates,
        });
        Ok(())
    }

    /// Partial signatures for every cosigned node, in tree order.
    pub async fn sign(&mut self) -> Result<Vec<(Txid, PartialSignature)>, SessionError> {
        let (contexts, nonces, aggregates) =
            match std::mem::replace(&mut self.state, State::Aborted) {
                State::NoncesVerified {
                    contexts,
                    nonces,
                    aggregates,
                } => (contexts, nonces, aggregates),
                other => {
                    let err = match other {
                        State::Created => SessionError::NotReady(Precondition::Contexts),
                        State::ContextsBuilt { .. } => SessionError::NotReady(Precondition::Nonces),
                        State::NoncesGenerated { .. } => {
                            SessionError::NotReady(Precondition::AggregateNonce)
                        }
                        State::Signed => SessionError::AlreadyDone(Stage::Signing),
                        State::NoncesVerified { .. } | State::Aborted => SessionError::Aborted,
                    };
                    self.state = other;
                    return Err(err);
                }
            };

        let mut signatures = Vec::with_capacity(contexts.len());
        for ((ctx, nonce), agg_nonce) in contexts.into_iter().zip(nonces).zip(aggregates) {
            let signing = SigningContext {
                key_agg_ctx: ctx.key_agg_ctx,
                agg_nonce,
                message: ctx.sighash,
            };
            // Remaining secret nonces are dropped with the iterator on error.
            let partial = match self.signer.sign_musig(&signing, nonce.secnonce).await {
                Ok(p) => p,
                Err(source) => {
                    return Err(self.abort(SessionError::Signer {
                        txid: ctx.txid,
                        source,
                    }))
                }
            };
            signatures.push((ctx.txid, partial));
        }

        self.transition(State::Signed);
        Ok(signatures)
    }
}

fn check_nonce_set(
    ctx: &NodeContext,
    me: &PublicKey,
    own: &PubNonce,
    set: Option<&NonceSet>,
) -> Result<AggNonce, IntegrityError> {
    let txid = ctx.txid;
    let set = set.ok_or(IntegrityError::MissingNonces(txid))?;

    if let Some(cosigner) = set.pubnonces.keys().find(|k| !ctx.includes(k)) {
        return Err(IntegrityError::UnexpectedCosigner {
            txid,
            cosigner: *cosigner,
        });
    }
    let mut pubnonces = Vec::with_capacity(ctx.cosigners.len());
    for cosigner in &ctx.cosigners {
        let nonce = set
            .pubnonces
            .get(cosigner)
            .ok_or(IntegrityError::MissingCosigner {
                txid,
                cosigner: *cosigner,
            })?;
        if cosigner == me && nonce != own {
            return Err(IntegrityError::OwnNonceReplaced { txid });
        }
        pubnonces.push(nonce.clone());
    }

    if musig::aggregate_nonces(&pubnonces) != set.aggregate {
        return Err(IntegrityError::NonceMismatch { txid });
    }
    Ok(set.aggregate.clone())
}
