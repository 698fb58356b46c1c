//! Client-side encryption context
//!
//! The context fetches the network public key once and then turns plaintext
//! votes into `(handle, proof)` pairs. Concurrent `initialize` calls share a
//! single in-flight setup: the first caller runs it, everyone else awaits the
//! published outcome on a watch channel.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::coprocessor::Coprocessor;
use crate::encryption::ElGamal;
use crate::error::{ReferendumError, Result};
use crate::keys::PublicKey;
use crate::proofs::{input_handle, BallotProofs, InputProof};
use crate::types::{Address, EncryptedInput, ReferendumConfig};

/// Where a client obtains the network public key from
pub trait KeyProvider: Send + Sync {
    fn fetch_public_key(&self) -> impl Future<Output = Result<PublicKey>> + Send;
}

impl KeyProvider for Coprocessor {
    async fn fetch_public_key(&self) -> Result<PublicKey> {
        Ok(self.public_key().clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

type Outcome = std::result::Result<Arc<ElGamal>, String>;

enum Slot {
    Uninitialized,
    Initializing(watch::Receiver<Option<Outcome>>),
    Ready(Arc<ElGamal>),
    Failed(String),
}

struct Inner {
    generation: u64,
    slot: Slot,
}

/// Explicitly owned replacement for a process-wide encryption singleton
pub struct EncryptionContext<P> {
    provider: P,
    config: ReferendumConfig,
    inner: Mutex<Inner>,
}

/// Resets an abandoned initialization so the next caller can start over
struct PendingInit<'a, P> {
    context: &'a EncryptionContext<P>,
    generation: u64,
    armed: bool,
}

impl<P> Drop for PendingInit<'_, P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.context.lock();
        if inner.generation == self.generation && matches!(inner.slot, Slot::Initializing(_)) {
            inner.slot = Slot::Uninitialized;
        }
    }
}

impl<P> EncryptionContext<P> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: KeyProvider> EncryptionContext<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, ReferendumConfig::default())
    }

    pub fn with_config(provider: P, config: ReferendumConfig) -> Self {
        EncryptionContext {
            provider,
            config,
            inner: Mutex::new(Inner {
                generation: 0,
                slot: Slot::Uninitialized,
            }),
        }
    }

    pub fn state(&self) -> ContextState {
        match &self.lock().slot {
            Slot::Uninitialized => ContextState::Uninitialized,
            Slot::Initializing(_) => ContextState::Initializing,
            Slot::Ready(_) => ContextState::Ready,
            Slot::Failed(reason) => ContextState::Failed(reason.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ContextState::Ready
    }

    /// Bring the context to `Ready`.
    ///
    /// Returns at once when already ready, re-reports a stored failure without
    /// retrying, and joins an initialization already in flight instead of
    /// starting another.
    pub async fn initialize(&self) -> Result<()> {
        let started = {
            let mut inner = self.lock();
            let in_flight = match &inner.slot {
                Slot::Ready(_) => return Ok(()),
                Slot::Failed(reason) => {
                    return Err(ReferendumError::InitializationFailed(reason.clone()))
                }
                Slot::Initializing(rx) => Some(rx.clone()),
                Slot::Uninitialized => None,
            };
            match in_flight {
                Some(rx) => Err(rx),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inner.slot = Slot::Initializing(rx);
                    Ok((inner.generation, tx))
                }
            }
        };
        let (generation, tx) = match started {
            Ok(started) => started,
            Err(rx) => {
                debug!("joining in-flight encryption context initialization");
                return Self::await_outcome(rx).await;
            }
        };

        let mut pending = PendingInit {
            context: self,
            generation,
            armed: true,
        };

        let outcome = self.setup().await;
        pending.armed = false;

        {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.slot = match &outcome {
                    Ok(elgamal) => Slot::Ready(elgamal.clone()),
                    Err(reason) => Slot::Failed(reason.clone()),
                };
            } else {
                debug!("context was reset during initialization; result discarded");
            }
        }
        let _ = tx.send(Some(outcome.clone()));

        match outcome {
            Ok(_) => {
                info!("encryption context ready");
                Ok(())
            }
            Err(reason) => {
                warn!(%reason, "encryption context failed to initialize");
                Err(ReferendumError::InitializationFailed(reason))
            }
        }
    }

    async fn setup(&self) -> Outcome {
        let public_key = self
            .provider
            .fetch_public_key()
            .await
            .map_err(|e| e.to_string())?;
        ElGamal::with_config(public_key, self.config.clone())
            .map(Arc::new)
            .map_err(|e| e.to_string())
    }

    async fn await_outcome(mut rx: watch::Receiver<Option<Outcome>>) -> Result<()> {
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| {
                ReferendumError::InitializationFailed("initialization was abandoned".to_string())
            })?
            .clone();
        match outcome {
            Some(Ok(_)) => Ok(()),
            Some(Err(reason)) => Err(ReferendumError::InitializationFailed(reason)),
            None => Err(ReferendumError::NotInitialized),
        }
    }

    /// Drop any key material and return to `Uninitialized`
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.slot = Slot::Uninitialized;
        debug!(generation = inner.generation, "encryption context reset");
    }

    /// Encrypt one yes/no ballot scoped to `(contract, voter)`
    pub fn encrypt_vote(
        &self,
        contract: Address,
        voter: Address,
        is_yes: bool,
    ) -> Result<EncryptedInput> {
        let elgamal = match &self.lock().slot {
            Slot::Ready(elgamal) => elgamal.clone(),
            _ => return Err(ReferendumError::NotInitialized),
        };

        let k = elgamal.random_nonce();
        let ciphertext = elgamal.encrypt_with_randomness(u64::from(is_yes), &k)?;
        let ballot = elgamal.prove_ballot(&ciphertext, is_yes, &k, &contract, &voter);
        let handle = input_handle(&contract, &voter, &ciphertext);
        let proof = InputProof { ciphertext, ballot }.to_bytes()?;

        Ok(EncryptedInput { handle, proof })
    }
}
