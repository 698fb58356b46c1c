//! Ciphertext store and access-control list behind opaque handles
//!
//! Contracts never touch ciphertexts directly. They hold [`CiphertextHandle`]s
//! and ask the coprocessor to compute on them; every input handle must be
//! usable by the caller, and every result handle is owned by the caller.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::encryption::ElGamal;
use crate::error::{ReferendumError, Result};
use crate::homomorphic::HomomorphicOperations;
use crate::keys::PublicKey;
use crate::proofs::{input_handle, BallotProofs, InputProof};
use crate::types::{Address, Ciphertext, CiphertextHandle, ReferendumConfig};

const COMPUTED_HANDLE_DOMAIN: &[u8] = b"referendum.computed-handle.v1";

#[derive(Debug, Default)]
struct State {
    ciphertexts: HashMap<CiphertextHandle, Ciphertext>,
    acl: HashMap<CiphertextHandle, HashSet<Address>>,
    public: HashSet<CiphertextHandle>,
    sequence: u64,
}

impl State {
    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.acl
            .get(handle)
            .is_some_and(|accounts| accounts.contains(account))
    }

    fn operand(&self, caller: &Address, handle: &CiphertextHandle) -> Result<Ciphertext> {
        if !self.is_allowed(handle, caller) {
            return Err(ReferendumError::Acl(format!(
                "{} may not use handle {}",
                caller, handle
            )));
        }
        self.ciphertexts
            .get(handle)
            .cloned()
            .ok_or_else(|| ReferendumError::Acl(format!("unknown handle {}", handle)))
    }

    fn store(&mut self, owner: Address, handle: CiphertextHandle, ciphertext: Ciphertext) {
        self.ciphertexts.insert(handle, ciphertext);
        self.acl.entry(handle).or_default().insert(owner);
    }

    fn store_computed(&mut self, owner: Address, ciphertext: Ciphertext) -> CiphertextHandle {
        self.sequence += 1;
        let mut hasher = Sha256::new();
        hasher.update(COMPUTED_HANDLE_DOMAIN);
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(ciphertext.c1.to_bytes_be());
        hasher.update(ciphertext.c2.to_bytes_be());
        let handle = CiphertextHandle::from_digest(hasher.finalize().into());
        self.store(owner, handle, ciphertext);
        handle
    }
}

/// Shared handle to the encrypted-value engine. Clones refer to the same store.
#[derive(Clone, Debug)]
pub struct Coprocessor {
    elgamal: Arc<ElGamal>,
    state: Arc<RwLock<State>>,
}

impl Coprocessor {
    pub fn new(public_key: PublicKey, config: ReferendumConfig) -> Result<Self> {
        Ok(Coprocessor {
            elgamal: Arc::new(ElGamal::with_config(public_key, config)?),
            state: Arc::new(RwLock::new(State::default())),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.elgamal.public_key
    }

    pub fn config(&self) -> &ReferendumConfig {
        self.elgamal.config()
    }

    /// Encrypted constant owned by `owner`
    pub fn trivial_encrypt(&self, owner: Address, value: u64) -> CiphertextHandle {
        let ciphertext = self.elgamal.trivial_encrypt(value);
        self.write().store_computed(owner, ciphertext)
    }

    /// Accept a client-submitted encrypted bit for use by `contract`.
    ///
    /// Checks that the proof decodes, that `handle` commits to the proof's
    /// ciphertext for this `(contract, sender)` scope, and that the ballot
    /// proof verifies. Every failure is reported as `InvalidProof`.
    pub fn verify_input(
        &self,
        contract: Address,
        sender: Address,
        handle: CiphertextHandle,
        proof: &[u8],
    ) -> Result<CiphertextHandle> {
        let input = InputProof::from_bytes(proof).inspect_err(|_| {
            debug!(%handle, "input proof does not decode");
        })?;

        if input_handle(&contract, &sender, &input.ciphertext) != handle {
            debug!(%handle, "input handle does not match proof scope");
            return Err(ReferendumError::InvalidProof);
        }

        if !self
            .elgamal
            .verify_ballot(&input.ciphertext, &input.ballot, &contract, &sender)
        {
            debug!(%handle, "ballot proof rejected");
            return Err(ReferendumError::InvalidProof);
        }

        self.write().store(contract, handle, input.ciphertext);
        trace!(%handle, %contract, "input accepted");
        Ok(handle)
    }

    /// Homomorphic addition; result owned by `caller`
    pub fn add(
        &self,
        caller: Address,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
    ) -> Result<CiphertextHandle> {
        let (ct_a, ct_b) = {
            let state = self.read();
            (state.operand(&caller, a)?, state.operand(&caller, b)?)
        };
        let sum = self.elgamal.add(&ct_a, &ct_b);
        Ok(self.write().store_computed(caller, sum))
    }

    /// Oblivious `cond ? if_true : if_false` over an encrypted bit
    pub fn select_constant(
        &self,
        caller: Address,
        cond: &CiphertextHandle,
        if_true: u64,
        if_false: u64,
    ) -> Result<CiphertextHandle> {
        let ct = self.read().operand(&caller, cond)?;
        let selected = self.elgamal.select_constant(&ct, if_true, if_false);
        Ok(self.write().store_computed(caller, selected))
    }

    /// Grant `account` use of `handle`. Only an account already allowed may grant.
    pub fn allow(
        &self,
        caller: Address,
        handle: &CiphertextHandle,
        account: Address,
    ) -> Result<()> {
        let mut state = self.write();
        if !state.is_allowed(handle, &caller) {
            return Err(ReferendumError::Acl(format!(
                "{} may not grant access to {}",
                caller, handle
            )));
        }
        state.acl.entry(*handle).or_default().insert(account);
        Ok(())
    }

    pub fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.read().is_allowed(handle, account)
    }

    /// Let the decryption service reveal `handle` to anyone. Granting twice is fine.
    pub fn make_publicly_decryptable(
        &self,
        caller: Address,
        handle: &CiphertextHandle,
    ) -> Result<()> {
        self.make_all_publicly_decryptable(caller, std::slice::from_ref(handle))
    }

    /// Publish every handle or none: all are checked before any is granted
    pub fn make_all_publicly_decryptable(
        &self,
        caller: Address,
        handles: &[CiphertextHandle],
    ) -> Result<()> {
        let mut state = self.write();
        if let Some(handle) = handles.iter().find(|h| !state.is_allowed(h, &caller)) {
            return Err(ReferendumError::Acl(format!(
                "{} may not publish {}",
                caller, handle
            )));
        }
        state.public.extend(handles.iter().copied());
        Ok(())
    }

    pub fn is_publicly_decryptable(&self, handle: &CiphertextHandle) -> bool {
        self.read().public.contains(handle)
    }

    /// Raw ciphertext lookup, for the decryption service
    pub fn ciphertext(&self, handle: &CiphertextHandle) -> Option<Ciphertext> {
        self.read().ciphertexts.get(handle).cloned()
    }
}
