//! Proposal registry: the single owner of proposal state
//!
//! Every mutating entry point takes `&mut self`, so calls are serialized and
//! each one either applies in full or returns an error with nothing changed.
//! Read-only queries take `&self` and always see a fully applied state.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coprocessor::Coprocessor;
use crate::error::{ReferendumError, Result};
use crate::types::{Address, CiphertextHandle, ReferendumConfig};

/// Source of the current time in unix seconds
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Manually driven clock; clones share the same time
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        ManualClock(Arc::new(AtomicU64::new(start)))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub id: u64,
    pub title: String,
    pub creator: Address,
    pub end_time: u64,
    pub yes_handle: CiphertextHandle,
    pub no_handle: CiphertextHandle,
    pub decryption_authorized: bool,
}

/// Public view of a proposal. Unknown ids read as the default value, with
/// `exists == false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalInfo {
    pub title: String,
    pub creator: Address,
    pub end_time: u64,
    pub exists: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalHandles {
    pub yes: CiphertextHandle,
    pub no: CiphertextHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    NotFound,
    Open,
    /// Voting is over but nobody has authorized decryption yet
    ClosedUnauthorized,
    Revealable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProposalCreated {
        id: u64,
        title: String,
        creator: Address,
        end_time: u64,
    },
    VoteCast {
        id: u64,
        voter: Address,
    },
    DecryptionReady {
        id: u64,
        yes_handle: CiphertextHandle,
        no_handle: CiphertextHandle,
    },
}

/// The referendum contract
#[derive(Debug)]
pub struct Referendum {
    pub(crate) address: Address,
    pub(crate) config: ReferendumConfig,
    pub(crate) coprocessor: Coprocessor,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) proposals: BTreeMap<u64, Proposal>,
    pub(crate) has_voted: HashSet<(u64, Address)>,
    pub(crate) proposal_count: u64,
    pub(crate) events: Vec<Event>,
}

impl Referendum {
    pub fn new(address: Address, coprocessor: Coprocessor, clock: Arc<dyn Clock>) -> Self {
        let config = coprocessor.config().clone();
        Referendum {
            address,
            config,
            coprocessor,
            clock,
            proposals: BTreeMap::new(),
            has_voted: HashSet::new(),
            proposal_count: 0,
            events: Vec::new(),
        }
    }

    /// Address the contract acts as towards the coprocessor
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn coprocessor(&self) -> &Coprocessor {
        &self.coprocessor
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now()
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Open a new proposal running for `duration_minutes` from now
    pub fn create_proposal(
        &mut self,
        caller: Address,
        title: &str,
        duration_minutes: u64,
    ) -> Result<u64> {
        if title.is_empty() {
            return Err(ReferendumError::Validation("Empty title".to_string()));
        }
        if title.chars().count() > self.config.max_title_len {
            return Err(ReferendumError::Validation(format!(
                "Title longer than {} characters",
                self.config.max_title_len
            )));
        }
        if duration_minutes < 1 {
            return Err(ReferendumError::Validation("Min 1 minute".to_string()));
        }
        let end_time = duration_minutes
            .checked_mul(60)
            .and_then(|secs| self.now().checked_add(secs))
            .ok_or_else(|| ReferendumError::Validation("Duration too long".to_string()))?;

        let yes_handle = self.coprocessor.trivial_encrypt(self.address, 0);
        let no_handle = self.coprocessor.trivial_encrypt(self.address, 0);

        self.proposal_count += 1;
        let id = self.proposal_count;
        self.proposals.insert(
            id,
            Proposal {
                id,
                title: title.to_string(),
                creator: caller,
                end_time,
                yes_handle,
                no_handle,
                decryption_authorized: false,
            },
        );

        info!(id, %caller, end_time, "proposal created");
        self.emit(Event::ProposalCreated {
            id,
            title: title.to_string(),
            creator: caller,
            end_time,
        });

        Ok(id)
    }

    pub fn get_proposal(&self, id: u64) -> ProposalInfo {
        self.proposals
            .get(&id)
            .map(|p| ProposalInfo {
                title: p.title.clone(),
                creator: p.creator,
                end_time: p.end_time,
                exists: true,
            })
            .unwrap_or_default()
    }

    pub fn get_proposal_handles(&self, id: u64) -> Result<ProposalHandles> {
        let proposal = self.proposals.get(&id).ok_or(ReferendumError::NotFound)?;
        Ok(ProposalHandles {
            yes: proposal.yes_handle,
            no: proposal.no_handle,
        })
    }

    pub fn has_user_voted(&self, id: u64, voter: &Address) -> bool {
        self.has_voted.contains(&(id, *voter))
    }

    /// True once `now >= end_time`. Unknown ids have end time 0 and so also
    /// read as ended; use [`Referendum::get_proposal`] to tell them apart.
    pub fn is_ended(&self, id: u64) -> bool {
        let end_time = self.proposals.get(&id).map_or(0, |p| p.end_time);
        self.now() >= end_time
    }

    pub fn proposal_count(&self) -> u64 {
        self.proposal_count
    }

    pub fn proposal_ids(&self) -> impl Iterator<Item = u64> {
        1..=self.proposal_count
    }

    pub fn is_decryption_authorized(&self, id: u64) -> bool {
        self.proposals
            .get(&id)
            .is_some_and(|p| p.decryption_authorized)
    }

    pub fn status(&self, id: u64) -> ProposalStatus {
        match self.proposals.get(&id) {
            None => ProposalStatus::NotFound,
            Some(p) if self.now() < p.end_time => ProposalStatus::Open,
            Some(p) if p.decryption_authorized => ProposalStatus::Revealable,
            Some(_) => ProposalStatus::ClosedUnauthorized,
        }
    }

    /// Events emitted so far, oldest first
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keys::KeyPair;

    pub(crate) fn setup() -> (KeyPair, ManualClock, Referendum) {
        let keypair = KeyPair::generate_for_testing(512).unwrap();
        let config = ReferendumConfig {
            max_tally: 1_000,
            max_title_len: 32,
            ..ReferendumConfig::default()
        };
        let coprocessor = Coprocessor::new(keypair.public_key.clone(), config).unwrap();
        let clock = ManualClock::new(1_700_000_000);
        let referendum = Referendum::new(
            Address::derive(b"referendum"),
            coprocessor,
            Arc::new(clock.clone()),
        );
        (keypair, clock, referendum)
    }

    #[test]
    fn test_ids_are_dense_from_one() {
        let (_, _, mut referendum) = setup();
        let creator = Address::derive(b"creator");
        assert_eq!(referendum.proposal_count(), 0);

        for expected in 1..=3 {
            let id = referendum.create_proposal(creator, "Proposal", 5).unwrap();
            assert_eq!(id, expected);
        }
        assert_eq!(referendum.proposal_count(), 3);
        assert_eq!(referendum.proposal_ids().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_create_validation() {
        let (_, _, mut referendum) = setup();
        let creator = Address::derive(b"creator");

        assert_eq!(
            referendum.create_proposal(creator, "", 5).unwrap_err(),
            ReferendumError::Validation("Empty title".to_string())
        );
        assert_eq!(
            referendum.create_proposal(creator, "Test Proposal", 0).unwrap_err(),
            ReferendumError::Validation("Min 1 minute".to_string())
        );
        assert!(matches!(
            referendum.create_proposal(creator, &"x".repeat(33), 5),
            Err(ReferendumError::Validation(_))
        ));
        assert!(matches!(
            referendum.create_proposal(creator, "Forever", u64::MAX),
            Err(ReferendumError::Validation(_))
        ));

        // Failed creations leave no trace
        assert_eq!(referendum.proposal_count(), 0);
        assert!(referendum.events().is_empty());
    }

    #[test]
    fn test_proposal_lifecycle_reads() {
        let (_, clock, mut referendum) = setup();
        let creator = Address::derive(b"creator");
        let start = clock.now();

        let id = referendum.create_proposal(creator, "X", 1).unwrap();
        let info = referendum.get_proposal(id);
        assert!(info.exists);
        assert_eq!(info.title, "X");
        assert_eq!(info.creator, creator);
        assert_eq!(info.end_time, start + 60);

        assert!(!referendum.is_ended(id));
        assert_eq!(referendum.status(id), ProposalStatus::Open);

        clock.advance(59);
        assert!(!referendum.is_ended(id));
        clock.advance(1);
        assert!(referendum.is_ended(id));
        assert_eq!(referendum.status(id), ProposalStatus::ClosedUnauthorized);

        assert_eq!(
            referendum.events(),
            &[Event::ProposalCreated {
                id,
                title: "X".to_string(),
                creator,
                end_time: start + 60,
            }]
        );
    }

    #[test]
    fn test_unknown_proposal_reads() {
        let (_, _, referendum) = setup();
        let voter = Address::derive(b"voter");

        let info = referendum.get_proposal(999);
        assert!(!info.exists);
        assert_eq!(info, ProposalInfo::default());
        assert_eq!(
            referendum.get_proposal_handles(999).unwrap_err(),
            ReferendumError::NotFound
        );
        assert!(!referendum.has_user_voted(999, &voter));
        assert!(referendum.is_ended(999));
        assert_eq!(referendum.status(999), ProposalStatus::NotFound);
        assert!(!referendum.is_decryption_authorized(999));
    }

    #[test]
    fn test_tally_handles_start_as_owned_zeroes() {
        let (keypair, _, mut referendum) = setup();
        let id = referendum
            .create_proposal(Address::derive(b"creator"), "Zero", 5)
            .unwrap();
        let handles = referendum.get_proposal_handles(id).unwrap();
        assert_ne!(handles.yes, handles.no);

        let coprocessor = referendum.coprocessor();
        assert!(coprocessor.is_allowed(&handles.yes, &referendum.address()));
        assert!(coprocessor.is_allowed(&handles.no, &referendum.address()));
        assert!(!coprocessor.is_publicly_decryptable(&handles.yes));

        let elgamal = crate::ElGamal::with_config(
            keypair.public_key.clone(),
            coprocessor.config().clone(),
        )
        .unwrap();
        for handle in [handles.yes, handles.no] {
            let ct = coprocessor.ciphertext(&handle).unwrap();
            assert_eq!(elgamal.decrypt(&ct, &keypair.private_key).unwrap(), 0);
        }
    }
}
