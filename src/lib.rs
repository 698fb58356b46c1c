//! # Confidential Referendum
//!
//! Yes/no proposals whose votes stay encrypted from submission to reveal:
//! - Ballots are exponential ElGamal encryptions of 0 or 1, shipped with a
//!   zero-knowledge proof bound to the contract and the voter
//! - Tallies are updated with an oblivious select, never by branching on a vote
//! - Results are revealed in two phases: authorization on the registry, then
//!   public decryption through a relayer
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use referendum::{
//!     Address, Coprocessor, DecryptionOrchestrator, EncryptionContext, KeyPair,
//!     LocalRelayer, ManualClock, Referendum, ReferendumConfig, RelayerConfig,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let keypair = KeyPair::generate_for_testing(512).unwrap();
//! let config = ReferendumConfig { max_tally: 100, ..ReferendumConfig::default() };
//! let coprocessor = Coprocessor::new(keypair.public_key.clone(), config).unwrap();
//!
//! let clock = ManualClock::new(1_700_000_000);
//! let mut referendum = Referendum::new(
//!     Address::derive(b"referendum"),
//!     coprocessor.clone(),
//!     Arc::new(clock.clone()),
//! );
//! let creator = Address::derive(b"creator");
//! let id = referendum.create_proposal(creator, "Plant more trees", 10).unwrap();
//!
//! // A voter encrypts a ballot for this contract and casts it
//! let context = EncryptionContext::new(coprocessor.clone());
//! context.initialize().await.unwrap();
//! let voter = Address::derive(b"voter");
//! let input = context.encrypt_vote(referendum.address(), voter, true).unwrap();
//! referendum.vote(voter, id, input.handle, &input.proof).unwrap();
//!
//! // Close, authorize and reveal
//! clock.advance(10 * 60);
//! referendum.allow_decryption(creator, id).unwrap();
//! let relayer = LocalRelayer::new(keypair.private_key, coprocessor).unwrap();
//! let orchestrator = DecryptionOrchestrator::new(relayer, RelayerConfig::default());
//! let tally = orchestrator.reveal_proposal(&referendum, id).await.unwrap();
//! assert_eq!((tally.yes, tally.no), (1, 0));
//! # });
//! ```

pub mod client;
pub mod coprocessor;
pub mod encryption;
pub mod error;
mod gate;
pub mod homomorphic;
pub mod keys;
pub mod proofs;
pub mod registry;
pub mod relayer;
pub mod service;
pub mod types;
pub mod utils;
mod voting;

// Re-export main types for convenience
pub use client::{ContextState, EncryptionContext, KeyProvider};
pub use coprocessor::Coprocessor;
pub use encryption::ElGamal;
pub use error::{ReferendumError, Result};
pub use homomorphic::HomomorphicOperations;
pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use proofs::{BallotProof, BallotProofs, InputProof};
pub use registry::{
    Clock, Event, ManualClock, ProposalHandles, ProposalInfo, ProposalStatus, Referendum,
    SystemClock,
};
pub use relayer::{
    DecryptionOrchestrator, DecryptionResponse, PublicDecryptRequest, RelayerResponse,
    RelayerTransport, RevealedTally, TransportError,
};
pub use service::{LocalRelayer, ResponseEncoding};
pub use types::{
    Address, Ciphertext, CiphertextHandle, EncryptedInput, ReferendumConfig, RelayerConfig,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
