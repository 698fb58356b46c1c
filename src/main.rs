//! End-to-end referendum walkthrough against the in-process relayer.
//!
//! Run with `RUST_LOG=referendum=debug` to see the protocol trace.

use std::sync::Arc;

use referendum::{
    Address, Coprocessor, DecryptionOrchestrator, EncryptionContext, KeyPair, LocalRelayer,
    ManualClock, ProposalStatus, Referendum, ReferendumConfig, ReferendumError, RelayerConfig,
    Result,
};
use tracing_subscriber::EnvFilter;

const VOTES: [(&str, bool); 5] = [
    ("alice", true),
    ("bob", false),
    ("carol", true),
    ("dave", true),
    ("erin", false),
];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ReferendumError::InitializationFailed(e.to_string()))?;
    runtime.block_on(run())
}

async fn run() -> Result<()> {
    println!("=== Confidential Referendum Demo ===\n");

    let config = ReferendumConfig::default();
    println!("Generating {}-bit safe-prime network key...", config.key_bits);
    let keypair = KeyPair::generate(config.key_bits)?;
    let coprocessor = Coprocessor::new(keypair.public_key.clone(), config)?;

    let clock = ManualClock::new(1_700_000_000);
    let mut referendum = Referendum::new(
        Address::derive(b"referendum-demo"),
        coprocessor.clone(),
        Arc::new(clock.clone()),
    );
    println!("Registry deployed at {}", referendum.address());

    // ========== PROPOSAL ==========
    println!("\n--- Proposal ---");
    let creator = Address::derive(b"creator");
    let id = referendum.create_proposal(creator, "Fund the community garden", 60)?;
    let info = referendum.get_proposal(id);
    println!("#{} \"{}\" by {}, ends at {}", id, info.title, info.creator, info.end_time);

    // ========== VOTING ==========
    println!("\n--- Voting ---");
    let context = EncryptionContext::new(coprocessor.clone());
    context.initialize().await?;

    for (name, is_yes) in VOTES {
        let voter = Address::derive(name.as_bytes());
        let input = context.encrypt_vote(referendum.address(), voter, is_yes)?;
        referendum.vote(voter, id, input.handle, &input.proof)?;
        println!("{:>6} voted with handle {}", name, input.handle);
    }

    let alice = Address::derive(b"alice");
    let again = context.encrypt_vote(referendum.address(), alice, false)?;
    match referendum.vote(alice, id, again.handle, &again.proof) {
        Err(e) => println!("Second ballot from alice refused: {}", e),
        Ok(()) => println!("Second ballot from alice was accepted (unexpected)"),
    }

    // ========== REVEAL ==========
    println!("\n--- Reveal ---");
    let relayer = LocalRelayer::new(keypair.private_key, coprocessor)?;
    let orchestrator = DecryptionOrchestrator::new(relayer, RelayerConfig::default());

    if let Err(e) = referendum.allow_decryption(creator, id) {
        println!("Authorization before the deadline refused: {}", e);
    }
    if let Err(e) = orchestrator.reveal_proposal(&referendum, id).await {
        println!("Reveal before authorization refused: {}", e);
    }

    clock.advance(60 * 60);
    println!("Voting closed: {}", referendum.is_ended(id));
    referendum.allow_decryption(creator, id)?;
    assert_eq!(referendum.status(id), ProposalStatus::Revealable);

    let tally = orchestrator.reveal_proposal(&referendum, id).await?;
    println!("Yes: {}", tally.yes);
    println!("No:  {}", tally.no);
    println!(
        "Result: {}",
        if tally.yes > tally.no { "adopted" } else { "rejected" }
    );

    println!("\nEvents:");
    for event in referendum.events() {
        println!("  {:?}", event);
    }

    Ok(())
}
