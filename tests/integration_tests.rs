//! Integration tests for the referendum flow

use std::sync::Arc;

use referendum::{
    Address, Coprocessor, DecryptionOrchestrator, EncryptionContext, Event, KeyPair,
    LocalRelayer, ManualClock, ProposalStatus, Referendum, ReferendumConfig, ReferendumError,
    RelayerConfig, ResponseEncoding,
};

struct Deployment {
    keypair: KeyPair,
    coprocessor: Coprocessor,
    clock: ManualClock,
    referendum: Referendum,
    context: EncryptionContext<Coprocessor>,
}

async fn deploy() -> Deployment {
    let keypair = KeyPair::generate_for_testing(512).expect("Failed to generate keys");
    let config = ReferendumConfig {
        max_tally: 1_000,
        ..ReferendumConfig::default()
    };
    let coprocessor = Coprocessor::new(keypair.public_key.clone(), config).unwrap();
    let clock = ManualClock::new(1_700_000_000);
    let referendum = Referendum::new(
        Address::derive(b"referendum"),
        coprocessor.clone(),
        Arc::new(clock.clone()),
    );
    let context = EncryptionContext::new(coprocessor.clone());
    context.initialize().await.unwrap();
    Deployment {
        keypair,
        coprocessor,
        clock,
        referendum,
        context,
    }
}

impl Deployment {
    fn cast(&mut self, id: u64, name: &str, is_yes: bool) -> Result<(), ReferendumError> {
        let voter = Address::derive(name.as_bytes());
        let input = self
            .context
            .encrypt_vote(self.referendum.address(), voter, is_yes)?;
        self.referendum.vote(voter, id, input.handle, &input.proof)
    }

    fn orchestrator(&self, encoding: ResponseEncoding) -> DecryptionOrchestrator<LocalRelayer> {
        let relayer = LocalRelayer::new(self.keypair.private_key.clone(), self.coprocessor.clone())
            .unwrap()
            .with_encoding(encoding);
        DecryptionOrchestrator::new(relayer, RelayerConfig::default())
    }
}

#[tokio::test]
async fn test_end_to_end_tally() {
    let mut d = deploy().await;
    let creator = Address::derive(b"creator");
    let id = d.referendum.create_proposal(creator, "Extend library hours", 30).unwrap();

    let ballots = [
        ("v1", true),
        ("v2", false),
        ("v3", true),
        ("v4", true),
        ("v5", false),
        ("v6", true),
        ("v7", false),
    ];
    for (name, choice) in ballots {
        d.cast(id, name, choice).unwrap();
    }

    d.clock.advance(30 * 60);
    d.referendum.allow_decryption(creator, id).unwrap();

    let tally = d
        .orchestrator(ResponseEncoding::Packed)
        .reveal_proposal(&d.referendum, id)
        .await
        .unwrap();
    assert_eq!((tally.yes, tally.no), (4, 3));
}

#[tokio::test]
async fn test_tally_is_independent_of_vote_order() {
    let choices = [true, false, false, true, true, false, true, true];

    let mut forward = deploy().await;
    let mut backward = deploy().await;
    let creator = Address::derive(b"creator");
    let id_f = forward.referendum.create_proposal(creator, "Order", 5).unwrap();
    let id_b = backward.referendum.create_proposal(creator, "Order", 5).unwrap();

    for (i, choice) in choices.iter().enumerate() {
        forward.cast(id_f, &format!("voter-{i}"), *choice).unwrap();
    }
    for (i, choice) in choices.iter().enumerate().rev() {
        backward.cast(id_b, &format!("voter-{i}"), *choice).unwrap();
    }

    let mut tallies = Vec::new();
    for (d, id) in [(&mut forward, id_f), (&mut backward, id_b)] {
        d.clock.advance(5 * 60);
        d.referendum.allow_decryption(creator, id).unwrap();
        let tally = d
            .orchestrator(ResponseEncoding::ClearValues)
            .reveal_proposal(&d.referendum, id)
            .await
            .unwrap();
        tallies.push((tally.yes, tally.no));
    }
    assert_eq!(tallies, vec![(5, 3), (5, 3)]);
}

#[tokio::test]
async fn test_every_relayer_encoding_reveals_the_same_tally() {
    let mut d = deploy().await;
    let creator = Address::derive(b"creator");
    let id = d.referendum.create_proposal(creator, "Encodings", 1).unwrap();
    for (i, choice) in [true, true, true, false, false, false, false, false].iter().enumerate() {
        d.cast(id, &format!("v{i}"), *choice).unwrap();
    }
    d.clock.advance(60);
    d.referendum.allow_decryption(creator, id).unwrap();

    for encoding in [
        ResponseEncoding::Packed,
        ResponseEncoding::ClearValues,
        ResponseEncoding::Values,
        ResponseEncoding::Bare,
    ] {
        let tally = d
            .orchestrator(encoding)
            .reveal_proposal(&d.referendum, id)
            .await
            .unwrap();
        assert_eq!((tally.yes, tally.no), (3, 5), "{encoding:?}");
    }
}

#[tokio::test]
async fn test_reveal_requires_authorization() {
    let mut d = deploy().await;
    let creator = Address::derive(b"creator");
    let id = d.referendum.create_proposal(creator, "Gate", 1).unwrap();
    d.cast(id, "alice", true).unwrap();
    d.clock.advance(60);

    let orchestrator = d.orchestrator(ResponseEncoding::Packed);
    let err = orchestrator
        .reveal_proposal(&d.referendum, id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReferendumError::Acl(_)));
    assert!(!err.is_retryable());
    assert_eq!(d.referendum.status(id), ProposalStatus::ClosedUnauthorized);

    d.referendum.allow_decryption(creator, id).unwrap();
    let tally = orchestrator.reveal_proposal(&d.referendum, id).await.unwrap();
    assert_eq!((tally.yes, tally.no), (1, 0));
}

#[tokio::test]
async fn test_unknown_proposal_behaviour() {
    let mut d = deploy().await;
    let voter = Address::derive(b"alice");

    assert_eq!(d.referendum.proposal_count(), 0);
    assert!(!d.referendum.get_proposal(999).exists);
    assert_eq!(
        d.referendum.get_proposal_handles(999).unwrap_err(),
        ReferendumError::NotFound
    );
    assert_eq!(d.cast(999, "alice", true).unwrap_err(), ReferendumError::NotFound);
    assert!(d.referendum.is_ended(999));
    assert!(!d.referendum.has_user_voted(999, &voter));
    assert_eq!(
        d.referendum.allow_decryption(voter, 999).unwrap_err(),
        ReferendumError::NotFound
    );
}

#[tokio::test]
async fn test_proposal_lifecycle_and_events() {
    let mut d = deploy().await;
    let creator = Address::derive(b"creator");

    assert!(matches!(
        d.referendum.create_proposal(creator, "", 5),
        Err(ReferendumError::Validation(_))
    ));
    assert!(matches!(
        d.referendum.create_proposal(creator, "Zero", 0),
        Err(ReferendumError::Validation(_))
    ));

    let first = d.referendum.create_proposal(creator, "X", 1).unwrap();
    let second = d.referendum.create_proposal(creator, "Y", 2).unwrap();
    assert_eq!((first, second), (1, 2));
    assert_eq!(d.referendum.proposal_ids().collect::<Vec<_>>(), vec![1, 2]);
    assert!(!d.referendum.is_ended(first));

    d.cast(first, "alice", false).unwrap();
    assert_eq!(
        d.cast(first, "alice", true).unwrap_err(),
        ReferendumError::AlreadyVoted
    );

    assert_eq!(
        d.referendum.allow_decryption(creator, first).unwrap_err(),
        ReferendumError::VotingNotEnded
    );
    d.clock.advance(60);
    assert!(d.referendum.is_ended(first));
    assert!(!d.referendum.is_ended(second));
    assert_eq!(d.cast(first, "bob", true).unwrap_err(), ReferendumError::VotingEnded);

    d.referendum.allow_decryption(creator, first).unwrap();
    d.referendum.allow_decryption(creator, first).unwrap();

    let alice = Address::derive(b"alice");
    let kinds: Vec<&Event> = d.referendum.events().iter().collect();
    assert_eq!(kinds.len(), 4);
    assert!(matches!(kinds[0], Event::ProposalCreated { id: 1, .. }));
    assert!(matches!(kinds[1], Event::ProposalCreated { id: 2, .. }));
    assert_eq!(kinds[2], &Event::VoteCast { id: 1, voter: alice });
    assert!(matches!(kinds[3], Event::DecryptionReady { id: 1, .. }));
}

#[tokio::test]
async fn test_ballot_bound_to_contract_and_voter() {
    let mut d = deploy().await;
    let creator = Address::derive(b"creator");
    let id = d.referendum.create_proposal(creator, "Replay", 5).unwrap();
    let alice = Address::derive(b"alice");
    let mallory = Address::derive(b"mallory");

    let for_other_contract = d
        .context
        .encrypt_vote(Address::derive(b"elsewhere"), alice, true)
        .unwrap();
    assert_eq!(
        d.referendum
            .vote(alice, id, for_other_contract.handle, &for_other_contract.proof)
            .unwrap_err(),
        ReferendumError::InvalidProof
    );

    let alices = d
        .context
        .encrypt_vote(d.referendum.address(), alice, true)
        .unwrap();
    assert_eq!(
        d.referendum
            .vote(mallory, id, alices.handle, &alices.proof)
            .unwrap_err(),
        ReferendumError::InvalidProof
    );
    assert!(!d.referendum.has_user_voted(id, &mallory));

    d.referendum.vote(alice, id, alices.handle, &alices.proof).unwrap();
    assert!(d.referendum.has_user_voted(id, &alice));
}
