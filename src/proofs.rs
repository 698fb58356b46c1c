//! Non-interactive zero-knowledge proofs for encrypted ballots
//!
//! A ballot is an encryption of 0 or 1. The voter proves this with a
//! disjunctive Chaum-Pedersen proof made non-interactive with Fiat-Shamir.
//! The challenge hash commits to the contract and voter identities, so a
//! proof is only valid for the `(contract, voter)` pair it was made for.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::encryption::ElGamal;
use crate::error::{ReferendumError, Result};
use crate::types::{Address, Ciphertext, CiphertextHandle};
use crate::utils::{hash_to_scalar, mod_exp, mod_inverse, random_in_range, sub_mod};

const BALLOT_DOMAIN: &[u8] = b"referendum.ballot.v1";
const INPUT_HANDLE_DOMAIN: &[u8] = b"referendum.input-handle.v1";

/// One branch of the OR-proof: commitments (a, b), challenge and response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchProof {
    pub a: BigUint,
    pub b: BigUint,
    pub challenge: BigUint,
    pub response: BigUint,
}

/// Proof that a ciphertext encrypts 0 or 1, without saying which
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotProof {
    pub branches: [BranchProof; 2],
}

/// What the client ships as `inputProof`: the ciphertext behind the handle
/// together with its validity proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof {
    pub ciphertext: Ciphertext,
    pub ballot: BallotProof,
}

impl InputProof {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ReferendumError::CryptoError(format!("proof encoding failed: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (proof, read) =
            bincode::serde::decode_from_slice::<Self, _>(bytes, bincode::config::standard())
                .map_err(|_| ReferendumError::InvalidProof)?;
        if read != bytes.len() {
            return Err(ReferendumError::InvalidProof);
        }
        Ok(proof)
    }
}

/// Handle of a client-submitted ciphertext. Commits to the ciphertext and to
/// the `(contract, voter)` scope it was produced for.
pub fn input_handle(
    contract: &Address,
    voter: &Address,
    ciphertext: &Ciphertext,
) -> CiphertextHandle {
    let mut hasher = Sha256::new();
    hasher.update(INPUT_HANDLE_DOMAIN);
    hasher.update(contract.as_bytes());
    hasher.update(voter.as_bytes());
    for component in [&ciphertext.c1, &ciphertext.c2] {
        let bytes = component.to_bytes_be();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    CiphertextHandle::from_digest(hasher.finalize().into())
}

/// Trait for producing and checking ballot proofs
pub trait BallotProofs {
    /// Prove that `ciphertext = Enc(bit; k)` with `bit` in {0, 1}
    fn prove_ballot(
        &self,
        ciphertext: &Ciphertext,
        bit: bool,
        k: &BigUint,
        contract: &Address,
        voter: &Address,
    ) -> BallotProof;

    /// Check a ballot proof for the given scope
    fn verify_ballot(
        &self,
        ciphertext: &Ciphertext,
        proof: &BallotProof,
        contract: &Address,
        voter: &Address,
    ) -> bool;
}

impl ElGamal {
    fn ballot_challenge(
        &self,
        ciphertext: &Ciphertext,
        commitments: [&BigUint; 4],
        contract: &Address,
        voter: &Address,
    ) -> BigUint {
        let pk = &self.public_key;
        hash_to_scalar(
            BALLOT_DOMAIN,
            &[contract.as_bytes().as_slice(), voter.as_bytes().as_slice()],
            &[
                &pk.p,
                &pk.q,
                &pk.g,
                &pk.h,
                &ciphertext.c1,
                &ciphertext.c2,
                commitments[0],
                commitments[1],
                commitments[2],
                commitments[3],
            ],
            &pk.exponent_modulus(),
        )
    }

    /// c2 / g^v mod p
    fn shifted_c2(&self, ciphertext: &Ciphertext, v: u32) -> Option<BigUint> {
        let pk = &self.public_key;
        let g_v = mod_exp(&pk.g, &BigUint::from(v), &pk.p);
        let inv = mod_inverse(&g_v, &pk.p)?;
        Some((&ciphertext.c2 * inv) % &pk.p)
    }
}

impl BallotProofs for ElGamal {
    fn prove_ballot(
        &self,
        ciphertext: &Ciphertext,
        bit: bool,
        k: &BigUint,
        contract: &Address,
        voter: &Address,
    ) -> BallotProof {
        let pk = &self.public_key;
        let p = &pk.p;
        let q = pk.exponent_modulus();
        let real = bit as usize;
        let fake = 1 - real;

        // Simulated branch: pick challenge and response, solve for commitments
        let fake_challenge = random_in_range(&q);
        let fake_response = random_in_range(&q);
        let fake_c1 = mod_inverse(&mod_exp(&ciphertext.c1, &fake_challenge, p), p)
            .unwrap_or_default();
        let shifted = self.shifted_c2(ciphertext, fake as u32).unwrap_or_default();
        let fake_c2 = mod_inverse(&mod_exp(&shifted, &fake_challenge, p), p).unwrap_or_default();
        let fake_a = (mod_exp(&pk.g, &fake_response, p) * fake_c1) % p;
        let fake_b = (mod_exp(&pk.h, &fake_response, p) * fake_c2) % p;

        // Real branch: honest commitment
        let w = random_in_range(&q);
        let real_a = mod_exp(&pk.g, &w, p);
        let real_b = mod_exp(&pk.h, &w, p);

        let mut a = [BigUint::default(), BigUint::default()];
        let mut b = [BigUint::default(), BigUint::default()];
        a[real] = real_a;
        b[real] = real_b;
        a[fake] = fake_a;
        b[fake] = fake_b;

        let commitments = [&a[0], &b[0], &a[1], &b[1]];
        let challenge = self.ballot_challenge(ciphertext, commitments, contract, voter);
        let real_challenge = sub_mod(&challenge, &fake_challenge, &q);
        let real_response = (w + &real_challenge * k) % &q;

        let mut challenges = [BigUint::default(), BigUint::default()];
        let mut responses = [BigUint::default(), BigUint::default()];
        challenges[real] = real_challenge;
        responses[real] = real_response;
        challenges[fake] = fake_challenge;
        responses[fake] = fake_response;

        let [a0, a1] = a;
        let [b0, b1] = b;
        let [c0, c1] = challenges;
        let [s0, s1] = responses;
        BallotProof {
            branches: [
                BranchProof {
                    a: a0,
                    b: b0,
                    challenge: c0,
                    response: s0,
                },
                BranchProof {
                    a: a1,
                    b: b1,
                    challenge: c1,
                    response: s1,
                },
            ],
        }
    }

    fn verify_ballot(
        &self,
        ciphertext: &Ciphertext,
        proof: &BallotProof,
        contract: &Address,
        voter: &Address,
    ) -> bool {
        if !self.is_well_formed(ciphertext) {
            return false;
        }

        let pk = &self.public_key;
        let p = &pk.p;
        let q = pk.exponent_modulus();
        let [br0, br1] = &proof.branches;

        let commitments = [&br0.a, &br0.b, &br1.a, &br1.b];
        let expected = self.ballot_challenge(ciphertext, commitments, contract, voter);
        if (&br0.challenge + &br1.challenge) % &q != expected {
            return false;
        }

        proof.branches.iter().zip(0u32..).all(|(branch, v)| {
            let Some(shifted) = self.shifted_c2(ciphertext, v) else {
                return false;
            };
            // g^s = a * c1^c
            let lhs1 = mod_exp(&pk.g, &branch.response, p);
            let rhs1 = (&branch.a * mod_exp(&ciphertext.c1, &branch.challenge, p)) % p;
            // h^s = b * (c2 / g^v)^c
            let lhs2 = mod_exp(&pk.h, &branch.response, p);
            let rhs2 = (&branch.b * mod_exp(&shifted, &branch.challenge, p)) % p;
            lhs1 == rhs1 && lhs2 == rhs2
        })
    }
}
