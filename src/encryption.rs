//! Exponential ElGamal encryption and decryption

use std::collections::HashMap;

use num_bigint::BigUint;
use num_integer::Roots;
use num_traits::One;

use crate::error::{ReferendumError, Result};
use crate::keys::{PrivateKey, PublicKey};
use crate::types::{Ciphertext, ReferendumConfig};
use crate::utils::{mod_exp, mod_inverse, random_in_range};

/// Largest `max_tally` accepted; keeps the baby-step table near a million entries
pub const MAX_TALLY_LIMIT: u64 = 1 << 40;

/// Baby-step table for recovering m from g^m when m <= max
#[derive(Clone, Debug)]
struct BabySteps {
    table: HashMap<BigUint, u64>,
    step: u64,
    giant_inv: BigUint,
}

impl BabySteps {
    fn build(public_key: &PublicKey, max: u64) -> Result<Self> {
        let step = max.saturating_add(1).sqrt() + 1;
        let mut table = HashMap::with_capacity(step as usize);
        let mut current = BigUint::one();
        for j in 0..step {
            table.entry(current.clone()).or_insert(j);
            current = (&current * &public_key.g) % &public_key.p;
        }
        // `current` is now g^step
        let giant_inv =
            mod_inverse(&current, &public_key.p).ok_or(ReferendumError::ModularInverseError)?;
        Ok(BabySteps {
            table,
            step,
            giant_inv,
        })
    }

    fn solve(&self, value: &BigUint, p: &BigUint, max: u64) -> Result<u64> {
        let mut gamma = value.clone();
        for i in 0..=self.step {
            if let Some(&j) = self.table.get(&gamma) {
                let m = i * self.step + j;
                if m <= max {
                    return Ok(m);
                }
                break;
            }
            gamma = (&gamma * &self.giant_inv) % p;
        }
        Err(ReferendumError::DiscreteLogError(format!(
            "plaintext exceeds the decryptable range 0..={}",
            max
        )))
    }
}

/// Additively homomorphic (exponential) ElGamal over the network key
#[derive(Clone, Debug)]
pub struct ElGamal {
    pub public_key: PublicKey,
    baby_steps: BabySteps,
    config: ReferendumConfig,
}

impl ElGamal {
    pub fn new(public_key: PublicKey) -> Result<Self> {
        Self::with_config(public_key, ReferendumConfig::default())
    }

    pub fn with_config(public_key: PublicKey, config: ReferendumConfig) -> Result<Self> {
        public_key.validate()?;
        if config.max_tally > MAX_TALLY_LIMIT
            || BigUint::from(config.max_tally) >= public_key.q
        {
            return Err(ReferendumError::InvalidParameter(format!(
                "max_tally {} exceeds the decryptable limit {}",
                config.max_tally, MAX_TALLY_LIMIT
            )));
        }
        let baby_steps = BabySteps::build(&public_key, config.max_tally)?;
        Ok(ElGamal {
            public_key,
            baby_steps,
            config,
        })
    }

    pub fn config(&self) -> &ReferendumConfig {
        &self.config
    }

    /// Largest plaintext this instance will encrypt or decrypt
    pub fn max_plaintext(&self) -> u64 {
        self.config.max_tally
    }

    /// Fresh encryption randomness k in [1, q)
    pub fn random_nonce(&self) -> BigUint {
        random_in_range(&self.public_key.exponent_modulus())
    }

    /// Encrypt a plaintext with fresh randomness
    pub fn encrypt(&self, plaintext: u64) -> Result<Ciphertext> {
        let k = self.random_nonce();
        self.encrypt_with_randomness(plaintext, &k)
    }

    /// Encrypt with caller-chosen randomness (needed to prove statements about the result)
    pub fn encrypt_with_randomness(&self, plaintext: u64, k: &BigUint) -> Result<Ciphertext> {
        if plaintext > self.config.max_tally {
            return Err(ReferendumError::PlaintextTooLarge {
                max: self.config.max_tally,
            });
        }

        let pk = &self.public_key;
        let c1 = mod_exp(&pk.g, k, &pk.p);
        let g_m = mod_exp(&pk.g, &BigUint::from(plaintext), &pk.p);
        let h_k = mod_exp(&pk.h, k, &pk.p);
        let c2 = (g_m * h_k) % &pk.p;

        Ok(Ciphertext::new(c1, c2))
    }

    /// Encryption with k = 0: (1, g^m). Used for public constants.
    pub fn trivial_encrypt(&self, plaintext: u64) -> Ciphertext {
        let pk = &self.public_key;
        Ciphertext::new(
            BigUint::one(),
            mod_exp(&pk.g, &BigUint::from(plaintext), &pk.p),
        )
    }

    /// Decrypt a ciphertext using the private key
    pub fn decrypt(&self, ciphertext: &Ciphertext, private_key: &PrivateKey) -> Result<u64> {
        let p = &self.public_key.p;
        let s = mod_exp(&ciphertext.c1, &private_key.x, p);
        let s_inv = mod_inverse(&s, p).ok_or(ReferendumError::ModularInverseError)?;
        let g_m = (&ciphertext.c2 * s_inv) % p;
        self.baby_steps.solve(&g_m, p, self.config.max_tally)
    }

    /// Check that both components lie in the order-q subgroup
    pub fn is_well_formed(&self, ciphertext: &Ciphertext) -> bool {
        self.public_key.contains(&ciphertext.c1) && self.public_key.contains(&ciphertext.c2)
    }
}
