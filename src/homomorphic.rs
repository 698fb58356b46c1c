//! Homomorphic operations on ciphertexts

use num_bigint::BigUint;

use crate::encryption::ElGamal;
use crate::types::Ciphertext;
use crate::utils::{mod_exp, signed_to_mod};

/// Trait for homomorphic operations over exponential ElGamal
pub trait HomomorphicOperations {
    /// Enc(a) * Enc(b) = Enc(a + b)
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext;

    /// Enc(m)^k = Enc(k * m)
    fn scalar_mul(&self, ct: &Ciphertext, scalar: &BigUint) -> Ciphertext;

    /// Oblivious multiplexer over an encrypted bit:
    /// Enc(b) -> Enc(b ? if_true : if_false)
    ///
    /// Evaluated as `if_false + b * (if_true - if_false)` with one public
    /// exponent, so neither control flow nor the operations performed depend
    /// on `b`. The bit is never decrypted.
    fn select_constant(&self, cond: &Ciphertext, if_true: u64, if_false: u64) -> Ciphertext;
}

impl HomomorphicOperations for ElGamal {
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
        let p = &self.public_key.p;
        Ciphertext::new((&a.c1 * &b.c1) % p, (&a.c2 * &b.c2) % p)
    }

    fn scalar_mul(&self, ct: &Ciphertext, scalar: &BigUint) -> Ciphertext {
        let p = &self.public_key.p;
        Ciphertext::new(mod_exp(&ct.c1, scalar, p), mod_exp(&ct.c2, scalar, p))
    }

    fn select_constant(&self, cond: &Ciphertext, if_true: u64, if_false: u64) -> Ciphertext {
        let order = self.public_key.exponent_modulus();
        let delta = signed_to_mod(if_true as i128 - if_false as i128, &order);
        let scaled = self.scalar_mul(cond, &delta);
        self.add(&scaled, &self.trivial_encrypt(if_false))
    }
}
