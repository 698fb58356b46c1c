//! Network key generation and management

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{ReferendumError, Result};
use crate::utils::{
    find_subgroup_generator, generate_safe_prime, generate_schnorr_group, in_subgroup,
    is_probable_prime, mod_exp, random_in_range,
};

/// Subgroup order size used by [`KeyPair::generate_for_testing`]
pub const TESTING_SUBGROUP_BITS: u64 = 256;

/// Public half of the network key; every ciphertext in the system is under it.
///
/// All group elements live in the subgroup of prime order q generated by g.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub(crate) p: BigUint, // Prime modulus
    pub(crate) q: BigUint, // Prime subgroup order, q | p - 1
    pub(crate) g: BigUint, // Generator of the order-q subgroup
    pub(crate) h: BigUint, // g^x mod p
}

impl PublicKey {
    pub fn new(p: BigUint, q: BigUint, g: BigUint, h: BigUint) -> Self {
        PublicKey { p, q, g, h }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// g^x mod p
    pub fn public_component(&self) -> &BigUint {
        &self.h
    }

    pub fn subgroup_order(&self) -> &BigUint {
        &self.q
    }

    /// Modulus for exponent arithmetic (q)
    pub fn exponent_modulus(&self) -> BigUint {
        self.q.clone()
    }

    /// Whether `x` is an element of the order-q subgroup
    pub fn contains(&self, x: &BigUint) -> bool {
        in_subgroup(x, &self.p, &self.q)
    }

    pub fn bit_size(&self) -> u64 {
        self.p.bits()
    }

    /// Validate the public key
    pub fn validate(&self) -> Result<()> {
        if self.p <= BigUint::from(2u32) {
            return Err(ReferendumError::InvalidParameter(
                "Modulus p must be > 2".to_string(),
            ));
        }

        if self.g <= BigUint::one() || self.g >= self.p {
            return Err(ReferendumError::InvalidParameter(
                "Generator g must be in range (1, p)".to_string(),
            ));
        }

        if self.h <= BigUint::one() || self.h >= self.p {
            return Err(ReferendumError::InvalidParameter(
                "Public component h must be in range (1, p)".to_string(),
            ));
        }

        let p_minus_1 = &self.p - BigUint::one();
        if self.q <= BigUint::one()
            || !(&p_minus_1 % &self.q).is_zero()
            || !is_probable_prime(&self.q, 20)
        {
            return Err(ReferendumError::InvalidParameter(
                "Subgroup order q must be a prime dividing p - 1".to_string(),
            ));
        }

        if !self.contains(&self.g) || !self.contains(&self.h) {
            return Err(ReferendumError::InvalidParameter(
                "g and h must lie in the order-q subgroup".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.bit_size())
    }
}

/// Secret exponent held only by the decryption service
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub(crate) x: BigUint,
}

impl PrivateKey {
    pub fn new(x: BigUint) -> Self {
        PrivateKey { x }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(***)")
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(***)")
    }
}

/// Network key pair
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generate a key pair over a safe prime p = 2q + 1 of roughly `bit_size`
    /// bits, working in the subgroup of quadratic residues
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use referendum::KeyPair;
    ///
    /// let keypair = KeyPair::generate(1024).expect("Failed to generate keys");
    /// ```
    pub fn generate(bit_size: u64) -> Result<Self> {
        let (p, q) = generate_safe_prime(bit_size)?;
        Self::from_group(p, q)
    }

    /// Generate a key pair quickly for testing: a `bit_size` modulus with a
    /// 256-bit prime-order subgroup instead of a safe prime
    pub fn generate_for_testing(bit_size: u64) -> Result<Self> {
        let (p, q) = generate_schnorr_group(bit_size, TESTING_SUBGROUP_BITS)?;
        Self::from_group(p, q)
    }

    fn from_group(p: BigUint, q: BigUint) -> Result<Self> {
        let g = find_subgroup_generator(&p, &q);
        let x = random_in_range(&q);
        Self::from_components(p, q, g, x)
    }

    /// Create a key pair from existing components
    pub fn from_components(p: BigUint, q: BigUint, g: BigUint, x: BigUint) -> Result<Self> {
        if x.is_zero() || x >= q {
            return Err(ReferendumError::InvalidParameter(
                "Private exponent must be in range (0, q)".to_string(),
            ));
        }
        let h = mod_exp(&g, &x, &p);
        let public_key = PublicKey { p, q, g, h };
        public_key.validate()?;

        Ok(KeyPair {
            public_key,
            private_key: PrivateKey { x },
        })
    }

    pub fn bit_size(&self) -> u64 {
        self.public_key.bit_size()
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({} bits)", self.bit_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let keypair = KeyPair::generate_for_testing(512).unwrap();
        assert_eq!(keypair.public_key.bit_size(), 512);
        keypair.public_key.validate().unwrap();
        assert_eq!(
            mod_exp(&keypair.public_key.g, &keypair.private_key.x, &keypair.public_key.p),
            keypair.public_key.h
        );
    }

    #[test]
    fn test_key_validation() {
        let invalid = PublicKey::new(
            BigUint::from(2u32),
            BigUint::from(1u32),
            BigUint::from(1u32),
            BigUint::from(1u32),
        );
        assert!(invalid.validate().is_err());

        // A generator of the full group is refused
        let keypair = KeyPair::generate_for_testing(512).unwrap();
        let pk = &keypair.public_key;
        let full = PublicKey::new(
            pk.p.clone(),
            pk.q.clone(),
            &pk.p - 1u32,
            pk.h.clone(),
        );
        assert!(full.validate().is_err());
    }

    #[test]
    fn test_keys_live_in_prime_order_subgroup() {
        let keypair = KeyPair::generate_for_testing(512).unwrap();
        let pk = &keypair.public_key;
        assert_eq!(pk.subgroup_order().bits(), TESTING_SUBGROUP_BITS);
        assert!(pk.contains(&pk.g));
        assert!(pk.contains(&pk.h));
        assert!(!pk.contains(&(&pk.p - 1u32)));
        assert_eq!(pk.exponent_modulus(), pk.q);
        assert!(keypair.private_key.x < pk.q);
    }

    #[test]
    #[ignore = "safe prime generation is slow in debug builds"]
    fn test_safe_prime_key_generation() {
        let keypair = KeyPair::generate(512).unwrap();
        let pk = &keypair.public_key;
        assert_eq!(&pk.p - 1u32, &pk.q * 2u32);
        pk.validate().unwrap();
    }

    #[test]
    fn test_key_size_validation() {
        assert_eq!(
            KeyPair::generate_for_testing(256).unwrap_err(),
            ReferendumError::InvalidKeySize(256)
        );
        assert!(KeyPair::generate(256).is_err());
    }

    #[test]
    fn test_private_key_is_redacted() {
        let keypair = KeyPair::generate_for_testing(512).unwrap();
        assert_eq!(format!("{:?}", keypair.private_key), "PrivateKey(***)");
    }
}
