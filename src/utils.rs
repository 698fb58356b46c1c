//! Number-theoretic helpers shared by the scheme, the proofs and key generation

use num_bigint::{BigInt, BigUint, RandBigInt, Sign, ToBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::thread_rng;
use sha2::{Digest, Sha256};

use crate::error::{ReferendumError, Result};

/// Modular exponentiation: base^exp mod modulus
pub fn mod_exp(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exp, modulus)
}

/// Modular inverse via the iterative extended Euclidean algorithm
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() {
        return None;
    }
    let m_int = m.to_bigint()?;
    let (mut old_r, mut r) = ((a % m).to_bigint()?, m_int.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());

    while !r.is_zero() {
        let q = &old_r / &r;
        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }

    if old_r != BigInt::one() {
        return None;
    }

    old_s.mod_floor(&m_int).to_biguint()
}

/// (a - b) mod m for exponents living in Z_m
pub fn sub_mod(a: &BigUint, b: &BigUint, m: &BigUint) -> BigUint {
    let a = a % m;
    let b = b % m;
    if a >= b {
        a - b
    } else {
        m - (b - a)
    }
}

/// Map a signed constant into Z_m
pub fn signed_to_mod(value: i128, m: &BigUint) -> BigUint {
    let modulus = BigInt::from_biguint(Sign::Plus, m.clone());
    let (_, magnitude) = BigInt::from(value).mod_floor(&modulus).into_parts();
    magnitude
}

/// Fiat-Shamir hash of a domain tag, raw context bytes and group elements,
/// reduced into Z_m
pub fn hash_to_scalar(
    domain: &[u8],
    context: &[&[u8]],
    elements: &[&BigUint],
    m: &BigUint,
) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u64).to_be_bytes());
    hasher.update(domain);
    for bytes in context {
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    for elem in elements {
        let bytes = elem.to_bytes_be();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    BigUint::from_bytes_be(&hasher.finalize()) % m
}

/// Generate a safe prime (p = 2q + 1 where q is also prime), allowing the
/// bit size to drift by a few bits to keep generation time reasonable
pub fn generate_safe_prime(target_bit_size: u64) -> Result<(BigUint, BigUint)> {
    if target_bit_size < 512 {
        return Err(ReferendumError::InvalidKeySize(target_bit_size));
    }

    let mut rng = thread_rng();
    let max_iterations = 1_000_000;
    let min_bits = target_bit_size.saturating_sub(8);
    let max_bits = target_bit_size + 8;

    for _ in 0..max_iterations {
        let q_bits = target_bit_size - 1;
        let mut q = rng.gen_biguint(q_bits);
        q |= BigUint::one();
        q |= BigUint::one() << (q_bits - 1);

        if !is_probable_prime(&q, 15) {
            continue;
        }

        let p = &q * 2u32 + 1u32;
        let p_bits = p.bits();
        if p_bits >= min_bits && p_bits <= max_bits && is_probable_prime(&p, 15) {
            return Ok((p, q));
        }
    }

    Err(ReferendumError::CryptoError(format!(
        "Failed to generate safe prime near {} bits after {} iterations",
        target_bit_size, max_iterations
    )))
}

/// Generate a prime of exactly `bit_size` bits (not necessarily safe)
pub fn generate_prime(bit_size: u64) -> Result<BigUint> {
    let mut rng = thread_rng();
    let max_iterations = 100_000;

    for _ in 0..max_iterations {
        let mut candidate = rng.gen_biguint(bit_size);
        candidate |= BigUint::one();
        candidate |= BigUint::one() << (bit_size - 1);

        if candidate.bits() == bit_size && is_probable_prime(&candidate, 20) {
            return Ok(candidate);
        }
    }

    Err(ReferendumError::CryptoError(format!(
        "Failed to generate {}-bit prime after {} iterations",
        bit_size, max_iterations
    )))
}

/// Miller-Rabin primality test
pub fn is_probable_prime(n: &BigUint, k: usize) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if n < &two {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    let mut rng = thread_rng();
    let n_minus_1 = n - BigUint::one();
    let (s, d) = factor_powers_of_two(&n_minus_1);

    'witness: for _ in 0..k {
        let a = if n_minus_1 <= two {
            two.clone()
        } else {
            rng.gen_biguint_range(&two, &n_minus_1)
        };

        let mut x = mod_exp(&a, &d, n);
        if x.is_one() || x == n_minus_1 {
            continue;
        }

        for _ in 1..s {
            x = mod_exp(&x, &two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// Factor out powers of 2: n = 2^s * d with d odd
pub fn factor_powers_of_two(n: &BigUint) -> (u64, BigUint) {
    let mut s = 0;
    let mut d = n.clone();

    while !d.is_zero() && d.is_even() {
        d >>= 1;
        s += 1;
    }

    (s, d)
}

/// Generate a Schnorr group: a `p_bits` prime p = r*q + 1 whose multiplicative
/// group has a subgroup of prime order q with `q_bits` bits
pub fn generate_schnorr_group(p_bits: u64, q_bits: u64) -> Result<(BigUint, BigUint)> {
    if p_bits < 512 {
        return Err(ReferendumError::InvalidKeySize(p_bits));
    }
    if q_bits < 2 || q_bits + 2 > p_bits {
        return Err(ReferendumError::InvalidParameter(format!(
            "subgroup of {} bits does not fit a {}-bit modulus",
            q_bits, p_bits
        )));
    }

    let mut rng = thread_rng();
    let q = generate_prime(q_bits)?;
    let r_bits = p_bits - q_bits;
    let max_iterations = 100_000;

    for _ in 0..max_iterations {
        // r = 2 * half keeps p odd
        let mut half = rng.gen_biguint(r_bits - 1);
        half |= BigUint::one() << (r_bits - 2);
        let r: BigUint = half << 1;

        let p = &r * &q + 1u32;
        if p.bits() == p_bits && is_probable_prime(&p, 20) {
            return Ok((p, q));
        }
    }

    Err(ReferendumError::CryptoError(format!(
        "Failed to find a {}-bit modulus for a {}-bit subgroup after {} iterations",
        p_bits, q_bits, max_iterations
    )))
}

/// Generator of the order-q subgroup of Z_p^*, where q is prime and divides p - 1
pub fn find_subgroup_generator(p: &BigUint, q: &BigUint) -> BigUint {
    let mut rng = thread_rng();
    let two = BigUint::from(2u32);
    let p_minus_1 = p - BigUint::one();
    let cofactor = &p_minus_1 / q;

    loop {
        let a = rng.gen_biguint_range(&two, &p_minus_1);
        let g = mod_exp(&a, &cofactor, p);
        if !g.is_one() {
            return g;
        }
    }
}

/// Whether `x` lies in the order-q subgroup of Z_p^*
pub fn in_subgroup(x: &BigUint, p: &BigUint, q: &BigUint) -> bool {
    !x.is_zero() && x < p && mod_exp(x, q, p).is_one()
}

/// Uniform random element in [1, n)
pub fn random_in_range(n: &BigUint) -> BigUint {
    let mut rng = thread_rng();
    rng.gen_biguint_range(&BigUint::one(), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_inverse() {
        let a = BigUint::from(3u32);
        let m = BigUint::from(11u32);
        let inv = mod_inverse(&a, &m).unwrap();
        assert_eq!((a * inv) % m, BigUint::one());

        // gcd(4, 8) != 1
        assert!(mod_inverse(&BigUint::from(4u32), &BigUint::from(8u32)).is_none());
    }

    #[test]
    fn test_sub_and_signed_mod() {
        let m = BigUint::from(10u32);
        assert_eq!(sub_mod(&BigUint::from(3u32), &BigUint::from(7u32), &m), BigUint::from(6u32));
        assert_eq!(sub_mod(&BigUint::from(7u32), &BigUint::from(3u32), &m), BigUint::from(4u32));
        assert_eq!(signed_to_mod(-1, &m), BigUint::from(9u32));
        assert_eq!(signed_to_mod(13, &m), BigUint::from(3u32));
    }

    #[test]
    fn test_hash_to_scalar_binds_context() {
        let m = BigUint::from(1_000_003u32);
        let x = BigUint::from(42u32);
        let a = hash_to_scalar(b"d", &[b"alice".as_slice()], &[&x], &m);
        let b = hash_to_scalar(b"d", &[b"bob".as_slice()], &[&x], &m);
        assert_ne!(a, b);
        assert!(a < m);
        assert_eq!(a, hash_to_scalar(b"d", &[b"alice".as_slice()], &[&x], &m));
    }

    #[test]
    fn test_is_probable_prime() {
        for p in [2u32, 3, 5, 7, 11, 13, 7919] {
            assert!(is_probable_prime(&BigUint::from(p), 20), "{} is prime", p);
        }
        for c in [0u32, 1, 4, 6, 9, 15, 7917] {
            assert!(!is_probable_prime(&BigUint::from(c), 20), "{} is composite", c);
        }
    }

    #[test]
    fn test_schnorr_group() {
        let (p, q) = generate_schnorr_group(512, 256).unwrap();
        assert_eq!(p.bits(), 512);
        assert_eq!(q.bits(), 256);
        assert!(((&p - 1u32) % &q).is_zero());

        let g = find_subgroup_generator(&p, &q);
        assert!(!g.is_one());
        assert!(in_subgroup(&g, &p, &q));

        // -1 has order 2, so it sits outside any odd prime-order subgroup
        assert!(!in_subgroup(&(&p - 1u32), &p, &q));
        assert!(!in_subgroup(&BigUint::zero(), &p, &q));
        assert!(generate_schnorr_group(256, 128).is_err());
    }

    #[test]
    fn test_generate_prime_bits() {
        let p = generate_prime(512).unwrap();
        assert_eq!(p.bits(), 512);
        assert!(is_probable_prime(&p, 20));
    }
}
