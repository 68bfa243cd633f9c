//! ElGamal primitives used by the tally.
//!
//! Two schemes live here:
//! - exponential ElGamal over the election group, `(pad, data) = (g·r, g·m + K·r)`,
//!   which is additively homomorphic and is what ballots and tallies are made of;
//! - hashed ElGamal over a scalar, used to send a guardian's polynomial
//!   coordinate to the guardian it is designated for. The coordinate is sealed
//!   with ChaCha20-Poly1305, so a corrupted backup decrypts to `None` instead
//!   of to a wrong coordinate.

use std::collections::HashMap;

use ark_ec::{CurveGroup, PrimeGroup};
use ark_serialize::*;
use ark_std::Zero;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use zeroize::Zeroize;

use crate::error::TallyError;
use crate::hash::{domain, Transcript};

/// An exponential ElGamal ciphertext `(pad, data)`.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElGamalCiphertext<G: CurveGroup> {
    /// `g·r`
    pub pad: G,
    /// `g·m + K·r`
    pub data: G,
}

impl<G: CurveGroup> ElGamalCiphertext<G> {
    pub fn new(pad: G, data: G) -> Self {
        ElGamalCiphertext { pad, data }
    }

    /// The encryption of zero with a zero nonce; the identity for [`Self::add`].
    pub fn zero() -> Self {
        ElGamalCiphertext {
            pad: G::zero(),
            data: G::zero(),
        }
    }

    /// Homomorphic addition of the encrypted messages.
    pub fn add(&self, other: &Self) -> Self {
        ElGamalCiphertext {
            pad: self.pad + other.pad,
            data: self.data + other.data,
        }
    }

    /// Computes `pad·secret`, one guardian's contribution to decryption.
    pub fn partial_decrypt(&self, secret: &G::ScalarField) -> G {
        self.pad * secret
    }

    /// Removes a combined decryption value `M̄ = pad·s` and returns `g·m`.
    pub fn decrypt_with(&self, value: &G) -> G {
        self.data - value
    }
}

/// Encrypts the small integer `message` under `public_key` with `nonce`.
///
/// # Errors
/// Returns an error if the nonce is zero, which would publish `g·m` in the clear.
pub fn elgamal_encrypt<G: CurveGroup>(
    message: u64,
    nonce: &G::ScalarField,
    public_key: &G,
) -> Result<ElGamalCiphertext<G>, TallyError> {
    if nonce.is_zero() {
        return Err(TallyError::invalid_argument("ElGamal nonce cannot be zero"));
    }
    let g = G::generator();
    Ok(ElGamalCiphertext {
        pad: g * nonce,
        data: g * G::ScalarField::from(message) + *public_key * nonce,
    })
}

/// Lazily grown table mapping `g·m` back to `m`.
///
/// Entries are added in order from zero, so a value that was already reached
/// is found with a single map read.
#[derive(Clone, Debug)]
pub struct DiscreteLogTable<G: CurveGroup> {
    table: HashMap<G::Affine, u64>,
    current: G,
    next: u64,
}

impl<G: CurveGroup> Default for DiscreteLogTable<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: CurveGroup> DiscreteLogTable<G> {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(G::zero().into_affine(), 0);
        DiscreteLogTable {
            table,
            current: G::zero(),
            next: 1,
        }
    }

    /// Returns `m` such that `g·m == element`, searching no further than `bound`.
    pub fn lookup(&mut self, element: &G, bound: u64) -> Option<u64> {
        let target = element.into_affine();
        if let Some(&m) = self.table.get(&target) {
            return (m <= bound).then_some(m);
        }

        let g = G::generator();
        while self.next <= bound {
            self.current += g;
            let m = self.next;
            self.next += 1;
            let point = self.current.into_affine();
            self.table.insert(point, m);
            if point == target {
                return Some(m);
            }
        }
        None
    }
}

/// A scalar encrypted with hashed ElGamal.
///
/// The seed, the pad and the shared point `K·r` are hashed into a
/// ChaCha20-Poly1305 key and nonce; `data` is the sealed coordinate with its
/// tag, and the pad is bound as associated data.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct HashedElGamalCiphertext<G: CurveGroup> {
    pub pad: G,
    pub data: Vec<u8>,
}

struct BackupKey {
    key: [u8; 32],
    nonce: [u8; 12],
}

impl BackupKey {
    fn derive<G: CurveGroup>(
        seed: &G::ScalarField,
        pad: &G,
        shared: &G,
    ) -> Result<Self, TallyError> {
        let mut transcript = Transcript::new(domain::BACKUP_SESSION);
        transcript.append(seed)?.append(pad)?.append(shared)?;
        let mut digest = transcript.finalize_bytes();

        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        key.copy_from_slice(&digest[..32]);
        nonce.copy_from_slice(&digest[32..44]);
        digest.zeroize();
        Ok(BackupKey { key, nonce })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

impl Drop for BackupKey {
    fn drop(&mut self) {
        self.key.zeroize();
        self.nonce.zeroize();
    }
}

impl<G: CurveGroup> HashedElGamalCiphertext<G> {
    /// Encrypts `value` for the holder of the secret key behind `public_key`.
    ///
    /// # Errors
    /// Returns an error if the nonce is zero, encoding fails or sealing fails.
    pub fn encrypt(
        value: &G::ScalarField,
        nonce: &G::ScalarField,
        public_key: &G,
        seed: &G::ScalarField,
    ) -> Result<Self, TallyError> {
        if nonce.is_zero() {
            return Err(TallyError::invalid_argument(
                "hashed ElGamal nonce cannot be zero",
            ));
        }
        let pad = G::generator() * nonce;
        let shared = *public_key * nonce;
        let backup_key = BackupKey::derive::<G>(seed, &pad, &shared)?;

        let mut aad = Vec::new();
        pad.serialize_compressed(&mut aad)?;
        let mut plaintext = Vec::new();
        value.serialize_compressed(&mut plaintext)?;

        let sealed = backup_key.cipher().encrypt(
            Nonce::from_slice(&backup_key.nonce),
            Payload {
                msg: &plaintext,
                aad: &aad,
            },
        );
        plaintext.zeroize();
        let data = sealed
            .map_err(|e| TallyError::Encryption(format!("sealing backup failed: {}", e)))?;

        Ok(HashedElGamalCiphertext { pad, data })
    }

    /// Decrypts with `secret_key`, returning `None` if the tag does not verify
    /// or the plaintext is not a canonical scalar.
    pub fn decrypt(
        &self,
        secret_key: &G::ScalarField,
        seed: &G::ScalarField,
    ) -> Option<G::ScalarField> {
        let shared = self.pad * secret_key;
        let backup_key = BackupKey::derive::<G>(seed, &self.pad, &shared).ok()?;

        let mut aad = Vec::new();
        self.pad.serialize_compressed(&mut aad).ok()?;
        let mut plaintext = backup_key
            .cipher()
            .decrypt(
                Nonce::from_slice(&backup_key.nonce),
                Payload {
                    msg: &self.data,
                    aad: &aad,
                },
            )
            .ok()?;

        let value = G::ScalarField::deserialize_compressed(plaintext.as_slice()).ok();
        plaintext.zeroize();
        value
    }
}

/// Sums a slice of ciphertexts; the empty sum is [`ElGamalCiphertext::zero`].
pub fn elgamal_add<G: CurveGroup>(ciphertexts: &[ElGamalCiphertext<G>]) -> ElGamalCiphertext<G> {
    ciphertexts
        .iter()
        .fold(ElGamalCiphertext::zero(), |acc, ct| acc.add(ct))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bls12_381::{Fr, G1Projective};
    use ark_std::UniformRand;

    type G = G1Projective;

    #[test]
    fn test_encrypt_and_decrypt() {
        let mut rng = ark_std::test_rng();
        let secret = Fr::rand(&mut rng);
        let public_key = G::generator() * secret;

        let nonce = Fr::rand(&mut rng);
        let ct = elgamal_encrypt(5, &nonce, &public_key).unwrap();

        let mut table = DiscreteLogTable::<G>::new();
        let value = ct.partial_decrypt(&secret);
        assert_eq!(table.lookup(&ct.decrypt_with(&value), 100), Some(5));
    }

    #[test]
    fn test_homomorphic_addition() {
        let mut rng = ark_std::test_rng();
        let secret = Fr::rand(&mut rng);
        let public_key = G::generator() * secret;

        let cts: Vec<_> = [1u64, 0, 1, 1, 0]
            .iter()
            .map(|m| elgamal_encrypt(*m, &Fr::rand(&mut rng), &public_key).unwrap())
            .collect();
        let sum = elgamal_add(&cts);

        let mut table = DiscreteLogTable::<G>::new();
        let value = sum.partial_decrypt(&secret);
        assert_eq!(table.lookup(&sum.decrypt_with(&value), 10), Some(3));
    }

    #[test]
    fn test_zero_nonce_rejected() {
        let public_key = G::generator();
        assert!(matches!(
            elgamal_encrypt(1, &Fr::zero(), &public_key),
            Err(TallyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_discrete_log_bound() {
        let mut table = DiscreteLogTable::<G>::new();
        let element = G::generator() * Fr::from(12u64);
        assert_eq!(table.lookup(&element, 10), None);
        assert_eq!(table.lookup(&element, 20), Some(12));
        // already cached, but still outside a tighter bound
        assert_eq!(table.lookup(&element, 5), None);
        assert_eq!(table.lookup(&G::zero(), 5), Some(0));
    }

    #[test]
    fn test_hashed_elgamal_round_trip() {
        let mut rng = ark_std::test_rng();
        let secret = Fr::rand(&mut rng);
        let public_key = G::generator() * secret;
        let seed = Fr::rand(&mut rng);
        let value = Fr::rand(&mut rng);

        let ct = HashedElGamalCiphertext::encrypt(&value, &Fr::rand(&mut rng), &public_key, &seed)
            .unwrap();
        assert_eq!(ct.decrypt(&secret, &seed), Some(value));
    }

    #[test]
    fn test_hashed_elgamal_rejects_wrong_key_or_seed() {
        let mut rng = ark_std::test_rng();
        let secret = Fr::rand(&mut rng);
        let public_key = G::generator() * secret;
        let seed = Fr::rand(&mut rng);
        let value = Fr::rand(&mut rng);

        let ct = HashedElGamalCiphertext::encrypt(&value, &Fr::rand(&mut rng), &public_key, &seed)
            .unwrap();
        assert_eq!(ct.decrypt(&Fr::rand(&mut rng), &seed), None);
        assert_eq!(ct.decrypt(&secret, &Fr::rand(&mut rng)), None);
    }

    #[test]
    fn test_hashed_elgamal_rejects_corruption() {
        let mut rng = ark_std::test_rng();
        let secret = Fr::rand(&mut rng);
        let public_key = G::generator() * secret;
        let seed = Fr::rand(&mut rng);
        let value = Fr::rand(&mut rng);

        let mut ct =
            HashedElGamalCiphertext::encrypt(&value, &Fr::rand(&mut rng), &public_key, &seed)
                .unwrap();
        ct.data[3] ^= 0x01;
        assert_eq!(ct.decrypt(&secret, &seed), None);
    }

    #[test]
    fn test_hashed_elgamal_binds_pad() {
        let mut rng = ark_std::test_rng();
        let secret = Fr::rand(&mut rng);
        let public_key = G::generator() * secret;
        let seed = Fr::rand(&mut rng);
        let value = Fr::rand(&mut rng);

        let mut ct =
            HashedElGamalCiphertext::encrypt(&value, &Fr::rand(&mut rng), &public_key, &seed)
                .unwrap();
        // coordinate plus the Poly1305 tag
        assert_eq!(ct.data.len(), value.compressed_size() + 16);

        ct.pad += G::generator();
        assert_eq!(ct.decrypt(&secret, &seed), None);
    }
}
