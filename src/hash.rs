//! Domain-separated hashing into the scalar field.
//!
//! Every Fiat-Shamir challenge, deterministic nonce and backup seed in the
//! crate is produced by a [`Transcript`]. Inputs are framed so that no two
//! distinct input sequences share an encoding: strings and byte strings are
//! length-prefixed, integers are fixed-width little endian, and group elements
//! and scalars use their canonical compressed encoding.

use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use blake2::{Blake2b512, Digest};

use crate::error::TallyError;

/// Domain tags. Changing any of these changes every derived value.
pub mod domain {
    pub const PARAMETERS: &[u8] = b"threshold-tally/v1/parameters";
    pub const BASE_HASH: &[u8] = b"threshold-tally/v1/base-hash";
    pub const EXTENDED_BASE_HASH: &[u8] = b"threshold-tally/v1/extended-base-hash";
    pub const COMMITMENT_HASH: &[u8] = b"threshold-tally/v1/commitment-hash";
    pub const MANIFEST: &[u8] = b"threshold-tally/v1/manifest";
    pub const COEFFICIENT_PROOF: &[u8] = b"threshold-tally/v1/coefficient-proof";
    pub const BACKUP_SEED: &[u8] = b"threshold-tally/v1/backup-seed";
    pub const BACKUP_SESSION: &[u8] = b"threshold-tally/v1/backup-session";
    pub const COMMITMENT_NONCE: &[u8] = b"threshold-tally/v1/commitment-nonce";
    pub const ANSWERED_CHALLENGE: &[u8] = b"threshold-tally/v1/answered-challenge";
    pub const DECRYPTION_CHALLENGE: &[u8] = b"threshold-tally/v1/decryption-challenge";
    pub const DECRYPTION_SESSION: &[u8] = b"threshold-tally/v1/decryption-session";
    pub const BALLOT_NONCE: &[u8] = b"threshold-tally/v1/ballot-nonce";
}

/// Running Blake2b-512 hash over framed inputs.
#[derive(Clone)]
pub struct Transcript {
    hasher: Blake2b512,
    scratch: Vec<u8>,
}

impl Transcript {
    pub fn new(domain: &[u8]) -> Self {
        let mut transcript = Transcript {
            hasher: Blake2b512::new(),
            scratch: Vec::new(),
        };
        transcript.append_bytes(domain);
        transcript
    }

    /// Appends a length-prefixed byte string.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn append_str(&mut self, value: &str) -> &mut Self {
        self.append_bytes(value.as_bytes())
    }

    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Appends the canonical compressed encoding of a group element or scalar.
    pub fn append<T: CanonicalSerialize>(&mut self, value: &T) -> Result<&mut Self, TallyError> {
        self.scratch.clear();
        value.serialize_compressed(&mut self.scratch)?;
        let encoded = std::mem::take(&mut self.scratch);
        self.append_bytes(&encoded);
        self.scratch = encoded;
        Ok(self)
    }

    /// Finishes the transcript and returns the raw 64-byte digest.
    pub fn finalize_bytes(self) -> [u8; 64] {
        let mut digest = [0u8; 64];
        digest.copy_from_slice(&self.hasher.finalize());
        digest
    }

    /// Finishes the transcript and reduces the digest into the scalar field.
    pub fn challenge<F: PrimeField>(self) -> F {
        F::from_le_bytes_mod_order(&self.finalize_bytes())
    }
}
