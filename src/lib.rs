//! Threshold Election Tally
//!
//! Guardians jointly hold the key an election is encrypted under. After a key
//! ceremony in which each guardian shares its polynomial with the others, any
//! quorum of guardians can decrypt a tally of exponential ElGamal ciphertexts
//! and publish a Chaum-Pedersen proof that every count is correct.
//!
//! ## Key Components
//!
//! - **Key ceremony**: guardians publish coefficient commitments, exchange
//!   encrypted polynomial coordinates and verify them
//! - **Decryption shares**: each present guardian partially decrypts every
//!   selection and commits to a proof nonce
//! - **Mediator**: combines the shares with Lagrange coefficients, issues a
//!   challenge to every guardian and checks the responses
//! - **Plaintext tally**: decoded counts with proofs anyone can verify against
//!   the joint key
//!
//! ## Example
//!
//! ```rust,no_run
//! use ark_bls12_381::G1Projective;
//! use threshold_tally::{
//!     ballot::{encrypt_ballot, BallotBoxState, CiphertextTally, PlaintextBallot},
//!     context::{CeremonyDetails, ElectionContext},
//!     guardian::Guardian,
//!     key_ceremony::perform_key_ceremony,
//!     manifest::{ContestDescription, Manifest, SelectionDescription},
//!     mediator::DecryptionMediator,
//! };
//!
//! type G = G1Projective;
//!
//! let mut rng = ark_std::test_rng();
//! let details = CeremonyDetails::new(3, 2).unwrap();
//!
//! // Key ceremony
//! let mut guardians = (1..=3)
//!     .map(|i| Guardian::<G>::new(format!("guardian-{}", i), i, details, &mut rng).unwrap())
//!     .collect::<Vec<_>>();
//! let joint_key = perform_key_ceremony(&mut guardians, &mut rng).unwrap();
//!
//! let contest = ContestDescription::new(
//!     "mayor",
//!     1,
//!     vec![SelectionDescription::new("alice", 1), SelectionDescription::new("bob", 2)],
//! )
//! .unwrap();
//! let manifest = Manifest::new("election", vec![contest]).unwrap();
//! let context = ElectionContext::new(details, &joint_key, manifest.crypto_hash().unwrap()).unwrap();
//!
//! // Voting
//! let mut tally = CiphertextTally::new("tally", &manifest);
//! let ballot = PlaintextBallot::new("ballot-1").with_vote("mayor", "alice", 1);
//! let encrypted = encrypt_ballot(
//!     &ballot,
//!     &manifest,
//!     &context.joint_public_key,
//!     BallotBoxState::Cast,
//!     &mut rng,
//! )
//! .unwrap();
//! tally.append(&encrypted).unwrap();
//!
//! // Decryption with two of three guardians
//! let keys = guardians.iter().map(|g| g.share_public_key()).collect();
//! let mut mediator =
//!     DecryptionMediator::new("mediator", context.clone(), keys, ["guardian-1", "guardian-3"])
//!         .unwrap();
//! mediator.add_tally(tally).unwrap();
//! let plaintext = mediator.decrypt_with_guardians(&guardians, "tally").unwrap();
//! assert!(plaintext.verify(&context));
//! ```

pub mod accumulation;
pub mod ballot;
pub mod challenge;
pub mod context;
pub mod decryption_share;
pub mod elgamal;
pub mod error;
pub mod guardian;
pub mod hash;
pub mod key_ceremony;
pub mod lagrange;
pub mod manifest;
pub mod mediator;
pub mod plaintext;
pub mod polynomial;
pub mod proof;
pub mod security;

#[cfg(test)]
mod test_utils;

pub use error::TallyError;
pub use guardian::{DecryptionSession, Guardian, KeyShareMode};
pub use mediator::DecryptionMediator;
