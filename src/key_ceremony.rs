//! Key ceremony artifacts and an in-memory driver for the ceremony rounds.
//!
//! Round 1: every guardian announces an [`ElectionPublicKey`].
//! Round 2: every guardian sends each other guardian an encrypted
//! [`ElectionPartialKeyBackup`] of its polynomial coordinate.
//! Round 3: recipients verify backups against the sender's commitments and
//! publish [`ElectionPartialKeyVerification`] records. A disputed backup can be
//! settled in public with an [`ElectionPartialKeyChallenge`].
//!
//! Once every backup is verified the keys are combined into the
//! [`ElectionJointKey`].

use std::collections::BTreeSet;

use ark_ec::CurveGroup;
use ark_ff::PrimeField;
use ark_serialize::*;
use ark_std::{rand::RngCore, Zero};
use tracing::{debug, info, warn};

use crate::elgamal::HashedElGamalCiphertext;
use crate::error::TallyError;
use crate::guardian::Guardian;
use crate::hash::{domain, Transcript};
use crate::polynomial::verify_coordinate;
use crate::proof::SchnorrProof;

/// A guardian's public key together with the commitments and ownership
/// proofs of every polynomial coefficient.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ElectionPublicKey<G: CurveGroup> {
    pub owner_id: String,
    pub sequence_order: u64,
    /// `K_i = g·a_i0`; always equal to `coefficient_commitments[0]`
    pub key: G,
    pub coefficient_commitments: Vec<G>,
    pub coefficient_proofs: Vec<SchnorrProof<G>>,
}

impl<G: CurveGroup> ElectionPublicKey<G> {
    /// Checks that the key is well formed for a ceremony with `quorum`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` describing the first problem found.
    pub fn validate(
        &self,
        parameter_hash: &G::ScalarField,
        quorum: u64,
    ) -> Result<(), TallyError> {
        if self.sequence_order == 0 {
            return Err(TallyError::invalid_argument(format!(
                "guardian {} has sequence order 0",
                self.owner_id
            )));
        }
        if self.key.is_zero() {
            return Err(TallyError::invalid_argument(format!(
                "public key of guardian {} is the identity",
                self.owner_id
            )));
        }
        if quorum == 0 {
            return Err(TallyError::invalid_argument(format!(
                "guardian {} validated against a quorum of 0",
                self.owner_id
            )));
        }
        if self.coefficient_commitments.len() as u64 != quorum
            || self.coefficient_proofs.len() as u64 != quorum
        {
            return Err(TallyError::invalid_argument(format!(
                "guardian {} published {} commitments and {} proofs, expected {}",
                self.owner_id,
                self.coefficient_commitments.len(),
                self.coefficient_proofs.len(),
                quorum
            )));
        }
        if self.coefficient_commitments.first() != Some(&self.key) {
            return Err(TallyError::invalid_argument(format!(
                "public key of guardian {} does not match its first commitment",
                self.owner_id
            )));
        }
        if !verify_polynomial_proofs(self, parameter_hash) {
            return Err(TallyError::invalid_argument(format!(
                "coefficient proofs of guardian {} are invalid",
                self.owner_id
            )));
        }
        Ok(())
    }
}

/// Checks every coefficient proof against the commitment it claims to own.
pub fn verify_polynomial_proofs<G: CurveGroup>(
    public_key: &ElectionPublicKey<G>,
    parameter_hash: &G::ScalarField,
) -> bool {
    public_key.coefficient_commitments.len() == public_key.coefficient_proofs.len()
        && public_key
            .coefficient_commitments
            .iter()
            .zip(&public_key.coefficient_proofs)
            .enumerate()
            .all(|(index, (commitment, proof))| {
                proof.public_key == *commitment
                    && proof.is_valid(parameter_hash, public_key.sequence_order, index as u64)
            })
}

/// A polynomial coordinate `P_owner(designated_sequence_order)` encrypted for
/// the designated guardian.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ElectionPartialKeyBackup<G: CurveGroup> {
    pub owner_id: String,
    pub designated_id: String,
    pub designated_sequence_order: u64,
    pub encrypted_coordinate: HashedElGamalCiphertext<G>,
}

/// Outcome of checking one backup.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ElectionPartialKeyVerification {
    pub owner_id: String,
    pub designated_id: String,
    pub verifier_id: String,
    pub verified: bool,
}

/// A coordinate published in the clear so that any guardian can settle a
/// backup the designated guardian rejected.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ElectionPartialKeyChallenge<G: CurveGroup> {
    pub owner_id: String,
    pub designated_id: String,
    pub designated_sequence_order: u64,
    pub value: G::ScalarField,
    pub coefficient_commitments: Vec<G>,
    pub coefficient_proofs: Vec<SchnorrProof<G>>,
}

/// Checks a published backup challenge. Any guardian may act as verifier.
pub fn verify_election_partial_key_challenge<G: CurveGroup>(
    verifier_id: &str,
    challenge: &ElectionPartialKeyChallenge<G>,
) -> ElectionPartialKeyVerification {
    ElectionPartialKeyVerification {
        owner_id: challenge.owner_id.clone(),
        designated_id: challenge.designated_id.clone(),
        verifier_id: verifier_id.to_string(),
        verified: verify_coordinate(
            challenge.designated_sequence_order,
            &challenge.value,
            &challenge.coefficient_commitments,
        ),
    }
}

/// Seed binding a backup to its recipient: `H(designated_id, designated_sequence_order)`.
pub fn backup_seed<F: PrimeField>(designated_id: &str, designated_sequence_order: u64) -> F {
    let mut transcript = Transcript::new(domain::BACKUP_SEED);
    transcript
        .append_str(designated_id)
        .append_u64(designated_sequence_order);
    transcript.challenge()
}

/// The election's joint public key and the hash of all coefficient commitments.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ElectionJointKey<G: CurveGroup> {
    /// `K = Σ K_i`
    pub joint_public_key: G,
    pub commitment_hash: G::ScalarField,
}

/// Combines every guardian's public key into the joint key.
///
/// # Errors
/// Returns an error if `keys` is empty or two keys share an owner or a
/// sequence order.
pub fn combine_election_public_keys<G: CurveGroup>(
    keys: &[ElectionPublicKey<G>],
) -> Result<ElectionJointKey<G>, TallyError> {
    if keys.is_empty() {
        return Err(TallyError::invalid_argument(
            "cannot combine an empty set of public keys",
        ));
    }
    let mut owners = BTreeSet::new();
    let mut orders = BTreeSet::new();
    for key in keys {
        if !owners.insert(key.owner_id.as_str()) || !orders.insert(key.sequence_order) {
            return Err(TallyError::invalid_argument(format!(
                "duplicate guardian {} (sequence order {})",
                key.owner_id, key.sequence_order
            )));
        }
    }

    let mut sorted: Vec<&ElectionPublicKey<G>> = keys.iter().collect();
    sorted.sort_by_key(|key| key.sequence_order);

    let mut transcript = Transcript::new(domain::COMMITMENT_HASH);
    for key in &sorted {
        transcript.append_u64(key.sequence_order);
        for commitment in &key.coefficient_commitments {
            transcript.append(commitment)?;
        }
    }

    Ok(ElectionJointKey {
        joint_public_key: sorted.iter().fold(G::zero(), |acc, key| acc + key.key),
        commitment_hash: transcript.challenge(),
    })
}

/// Runs all ceremony rounds between in-memory guardians and returns the
/// joint key.
///
/// # Errors
/// Fails on the first rejected public key or unverifiable backup. Nothing is
/// retried; the caller decides whether to restart the ceremony.
pub fn perform_key_ceremony<G: CurveGroup, R: RngCore>(
    guardians: &mut [Guardian<G>],
    rng: &mut R,
) -> Result<ElectionJointKey<G>, TallyError> {
    let keys: Vec<ElectionPublicKey<G>> = guardians.iter().map(|g| g.share_public_key()).collect();
    info!("key ceremony: {} guardians announced", keys.len());

    for guardian in guardians.iter_mut() {
        for key in &keys {
            if key.owner_id != guardian.id() {
                guardian.save_guardian_key(key.clone())?;
            }
        }
    }

    let mut backups = Vec::new();
    for guardian in guardians.iter_mut() {
        guardian.generate_election_partial_key_backups(rng)?;
        backups.extend(
            guardian
                .share_election_partial_key_backups()
                .into_iter()
                .filter(|b| b.designated_id != b.owner_id),
        );
    }
    debug!("key ceremony: distributing {} backups", backups.len());

    for backup in backups {
        let recipient = guardians
            .iter_mut()
            .find(|g| g.id() == backup.designated_id)
            .ok_or_else(|| TallyError::key_not_found(backup.designated_id.clone()))?;
        recipient.save_election_partial_key_backup(backup)?;
    }

    let mut verifications = Vec::new();
    for guardian in guardians.iter_mut() {
        let senders: Vec<String> = keys
            .iter()
            .map(|k| k.owner_id.clone())
            .filter(|id| id != guardian.id())
            .collect();
        for sender in senders {
            let verification = guardian.verify_election_partial_key_backup(&sender)?;
            if !verification.verified {
                warn!(
                    "key ceremony: backup from {} rejected by {}",
                    verification.owner_id, verification.verifier_id
                );
                return Err(TallyError::invalid_operation(format!(
                    "backup from {} to {} failed verification",
                    verification.owner_id, verification.designated_id
                )));
            }
            verifications.push(verification);
        }
    }

    for verification in verifications {
        let owner = guardians
            .iter_mut()
            .find(|g| g.id() == verification.owner_id)
            .ok_or_else(|| TallyError::key_not_found(verification.owner_id.clone()))?;
        owner.save_election_partial_key_verification(verification)?;
    }

    let joint_key = combine_election_public_keys(&keys)?;
    info!("key ceremony: joint key established");
    Ok(joint_key)
}
