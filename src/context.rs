//! Ceremony configuration and the election context every proof is bound to.

use ark_ec::{CurveGroup, PrimeGroup};
use ark_serialize::*;

use crate::error::TallyError;
use crate::hash::{domain, Transcript};
use crate::key_ceremony::ElectionJointKey;

/// Number of guardians and the quorum needed to decrypt.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CeremonyDetails {
    pub number_of_guardians: u64,
    pub quorum: u64,
}

impl CeremonyDetails {
    /// # Errors
    /// Returns an error unless `1 <= quorum <= number_of_guardians`.
    pub fn new(number_of_guardians: u64, quorum: u64) -> Result<Self, TallyError> {
        if quorum == 0 {
            return Err(TallyError::invalid_argument("quorum must be at least 1"));
        }
        if quorum > number_of_guardians {
            return Err(TallyError::invalid_argument(format!(
                "quorum ({}) must be <= number of guardians ({})",
                quorum, number_of_guardians
            )));
        }
        Ok(CeremonyDetails {
            number_of_guardians,
            quorum,
        })
    }
}

/// Hash of the group parameters, bound into every coefficient proof.
pub fn parameter_hash<G: CurveGroup>() -> Result<G::ScalarField, TallyError> {
    let mut transcript = Transcript::new(domain::PARAMETERS);
    transcript.append(&G::generator())?;
    Ok(transcript.challenge())
}

/// Public values of one election: ceremony shape, joint key and hashes.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ElectionContext<G: CurveGroup> {
    pub number_of_guardians: u64,
    pub quorum: u64,
    /// `K = Σ K_i`
    pub joint_public_key: G,
    /// Hash of every guardian's coefficient commitments
    pub commitment_hash: G::ScalarField,
    pub manifest_hash: G::ScalarField,
    pub crypto_base_hash: G::ScalarField,
    pub crypto_extended_base_hash: G::ScalarField,
}

impl<G: CurveGroup> ElectionContext<G> {
    pub fn new(
        details: CeremonyDetails,
        joint_key: &ElectionJointKey<G>,
        manifest_hash: G::ScalarField,
    ) -> Result<Self, TallyError> {
        let mut transcript = Transcript::new(domain::BASE_HASH);
        transcript
            .append(&parameter_hash::<G>()?)?
            .append_u64(details.number_of_guardians)
            .append_u64(details.quorum)
            .append(&manifest_hash)?;
        let crypto_base_hash: G::ScalarField = transcript.challenge();

        let mut transcript = Transcript::new(domain::EXTENDED_BASE_HASH);
        transcript
            .append(&crypto_base_hash)?
            .append(&joint_key.commitment_hash)?;
        let crypto_extended_base_hash = transcript.challenge();

        Ok(ElectionContext {
            number_of_guardians: details.number_of_guardians,
            quorum: details.quorum,
            joint_public_key: joint_key.joint_public_key,
            commitment_hash: joint_key.commitment_hash,
            manifest_hash,
            crypto_base_hash,
            crypto_extended_base_hash,
        })
    }

    pub fn ceremony_details(&self) -> CeremonyDetails {
        CeremonyDetails {
            number_of_guardians: self.number_of_guardians,
            quorum: self.quorum,
        }
    }
}
