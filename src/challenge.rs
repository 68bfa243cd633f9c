//! Distributed Fiat-Shamir challenge and response.
//!
//! Once every share is accumulated the mediator hashes the statement
//! `(K, A, B, a, b, M̄)` into a base challenge `c`. Guardian `i` receives
//! `c_i = c·w_i` and answers `v_i = u_i − c_i·s_i`. Each response can be checked
//! on its own against the guardian's commitment, and the sum `v = Σ v_i`
//! completes a single Chaum-Pedersen proof under the joint key.

use std::collections::BTreeMap;

use ark_ec::CurveGroup;
use ark_ff::PrimeField;
use ark_serialize::*;
use ark_std::Zero;
use rayon::prelude::*;

use crate::context::ElectionContext;
use crate::decryption_share::{DecryptionShare, SelectionShare};
use crate::elgamal::ElGamalCiphertext;
use crate::error::TallyError;
use crate::guardian::{DecryptionSession, Guardian, KeyShareMode};
use crate::hash::{domain, Transcript};
use crate::key_ceremony::ElectionPublicKey;
use crate::polynomial::evaluate_commitments;
use crate::proof::ChaumPedersenCommitment;
use crate::security::SensitiveScalar;

/// `c = H(Q̄, K, A, B, a, b, M̄)`.
pub fn compute_decryption_challenge<G: CurveGroup>(
    context: &ElectionContext<G>,
    ciphertext: &ElGamalCiphertext<G>,
    commitment: &ChaumPedersenCommitment<G>,
    value: &G,
) -> Result<G::ScalarField, TallyError> {
    let mut transcript = Transcript::new(domain::DECRYPTION_CHALLENGE);
    transcript
        .append(&context.crypto_extended_base_hash)?
        .append(&context.joint_public_key)?
        .append(&ciphertext.pad)?
        .append(&ciphertext.data)?
        .append(&commitment.pad)?
        .append(&commitment.data)?
        .append(value)?;
    Ok(transcript.challenge())
}

/// The public key `K'` a guardian's response is checked against.
///
/// In direct mode this is the guardian's own key `K_i`. In threshold mode the
/// guardian answered with `P(i)`, so `K' = g·P(i) = Σ_j Σ_k K_jk·i^k` over
/// every guardian of the ceremony.
///
/// # Errors
/// `KeyNotFound` if no key has `sequence_order`.
pub fn compute_commitment_offset<G: CurveGroup>(
    guardian_keys: &[ElectionPublicKey<G>],
    sequence_order: u64,
    mode: KeyShareMode,
) -> Result<G, TallyError> {
    match mode {
        KeyShareMode::Direct => guardian_keys
            .iter()
            .find(|key| key.sequence_order == sequence_order)
            .map(|key| key.key)
            .ok_or_else(|| {
                TallyError::key_not_found(format!(
                    "no guardian key with sequence order {}",
                    sequence_order
                ))
            }),
        KeyShareMode::Threshold => {
            if guardian_keys.is_empty() {
                return Err(TallyError::key_not_found("no guardian keys"));
            }
            guardian_keys.iter().try_fold(G::zero(), |acc, key| {
                evaluate_commitments(sequence_order, &key.coefficient_commitments)
                    .map(|point| acc + point)
                    .ok_or_else(|| {
                        TallyError::invalid_argument(format!(
                            "guardian {} has no coefficient commitments",
                            key.owner_id
                        ))
                    })
            })
        }
    }
}

/// Challenge for one guardian and one selection.
///
/// Carries the selection's identity and ciphertext so the guardian can
/// re-derive its commitment nonce from the seed instead of storing it.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SelectionChallenge<G: CurveGroup> {
    pub guardian_id: String,
    pub object_id: String,
    pub sequence_order: u64,
    pub description_hash: G::ScalarField,
    pub ciphertext: ElGamalCiphertext<G>,
    /// `w_i`
    pub coefficient: G::ScalarField,
    /// `c_i = c·w_i`
    pub challenge: G::ScalarField,
}

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContestChallenge<G: CurveGroup> {
    pub guardian_id: String,
    pub object_id: String,
    pub selections: BTreeMap<String, SelectionChallenge<G>>,
}

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct DecryptionChallenge<G: CurveGroup> {
    pub guardian_id: String,
    pub object_id: String,
    pub contests: BTreeMap<String, ContestChallenge<G>>,
}

pub type TallyChallenge<G> = DecryptionChallenge<G>;
pub type BallotChallenge<G> = DecryptionChallenge<G>;

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SelectionChallengeResponse<F: PrimeField> {
    pub guardian_id: String,
    pub object_id: String,
    /// `v_i`
    pub response: F,
}

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContestChallengeResponse<F: PrimeField> {
    pub guardian_id: String,
    pub object_id: String,
    pub selections: BTreeMap<String, SelectionChallengeResponse<F>>,
}

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct DecryptionChallengeResponse<F: PrimeField> {
    pub guardian_id: String,
    pub object_id: String,
    pub contests: BTreeMap<String, ContestChallengeResponse<F>>,
}

pub type TallyChallengeResponse<F> = DecryptionChallengeResponse<F>;
pub type BallotChallengeResponse<F> = DecryptionChallengeResponse<F>;

fn selection_response<G: CurveGroup>(
    guardian: &Guardian<G>,
    challenge: &SelectionChallenge<G>,
    secret: &SensitiveScalar<G::ScalarField>,
    session: &DecryptionSession,
) -> Result<SelectionChallengeResponse<G::ScalarField>, TallyError> {
    Ok(SelectionChallengeResponse {
        guardian_id: guardian.id().to_string(),
        object_id: challenge.object_id.clone(),
        response: guardian.create_response_with(challenge, secret, session)?,
    })
}

/// Answers every selection challenge addressed to `guardian`.
///
/// # Errors
/// `InvalidArgument` if the challenge is addressed to another guardian, or
/// any error from deriving the guardian's secret.
pub fn compute_challenge_response<G: CurveGroup>(
    guardian: &Guardian<G>,
    challenge: &DecryptionChallenge<G>,
    session: &DecryptionSession,
) -> Result<DecryptionChallengeResponse<G::ScalarField>, TallyError> {
    if challenge.guardian_id != guardian.id() {
        return Err(TallyError::invalid_argument(format!(
            "challenge for {} sent to {}",
            challenge.guardian_id,
            guardian.id()
        )));
    }
    let secret = guardian.partial_secret(session.mode)?;
    let mut contests = BTreeMap::new();
    for (contest_id, contest) in &challenge.contests {
        let selections = contest
            .selections
            .par_iter()
            .map(|(id, selection)| {
                selection_response(guardian, selection, &secret, session)
                    .map(|response| (id.clone(), response))
            })
            .collect::<Result<BTreeMap<_, _>, TallyError>>()?;
        contests.insert(
            contest_id.clone(),
            ContestChallengeResponse {
                guardian_id: guardian.id().to_string(),
                object_id: contest.object_id.clone(),
                selections,
            },
        );
    }
    Ok(DecryptionChallengeResponse {
        guardian_id: guardian.id().to_string(),
        object_id: challenge.object_id.clone(),
        contests,
    })
}

/// Checks one guardian's response for one selection:
/// `g·v_i + K'·c_i == a_i` and `A·v_i + M_i·c_i == b_i`.
pub fn verify_selection_response<G: CurveGroup>(
    challenge: &SelectionChallenge<G>,
    share: &SelectionShare<G>,
    response: &SelectionChallengeResponse<G::ScalarField>,
    commitment_offset: &G,
) -> bool {
    if challenge.guardian_id != share.guardian_id
        || response.guardian_id != share.guardian_id
        || challenge.object_id != share.object_id
        || response.object_id != share.object_id
    {
        return false;
    }
    ChaumPedersenCommitment::recompute(
        &challenge.ciphertext.pad,
        commitment_offset,
        &share.share,
        &challenge.challenge,
        &response.response,
    )
    .ct_eq(&share.commitment)
}

/// Checks every selection of a guardian's response. A missing selection on
/// either side fails the check.
pub fn verify_decryption_response<G: CurveGroup>(
    challenge: &DecryptionChallenge<G>,
    share: &DecryptionShare<G>,
    response: &DecryptionChallengeResponse<G::ScalarField>,
    commitment_offset: &G,
) -> bool {
    if challenge.object_id != share.object_id
        || response.object_id != share.object_id
        || challenge.contests.len() != share.contests.len()
        || response.contests.len() != share.contests.len()
    {
        return false;
    }
    challenge.contests.iter().all(|(contest_id, contest)| {
        let (Some(contest_share), Some(contest_response)) = (
            share.contests.get(contest_id),
            response.contests.get(contest_id),
        ) else {
            return false;
        };
        contest.selections.len() == contest_share.selections.len()
            && contest.selections.len() == contest_response.selections.len()
            && contest.selections.par_iter().all(|(id, selection)| {
                match (
                    contest_share.selections.get(id),
                    contest_response.selections.get(id),
                ) {
                    (Some(s), Some(r)) => {
                        verify_selection_response(selection, s, r, commitment_offset)
                    }
                    _ => false,
                }
            })
    })
}
