//! Partial decryptions produced by one guardian, with the commitment half of
//! the guardian's Chaum-Pedersen proof.
//!
//! Shares are nested the same way as the ciphertexts they decrypt: object id,
//! then contest id, then selection id.

use std::collections::BTreeMap;

use ark_ec::CurveGroup;
use ark_serialize::*;
use ark_std::{end_timer, start_timer};
use rayon::prelude::*;
use tracing::debug;

use crate::ballot::{CiphertextBallot, CiphertextContainer, CiphertextContest, CiphertextSelection};
use crate::error::TallyError;
use crate::guardian::{DecryptionSession, Guardian};
use crate::proof::ChaumPedersenCommitment;
use crate::security::SensitiveScalar;

/// `M_i = A·s_i` for one selection, plus the commitment `(g·u_i, A·u_i)`.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SelectionShare<G: CurveGroup> {
    pub guardian_id: String,
    pub object_id: String,
    pub description_hash: G::ScalarField,
    pub share: G,
    pub commitment: ChaumPedersenCommitment<G>,
}

impl<G: CurveGroup> SelectionShare<G> {
    /// Structural check only: the share belongs to `guardian_id` and answers
    /// `selection`. Correctness is established later by the response.
    pub fn is_valid(&self, guardian_id: &str, selection: &CiphertextSelection<G>) -> bool {
        self.guardian_id == guardian_id
            && self.object_id == selection.object_id
            && self.description_hash == selection.description_hash
            && !self.commitment.pad.is_zero()
    }
}

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContestShare<G: CurveGroup> {
    pub guardian_id: String,
    pub object_id: String,
    pub selections: BTreeMap<String, SelectionShare<G>>,
}

impl<G: CurveGroup> ContestShare<G> {
    pub fn is_valid(&self, guardian_id: &str, contest: &CiphertextContest<G>) -> bool {
        self.guardian_id == guardian_id
            && self.object_id == contest.object_id
            && self.selections.len() == contest.selections.len()
            && contest.selections.iter().all(|(id, selection)| {
                self.selections
                    .get(id)
                    .map_or(false, |share| share.is_valid(guardian_id, selection))
            })
    }
}

/// One guardian's shares for a whole tally or ballot.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct DecryptionShare<G: CurveGroup> {
    pub guardian_id: String,
    pub object_id: String,
    pub contests: BTreeMap<String, ContestShare<G>>,
}

pub type TallyShare<G> = DecryptionShare<G>;
pub type BallotShare<G> = DecryptionShare<G>;

impl<G: CurveGroup> DecryptionShare<G> {
    pub fn is_valid<C: CiphertextContainer<G>>(&self, guardian_id: &str, container: &C) -> bool {
        let contests = container.contests();
        self.guardian_id == guardian_id
            && self.object_id == container.object_id()
            && self.contests.len() == contests.len()
            && contests.iter().all(|(id, contest)| {
                self.contests
                    .get(id)
                    .map_or(false, |share| share.is_valid(guardian_id, contest))
            })
    }
}

fn selection_share<G: CurveGroup>(
    guardian: &Guardian<G>,
    selection: &CiphertextSelection<G>,
    secret: &SensitiveScalar<G::ScalarField>,
    session: &DecryptionSession,
) -> Result<SelectionShare<G>, TallyError> {
    Ok(SelectionShare {
        guardian_id: guardian.id().to_string(),
        object_id: selection.object_id.clone(),
        description_hash: selection.description_hash,
        share: selection.ciphertext.partial_decrypt(secret.expose_secret()),
        commitment: guardian.create_commitment(selection, session)?,
    })
}

fn contest_share<G: CurveGroup>(
    guardian: &Guardian<G>,
    contest: &CiphertextContest<G>,
    secret: &SensitiveScalar<G::ScalarField>,
    session: &DecryptionSession,
) -> Result<ContestShare<G>, TallyError> {
    let selections = contest
        .selections
        .par_iter()
        .map(|(id, selection)| {
            selection_share(guardian, selection, secret, session).map(|share| (id.clone(), share))
        })
        .collect::<Result<BTreeMap<_, _>, TallyError>>()?;
    Ok(ContestShare {
        guardian_id: guardian.id().to_string(),
        object_id: contest.object_id.clone(),
        selections,
    })
}

pub fn compute_selection_share<G: CurveGroup>(
    guardian: &Guardian<G>,
    selection: &CiphertextSelection<G>,
    session: &DecryptionSession,
) -> Result<SelectionShare<G>, TallyError> {
    let secret = guardian.partial_secret(session.mode)?;
    selection_share(guardian, selection, &secret, session)
}

pub fn compute_contest_share<G: CurveGroup>(
    guardian: &Guardian<G>,
    contest: &CiphertextContest<G>,
    session: &DecryptionSession,
) -> Result<ContestShare<G>, TallyError> {
    let secret = guardian.partial_secret(session.mode)?;
    contest_share(guardian, contest, &secret, session)
}

/// Computes a guardian's share of every selection in `container`.
///
/// The guardian's secret for the session is derived once and reused for
/// every selection.
///
/// # Errors
/// Fails if the guardian cannot produce its secret for the session's mode.
pub fn compute_decryption_share<G: CurveGroup, C: CiphertextContainer<G>>(
    guardian: &Guardian<G>,
    container: &C,
    session: &DecryptionSession,
) -> Result<DecryptionShare<G>, TallyError> {
    let timer = start_timer!(|| format!("Share of {} for {}", guardian.id(), container.object_id()));
    let secret = guardian.partial_secret(session.mode)?;
    let mut contests = BTreeMap::new();
    for (id, contest) in container.contests() {
        contests.insert(id.clone(), contest_share(guardian, contest, &secret, session)?);
    }
    end_timer!(timer);
    debug!(
        "{}: computed share of {} (session {})",
        guardian.id(),
        container.object_id(),
        session.short_id()
    );
    Ok(DecryptionShare {
        guardian_id: guardian.id().to_string(),
        object_id: container.object_id().to_string(),
        contests,
    })
}

/// Share of an individually decrypted (spoiled or challenged) ballot.
pub fn compute_ballot_share<G: CurveGroup>(
    guardian: &Guardian<G>,
    ballot: &CiphertextBallot<G>,
    session: &DecryptionSession,
) -> Result<BallotShare<G>, TallyError> {
    if !ballot.state.is_decrypted_individually() {
        return Err(TallyError::invalid_argument(format!(
            "ballot {} was cast and is only decrypted as part of a tally",
            ballot.object_id
        )));
    }
    compute_decryption_share(guardian, ballot, session)
}
