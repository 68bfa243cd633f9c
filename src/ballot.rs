//! Plaintext and encrypted ballots, and the homomorphic ciphertext tally.
//!
//! Ballots here carry no selection-level validity proofs; they only provide
//! the ciphertexts that guardians decrypt.

use std::collections::{BTreeMap, BTreeSet};

use ark_ec::CurveGroup;
use ark_ff::PrimeField;
use ark_std::{rand::RngCore, UniformRand, Zero};

use crate::elgamal::{elgamal_encrypt, ElGamalCiphertext};
use crate::error::TallyError;
use crate::manifest::{ContestDescription, Manifest, SelectionDescription};

/// What happened to a ballot in the ballot box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BallotBoxState {
    /// Counted in the tally
    Cast,
    /// Excluded from the tally and decrypted on its own
    Spoiled,
    /// Challenged by the voter; excluded from the tally and decrypted on its own
    Challenged,
}

impl BallotBoxState {
    /// Spoiled and challenged ballots are decrypted individually.
    pub fn is_decrypted_individually(&self) -> bool {
        !matches!(self, BallotBoxState::Cast)
    }
}

/// Votes keyed by contest id, then selection id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaintextBallot {
    pub object_id: String,
    pub contests: BTreeMap<String, BTreeMap<String, u64>>,
}

impl PlaintextBallot {
    pub fn new(object_id: impl Into<String>) -> Self {
        PlaintextBallot {
            object_id: object_id.into(),
            contests: BTreeMap::new(),
        }
    }

    pub fn with_vote(
        mut self,
        contest_id: impl Into<String>,
        selection_id: impl Into<String>,
        votes: u64,
    ) -> Self {
        self.contests
            .entry(contest_id.into())
            .or_default()
            .insert(selection_id.into(), votes);
        self
    }

    /// Votes for a selection; anything not marked counts as zero.
    pub fn votes(&self, contest_id: &str, selection_id: &str) -> u64 {
        self.contests
            .get(contest_id)
            .and_then(|c| c.get(selection_id))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CiphertextSelection<G: CurveGroup> {
    pub object_id: String,
    pub sequence_order: u64,
    pub description_hash: G::ScalarField,
    pub ciphertext: ElGamalCiphertext<G>,
}

impl<G: CurveGroup> CiphertextSelection<G> {
    fn empty(description: &SelectionDescription<G::ScalarField>) -> Self {
        CiphertextSelection {
            object_id: description.object_id.clone(),
            sequence_order: description.sequence_order,
            description_hash: description.description_hash,
            ciphertext: ElGamalCiphertext::zero(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CiphertextContest<G: CurveGroup> {
    pub object_id: String,
    pub sequence_order: u64,
    pub description_hash: G::ScalarField,
    pub selections: BTreeMap<String, CiphertextSelection<G>>,
}

impl<G: CurveGroup> CiphertextContest<G> {
    fn empty(description: &ContestDescription<G::ScalarField>) -> Self {
        CiphertextContest {
            object_id: description.object_id.clone(),
            sequence_order: description.sequence_order,
            description_hash: description.description_hash,
            selections: description
                .selections
                .iter()
                .map(|s| (s.object_id.clone(), CiphertextSelection::empty(s)))
                .collect(),
        }
    }
}

/// Anything guardians can decrypt: a tally or an individual ballot.
pub trait CiphertextContainer<G: CurveGroup> {
    fn object_id(&self) -> &str;
    fn contests(&self) -> &BTreeMap<String, CiphertextContest<G>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CiphertextBallot<G: CurveGroup> {
    pub object_id: String,
    pub state: BallotBoxState,
    pub contests: BTreeMap<String, CiphertextContest<G>>,
}

impl<G: CurveGroup> CiphertextContainer<G> for CiphertextBallot<G> {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn contests(&self) -> &BTreeMap<String, CiphertextContest<G>> {
        &self.contests
    }
}

/// Encrypts every selection of `manifest` for `ballot` under `public_key`.
///
/// # Errors
/// Returns an error if the ballot votes in a contest or selection that the
/// manifest does not define.
pub fn encrypt_ballot<G: CurveGroup, R: RngCore>(
    ballot: &PlaintextBallot,
    manifest: &Manifest<G::ScalarField>,
    public_key: &G,
    state: BallotBoxState,
    rng: &mut R,
) -> Result<CiphertextBallot<G>, TallyError> {
    for (contest_id, selections) in &ballot.contests {
        let contest = manifest.contest(contest_id).ok_or_else(|| {
            TallyError::invalid_argument(format!(
                "ballot {} votes in unknown contest {}",
                ballot.object_id, contest_id
            ))
        })?;
        if let Some(selection_id) = selections.keys().find(|id| contest.selection(id).is_none()) {
            return Err(TallyError::invalid_argument(format!(
                "ballot {} votes for unknown selection {} in contest {}",
                ballot.object_id, selection_id, contest_id
            )));
        }
    }

    let mut contests = BTreeMap::new();
    for contest in &manifest.contests {
        let mut encrypted = CiphertextContest::empty(contest);
        for selection in encrypted.selections.values_mut() {
            let votes = ballot.votes(&contest.object_id, &selection.object_id);
            let mut nonce = G::ScalarField::rand(rng);
            while nonce.is_zero() {
                nonce = G::ScalarField::rand(rng);
            }
            selection.ciphertext = elgamal_encrypt(votes, &nonce, public_key)?;
        }
        contests.insert(contest.object_id.clone(), encrypted);
    }

    Ok(CiphertextBallot {
        object_id: ballot.object_id.clone(),
        state,
        contests,
    })
}

/// Homomorphic sum of every cast ballot, per selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CiphertextTally<G: CurveGroup> {
    pub object_id: String,
    pub contests: BTreeMap<String, CiphertextContest<G>>,
    pub cast_ballot_ids: BTreeSet<String>,
    pub spoiled_ballot_ids: BTreeSet<String>,
}

impl<G: CurveGroup> CiphertextTally<G> {
    pub fn new(object_id: impl Into<String>, manifest: &Manifest<G::ScalarField>) -> Self {
        CiphertextTally {
            object_id: object_id.into(),
            contests: manifest
                .contests
                .iter()
                .map(|c| (c.object_id.clone(), CiphertextContest::empty(c)))
                .collect(),
            cast_ballot_ids: BTreeSet::new(),
            spoiled_ballot_ids: BTreeSet::new(),
        }
    }

    /// Adds a cast ballot into the running sums, or records a spoiled one.
    ///
    /// # Errors
    /// Returns an error if the ballot was already appended or its contests and
    /// selections differ from the tally's. The tally is unchanged on error.
    pub fn append(&mut self, ballot: &CiphertextBallot<G>) -> Result<(), TallyError> {
        if self.cast_ballot_ids.contains(&ballot.object_id)
            || self.spoiled_ballot_ids.contains(&ballot.object_id)
        {
            return Err(TallyError::invalid_argument(format!(
                "ballot {} already appended to tally {}",
                ballot.object_id, self.object_id
            )));
        }

        if ballot.state.is_decrypted_individually() {
            self.spoiled_ballot_ids.insert(ballot.object_id.clone());
            return Ok(());
        }

        for (contest_id, contest) in &self.contests {
            let ballot_contest = ballot.contests.get(contest_id).ok_or_else(|| {
                TallyError::key_not_found(format!(
                    "ballot {} has no contest {}",
                    ballot.object_id, contest_id
                ))
            })?;
            for selection_id in contest.selections.keys() {
                if !ballot_contest.selections.contains_key(selection_id) {
                    return Err(TallyError::key_not_found(format!(
                        "ballot {} has no selection {} in contest {}",
                        ballot.object_id, selection_id, contest_id
                    )));
                }
            }
        }

        for (contest_id, contest) in self.contests.iter_mut() {
            let ballot_contest = &ballot.contests[contest_id];
            for (selection_id, selection) in contest.selections.iter_mut() {
                let ct = &ballot_contest.selections[selection_id].ciphertext;
                selection.ciphertext = selection.ciphertext.add(ct);
            }
        }
        self.cast_ballot_ids.insert(ballot.object_id.clone());
        Ok(())
    }

    pub fn cast_count(&self) -> u64 {
        self.cast_ballot_ids.len() as u64
    }
}

impl<G: CurveGroup> CiphertextContainer<G> for CiphertextTally<G> {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn contests(&self) -> &BTreeMap<String, CiphertextContest<G>> {
        &self.contests
    }
}

/// Counts per contest and selection over a set of plaintext ballots.
pub fn plaintext_totals<F: PrimeField>(
    manifest: &Manifest<F>,
    ballots: &[PlaintextBallot],
) -> BTreeMap<String, BTreeMap<String, u64>> {
    manifest
        .contests
        .iter()
        .map(|contest| {
            let selections = contest
                .selections
                .iter()
                .map(|selection| {
                    let total = ballots
                        .iter()
                        .map(|b| b.votes(&contest.object_id, &selection.object_id))
                        .sum();
                    (selection.object_id.clone(), total)
                })
                .collect();
            (contest.object_id.clone(), selections)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::two_contest_manifest;
    use ark_bls12_381::{Fr, G1Projective};
    use ark_ec::PrimeGroup;

    type G = G1Projective;

    #[test]
    fn test_encrypt_ballot_covers_manifest() {
        let mut rng = ark_std::test_rng();
        let manifest = two_contest_manifest();
        let key = G::generator() * Fr::rand(&mut rng);
        let ballot = PlaintextBallot::new("ballot-1").with_vote("mayor", "alice", 1);

        let encrypted =
            encrypt_ballot(&ballot, &manifest, &key, BallotBoxState::Cast, &mut rng).unwrap();
        assert_eq!(encrypted.contests.len(), 2);
        assert_eq!(encrypted.contests["mayor"].selections.len(), 3);
        assert_eq!(encrypted.contests["measure"].selections.len(), 2);
    }

    #[test]
    fn test_encrypt_ballot_rejects_unknown_selection() {
        let mut rng = ark_std::test_rng();
        let manifest = two_contest_manifest();
        let key = G::generator();
        let ballot = PlaintextBallot::new("ballot-1").with_vote("mayor", "mallory", 1);
        let result = encrypt_ballot(&ballot, &manifest, &key, BallotBoxState::Cast, &mut rng);
        assert!(matches!(result, Err(TallyError::InvalidArgument(_))));

        let ballot = PlaintextBallot::new("ballot-2").with_vote("dogcatcher", "alice", 1);
        let result = encrypt_ballot(&ballot, &manifest, &key, BallotBoxState::Cast, &mut rng);
        assert!(matches!(result, Err(TallyError::InvalidArgument(_))));
    }

    #[test]
    fn test_tally_append() {
        let mut rng = ark_std::test_rng();
        let manifest = two_contest_manifest();
        let key = G::generator() * Fr::rand(&mut rng);
        let mut tally = CiphertextTally::<G>::new("tally", &manifest);

        let cast = encrypt_ballot(
            &PlaintextBallot::new("b1").with_vote("mayor", "bob", 1),
            &manifest,
            &key,
            BallotBoxState::Cast,
            &mut rng,
        )
        .unwrap();
        let spoiled = encrypt_ballot(
            &PlaintextBallot::new("b2").with_vote("mayor", "alice", 1),
            &manifest,
            &key,
            BallotBoxState::Spoiled,
            &mut rng,
        )
        .unwrap();

        tally.append(&cast).unwrap();
        tally.append(&spoiled).unwrap();
        assert_eq!(tally.cast_count(), 1);
        assert!(tally.spoiled_ballot_ids.contains("b2"));
        assert_eq!(
            tally.contests["mayor"].selections["bob"].ciphertext,
            cast.contests["mayor"].selections["bob"].ciphertext
        );

        assert!(matches!(
            tally.append(&cast),
            Err(TallyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_tally_append_rejects_mismatched_ballot() {
        let mut rng = ark_std::test_rng();
        let manifest = two_contest_manifest();
        let key = G::generator() * Fr::rand(&mut rng);
        let mut tally = CiphertextTally::<G>::new("tally", &manifest);

        let mut ballot = encrypt_ballot(
            &PlaintextBallot::new("b1"),
            &manifest,
            &key,
            BallotBoxState::Cast,
            &mut rng,
        )
        .unwrap();
        ballot.contests.remove("measure");

        let before = tally.clone();
        assert!(matches!(
            tally.append(&ballot),
            Err(TallyError::KeyNotFound(_))
        ));
        assert_eq!(tally, before);
    }

    #[test]
    fn test_plaintext_totals() {
        let manifest = two_contest_manifest();
        let ballots = vec![
            PlaintextBallot::new("b1").with_vote("mayor", "alice", 1),
            PlaintextBallot::new("b2").with_vote("mayor", "alice", 1),
            PlaintextBallot::new("b3").with_vote("measure", "yes", 1),
        ];
        let totals = plaintext_totals(&manifest, &ballots);
        assert_eq!(totals["mayor"]["alice"], 2);
        assert_eq!(totals["mayor"]["bob"], 0);
        assert_eq!(totals["measure"]["yes"], 1);
    }
}
