//! Lagrange-weighted combination of guardian shares.
//!
//! For each selection the accumulator keeps
//!
//! ```text
//! value      = Σ w_i·M_i          (M̄, the combined decryption)
//! commitment = Σ (a_i, b_i)
//! ```
//!
//! over every contributing guardian. Contributions are checked in full before
//! any field is touched, so a rejected share leaves the accumulator as it was.

use std::collections::{BTreeMap, BTreeSet};

use ark_ec::CurveGroup;
use tracing::debug;

use crate::ballot::{CiphertextContainer, CiphertextContest, CiphertextSelection};
use crate::challenge::compute_decryption_challenge;
use crate::context::ElectionContext;
use crate::decryption_share::{ContestShare, DecryptionShare, SelectionShare};
use crate::elgamal::ElGamalCiphertext;
use crate::error::TallyError;
use crate::lagrange::LagrangeCoefficient;
use crate::proof::{ChaumPedersenCommitment, ChaumPedersenProof};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccumulatedSelection<G: CurveGroup> {
    pub object_id: String,
    pub value: G,
    pub commitment: ChaumPedersenCommitment<G>,
    pub contributors: BTreeSet<String>,
    /// Base challenge `c`, fixed once every share is in
    pub challenge: Option<G::ScalarField>,
    pub proof: Option<ChaumPedersenProof<G>>,
}

impl<G: CurveGroup> AccumulatedSelection<G> {
    pub fn new(object_id: impl Into<String>) -> Self {
        AccumulatedSelection {
            object_id: object_id.into(),
            value: G::zero(),
            commitment: ChaumPedersenCommitment::zero(),
            contributors: BTreeSet::new(),
            challenge: None,
            proof: None,
        }
    }

    fn check(
        &self,
        share: &SelectionShare<G>,
        coefficient: &LagrangeCoefficient<G::ScalarField>,
    ) -> Result<(), TallyError> {
        if share.guardian_id != coefficient.guardian_id {
            return Err(TallyError::invalid_argument(format!(
                "share of {} paired with the coefficient of {}",
                share.guardian_id, coefficient.guardian_id
            )));
        }
        if share.object_id != self.object_id {
            return Err(TallyError::invalid_argument(format!(
                "share for {} accumulated into {}",
                share.object_id, self.object_id
            )));
        }
        if self.challenge.is_some() {
            return Err(TallyError::invalid_operation(format!(
                "challenge for {} already computed",
                self.object_id
            )));
        }
        if self.contributors.contains(&share.guardian_id) {
            return Err(TallyError::invalid_operation(format!(
                "guardian {} already contributed to {}",
                share.guardian_id, self.object_id
            )));
        }
        Ok(())
    }

    fn apply(&mut self, share: &SelectionShare<G>, coefficient: &G::ScalarField) {
        self.value += share.share * coefficient;
        self.commitment = self.commitment.add(&share.commitment);
        self.contributors.insert(share.guardian_id.clone());
    }

    /// Folds in one guardian's share weighted by its Lagrange coefficient.
    ///
    /// # Errors
    /// `InvalidOperation` if the guardian already contributed or the challenge
    /// was already computed; `InvalidArgument` on mismatched ids.
    pub fn accumulate(
        &mut self,
        share: &SelectionShare<G>,
        coefficient: &LagrangeCoefficient<G::ScalarField>,
    ) -> Result<(), TallyError> {
        self.check(share, coefficient)?;
        self.apply(share, &coefficient.coefficient);
        Ok(())
    }

    /// Fixes the base challenge for this selection.
    pub fn compute_challenge(
        &mut self,
        context: &ElectionContext<G>,
        ciphertext: &ElGamalCiphertext<G>,
    ) -> Result<G::ScalarField, TallyError> {
        let challenge =
            compute_decryption_challenge(context, ciphertext, &self.commitment, &self.value)?;
        self.challenge = Some(challenge);
        Ok(challenge)
    }

    /// Completes the proof from every guardian's response.
    ///
    /// # Errors
    /// `InvalidOperation` if no challenge was computed yet.
    pub fn assemble_proof<'a, I>(&mut self, responses: I) -> Result<&ChaumPedersenProof<G>, TallyError>
    where
        I: IntoIterator<Item = &'a G::ScalarField>,
    {
        let challenge = self.challenge.ok_or_else(|| {
            TallyError::invalid_operation(format!("no challenge computed for {}", self.object_id))
        })?;
        Ok(self
            .proof
            .insert(ChaumPedersenProof::assemble(self.commitment, challenge, responses)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccumulatedContest<G: CurveGroup> {
    pub object_id: String,
    pub selections: BTreeMap<String, AccumulatedSelection<G>>,
}

impl<G: CurveGroup> AccumulatedContest<G> {
    pub fn new(contest: &CiphertextContest<G>) -> Self {
        AccumulatedContest {
            object_id: contest.object_id.clone(),
            selections: contest
                .selections
                .values()
                .map(|s: &CiphertextSelection<G>| {
                    (s.object_id.clone(), AccumulatedSelection::new(s.object_id.clone()))
                })
                .collect(),
        }
    }

    fn check(
        &self,
        share: &ContestShare<G>,
        coefficient: &LagrangeCoefficient<G::ScalarField>,
    ) -> Result<(), TallyError> {
        if share.object_id != self.object_id {
            return Err(TallyError::invalid_argument(format!(
                "share for contest {} accumulated into {}",
                share.object_id, self.object_id
            )));
        }
        for id in self.selections.keys() {
            if !share.selections.contains_key(id) {
                return Err(TallyError::key_not_found(format!(
                    "share of {} has no selection {} in contest {}",
                    share.guardian_id, id, self.object_id
                )));
            }
        }
        for (id, selection_share) in &share.selections {
            let selection = self.selections.get(id).ok_or_else(|| {
                TallyError::key_not_found(format!(
                    "contest {} has no selection {}",
                    self.object_id, id
                ))
            })?;
            selection.check(selection_share, coefficient)?;
        }
        Ok(())
    }

    fn apply(&mut self, share: &ContestShare<G>, coefficient: &G::ScalarField) {
        for (id, selection) in self.selections.iter_mut() {
            if let Some(selection_share) = share.selections.get(id) {
                selection.apply(selection_share, coefficient);
            }
        }
    }

    /// # Errors
    /// `KeyNotFound` if the share and the contest disagree on selection ids,
    /// plus every error of [`AccumulatedSelection::accumulate`]. Nothing is
    /// changed on error.
    pub fn accumulate(
        &mut self,
        share: &ContestShare<G>,
        coefficient: &LagrangeCoefficient<G::ScalarField>,
    ) -> Result<(), TallyError> {
        self.check(share, coefficient)?;
        self.apply(share, &coefficient.coefficient);
        Ok(())
    }
}

/// Accumulator for a whole tally or ballot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccumulatedDecryption<G: CurveGroup> {
    pub object_id: String,
    pub contests: BTreeMap<String, AccumulatedContest<G>>,
    pub contributors: BTreeSet<String>,
}

pub type AccumulatedTally<G> = AccumulatedDecryption<G>;
pub type AccumulatedBallot<G> = AccumulatedDecryption<G>;

impl<G: CurveGroup> AccumulatedDecryption<G> {
    pub fn new<C: CiphertextContainer<G>>(container: &C) -> Self {
        AccumulatedDecryption {
            object_id: container.object_id().to_string(),
            contests: container
                .contests()
                .iter()
                .map(|(id, contest)| (id.clone(), AccumulatedContest::new(contest)))
                .collect(),
            contributors: BTreeSet::new(),
        }
    }

    /// # Errors
    /// `KeyNotFound` if the share and the accumulator disagree on contest or
    /// selection ids; `InvalidOperation` for a repeated contributor;
    /// `InvalidArgument` on mismatched object or guardian ids. Nothing is
    /// changed on error.
    pub fn accumulate(
        &mut self,
        share: &DecryptionShare<G>,
        coefficient: &LagrangeCoefficient<G::ScalarField>,
    ) -> Result<(), TallyError> {
        if share.object_id != self.object_id {
            return Err(TallyError::invalid_argument(format!(
                "share for {} accumulated into {}",
                share.object_id, self.object_id
            )));
        }
        if share.guardian_id != coefficient.guardian_id {
            return Err(TallyError::invalid_argument(format!(
                "share of {} paired with the coefficient of {}",
                share.guardian_id, coefficient.guardian_id
            )));
        }
        if self.contributors.contains(&share.guardian_id) {
            return Err(TallyError::invalid_operation(format!(
                "guardian {} already contributed to {}",
                share.guardian_id, self.object_id
            )));
        }
        for id in self.contests.keys() {
            if !share.contests.contains_key(id) {
                return Err(TallyError::key_not_found(format!(
                    "share of {} has no contest {}",
                    share.guardian_id, id
                )));
            }
        }
        for (id, contest_share) in &share.contests {
            let contest = self.contests.get(id).ok_or_else(|| {
                TallyError::key_not_found(format!("{} has no contest {}", self.object_id, id))
            })?;
            contest.check(contest_share, coefficient)?;
        }

        for (id, contest) in self.contests.iter_mut() {
            if let Some(contest_share) = share.contests.get(id) {
                contest.apply(contest_share, &coefficient.coefficient);
            }
        }
        self.contributors.insert(share.guardian_id.clone());
        Ok(())
    }

    /// True once exactly `expected` guardians contributed.
    pub fn is_complete(&self, expected: usize) -> bool {
        self.contributors.len() == expected
    }
}

/// Accumulates a full set of shares for `container`.
///
/// # Errors
/// `InvalidArgument` if the counts of shares and coefficients differ or fall
/// below `quorum`; `KeyNotFound` if a share has no coefficient; any error of
/// [`AccumulatedDecryption::accumulate`].
pub fn accumulate_shares<G: CurveGroup, C: CiphertextContainer<G>>(
    container: &C,
    shares: &[DecryptionShare<G>],
    coefficients: &[LagrangeCoefficient<G::ScalarField>],
    quorum: u64,
) -> Result<AccumulatedDecryption<G>, TallyError> {
    if shares.len() != coefficients.len() {
        return Err(TallyError::invalid_argument(format!(
            "{} shares but {} coefficients",
            shares.len(),
            coefficients.len()
        )));
    }
    if (shares.len() as u64) < quorum {
        return Err(TallyError::invalid_argument(format!(
            "{} shares do not meet the quorum of {}",
            shares.len(),
            quorum
        )));
    }

    let mut accumulated = AccumulatedDecryption::new(container);
    for share in shares {
        let coefficient = coefficients
            .iter()
            .find(|c| c.guardian_id == share.guardian_id)
            .ok_or_else(|| {
                TallyError::key_not_found(format!("no coefficient for {}", share.guardian_id))
            })?;
        accumulated.accumulate(share, coefficient)?;
    }
    debug!(
        "accumulated {} shares for {}",
        shares.len(),
        accumulated.object_id
    );
    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::CiphertextTally;
    use crate::decryption_share::compute_decryption_share;
    use crate::guardian::{DecryptionSession, KeyShareMode};
    use crate::lagrange::compute_lagrange_coefficients;
    use crate::test_utils::{encrypted_ballots, prepared_election, TestElection};
    use ark_bls12_381::{Fr, G1Projective};
    use ark_ec::PrimeGroup;

    type G = G1Projective;

    fn threshold_shares(
        election: &TestElection<G>,
        tally: &CiphertextTally<G>,
        present: &[usize],
    ) -> (Vec<DecryptionShare<G>>, Vec<LagrangeCoefficient<Fr>>) {
        let keys: Vec<_> = present
            .iter()
            .map(|&i| election.guardians[i].share_public_key())
            .collect();
        let session = DecryptionSession::new(
            KeyShareMode::Threshold,
            &tally.object_id,
            keys.iter().map(|k| k.owner_id.as_str()),
        );
        let shares = present
            .iter()
            .map(|&i| compute_decryption_share(&election.guardians[i], tally, &session).unwrap())
            .collect();
        (shares, compute_lagrange_coefficients(&keys).unwrap())
    }

    #[test]
    fn test_any_quorum_decrypts_tally() {
        let mut rng = ark_std::test_rng();
        let election = prepared_election(5, 3, &mut rng);
        let ballots = encrypted_ballots(&election, 4, &mut rng);
        let tally = election.tally(&ballots);
        let expected = election.expected_totals(4);

        for present in [[0usize, 1, 2], [0, 2, 4], [1, 3, 4]] {
            let (shares, coefficients) = threshold_shares(&election, &tally, &present);
            let accumulated = accumulate_shares(&tally, &shares, &coefficients, 3).unwrap();
            assert!(accumulated.is_complete(3));
            for (contest_id, contest) in &accumulated.contests {
                for (selection_id, selection) in &contest.selections {
                    let ciphertext = &tally.contests[contest_id].selections[selection_id].ciphertext;
                    let count = expected[contest_id][selection_id];
                    assert_eq!(
                        ciphertext.decrypt_with(&selection.value),
                        G::generator() * Fr::from(count)
                    );
                }
            }
        }
    }

    #[test]
    fn test_accumulation_order_does_not_matter() {
        let mut rng = ark_std::test_rng();
        let election = prepared_election(5, 3, &mut rng);
        let tally = election.tally(&encrypted_ballots(&election, 2, &mut rng));
        let (shares, coefficients) = threshold_shares(&election, &tally, &[0, 2, 3]);

        let forward = accumulate_shares(&tally, &shares, &coefficients, 3).unwrap();
        let reversed_shares: Vec<_> = shares.iter().rev().cloned().collect();
        let backward = accumulate_shares(&tally, &reversed_shares, &coefficients, 3).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_duplicate_contribution_is_rejected() {
        let mut rng = ark_std::test_rng();
        let election = prepared_election(3, 2, &mut rng);
        let tally = election.tally(&encrypted_ballots(&election, 1, &mut rng));
        let (shares, coefficients) = threshold_shares(&election, &tally, &[0, 1]);

        let mut accumulated = AccumulatedDecryption::new(&tally);
        accumulated.accumulate(&shares[0], &coefficients[0]).unwrap();
        let before = accumulated.clone();
        assert!(matches!(
            accumulated.accumulate(&shares[0], &coefficients[0]),
            Err(TallyError::InvalidOperation(_))
        ));
        assert_eq!(accumulated, before);

        let selections = &mut accumulated.contests.get_mut("mayor").unwrap().selections;
        let alice = selections.get_mut("alice").unwrap();
        let share = &shares[0].contests["mayor"].selections["alice"];
        assert!(matches!(
            alice.accumulate(share, &coefficients[0]),
            Err(TallyError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_mismatched_shape_leaves_accumulator_unchanged() {
        let mut rng = ark_std::test_rng();
        let election = prepared_election(3, 2, &mut rng);
        let tally = election.tally(&encrypted_ballots(&election, 1, &mut rng));
        let (shares, coefficients) = threshold_shares(&election, &tally, &[0, 1]);

        let mut accumulated = AccumulatedDecryption::new(&tally);
        let mut missing = shares[1].clone();
        missing
            .contests
            .get_mut("measure")
            .unwrap()
            .selections
            .remove("no");
        assert!(matches!(
            accumulated.accumulate(&missing, &coefficients[1]),
            Err(TallyError::KeyNotFound(_))
        ));

        let mut extra = shares[1].clone();
        let stray = extra.contests["measure"].selections["no"].clone();
        extra
            .contests
            .get_mut("measure")
            .unwrap()
            .selections
            .insert("maybe".to_string(), stray);
        assert!(matches!(
            accumulated.accumulate(&extra, &coefficients[1]),
            Err(TallyError::KeyNotFound(_))
        ));
        assert_eq!(accumulated, AccumulatedDecryption::new(&tally));
    }

    #[test]
    fn test_accumulate_shares_preconditions() {
        let mut rng = ark_std::test_rng();
        let election = prepared_election(3, 2, &mut rng);
        let tally = election.tally(&encrypted_ballots(&election, 1, &mut rng));
        let (shares, coefficients) = threshold_shares(&election, &tally, &[0, 1]);

        assert!(matches!(
            accumulate_shares(&tally, &shares[..1], &coefficients, 2),
            Err(TallyError::InvalidArgument(_))
        ));
        assert!(matches!(
            accumulate_shares(&tally, &shares[..1], &coefficients[..1], 2),
            Err(TallyError::InvalidArgument(_))
        ));

        let mut renamed = coefficients.clone();
        renamed[1].guardian_id = "guardian-9".to_string();
        assert!(matches!(
            accumulate_shares(&tally, &shares, &renamed, 2),
            Err(TallyError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_challenge_freezes_selection() {
        let mut rng = ark_std::test_rng();
        let election = prepared_election(3, 2, &mut rng);
        let tally = election.tally(&encrypted_ballots(&election, 1, &mut rng));
        let (shares, coefficients) = threshold_shares(&election, &tally, &[0, 1]);

        let mut selection = AccumulatedSelection::<G>::new("alice");
        assert!(selection.assemble_proof(std::iter::empty::<&Fr>()).is_err());
        let share = &shares[0].contests["mayor"].selections["alice"];
        selection.accumulate(share, &coefficients[0]).unwrap();
        selection
            .compute_challenge(
                &election.context,
                &tally.contests["mayor"].selections["alice"].ciphertext,
            )
            .unwrap();
        let late = &shares[1].contests["mayor"].selections["alice"];
        assert!(matches!(
            selection.accumulate(late, &coefficients[1]),
            Err(TallyError::InvalidOperation(_))
        ));
    }
}
