//! Fixtures shared by the unit tests.

use std::collections::BTreeMap;

use ark_bls12_381::{Fr, G1Projective};
use ark_ec::CurveGroup;
use ark_std::{rand::RngCore, UniformRand};

use crate::ballot::{
    encrypt_ballot, plaintext_totals, BallotBoxState, CiphertextBallot, CiphertextSelection,
    CiphertextTally, PlaintextBallot,
};
use crate::context::{CeremonyDetails, ElectionContext};
use crate::elgamal::elgamal_encrypt;
use crate::guardian::Guardian;
use crate::key_ceremony::{perform_key_ceremony, ElectionPublicKey};
use crate::manifest::{ContestDescription, Manifest, SelectionDescription};

const CANDIDATES: [&str; 3] = ["alice", "bob", "carol"];
const ANSWERS: [&str; 2] = ["yes", "no"];

pub fn two_contest_manifest() -> Manifest<Fr> {
    let mayor = ContestDescription::new(
        "mayor",
        1,
        CANDIDATES
            .iter()
            .zip(1u64..)
            .map(|(id, order)| SelectionDescription::new(*id, order))
            .collect(),
    )
    .unwrap();
    let measure = ContestDescription::new(
        "measure",
        2,
        ANSWERS
            .iter()
            .zip(1u64..)
            .map(|(id, order)| SelectionDescription::new(*id, order))
            .collect(),
    )
    .unwrap();
    Manifest::new("test-election", vec![mayor, measure]).unwrap()
}

/// A key with the right shape for coefficient arithmetic but no valid proofs.
pub fn public_key_stub<G: CurveGroup>(owner_id: &str, sequence_order: u64) -> ElectionPublicKey<G> {
    ElectionPublicKey {
        owner_id: owner_id.to_string(),
        sequence_order,
        key: G::generator(),
        coefficient_commitments: vec![G::generator()],
        coefficient_proofs: vec![],
    }
}

pub fn create_guardians<G: CurveGroup>(
    details: CeremonyDetails,
    rng: &mut impl RngCore,
) -> Vec<Guardian<G>> {
    (1..=details.number_of_guardians)
        .map(|i| Guardian::new(format!("guardian-{}", i), i, details, rng).unwrap())
        .collect()
}

pub struct TestElection<G: CurveGroup> {
    pub manifest: Manifest<G::ScalarField>,
    pub guardians: Vec<Guardian<G>>,
    pub context: ElectionContext<G>,
}

impl<G: CurveGroup> TestElection<G> {
    pub fn public_keys(&self) -> Vec<ElectionPublicKey<G>> {
        self.guardians.iter().map(|g| g.share_public_key()).collect()
    }

    pub fn tally(&self, ballots: &[CiphertextBallot<G>]) -> CiphertextTally<G> {
        let mut tally = CiphertextTally::new("tally", &self.manifest);
        for ballot in ballots {
            tally.append(ballot).unwrap();
        }
        tally
    }

    /// `votes` for mayor/alice, encrypted under the joint key.
    pub fn single_selection(&self, votes: u64, rng: &mut impl RngCore) -> CiphertextSelection<G> {
        let description = self
            .manifest
            .contest("mayor")
            .and_then(|c| c.selection("alice"))
            .unwrap();
        let nonce = G::ScalarField::rand(rng);
        CiphertextSelection {
            object_id: description.object_id.clone(),
            sequence_order: description.sequence_order,
            description_hash: description.description_hash,
            ciphertext: elgamal_encrypt(votes, &nonce, &self.context.joint_public_key).unwrap(),
        }
    }

    /// Totals of the first `count` ballots from [`encrypted_ballots`].
    pub fn expected_totals(&self, count: usize) -> BTreeMap<String, BTreeMap<String, u64>> {
        plaintext_totals(&self.manifest, &plaintext_ballots(count))
    }
}

fn plaintext_ballots(count: usize) -> Vec<PlaintextBallot> {
    (0..count)
        .map(|i| {
            PlaintextBallot::new(format!("ballot-{}", i))
                .with_vote("mayor", CANDIDATES[i % CANDIDATES.len()], 1)
                .with_vote("measure", ANSWERS[i % ANSWERS.len()], 1)
        })
        .collect()
}

/// Guardians that completed the key ceremony, with the resulting context.
pub fn prepared_election(
    number_of_guardians: u64,
    quorum: u64,
    rng: &mut impl RngCore,
) -> TestElection<G1Projective> {
    let details = CeremonyDetails::new(number_of_guardians, quorum).unwrap();
    let manifest = two_contest_manifest();
    let mut guardians = create_guardians(details, rng);
    let joint_key = perform_key_ceremony(&mut guardians, rng).unwrap();
    let context = ElectionContext::new(details, &joint_key, manifest.crypto_hash().unwrap()).unwrap();
    TestElection {
        manifest,
        guardians,
        context,
    }
}

pub fn encrypted_ballots<G: CurveGroup>(
    election: &TestElection<G>,
    count: usize,
    rng: &mut impl RngCore,
) -> Vec<CiphertextBallot<G>> {
    plaintext_ballots(count)
        .iter()
        .map(|ballot| {
            encrypt_ballot(
                ballot,
                &election.manifest,
                &election.context.joint_public_key,
                BallotBoxState::Cast,
                rng,
            )
            .unwrap()
        })
        .collect()
}
