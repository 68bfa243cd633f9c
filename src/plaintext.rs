//! Decrypted tallies and ballots with the proofs that let anyone check them.

use std::collections::BTreeMap;

use ark_ec::CurveGroup;
use ark_serialize::*;

use crate::context::ElectionContext;
use crate::elgamal::ElGamalCiphertext;
use crate::proof::ChaumPedersenProof;
use crate::security::constant_time_eq;

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct PlaintextTallySelection<G: CurveGroup> {
    pub object_id: String,
    pub tally: u64,
    /// `M̄`, the combined partial decryptions
    pub value: G,
    pub message: ElGamalCiphertext<G>,
    pub proof: ChaumPedersenProof<G>,
}

impl<G: CurveGroup> PlaintextTallySelection<G> {
    /// Checks the proof against the joint key and that `B − M̄ == g·tally`.
    pub fn verify(&self, context: &ElectionContext<G>) -> bool {
        let decoded = self.message.decrypt_with(&self.value);
        let expected = G::generator() * G::ScalarField::from(self.tally);
        constant_time_eq(&decoded, &expected) && self.proof.is_valid(context, &self.message, &self.value)
    }
}

#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct PlaintextTallyContest<G: CurveGroup> {
    pub object_id: String,
    pub selections: BTreeMap<String, PlaintextTallySelection<G>>,
}

/// Result of decrypting a tally or a single ballot.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct PlaintextTally<G: CurveGroup> {
    pub object_id: String,
    pub contests: BTreeMap<String, PlaintextTallyContest<G>>,
}

impl<G: CurveGroup> PlaintextTally<G> {
    pub fn verify(&self, context: &ElectionContext<G>) -> bool {
        self.contests
            .values()
            .flat_map(|c| c.selections.values())
            .all(|s| s.verify(context))
    }

    /// Counts keyed by contest id, then selection id.
    pub fn counts(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.contests
            .iter()
            .map(|(id, contest)| {
                let selections = contest
                    .selections
                    .iter()
                    .map(|(sid, s)| (sid.clone(), s.tally))
                    .collect();
                (id.clone(), selections)
            })
            .collect()
    }
}
