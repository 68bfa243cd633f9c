//! Minimal election manifest.
//!
//! The decryption protocol only needs stable identifiers for contests and
//! selections: an object id, a sequence order and a description hash. This
//! module provides exactly that and nothing about candidates, parties or
//! ballot styles.

use std::collections::BTreeSet;

use ark_ff::PrimeField;

use crate::error::TallyError;
use crate::hash::{domain, Transcript};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionDescription<F: PrimeField> {
    pub object_id: String,
    pub sequence_order: u64,
    pub description_hash: F,
}

impl<F: PrimeField> SelectionDescription<F> {
    pub fn new(object_id: impl Into<String>, sequence_order: u64) -> Self {
        let object_id = object_id.into();
        let mut transcript = Transcript::new(domain::MANIFEST);
        transcript
            .append_str("selection")
            .append_str(&object_id)
            .append_u64(sequence_order);
        SelectionDescription {
            object_id,
            sequence_order,
            description_hash: transcript.challenge(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContestDescription<F: PrimeField> {
    pub object_id: String,
    pub sequence_order: u64,
    pub description_hash: F,
    pub selections: Vec<SelectionDescription<F>>,
}

impl<F: PrimeField> ContestDescription<F> {
    /// # Errors
    /// Returns an error if two selections share an object id or a sequence order.
    pub fn new(
        object_id: impl Into<String>,
        sequence_order: u64,
        selections: Vec<SelectionDescription<F>>,
    ) -> Result<Self, TallyError> {
        let object_id = object_id.into();
        let mut ids = BTreeSet::new();
        let mut orders = BTreeSet::new();
        for selection in &selections {
            if !ids.insert(selection.object_id.as_str()) {
                return Err(TallyError::invalid_argument(format!(
                    "duplicate selection id {} in contest {}",
                    selection.object_id, object_id
                )));
            }
            if !orders.insert(selection.sequence_order) {
                return Err(TallyError::invalid_argument(format!(
                    "duplicate selection sequence order {} in contest {}",
                    selection.sequence_order, object_id
                )));
            }
        }

        let mut transcript = Transcript::new(domain::MANIFEST);
        transcript
            .append_str("contest")
            .append_str(&object_id)
            .append_u64(sequence_order);
        for selection in &selections {
            transcript
                .append_str(&selection.object_id)
                .append_u64(selection.sequence_order);
        }

        Ok(ContestDescription {
            object_id,
            sequence_order,
            description_hash: transcript.challenge(),
            selections,
        })
    }

    pub fn selection(&self, object_id: &str) -> Option<&SelectionDescription<F>> {
        self.selections.iter().find(|s| s.object_id == object_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest<F: PrimeField> {
    pub election_scope_id: String,
    pub contests: Vec<ContestDescription<F>>,
}

impl<F: PrimeField> Manifest<F> {
    /// # Errors
    /// Returns an error if there are no contests or two contests share an
    /// object id or a sequence order.
    pub fn new(
        election_scope_id: impl Into<String>,
        contests: Vec<ContestDescription<F>>,
    ) -> Result<Self, TallyError> {
        if contests.is_empty() {
            return Err(TallyError::invalid_argument(
                "manifest must contain at least one contest",
            ));
        }
        let mut ids = BTreeSet::new();
        let mut orders = BTreeSet::new();
        for contest in &contests {
            if !ids.insert(contest.object_id.as_str()) {
                return Err(TallyError::invalid_argument(format!(
                    "duplicate contest id {}",
                    contest.object_id
                )));
            }
            if !orders.insert(contest.sequence_order) {
                return Err(TallyError::invalid_argument(format!(
                    "duplicate contest sequence order {}",
                    contest.sequence_order
                )));
            }
        }
        Ok(Manifest {
            election_scope_id: election_scope_id.into(),
            contests,
        })
    }

    pub fn contest(&self, object_id: &str) -> Option<&ContestDescription<F>> {
        self.contests.iter().find(|c| c.object_id == object_id)
    }

    /// Hash binding the manifest into the election context.
    pub fn crypto_hash(&self) -> Result<F, TallyError> {
        let mut transcript = Transcript::new(domain::MANIFEST);
        transcript.append_str(&self.election_scope_id);
        for contest in &self.contests {
            transcript.append(&contest.description_hash)?;
        }
        Ok(transcript.challenge())
    }
}
