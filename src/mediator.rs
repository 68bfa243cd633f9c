//! Orchestrates a decryption across the present guardians.
//!
//! For every tally or spoiled ballot the mediator collects one share per
//! present guardian, accumulates them, hands out scoped challenges, checks the
//! responses and finally assembles the proofs and decodes the counts. It never
//! sees a guardian secret.

use std::collections::{BTreeMap, BTreeSet};

use ark_ec::CurveGroup;
use ark_std::{end_timer, start_timer, One};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::accumulation::{accumulate_shares, AccumulatedDecryption};
use crate::ballot::{CiphertextBallot, CiphertextContainer, CiphertextContest, CiphertextTally};
use crate::challenge::{
    compute_challenge_response, compute_commitment_offset, verify_decryption_response,
    ContestChallenge, DecryptionChallenge, DecryptionChallengeResponse, SelectionChallenge,
};
use crate::context::{parameter_hash, CeremonyDetails, ElectionContext};
use crate::decryption_share::{compute_decryption_share, DecryptionShare};
use crate::elgamal::DiscreteLogTable;
use crate::error::TallyError;
use crate::guardian::{DecryptionSession, Guardian, KeyShareMode};
use crate::key_ceremony::{combine_election_public_keys, ElectionPublicKey};
use crate::lagrange::{compute_lagrange_coefficients, LagrangeCoefficient};
use crate::plaintext::{PlaintextTally, PlaintextTallyContest, PlaintextTallySelection};

/// Largest count the mediator searches for when decoding `g·m`.
pub const DEFAULT_DECODE_BOUND: u64 = 1_000_000;

enum Target<G: CurveGroup> {
    Tally(CiphertextTally<G>),
    Ballot(CiphertextBallot<G>),
}

impl<G: CurveGroup> CiphertextContainer<G> for Target<G> {
    fn object_id(&self) -> &str {
        match self {
            Target::Tally(tally) => tally.object_id(),
            Target::Ballot(ballot) => ballot.object_id(),
        }
    }

    fn contests(&self) -> &BTreeMap<String, CiphertextContest<G>> {
        match self {
            Target::Tally(tally) => tally.contests(),
            Target::Ballot(ballot) => ballot.contests(),
        }
    }
}

struct Decryption<G: CurveGroup> {
    target: Target<G>,
    shares: BTreeMap<String, DecryptionShare<G>>,
    accumulated: Option<AccumulatedDecryption<G>>,
    challenges: BTreeMap<String, DecryptionChallenge<G>>,
    responses: BTreeMap<String, DecryptionChallengeResponse<G::ScalarField>>,
    invalid: Option<BTreeSet<String>>,
}

impl<G: CurveGroup> Decryption<G> {
    fn new(target: Target<G>) -> Self {
        Decryption {
            target,
            shares: BTreeMap::new(),
            accumulated: None,
            challenges: BTreeMap::new(),
            responses: BTreeMap::new(),
            invalid: None,
        }
    }
}

pub struct DecryptionMediator<G: CurveGroup> {
    id: String,
    context: ElectionContext<G>,
    guardian_keys: Vec<ElectionPublicKey<G>>,
    present: Vec<String>,
    mode: KeyShareMode,
    coefficients: Vec<LagrangeCoefficient<G::ScalarField>>,
    offsets: BTreeMap<String, G>,
    decryptions: BTreeMap<String, Decryption<G>>,
    discrete_log: DiscreteLogTable<G>,
    decode_bound: u64,
}

impl<G: CurveGroup> DecryptionMediator<G> {
    /// Sets up a mediator for the guardians in `present_guardian_ids`.
    ///
    /// With every guardian present the decryption runs in
    /// [`KeyShareMode::Direct`]; with a smaller quorum it runs in
    /// [`KeyShareMode::Threshold`].
    ///
    /// # Errors
    /// `InvalidArgument` if the keys are malformed, do not reproduce the
    /// context's joint key, or fewer than a quorum of guardians is present;
    /// `KeyNotFound` for a present id without a key.
    pub fn new<I, S>(
        id: impl Into<String>,
        context: ElectionContext<G>,
        mut guardian_keys: Vec<ElectionPublicKey<G>>,
        present_guardian_ids: I,
    ) -> Result<Self, TallyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = id.into();
        CeremonyDetails::new(context.number_of_guardians, context.quorum)?;
        if guardian_keys.len() as u64 != context.number_of_guardians {
            return Err(TallyError::invalid_argument(format!(
                "{} guardian keys for an election with {} guardians",
                guardian_keys.len(),
                context.number_of_guardians
            )));
        }
        let parameter_hash = parameter_hash::<G>()?;
        for key in &guardian_keys {
            key.validate(&parameter_hash, context.quorum)?;
        }
        let joint_key = combine_election_public_keys(&guardian_keys)?;
        if joint_key.joint_public_key != context.joint_public_key
            || joint_key.commitment_hash != context.commitment_hash
        {
            return Err(TallyError::invalid_argument(
                "guardian keys do not match the election context",
            ));
        }
        guardian_keys.sort_by_key(|key| key.sequence_order);

        let mut present = BTreeSet::new();
        for guardian_id in present_guardian_ids {
            let guardian_id = guardian_id.as_ref();
            if !guardian_keys.iter().any(|k| k.owner_id == guardian_id) {
                return Err(TallyError::key_not_found(format!(
                    "no key for present guardian {}",
                    guardian_id
                )));
            }
            if !present.insert(guardian_id.to_string()) {
                return Err(TallyError::invalid_argument(format!(
                    "guardian {} listed twice",
                    guardian_id
                )));
            }
        }
        if (present.len() as u64) < context.quorum {
            return Err(TallyError::invalid_argument(format!(
                "{} guardians present, quorum is {}",
                present.len(),
                context.quorum
            )));
        }

        let present_keys: Vec<ElectionPublicKey<G>> = guardian_keys
            .iter()
            .filter(|k| present.contains(&k.owner_id))
            .cloned()
            .collect();
        let mode = if present.len() == guardian_keys.len() {
            KeyShareMode::Direct
        } else {
            KeyShareMode::Threshold
        };
        let coefficients = match mode {
            KeyShareMode::Direct => present_keys
                .iter()
                .map(|k| LagrangeCoefficient {
                    guardian_id: k.owner_id.clone(),
                    sequence_order: k.sequence_order,
                    coefficient: G::ScalarField::one(),
                })
                .collect(),
            KeyShareMode::Threshold => compute_lagrange_coefficients(&present_keys)?,
        };
        let offsets = present_keys
            .iter()
            .map(|k| {
                compute_commitment_offset(&guardian_keys, k.sequence_order, mode)
                    .map(|offset| (k.owner_id.clone(), offset))
            })
            .collect::<Result<BTreeMap<_, _>, TallyError>>()?;

        info!(
            "mediator {}: {} of {} guardians present ({:?})",
            id,
            present.len(),
            guardian_keys.len(),
            mode
        );
        Ok(DecryptionMediator {
            id,
            context,
            guardian_keys,
            present: present.into_iter().collect(),
            mode,
            coefficients,
            offsets,
            decryptions: BTreeMap::new(),
            discrete_log: DiscreteLogTable::new(),
            decode_bound: DEFAULT_DECODE_BOUND,
        })
    }

    pub fn with_decode_bound(mut self, bound: u64) -> Self {
        self.decode_bound = bound;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> KeyShareMode {
        self.mode
    }

    pub fn present_guardians(&self) -> &[String] {
        &self.present
    }

    pub fn guardian_keys(&self) -> &[ElectionPublicKey<G>] {
        &self.guardian_keys
    }

    pub fn lagrange_coefficients(&self) -> &[LagrangeCoefficient<G::ScalarField>] {
        &self.coefficients
    }

    /// The session every present guardian must use for `object_id`.
    pub fn session(&self, object_id: &str) -> DecryptionSession {
        DecryptionSession::new(self.mode, object_id, self.present.iter().map(String::as_str))
    }

    fn register(&mut self, target: Target<G>) -> Result<(), TallyError> {
        let object_id = target.object_id().to_string();
        if self.decryptions.contains_key(&object_id) {
            return Err(TallyError::invalid_operation(format!(
                "{} already registered with mediator {}",
                object_id, self.id
            )));
        }
        self.decryptions.insert(object_id, Decryption::new(target));
        Ok(())
    }

    pub fn add_tally(&mut self, tally: CiphertextTally<G>) -> Result<(), TallyError> {
        debug!(
            "mediator {}: tally {} with {} cast ballots",
            self.id,
            tally.object_id,
            tally.cast_count()
        );
        self.register(Target::Tally(tally))
    }

    /// Registers a spoiled or challenged ballot for individual decryption.
    ///
    /// # Errors
    /// `InvalidArgument` for a cast ballot.
    pub fn add_ballot(&mut self, ballot: CiphertextBallot<G>) -> Result<(), TallyError> {
        if !ballot.state.is_decrypted_individually() {
            return Err(TallyError::invalid_argument(format!(
                "cast ballot {} is only decrypted as part of a tally",
                ballot.object_id
            )));
        }
        self.register(Target::Ballot(ballot))
    }

    fn decryption(&self, object_id: &str) -> Result<&Decryption<G>, TallyError> {
        self.decryptions
            .get(object_id)
            .ok_or_else(|| TallyError::key_not_found(format!("nothing registered as {}", object_id)))
    }

    fn decryption_mut(&mut self, object_id: &str) -> Result<&mut Decryption<G>, TallyError> {
        self.decryptions
            .get_mut(object_id)
            .ok_or_else(|| TallyError::key_not_found(format!("nothing registered as {}", object_id)))
    }

    fn ensure_present(&self, guardian_id: &str) -> Result<(), TallyError> {
        if self.present.iter().any(|id| id == guardian_id) {
            Ok(())
        } else {
            Err(TallyError::invalid_argument(format!(
                "guardian {} is not present for mediator {}",
                guardian_id, self.id
            )))
        }
    }

    /// # Errors
    /// `InvalidArgument` if the guardian is absent or the share does not fit
    /// the registered object; `InvalidOperation` for a second share from the
    /// same guardian or a share arriving after challenges went out.
    pub fn submit_share(&mut self, share: DecryptionShare<G>) -> Result<(), TallyError> {
        self.ensure_present(&share.guardian_id)?;
        let mediator_id = self.id.clone();
        let decryption = self.decryption_mut(&share.object_id)?;
        if decryption.accumulated.is_some() {
            return Err(TallyError::invalid_operation(format!(
                "challenges for {} already created",
                share.object_id
            )));
        }
        if decryption.shares.contains_key(&share.guardian_id) {
            return Err(TallyError::invalid_operation(format!(
                "guardian {} already submitted a share for {}",
                share.guardian_id, share.object_id
            )));
        }
        if !share.is_valid(&share.guardian_id, &decryption.target) {
            return Err(TallyError::invalid_argument(format!(
                "share of {} does not match {}",
                share.guardian_id, share.object_id
            )));
        }
        debug!(
            "mediator {}: share from {} for {}",
            mediator_id, share.guardian_id, share.object_id
        );
        decryption.shares.insert(share.guardian_id.clone(), share);
        Ok(())
    }

    pub fn submit_shares(&mut self, shares: Vec<DecryptionShare<G>>) -> Result<(), TallyError> {
        for share in shares {
            self.submit_share(share)?;
        }
        Ok(())
    }

    /// Accumulates all shares for `object_id` and scopes the base challenge of
    /// every selection to each present guardian. Calling it again returns the
    /// same challenges.
    ///
    /// # Errors
    /// `InvalidOperation` until every present guardian has submitted a share.
    pub fn create_challenges(
        &mut self,
        object_id: &str,
    ) -> Result<Vec<DecryptionChallenge<G>>, TallyError> {
        let quorum = self.context.quorum;
        let present = self.present.clone();
        let coefficients = self.coefficients.clone();
        let context = self.context.clone();
        let decryption = self.decryption_mut(object_id)?;
        if decryption.accumulated.is_some() {
            return Ok(coefficients
                .iter()
                .filter_map(|c| decryption.challenges.get(&c.guardian_id).cloned())
                .collect());
        }
        if let Some(missing) = present.iter().find(|id| !decryption.shares.contains_key(*id)) {
            return Err(TallyError::invalid_operation(format!(
                "no share from {} for {}",
                missing, object_id
            )));
        }

        let timer = start_timer!(|| format!("Challenges for {}", object_id));
        let shares: Vec<DecryptionShare<G>> = decryption.shares.values().cloned().collect();
        let mut accumulated =
            accumulate_shares(&decryption.target, &shares, &coefficients, quorum)?;
        for (contest_id, contest) in decryption.target.contests() {
            let Some(accumulated_contest) = accumulated.contests.get_mut(contest_id) else {
                continue;
            };
            for (selection_id, selection) in &contest.selections {
                if let Some(accumulated_selection) =
                    accumulated_contest.selections.get_mut(selection_id)
                {
                    accumulated_selection.compute_challenge(&context, &selection.ciphertext)?;
                }
            }
        }

        let target = &decryption.target;
        let challenges: Vec<DecryptionChallenge<G>> = coefficients
            .par_iter()
            .map(|coefficient| scope_challenge(target, &accumulated, coefficient))
            .collect::<Result<Vec<_>, TallyError>>()?;
        end_timer!(timer);

        decryption.challenges = challenges
            .iter()
            .map(|c| (c.guardian_id.clone(), c.clone()))
            .collect();
        decryption.accumulated = Some(accumulated);
        info!("created {} challenges for {}", challenges.len(), object_id);
        Ok(challenges)
    }

    pub fn challenge(&self, object_id: &str, guardian_id: &str) -> Option<&DecryptionChallenge<G>> {
        self.decryptions
            .get(object_id)
            .and_then(|d| d.challenges.get(guardian_id))
    }

    /// # Errors
    /// `InvalidOperation` if no challenge went out to the guardian or it
    /// already responded.
    pub fn submit_response(
        &mut self,
        response: DecryptionChallengeResponse<G::ScalarField>,
    ) -> Result<(), TallyError> {
        self.ensure_present(&response.guardian_id)?;
        let decryption = self.decryption_mut(&response.object_id)?;
        if !decryption.challenges.contains_key(&response.guardian_id) {
            return Err(TallyError::invalid_operation(format!(
                "no challenge issued to {} for {}",
                response.guardian_id, response.object_id
            )));
        }
        if decryption.responses.contains_key(&response.guardian_id) {
            return Err(TallyError::invalid_operation(format!(
                "guardian {} already responded for {}",
                response.guardian_id, response.object_id
            )));
        }
        decryption.invalid = None;
        decryption
            .responses
            .insert(response.guardian_id.clone(), response);
        Ok(())
    }

    /// Checks every response for `object_id` and returns whether all passed.
    /// Failing guardians are available from [`Self::invalid_guardians`].
    ///
    /// # Errors
    /// `InvalidOperation` until every present guardian has responded.
    pub fn validate_responses(&mut self, object_id: &str) -> Result<bool, TallyError> {
        let present = self.present.clone();
        let offsets = self.offsets.clone();
        let decryption = self.decryption_mut(object_id)?;
        if let Some(missing) = present
            .iter()
            .find(|id| !decryption.responses.contains_key(*id))
        {
            return Err(TallyError::invalid_operation(format!(
                "no response from {} for {}",
                missing, object_id
            )));
        }

        let collected = &*decryption;
        let invalid: BTreeSet<String> = present
            .par_iter()
            .filter(|guardian_id| {
                let (Some(challenge), Some(share), Some(response), Some(offset)) = (
                    collected.challenges.get(*guardian_id),
                    collected.shares.get(*guardian_id),
                    collected.responses.get(*guardian_id),
                    offsets.get(*guardian_id),
                ) else {
                    return true;
                };
                !verify_decryption_response(challenge, share, response, offset)
            })
            .cloned()
            .collect();
        for guardian_id in &invalid {
            warn!("response from {} for {} failed verification", guardian_id, object_id);
        }
        let valid = invalid.is_empty();
        decryption.invalid = Some(invalid);
        Ok(valid)
    }

    /// Guardians whose responses failed the last validation of `object_id`.
    pub fn invalid_guardians(&self, object_id: &str) -> Vec<String> {
        self.decryptions
            .get(object_id)
            .and_then(|d| d.invalid.as_ref())
            .map(|invalid| invalid.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Assembles the proofs and decodes every selection of `object_id`.
    ///
    /// # Errors
    /// `InvalidOperation` if responses are missing or invalid, or a count
    /// cannot be decoded within the decode bound.
    pub fn decrypt(&mut self, object_id: &str) -> Result<PlaintextTally<G>, TallyError> {
        let validated = self
            .decryption(object_id)?
            .invalid
            .as_ref()
            .map(|invalid| invalid.is_empty());
        let valid = match validated {
            Some(valid) => valid,
            None => self.validate_responses(object_id)?,
        };
        if !valid {
            return Err(TallyError::invalid_operation(format!(
                "invalid responses for {} from {}",
                object_id,
                self.invalid_guardians(object_id).join(", ")
            )));
        }

        let timer = start_timer!(|| format!("Decrypt {}", object_id));
        let context = self.context.clone();
        let bound = self.decode_bound;
        let Some(decryption) = self.decryptions.get_mut(object_id) else {
            return Err(TallyError::key_not_found(object_id.to_string()));
        };
        let accumulated = decryption.accumulated.as_mut().ok_or_else(|| {
            TallyError::invalid_operation(format!("no challenges created for {}", object_id))
        })?;

        let mut contests = BTreeMap::new();
        for (contest_id, contest) in decryption.target.contests() {
            let accumulated_contest = accumulated
                .contests
                .get_mut(contest_id)
                .ok_or_else(|| TallyError::key_not_found(contest_id.clone()))?;
            let mut selections = BTreeMap::new();
            for (selection_id, selection) in &contest.selections {
                let accumulated_selection = accumulated_contest
                    .selections
                    .get_mut(selection_id)
                    .ok_or_else(|| TallyError::key_not_found(selection_id.clone()))?;
                let responses: Vec<G::ScalarField> = decryption
                    .responses
                    .values()
                    .filter_map(|r| {
                        r.contests
                            .get(contest_id)
                            .and_then(|c| c.selections.get(selection_id))
                            .map(|s| s.response)
                    })
                    .collect();
                let proof = *accumulated_selection.assemble_proof(responses.iter())?;
                let value = accumulated_selection.value;
                let tally = self
                    .discrete_log
                    .lookup(&selection.ciphertext.decrypt_with(&value), bound)
                    .ok_or_else(|| {
                        TallyError::invalid_operation(format!(
                            "count of {}/{} exceeds {}",
                            contest_id, selection_id, bound
                        ))
                    })?;
                let plaintext = PlaintextTallySelection {
                    object_id: selection_id.clone(),
                    tally,
                    value,
                    message: selection.ciphertext,
                    proof,
                };
                if !plaintext.verify(&context) {
                    return Err(TallyError::invalid_operation(format!(
                        "assembled proof for {}/{} does not verify",
                        contest_id, selection_id
                    )));
                }
                selections.insert(selection_id.clone(), plaintext);
            }
            contests.insert(
                contest_id.clone(),
                PlaintextTallyContest {
                    object_id: contest_id.clone(),
                    selections,
                },
            );
        }
        end_timer!(timer);
        info!("mediator {}: decrypted {}", self.id, object_id);
        Ok(PlaintextTally {
            object_id: object_id.to_string(),
            contests,
        })
    }

    /// Runs the whole exchange for `object_id` with in-memory guardians.
    /// Guardians that are not present are ignored.
    ///
    /// # Errors
    /// `KeyNotFound` if a present guardian is missing from `guardians`, plus
    /// any error of the individual steps.
    pub fn decrypt_with_guardians(
        &mut self,
        guardians: &[Guardian<G>],
        object_id: &str,
    ) -> Result<PlaintextTally<G>, TallyError> {
        let session = self.session(object_id);
        let present: Vec<&Guardian<G>> = self
            .present
            .iter()
            .map(|id| {
                guardians
                    .iter()
                    .find(|g| g.id() == id)
                    .ok_or_else(|| TallyError::key_not_found(format!("guardian {} not supplied", id)))
            })
            .collect::<Result<_, _>>()?;

        let shares = {
            let target = &self.decryption(object_id)?.target;
            present
                .par_iter()
                .map(|guardian| compute_decryption_share(guardian, target, &session))
                .collect::<Result<Vec<_>, TallyError>>()?
        };
        self.submit_shares(shares)?;

        for challenge in self.create_challenges(object_id)? {
            let guardian = present
                .iter()
                .find(|g| g.id() == challenge.guardian_id)
                .ok_or_else(|| TallyError::key_not_found(challenge.guardian_id.clone()))?;
            self.submit_response(compute_challenge_response(guardian, &challenge, &session)?)?;
        }
        self.decrypt(object_id)
    }
}

fn scope_challenge<G: CurveGroup>(
    target: &Target<G>,
    accumulated: &AccumulatedDecryption<G>,
    coefficient: &LagrangeCoefficient<G::ScalarField>,
) -> Result<DecryptionChallenge<G>, TallyError> {
    let mut contests = BTreeMap::new();
    for (contest_id, contest) in target.contests() {
        let accumulated_contest = accumulated
            .contests
            .get(contest_id)
            .ok_or_else(|| TallyError::key_not_found(contest_id.clone()))?;
        let mut selections = BTreeMap::new();
        for (selection_id, selection) in &contest.selections {
            let challenge = accumulated_contest
                .selections
                .get(selection_id)
                .and_then(|s| s.challenge)
                .ok_or_else(|| {
                    TallyError::invalid_operation(format!("no challenge for {}", selection_id))
                })?;
            selections.insert(
                selection_id.clone(),
                SelectionChallenge {
                    guardian_id: coefficient.guardian_id.clone(),
                    object_id: selection.object_id.clone(),
                    sequence_order: selection.sequence_order,
                    description_hash: selection.description_hash,
                    ciphertext: selection.ciphertext,
                    coefficient: coefficient.coefficient,
                    challenge: challenge * coefficient.coefficient,
                },
            );
        }
        contests.insert(
            contest_id.clone(),
            ContestChallenge {
                guardian_id: coefficient.guardian_id.clone(),
                object_id: contest.object_id.clone(),
                selections,
            },
        );
    }
    Ok(DecryptionChallenge {
        guardian_id: coefficient.guardian_id.clone(),
        object_id: target.object_id().to_string(),
        contests,
    })
}
