//! A guardian: one of the `n` trustees holding a share of the election secret.
//!
//! Everything a guardian learns from the others lives in owned maps keyed by
//! guardian id. Its [`GuardianState`] is derived from those maps rather than
//! tracked separately, so it can never disagree with what the guardian holds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use ark_ec::{CurveGroup, PrimeGroup};
use ark_std::{rand::RngCore, UniformRand, Zero};
use tracing::{debug, warn};

use crate::ballot::CiphertextSelection;
use crate::challenge::SelectionChallenge;
use crate::context::{parameter_hash, CeremonyDetails};
use crate::elgamal::{ElGamalCiphertext, HashedElGamalCiphertext};
use crate::error::TallyError;
use crate::hash::{domain, Transcript};
use crate::key_ceremony::{
    backup_seed, ElectionPartialKeyBackup, ElectionPartialKeyChallenge,
    ElectionPartialKeyVerification, ElectionPublicKey,
};
use crate::polynomial::{verify_coordinate, ElectionPolynomial};
use crate::proof::ChaumPedersenCommitment;
use crate::security::SensitiveScalar;

/// Which secret a guardian decrypts with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyShareMode {
    /// Every guardian is present and uses its own secret `a_i0`.
    Direct,
    /// A quorum is present; each uses its reconstructed share `P(i)` and the
    /// results are combined with Lagrange coefficients.
    Threshold,
}

/// Binds commitment nonces to one decryption: the mode, the exact set of
/// present guardians and the object being decrypted.
///
/// Two sessions that differ in any of these never share a nonce. Within one
/// session a guardian answers a selection's challenge at most once, see
/// [`Guardian::create_response`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptionSession {
    pub mode: KeyShareMode,
    fingerprint: [u8; 64],
}

impl DecryptionSession {
    pub fn new<'a, I>(mode: KeyShareMode, object_id: &str, present_guardian_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: BTreeSet<&str> = present_guardian_ids.into_iter().collect();
        let mut transcript = Transcript::new(domain::DECRYPTION_SESSION);
        transcript.append_u64(match mode {
            KeyShareMode::Direct => 0,
            KeyShareMode::Threshold => 1,
        });
        transcript.append_str(object_id);
        transcript.append_u64(present.len() as u64);
        for id in present {
            transcript.append_str(id);
        }
        DecryptionSession {
            mode,
            fingerprint: transcript.finalize_bytes(),
        }
    }

    pub fn fingerprint(&self) -> &[u8] {
        &self.fingerprint
    }

    /// Short printable form for logs.
    pub fn short_id(&self) -> String {
        hex::encode(&self.fingerprint[..8])
    }
}

/// Ceremony progress, derived from the data a guardian holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum GuardianState {
    Created,
    PublicKeysAnnounced,
    BackupsGenerated,
    BackupsReceived,
    Active,
}

pub struct Guardian<G: CurveGroup> {
    id: String,
    sequence_order: u64,
    ceremony_details: CeremonyDetails,
    parameter_hash: G::ScalarField,
    polynomial: ElectionPolynomial<G>,
    commitment_seed: SensitiveScalar<G::ScalarField>,
    guardian_public_keys: BTreeMap<String, ElectionPublicKey<G>>,
    backups_to_share: BTreeMap<String, ElectionPartialKeyBackup<G>>,
    guardian_backups: BTreeMap<String, ElectionPartialKeyBackup<G>>,
    verified_backups: BTreeSet<String>,
    backup_verifications: BTreeMap<String, ElectionPartialKeyVerification>,
    /// Challenge answered per commitment nonce, keyed by the nonce's public inputs
    answered_challenges: Mutex<BTreeMap<[u8; 64], G::ScalarField>>,
}

impl<G: CurveGroup> std::fmt::Debug for Guardian<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guardian")
            .field("id", &self.id)
            .field("sequence_order", &self.sequence_order)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<G: CurveGroup> Guardian<G> {
    /// Creates a guardian with a fresh random polynomial.
    ///
    /// # Errors
    /// Returns an error if `sequence_order` is zero or exceeds the number of
    /// guardians.
    pub fn new<R: RngCore>(
        id: impl Into<String>,
        sequence_order: u64,
        ceremony_details: CeremonyDetails,
        rng: &mut R,
    ) -> Result<Self, TallyError> {
        let secret = loop {
            let candidate = G::ScalarField::rand(rng);
            if !candidate.is_zero() {
                break SensitiveScalar::new(candidate);
            }
        };
        Self::from_secret(id, sequence_order, ceremony_details, secret, rng)
    }

    /// Creates a guardian whose election secret key is `secret`.
    pub fn from_secret<R: RngCore>(
        id: impl Into<String>,
        sequence_order: u64,
        ceremony_details: CeremonyDetails,
        secret: SensitiveScalar<G::ScalarField>,
        rng: &mut R,
    ) -> Result<Self, TallyError> {
        let id = id.into();
        if sequence_order == 0 || sequence_order > ceremony_details.number_of_guardians {
            return Err(TallyError::invalid_argument(format!(
                "sequence order {} of guardian {} outside 1..={}",
                sequence_order, id, ceremony_details.number_of_guardians
            )));
        }
        let parameter_hash = parameter_hash::<G>()?;
        let polynomial = ElectionPolynomial::generate_with_secret(
            sequence_order,
            ceremony_details.quorum,
            &parameter_hash,
            secret,
            rng,
        )?;

        let mut guardian = Guardian {
            id,
            sequence_order,
            ceremony_details,
            parameter_hash,
            polynomial,
            commitment_seed: SensitiveScalar::new(G::ScalarField::rand(rng)),
            guardian_public_keys: BTreeMap::new(),
            backups_to_share: BTreeMap::new(),
            guardian_backups: BTreeMap::new(),
            verified_backups: BTreeSet::new(),
            backup_verifications: BTreeMap::new(),
            answered_challenges: Mutex::new(BTreeMap::new()),
        };
        let own_key = guardian.share_public_key();
        guardian
            .guardian_public_keys
            .insert(guardian.id.clone(), own_key);
        Ok(guardian)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence_order(&self) -> u64 {
        self.sequence_order
    }

    pub fn ceremony_details(&self) -> CeremonyDetails {
        self.ceremony_details
    }

    pub fn state(&self) -> GuardianState {
        if !self.all_guardian_keys_received() {
            GuardianState::Created
        } else if self.backups_to_share.is_empty() {
            GuardianState::PublicKeysAnnounced
        } else if !self.all_election_partial_key_backups_received() {
            GuardianState::BackupsGenerated
        } else if !self.all_received_backups_verified() {
            GuardianState::BackupsReceived
        } else {
            GuardianState::Active
        }
    }

    pub fn share_public_key(&self) -> ElectionPublicKey<G> {
        ElectionPublicKey {
            owner_id: self.id.clone(),
            sequence_order: self.sequence_order,
            key: self.polynomial.commitments()[0],
            coefficient_commitments: self.polynomial.commitments(),
            coefficient_proofs: self.polynomial.proofs(),
        }
    }

    /// Stores another guardian's public key after validating it.
    ///
    /// Saving an identical key twice is a no-op.
    ///
    /// # Errors
    /// `InvalidArgument` if the key is malformed, claims this guardian's id or
    /// reuses another guardian's sequence order; `InvalidOperation` if a
    /// different key was already saved for the same owner.
    pub fn save_guardian_key(&mut self, key: ElectionPublicKey<G>) -> Result<(), TallyError> {
        key.validate(&self.parameter_hash, self.ceremony_details.quorum)?;
        if key.sequence_order > self.ceremony_details.number_of_guardians {
            return Err(TallyError::invalid_argument(format!(
                "guardian {} has sequence order {} beyond {} guardians",
                key.owner_id, key.sequence_order, self.ceremony_details.number_of_guardians
            )));
        }
        if let Some(existing) = self.guardian_public_keys.get(&key.owner_id) {
            if *existing == key {
                return Ok(());
            }
            if key.owner_id == self.id {
                return Err(TallyError::invalid_argument(format!(
                    "key for {} does not match this guardian's own key",
                    key.owner_id
                )));
            }
            return Err(TallyError::invalid_operation(format!(
                "a different key for guardian {} is already saved",
                key.owner_id
            )));
        }
        if let Some(other) = self
            .guardian_public_keys
            .values()
            .find(|k| k.sequence_order == key.sequence_order)
        {
            return Err(TallyError::invalid_argument(format!(
                "guardian {} reuses sequence order {} of guardian {}",
                key.owner_id, key.sequence_order, other.owner_id
            )));
        }
        debug!("{}: saved public key of {}", self.id, key.owner_id);
        self.guardian_public_keys.insert(key.owner_id.clone(), key);
        Ok(())
    }

    pub fn guardian_public_key(&self, owner_id: &str) -> Option<&ElectionPublicKey<G>> {
        self.guardian_public_keys.get(owner_id)
    }

    pub fn all_guardian_keys_received(&self) -> bool {
        self.guardian_public_keys.len() as u64 == self.ceremony_details.number_of_guardians
    }

    /// Encrypts `P_self(ℓ)` for every known guardian `ℓ`, including itself.
    ///
    /// # Errors
    /// `InvalidOperation` until every guardian's public key is saved.
    pub fn generate_election_partial_key_backups<R: RngCore>(
        &mut self,
        rng: &mut R,
    ) -> Result<(), TallyError> {
        if !self.all_guardian_keys_received() {
            return Err(TallyError::invalid_operation(format!(
                "{} has {} of {} public keys; cannot generate backups",
                self.id,
                self.guardian_public_keys.len(),
                self.ceremony_details.number_of_guardians
            )));
        }

        let mut backups = BTreeMap::new();
        for key in self.guardian_public_keys.values() {
            let coordinate = self.polynomial.compute_coordinate(key.sequence_order);
            let nonce = loop {
                let candidate = G::ScalarField::rand(rng);
                if !candidate.is_zero() {
                    break SensitiveScalar::new(candidate);
                }
            };
            let seed = backup_seed(&key.owner_id, key.sequence_order);
            let encrypted_coordinate = HashedElGamalCiphertext::encrypt(
                coordinate.expose_secret(),
                nonce.expose_secret(),
                &key.key,
                &seed,
            )?;
            backups.insert(
                key.owner_id.clone(),
                ElectionPartialKeyBackup {
                    owner_id: self.id.clone(),
                    designated_id: key.owner_id.clone(),
                    designated_sequence_order: key.sequence_order,
                    encrypted_coordinate,
                },
            );
        }

        if let Some(own) = backups.get(&self.id) {
            self.guardian_backups.insert(self.id.clone(), own.clone());
            self.verified_backups.remove(&self.id);
        }
        self.backups_to_share = backups;
        debug!("{}: generated {} backups", self.id, self.backups_to_share.len());
        Ok(())
    }

    pub fn share_election_partial_key_backup(
        &self,
        designated_id: &str,
    ) -> Option<&ElectionPartialKeyBackup<G>> {
        self.backups_to_share.get(designated_id)
    }

    pub fn share_election_partial_key_backups(&self) -> Vec<ElectionPartialKeyBackup<G>> {
        self.backups_to_share.values().cloned().collect()
    }

    /// Stores a backup addressed to this guardian.
    ///
    /// # Errors
    /// `InvalidArgument` if the backup is addressed to someone else or to the
    /// wrong sequence order; `KeyNotFound` if its owner's key is unknown.
    pub fn save_election_partial_key_backup(
        &mut self,
        backup: ElectionPartialKeyBackup<G>,
    ) -> Result<(), TallyError> {
        if backup.designated_id != self.id {
            return Err(TallyError::invalid_argument(format!(
                "backup from {} is addressed to {}, not {}",
                backup.owner_id, backup.designated_id, self.id
            )));
        }
        if backup.designated_sequence_order != self.sequence_order {
            return Err(TallyError::invalid_argument(format!(
                "backup from {} targets sequence order {}, expected {}",
                backup.owner_id, backup.designated_sequence_order, self.sequence_order
            )));
        }
        if !self.guardian_public_keys.contains_key(&backup.owner_id) {
            return Err(TallyError::key_not_found(format!(
                "no public key for backup owner {}",
                backup.owner_id
            )));
        }
        self.verified_backups.remove(&backup.owner_id);
        self.guardian_backups.insert(backup.owner_id.clone(), backup);
        Ok(())
    }

    pub fn all_election_partial_key_backups_received(&self) -> bool {
        self.guardian_backups.len() as u64 == self.ceremony_details.number_of_guardians
    }

    /// Decrypts the backup from `owner_id` and checks it against the owner's
    /// commitments. A backup that cannot be decrypted is reported as
    /// unverified, not as an error.
    ///
    /// # Errors
    /// `KeyNotFound` if no backup or public key from `owner_id` is held.
    pub fn verify_election_partial_key_backup(
        &mut self,
        owner_id: &str,
    ) -> Result<ElectionPartialKeyVerification, TallyError> {
        let backup = self
            .guardian_backups
            .get(owner_id)
            .ok_or_else(|| TallyError::key_not_found(format!("no backup from {}", owner_id)))?;
        let owner_key = self
            .guardian_public_keys
            .get(owner_id)
            .ok_or_else(|| TallyError::key_not_found(format!("no public key for {}", owner_id)))?;

        let verified = match self.decrypt_backup(backup) {
            Some(coordinate) => verify_coordinate(
                self.sequence_order,
                coordinate.expose_secret(),
                &owner_key.coefficient_commitments,
            ),
            None => false,
        };
        if verified {
            self.verified_backups.insert(owner_id.to_string());
        } else {
            warn!("{}: backup from {} failed verification", self.id, owner_id);
            self.verified_backups.remove(owner_id);
        }

        Ok(ElectionPartialKeyVerification {
            owner_id: owner_id.to_string(),
            designated_id: self.id.clone(),
            verifier_id: self.id.clone(),
            verified,
        })
    }

    fn all_received_backups_verified(&self) -> bool {
        self.guardian_backups
            .keys()
            .filter(|owner| **owner != self.id)
            .all(|owner| self.verified_backups.contains(owner))
    }

    /// Records another guardian's verdict on a backup this guardian sent.
    ///
    /// # Errors
    /// `InvalidArgument` if the verification concerns someone else's backup;
    /// `KeyNotFound` if no backup was generated for the designated guardian.
    pub fn save_election_partial_key_verification(
        &mut self,
        verification: ElectionPartialKeyVerification,
    ) -> Result<(), TallyError> {
        if verification.owner_id != self.id {
            return Err(TallyError::invalid_argument(format!(
                "verification of {}'s backup sent to {}",
                verification.owner_id, self.id
            )));
        }
        if !self.backups_to_share.contains_key(&verification.designated_id) {
            return Err(TallyError::key_not_found(format!(
                "no backup generated for {}",
                verification.designated_id
            )));
        }
        self.backup_verifications
            .insert(verification.designated_id.clone(), verification);
        Ok(())
    }

    /// True once every other guardian has confirmed the backup sent to it.
    pub fn all_election_partial_key_backups_verified(&self) -> bool {
        let expected = self.ceremony_details.number_of_guardians.saturating_sub(1);
        let confirmed = self
            .backup_verifications
            .values()
            .filter(|v| v.designated_id != self.id && v.verified)
            .count() as u64;
        confirmed == expected
    }

    /// Publishes the coordinate behind the backup sent to `designated_id` in
    /// the clear so a dispute can be settled by anyone.
    ///
    /// # Errors
    /// `KeyNotFound` if no backup was generated for `designated_id`.
    pub fn publish_election_backup_challenge(
        &self,
        designated_id: &str,
    ) -> Result<ElectionPartialKeyChallenge<G>, TallyError> {
        let backup = self.backups_to_share.get(designated_id).ok_or_else(|| {
            TallyError::key_not_found(format!("no backup generated for {}", designated_id))
        })?;
        let coordinate = self
            .polynomial
            .compute_coordinate(backup.designated_sequence_order);
        Ok(ElectionPartialKeyChallenge {
            owner_id: self.id.clone(),
            designated_id: designated_id.to_string(),
            designated_sequence_order: backup.designated_sequence_order,
            value: *coordinate.expose_secret(),
            coefficient_commitments: self.polynomial.commitments(),
            coefficient_proofs: self.polynomial.proofs(),
        })
    }

    fn decrypt_backup(
        &self,
        backup: &ElectionPartialKeyBackup<G>,
    ) -> Option<SensitiveScalar<G::ScalarField>> {
        let seed = backup_seed(&self.id, self.sequence_order);
        backup
            .encrypted_coordinate
            .decrypt(self.polynomial.secret().expose_secret(), &seed)
            .map(SensitiveScalar::new)
    }

    /// The secret this guardian decrypts with in `mode`.
    ///
    /// In threshold mode this is `P(i) = Σ_j P_j(i)`, summed over the decrypted
    /// backups of every guardian including this one.
    ///
    /// # Errors
    /// `InvalidOperation` if the ceremony is incomplete or a backup cannot be
    /// decrypted.
    pub fn partial_secret(
        &self,
        mode: KeyShareMode,
    ) -> Result<SensitiveScalar<G::ScalarField>, TallyError> {
        if !self.all_guardian_keys_received() {
            return Err(TallyError::invalid_operation(format!(
                "{} has not received every public key",
                self.id
            )));
        }
        match mode {
            KeyShareMode::Direct => Ok(self.polynomial.secret().clone()),
            KeyShareMode::Threshold => {
                if !self.all_election_partial_key_backups_received() {
                    return Err(TallyError::invalid_operation(format!(
                        "{} holds {} of {} backups",
                        self.id,
                        self.guardian_backups.len(),
                        self.ceremony_details.number_of_guardians
                    )));
                }
                let mut share = SensitiveScalar::zero();
                for backup in self.guardian_backups.values() {
                    let coordinate = self.decrypt_backup(backup).ok_or_else(|| {
                        TallyError::invalid_operation(format!(
                            "{} cannot decrypt the backup from {}",
                            self.id, backup.owner_id
                        ))
                    })?;
                    share.add_assign(coordinate.expose_secret());
                }
                Ok(share)
            }
        }
    }

    /// `M_i = A·s_i` for the secret selected by the session's mode.
    pub fn partial_decrypt(
        &self,
        ciphertext: &ElGamalCiphertext<G>,
        session: &DecryptionSession,
    ) -> Result<G, TallyError> {
        let secret = self.partial_secret(session.mode)?;
        Ok(ciphertext.partial_decrypt(secret.expose_secret()))
    }

    /// Deterministic commitment nonce for one selection in one session.
    pub(crate) fn commitment_nonce(
        &self,
        object_id: &str,
        sequence_order: u64,
        description_hash: &G::ScalarField,
        ciphertext: &ElGamalCiphertext<G>,
        session: &DecryptionSession,
    ) -> Result<SensitiveScalar<G::ScalarField>, TallyError> {
        let mut transcript = Transcript::new(domain::COMMITMENT_NONCE);
        transcript
            .append(self.commitment_seed.expose_secret())?
            .append_bytes(session.fingerprint())
            .append_str(&self.id)
            .append_str(object_id)
            .append_u64(sequence_order)
            .append(description_hash)?
            .append(&ciphertext.pad)?
            .append(&ciphertext.data)?;
        Ok(SensitiveScalar::new(transcript.challenge()))
    }

    /// `(a, b) = (g·u, A·u)` for the selection's commitment nonce `u`.
    pub fn create_commitment(
        &self,
        selection: &CiphertextSelection<G>,
        session: &DecryptionSession,
    ) -> Result<ChaumPedersenCommitment<G>, TallyError> {
        let nonce = self.commitment_nonce(
            &selection.object_id,
            selection.sequence_order,
            &selection.description_hash,
            &selection.ciphertext,
            session,
        )?;
        Ok(ChaumPedersenCommitment::new(
            G::generator() * nonce.expose_secret(),
            selection.ciphertext.pad * nonce.expose_secret(),
        ))
    }

    /// `v_i = u_i − c_i·s_i`.
    ///
    /// A commitment nonce answers one challenge only. Asking again with the
    /// same challenge returns the same response.
    ///
    /// # Errors
    /// `InvalidArgument` if the challenge is scoped to another guardian;
    /// `InvalidOperation` if the nonce already answered a different challenge.
    pub fn create_response(
        &self,
        challenge: &SelectionChallenge<G>,
        session: &DecryptionSession,
    ) -> Result<G::ScalarField, TallyError> {
        let secret = self.partial_secret(session.mode)?;
        self.create_response_with(challenge, &secret, session)
    }

    pub(crate) fn create_response_with(
        &self,
        challenge: &SelectionChallenge<G>,
        secret: &SensitiveScalar<G::ScalarField>,
        session: &DecryptionSession,
    ) -> Result<G::ScalarField, TallyError> {
        if challenge.guardian_id != self.id {
            return Err(TallyError::invalid_argument(format!(
                "challenge for {} sent to {}",
                challenge.guardian_id, self.id
            )));
        }
        self.record_challenge(challenge, session)?;
        let nonce = self.commitment_nonce(
            &challenge.object_id,
            challenge.sequence_order,
            &challenge.description_hash,
            &challenge.ciphertext,
            session,
        )?;
        Ok(*nonce.expose_secret() - challenge.challenge * secret.expose_secret())
    }

    fn record_challenge(
        &self,
        challenge: &SelectionChallenge<G>,
        session: &DecryptionSession,
    ) -> Result<(), TallyError> {
        let mut transcript = Transcript::new(domain::ANSWERED_CHALLENGE);
        transcript
            .append_bytes(session.fingerprint())
            .append_str(&challenge.object_id)
            .append_u64(challenge.sequence_order)
            .append(&challenge.description_hash)?
            .append(&challenge.ciphertext.pad)?
            .append(&challenge.ciphertext.data)?;
        let key = transcript.finalize_bytes();

        let mut answered = self
            .answered_challenges
            .lock()
            .map_err(|_| TallyError::invalid_operation("answered challenge record poisoned"))?;
        match answered.get(&key) {
            Some(previous) if *previous != challenge.challenge => {
                warn!(
                    "guardian {} refused a second challenge for {} in session {}",
                    self.id,
                    challenge.object_id,
                    session.short_id()
                );
                Err(TallyError::invalid_operation(format!(
                    "guardian {} already answered a different challenge for {}",
                    self.id, challenge.object_id
                )))
            }
            Some(_) => Ok(()),
            None => {
                answered.insert(key, challenge.challenge);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::elgamal_encrypt;
    use crate::key_ceremony::perform_key_ceremony;
    use crate::test_utils::create_guardians;
    use ark_bls12_381::{Fr, G1Projective};
    use ark_ff::Field;

    type G = G1Projective;

    fn session(mode: KeyShareMode, guardians: &[Guardian<G>]) -> DecryptionSession {
        DecryptionSession::new(mode, "tally", guardians.iter().map(|g| g.id()))
    }

    #[test]
    fn test_state_progression() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(2, 2).unwrap();
        let mut guardians = create_guardians::<G>(details, &mut rng);
        assert_eq!(guardians[0].state(), GuardianState::Created);

        let key_0 = guardians[0].share_public_key();
        let key_1 = guardians[1].share_public_key();
        guardians[0].save_guardian_key(key_1).unwrap();
        guardians[1].save_guardian_key(key_0).unwrap();
        assert_eq!(guardians[0].state(), GuardianState::PublicKeysAnnounced);

        guardians[0].generate_election_partial_key_backups(&mut rng).unwrap();
        guardians[1].generate_election_partial_key_backups(&mut rng).unwrap();
        assert_eq!(guardians[0].state(), GuardianState::BackupsGenerated);

        let backup = guardians[1]
            .share_election_partial_key_backup("guardian-1")
            .unwrap()
            .clone();
        guardians[0].save_election_partial_key_backup(backup).unwrap();
        assert_eq!(guardians[0].state(), GuardianState::BackupsReceived);

        assert!(guardians[0]
            .verify_election_partial_key_backup("guardian-2")
            .unwrap()
            .verified);
        assert_eq!(guardians[0].state(), GuardianState::Active);
    }

    #[test]
    fn test_backups_require_all_keys() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(3, 2).unwrap();
        let mut guardians = create_guardians::<G>(details, &mut rng);
        assert!(matches!(
            guardians[0].generate_election_partial_key_backups(&mut rng),
            Err(TallyError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_save_guardian_key_rejections() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(3, 2).unwrap();
        let mut guardians = create_guardians::<G>(details, &mut rng);
        let key_1 = guardians[1].share_public_key();

        guardians[0].save_guardian_key(key_1.clone()).unwrap();
        // idempotent
        guardians[0].save_guardian_key(key_1.clone()).unwrap();

        let mut clash = guardians[2].share_public_key();
        clash.owner_id = "guardian-2".to_string();
        assert!(guardians[0].save_guardian_key(clash).is_err());

        let mut identity = guardians[2].share_public_key();
        identity.key = G::zero();
        assert!(matches!(
            guardians[0].save_guardian_key(identity),
            Err(TallyError::InvalidArgument(_))
        ));

        let mut short = guardians[2].share_public_key();
        short.coefficient_commitments.pop();
        assert!(matches!(
            guardians[0].save_guardian_key(short),
            Err(TallyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_save_backup_checks_recipient() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(3, 2).unwrap();
        let mut guardians = create_guardians::<G>(details, &mut rng);
        let keys: Vec<_> = guardians.iter().map(|g| g.share_public_key()).collect();
        for guardian in guardians.iter_mut() {
            for key in &keys {
                guardian.save_guardian_key(key.clone()).unwrap();
            }
        }
        guardians[0].generate_election_partial_key_backups(&mut rng).unwrap();

        let to_2 = guardians[0]
            .share_election_partial_key_backup("guardian-2")
            .unwrap()
            .clone();
        assert!(matches!(
            guardians[2].save_election_partial_key_backup(to_2.clone()),
            Err(TallyError::InvalidArgument(_))
        ));

        let mut wrong_order = to_2;
        wrong_order.designated_sequence_order = 3;
        assert!(matches!(
            guardians[1].save_election_partial_key_backup(wrong_order),
            Err(TallyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_corrupted_backup_is_unverified() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(3, 2).unwrap();
        let mut guardians = create_guardians::<G>(details, &mut rng);
        let keys: Vec<_> = guardians.iter().map(|g| g.share_public_key()).collect();
        for guardian in guardians.iter_mut() {
            for key in &keys {
                guardian.save_guardian_key(key.clone()).unwrap();
            }
        }
        guardians[0].generate_election_partial_key_backups(&mut rng).unwrap();

        let mut backup = guardians[0]
            .share_election_partial_key_backup("guardian-2")
            .unwrap()
            .clone();
        backup.encrypted_coordinate.data[0] ^= 0x01;
        guardians[1].save_election_partial_key_backup(backup).unwrap();

        let verification = guardians[1]
            .verify_election_partial_key_backup("guardian-1")
            .unwrap();
        assert!(!verification.verified);
        assert!(guardians[1].partial_secret(KeyShareMode::Threshold).is_err());
    }

    #[test]
    fn test_threshold_shares_reconstruct_joint_secret() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(3, 2).unwrap();
        let secrets = [Fr::from(11u64), Fr::from(22u64), Fr::from(33u64)];
        let mut guardians: Vec<Guardian<G>> = secrets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Guardian::from_secret(
                    format!("guardian-{}", i + 1),
                    i as u64 + 1,
                    details,
                    SensitiveScalar::new(*s),
                    &mut rng,
                )
                .unwrap()
            })
            .collect();
        perform_key_ceremony(&mut guardians, &mut rng).unwrap();

        // guardians 1 and 3: w1 = 3/(3-1), w3 = 1/(1-3)
        let s1 = guardians[0].partial_secret(KeyShareMode::Threshold).unwrap();
        let s3 = guardians[2].partial_secret(KeyShareMode::Threshold).unwrap();
        let two_inv = Fr::from(2u64).inverse().unwrap();
        let w1 = Fr::from(3u64) * two_inv;
        let w3 = -two_inv;
        let joint = w1 * s1.expose_secret() + w3 * s3.expose_secret();
        assert_eq!(joint, Fr::from(66u64));
    }

    #[test]
    fn test_partial_decrypt_direct() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(2, 2).unwrap();
        let mut guardians = create_guardians::<G>(details, &mut rng);
        let joint_key = perform_key_ceremony(&mut guardians, &mut rng).unwrap();

        let ciphertext =
            elgamal_encrypt(5, &Fr::from(77u64), &joint_key.joint_public_key).unwrap();
        let session = session(KeyShareMode::Direct, &guardians);
        let combined = guardians
            .iter()
            .map(|g| g.partial_decrypt(&ciphertext, &session).unwrap())
            .fold(G::zero(), |acc, m| acc + m);
        assert_eq!(
            ciphertext.decrypt_with(&combined),
            G::generator() * Fr::from(5u64)
        );
    }

    #[test]
    fn test_commitment_depends_on_session() {
        let mut rng = ark_std::test_rng();
        let details = CeremonyDetails::new(3, 2).unwrap();
        let mut guardians = create_guardians::<G>(details, &mut rng);
        let joint_key = perform_key_ceremony(&mut guardians, &mut rng).unwrap();

        let selection = CiphertextSelection {
            object_id: "alice".to_string(),
            sequence_order: 1,
            description_hash: Fr::from(5u64),
            ciphertext: elgamal_encrypt(1, &Fr::from(9u64), &joint_key.joint_public_key)
                .unwrap(),
        };
        let all = session(KeyShareMode::Threshold, &guardians);
        let pair = DecryptionSession::new(
            KeyShareMode::Threshold,
            "tally",
            ["guardian-1", "guardian-2"],
        );
        let again = DecryptionSession::new(
            KeyShareMode::Threshold,
            "tally",
            ["guardian-2", "guardian-1"],
        );
        assert_eq!(pair, again);

        let a = guardians[0].create_commitment(&selection, &all).unwrap();
        let b = guardians[0].create_commitment(&selection, &pair).unwrap();
        let c = guardians[0].create_commitment(&selection, &again).unwrap();
        assert_ne!(a, b);
        assert_eq!(b, c);
    }
}
