//! Zero-knowledge proofs: Schnorr proofs of coefficient ownership and the
//! Chaum-Pedersen proof of correct decryption.
//!
//! A Chaum-Pedersen proof for a selection shows that `dlog_g(K) == dlog_A(M̄)`
//! where `K` is the joint key, `A` the ciphertext pad and `M̄` the combined
//! decryption value. It is assembled from the guardians' individual responses
//! (see [`crate::challenge`]) and checked here with public values only.

use ark_ec::{CurveGroup, PrimeGroup};
use ark_serialize::*;
use ark_std::Zero;

use crate::challenge::compute_decryption_challenge;
use crate::context::ElectionContext;
use crate::elgamal::ElGamalCiphertext;
use crate::error::TallyError;
use crate::hash::{domain, Transcript};
use crate::security::{constant_time_eq, SensitiveScalar};

/// Proof of knowledge of the secret coefficient behind `public_key`.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SchnorrProof<G: CurveGroup> {
    /// `K = g·a`
    pub public_key: G,
    /// `h = g·r`
    pub commitment: G,
    pub challenge: G::ScalarField,
    /// `u = r + c·a`
    pub response: G::ScalarField,
}

fn coefficient_challenge<G: CurveGroup>(
    parameter_hash: &G::ScalarField,
    sequence_order: u64,
    coefficient_index: u64,
    public_key: &G,
    commitment: &G,
) -> Result<G::ScalarField, TallyError> {
    let mut transcript = Transcript::new(domain::COEFFICIENT_PROOF);
    transcript
        .append(parameter_hash)?
        .append_u64(sequence_order)
        .append_u64(coefficient_index)
        .append(public_key)?
        .append(commitment)?;
    Ok(transcript.challenge())
}

impl<G: CurveGroup> SchnorrProof<G> {
    /// Proves knowledge of `secret` for coefficient `coefficient_index` of the
    /// polynomial owned by the guardian at `sequence_order`.
    pub fn prove(
        secret: &SensitiveScalar<G::ScalarField>,
        nonce: &SensitiveScalar<G::ScalarField>,
        parameter_hash: &G::ScalarField,
        sequence_order: u64,
        coefficient_index: u64,
    ) -> Result<Self, TallyError> {
        let g = G::generator();
        let public_key = g * secret.expose_secret();
        let commitment = g * nonce.expose_secret();
        let challenge = coefficient_challenge(
            parameter_hash,
            sequence_order,
            coefficient_index,
            &public_key,
            &commitment,
        )?;
        let response = *nonce.expose_secret() + challenge * secret.expose_secret();
        Ok(SchnorrProof {
            public_key,
            commitment,
            challenge,
            response,
        })
    }

    /// Checks the proof. Never fails; any malformed input yields `false`.
    pub fn is_valid(
        &self,
        parameter_hash: &G::ScalarField,
        sequence_order: u64,
        coefficient_index: u64,
    ) -> bool {
        if self.public_key.is_zero() {
            return false;
        }
        let expected = match coefficient_challenge(
            parameter_hash,
            sequence_order,
            coefficient_index,
            &self.public_key,
            &self.commitment,
        ) {
            Ok(challenge) => challenge,
            Err(_) => return false,
        };
        if expected != self.challenge {
            return false;
        }
        let lhs = G::generator() * self.response;
        let rhs = self.commitment + self.public_key * self.challenge;
        constant_time_eq(&lhs, &rhs)
    }
}

/// The commitment half of a Chaum-Pedersen proof, `(a, b) = (g·u, A·u)`.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChaumPedersenCommitment<G: CurveGroup> {
    pub pad: G,
    pub data: G,
}

impl<G: CurveGroup> ChaumPedersenCommitment<G> {
    pub fn new(pad: G, data: G) -> Self {
        ChaumPedersenCommitment { pad, data }
    }

    pub fn zero() -> Self {
        ChaumPedersenCommitment {
            pad: G::zero(),
            data: G::zero(),
        }
    }

    /// Component-wise group addition.
    pub fn add(&self, other: &Self) -> Self {
        ChaumPedersenCommitment {
            pad: self.pad + other.pad,
            data: self.data + other.data,
        }
    }

    /// Rebuilds the commitment a prover must have used:
    /// `a = g·v + K·c`, `b = A·v + M·c`.
    pub fn recompute(
        ciphertext_pad: &G,
        public_key: &G,
        value: &G,
        challenge: &G::ScalarField,
        response: &G::ScalarField,
    ) -> Self {
        ChaumPedersenCommitment {
            pad: G::generator() * response + *public_key * challenge,
            data: *ciphertext_pad * response + *value * challenge,
        }
    }

    pub fn ct_eq(&self, other: &Self) -> bool {
        // evaluate both halves before combining
        let pad = constant_time_eq(&self.pad, &other.pad);
        let data = constant_time_eq(&self.data, &other.data);
        pad & data
    }
}

/// Published proof that `value` is the correct decryption of a ciphertext
/// under the joint key.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChaumPedersenProof<G: CurveGroup> {
    pub commitment: ChaumPedersenCommitment<G>,
    pub challenge: G::ScalarField,
    pub response: G::ScalarField,
}

impl<G: CurveGroup> ChaumPedersenProof<G> {
    /// Combines guardian responses into one proof: `v = Σ v_i`.
    pub fn assemble<'a, I>(
        commitment: ChaumPedersenCommitment<G>,
        challenge: G::ScalarField,
        responses: I,
    ) -> Self
    where
        I: IntoIterator<Item = &'a G::ScalarField>,
    {
        let response = responses
            .into_iter()
            .fold(G::ScalarField::zero(), |acc, v| acc + v);
        ChaumPedersenProof {
            commitment,
            challenge,
            response,
        }
    }

    /// Verifies the proof with public values only: the challenge must be the
    /// Fiat-Shamir hash of the statement and the commitment must satisfy both
    /// Chaum-Pedersen equations against the joint key.
    pub fn is_valid(
        &self,
        context: &ElectionContext<G>,
        ciphertext: &ElGamalCiphertext<G>,
        value: &G,
    ) -> bool {
        let expected = match compute_decryption_challenge(
            context,
            ciphertext,
            &self.commitment,
            value,
        ) {
            Ok(challenge) => challenge,
            Err(_) => return false,
        };
        if expected != self.challenge {
            return false;
        }
        ChaumPedersenCommitment::recompute(
            &ciphertext.pad,
            &context.joint_public_key,
            value,
            &self.challenge,
            &self.response,
        )
        .ct_eq(&self.commitment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bls12_381::{Fr, G1Projective};
    use ark_std::UniformRand;

    type G = G1Projective;

    #[test]
    fn test_schnorr_proof() {
        let mut rng = ark_std::test_rng();
        let parameter_hash = Fr::rand(&mut rng);
        let secret = SensitiveScalar::new(Fr::rand(&mut rng));
        let nonce = SensitiveScalar::new(Fr::rand(&mut rng));

        let proof = SchnorrProof::<G>::prove(&secret, &nonce, &parameter_hash, 2, 1).unwrap();
        assert!(proof.is_valid(&parameter_hash, 2, 1));

        // bound to the guardian and coefficient position
        assert!(!proof.is_valid(&parameter_hash, 3, 1));
        assert!(!proof.is_valid(&parameter_hash, 2, 0));
        assert!(!proof.is_valid(&Fr::rand(&mut rng), 2, 1));

        let mut forged = proof.clone();
        forged.response += Fr::from(1u64);
        assert!(!forged.is_valid(&parameter_hash, 2, 1));
    }

    #[test]
    fn test_schnorr_rejects_identity_key() {
        let mut rng = ark_std::test_rng();
        let parameter_hash = Fr::rand(&mut rng);
        let proof = SchnorrProof::<G>::prove(
            &SensitiveScalar::zero(),
            &SensitiveScalar::new(Fr::rand(&mut rng)),
            &parameter_hash,
            1,
            0,
        )
        .unwrap();
        assert!(!proof.is_valid(&parameter_hash, 1, 0));
    }

    #[test]
    fn test_commitment_recompute() {
        let mut rng = ark_std::test_rng();
        let secret = Fr::rand(&mut rng);
        let nonce = Fr::rand(&mut rng);
        let challenge = Fr::rand(&mut rng);
        let g = G::generator();
        let pad = g * Fr::rand(&mut rng);

        let commitment = ChaumPedersenCommitment::new(g * nonce, pad * nonce);
        let response = nonce - challenge * secret;
        let recomputed =
            ChaumPedersenCommitment::recompute(&pad, &(g * secret), &(pad * secret), &challenge, &response);
        assert!(recomputed.ct_eq(&commitment));

        let wrong = ChaumPedersenCommitment::recompute(
            &pad,
            &(g * secret),
            &(pad * Fr::rand(&mut rng)),
            &challenge,
            &response,
        );
        assert!(!wrong.ct_eq(&commitment));
    }

    #[test]
    fn test_assemble_sums_responses() {
        let responses = [Fr::from(2u64), Fr::from(5u64), Fr::from(11u64)];
        let proof = ChaumPedersenProof::<G>::assemble(
            ChaumPedersenCommitment::zero(),
            Fr::from(3u64),
            responses.iter(),
        );
        assert_eq!(proof.response, Fr::from(18u64));
        assert_eq!(proof.challenge, Fr::from(3u64));
    }
}
