//! Secret polynomials for the key ceremony (Shamir secret sharing with
//! Feldman commitments).
//!
//! A guardian at sequence order `i` owns
//!
//! ```text
//! P_i(x) = a_i0 + a_i1·x + ... + a_i(k-1)·x^(k-1)      (k = quorum)
//! ```
//!
//! and publishes `K_ij = g·a_ij` for every coefficient together with a Schnorr
//! proof of knowledge of `a_ij`. `a_i0` is the guardian's election secret key.
//! Coordinates `P_i(ℓ)` are handed to guardian `ℓ` and can be checked against
//! the commitments without learning the coefficients:
//!
//! ```text
//! g·P_i(ℓ) == Σ_j K_ij·ℓ^j
//! ```

use ark_ec::{CurveGroup, PrimeGroup};
use ark_ff::Field;
use ark_poly::{univariate::DensePolynomial, DenseUVPolynomial, Polynomial};
use ark_std::{rand::RngCore, One, UniformRand, Zero};
use zeroize::Zeroize;

use crate::error::TallyError;
use crate::proof::SchnorrProof;
use crate::security::{constant_time_eq, SensitiveScalar};

/// One secret coefficient with its public commitment and ownership proof.
#[derive(Clone, Debug)]
pub struct Coefficient<G: CurveGroup> {
    value: SensitiveScalar<G::ScalarField>,
    pub commitment: G,
    pub proof: SchnorrProof<G>,
}

impl<G: CurveGroup> Coefficient<G> {
    pub fn value(&self) -> &SensitiveScalar<G::ScalarField> {
        &self.value
    }
}

/// A guardian's secret polynomial. Immutable once generated.
#[derive(Clone, Debug)]
pub struct ElectionPolynomial<G: CurveGroup> {
    sequence_order: u64,
    coefficients: Vec<Coefficient<G>>,
}

impl<G: CurveGroup> ElectionPolynomial<G> {
    /// Generates a polynomial with `quorum` random coefficients.
    ///
    /// # Errors
    /// Returns an error if `quorum` or `sequence_order` is zero.
    pub fn generate<R: RngCore>(
        sequence_order: u64,
        quorum: u64,
        parameter_hash: &G::ScalarField,
        rng: &mut R,
    ) -> Result<Self, TallyError> {
        let secret = SensitiveScalar::new(random_nonzero_scalar::<G::ScalarField, R>(rng));
        Self::generate_with_secret(sequence_order, quorum, parameter_hash, secret, rng)
    }

    /// Generates a polynomial whose constant term is `secret`.
    ///
    /// The remaining coefficients and all proof nonces come from `rng`; a
    /// seeded rng therefore gives a fully reproducible polynomial.
    ///
    /// # Errors
    /// Returns an error if `quorum` or `sequence_order` is zero, or `secret` is zero.
    pub fn generate_with_secret<R: RngCore>(
        sequence_order: u64,
        quorum: u64,
        parameter_hash: &G::ScalarField,
        secret: SensitiveScalar<G::ScalarField>,
        rng: &mut R,
    ) -> Result<Self, TallyError> {
        if quorum == 0 {
            return Err(TallyError::invalid_argument(
                "polynomial must have at least one coefficient",
            ));
        }
        if sequence_order == 0 {
            return Err(TallyError::invalid_argument(
                "sequence order 0 is reserved for the joint secret",
            ));
        }
        if secret.expose_secret().is_zero() {
            return Err(TallyError::invalid_argument("secret cannot be zero"));
        }

        let mut coefficients = Vec::with_capacity(quorum as usize);
        let mut next = Some(secret);
        for index in 0..quorum {
            let value = match next.take() {
                Some(secret) => secret,
                None => SensitiveScalar::new(G::ScalarField::rand(rng)),
            };
            let nonce = SensitiveScalar::new(random_nonzero_scalar::<G::ScalarField, R>(rng));
            let proof =
                SchnorrProof::prove(&value, &nonce, parameter_hash, sequence_order, index)?;
            coefficients.push(Coefficient {
                commitment: proof.public_key,
                proof,
                value,
            });
        }

        Ok(ElectionPolynomial {
            sequence_order,
            coefficients,
        })
    }

    pub fn sequence_order(&self) -> u64 {
        self.sequence_order
    }

    /// Number of coefficients; equals the quorum.
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn coefficients(&self) -> &[Coefficient<G>] {
        &self.coefficients
    }

    /// The constant term `a_0`, which is the guardian's election secret key.
    pub fn secret(&self) -> &SensitiveScalar<G::ScalarField> {
        &self.coefficients[0].value
    }

    pub fn commitments(&self) -> Vec<G> {
        self.coefficients.iter().map(|c| c.commitment).collect()
    }

    pub fn proofs(&self) -> Vec<SchnorrProof<G>> {
        self.coefficients.iter().map(|c| c.proof.clone()).collect()
    }

    /// Evaluates `P(x) mod q`.
    pub fn compute_coordinate(&self, x: u64) -> SensitiveScalar<G::ScalarField> {
        let mut poly = DensePolynomial::from_coefficients_vec(
            self.coefficients
                .iter()
                .map(|c| *c.value.expose_secret())
                .collect(),
        );
        let coordinate = poly.evaluate(&G::ScalarField::from(x));
        poly.coeffs.zeroize();
        SensitiveScalar::new(coordinate)
    }
}

fn random_nonzero_scalar<F: Field, R: RngCore>(rng: &mut R) -> F {
    loop {
        let candidate = F::rand(rng);
        if !candidate.is_zero() {
            return candidate;
        }
    }
}

/// Evaluates the committed polynomial "in the exponent": `Σ_k commitments[k]·x^k`.
///
/// Returns `None` if there are no commitments.
pub fn evaluate_commitments<G: CurveGroup>(x: u64, commitments: &[G]) -> Option<G> {
    if commitments.is_empty() {
        return None;
    }
    let x = G::ScalarField::from(x);
    let mut power = G::ScalarField::one();
    let scalars: Vec<G::ScalarField> = commitments
        .iter()
        .map(|_| {
            let current = power;
            power *= x;
            current
        })
        .collect();
    let bases = G::batch_convert_to_mul_base(commitments);
    G::msm(&bases, &scalars).ok()
}

/// Checks a claimed coordinate against public commitments:
/// `g·value == Σ_k commitments[k]·x^k`. Never fails.
pub fn verify_coordinate<G: CurveGroup>(
    x: u64,
    value: &G::ScalarField,
    commitments: &[G],
) -> bool {
    match evaluate_commitments(x, commitments) {
        Some(expected) => constant_time_eq(&(G::generator() * value), &expected),
        None => false,
    }
}
