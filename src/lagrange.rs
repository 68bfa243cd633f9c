use std::collections::BTreeSet;

use ark_ec::CurveGroup;
use ark_ff::PrimeField;
use ark_serialize::*;
use ark_std::One;

use crate::error::TallyError;
use crate::key_ceremony::ElectionPublicKey;

/// Interpolation weight of one present guardian. Only meaningful for the
/// exact set of present guardians it was computed for.
#[derive(CanonicalSerialize, CanonicalDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct LagrangeCoefficient<F: PrimeField> {
    pub guardian_id: String,
    pub sequence_order: u64,
    pub coefficient: F,
}

/// Lagrange basis polynomial for `coordinate` evaluated at zero:
/// `w = Π_j x_j / (x_j - coordinate)` over the other present coordinates.
///
/// # Errors
/// Returns an error if any coordinate is zero or `others` contains `coordinate`.
pub fn compute_lagrange_coefficient<F: PrimeField>(
    coordinate: u64,
    others: &[u64],
) -> Result<F, TallyError> {
    if coordinate == 0 || others.contains(&0) {
        return Err(TallyError::invalid_argument(
            "sequence order 0 cannot take part in interpolation",
        ));
    }
    let x_i = F::from(coordinate);
    let mut numerator = F::one();
    let mut denominator = F::one();
    for &other in others {
        if other == coordinate {
            return Err(TallyError::invalid_argument(format!(
                "duplicate sequence order {}",
                coordinate
            )));
        }
        let x_j = F::from(other);
        numerator *= x_j;
        denominator *= x_j - x_i;
    }
    let inverse = denominator.inverse().ok_or_else(|| {
        TallyError::invalid_argument("sequence orders collide modulo the group order")
    })?;
    Ok(numerator * inverse)
}

/// Computes the coefficient of every present guardian.
///
/// # Errors
/// Returns an error if no guardian is present, two guardians share a
/// sequence order or a guardian id, or a sequence order is zero.
pub fn compute_lagrange_coefficients<G: CurveGroup>(
    present: &[ElectionPublicKey<G>],
) -> Result<Vec<LagrangeCoefficient<G::ScalarField>>, TallyError> {
    if present.is_empty() {
        return Err(TallyError::invalid_argument(
            "at least one guardian must be present",
        ));
    }
    let mut ids = BTreeSet::new();
    let mut orders = BTreeSet::new();
    for key in present {
        if !ids.insert(key.owner_id.as_str()) {
            return Err(TallyError::invalid_argument(format!(
                "guardian {} listed twice",
                key.owner_id
            )));
        }
        if !orders.insert(key.sequence_order) {
            return Err(TallyError::invalid_argument(format!(
                "duplicate sequence order {}",
                key.sequence_order
            )));
        }
    }

    present
        .iter()
        .map(|key| {
            let others: Vec<u64> = orders
                .iter()
                .copied()
                .filter(|&o| o != key.sequence_order)
                .collect();
            Ok(LagrangeCoefficient {
                guardian_id: key.owner_id.clone(),
                sequence_order: key.sequence_order,
                coefficient: compute_lagrange_coefficient(key.sequence_order, &others)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::public_key_stub;
    use ark_bls12_381::{Fr, G1Projective};
    use ark_std::Zero;

    type G = G1Projective;

    #[test]
    fn test_known_values() {
        // present {1, 2, 3}: w1 = 2·3/((2-1)(3-1)) = 3, w2 = 1·3/((1-2)(3-2)) = -3, w3 = 1·2/((1-3)(2-3)) = 1
        let w1: Fr = compute_lagrange_coefficient(1, &[2, 3]).unwrap();
        let w2: Fr = compute_lagrange_coefficient(2, &[1, 3]).unwrap();
        let w3: Fr = compute_lagrange_coefficient(3, &[1, 2]).unwrap();
        assert_eq!(w1, Fr::from(3u64));
        assert_eq!(w2, -Fr::from(3u64));
        assert_eq!(w3, Fr::from(1u64));
    }

    #[test]
    fn test_single_guardian_weight_is_one() {
        let w: Fr = compute_lagrange_coefficient(4, &[]).unwrap();
        assert_eq!(w, Fr::one());
    }

    #[test]
    fn test_coefficients_sum_to_one() {
        // interpolating the constant polynomial 1 at zero
        let present = vec![
            public_key_stub::<G>("a", 1),
            public_key_stub::<G>("b", 4),
            public_key_stub::<G>("c", 5),
        ];
        let coefficients = compute_lagrange_coefficients(&present).unwrap();
        let sum = coefficients
            .iter()
            .fold(Fr::zero(), |acc, c| acc + c.coefficient);
        assert_eq!(sum, Fr::one());
        assert_eq!(coefficients[1].guardian_id, "b");
        assert_eq!(coefficients[1].sequence_order, 4);
    }

    #[test]
    fn test_rejects_invalid_sets() {
        assert!(matches!(
            compute_lagrange_coefficients::<G>(&[]),
            Err(TallyError::InvalidArgument(_))
        ));

        let duplicate_order = vec![public_key_stub::<G>("a", 1), public_key_stub::<G>("b", 1)];
        assert!(matches!(
            compute_lagrange_coefficients(&duplicate_order),
            Err(TallyError::InvalidArgument(_))
        ));

        let duplicate_id = vec![public_key_stub::<G>("a", 1), public_key_stub::<G>("a", 2)];
        assert!(matches!(
            compute_lagrange_coefficients(&duplicate_id),
            Err(TallyError::InvalidArgument(_))
        ));

        assert!(compute_lagrange_coefficient::<Fr>(0, &[1, 2]).is_err());
        assert!(compute_lagrange_coefficient::<Fr>(2, &[1, 2]).is_err());
    }
}
