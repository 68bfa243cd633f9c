//! Security utilities for protecting guardian secrets
//!
//! This module provides:
//! - A zeroize-on-drop wrapper for secret scalars (polynomial coefficients,
//!   commitment seeds, reconstructed partial secrets, proof nonces)
//! - Constant-time comparison of canonically encoded values

use ark_ff::Field;
use ark_serialize::CanonicalSerialize;
use ark_std::vec::Vec;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Wrapper for secret scalar field elements that zeroizes on drop
///
/// # Security
/// - Automatically zeroizes memory when dropped
/// - Prevents accidental leakage through the Debug trait
#[derive(Clone)]
pub struct SensitiveScalar<F: Field> {
    value: F,
}

impl<F: Field> SensitiveScalar<F> {
    /// Create a new sensitive scalar from a field element
    pub fn new(value: F) -> Self {
        Self { value }
    }

    /// Get a reference to the inner value
    ///
    /// # Security Warning
    /// The caller must ensure this reference is not used to leak the value
    pub fn expose_secret(&self) -> &F {
        &self.value
    }

    /// Create a new sensitive scalar with value zero
    pub fn zero() -> Self {
        Self { value: F::zero() }
    }

    /// Adds `other` into this secret in place.
    pub fn add_assign(&mut self, other: &F) {
        self.value += other;
    }
}

impl<F: Field> Zeroize for SensitiveScalar<F> {
    fn zeroize(&mut self) {
        self.value.zeroize();
    }
}

impl<F: Field> ZeroizeOnDrop for SensitiveScalar<F> {}

impl<F: Field> Drop for SensitiveScalar<F> {
    fn drop(&mut self) {
        self.zeroize();
    }
}

// Prevent debug output from leaking sensitive data
impl<F: Field> std::fmt::Debug for SensitiveScalar<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SensitiveScalar([REDACTED])")
    }
}

/// Constant-time equality for any canonically encoded value
///
/// Both values are compressed-serialized and compared byte by byte without
/// early exit. A value that fails to serialize compares unequal.
pub fn constant_time_eq<T: CanonicalSerialize>(a: &T, b: &T) -> bool {
    let mut a_bytes = Vec::new();
    let mut b_bytes = Vec::new();

    if a.serialize_compressed(&mut a_bytes).is_err() {
        return false;
    }
    if b.serialize_compressed(&mut b_bytes).is_err() {
        return false;
    }

    constant_time_eq_bytes(&a_bytes, &b_bytes)
}

/// Constant-time byte slice comparison
///
/// The length check may leak; contents are compared without early exit.
pub fn constant_time_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}
