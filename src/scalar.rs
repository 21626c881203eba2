//! Numeric interface the objective is written against.
//!
//! Every arithmetic step of the objective (precision assembly, the sparse
//! factorization, quadratic forms, the Gaussian likelihood) is generic over
//! [`Scalar`], so the same code evaluates plain values (`f64`), first
//! derivatives (`Dual64`) and second derivatives (`HyperDual64`).

use num_dual::{Dual64, DualNum, HyperDual64};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

pub const LN_2PI: f64 = 1.837_877_066_409_345_5;

pub trait Scalar:
    Copy
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    /// Lift a constant (zero derivative part).
    fn from_f64(value: f64) -> Self;

    /// Real part, with any derivative information dropped.
    fn value(&self) -> f64;

    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;

    #[inline]
    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    #[inline]
    fn one() -> Self {
        Self::from_f64(1.0)
    }

    #[inline]
    fn scale(self, factor: f64) -> Self {
        self * Self::from_f64(factor)
    }

    #[inline]
    fn is_finite(&self) -> bool {
        self.value().is_finite()
    }
}

impl Scalar for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn value(&self) -> f64 {
        *self
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

// Routed through generic helpers so method resolution only sees `DualNum`.
#[inline]
fn dual_exp<T: DualNum<f64>>(x: T) -> T {
    x.exp()
}

#[inline]
fn dual_ln<T: DualNum<f64>>(x: T) -> T {
    x.ln()
}

#[inline]
fn dual_sqrt<T: DualNum<f64>>(x: T) -> T {
    x.sqrt()
}

impl Scalar for Dual64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        Dual64::new(value, 0.0)
    }

    #[inline]
    fn value(&self) -> f64 {
        self.re
    }

    #[inline]
    fn exp(self) -> Self {
        dual_exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        dual_ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        dual_sqrt(self)
    }
}

impl Scalar for HyperDual64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        HyperDual64::new(value, 0.0, 0.0, 0.0)
    }

    #[inline]
    fn value(&self) -> f64 {
        self.re
    }

    #[inline]
    fn exp(self) -> Self {
        dual_exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        dual_ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        dual_sqrt(self)
    }
}

/// Sum in iteration order. Kept explicit so summation order is fixed.
#[inline]
pub fn ordered_sum<D: Scalar, I: IntoIterator<Item = D>>(terms: I) -> D {
    let mut acc = D::zero();
    for term in terms {
        acc += term;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn softplus<D: Scalar>(x: D) -> D {
        (D::one() + x.exp()).ln()
    }

    #[test]
    fn dual_carries_first_derivative_through_transcendentals() {
        let x = Dual64::new(0.3, 1.0);
        let y = softplus(x);
        let expected = 1.0 / (1.0 + (-0.3f64).exp());
        assert!((y.value() - (1.0 + 0.3f64.exp()).ln()).abs() < 1e-14);
        assert!((y.eps - expected).abs() < 1e-14);
    }

    #[test]
    fn hyperdual_carries_second_derivative() {
        // d²/dx² sqrt(x) = -1/4 x^{-3/2}
        let x = HyperDual64::new(2.0, 1.0, 1.0, 0.0);
        let y = Scalar::sqrt(x);
        let expected = -0.25 * 2.0f64.powf(-1.5);
        assert!((y.eps1eps2 - expected).abs() < 1e-14);
    }

    #[test]
    fn ln_2pi_constant_matches_std() {
        assert!((LN_2PI - (2.0 * std::f64::consts::PI).ln()).abs() < 1e-15);
    }
}
