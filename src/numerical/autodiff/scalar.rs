//! # Scalar abstraction for automatic differentiation
//!
//! Every number type that a symbolic vector field can be evaluated on implements
//! [`Scalar`]: plain `f64`, forward-mode [`Dual`](super::dual::Dual) numbers,
//! truncated [`Taylor`](super::taylor::Taylor) polynomials and reverse-mode
//! [`RVar`](super::reverse::RVar) tape variables. Because `Dual<S>` and `RVar<S>` are
//! themselves generic over a `Scalar`, the types nest: `Dual<Dual<f64>>` carries
//! second-order information, `RVar<Dual<f64>>` mixes reverse over forward mode, etc.
use std::f64::consts::FRAC_PI_2;
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub trait Scalar:
    Clone
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lift a constant into the number type (all derivative parts zero).
    fn from_f64(value: f64) -> Self;
    /// Primal (order zero) value.
    fn value(&self) -> f64;

    fn exp(&self) -> Self;
    fn ln(&self) -> Self;
    fn sqrt(&self) -> Self;
    fn sin(&self) -> Self;
    fn cos(&self) -> Self;
    fn asin(&self) -> Self;
    fn atan(&self) -> Self;
    /// Power with a constant real exponent.
    fn powf(&self, p: f64) -> Self;

    fn tan(&self) -> Self {
        self.sin() / self.cos()
    }

    fn acos(&self) -> Self {
        Self::from_f64(FRAC_PI_2) - self.asin()
    }

    /// Integer power by repeated multiplication, exact for every number type and
    /// well defined at a zero base.
    fn powi(&self, n: i32) -> Self {
        if n == 0 {
            return Self::from_f64(1.0);
        }
        let mut acc = self.clone();
        for _ in 1..n.unsigned_abs() {
            acc = acc * self.clone();
        }
        if n < 0 {
            Self::from_f64(1.0) / acc
        } else {
            acc
        }
    }

    /// General power `self^exponent` with a variable exponent.
    fn pow(&self, exponent: &Self) -> Self {
        (exponent.clone() * self.ln()).exp()
    }
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
    fn value(&self) -> f64 {
        *self
    }
    fn exp(&self) -> Self {
        f64::exp(*self)
    }
    fn ln(&self) -> Self {
        f64::ln(*self)
    }
    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }
    fn sin(&self) -> Self {
        f64::sin(*self)
    }
    fn cos(&self) -> Self {
        f64::cos(*self)
    }
    fn asin(&self) -> Self {
        f64::asin(*self)
    }
    fn atan(&self) -> Self {
        f64::atan(*self)
    }
    fn powf(&self, p: f64) -> Self {
        f64::powf(*self, p)
    }
    fn tan(&self) -> Self {
        f64::tan(*self)
    }
    fn acos(&self) -> Self {
        f64::acos(*self)
    }
    fn powi(&self, n: i32) -> Self {
        f64::powi(*self, n)
    }
    fn pow(&self, exponent: &Self) -> Self {
        f64::powf(*self, *exponent)
    }
}
