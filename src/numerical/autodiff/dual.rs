//! Forward-mode dual numbers `a + ε·b`, `ε² = 0`.
//!
//! `Dual<S>` is generic over its component type, so nesting `Dual<Dual<f64>>`
//! propagates a Jacobian-vector product of a Jacobian-vector product.
use super::scalar::Scalar;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Clone, Debug, PartialEq)]
pub struct Dual<S: Scalar> {
    /// primal part
    pub re: S,
    /// tangent part
    pub eps: S,
}

impl<S: Scalar> Dual<S> {
    pub fn new(re: S, eps: S) -> Self {
        Dual { re, eps }
    }
    /// input variable seeded with a unit tangent
    pub fn variable(re: S) -> Self {
        Dual {
            re,
            eps: S::from_f64(1.0),
        }
    }
    pub fn constant(re: S) -> Self {
        Dual {
            re,
            eps: S::from_f64(0.0),
        }
    }
    /// chain rule for an elementary function with value `f` and derivative `df`
    fn chain(&self, f: S, df: S) -> Self {
        Dual {
            re: f,
            eps: df * self.eps.clone(),
        }
    }
}

impl<S: Scalar> Add for Dual<S> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Dual::new(self.re + rhs.re, self.eps + rhs.eps)
    }
}

impl<S: Scalar> Sub for Dual<S> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Dual::new(self.re - rhs.re, self.eps - rhs.eps)
    }
}

impl<S: Scalar> Mul for Dual<S> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let eps = self.eps * rhs.re.clone() + self.re.clone() * rhs.eps;
        Dual::new(self.re * rhs.re, eps)
    }
}

impl<S: Scalar> Div for Dual<S> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let re = self.re / rhs.re.clone();
        let eps = (self.eps - re.clone() * rhs.eps) / rhs.re;
        Dual::new(re, eps)
    }
}

impl<S: Scalar> Neg for Dual<S> {
    type Output = Self;
    fn neg(self) -> Self {
        Dual::new(-self.re, -self.eps)
    }
}

impl<S: Scalar> Scalar for Dual<S> {
    fn from_f64(value: f64) -> Self {
        Dual::constant(S::from_f64(value))
    }
    fn value(&self) -> f64 {
        self.re.value()
    }
    fn exp(&self) -> Self {
        let e = self.re.exp();
        self.chain(e.clone(), e)
    }
    fn ln(&self) -> Self {
        self.chain(self.re.ln(), S::from_f64(1.0) / self.re.clone())
    }
    fn sqrt(&self) -> Self {
        let r = self.re.sqrt();
        self.chain(r.clone(), S::from_f64(0.5) / r)
    }
    fn sin(&self) -> Self {
        self.chain(self.re.sin(), self.re.cos())
    }
    fn cos(&self) -> Self {
        self.chain(self.re.cos(), -self.re.sin())
    }
    fn asin(&self) -> Self {
        let one = S::from_f64(1.0);
        let d = one.clone() / (one - self.re.clone() * self.re.clone()).sqrt();
        self.chain(self.re.asin(), d)
    }
    fn atan(&self) -> Self {
        let one = S::from_f64(1.0);
        let d = one.clone() / (one + self.re.clone() * self.re.clone());
        self.chain(self.re.atan(), d)
    }
    fn powf(&self, p: f64) -> Self {
        let d = S::from_f64(p) * self.re.powf(p - 1.0);
        self.chain(self.re.powf(p), d)
    }
}
