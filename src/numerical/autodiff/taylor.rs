//! # Truncated Taylor polynomials
//!
//! A [`Taylor`] value stores the normalized Taylor coefficients
//! `x(t) = x_0 + x_1 t + x_2 t^2 + ...` of a scalar function of one variable.
//! Arithmetic and elementary functions are propagated coefficient by coefficient
//! with the classical recurrences (Griewank & Walther, "Evaluating Derivatives",
//! ch. 13), so one evaluation of a vector field on Taylor inputs yields all
//! output coefficients at once.
//!
//! Operands of different length are allowed: a missing coefficient is zero. This
//! lets constants (length 1) mix with full-length polynomials.
use super::scalar::Scalar;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Clone, Debug, PartialEq)]
pub struct Taylor {
    coeffs: Vec<f64>,
}

impl Taylor {
    pub fn new(coeffs: Vec<f64>) -> Self {
        if coeffs.is_empty() {
            return Taylor { coeffs: vec![0.0] };
        }
        Taylor { coeffs }
    }

    /// `t0 + t` truncated to `len` coefficients, i.e. the independent variable.
    pub fn variable(t0: f64, len: usize) -> Self {
        let mut coeffs = vec![0.0; len.max(1)];
        coeffs[0] = t0;
        if len > 1 {
            coeffs[1] = 1.0;
        }
        Taylor { coeffs }
    }

    pub fn coeff(&self, k: usize) -> f64 {
        self.coeffs.get(k).copied().unwrap_or(0.0)
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    /// k-th derivative at the expansion point, `k! * x_k`
    pub fn derivative(&self, k: usize) -> f64 {
        let factorial: f64 = (1..=k).map(|i| i as f64).product();
        factorial * self.coeff(k)
    }

    /// Coefficients of `d/dt x(t)`.
    fn differentiate(&self) -> Taylor {
        let coeffs: Vec<f64> = (1..self.len())
            .map(|k| k as f64 * self.coeffs[k])
            .collect();
        Taylor::new(coeffs)
    }

    /// Antiderivative with constant term `c0`, truncated to `len` coefficients.
    fn integrate(&self, c0: f64, len: usize) -> Taylor {
        let mut coeffs = vec![0.0; len];
        coeffs[0] = c0;
        for k in 1..len {
            coeffs[k] = self.coeff(k - 1) / k as f64;
        }
        Taylor { coeffs }
    }

    fn zip_with(&self, rhs: &Taylor, op: impl Fn(f64, f64) -> f64) -> Taylor {
        let len = self.len().max(rhs.len());
        let coeffs = (0..len).map(|k| op(self.coeff(k), rhs.coeff(k))).collect();
        Taylor { coeffs }
    }

    /// sin and cos share one recurrence
    fn sin_cos(&self) -> (Taylor, Taylor) {
        let n = self.len();
        let mut s = vec![0.0; n];
        let mut c = vec![0.0; n];
        s[0] = self.coeffs[0].sin();
        c[0] = self.coeffs[0].cos();
        for k in 1..n {
            let mut sk = 0.0;
            let mut ck = 0.0;
            for j in 1..=k {
                let ja = j as f64 * self.coeffs[j];
                sk += ja * c[k - j];
                ck -= ja * s[k - j];
            }
            s[k] = sk / k as f64;
            c[k] = ck / k as f64;
        }
        (Taylor { coeffs: s }, Taylor { coeffs: c })
    }
}

impl Add for Taylor {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a + b)
    }
}

impl Sub for Taylor {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a - b)
    }
}

impl Mul for Taylor {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let len = self.len().max(rhs.len());
        let mut coeffs = vec![0.0; len];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in rhs.coeffs.iter().enumerate() {
                if i + j < len {
                    coeffs[i + j] += a * b;
                }
            }
        }
        Taylor { coeffs }
    }
}

impl Div for Taylor {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let len = self.len().max(rhs.len());
        let b0 = rhs.coeff(0);
        let mut q = vec![0.0; len];
        for k in 0..len {
            let mut acc = self.coeff(k);
            for j in 1..=k {
                acc -= rhs.coeff(j) * q[k - j];
            }
            q[k] = acc / b0;
        }
        Taylor { coeffs: q }
    }
}

impl Neg for Taylor {
    type Output = Self;
    fn neg(self) -> Self {
        Taylor {
            coeffs: self.coeffs.iter().map(|c| -c).collect(),
        }
    }
}

impl Scalar for Taylor {
    fn from_f64(value: f64) -> Self {
        Taylor {
            coeffs: vec![value],
        }
    }

    fn value(&self) -> f64 {
        self.coeffs[0]
    }

    fn exp(&self) -> Self {
        let n = self.len();
        let mut e = vec![0.0; n];
        e[0] = self.coeffs[0].exp();
        for k in 1..n {
            let acc: f64 = (1..=k)
                .map(|j| j as f64 * self.coeffs[j] * e[k - j])
                .sum();
            e[k] = acc / k as f64;
        }
        Taylor { coeffs: e }
    }

    fn ln(&self) -> Self {
        let n = self.len();
        let a0 = self.coeffs[0];
        let mut l = vec![0.0; n];
        l[0] = a0.ln();
        for k in 1..n {
            let acc: f64 = (1..k)
                .map(|j| j as f64 * l[j] * self.coeffs[k - j])
                .sum();
            l[k] = (self.coeffs[k] - acc / k as f64) / a0;
        }
        Taylor { coeffs: l }
    }

    fn sqrt(&self) -> Self {
        let n = self.len();
        let mut r = vec![0.0; n];
        r[0] = self.coeffs[0].sqrt();
        for k in 1..n {
            let acc: f64 = (1..k).map(|j| r[j] * r[k - j]).sum();
            r[k] = (self.coeffs[k] - acc) / (2.0 * r[0]);
        }
        Taylor { coeffs: r }
    }

    fn sin(&self) -> Self {
        self.sin_cos().0
    }

    fn cos(&self) -> Self {
        self.sin_cos().1
    }

    fn tan(&self) -> Self {
        let (s, c) = self.sin_cos();
        s / c
    }

    fn asin(&self) -> Self {
        // (asin a)' = a' / sqrt(1 - a^2)
        let one = Taylor::from_f64(1.0);
        let root = (one - self.clone() * self.clone()).sqrt();
        (self.differentiate() / root).integrate(self.coeffs[0].asin(), self.len())
    }

    fn atan(&self) -> Self {
        let one = Taylor::from_f64(1.0);
        let denom = one + self.clone() * self.clone();
        (self.differentiate() / denom).integrate(self.coeffs[0].atan(), self.len())
    }

    fn powf(&self, p: f64) -> Self {
        if p.fract() == 0.0 && p.abs() <= i32::MAX as f64 {
            return self.powi(p as i32);
        }
        // a * y' = p * a' * y
        let n = self.len();
        let a0 = self.coeffs[0];
        let mut y = vec![0.0; n];
        y[0] = a0.powf(p);
        for k in 1..n {
            let acc: f64 = (1..=k)
                .map(|j| ((p + 1.0) * j as f64 - k as f64) * self.coeffs[j] * y[k - j])
                .sum();
            y[k] = acc / (k as f64 * a0);
        }
        Taylor { coeffs: y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t(len: usize) -> Taylor {
        Taylor::variable(0.0, len)
    }

    #[test]
    fn test_exp_series() {
        let e = t(6).exp();
        let mut fact = 1.0;
        for k in 0..6 {
            if k > 0 {
                fact *= k as f64;
            }
            assert_relative_eq!(e.coeff(k), 1.0 / fact, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_division_inverts_multiplication() {
        let a = Taylor::new(vec![2.0, -1.0, 0.5, 3.0]);
        let b = Taylor::new(vec![1.5, 0.25, -2.0, 1.0]);
        let q = (a.clone() * b.clone()) / b;
        for k in 0..4 {
            assert_relative_eq!(q.coeff(k), a.coeff(k), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sin_cos_and_tan() {
        let x = Taylor::variable(0.4, 5);
        let s = x.sin();
        // d^2/dx^2 sin = -sin, d^3 = -cos
        assert_relative_eq!(s.derivative(2), -(0.4_f64.sin()), epsilon = 1e-13);
        assert_relative_eq!(s.derivative(3), -(0.4_f64.cos()), epsilon = 1e-13);
        let tan = x.tan();
        let sec2 = 1.0 / 0.4_f64.cos().powi(2);
        assert_relative_eq!(tan.derivative(1), sec2, epsilon = 1e-13);
        assert_relative_eq!(tan.derivative(2), 2.0 * sec2 * 0.4_f64.tan(), epsilon = 1e-12);
    }

    #[test]
    fn test_ln_sqrt_and_fractional_power() {
        let x = Taylor::variable(2.0, 4);
        assert_relative_eq!(x.ln().derivative(3), 2.0 / 8.0, epsilon = 1e-13);
        // sqrt''(x) = -1/4 x^{-3/2}
        assert_relative_eq!(x.sqrt().derivative(2), -0.25 * 2.0_f64.powf(-1.5), epsilon = 1e-13);
        // (x^2.5)''' = 2.5*1.5*0.5 x^-0.5
        assert_relative_eq!(
            x.powf(2.5).derivative(3),
            2.5 * 1.5 * 0.5 * 2.0_f64.powf(-0.5),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_inverse_trigonometric() {
        let x = Taylor::variable(0.2, 4);
        let d2_asin = 0.2 / (1.0 - 0.04_f64).powf(1.5);
        assert_relative_eq!(x.asin().derivative(2), d2_asin, epsilon = 1e-12);
        let d2_atan = -2.0 * 0.2 / (1.0 + 0.04_f64).powi(2);
        assert_relative_eq!(x.atan().derivative(2), d2_atan, epsilon = 1e-12);
        assert_relative_eq!(x.acos().value(), 0.2_f64.acos(), epsilon = 1e-14);
    }

    #[test]
    fn test_integer_power_at_zero_base() {
        let x = Taylor::variable(0.0, 5);
        let p = x.powi(3);
        assert_relative_eq!(p.derivative(3), 6.0, epsilon = 1e-14);
        assert_eq!(p.coeff(1), 0.0);
    }
}
