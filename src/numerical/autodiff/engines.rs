//! # Higher-order time derivatives of ODE solutions
//!
//! For `y' = f(t, y)` the state is augmented with time, `z = (t, y)`,
//! `F(z) = (1, f(t, y))`, so every field is autonomous. The derivatives of the
//! solution obey
//!
//! ```text
//! g_1(z) = F(z),    g_{k+1}(z) = J_{g_k}(z) F(z),    y^(k)(t0) = g_k(z0)[1..]
//! ```
//!
//! Each Jacobian product is one more layer of differentiation, so `g_k` is evaluated
//! on a number type nested `k - 1` times. The nesting is expressed at the type level
//! (`ForwardJvp<ForwardJvp<FieldLevel>>` etc.) and dispatched by a `match` on the
//! order, which is where the ceilings of the unrolled engines come from.
//!
//! The Taylor engine instead propagates truncated Taylor polynomials through the
//! field: with `y(t0 + s) = Σ y_k s^k`, the coefficient recurrence
//! `y_{k+1} = [f(t0 + s, y(s))]_k / (k + 1)` produces one new coefficient per pass
//! and has no intrinsic order limit.
use super::dual::Dual;
use super::reverse::{RVar, Tape};
use super::scalar::Scalar;
use super::taylor::Taylor;
use crate::numerical::init_routines::init_error::InitError;
use crate::symbolic::symbolic_functions::SymbolicVectorField;
use log::{debug, warn};
use nalgebra::DVector;
use std::marker::PhantomData;

/// Narrow capability the autodiff routines rely on.
pub trait TaylorCoefficientEngine: Send + Sync {
    fn name(&self) -> &'static str;
    /// Highest supported derivative order, `None` when unbounded.
    fn max_order(&self) -> Option<usize>;
    /// Returns `[y(t0), y'(t0), ..., y^(order)(t0)]`.
    fn evaluate_taylor_coefficients(
        &self,
        field: &SymbolicVectorField,
        t0: f64,
        y0: &DVector<f64>,
        order: usize,
    ) -> Result<Vec<DVector<f64>>, InitError>;
}

trait DerivativeLevel {
    fn eval<S: Scalar>(field: &SymbolicVectorField, z: &[S]) -> Result<Vec<S>, InitError>;
}

/// `g_1 = F`
struct FieldLevel;

/// `J_g F` from one forward pass per state component
struct ForwardJacobian<L>(PhantomData<L>);

/// `J_g F` as a single Jacobian-vector product
struct ForwardJvp<L>(PhantomData<L>);

/// `J_g F` from one backward sweep per output component
struct ReverseJacobian<L>(PhantomData<L>);

fn augmented_field<S: Scalar>(field: &SymbolicVectorField, z: &[S]) -> Result<Vec<S>, InitError> {
    let f = field
        .eval(z[0].clone(), &z[1..])
        .map_err(InitError::InvalidConfiguration)?;
    let mut out = Vec::with_capacity(z.len());
    out.push(S::from_f64(1.0));
    out.extend(f);
    Ok(out)
}

impl DerivativeLevel for FieldLevel {
    fn eval<S: Scalar>(field: &SymbolicVectorField, z: &[S]) -> Result<Vec<S>, InitError> {
        augmented_field(field, z)
    }
}

impl<L: DerivativeLevel> DerivativeLevel for ForwardJacobian<L> {
    fn eval<S: Scalar>(field: &SymbolicVectorField, z: &[S]) -> Result<Vec<S>, InitError> {
        let v = augmented_field(field, z)?;
        let mut acc = vec![S::from_f64(0.0); z.len()];
        for (j, v_j) in v.iter().enumerate() {
            let seeded: Vec<Dual<S>> = z
                .iter()
                .enumerate()
                .map(|(i, zi)| {
                    if i == j {
                        Dual::variable(zi.clone())
                    } else {
                        Dual::constant(zi.clone())
                    }
                })
                .collect();
            let column = L::eval(field, &seeded)?;
            for (a, c) in acc.iter_mut().zip(column) {
                *a = a.clone() + c.eps * v_j.clone();
            }
        }
        Ok(acc)
    }
}

impl<L: DerivativeLevel> DerivativeLevel for ForwardJvp<L> {
    fn eval<S: Scalar>(field: &SymbolicVectorField, z: &[S]) -> Result<Vec<S>, InitError> {
        let v = augmented_field(field, z)?;
        let seeded: Vec<Dual<S>> = z
            .iter()
            .zip(v)
            .map(|(zi, vi)| Dual::new(zi.clone(), vi))
            .collect();
        Ok(L::eval(field, &seeded)?.into_iter().map(|g| g.eps).collect())
    }
}

impl<L: DerivativeLevel> DerivativeLevel for ReverseJacobian<L> {
    fn eval<S: Scalar>(field: &SymbolicVectorField, z: &[S]) -> Result<Vec<S>, InitError> {
        let v = augmented_field(field, z)?;
        let tape: Tape<S> = Tape::new();
        let inputs: Vec<RVar<'_, S>> = z.iter().map(|zi| tape.variable(zi.clone())).collect();
        let outputs = L::eval(field, &inputs)?;
        let mut result = Vec::with_capacity(outputs.len());
        for out in outputs.iter() {
            let grad = tape.gradient(out, z.len());
            let row = grad
                .into_iter()
                .zip(v.iter())
                .fold(S::from_f64(0.0), |acc, (g, vj)| acc + g * vj.clone());
            result.push(row);
        }
        Ok(result)
    }
}

fn level<L: DerivativeLevel>(field: &SymbolicVectorField, z0: &[f64]) -> Result<DVector<f64>, InitError> {
    let g = L::eval::<f64>(field, z0)?;
    Ok(DVector::from_iterator(g.len() - 1, g.into_iter().skip(1)))
}

fn check_request(
    engine: &dyn TaylorCoefficientEngine,
    field: &SymbolicVectorField,
    y0: &DVector<f64>,
    order: usize,
) -> Result<(), InitError> {
    if field.dimension() != y0.len() {
        return Err(InitError::DimensionMismatch {
            expected: field.dimension(),
            found: y0.len(),
        });
    }
    if let Some(max) = engine.max_order() {
        if order > max {
            return Err(InitError::UnsupportedOrder {
                routine: engine.name(),
                requested: order,
                max,
            });
        }
    }
    Ok(())
}

fn collect_orders(
    t0: f64,
    y0: &DVector<f64>,
    order: usize,
    mut derivative: impl FnMut(&[f64], usize) -> Result<DVector<f64>, InitError>,
) -> Result<Vec<DVector<f64>>, InitError> {
    let mut z0 = Vec::with_capacity(y0.len() + 1);
    z0.push(t0);
    z0.extend(y0.iter().copied());
    let mut out = Vec::with_capacity(order + 1);
    out.push(y0.clone());
    for k in 1..=order {
        let dk = derivative(&z0, k)?;
        if dk.iter().any(|v| !v.is_finite()) {
            warn!("derivative of order {} is not finite: {:?}", k, dk.as_slice());
        }
        out.push(dk);
    }
    Ok(out)
}

/// Repeated full Jacobians built from forward-mode passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardModeEngine;

impl TaylorCoefficientEngine for ForwardModeEngine {
    fn name(&self) -> &'static str {
        "ForwardMode"
    }

    fn max_order(&self) -> Option<usize> {
        Some(5)
    }

    fn evaluate_taylor_coefficients(
        &self,
        field: &SymbolicVectorField,
        t0: f64,
        y0: &DVector<f64>,
        order: usize,
    ) -> Result<Vec<DVector<f64>>, InitError> {
        check_request(self, field, y0, order)?;
        collect_orders(t0, y0, order, |z0, k| match k {
            1 => level::<FieldLevel>(field, z0),
            2 => level::<ForwardJacobian<FieldLevel>>(field, z0),
            3 => level::<ForwardJacobian<ForwardJacobian<FieldLevel>>>(field, z0),
            4 => level::<ForwardJacobian<ForwardJacobian<ForwardJacobian<FieldLevel>>>>(field, z0),
            5 => level::<
                ForwardJacobian<ForwardJacobian<ForwardJacobian<ForwardJacobian<FieldLevel>>>>,
            >(field, z0),
            _ => Err(InitError::UnsupportedOrder {
                routine: self.name(),
                requested: k,
                max: 5,
            }),
        })
    }
}

/// Nested Jacobian-vector products, one forward pass per level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardModeJvpEngine;

type Jvp2 = ForwardJvp<FieldLevel>;
type Jvp3 = ForwardJvp<Jvp2>;
type Jvp4 = ForwardJvp<Jvp3>;
type Jvp5 = ForwardJvp<Jvp4>;
type Jvp6 = ForwardJvp<Jvp5>;
type Jvp7 = ForwardJvp<Jvp6>;

impl TaylorCoefficientEngine for ForwardModeJvpEngine {
    fn name(&self) -> &'static str {
        "ForwardModeJVP"
    }

    fn max_order(&self) -> Option<usize> {
        Some(7)
    }

    fn evaluate_taylor_coefficients(
        &self,
        field: &SymbolicVectorField,
        t0: f64,
        y0: &DVector<f64>,
        order: usize,
    ) -> Result<Vec<DVector<f64>>, InitError> {
        check_request(self, field, y0, order)?;
        collect_orders(t0, y0, order, |z0, k| match k {
            1 => level::<FieldLevel>(field, z0),
            2 => level::<Jvp2>(field, z0),
            3 => level::<Jvp3>(field, z0),
            4 => level::<Jvp4>(field, z0),
            5 => level::<Jvp5>(field, z0),
            6 => level::<Jvp6>(field, z0),
            7 => level::<Jvp7>(field, z0),
            _ => Err(InitError::UnsupportedOrder {
                routine: self.name(),
                requested: k,
                max: 7,
            }),
        })
    }
}

/// Repeated Jacobians from reverse sweeps over nested tapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReverseModeEngine;

impl TaylorCoefficientEngine for ReverseModeEngine {
    fn name(&self) -> &'static str {
        "ReverseMode"
    }

    fn max_order(&self) -> Option<usize> {
        Some(4)
    }

    fn evaluate_taylor_coefficients(
        &self,
        field: &SymbolicVectorField,
        t0: f64,
        y0: &DVector<f64>,
        order: usize,
    ) -> Result<Vec<DVector<f64>>, InitError> {
        check_request(self, field, y0, order)?;
        collect_orders(t0, y0, order, |z0, k| match k {
            1 => level::<FieldLevel>(field, z0),
            2 => level::<ReverseJacobian<FieldLevel>>(field, z0),
            3 => level::<ReverseJacobian<ReverseJacobian<FieldLevel>>>(field, z0),
            4 => level::<ReverseJacobian<ReverseJacobian<ReverseJacobian<FieldLevel>>>>(field, z0),
            _ => Err(InitError::UnsupportedOrder {
                routine: self.name(),
                requested: k,
                max: 4,
            }),
        })
    }
}

/// Taylor-polynomial propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaylorModeEngine {
    pub max_order: Option<usize>,
}

impl TaylorCoefficientEngine for TaylorModeEngine {
    fn name(&self) -> &'static str {
        "TaylorMode"
    }

    fn max_order(&self) -> Option<usize> {
        self.max_order
    }

    fn evaluate_taylor_coefficients(
        &self,
        field: &SymbolicVectorField,
        t0: f64,
        y0: &DVector<f64>,
        order: usize,
    ) -> Result<Vec<DVector<f64>>, InitError> {
        check_request(self, field, y0, order)?;
        let d = y0.len();
        // coeffs[i][k] is the k-th normalized Taylor coefficient of y_i
        let mut coeffs: Vec<Vec<f64>> = y0.iter().map(|v| vec![*v]).collect();
        for k in 0..order {
            let t = Taylor::variable(t0, k + 1);
            let y: Vec<Taylor> = coeffs.iter().map(|c| Taylor::new(c.clone())).collect();
            let f = field.eval(t, &y).map_err(InitError::InvalidConfiguration)?;
            for (c, fi) in coeffs.iter_mut().zip(f.iter()) {
                c.push(fi.coeff(k) / (k + 1) as f64);
            }
        }
        debug!("Taylor coefficients up to order {} propagated", order);
        let mut factorial = 1.0;
        let mut out = Vec::with_capacity(order + 1);
        for k in 0..=order {
            if k > 0 {
                factorial *= k as f64;
            }
            let dk = DVector::from_fn(d, |i, _| factorial * coeffs[i][k]);
            if dk.iter().any(|v| !v.is_finite()) {
                warn!("derivative of order {} is not finite: {:?}", k, dk.as_slice());
            }
            out.push(dk);
        }
        Ok(out)
    }
}
