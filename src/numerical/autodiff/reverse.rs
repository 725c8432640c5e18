//! # Reverse-mode tape
//!
//! A [`Tape`] records every elementary operation performed on [`RVar`] values as a
//! node holding the local partial derivatives with respect to its parents. A single
//! backward sweep from an output then yields the gradient of that output with
//! respect to all inputs (one row of the Jacobian).
//!
//! The tape is generic over the number type of the partials. With `S = f64` this is
//! ordinary reverse mode; with `S = RVar<f64>` or `S = Dual<f64>` the partials are
//! themselves differentiable, which is what repeated Jacobian-vector recursion needs.
use super::scalar::Scalar;
use std::cell::RefCell;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, Clone)]
struct Node<S: Scalar> {
    parents: Vec<(usize, S)>,
}

#[derive(Debug)]
pub struct Tape<S: Scalar> {
    nodes: RefCell<Vec<Node<S>>>,
}

impl<S: Scalar> Tape<S> {
    pub fn new() -> Self {
        Tape {
            nodes: RefCell::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    fn push(&self, parents: Vec<(usize, S)>) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(Node { parents });
        nodes.len() - 1
    }

    /// Register an independent variable.
    pub fn variable(&self, value: S) -> RVar<'_, S> {
        let idx = self.push(Vec::new());
        RVar {
            tape: Some(self),
            idx,
            val: value,
        }
    }

    /// Adjoints of `output` with respect to the first `n_inputs` nodes, which must be
    /// the variables created before any operation was recorded.
    pub fn gradient(&self, output: &RVar<'_, S>, n_inputs: usize) -> Vec<S> {
        let nodes = self.nodes.borrow();
        let mut adjoint = vec![S::from_f64(0.0); nodes.len()];
        if output.tape.is_none() {
            // constant output, zero gradient
            adjoint.truncate(n_inputs);
            return adjoint;
        }
        adjoint[output.idx] = S::from_f64(1.0);
        for i in (0..=output.idx).rev() {
            let a_i = adjoint[i].clone();
            for (parent, weight) in nodes[i].parents.iter() {
                adjoint[*parent] = adjoint[*parent].clone() + a_i.clone() * weight.clone();
            }
        }
        adjoint.truncate(n_inputs);
        adjoint
    }
}

impl<S: Scalar> Default for Tape<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Variable living on a [`Tape`]; values created with `from_f64` are constants that
/// are not recorded.
#[derive(Clone, Debug)]
pub struct RVar<'t, S: Scalar> {
    tape: Option<&'t Tape<S>>,
    idx: usize,
    val: S,
}

impl<'t, S: Scalar> RVar<'t, S> {
    pub fn val(&self) -> &S {
        &self.val
    }

    fn unary(&self, val: S, partial: S) -> Self {
        match self.tape {
            Some(tape) => RVar {
                tape: Some(tape),
                idx: tape.push(vec![(self.idx, partial)]),
                val,
            },
            None => RVar {
                tape: None,
                idx: 0,
                val,
            },
        }
    }

    fn binary(&self, rhs: &Self, val: S, d_lhs: S, d_rhs: S) -> Self {
        let tape = self.tape.or(rhs.tape);
        match tape {
            Some(tape) => {
                let mut parents = Vec::with_capacity(2);
                if self.tape.is_some() {
                    parents.push((self.idx, d_lhs));
                }
                if rhs.tape.is_some() {
                    parents.push((rhs.idx, d_rhs));
                }
                RVar {
                    tape: Some(tape),
                    idx: tape.push(parents),
                    val,
                }
            }
            None => RVar {
                tape: None,
                idx: 0,
                val,
            },
        }
    }
}

impl<'t, S: Scalar> Add for RVar<'t, S> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        let val = self.val.clone() + rhs.val.clone();
        self.binary(&rhs, val, S::from_f64(1.0), S::from_f64(1.0))
    }
}

impl<'t, S: Scalar> Sub for RVar<'t, S> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        let val = self.val.clone() - rhs.val.clone();
        self.binary(&rhs, val, S::from_f64(1.0), S::from_f64(-1.0))
    }
}

impl<'t, S: Scalar> Mul for RVar<'t, S> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let val = self.val.clone() * rhs.val.clone();
        self.binary(&rhs, val, rhs.val.clone(), self.val.clone())
    }
}

impl<'t, S: Scalar> Div for RVar<'t, S> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let val = self.val.clone() / rhs.val.clone();
        let d_lhs = S::from_f64(1.0) / rhs.val.clone();
        let d_rhs = -(val.clone() / rhs.val.clone());
        self.binary(&rhs, val, d_lhs, d_rhs)
    }
}

impl<'t, S: Scalar> Neg for RVar<'t, S> {
    type Output = Self;
    fn neg(self) -> Self {
        self.unary(-self.val.clone(), S::from_f64(-1.0))
    }
}

impl<'t, S: Scalar> Scalar for RVar<'t, S> {
    fn from_f64(value: f64) -> Self {
        RVar {
            tape: None,
            idx: 0,
            val: S::from_f64(value),
        }
    }
    fn value(&self) -> f64 {
        self.val.value()
    }
    fn exp(&self) -> Self {
        let e = self.val.exp();
        self.unary(e.clone(), e)
    }
    fn ln(&self) -> Self {
        self.unary(self.val.ln(), S::from_f64(1.0) / self.val.clone())
    }
    fn sqrt(&self) -> Self {
        let r = self.val.sqrt();
        self.unary(r.clone(), S::from_f64(0.5) / r)
    }
    fn sin(&self) -> Self {
        self.unary(self.val.sin(), self.val.cos())
    }
    fn cos(&self) -> Self {
        self.unary(self.val.cos(), -self.val.sin())
    }
    fn asin(&self) -> Self {
        let one = S::from_f64(1.0);
        let d = one.clone() / (one - self.val.clone() * self.val.clone()).sqrt();
        self.unary(self.val.asin(), d)
    }
    fn atan(&self) -> Self {
        let one = S::from_f64(1.0);
        let d = one.clone() / (one + self.val.clone() * self.val.clone());
        self.unary(self.val.atan(), d)
    }
    fn powf(&self, p: f64) -> Self {
        let d = S::from_f64(p) * self.val.powf(p - 1.0);
        self.unary(self.val.powf(p), d)
    }
}
