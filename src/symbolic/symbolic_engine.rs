//! # Symbolic Engine Module
//!
//! Symbolic expressions used to write down ODE vector fields. An expression can be
//! - differentiated analytically (`diff`), which gives Jacobians and `∂f/∂t`,
//! - turned into a plain `f64` function (`lambdify`),
//! - evaluated on any automatic-differentiation number type (`eval_generic`), which is
//!   what the derivative engines of the initialization routines rely on.
//!
//! ## Main Structures and Methods
//!
//! ### `Expr` Enum
//! - **Variables**: `Var(String)`
//! - **Constants**: `Const(f64)`
//! - **Operations**: `Add`, `Sub`, `Mul`, `Div`, `Pow`
//! - **Functions**: `Exp`, `Ln`, `sin`, `cos`, `tg`, `arcsin`, `arccos`, `arctg`
//!
//! Trigonometric names follow the mathematical notation (tg, arctg). Square roots are
//! represented as `Pow(x, 0.5)`.

#![allow(non_camel_case_types)]

use crate::numerical::autodiff::scalar::Scalar;
use std::collections::BTreeSet;
use std::fmt;

/// Core symbolic expression tree.
///
/// # Examples
/// ```rust, ignore
/// use RustedProbNum::symbolic::symbolic_engine::Expr;
/// let x = Expr::Var("x".to_string());
/// let expr = Expr::Add(Box::new(x), Box::new(Expr::Const(2.0)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Var(String),
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Exp(Box<Expr>),
    Ln(Box<Expr>),
    sin(Box<Expr>),
    cos(Box<Expr>),
    tg(Box<Expr>),
    arcsin(Box<Expr>),
    arccos(Box<Expr>),
    arctg(Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Const(val) => write!(f, "{}", val),
            Expr::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Expr::Sub(lhs, rhs) => write!(f, "({} - {})", lhs, rhs),
            Expr::Mul(lhs, rhs) => write!(f, "({} * {})", lhs, rhs),
            Expr::Div(lhs, rhs) => write!(f, "({} / {})", lhs, rhs),
            Expr::Pow(base, exp) => write!(f, "({} ^ {})", base, exp),
            Expr::Exp(expr) => write!(f, "exp({})", expr),
            Expr::Ln(expr) => write!(f, "ln({})", expr),
            Expr::sin(expr) => write!(f, "sin({})", expr),
            Expr::cos(expr) => write!(f, "cos({})", expr),
            Expr::tg(expr) => write!(f, "tg({})", expr),
            Expr::arcsin(expr) => write!(f, "arcsin({})", expr),
            Expr::arccos(expr) => write!(f, "arccos({})", expr),
            Expr::arctg(expr) => write!(f, "arctg({})", expr),
        }
    }
}

impl std::ops::Add for Expr {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Div for Expr {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        Expr::Div(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Expr::Mul(Box::new(Expr::Const(-1.0)), Box::new(self))
    }
}

impl Expr {
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    pub fn pow(self, rhs: Expr) -> Expr {
        Expr::Pow(self.boxed(), rhs.boxed())
    }
    pub fn exp(self) -> Expr {
        Expr::Exp(self.boxed())
    }
    pub fn ln(self) -> Expr {
        Expr::Ln(self.boxed())
    }

    /// Creates multiple symbolic variables from a comma-separated string.
    ///
    /// ```rust, ignore
    /// let vars = Expr::Symbols("x, y, z");
    /// assert_eq!(vars.len(), 3);
    /// ```
    pub fn Symbols(symbols: &str) -> Vec<Expr> {
        symbols
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| Expr::Var(s.to_string()))
            .collect()
    }

    /// Substitutes a variable with a constant value throughout the expression.
    pub fn set_variable(&self, var: &str, value: f64) -> Expr {
        self.map_leaves(&|leaf| match leaf {
            Expr::Var(name) if name == var => Expr::Const(value),
            other => other.clone(),
        })
    }

    /// Rebuilds the tree bottom-up, applying `leaf_fn` to variables and constants.
    fn map_leaves(&self, leaf_fn: &dyn Fn(&Expr) -> Expr) -> Expr {
        let un = |e: &Expr| Box::new(e.map_leaves(leaf_fn));
        match self {
            Expr::Var(_) | Expr::Const(_) => leaf_fn(self),
            Expr::Add(l, r) => Expr::Add(un(l), un(r)),
            Expr::Sub(l, r) => Expr::Sub(un(l), un(r)),
            Expr::Mul(l, r) => Expr::Mul(un(l), un(r)),
            Expr::Div(l, r) => Expr::Div(un(l), un(r)),
            Expr::Pow(l, r) => Expr::Pow(un(l), un(r)),
            Expr::Exp(e) => Expr::Exp(un(e)),
            Expr::Ln(e) => Expr::Ln(un(e)),
            Expr::sin(e) => Expr::sin(un(e)),
            Expr::cos(e) => Expr::cos(un(e)),
            Expr::tg(e) => Expr::tg(un(e)),
            Expr::arcsin(e) => Expr::arcsin(un(e)),
            Expr::arccos(e) => Expr::arccos(un(e)),
            Expr::arctg(e) => Expr::arctg(un(e)),
        }
    }

    /// All variable names occurring in the expression, sorted.
    pub fn all_variables(&self) -> BTreeSet<String> {
        let mut acc = BTreeSet::new();
        self.collect_variables(&mut acc);
        acc
    }

    fn collect_variables(&self, acc: &mut BTreeSet<String>) {
        match self {
            Expr::Var(name) => {
                acc.insert(name.clone());
            }
            Expr::Const(_) => {}
            Expr::Add(l, r) | Expr::Sub(l, r) | Expr::Mul(l, r) | Expr::Div(l, r) | Expr::Pow(l, r) => {
                l.collect_variables(acc);
                r.collect_variables(acc);
            }
            Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::sin(e)
            | Expr::cos(e)
            | Expr::tg(e)
            | Expr::arcsin(e)
            | Expr::arccos(e)
            | Expr::arctg(e) => e.collect_variables(acc),
        }
    }

    pub fn contains_variable(&self, var: &str) -> bool {
        self.all_variables().contains(var)
    }

    /// Analytical partial derivative with respect to `var`.
    pub fn diff(&self, var: &str) -> Expr {
        let one = || Box::new(Expr::Const(1.0));
        match self {
            Expr::Var(name) => {
                if name == var {
                    Expr::Const(1.0)
                } else {
                    Expr::Const(0.0)
                }
            }
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Add(lhs, rhs) => Expr::Add(Box::new(lhs.diff(var)), Box::new(rhs.diff(var))),
            Expr::Sub(lhs, rhs) => Expr::Sub(Box::new(lhs.diff(var)), Box::new(rhs.diff(var))),
            Expr::Mul(lhs, rhs) => Expr::Add(
                Box::new(Expr::Mul(Box::new(lhs.diff(var)), rhs.clone())),
                Box::new(Expr::Mul(lhs.clone(), Box::new(rhs.diff(var)))),
            ),
            Expr::Div(lhs, rhs) => Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(Box::new(lhs.diff(var)), rhs.clone())),
                    Box::new(Expr::Mul(Box::new(rhs.diff(var)), lhs.clone())),
                )),
                Box::new(Expr::Mul(rhs.clone(), rhs.clone())),
            ),
            Expr::Pow(base, exp) => {
                if !exp.contains_variable(var) {
                    // c * b^(c-1) * b'
                    Expr::Mul(
                        Box::new(Expr::Mul(
                            exp.clone(),
                            Box::new(Expr::Pow(
                                base.clone(),
                                Box::new(Expr::Sub(exp.clone(), one())),
                            )),
                        )),
                        Box::new(base.diff(var)),
                    )
                } else {
                    // b^e * (e' ln b + e b'/b)
                    Expr::Mul(
                        Box::new(self.clone()),
                        Box::new(Expr::Add(
                            Box::new(Expr::Mul(
                                Box::new(exp.diff(var)),
                                Box::new(Expr::Ln(base.clone())),
                            )),
                            Box::new(Expr::Div(
                                Box::new(Expr::Mul(exp.clone(), Box::new(base.diff(var)))),
                                base.clone(),
                            )),
                        )),
                    )
                }
            }
            Expr::Exp(expr) => {
                Expr::Mul(Box::new(Expr::Exp(expr.clone())), Box::new(expr.diff(var)))
            }
            Expr::Ln(expr) => Expr::Div(Box::new(expr.diff(var)), expr.clone()),
            Expr::sin(expr) => {
                Expr::Mul(Box::new(Expr::cos(expr.clone())), Box::new(expr.diff(var)))
            }
            Expr::cos(expr) => Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(Expr::sin(expr.clone())),
                )),
                Box::new(expr.diff(var)),
            ),
            Expr::tg(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Pow(
                    Box::new(Expr::cos(expr.clone())),
                    Box::new(Expr::Const(2.0)),
                )),
            ),
            Expr::arcsin(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Pow(
                    Box::new(Expr::Sub(
                        one(),
                        Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                    )),
                    Box::new(Expr::Const(0.5)),
                )),
            ),
            Expr::arccos(expr) => Expr::Div(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(expr.diff(var)),
                )),
                Box::new(Expr::Pow(
                    Box::new(Expr::Sub(
                        one(),
                        Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                    )),
                    Box::new(Expr::Const(0.5)),
                )),
            ),
            Expr::arctg(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Add(
                    one(),
                    Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                )),
            ),
        }
    }

    /// Constant folding and the neutral-element rules `x + 0`, `x * 1`, `0 * x`,
    /// `x ^ 1`, `x ^ 0`.
    pub fn simplify_(&self) -> Expr {
        match self {
            Expr::Var(_) | Expr::Const(_) => self.clone(),
            Expr::Add(l, r) => match (l.simplify_(), r.simplify_()) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
                (Expr::Const(a), e) | (e, Expr::Const(a)) if a == 0.0 => e,
                (a, b) => Expr::Add(a.boxed(), b.boxed()),
            },
            Expr::Sub(l, r) => match (l.simplify_(), r.simplify_()) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a - b),
                (e, Expr::Const(b)) if b == 0.0 => e,
                (Expr::Const(a), e) if a == 0.0 => -e,
                (a, b) => Expr::Sub(a.boxed(), b.boxed()),
            },
            Expr::Mul(l, r) => match (l.simplify_(), r.simplify_()) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
                (Expr::Const(a), _) | (_, Expr::Const(a)) if a == 0.0 => Expr::Const(0.0),
                (Expr::Const(a), e) | (e, Expr::Const(a)) if a == 1.0 => e,
                (a, b) => Expr::Mul(a.boxed(), b.boxed()),
            },
            Expr::Div(l, r) => match (l.simplify_(), r.simplify_()) {
                (Expr::Const(a), Expr::Const(b)) if b != 0.0 => Expr::Const(a / b),
                (Expr::Const(a), _) if a == 0.0 => Expr::Const(0.0),
                (e, Expr::Const(b)) if b == 1.0 => e,
                (a, b) => Expr::Div(a.boxed(), b.boxed()),
            },
            Expr::Pow(l, r) => match (l.simplify_(), r.simplify_()) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a.powf(b)),
                (_, Expr::Const(b)) if b == 0.0 => Expr::Const(1.0),
                (e, Expr::Const(b)) if b == 1.0 => e,
                (a, b) => Expr::Pow(a.boxed(), b.boxed()),
            },
            Expr::Exp(e) => match e.simplify_() {
                Expr::Const(a) => Expr::Const(a.exp()),
                inner => Expr::Exp(inner.boxed()),
            },
            Expr::Ln(e) => match e.simplify_() {
                Expr::Const(a) if a > 0.0 => Expr::Const(a.ln()),
                inner => Expr::Ln(inner.boxed()),
            },
            Expr::sin(e) => Expr::sin(e.simplify_().boxed()),
            Expr::cos(e) => Expr::cos(e.simplify_().boxed()),
            Expr::tg(e) => Expr::tg(e.simplify_().boxed()),
            Expr::arcsin(e) => Expr::arcsin(e.simplify_().boxed()),
            Expr::arccos(e) => Expr::arccos(e.simplify_().boxed()),
            Expr::arctg(e) => Expr::arctg(e.simplify_().boxed()),
        }
    }

    /// Evaluate on any [`Scalar`] type. `names[i]` is bound to `values[i]`.
    /// Integer constant exponents go through `powi` so that polynomial fields stay
    /// exact and well defined at a zero base.
    pub fn eval_generic<S: Scalar>(&self, names: &[String], values: &[S]) -> Result<S, String> {
        let ev = |e: &Expr| e.eval_generic(names, values);
        Ok(match self {
            Expr::Var(name) => match names.iter().position(|n| n == name) {
                Some(i) => values
                    .get(i)
                    .cloned()
                    .ok_or_else(|| format!("no value bound to variable {}", name))?,
                None => return Err(format!("unknown variable {}", name)),
            },
            Expr::Const(c) => S::from_f64(*c),
            Expr::Add(l, r) => ev(l)? + ev(r)?,
            Expr::Sub(l, r) => ev(l)? - ev(r)?,
            Expr::Mul(l, r) => ev(l)? * ev(r)?,
            Expr::Div(l, r) => ev(l)? / ev(r)?,
            Expr::Pow(base, exponent) => {
                let b = ev(base)?;
                match exponent.as_ref() {
                    Expr::Const(c) if c.fract() == 0.0 && c.abs() <= i32::MAX as f64 => {
                        b.powi(*c as i32)
                    }
                    Expr::Const(c) => b.powf(*c),
                    other => b.pow(&ev(other)?),
                }
            }
            Expr::Exp(e) => ev(e)?.exp(),
            Expr::Ln(e) => ev(e)?.ln(),
            Expr::sin(e) => ev(e)?.sin(),
            Expr::cos(e) => ev(e)?.cos(),
            Expr::tg(e) => ev(e)?.tan(),
            Expr::arcsin(e) => ev(e)?.asin(),
            Expr::arccos(e) => ev(e)?.acos(),
            Expr::arctg(e) => ev(e)?.atan(),
        })
    }

    /// Convert the expression into a Rust function of the listed variables.
    /// Unbound variables evaluate to NaN.
    pub fn lambdify(&self, vars: Vec<&str>) -> Box<dyn Fn(&[f64]) -> f64 + Send + Sync> {
        let expr = self.clone();
        let names: Vec<String> = vars.iter().map(|v| v.to_string()).collect();
        Box::new(move |values: &[f64]| {
            expr.eval_generic::<f64>(&names, values)
                .unwrap_or(f64::NAN)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::autodiff::dual::Dual;
    use approx::assert_relative_eq;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_symbols_and_variables() {
        let vars = Expr::Symbols("x, y, ,z");
        assert_eq!(vars.len(), 3);
        let e = vars[0].clone() * vars[1].clone() + Expr::Const(2.0);
        let all: Vec<String> = e.all_variables().into_iter().collect();
        assert_eq!(all, names(&["x", "y"]));
        assert!(!e.contains_variable("z"));
    }

    #[test]
    fn test_diff_matches_dual_numbers() {
        let x = Expr::Var("x".to_string());
        let y = Expr::Var("y".to_string());
        let e = Expr::sin(x.clone().boxed()) * y.clone().pow(Expr::Const(3.0))
            + (x.clone() / y.clone()).exp();
        let d = e.diff("x").simplify_();
        let n = names(&["x", "y"]);
        let symbolic = d.eval_generic::<f64>(&n, &[0.4, 1.3]).unwrap();
        let dual = e
            .eval_generic(&n, &[Dual::variable(0.4), Dual::from_f64(1.3)])
            .unwrap();
        assert_relative_eq!(symbolic, dual.eps, epsilon = 1e-12);
    }

    #[test]
    fn test_power_with_variable_exponent() {
        let x = Expr::Var("x".to_string());
        let e = x.clone().pow(x.clone());
        let d = e.diff("x");
        let v = d.eval_generic::<f64>(&names(&["x"]), &[2.0]).unwrap();
        assert_relative_eq!(v, 4.0 * (2.0_f64.ln() + 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_simplify_rules() {
        let x = Expr::Var("x".to_string());
        let e = (x.clone() * Expr::Const(1.0) + Expr::Const(0.0)) * (Expr::Const(2.0) + Expr::Const(3.0));
        assert_eq!(e.simplify_(), Expr::Mul(x.clone().boxed(), Expr::Const(5.0).boxed()));
        let zero = (x.clone() * Expr::Const(0.0)).simplify_();
        assert_eq!(zero, Expr::Const(0.0));
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let e = Expr::Var("q".to_string());
        assert!(e.eval_generic::<f64>(&names(&["x"]), &[1.0]).is_err());
        let f = e.lambdify(vec!["x"]);
        assert!(f(&[1.0]).is_nan());
    }

    #[test]
    fn test_set_variable() {
        let x = Expr::Var("x".to_string());
        let y = Expr::Var("y".to_string());
        let e = (x * y).set_variable("x", 3.0);
        let v = e.eval_generic::<f64>(&names(&["y"]), &[2.0]).unwrap();
        assert_eq!(v, 6.0);
    }
}
