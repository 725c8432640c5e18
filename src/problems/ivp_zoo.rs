//! Initial value problems with symbolic vector fields. Every problem carries its
//! analytic Jacobian and can be initialized with any routine, the autodiff ones
//! included.
use crate::numerical::ODE_problem::ODEProblem;
use crate::numerical::init_routines::init_error::InitError;
use crate::symbolic::symbolic_engine::Expr;
use nalgebra::{DMatrix, DVector};

fn var(name: &str) -> Expr {
    Expr::Var(name.to_string())
}

fn c(value: f64) -> Expr {
    Expr::Const(value)
}

fn check_params(params: &[f64]) -> Result<(), InitError> {
    if params.iter().any(|p| !p.is_finite()) {
        return Err(InitError::InvalidConfiguration(format!(
            "problem parameters must be finite, got {:?}",
            params
        )));
    }
    Ok(())
}

fn names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{}", prefix, i)).collect()
}

/// `y_i' = -rate * y_i`
pub fn exponential_decay(rate: f64, t0: f64, y0: DVector<f64>) -> Result<ODEProblem, InitError> {
    check_params(&[rate])?;
    let values = names("y", y0.len());
    let eq_system = values.iter().map(|v| c(-rate) * var(v)).collect();
    ODEProblem::from_symbolic(eq_system, values, "t".to_string(), t0, y0)
}

/// `y' = a y (1 - y / b)` with growth rate `a` and carrying capacity `b`.
pub fn logistic(a: f64, b: f64, t0: f64, y0: f64) -> Result<ODEProblem, InitError> {
    check_params(&[a, b])?;
    if b == 0.0 {
        return Err(InitError::InvalidConfiguration(
            "carrying capacity must be nonzero".to_string(),
        ));
    }
    let y = var("y");
    let eq = c(a) * y.clone() * (c(1.0) - y / c(b));
    ODEProblem::from_symbolic(
        vec![eq],
        vec!["y".to_string()],
        "t".to_string(),
        t0,
        DVector::from_element(1, y0),
    )
}

/// Predator-prey model
/// `u' = a u - b u v`, `v' = -c v + d u v`.
pub fn lotka_volterra(params: [f64; 4], t0: f64, y0: [f64; 2]) -> Result<ODEProblem, InitError> {
    check_params(&params)?;
    let [a, b, cc, d] = params;
    let (u, v) = (var("u"), var("v"));
    let eq_system = vec![
        c(a) * u.clone() - c(b) * u.clone() * v.clone(),
        c(-cc) * v.clone() + c(d) * u * v,
    ];
    ODEProblem::from_symbolic(
        eq_system,
        vec!["u".to_string(), "v".to_string()],
        "t".to_string(),
        t0,
        DVector::from_row_slice(&y0),
    )
}

/// Van der Pol oscillator, stiff for large `mu`.
pub fn vanderpol(mu: f64, t0: f64, y0: [f64; 2]) -> Result<ODEProblem, InitError> {
    check_params(&[mu])?;
    let (x, y) = (var("x"), var("y"));
    let eq_system = vec![
        y.clone(),
        c(mu) * (c(1.0) - x.clone().pow(c(2.0))) * y - x,
    ];
    ODEProblem::from_symbolic(
        eq_system,
        vec!["x".to_string(), "y".to_string()],
        "t".to_string(),
        t0,
        DVector::from_row_slice(&y0),
    )
}

/// FitzHugh-Nagumo neuron model
/// `v' = v - v^3/3 - w + a`, `w' = (v + b - c w) / d`.
pub fn fitzhughnagumo(params: [f64; 4], t0: f64, y0: [f64; 2]) -> Result<ODEProblem, InitError> {
    check_params(&params)?;
    let [a, b, cc, d] = params;
    if d == 0.0 {
        return Err(InitError::InvalidConfiguration(
            "time scale d must be nonzero".to_string(),
        ));
    }
    let (v, w) = (var("v"), var("w"));
    let eq_system = vec![
        v.clone() - v.clone().pow(c(3.0)) / c(3.0) - w.clone() + c(a),
        (v + c(b) - c(cc) * w) / c(d),
    ];
    ODEProblem::from_symbolic(
        eq_system,
        vec!["v".to_string(), "w".to_string()],
        "t".to_string(),
        t0,
        DVector::from_row_slice(&y0),
    )
}

/// `y' = A y`. Zero entries of `A` are left out of the equations.
pub fn linear_system(a: &DMatrix<f64>, t0: f64, y0: DVector<f64>) -> Result<ODEProblem, InitError> {
    if !a.is_square() || a.nrows() != y0.len() {
        return Err(InitError::DimensionMismatch {
            expected: y0.len(),
            found: a.nrows(),
        });
    }
    check_params(a.as_slice())?;
    let values = names("y", y0.len());
    let eq_system = a
        .row_iter()
        .map(|row| {
            row.iter()
                .zip(values.iter())
                .filter(|(a_ij, _)| **a_ij != 0.0)
                .map(|(a_ij, v)| c(*a_ij) * var(v))
                .reduce(|acc, term| acc + term)
                .unwrap_or(c(0.0))
        })
        .collect();
    ODEProblem::from_symbolic(eq_system, values, "t".to_string(), t0, y0)
}
