//! # Initial value problems
//!
//! [`ODEProblem`] bundles `y' = f(t, y)`, `y(t0) = y0` with the optional Jacobian
//! `∂f/∂y` and explicit time derivative `∂f/∂t`. Problems built from symbolic
//! expressions additionally carry a [`SymbolicVectorField`] which the automatic
//! differentiation routines evaluate on their own number types.
//!
//! # Example
//! ```
//! use RustedProbNum::numerical::ODE_problem::ODEProblem;
//! use nalgebra::DVector;
//! let ivp = ODEProblem::from_strings(
//!     &["y1", "-y0"],
//!     &["y0", "y1"],
//!     "t",
//!     0.0,
//!     DVector::from_vec(vec![1.0, 0.0]),
//! )
//! .unwrap();
//! assert!(ivp.has_jacobian());
//! assert_eq!(ivp.f(0.0, ivp.y0())[1], -1.0);
//! ```
use crate::numerical::init_routines::init_error::InitError;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_functions::{Jacobian, SymbolicVectorField};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::Arc;

pub type VectorField = Arc<dyn Fn(f64, &DVector<f64>) -> DVector<f64> + Send + Sync>;
pub type JacobianField = Arc<dyn Fn(f64, &DVector<f64>) -> DMatrix<f64> + Send + Sync>;

#[derive(Clone)]
pub struct ODEProblem {
    t0: f64,
    y0: DVector<f64>,
    f: VectorField,
    df: Option<JacobianField>,
    df_dt: Option<VectorField>,
    symbolic: Option<SymbolicVectorField>,
}

impl ODEProblem {
    /// Closure-defined problem; no automatic differentiation is possible on it.
    pub fn new<F>(f: F, t0: f64, y0: DVector<f64>) -> Self
    where
        F: Fn(f64, &DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        ODEProblem {
            t0,
            y0,
            f: Arc::new(f),
            df: None,
            df_dt: None,
            symbolic: None,
        }
    }

    pub fn with_jacobian<J>(mut self, df: J) -> Self
    where
        J: Fn(f64, &DVector<f64>) -> DMatrix<f64> + Send + Sync + 'static,
    {
        self.df = Some(Arc::new(df));
        self
    }

    pub fn with_time_derivative<G>(mut self, df_dt: G) -> Self
    where
        G: Fn(f64, &DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        self.df_dt = Some(Arc::new(df_dt));
        self
    }

    /// Builds `f`, `∂f/∂y` and `∂f/∂t` analytically from an equation system.
    pub fn from_symbolic(
        eq_system: Vec<Expr>,
        values: Vec<String>,
        arg: String,
        t0: f64,
        y0: DVector<f64>,
    ) -> Result<Self, InitError> {
        if eq_system.len() != values.len() {
            return Err(InitError::DimensionMismatch {
                expected: eq_system.len(),
                found: values.len(),
            });
        }
        if eq_system.len() != y0.len() {
            return Err(InitError::DimensionMismatch {
                expected: eq_system.len(),
                found: y0.len(),
            });
        }
        if !t0.is_finite() || y0.iter().any(|v| !v.is_finite()) {
            return Err(InitError::InvalidConfiguration(
                "initial time and value must be finite".to_string(),
            ));
        }
        let field = SymbolicVectorField::new(eq_system.clone(), values.clone(), arg.clone())
            .map_err(InitError::InvalidConfiguration)?;
        let mut jacobian = Jacobian::new();
        let (f, df, df_dt) = jacobian.generate_IVP_ODEsolver(eq_system, values, arg);
        Ok(ODEProblem {
            t0,
            y0,
            f: Arc::from(f),
            df: Some(Arc::from(df)),
            df_dt: Some(Arc::from(df_dt)),
            symbolic: Some(field),
        })
    }

    pub fn from_strings(
        equations: &[&str],
        values: &[&str],
        arg: &str,
        t0: f64,
        y0: DVector<f64>,
    ) -> Result<Self, InitError> {
        let eq_system = equations
            .iter()
            .map(|s| {
                Expr::try_parse_expression(s)
                    .map_err(|e| InitError::InvalidConfiguration(format!("'{}': {}", s, e)))
            })
            .collect::<Result<Vec<Expr>, InitError>>()?;
        let values = values.iter().map(|v| v.to_string()).collect();
        Self::from_symbolic(eq_system, values, arg.to_string(), t0, y0)
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn y0(&self) -> &DVector<f64> {
        &self.y0
    }

    pub fn dimension(&self) -> usize {
        self.y0.len()
    }

    pub fn f(&self, t: f64, y: &DVector<f64>) -> DVector<f64> {
        (self.f)(t, y)
    }

    pub fn df(&self, t: f64, y: &DVector<f64>) -> Option<DMatrix<f64>> {
        self.df.as_ref().map(|df| df(t, y))
    }

    pub fn df_dt(&self, t: f64, y: &DVector<f64>) -> Option<DVector<f64>> {
        self.df_dt.as_ref().map(|g| g(t, y))
    }

    pub fn has_jacobian(&self) -> bool {
        self.df.is_some()
    }

    pub fn symbolic(&self) -> Option<&SymbolicVectorField> {
        self.symbolic.as_ref()
    }

    pub fn vector_field(&self) -> VectorField {
        self.f.clone()
    }

    pub fn jacobian_field(&self) -> Option<JacobianField> {
        self.df.clone()
    }
}

impl fmt::Debug for ODEProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ODEProblem")
            .field("t0", &self.t0)
            .field("y0", &self.y0.as_slice())
            .field("has_jacobian", &self.df.is_some())
            .field("has_time_derivative", &self.df_dt.is_some())
            .field("symbolic", &self.symbolic.as_ref().map(|s| s.equations().len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_closure_problem() {
        let ivp = ODEProblem::new(|_t, y| -y.clone(), 0.5, DVector::from_vec(vec![2.0]));
        assert_eq!(ivp.dimension(), 1);
        assert_eq!(ivp.t0(), 0.5);
        assert!(!ivp.has_jacobian());
        assert!(ivp.symbolic().is_none());
        assert!(ivp.df(0.0, ivp.y0()).is_none());
        let ivp = ivp.with_jacobian(|_t, _y| DMatrix::from_element(1, 1, -1.0));
        assert_eq!(ivp.df(0.0, ivp.y0()).unwrap()[(0, 0)], -1.0);
    }

    #[test]
    fn test_symbolic_problem() {
        let ivp = ODEProblem::from_strings(
            &["-y*t"],
            &["y"],
            "t",
            1.0,
            DVector::from_vec(vec![3.0]),
        )
        .unwrap();
        assert_relative_eq!(ivp.f(1.0, ivp.y0())[0], -3.0);
        assert_relative_eq!(ivp.df(1.0, ivp.y0()).unwrap()[(0, 0)], -1.0);
        assert_relative_eq!(ivp.df_dt(1.0, ivp.y0()).unwrap()[0], -3.0);
        assert!(!ivp.symbolic().unwrap().is_autonomous());
    }

    #[test]
    fn test_symbolic_problem_validation() {
        let wrong_len = ODEProblem::from_strings(&["y"], &["y"], "t", 0.0, DVector::zeros(2));
        assert!(matches!(
            wrong_len,
            Err(InitError::DimensionMismatch { expected: 1, found: 2 })
        ));
        let unknown_var = ODEProblem::from_strings(&["z"], &["y"], "t", 0.0, DVector::zeros(1));
        assert!(matches!(unknown_var, Err(InitError::InvalidConfiguration(_))));
        let bad_syntax = ODEProblem::from_strings(&["y +"], &["y"], "t", 0.0, DVector::zeros(1));
        assert!(matches!(bad_syntax, Err(InitError::InvalidConfiguration(_))));
        let not_finite =
            ODEProblem::from_strings(&["y"], &["y"], "t", 0.0, DVector::from_vec(vec![f64::NAN]));
        assert!(matches!(not_finite, Err(InitError::InvalidConfiguration(_))));
    }
}
