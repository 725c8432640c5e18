//! Initialization by stacking the derivatives available in closed form:
//! `y0`, `f(t0, y0)` and, given the Jacobian, `y'' = J f + ∂f/∂t`.
//! Blocks of higher order are set to zero.
use crate::numerical::ODE_problem::ODEProblem;
use crate::numerical::init_routines::init_error::InitError;
use crate::numerical::init_routines::interface::{InitializationRoutine, check_dimensions, log_result};
use crate::numerical::prior_process::PriorProcess;
use crate::numerical::random_variable::{Covariance, RandomVariable};
use log::info;
use nalgebra::DVector;

fn validate_scale(scale_cholesky: f64) -> Result<f64, InitError> {
    if !scale_cholesky.is_finite() || scale_cholesky <= 0.0 {
        return Err(InitError::InvalidConfiguration(format!(
            "scale_cholesky must be positive and finite, got {}",
            scale_cholesky
        )));
    }
    Ok(scale_cholesky)
}

/// Fills the unknown orders with zeros. Without `scale_cholesky` the covariance is
/// the exact marker even for those unknown blocks; with it they get variance
/// `scale_cholesky^2`.
fn stacked_random_variable(
    prior: &PriorProcess,
    known: Vec<DVector<f64>>,
    scale_cholesky: Option<f64>,
) -> Result<RandomVariable, InitError> {
    let q = prior.num_derivatives();
    let d = prior.dimension();
    let n_known = known.len().min(q + 1);
    let mut blocks: Vec<DVector<f64>> = known.into_iter().take(q + 1).collect();
    blocks.resize(q + 1, DVector::zeros(d));
    let (mean, exact_cov) = prior.taylor_coefficients_to_state(&blocks)?;
    let cov = match scale_cholesky {
        None => exact_cov,
        Some(s) => {
            let mut var = DVector::zeros(prior.state_dimension());
            for k in n_known..=q {
                for i in 0..d {
                    var[prior.state_index(i, k)] = s * s;
                }
            }
            Covariance::Diagonal(var)
        }
    };
    RandomVariable::new(mean, cov)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stack {
    scale_cholesky: Option<f64>,
}

impl Stack {
    pub fn new() -> Self {
        Stack {
            scale_cholesky: None,
        }
    }

    pub fn with_scale_cholesky(scale_cholesky: f64) -> Result<Self, InitError> {
        Ok(Stack {
            scale_cholesky: Some(validate_scale(scale_cholesky)?),
        })
    }

    pub fn scale_cholesky(&self) -> Option<f64> {
        self.scale_cholesky
    }
}

impl InitializationRoutine for Stack {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        check_dimensions(ivp, prior)?;
        info!(
            "{}: dimension {}, {} derivatives",
            self.name(),
            prior.dimension(),
            prior.num_derivatives()
        );
        let y0 = ivp.y0().clone();
        let f0 = ivp.f(ivp.t0(), &y0);
        let rv = stacked_random_variable(prior, vec![y0, f0], self.scale_cholesky)?;
        log_result(self.name(), prior, &rv);
        Ok(rv)
    }

    fn name(&self) -> &'static str {
        "Stack"
    }

    fn is_exact(&self) -> bool {
        false
    }

    fn requires_autodiff(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StackWithJacobian {
    scale_cholesky: Option<f64>,
}

impl StackWithJacobian {
    pub fn new() -> Self {
        StackWithJacobian {
            scale_cholesky: None,
        }
    }

    pub fn with_scale_cholesky(scale_cholesky: f64) -> Result<Self, InitError> {
        Ok(StackWithJacobian {
            scale_cholesky: Some(validate_scale(scale_cholesky)?),
        })
    }

    pub fn scale_cholesky(&self) -> Option<f64> {
        self.scale_cholesky
    }
}

impl InitializationRoutine for StackWithJacobian {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        check_dimensions(ivp, prior)?;
        info!(
            "{}: dimension {}, {} derivatives",
            self.name(),
            prior.dimension(),
            prior.num_derivatives()
        );
        let t0 = ivp.t0();
        let y0 = ivp.y0().clone();
        let df0 = ivp.df(t0, &y0).ok_or_else(|| {
            InitError::MissingJacobian(format!("{} needs the Jacobian of the vector field", self.name()))
        })?;
        let f0 = ivp.f(t0, &y0);
        let mut ddy0 = &df0 * &f0;
        if let Some(dfdt0) = ivp.df_dt(t0, &y0) {
            ddy0 += dfdt0;
        }
        let rv = stacked_random_variable(prior, vec![y0, f0, ddy0], self.scale_cholesky)?;
        log_result(self.name(), prior, &rv);
        Ok(rv)
    }

    fn name(&self) -> &'static str {
        "StackWithJacobian"
    }

    fn is_exact(&self) -> bool {
        false
    }

    fn requires_autodiff(&self) -> bool {
        false
    }
}
