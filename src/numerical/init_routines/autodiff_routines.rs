//! Exact initialization through automatic differentiation of the symbolic vector
//! field. Each routine wraps one [`TaylorCoefficientEngine`].
use crate::numerical::ODE_problem::ODEProblem;
use crate::numerical::autodiff::engines::{
    ForwardModeEngine, ForwardModeJvpEngine, ReverseModeEngine, TaylorCoefficientEngine, TaylorModeEngine,
};
use crate::numerical::init_routines::init_error::InitError;
use crate::numerical::init_routines::interface::{InitializationRoutine, check_dimensions, log_result};
use crate::numerical::prior_process::PriorProcess;
use crate::numerical::random_variable::RandomVariable;
use log::info;

fn initialize_with_engine(
    engine: &dyn TaylorCoefficientEngine,
    ivp: &ODEProblem,
    prior: &PriorProcess,
) -> Result<RandomVariable, InitError> {
    check_dimensions(ivp, prior)?;
    let q = prior.num_derivatives();
    if let Some(max) = engine.max_order() {
        if q > max {
            return Err(InitError::UnsupportedOrder {
                routine: engine.name(),
                requested: q,
                max,
            });
        }
    }
    let field = ivp.symbolic().ok_or_else(|| {
        InitError::AutodiffUnavailable(format!(
            "{} differentiates a symbolic vector field, the problem only provides a closure",
            engine.name()
        ))
    })?;
    info!(
        "{}: dimension {}, {} derivatives",
        engine.name(),
        prior.dimension(),
        q
    );
    let derivatives = engine.evaluate_taylor_coefficients(field, ivp.t0(), ivp.y0(), q)?;
    let (mean, cov) = prior.taylor_coefficients_to_state(&derivatives)?;
    let rv = RandomVariable::new(mean, cov)?;
    log_result(engine.name(), prior, &rv);
    Ok(rv)
}

/// Nested forward-mode Jacobians, up to 5 derivatives.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForwardMode;

impl InitializationRoutine for ForwardMode {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        initialize_with_engine(&ForwardModeEngine, ivp, prior)
    }

    fn name(&self) -> &'static str {
        ForwardModeEngine.name()
    }

    fn is_exact(&self) -> bool {
        true
    }

    fn requires_autodiff(&self) -> bool {
        true
    }
}

/// Nested Jacobian-vector products, up to 7 derivatives.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForwardModeJVP;

impl InitializationRoutine for ForwardModeJVP {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        initialize_with_engine(&ForwardModeJvpEngine, ivp, prior)
    }

    fn name(&self) -> &'static str {
        ForwardModeJvpEngine.name()
    }

    fn is_exact(&self) -> bool {
        true
    }

    fn requires_autodiff(&self) -> bool {
        true
    }
}

/// Nested reverse-mode Jacobians, up to 4 derivatives.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReverseMode;

impl InitializationRoutine for ReverseMode {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        initialize_with_engine(&ReverseModeEngine, ivp, prior)
    }

    fn name(&self) -> &'static str {
        ReverseModeEngine.name()
    }

    fn is_exact(&self) -> bool {
        true
    }

    fn requires_autodiff(&self) -> bool {
        true
    }
}

/// Truncated Taylor polynomial propagation, no order limit unless one is set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaylorMode {
    engine: TaylorModeEngine,
}

impl TaylorMode {
    pub fn new() -> Self {
        TaylorMode::default()
    }

    pub fn with_max_order(max_order: usize) -> Self {
        TaylorMode {
            engine: TaylorModeEngine {
                max_order: Some(max_order),
            },
        }
    }

    pub fn max_order(&self) -> Option<usize> {
        self.engine.max_order
    }
}

impl InitializationRoutine for TaylorMode {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        initialize_with_engine(&self.engine, ivp, prior)
    }

    fn name(&self) -> &'static str {
        self.engine.name()
    }

    fn is_exact(&self) -> bool {
        true
    }

    fn requires_autodiff(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn logistic() -> ODEProblem {
        ODEProblem::from_strings(&["y*(1-y)"], &["y"], "t", 0.0, DVector::from_vec(vec![0.5])).unwrap()
    }

    #[test]
    fn test_logistic_derivatives() {
        // y' = y(1-y), y'' = y'(1-2y), y''' = y''(1-2y) - 2y'^2 at y = 1/2
        let prior = PriorProcess::new(3, 1);
        let rv = TaylorMode::new().initialize(&logistic(), &prior).unwrap();
        assert_relative_eq!(rv.mean[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(rv.mean[1], 0.25, epsilon = 1e-12);
        assert_relative_eq!(rv.mean[2], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rv.mean[3], -0.125, epsilon = 1e-12);
        assert!(rv.is_exact());
    }

    #[test]
    fn test_ceiling_is_checked_before_work() {
        let closure_only = ODEProblem::new(|_t, y| y.clone(), 0.0, DVector::from_vec(vec![1.0]));
        let err = ReverseMode.initialize(&closure_only, &PriorProcess::new(5, 1)).unwrap_err();
        assert_eq!(
            err,
            InitError::UnsupportedOrder {
                routine: "ReverseMode",
                requested: 5,
                max: 4
            }
        );
        let err = TaylorMode::with_max_order(2)
            .initialize(&logistic(), &PriorProcess::new(3, 1))
            .unwrap_err();
        assert!(matches!(err, InitError::UnsupportedOrder { max: 2, .. }));
    }

    #[test]
    fn test_closure_problem_has_no_autodiff() {
        let closure_only = ODEProblem::new(|_t, y| y.clone(), 0.0, DVector::from_vec(vec![1.0]));
        let err = ForwardModeJVP.initialize(&closure_only, &PriorProcess::new(2, 1)).unwrap_err();
        assert!(matches!(err, InitError::AutodiffUnavailable(_)));
    }

    #[test]
    fn test_flags() {
        assert!(ForwardMode.is_exact() && ForwardMode.requires_autodiff());
        assert_eq!(ForwardModeJVP.name(), "ForwardModeJVP");
        assert_eq!(TaylorMode::new().max_order(), None);
    }

    #[test]
    fn test_taylor_mode_equality() {
        assert_eq!(TaylorMode::new(), TaylorMode::default());
        assert_eq!(TaylorMode::with_max_order(6), TaylorMode::with_max_order(6));
        assert_ne!(TaylorMode::with_max_order(6), TaylorMode::new());
        assert_ne!(TaylorMode::with_max_order(6), TaylorMode::with_max_order(7));
    }
}
