use crate::numerical::ODE_problem::ODEProblem;
use crate::numerical::init_routines::init_error::InitError;
use crate::numerical::prior_process::PriorProcess;
use crate::numerical::random_variable::RandomVariable;
use log::debug;
use tabled::{builder::Builder, settings::Style};

/// Computes the belief over `[y(t0), y'(t0), ..., y^(q)(t0)]` an ODE filter starts
/// from. Implementations hold configuration only and are pure functions of their
/// inputs.
pub trait InitializationRoutine: Send + Sync {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError>;

    fn name(&self) -> &'static str;

    /// True when every returned derivative is exact up to rounding.
    fn is_exact(&self) -> bool;

    fn requires_autodiff(&self) -> bool;
}

pub fn check_dimensions(ivp: &ODEProblem, prior: &PriorProcess) -> Result<(), InitError> {
    if ivp.dimension() != prior.dimension() {
        return Err(InitError::DimensionMismatch {
            expected: prior.dimension(),
            found: ivp.dimension(),
        });
    }
    Ok(())
}

/// Table of the derivative blocks of a stacked state, one row per coordinate.
pub fn derivative_table(prior: &PriorProcess, rv: &RandomVariable) -> Result<String, InitError> {
    let blocks = prior.state_to_derivatives(&rv.mean)?;
    let mut header = vec!["component".to_string()];
    header.extend((0..blocks.len()).map(|k| format!("d^{}y/dt^{}", k, k)));
    let mut rows: Vec<Vec<String>> = vec![header];
    for i in 0..prior.dimension() {
        let mut row = vec![format!("y{}", i)];
        row.extend(blocks.iter().map(|b| format!("{:.6e}", b[i])));
        rows.push(row);
    }
    let mut table = Builder::from(rows).build();
    table.with(Style::modern_rounded());
    Ok(table.to_string())
}

/// Debug-logs the result of a routine.
pub(crate) fn log_result(routine: &str, prior: &PriorProcess, rv: &RandomVariable) {
    if log::log_enabled!(log::Level::Debug) {
        match derivative_table(prior, rv) {
            Ok(table) => debug!("\n {} initial derivatives \n{}", routine, table),
            Err(e) => debug!("{}: derivative table unavailable: {}", routine, e),
        }
    }
}
