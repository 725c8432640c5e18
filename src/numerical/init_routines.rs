//! # Initialization routines for probabilistic ODE solvers
//!
//! An ODE filter tracks the stacked state `[y, y', ..., y^(q)]` and must start from a
//! belief over that state at `t0`. Every routine here implements
//! [`interface::InitializationRoutine`] and turns an [`ODEProblem`] and a
//! [`PriorProcess`] into a [`RandomVariable`] over the stacked state.
//!
//! - `Stack`, `StackWithJacobian`: closed-form derivatives up to order 1 or 2, the
//!   remaining blocks are zero.
//! - `NonProbabilisticFit`, `NonProbabilisticFitWithJacobian`: a least-squares
//!   polynomial fit of a classical solution (RK45, BDF or Radau).
//! - `ForwardMode`, `ForwardModeJVP`, `ReverseMode`, `TaylorMode`: exact derivatives
//!   by automatic differentiation of the symbolic vector field.
//!
//! Routines can be chained: the belief of one routine may seed the prior
//! (`PriorProcess::with_initrv`) used with another.
//!
//! ```
//! use RustedProbNum::numerical::ODE_problem::ODEProblem;
//! use RustedProbNum::numerical::prior_process::PriorProcess;
//! use RustedProbNum::numerical::init_routines::interface::InitializationRoutine;
//! use RustedProbNum::numerical::init_routines::autodiff_routines::TaylorMode;
//! use nalgebra::DVector;
//!
//! let ivp = ODEProblem::from_strings(&["-y"], &["y"], "t", 0.0, DVector::from_vec(vec![1.0])).unwrap();
//! let prior = PriorProcess::new(4, 1);
//! let rv = TaylorMode::new().initialize(&ivp, &prior).unwrap();
//! assert_eq!(rv.mean.len(), 5);
//! ```
//!
//! [`ODEProblem`]: crate::numerical::ODE_problem::ODEProblem
//! [`PriorProcess`]: crate::numerical::prior_process::PriorProcess
//! [`RandomVariable`]: crate::numerical::random_variable::RandomVariable
pub mod autodiff_routines;
pub mod config;
pub mod init_error;
pub mod interface;
pub mod non_probabilistic_fit;
pub mod stack;

#[cfg(test)]
mod init_routines_tests;
