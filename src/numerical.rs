/// initial value problem `y' = f(t, y)`, `y(t0) = y0`
pub mod ODE_problem;
/// number types and engines for automatic differentiation
pub mod autodiff;
/// integrators used for fitting initial derivatives
pub mod fit_solvers;
/// initialization routines for ODE filters
pub mod init_routines;
/// layout of the stacked derivative state
pub mod prior_process;
/// Gaussian random variables with structured covariance
pub mod random_variable;
