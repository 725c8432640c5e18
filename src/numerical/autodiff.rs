//! Number types for automatic differentiation and the engines built on them.
/// forward-mode dual numbers
pub mod dual;
/// engines computing `y^(k)(t0)` of an ODE solution
pub mod engines;
/// tape-based reverse mode
pub mod reverse;
/// arithmetic and elementary functions shared by all number types
pub mod scalar;
/// truncated Taylor polynomials
pub mod taylor;
