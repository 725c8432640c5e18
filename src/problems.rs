/// initial value problems with symbolic vector fields
pub mod ivp_zoo;
/// integration problems against Gaussian measures
pub mod quadrature;
