//! Classical adaptive integrators sampled by the NonProbabilisticFit routines.
/// variable-order variable-step backward differentiation formulas
pub mod BDF;
/// explicit Runge-Kutta 5(4)
pub mod DormandPrince;
/// implicit Runge-Kutta Radau IIA of order 5
pub mod Radau;
/// step control, finite-difference Jacobians and the point-to-point driver
pub mod common;
