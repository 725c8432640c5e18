#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
//! Probabilistic numerics in Rust: initial beliefs for ODE filters computed from
//! symbolic vector fields, classical integrators and automatic differentiation, and
//! quadrature test problems against Gaussian measures.
pub mod Utils;
pub mod numerical;
pub mod problems;
pub mod symbolic;
