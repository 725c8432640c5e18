use std::fmt;

/// Error types for initialization routines and the objects they consume
#[derive(Debug, Clone, PartialEq)]
pub enum InitError {
    DimensionMismatch { expected: usize, found: usize },
    MissingJacobian(String),
    IntegrationFailure(String),
    AutodiffUnavailable(String),
    UnsupportedOrder {
        routine: &'static str,
        requested: usize,
        max: usize,
    },
    InvalidConfiguration(String),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::DimensionMismatch { expected, found } => {
                write!(f, "Dimension mismatch: expected {}, found {}", expected, found)
            }
            InitError::MissingJacobian(msg) => write!(f, "Missing Jacobian: {}", msg),
            InitError::IntegrationFailure(msg) => write!(f, "Integration failed: {}", msg),
            InitError::AutodiffUnavailable(msg) => {
                write!(f, "Automatic differentiation unavailable: {}", msg)
            }
            InitError::UnsupportedOrder {
                routine,
                requested,
                max,
            } => write!(
                f,
                "{} supports at most {} derivatives, {} requested",
                routine, max, requested
            ),
            InitError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for InitError {}
