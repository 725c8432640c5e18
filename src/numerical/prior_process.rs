//! Layout of the stacked state `[y, y', ..., y^(q)]` tracked by an ODE filter.
use crate::numerical::init_routines::init_error::InitError;
use crate::numerical::random_variable::{Covariance, RandomVariable};
use nalgebra::{DMatrix, DVector};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum StateOrdering {
    /// `[y_1 .. y_d, y_1' .. y_d', ...]`
    #[default]
    Derivative,
    /// `[y_1, y_1', .., y_1^(q), y_2, ...]`
    Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorProcess {
    num_derivatives: usize,
    dimension: usize,
    ordering: StateOrdering,
    initrv: Option<RandomVariable>,
}

impl PriorProcess {
    pub fn new(num_derivatives: usize, dimension: usize) -> Self {
        PriorProcess {
            num_derivatives,
            dimension,
            ordering: StateOrdering::default(),
            initrv: None,
        }
    }

    pub fn with_ordering(mut self, ordering: StateOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Seed belief over the stacked state, e.g. the output of another routine.
    pub fn with_initrv(mut self, rv: RandomVariable) -> Result<Self, InitError> {
        if rv.dim() != self.state_dimension() {
            return Err(InitError::DimensionMismatch {
                expected: self.state_dimension(),
                found: rv.dim(),
            });
        }
        self.initrv = Some(rv);
        Ok(self)
    }

    pub fn num_derivatives(&self) -> usize {
        self.num_derivatives
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn ordering(&self) -> StateOrdering {
        self.ordering
    }

    pub fn state_dimension(&self) -> usize {
        (self.num_derivatives + 1) * self.dimension
    }

    /// Seed belief, `N(0, I)` unless one was attached.
    pub fn initrv(&self) -> RandomVariable {
        match &self.initrv {
            Some(rv) => rv.clone(),
            None => RandomVariable::standard_normal(self.state_dimension()),
        }
    }

    pub fn has_initrv(&self) -> bool {
        self.initrv.is_some()
    }

    /// Position of derivative `k` of coordinate `i` in the state vector.
    pub fn state_index(&self, coordinate: usize, k: usize) -> usize {
        match self.ordering {
            StateOrdering::Derivative => k * self.dimension + coordinate,
            StateOrdering::Coordinate => coordinate * (self.num_derivatives + 1) + k,
        }
    }

    /// Stacks derivative blocks `coeffs[k] = y^(k)(t0)` into a state mean with exact
    /// covariance.
    pub fn taylor_coefficients_to_state(
        &self,
        coeffs: &[DVector<f64>],
    ) -> Result<(DVector<f64>, Covariance), InitError> {
        if coeffs.len() != self.num_derivatives + 1 {
            return Err(InitError::DimensionMismatch {
                expected: self.num_derivatives + 1,
                found: coeffs.len(),
            });
        }
        let mut mean = DVector::zeros(self.state_dimension());
        for (k, block) in coeffs.iter().enumerate() {
            if block.len() != self.dimension {
                return Err(InitError::DimensionMismatch {
                    expected: self.dimension,
                    found: block.len(),
                });
            }
            for (i, value) in block.iter().enumerate() {
                mean[self.state_index(i, k)] = *value;
            }
        }
        Ok((mean, Covariance::Zero(self.state_dimension())))
    }

    /// Inverse of [`PriorProcess::taylor_coefficients_to_state`].
    pub fn state_to_derivatives(&self, mean: &DVector<f64>) -> Result<Vec<DVector<f64>>, InitError> {
        if mean.len() != self.state_dimension() {
            return Err(InitError::DimensionMismatch {
                expected: self.state_dimension(),
                found: mean.len(),
            });
        }
        Ok((0..=self.num_derivatives)
            .map(|k| DVector::from_fn(self.dimension, |i, _| mean[self.state_index(i, k)]))
            .collect())
    }

    /// `d x D` matrix selecting derivative `k` from the state.
    pub fn projection(&self, k: usize) -> Result<DMatrix<f64>, InitError> {
        if k > self.num_derivatives {
            return Err(InitError::UnsupportedOrder {
                routine: "PriorProcess::projection",
                requested: k,
                max: self.num_derivatives,
            });
        }
        let mut p = DMatrix::zeros(self.dimension, self.state_dimension());
        for i in 0..self.dimension {
            p[(i, self.state_index(i, k))] = 1.0;
        }
        Ok(p)
    }
}
