//! Gaussian random variables with a tagged covariance representation.
//!
//! Exact quantities (initial values, derivatives obtained by automatic
//! differentiation) carry [`Covariance::Zero`], which stores nothing but the size.
use crate::numerical::init_routines::init_error::InitError;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, PartialEq)]
pub enum Covariance {
    Dense(DMatrix<f64>),
    Diagonal(DVector<f64>),
    /// Identically zero covariance of the given size
    Zero(usize),
}

impl Covariance {
    pub fn dim(&self) -> usize {
        match self {
            Covariance::Dense(m) => m.nrows(),
            Covariance::Diagonal(d) => d.len(),
            Covariance::Zero(n) => *n,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Covariance::Zero(_) => true,
            Covariance::Diagonal(d) => d.iter().all(|v| *v == 0.0),
            Covariance::Dense(m) => m.iter().all(|v| *v == 0.0),
        }
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            Covariance::Dense(m) => m.clone(),
            Covariance::Diagonal(d) => DMatrix::from_diagonal(d),
            Covariance::Zero(n) => DMatrix::zeros(*n, *n),
        }
    }

    pub fn diagonal(&self) -> DVector<f64> {
        match self {
            Covariance::Dense(m) => m.diagonal(),
            Covariance::Diagonal(d) => d.clone(),
            Covariance::Zero(n) => DVector::zeros(*n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomVariable {
    pub mean: DVector<f64>,
    pub cov: Covariance,
}

impl RandomVariable {
    pub fn new(mean: DVector<f64>, cov: Covariance) -> Result<Self, InitError> {
        if let Covariance::Dense(m) = &cov {
            if !m.is_square() {
                return Err(InitError::DimensionMismatch {
                    expected: m.nrows(),
                    found: m.ncols(),
                });
            }
        }
        if mean.len() != cov.dim() {
            return Err(InitError::DimensionMismatch {
                expected: mean.len(),
                found: cov.dim(),
            });
        }
        Ok(RandomVariable { mean, cov })
    }

    /// Point mass at `mean`.
    pub fn exact(mean: DVector<f64>) -> Self {
        let n = mean.len();
        RandomVariable {
            mean,
            cov: Covariance::Zero(n),
        }
    }

    /// Standard normal `N(0, I)` of dimension `n`.
    pub fn standard_normal(n: usize) -> Self {
        RandomVariable {
            mean: DVector::zeros(n),
            cov: Covariance::Diagonal(DVector::from_element(n, 1.0)),
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn is_exact(&self) -> bool {
        matches!(self.cov, Covariance::Zero(_))
    }

    pub fn cov_dense(&self) -> DMatrix<f64> {
        self.cov.to_dense()
    }

    pub fn var(&self) -> DVector<f64> {
        self.cov.diagonal()
    }

    pub fn std(&self) -> DVector<f64> {
        self.var().map(|v| v.max(0.0).sqrt())
    }

    /// Stack independent variables into one; the covariance is block diagonal and
    /// keeps the sparsest representation all parts share.
    pub fn concatenate(parts: &[RandomVariable]) -> RandomVariable {
        let n: usize = parts.iter().map(|p| p.dim()).sum();
        let mut mean = DVector::zeros(n);
        let mut offset = 0;
        for p in parts {
            mean.rows_mut(offset, p.dim()).copy_from(&p.mean);
            offset += p.dim();
        }
        let all_zero = parts.iter().all(|p| p.is_exact());
        let all_diagonal = parts
            .iter()
            .all(|p| !matches!(p.cov, Covariance::Dense(_)));
        let cov = if all_zero {
            Covariance::Zero(n)
        } else if all_diagonal {
            let mut d = DVector::zeros(n);
            let mut offset = 0;
            for p in parts {
                d.rows_mut(offset, p.dim()).copy_from(&p.cov.diagonal());
                offset += p.dim();
            }
            Covariance::Diagonal(d)
        } else {
            let mut m = DMatrix::zeros(n, n);
            let mut offset = 0;
            for p in parts {
                m.view_mut((offset, offset), (p.dim(), p.dim()))
                    .copy_from(&p.cov_dense());
                offset += p.dim();
            }
            Covariance::Dense(m)
        };
        RandomVariable { mean, cov }
    }

    /// Distribution of `A x + b`.
    pub fn affine_transform(
        &self,
        a: &DMatrix<f64>,
        b: Option<&DVector<f64>>,
    ) -> Result<RandomVariable, InitError> {
        if a.ncols() != self.dim() {
            return Err(InitError::DimensionMismatch {
                expected: self.dim(),
                found: a.ncols(),
            });
        }
        let mut mean = a * &self.mean;
        if let Some(b) = b {
            if b.len() != a.nrows() {
                return Err(InitError::DimensionMismatch {
                    expected: a.nrows(),
                    found: b.len(),
                });
            }
            mean += b;
        }
        let cov = match &self.cov {
            Covariance::Zero(_) => Covariance::Zero(a.nrows()),
            Covariance::Diagonal(d) => {
                let scaled = a * DMatrix::from_diagonal(d);
                Covariance::Dense(scaled * a.transpose())
            }
            Covariance::Dense(c) => Covariance::Dense(a * c * a.transpose()),
        };
        Ok(RandomVariable { mean, cov })
    }

    /// Marginal of the `k`-th consecutive block of length `size`.
    pub fn block(&self, k: usize, size: usize) -> Result<RandomVariable, InitError> {
        let start = k * size;
        if start + size > self.dim() {
            return Err(InitError::DimensionMismatch {
                expected: self.dim(),
                found: start + size,
            });
        }
        let mean = self.mean.rows(start, size).into_owned();
        let cov = match &self.cov {
            Covariance::Zero(_) => Covariance::Zero(size),
            Covariance::Diagonal(d) => Covariance::Diagonal(d.rows(start, size).into_owned()),
            Covariance::Dense(m) => {
                Covariance::Dense(m.view((start, start), (size, size)).into_owned())
            }
        };
        Ok(RandomVariable { mean, cov })
    }
}
