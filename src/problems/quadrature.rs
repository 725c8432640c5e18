//! # Quadrature test problems
//!
//! Integrals with known closed-form values, either against the Lebesgue measure on
//! `[0, 1]^d` or against the Gaussian `N(mean (1, ..., 1), scale^2 I_d)` on `R^d`.
//! Integrands act on an `n x d` matrix of points and return `n` values.
use gauss_quad::GaussHermite;
use log::debug;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::{PI, SQRT_2};
use std::fmt;
use std::sync::Arc;

pub type Integrand = Arc<dyn Fn(&DMatrix<f64>) -> DVector<f64> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum QuadratureError {
    InvalidShape(String),
    InvalidValue(String),
    UnsupportedDomain(String),
}

impl fmt::Display for QuadratureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuadratureError::InvalidShape(msg) => write!(f, "Invalid shape: {}", msg),
            QuadratureError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            QuadratureError::UnsupportedDomain(msg) => write!(f, "Unsupported domain: {}", msg),
        }
    }
}

impl std::error::Error for QuadratureError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    Lebesgue,
    /// `N(mean (1, ..., 1), scale^2 I)`
    Gaussian { mean: f64, scale: f64 },
}

#[derive(Clone)]
pub struct QuadratureProblem {
    pub integrand: Integrand,
    pub lower_bd: DVector<f64>,
    pub upper_bd: DVector<f64>,
    pub measure: Measure,
    pub solution: f64,
}

impl fmt::Debug for QuadratureProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadratureProblem")
            .field("lower_bd", &self.lower_bd)
            .field("upper_bd", &self.upper_bd)
            .field("measure", &self.measure)
            .field("solution", &self.solution)
            .finish()
    }
}

impl QuadratureProblem {
    pub fn dim(&self) -> usize {
        self.lower_bd.len()
    }

    pub fn evaluate(&self, points: &DMatrix<f64>) -> Result<DVector<f64>, QuadratureError> {
        if points.ncols() != self.dim() {
            return Err(QuadratureError::InvalidShape(format!(
                "points have {} columns, the problem is {}-dimensional",
                points.ncols(),
                self.dim()
            )));
        }
        Ok((self.integrand)(points))
    }

    fn is_unit_cube(&self) -> bool {
        self.measure == Measure::Lebesgue
            && self.lower_bd.iter().all(|v| *v == 0.0)
            && self.upper_bd.iter().all(|v| *v == 1.0)
    }
}

/// `(n - 1)!!` with `(-1)!! = 1`.
fn double_factorial_minus_one(n: i32) -> f64 {
    let mut result = 1.0;
    let mut k = n - 1;
    while k > 1 {
        result *= k as f64;
        k -= 2;
    }
    result
}

/// `f(x) = sum_j prod_i a_ji x_i^b_ji` against `N(0, var^2 I_d)`. Defaults are a
/// single term with `a = 1`, `b = 1`. The solution is
/// `sum_j prod_i a_ji [b_ji even] var^b_ji (b_ji - 1)!!`.
pub fn sum_polynomials(
    dim: usize,
    a: Option<DMatrix<f64>>,
    b: Option<DMatrix<i32>>,
    var: f64,
) -> Result<QuadratureProblem, QuadratureError> {
    if dim == 0 {
        return Err(QuadratureError::InvalidShape("dimension must be positive".to_string()));
    }
    let a = a.unwrap_or_else(|| DMatrix::from_element(1, dim, 1.0));
    let b = b.unwrap_or_else(|| DMatrix::from_element(1, dim, 1));
    if a.ncols() != dim {
        return Err(QuadratureError::InvalidShape(format!(
            "a has {} columns, expected {}",
            a.ncols(),
            dim
        )));
    }
    if b.ncols() != dim {
        return Err(QuadratureError::InvalidShape(format!(
            "b has {} columns, expected {}",
            b.ncols(),
            dim
        )));
    }
    if a.nrows() != b.nrows() {
        return Err(QuadratureError::InvalidShape(format!(
            "a has {} rows but b has {}",
            a.nrows(),
            b.nrows()
        )));
    }
    if b.iter().any(|b_ji| *b_ji < 0) {
        return Err(QuadratureError::InvalidValue("orders b must be non-negative".to_string()));
    }
    if !var.is_finite() || var <= 0.0 {
        return Err(QuadratureError::InvalidValue(format!("var must be positive, got {}", var)));
    }

    let solution: f64 = (0..a.nrows())
        .map(|j| {
            (0..dim)
                .map(|i| {
                    let b_ji = b[(j, i)];
                    if b_ji % 2 == 1 {
                        0.0
                    } else {
                        a[(j, i)] * var.powi(b_ji) * double_factorial_minus_one(b_ji)
                    }
                })
                .product::<f64>()
        })
        .sum();

    let integrand: Integrand = Arc::new(move |x: &DMatrix<f64>| {
        DVector::from_fn(x.nrows(), |n, _| {
            (0..a.nrows())
                .map(|j| (0..a.ncols()).map(|i| a[(j, i)] * x[(n, i)].powi(b[(j, i)])).product::<f64>())
                .sum()
        })
    });
    Ok(QuadratureProblem {
        integrand,
        lower_bd: DVector::from_element(dim, f64::NEG_INFINITY),
        upper_bd: DVector::from_element(dim, f64::INFINITY),
        measure: Measure::Gaussian { mean: 0.0, scale: var },
        solution,
    })
}

/// Genz "continuous" family `f(x) = exp(-sum_i a_i |x_i - u_i|)` on `[0, 1]^d`.
/// Defaults are `a_i = 5`, `u_i = 0.5`.
pub fn genz_continuous(
    dim: usize,
    a: Option<DVector<f64>>,
    u: Option<DVector<f64>>,
) -> Result<QuadratureProblem, QuadratureError> {
    if dim == 0 {
        return Err(QuadratureError::InvalidShape("dimension must be positive".to_string()));
    }
    let a = a.unwrap_or_else(|| DVector::from_element(dim, 5.0));
    let u = u.unwrap_or_else(|| DVector::from_element(dim, 0.5));
    if a.len() != dim || u.len() != dim {
        return Err(QuadratureError::InvalidShape(format!(
            "a and u must have length {}, got {} and {}",
            dim,
            a.len(),
            u.len()
        )));
    }
    if a.iter().any(|a_i| !a_i.is_finite() || *a_i <= 0.0) {
        return Err(QuadratureError::InvalidValue("a must be positive".to_string()));
    }
    if u.iter().any(|u_i| !(0.0..=1.0).contains(u_i)) {
        return Err(QuadratureError::InvalidValue("u must lie in [0, 1]".to_string()));
    }

    let solution = a
        .iter()
        .zip(u.iter())
        .map(|(a_i, u_i)| (2.0 - (-a_i * u_i).exp() - (a_i * (u_i - 1.0)).exp()) / a_i)
        .product();
    let integrand: Integrand = Arc::new(move |x: &DMatrix<f64>| {
        DVector::from_fn(x.nrows(), |n, _| {
            let s: f64 = (0..a.len()).map(|i| a[i] * (x[(n, i)] - u[i]).abs()).sum();
            (-s).exp()
        })
    });
    Ok(QuadratureProblem {
        integrand,
        lower_bd: DVector::zeros(dim),
        upper_bd: DVector::from_element(dim, 1.0),
        measure: Measure::Lebesgue,
        solution,
    })
}

/// Turns a problem on `[0, 1]^d` into one against `N(mean (1, ..., 1), var^2 I_d)`
/// through `h(x) = f(Phi((x - mean) / var))`, keeping the solution.
pub fn uniform_to_gaussian_quadprob(
    problem: &QuadratureProblem,
    mean: f64,
    var: f64,
) -> Result<QuadratureProblem, QuadratureError> {
    if !problem.is_unit_cube() {
        return Err(QuadratureError::UnsupportedDomain(
            "the problem is not an integral over [0, 1]^d".to_string(),
        ));
    }
    if !mean.is_finite() {
        return Err(QuadratureError::InvalidValue(format!("mean must be finite, got {}", mean)));
    }
    if !var.is_finite() || var <= 0.0 {
        return Err(QuadratureError::InvalidValue(format!("var must be positive, got {}", var)));
    }
    let normal = Normal::new(mean, var)
        .map_err(|e| QuadratureError::InvalidValue(format!("invalid Gaussian N({}, {}^2): {}", mean, var, e)))?;
    let dim = problem.dim();
    let inner = problem.integrand.clone();
    let integrand: Integrand = Arc::new(move |x: &DMatrix<f64>| inner(&x.map(|x_i| normal.cdf(x_i))));
    Ok(QuadratureProblem {
        integrand,
        lower_bd: DVector::from_element(dim, f64::NEG_INFINITY),
        upper_bd: DVector::from_element(dim, f64::INFINITY),
        measure: Measure::Gaussian { mean, scale: var },
        solution: problem.solution,
    })
}

fn hermite_nested(quad: &GaussHermite, problem: &QuadratureProblem, mean: f64, scale: f64, prefix: Vec<f64>) -> f64 {
    let dim = problem.dim();
    if prefix.len() == dim {
        let point = DMatrix::from_row_slice(1, dim, &prefix);
        return (problem.integrand)(&point)[0];
    }
    quad.integrate(|z| {
        let mut next = prefix.clone();
        next.push(mean + SQRT_2 * scale * z);
        hermite_nested(quad, problem, mean, scale, next)
    })
}

/// Tensor-product Gauss-Hermite estimate of a Gaussian-measure problem with `d <= 3`.
pub fn gauss_hermite_reference(problem: &QuadratureProblem, degree: usize) -> Result<f64, QuadratureError> {
    let Measure::Gaussian { mean, scale } = problem.measure else {
        return Err(QuadratureError::UnsupportedDomain(
            "Gauss-Hermite needs a Gaussian measure".to_string(),
        ));
    };
    let dim = problem.dim();
    if dim == 0 || dim > 3 {
        return Err(QuadratureError::InvalidShape(format!(
            "tensor-product rule supports 1 to 3 dimensions, got {}",
            dim
        )));
    }
    let quad = GaussHermite::new(degree)
        .map_err(|e| QuadratureError::InvalidValue(format!("Failed to create Gauss-Hermite quadrature: {:?}", e)))?;
    let estimate = hermite_nested(&quad, problem, mean, scale, Vec::with_capacity(dim)) / PI.powf(dim as f64 / 2.0);
    debug!(
        "Gauss-Hermite degree {} in {} dimensions: estimate {:.6e}, solution {:.6e}",
        degree, dim, estimate, problem.solution
    );
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statrs::distribution::Continuous;

    fn identity_on_unit_interval() -> QuadratureProblem {
        QuadratureProblem {
            integrand: Arc::new(|x: &DMatrix<f64>| x.column(0).into_owned()),
            lower_bd: DVector::zeros(1),
            upper_bd: DVector::from_element(1, 1.0),
            measure: Measure::Lebesgue,
            solution: 0.5,
        }
    }

    /// Composite Simpson rule for `int h(x) N(x; mean, scale^2) dx` over `mean +- 12 scale`.
    /// `intervals` is even and the midpoint `mean` is a panel boundary.
    fn simpson_gaussian(problem: &QuadratureProblem, mean: f64, scale: f64, intervals: usize) -> f64 {
        let half_width = 12.0 * scale;
        let h = 2.0 * half_width / intervals as f64;
        let nodes = DMatrix::from_fn(intervals + 1, 1, |i, _| mean - half_width + i as f64 * h);
        let values = problem.evaluate(&nodes).unwrap();
        let density = Normal::new(mean, scale).unwrap();
        let sum: f64 = (0..=intervals)
            .map(|i| {
                let weight = if i == 0 || i == intervals {
                    1.0
                } else if i % 2 == 1 {
                    4.0
                } else {
                    2.0
                };
                weight * values[i] * density.pdf(nodes[(i, 0)])
            })
            .sum();
        sum * h / 3.0
    }

    #[test]
    fn test_gaussian_transform_resolves_tails() {
        let gaussian = uniform_to_gaussian_quadprob(&identity_on_unit_interval(), 0.0, 1.0).unwrap();
        let points = DMatrix::from_column_slice(4, 1, &[-9.0, -6.0, 0.0, 1.0]);
        let cdf = gaussian.evaluate(&points).unwrap();
        assert_relative_eq!(cdf[0], 1.1285884059538425e-19, max_relative = 1e-9);
        assert_relative_eq!(cdf[1], 9.865876450376946e-10, max_relative = 1e-9);
        assert_relative_eq!(cdf[2], 0.5, epsilon = 1e-15);
        assert_relative_eq!(cdf[3], 0.8413447460685429, epsilon = 1e-14);

        let shifted = uniform_to_gaussian_quadprob(&identity_on_unit_interval(), 2.0, 0.5).unwrap();
        let at_one = shifted.evaluate(&DMatrix::from_element(1, 1, 1.0)).unwrap();
        assert_relative_eq!(at_one[0], 0.022750131948179195, max_relative = 1e-12);
    }

    #[test]
    fn test_sum_polynomials_default_and_custom() {
        let default = sum_polynomials(2, None, None, 1.0).unwrap();
        assert_eq!(default.solution, 0.0);
        let points = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, -1.0, 3.0]);
        assert_eq!(default.evaluate(&points).unwrap().as_slice(), &[2.0, -3.0]);

        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.5, 2.0]);
        let b = DMatrix::from_row_slice(2, 2, &[2, 0, 4, 2]);
        let problem = sum_polynomials(2, Some(a), Some(b), 1.0).unwrap();
        assert_relative_eq!(problem.solution, 4.0);
        assert_relative_eq!(gauss_hermite_reference(&problem, 10).unwrap(), 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_sum_polynomials_with_scale() {
        let b = DMatrix::from_row_slice(1, 1, &[4]);
        let problem = sum_polynomials(1, None, Some(b), 2.0).unwrap();
        // E[x^4] = 3 var^4
        assert_relative_eq!(problem.solution, 48.0);
        assert_relative_eq!(gauss_hermite_reference(&problem, 8).unwrap(), 48.0, max_relative = 1e-12);
    }

    #[test]
    fn test_genz_continuous() {
        let problem = genz_continuous(1, None, None).unwrap();
        assert_relative_eq!(problem.solution, (2.0 - 2.0 * (-2.5_f64).exp()) / 5.0, epsilon = 1e-15);
        let value = problem.evaluate(&DMatrix::from_element(1, 1, 0.5)).unwrap();
        assert_eq!(value[0], 1.0);
        let two = genz_continuous(2, None, None).unwrap();
        assert_relative_eq!(two.solution, problem.solution * problem.solution, epsilon = 1e-15);
    }

    #[test]
    fn test_uniform_to_gaussian() {
        let genz = genz_continuous(1, None, None).unwrap();
        let gaussian = uniform_to_gaussian_quadprob(&genz, 0.0, 1.0).unwrap();
        assert_eq!(gaussian.solution, genz.solution);
        assert!(gaussian.lower_bd[0].is_infinite());
        // kink at Phi(x) = 0.5 sits on a panel boundary
        let reference = simpson_gaussian(&gaussian, 0.0, 1.0, 4000);
        assert_relative_eq!(reference, genz.solution, max_relative = 1e-6);

        let shifted = uniform_to_gaussian_quadprob(&genz, 1.5, 0.5).unwrap();
        let at_mean = shifted.evaluate(&DMatrix::from_element(1, 1, 1.5)).unwrap();
        assert_relative_eq!(at_mean[0], 1.0, epsilon = 1e-15);
        assert_relative_eq!(simpson_gaussian(&shifted, 1.5, 0.5, 4000), genz.solution, max_relative = 1e-6);
    }

    #[test]
    fn test_gauss_hermite_on_kinked_integrand() {
        let genz = genz_continuous(1, None, None).unwrap();
        let gaussian = uniform_to_gaussian_quadprob(&genz, 0.0, 1.0).unwrap();
        // the kink only allows slow convergence; degree 64 is within 3%
        let estimate = gauss_hermite_reference(&gaussian, 64).unwrap();
        assert_relative_eq!(estimate, genz.solution, max_relative = 5e-2);
        let finer = gauss_hermite_reference(&gaussian, 200).unwrap();
        assert!((finer - genz.solution).abs() < (estimate - genz.solution).abs());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            sum_polynomials(2, Some(DMatrix::from_element(1, 3, 1.0)), None, 1.0),
            Err(QuadratureError::InvalidShape(_))
        ));
        assert!(matches!(
            sum_polynomials(1, None, Some(DMatrix::from_element(1, 1, -1)), 1.0),
            Err(QuadratureError::InvalidValue(_))
        ));
        assert!(genz_continuous(1, None, Some(DVector::from_element(1, 1.5))).is_err());
        assert!(genz_continuous(2, Some(DVector::from_element(1, 5.0)), None).is_err());
        let gaussian = sum_polynomials(1, None, None, 1.0).unwrap();
        assert!(matches!(
            uniform_to_gaussian_quadprob(&gaussian, 0.0, 1.0),
            Err(QuadratureError::UnsupportedDomain(_))
        ));
        let genz = genz_continuous(4, None, None).unwrap();
        assert!(uniform_to_gaussian_quadprob(&genz, 0.0, -1.0).is_err());
        assert!(gauss_hermite_reference(&genz, 5).is_err());
        let gaussian4 = uniform_to_gaussian_quadprob(&genz, 0.0, 1.0).unwrap();
        assert!(gauss_hermite_reference(&gaussian4, 5).is_err());
        assert!(gaussian4.evaluate(&DMatrix::zeros(1, 2)).is_err());
    }
}
