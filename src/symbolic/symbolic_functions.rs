//! # Symbolic Jacobians and vector fields
//!
//! [`Jacobian`] turns a system of symbolic right-hand sides into the closures an
//! initial value problem needs: the vector field `f(t, y)`, its Jacobian `∂f/∂y` and
//! the explicit time derivative `∂f/∂t`, all computed analytically and then
//! lambdified.
//!
//! [`SymbolicVectorField`] keeps the expression system itself so that it can be
//! re-evaluated on automatic-differentiation number types.
use crate::numerical::autodiff::scalar::Scalar;
use crate::symbolic::symbolic_engine::Expr;
use log::debug;
use nalgebra::{DMatrix, DVector};

pub type BoxedVectorFn = Box<dyn Fn(f64, &DVector<f64>) -> DVector<f64> + Send + Sync>;
pub type BoxedMatrixFn = Box<dyn Fn(f64, &DVector<f64>) -> DMatrix<f64> + Send + Sync>;

/// Expression system `y' = f(arg, values)` that can be evaluated on any [`Scalar`].
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolicVectorField {
    equations: Vec<Expr>,
    values: Vec<String>,
    arg: String,
    /// `[arg, values...]`, the binding order used for evaluation
    names: Vec<String>,
}

impl SymbolicVectorField {
    /// Checks that every variable used by the equations is either the argument or
    /// one of the unknowns.
    pub fn new(equations: Vec<Expr>, values: Vec<String>, arg: String) -> Result<Self, String> {
        if equations.len() != values.len() {
            return Err(format!(
                "{} equations given for {} unknowns",
                equations.len(),
                values.len()
            ));
        }
        if values.iter().any(|v| v == &arg) {
            return Err(format!("argument '{}' is also listed as an unknown", arg));
        }
        for (i, eq) in equations.iter().enumerate() {
            for var in eq.all_variables() {
                if var != arg && !values.contains(&var) {
                    return Err(format!("equation {} uses unknown variable '{}'", i, var));
                }
            }
        }
        let mut names = Vec::with_capacity(values.len() + 1);
        names.push(arg.clone());
        names.extend(values.iter().cloned());
        Ok(SymbolicVectorField {
            equations,
            values,
            arg,
            names,
        })
    }

    pub fn dimension(&self) -> usize {
        self.equations.len()
    }

    pub fn equations(&self) -> &[Expr] {
        &self.equations
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn arg(&self) -> &str {
        &self.arg
    }

    /// True when no equation depends explicitly on the argument.
    pub fn is_autonomous(&self) -> bool {
        !self.equations.iter().any(|e| e.contains_variable(&self.arg))
    }

    /// Evaluate `f(t, y)` on any number type.
    pub fn eval<S: Scalar>(&self, t: S, y: &[S]) -> Result<Vec<S>, String> {
        if y.len() != self.values.len() {
            return Err(format!(
                "state of length {} passed to a field of dimension {}",
                y.len(),
                self.values.len()
            ));
        }
        let mut bound = Vec::with_capacity(y.len() + 1);
        bound.push(t);
        bound.extend(y.iter().cloned());
        self.equations
            .iter()
            .map(|eq| eq.eval_generic(&self.names, &bound))
            .collect()
    }
}

pub struct Jacobian {
    pub vector_of_functions: Vec<Expr>,
    pub vector_of_variables: Vec<Expr>,
    pub variable_string: Vec<String>,
    pub symbolic_jacobian: Vec<Vec<Expr>>,
}

impl Jacobian {
    pub fn new() -> Self {
        Jacobian {
            vector_of_functions: Vec::new(),
            vector_of_variables: Vec::new(),
            variable_string: Vec::new(),
            symbolic_jacobian: Vec::new(),
        }
    }

    pub fn from_vectors(vector_of_functions: Vec<Expr>, variables: Vec<String>) -> Self {
        let mut jac = Jacobian::new();
        jac.set_vector_of_functions(vector_of_functions);
        jac.set_variables(variables);
        jac
    }

    pub fn set_vector_of_functions(&mut self, value: Vec<Expr>) {
        self.vector_of_functions = value;
    }

    pub fn set_variables(&mut self, varvec: Vec<String>) {
        self.vector_of_variables = varvec.iter().map(|v| Expr::Var(v.clone())).collect();
        self.variable_string = varvec;
    }

    /// `J[i][j] = ∂f_i/∂x_j`, simplified.
    pub fn calc_jacobian(&mut self) {
        self.symbolic_jacobian = self
            .vector_of_functions
            .iter()
            .map(|f| {
                self.variable_string
                    .iter()
                    .map(|var| f.diff(var).simplify_())
                    .collect()
            })
            .collect();
        debug!(
            "symbolic Jacobian of size {}x{} created",
            self.vector_of_functions.len(),
            self.variable_string.len()
        );
    }

    pub fn readable_jacobian(&self) -> Vec<Vec<String>> {
        self.symbolic_jacobian
            .iter()
            .map(|row| row.iter().map(|e| e.to_string()).collect())
            .collect()
    }

    fn names(arg: &str, values: &[String]) -> Vec<String> {
        let mut names = vec![arg.to_string()];
        names.extend(values.iter().cloned());
        names
    }

    fn eval_at(expr: &Expr, names: &[String], t: f64, y: &DVector<f64>) -> f64 {
        let mut bound = Vec::with_capacity(y.len() + 1);
        bound.push(t);
        bound.extend(y.iter().copied());
        expr.eval_generic::<f64>(names, &bound).unwrap_or(f64::NAN)
    }

    /// `f(t, y)` as a closure.
    pub fn vector_funvector_IVP_DVector(&self, arg: &str, values: &[String]) -> BoxedVectorFn {
        let functions = self.vector_of_functions.clone();
        let names = Self::names(arg, values);
        Box::new(move |t: f64, y: &DVector<f64>| {
            DVector::from_iterator(
                functions.len(),
                functions.iter().map(|f| Self::eval_at(f, &names, t, y)),
            )
        })
    }

    /// `∂f/∂y (t, y)` as a closure; call [`Jacobian::calc_jacobian`] first.
    pub fn jacobian_generate_IVP_DMatrix(&self, arg: &str, values: &[String]) -> BoxedMatrixFn {
        let jac = self.symbolic_jacobian.clone();
        let n_rows = jac.len();
        let n_cols = self.variable_string.len();
        let names = Self::names(arg, values);
        Box::new(move |t: f64, y: &DVector<f64>| {
            DMatrix::from_fn(n_rows, n_cols, |i, j| Self::eval_at(&jac[i][j], &names, t, y))
        })
    }

    /// `∂f/∂t (t, y)` as a closure.
    pub fn time_derivative_IVP_DVector(&self, arg: &str, values: &[String]) -> BoxedVectorFn {
        let dfdt: Vec<Expr> = self
            .vector_of_functions
            .iter()
            .map(|f| f.diff(arg).simplify_())
            .collect();
        let names = Self::names(arg, values);
        Box::new(move |t: f64, y: &DVector<f64>| {
            DVector::from_iterator(dfdt.len(), dfdt.iter().map(|f| Self::eval_at(f, &names, t, y)))
        })
    }

    /// Everything an IVP needs: `(f, ∂f/∂y, ∂f/∂t)`.
    pub fn generate_IVP_ODEsolver(
        &mut self,
        eq_system: Vec<Expr>,
        values: Vec<String>,
        arg: String,
    ) -> (BoxedVectorFn, BoxedMatrixFn, BoxedVectorFn) {
        self.set_vector_of_functions(eq_system);
        self.set_variables(values.clone());
        self.calc_jacobian();
        let fun = self.vector_funvector_IVP_DVector(&arg, &values);
        let jac = self.jacobian_generate_IVP_DMatrix(&arg, &values);
        let dfdt = self.time_derivative_IVP_DVector(&arg, &values);
        (fun, jac, dfdt)
    }
}

impl Default for Jacobian {
    fn default() -> Self {
        Self::new()
    }
}
