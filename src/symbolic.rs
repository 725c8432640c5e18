/// parse strings into symbolic expressions
pub mod parse_expr;
/// symbolic expressions: differentiation, simplification, evaluation
pub mod symbolic_engine;
/// symbolic vector fields and Jacobians, turned into Rust closures
pub mod symbolic_functions;
