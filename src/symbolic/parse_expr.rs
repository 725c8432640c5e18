//! a module turns a String expression into a symbolic expression
//!# Example
//! ```
//! use RustedProbNum::symbolic::symbolic_engine::Expr;
//! let parsed_expression = Expr::parse_expression("x^2 * ln(x + y) - 3e-1*y");
//! let f = parsed_expression.lambdify(vec!["x", "y"]);
//! assert!((f(&[1.0, 1.0]) - (2.0_f64.ln() - 0.3)).abs() < 1e-12);
//! ```
use crate::symbolic::symbolic_engine::Expr;

//
// grammar (lowest to highest precedence):
//   sum     := product (('+' | '-') product)*
//   product := unary (('*' | '/') unary)*
//   unary   := '-' unary | power
//   power   := atom ('^' unary)?          right associative, -x^2 == -(x^2)
//   atom    := number | name | name '(' sum ')' | '(' sum ')'

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // exponent part: 1e-3, 2.5E+4
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| format!("invalid number literal '{}'", literal))?;
            tokens.push(Token::Num(value));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if "+-*/^".contains(c) {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else {
            return Err(format!("unexpected character '{}' at position {}", c, i));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.product()?;
        while let Some(Token::Op(op)) = self.peek().cloned() {
            if op != '+' && op != '-' {
                break;
            }
            self.pos += 1;
            let rhs = self.product()?;
            lhs = if op == '+' {
                Expr::Add(lhs.boxed(), rhs.boxed())
            } else {
                Expr::Sub(lhs.boxed(), rhs.boxed())
            };
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op)) = self.peek().cloned() {
            if op != '*' && op != '/' {
                break;
            }
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = if op == '*' {
                Expr::Mul(lhs.boxed(), rhs.boxed())
            } else {
                Expr::Div(lhs.boxed(), rhs.boxed())
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(match inner {
                Expr::Const(c) => Expr::Const(-c),
                other => Expr::Mul(Box::new(Expr::Const(-1.0)), other.boxed()),
            });
        }
        if let Some(Token::Op('+')) = self.peek() {
            self.pos += 1;
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Pow(base.boxed(), exponent.boxed()));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::Const(v)),
            Some(Token::LParen) => {
                let inner = self.sum()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let arg = self.sum()?;
                    self.expect_rparen()?;
                    apply_function(&name, arg)
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(other) => Err(format!("unexpected token {:?}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), String> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err("missing closing bracket".to_string()),
        }
    }
}

fn apply_function(name: &str, arg: Expr) -> Result<Expr, String> {
    let a = arg.boxed();
    Ok(match name {
        "exp" => Expr::Exp(a),
        "ln" | "log" => Expr::Ln(a),
        "sqrt" => Expr::Pow(a, Box::new(Expr::Const(0.5))),
        "sin" => Expr::sin(a),
        "cos" => Expr::cos(a),
        "tg" | "tan" => Expr::tg(a),
        "arcsin" | "asin" => Expr::arcsin(a),
        "arccos" | "acos" => Expr::arccos(a),
        "arctg" | "atan" => Expr::arctg(a),
        _ => return Err(format!("unknown function '{}'", name)),
    })
}

pub fn parse_expression_func(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.sum()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "unexpected trailing input starting at token {:?}",
            parser.tokens[parser.pos]
        ));
    }
    Ok(expr)
}

impl Expr {
    /// Fallible parsing of a string into a symbolic expression.
    pub fn try_parse_expression(input: &str) -> Result<Expr, String> {
        parse_expression_func(input)
    }

    /// Parses a string into a symbolic expression; an unparsable string yields NaN
    /// constant so that the failure shows up on evaluation. Prefer
    /// [`Expr::try_parse_expression`] where the error matters.
    pub fn parse_expression(input: &str) -> Expr {
        match parse_expression_func(input) {
            Ok(expr) => expr,
            Err(e) => {
                log::error!("failed to parse '{}': {}", input, e);
                Expr::Const(f64::NAN)
            }
        }
    }

    /// Parses a list of strings into symbolic expressions.
    pub fn parse_vector_expression(input: Vec<&str>) -> Vec<Expr> {
        input.into_iter().map(Expr::parse_expression).collect()
    }
}
