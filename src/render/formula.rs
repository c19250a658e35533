//! Calculated field formulas.
//!
//! The built-in evaluator accepts a small arithmetic language:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := NUMBER | REFERENCE | '(' expr ')'
//! ```
//!
//! `REFERENCE` is an identifier with optional `.` segments, looked up in the
//! render context. Referenced values must be numbers or numeric strings.
//! Formulas are capped at [`MAX_FORMULA_LENGTH`] characters and
//! [`MAX_NESTING_DEPTH`] levels of grouping or negation.

use thiserror::Error;

use crate::template::context::lookup;
use crate::template::RenderContext;

pub const MAX_FORMULA_LENGTH: usize = 1024;
pub const MAX_NESTING_DEPTH: usize = 64;

/// Formula parse and evaluation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    #[error("Formula is empty")]
    Empty,

    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("Unexpected end of formula")]
    UnexpectedEnd,

    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("Unknown reference '{0}'")]
    MissingReference(String),

    #[error("Reference '{0}' is not numeric")]
    NotNumeric(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Formula exceeds {max} characters")]
    TooLong { max: usize },

    #[error("Formula nests deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("Result is not a finite number")]
    NotFinite,
}

/// Computes calculated field values
pub trait FormulaEvaluator: Send + Sync {
    /// Check that a formula parses, without evaluating it
    fn check(&self, formula: &str) -> Result<(), FormulaError>;

    /// Evaluate a formula against a render context
    fn evaluate(&self, formula: &str, context: &RenderContext) -> Result<String, FormulaError>;
}

/// Arithmetic over context references
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticFormulaEvaluator;

impl FormulaEvaluator for ArithmeticFormulaEvaluator {
    fn check(&self, formula: &str) -> Result<(), FormulaError> {
        Parser::parse(formula).map(|_| ())
    }

    fn evaluate(&self, formula: &str, context: &RenderContext) -> Result<String, FormulaError> {
        let expr = Parser::parse(formula)?;
        format_number(expr.eval(context)?)
    }
}

/// Integral values print without a fractional part
fn format_number(value: f64) -> Result<String, FormulaError> {
    if !value.is_finite() {
        return Err(FormulaError::NotFinite);
    }
    Ok(if value.fract() == 0.0 && value.abs() < 1e15 {
        // -0 prints as 0
        (value as i64).to_string()
    } else {
        value.to_string()
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference(String),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Reference(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LeftParen => "(".to_string(),
            Token::RightParen => ")".to_string(),
        }
    }
}

fn tokenize(formula: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = formula.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LeftParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if name.ends_with('.') || name.contains("..") {
                    return Err(FormulaError::UnexpectedToken(name));
                }
                tokens.push(Token::Reference(name));
            }
            _ => return Err(FormulaError::UnexpectedChar { ch, position: i }),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug)]
enum Expr {
    Number(f64),
    Reference(String),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, context: &RenderContext) -> Result<f64, FormulaError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Reference(name) => resolve_reference(name, context),
            Expr::Negate(inner) => Ok(-inner.eval(context)?),
            Expr::Binary(op, left, right) => {
                let left = left.eval(context)?;
                let right = right.eval(context)?;
                match op {
                    BinaryOp::Add => Ok(left + right),
                    BinaryOp::Sub => Ok(left - right),
                    BinaryOp::Mul => Ok(left * right),
                    BinaryOp::Div if right == 0.0 => Err(FormulaError::DivisionByZero),
                    BinaryOp::Div => Ok(left / right),
                }
            }
        }
    }
}

fn resolve_reference(name: &str, context: &RenderContext) -> Result<f64, FormulaError> {
    let value =
        lookup(context, name).ok_or_else(|| FormulaError::MissingReference(name.to_string()))?;

    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| FormulaError::NotNumeric(name.to_string()))
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn parse(formula: &str) -> Result<Expr, FormulaError> {
        if formula.chars().count() > MAX_FORMULA_LENGTH {
            return Err(FormulaError::TooLong {
                max: MAX_FORMULA_LENGTH,
            });
        }

        let tokens = tokenize(formula)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }

        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
        };
        let expr = parser.expression()?;

        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(FormulaError::UnexpectedToken(token.describe())),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    /// Runs `f` one nesting level deeper
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, FormulaError>,
    ) -> Result<T, FormulaError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(FormulaError::TooDeep {
                max: MAX_NESTING_DEPTH,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.peek() == Some(&Token::Minus) {
            self.position += 1;
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Reference(name)) => Ok(Expr::Reference(name)),
            Some(Token::LeftParen) => {
                let inner = self.nested(Self::expression)?;
                match self.advance() {
                    Some(Token::RightParen) => Ok(inner),
                    Some(other) => Err(FormulaError::UnexpectedToken(other.describe())),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            Some(other) => Err(FormulaError::UnexpectedToken(other.describe())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}
