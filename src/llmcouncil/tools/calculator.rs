//! # Restricted Calculator Tool
//!
//! Evaluates arithmetic expressions for council models. Expressions are tokenized and every
//! identifier is resolved against a fixed symbol table before anything is handed to
//! [`evalexpr`]; there is no variable assignment, member access, string handling or I/O, and
//! anything the table does not know is rejected.
//!
//! Supported syntax:
//!
//! - **Arithmetic**: `+`, `-`, `*`, `/` (true division), `%`, `^` and `**` (exponentiation)
//! - **Functions**: `sqrt abs floor ceil round min max sum pow sin cos tan asin acos atan atan2
//!   sinh cosh tanh exp ln log log10 log2 degrees radians`
//!
//! Precedence follows the usual convention: `**` binds tightest and groups to the right
//! (`2 ** 3 ** 2` is 512, `-2 ** 2` is -4), then unary signs, then `* / %`, then `+ -`.
//! `round(x)` and `round(x, n)` round halves to even.
//! - **Constants**: `pi`, `e`
//!
//! ```rust
//! use llmcouncil::tools::calculator::{format_number, Calculator};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let calc = Calculator::new();
//! let value = calc.evaluate("10000 * (1.07 ** 5)").await?;
//! assert_eq!(format_number(value), "14025.51731");
//!
//! assert!(calc.evaluate("__import__('os')").await.is_err());
//! # Ok(())
//! # }
//! ```

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

const MAX_EXPRESSION_LEN: usize = 1000;
const MAX_NESTING: usize = 64;

/// Why an expression was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculatorErrorKind {
    /// The expression uses characters, names or shapes outside the symbol table.
    Disallowed,
    /// The expression was well formed but has no finite value.
    Evaluation,
}

/// Error type for calculator operations
#[derive(Debug, Clone)]
pub struct CalculatorError {
    kind: CalculatorErrorKind,
    message: String,
}

impl CalculatorError {
    pub fn disallowed(message: impl Into<String>) -> Self {
        CalculatorError {
            kind: CalculatorErrorKind::Disallowed,
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        CalculatorError {
            kind: CalculatorErrorKind::Evaluation,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> CalculatorErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CalculatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Calculator error: {}", self.message)
    }
}

impl Error for CalculatorError {}

/// Result type for calculator operations
pub type CalculatorResult = Result<f64, CalculatorError>;

#[derive(Clone, Copy)]
enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(expected) => n == expected,
            Arity::Range(min, max) => n >= min && n <= max,
            Arity::AtLeast(min) => n >= min,
        }
    }
}

#[derive(Clone, Copy)]
enum Symbol {
    Constant(f64),
    /// Rewritten into an evalexpr call.
    Function {
        arity: Arity,
        render: fn(&[String]) -> String,
    },
    /// Arguments are evaluated first and folded into a literal.
    Evaluated {
        arity: Arity,
        apply: fn(&[f64]) -> CalculatorResult,
    },
}

macro_rules! math_unary {
    ($target:literal) => {
        Symbol::Function {
            arity: Arity::Exact(1),
            render: |args| format!("{}({})", $target, args[0]),
        }
    };
}

lazy_static! {
    static ref SYMBOLS: HashMap<&'static str, Symbol> = {
        let mut m = HashMap::new();
        m.insert("pi", Symbol::Constant(std::f64::consts::PI));
        m.insert("e", Symbol::Constant(std::f64::consts::E));

        m.insert("sqrt", math_unary!("math::sqrt"));
        m.insert("abs", math_unary!("math::abs"));
        m.insert("sin", math_unary!("math::sin"));
        m.insert("cos", math_unary!("math::cos"));
        m.insert("tan", math_unary!("math::tan"));
        m.insert("asin", math_unary!("math::asin"));
        m.insert("acos", math_unary!("math::acos"));
        m.insert("atan", math_unary!("math::atan"));
        m.insert("sinh", math_unary!("math::sinh"));
        m.insert("cosh", math_unary!("math::cosh"));
        m.insert("tanh", math_unary!("math::tanh"));
        m.insert("exp", math_unary!("math::exp"));
        m.insert("ln", math_unary!("math::ln"));
        m.insert("floor", math_unary!("floor"));
        m.insert("ceil", math_unary!("ceil"));

        m.insert(
            "round",
            Symbol::Evaluated {
                arity: Arity::Range(1, 2),
                apply: round_half_even,
            },
        );
        m.insert(
            "sum",
            Symbol::Evaluated {
                arity: Arity::AtLeast(1),
                apply: |args| Ok(args.iter().sum()),
            },
        );

        m.insert(
            "atan2",
            Symbol::Function {
                arity: Arity::Exact(2),
                render: |args| format!("math::atan2({}, {})", args[0], args[1]),
            },
        );
        m.insert(
            "min",
            Symbol::Function {
                arity: Arity::AtLeast(2),
                render: |args| format!("min({})", args.join(", ")),
            },
        );
        m.insert(
            "max",
            Symbol::Function {
                arity: Arity::AtLeast(2),
                render: |args| format!("max({})", args.join(", ")),
            },
        );
        m.insert(
            "pow",
            Symbol::Function {
                arity: Arity::Exact(2),
                render: |args| format!("(({})^({}))", args[0], args[1]),
            },
        );
        m.insert(
            "log",
            Symbol::Function {
                arity: Arity::Range(1, 2),
                render: |args| {
                    let base = args.get(1).map(String::as_str).unwrap_or("10.0");
                    format!("(math::ln({})/math::ln({}))", args[0], base)
                },
            },
        );
        m.insert(
            "log10",
            Symbol::Function {
                arity: Arity::Exact(1),
                render: |args| format!("(math::ln({})/math::ln(10.0))", args[0]),
            },
        );
        m.insert(
            "log2",
            Symbol::Function {
                arity: Arity::Exact(1),
                render: |args| format!("(math::ln({})/math::ln(2.0))", args[0]),
            },
        );
        m.insert(
            "degrees",
            Symbol::Function {
                arity: Arity::Exact(1),
                render: |args| {
                    format!("(({}) * 180.0 / {})", args[0], float_literal(std::f64::consts::PI))
                },
            },
        );
        m.insert(
            "radians",
            Symbol::Function {
                arity: Arity::Exact(1),
                render: |args| {
                    format!("(({}) * {} / 180.0)", args[0], float_literal(std::f64::consts::PI))
                },
            },
        );
        m
    };
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, CalculatorError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
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
                .map_err(|_| CalculatorError::disallowed(format!("malformed number '{}'", literal)))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let token = match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::Op("^")
            }
            '+' => Token::Op("+"),
            '-' => Token::Op("-"),
            '*' => Token::Op("*"),
            '/' => Token::Op("/"),
            '%' => Token::Op("%"),
            '^' => Token::Op("^"),
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            other => {
                return Err(CalculatorError::disallowed(format!(
                    "character '{}' is not allowed",
                    other
                )))
            }
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

/// Numbers are always emitted as floats so that `/` is true division.
fn float_literal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// `round(x)` / `round(x, n)` with ties going to the even neighbour.
fn round_half_even(args: &[f64]) -> CalculatorResult {
    let value = args[0];
    let digits = args.get(1).copied().unwrap_or(0.0);
    if digits.fract() != 0.0 {
        return Err(CalculatorError::evaluation(
            "round() digit count must be an integer",
        ));
    }
    if digits == 0.0 {
        return Ok(value.round_ties_even());
    }

    let exponent = digits.abs().min(400.0) as i32;
    let scale = 10f64.powi(exponent);
    if digits < 0.0 {
        if !scale.is_finite() {
            return Ok(0.0);
        }
        return Ok((value / scale).round_ties_even() * scale);
    }
    let scaled = value * scale;
    if !scaled.is_finite() {
        return Ok(value);
    }
    Ok(scaled.round_ties_even() / scale)
}

fn unexpected(token: Option<&Token>) -> CalculatorError {
    match token {
        None => CalculatorError::disallowed("incomplete expression"),
        Some(Token::RParen) => CalculatorError::disallowed("unbalanced parentheses"),
        Some(Token::Comma) => CalculatorError::disallowed("unexpected ',' outside a function call"),
        Some(_) => CalculatorError::disallowed("missing operator between operands"),
    }
}

/// Recursive descent over the token stream. Every operation is emitted fully parenthesized
/// so evalexpr's own precedence rules never come into play.
///
/// ```text
/// additive       := multiplicative (('+' | '-') multiplicative)*
/// multiplicative := unary (('*' | '/' | '%') unary)*
/// unary          := ('+' | '-') unary | power
/// power          := atom ('^' unary)?
/// atom           := number | constant | function '(' args ')' | '(' additive ')'
/// ```
struct Translator<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Translator<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn descend(&mut self) -> Result<(), CalculatorError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(CalculatorError::disallowed("expression is nested too deeply"));
        }
        Ok(())
    }

    fn additive(&mut self) -> Result<String, CalculatorError> {
        let mut out = self.multiplicative()?;
        while let Some(op @ ("+" | "-")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.multiplicative()?;
            out = format!("({} {} {})", out, op, rhs);
        }
        Ok(out)
    }

    fn multiplicative(&mut self) -> Result<String, CalculatorError> {
        let mut out = self.unary()?;
        while let Some(op @ ("*" | "/" | "%")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            out = format!("({} {} {})", out, op, rhs);
        }
        Ok(out)
    }

    fn unary(&mut self) -> Result<String, CalculatorError> {
        match self.peek_op() {
            Some(op @ ("+" | "-")) => {
                self.pos += 1;
                self.descend()?;
                let operand = self.unary()?;
                self.depth -= 1;
                if op == "-" {
                    Ok(format!("(-{})", operand))
                } else {
                    Ok(operand)
                }
            }
            _ => self.power(),
        }
    }

    /// The exponent is parsed as a unary, so `**` groups to the right and accepts a sign.
    fn power(&mut self) -> Result<String, CalculatorError> {
        let base = self.atom()?;
        if self.peek_op() != Some("^") {
            return Ok(base);
        }
        self.pos += 1;
        self.descend()?;
        let exponent = self.unary()?;
        self.depth -= 1;
        Ok(format!("({}^{})", base, exponent))
    }

    fn atom(&mut self) -> Result<String, CalculatorError> {
        let token = self
            .peek()
            .ok_or_else(|| CalculatorError::disallowed("incomplete expression"))?;
        self.pos += 1;
        match token {
            Token::Number(value) => Ok(float_literal(*value)),
            Token::Ident(name) => self.symbol(name),
            Token::LParen => {
                let mut args = self.arguments()?;
                if args.len() != 1 {
                    return Err(CalculatorError::disallowed("unexpected ',' outside a function call"));
                }
                Ok(format!("({})", args.remove(0)))
            }
            Token::Op(op) => Err(CalculatorError::disallowed(format!(
                "unexpected operator '{}'",
                op
            ))),
            Token::RParen | Token::Comma => Err(CalculatorError::disallowed("incomplete expression")),
        }
    }

    /// Called just after a `(`; consumes through the matching `)`.
    fn arguments(&mut self) -> Result<Vec<String>, CalculatorError> {
        self.descend()?;
        let mut args = Vec::new();
        loop {
            args.push(self.additive()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {
                    self.pos += 1;
                    break;
                }
                None => return Err(CalculatorError::disallowed("unbalanced parentheses")),
                other => return Err(unexpected(other)),
            }
        }
        self.depth -= 1;
        Ok(args)
    }

    fn call(&mut self, name: &str, arity: Arity) -> Result<Vec<String>, CalculatorError> {
        if self.peek() != Some(&Token::LParen) {
            return Err(CalculatorError::disallowed(format!(
                "function '{}' must be called with parentheses",
                name
            )));
        }
        self.pos += 1;
        let args = self.arguments()?;
        if !arity.accepts(args.len()) {
            return Err(CalculatorError::disallowed(format!(
                "wrong number of arguments for '{}'",
                name
            )));
        }
        Ok(args)
    }

    fn symbol(&mut self, name: &str) -> Result<String, CalculatorError> {
        let symbol = SYMBOLS
            .get(name.to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| CalculatorError::disallowed(format!("unknown name '{}'", name)))?;

        match symbol {
            Symbol::Constant(value) => Ok(float_literal(value)),
            Symbol::Function { arity, render } => {
                let args = self.call(name, arity)?;
                Ok(render(&args))
            }
            Symbol::Evaluated { arity, apply } => {
                let args = self.call(name, arity)?;
                let values = args
                    .iter()
                    .map(|arg| evaluate_prepared(arg))
                    .collect::<Result<Vec<f64>, _>>()?;
                let value = apply(&values)?;
                Ok(format!("({})", float_literal(value)))
            }
        }
    }
}

/// Translate a user expression into an evalexpr expression, rejecting anything outside
/// the symbol table.
fn translate(expression: &str) -> Result<String, CalculatorError> {
    let tokens = tokenize(expression)?;
    let mut translator = Translator {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let rendered = translator.additive()?;
    if translator.pos != tokens.len() {
        return Err(unexpected(translator.peek()));
    }
    Ok(rendered)
}

/// Evaluate an already translated expression to a finite number.
fn evaluate_prepared(prepared: &str) -> CalculatorResult {
    let value = evalexpr::eval(prepared)
        .map_err(|e| CalculatorError::evaluation(format!("Evaluation error: {}", e)))?;
    let number = value
        .as_number()
        .map_err(|_| CalculatorError::evaluation("Result is not a number"))?;

    if !number.is_finite() {
        return Err(CalculatorError::evaluation(
            "result is not a finite number (division by zero or overflow)",
        ));
    }
    Ok(number)
}

/// Format a result the way it is shown to models: integers without a fractional part,
/// everything else with at most 10 significant digits.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let rounded = format!("{:.9e}", value).parse::<f64>().unwrap_or(value);
    format!("{}", rounded)
}

/// A stateless calculator; safe to share across tasks.
#[derive(Clone, Default)]
pub struct Calculator {}

impl Calculator {
    pub fn new() -> Self {
        Calculator {}
    }

    /// Evaluate an expression. Fails closed: anything the symbol table does not cover,
    /// and any non-finite result, is an error.
    pub async fn evaluate(&self, expression: &str) -> CalculatorResult {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(CalculatorError::disallowed("empty expression"));
        }
        if expression.len() > MAX_EXPRESSION_LEN {
            return Err(CalculatorError::disallowed("expression is too long"));
        }

        let prepared = translate(expression)?;
        log::debug!(
            "llmcouncil::tools::calculator::evaluate(...): '{}' -> '{}'",
            expression,
            prepared
        );

        evaluate_prepared(&prepared)
    }
}
