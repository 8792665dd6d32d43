//! Arithmetic evaluator behind the `calculator` tool.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/' | '//') unary)*
//! unary  := ('+' | '-') unary | power
//! power  := atom ('**' unary)?
//! atom   := number | '(' expr ')'
//! ```
//!
//! Integers stay integers until `/` or a fractional operand turns the
//! result into a float, so `2+2` is `4` and `4/2` is `2.0`.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("invalid syntax")]
    Syntax,
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression is longer than 1000 characters")]
    TooLong,
    #[error("expression nests deeper than 100 levels")]
    TooDeep,
}

/// Longest input accepted before tokenizing.
pub const MAX_INPUT_LEN: usize = 1000;

/// Deepest nesting of parentheses and unary signs the parser recurses into.
pub const MAX_DEPTH: usize = 100;

/// A calculator result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{}", format_float(x)),
        }
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let raw = format!("{x:e}");
        return match raw.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => raw,
        };
    }
    if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    DoubleStar,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&literal)?));
            }
            _ => return Err(CalcError::Syntax),
        }
    }
    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Number, CalcError> {
    if literal.contains('.') {
        if literal == "." || literal.matches('.').count() > 1 {
            return Err(CalcError::Syntax);
        }
        return literal.parse::<f64>().map(Number::Float).map_err(|_| CalcError::Syntax);
    }
    match literal.parse::<i64>() {
        Ok(i) => Ok(Number::Int(i)),
        Err(_) => literal.parse::<f64>().map(Number::Float).map_err(|_| CalcError::Syntax),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut lhs = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Number, CalcError> {
        let mut lhs = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    // Every recursive path of the grammar passes through here.
    fn unary(&mut self) -> Result<Number, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let value = self.unary_inner();
        self.depth -= 1;
        value
    }

    fn unary_inner(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(match self.unary()? {
                    Number::Int(i) => i
                        .checked_neg()
                        .map(Number::Int)
                        .unwrap_or(Number::Float(-(i as f64))),
                    Number::Float(f) => Number::Float(-f),
                })
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(Token::DoubleStar) {
            self.pos += 1;
            let exponent = self.unary()?;
            return apply(Token::DoubleStar, base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(CalcError::Syntax),
                }
            }
            _ => Err(CalcError::Syntax),
        }
    }
}

fn apply(op: Token, lhs: Number, rhs: Number) -> Result<Number, CalcError> {
    use Number::{Float, Int};

    let float = |f: fn(f64, f64) -> f64| Float(f(lhs.as_f64(), rhs.as_f64()));
    Ok(match op {
        Token::Plus => match (lhs, rhs) {
            (Int(a), Int(b)) => a.checked_add(b).map(Int).unwrap_or_else(|| float(|a, b| a + b)),
            _ => float(|a, b| a + b),
        },
        Token::Minus => match (lhs, rhs) {
            (Int(a), Int(b)) => a.checked_sub(b).map(Int).unwrap_or_else(|| float(|a, b| a - b)),
            _ => float(|a, b| a - b),
        },
        Token::Star => match (lhs, rhs) {
            (Int(a), Int(b)) => a.checked_mul(b).map(Int).unwrap_or_else(|| float(|a, b| a * b)),
            _ => float(|a, b| a * b),
        },
        Token::Slash => {
            if rhs.is_zero() {
                return Err(CalcError::DivisionByZero);
            }
            float(|a, b| a / b)
        }
        Token::DoubleSlash => {
            if rhs.is_zero() {
                return Err(CalcError::DivisionByZero);
            }
            match (lhs, rhs) {
                (Int(a), Int(b)) => match a.checked_div_euclid(b) {
                    Some(q) if b < 0 && a.rem_euclid(b) != 0 => Int(q - 1),
                    Some(q) => Int(q),
                    None => float(|a, b| (a / b).floor()),
                },
                _ => float(|a, b| (a / b).floor()),
            }
        }
        Token::DoubleStar => match (lhs, rhs) {
            (Int(a), Int(b)) if b >= 0 => u32::try_from(b)
                .ok()
                .and_then(|e| a.checked_pow(e))
                .map(Int)
                .unwrap_or_else(|| float(f64::powf)),
            _ => {
                if lhs.is_zero() && rhs.as_f64() < 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                float(f64::powf)
            }
        },
        _ => return Err(CalcError::Syntax),
    })
}

/// Evaluate an arithmetic expression.
pub fn evaluate(input: &str) -> Result<Number, CalcError> {
    if input.chars().count() > MAX_INPUT_LEN {
        return Err(CalcError::TooLong);
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CalcError::Syntax);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(CalcError::Syntax);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> String {
        evaluate(s).map(|n| n.to_string()).unwrap_or_else(|e| format!("Error: {e}"))
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(eval("2+2"), "4");
        assert_eq!(eval("2 + 3 * 4"), "14");
        assert_eq!(eval("(2 + 3) * 4"), "20");
        assert_eq!(eval("-3 - -2"), "-1");
        assert_eq!(eval("2**10"), "1024");
    }

    #[test]
    fn true_division_yields_floats() {
        assert_eq!(eval("4/2"), "2.0");
        assert_eq!(eval("7/2"), "3.5");
        assert_eq!(eval("0.1 + 0.2"), "0.30000000000000004");
        assert_eq!(eval("1/3"), "0.3333333333333333");
    }

    #[test]
    fn floor_division_rounds_down() {
        assert_eq!(eval("7//2"), "3");
        assert_eq!(eval("-7//2"), "-4");
        assert_eq!(eval("7.5//2"), "3.0");
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        assert_eq!(eval("-2**2"), "-4");
        assert_eq!(eval("2**-1"), "0.5");
        assert_eq!(eval("2**3**2"), "512");
    }

    #[test]
    fn large_and_tiny_floats_use_exponent_form() {
        assert_eq!(eval("1/100000"), "1e-05");
        assert_eq!(eval("10.0**20"), "1e+20");
    }

    #[test]
    fn malformed_input_is_a_syntax_error() {
        assert_eq!(evaluate("2 +"), Err(CalcError::Syntax));
        assert_eq!(evaluate("()"), Err(CalcError::Syntax));
        assert_eq!(evaluate("1..2"), Err(CalcError::Syntax));
        assert_eq!(evaluate("2 2"), Err(CalcError::Syntax));
        assert_eq!(evaluate("(1"), Err(CalcError::Syntax));
        assert_eq!(evaluate("   "), Err(CalcError::Syntax));
    }

    #[test]
    fn zero_divisors_are_reported() {
        assert_eq!(evaluate("1/0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("1//0.0"), Err(CalcError::DivisionByZero));
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert_eq!(eval(&nested(40)), "1");
        assert_eq!(evaluate(&nested(MAX_DEPTH)), Err(CalcError::TooDeep));
        assert_eq!(evaluate(&format!("{}1", "-".repeat(MAX_DEPTH + 1))), Err(CalcError::TooDeep));
    }

    #[test]
    fn oversized_input_is_rejected_before_parsing() {
        let huge = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(evaluate(&huge), Err(CalcError::TooLong));
        assert_eq!(evaluate(&"1+".repeat(MAX_INPUT_LEN)), Err(CalcError::TooLong));
    }
}
