//! Band-arithmetic formulas
//!
//! Formulas are plain expressions over band names, for example
//! `"2.5 * (NIR - RED) / (NIR + 6 * RED - 7.5 * BLUE + 1)"`.
//! Supported syntax: `+ - * /`, `**` (power, right-associative), unary
//! minus, parentheses, decimal literals and band identifiers.
//!
//! Evaluation is per cell and never fails: division by (near) zero and any
//! non-finite result give NaN for that cell.

use std::fmt;
use std::str::FromStr;

use crate::maybe_rayon::*;
use firescar_core::{Error, Image, Raster, Result};

/// Divisors smaller than this in magnitude produce NaN
const DIV_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char), // + - * / and ^ for `**`
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Band(usize),
    BinOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
}

fn syntax_error(source: &str, reason: impl Into<String>) -> Error {
    Error::InvalidParameter {
        name: "formula",
        value: source.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            c @ ('+' | '-' | '*' | '/') => {
                tokens.push(Token::Op(c));
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
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax_error(source, format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => {
                return Err(syntax_error(source, format!("unexpected character '{}'", c)));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser; collects referenced band names as it goes
struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    bands: Vec<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn band_slot(&mut self, name: String) -> usize {
        match self.bands.iter().position(|b| *b == name) {
            Some(i) => i,
            None => {
                self.bands.push(name);
                self.bands.len() - 1
            }
        }
    }

    /// expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Op('+')) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// power = atom ('**' unary)?
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::BinOp {
                op: '^',
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    /// atom = number | band | '(' expr ')'
    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) => Ok(Expr::Band(self.band_slot(name))),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(syntax_error(self.source, "expected closing parenthesis")),
                }
            }
            Some(other) => Err(syntax_error(self.source, format!("unexpected token {:?}", other))),
            None => Err(syntax_error(self.source, "unexpected end of formula")),
        }
    }
}

fn eval(expr: &Expr, values: &[f64]) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Band(i) => values.get(*i).copied().unwrap_or(f64::NAN),
        Expr::Neg(inner) => -eval(inner, values),
        Expr::BinOp { op, left, right } => {
            let l = eval(left, values);
            let r = eval(right, values);
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r.abs() < DIV_EPSILON {
                        f64::NAN
                    } else {
                        l / r
                    }
                }
                '^' => l.powf(r),
                _ => f64::NAN,
            }
        }
    }
}

/// A parsed band-arithmetic formula
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
    bands: Vec<String>,
}

impl Formula {
    /// Parse a formula
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(syntax_error(source, "empty formula"));
        }
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            bands: Vec::new(),
        };
        let expr = parser.parse_expr()?;
        if let Some(extra) = parser.peek() {
            return Err(syntax_error(source, format!("unexpected trailing {:?}", extra)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
            bands: parser.bands,
        })
    }

    /// Original formula text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced band names, in order of first appearance
    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    /// Evaluate for one cell; `values` follows the order of [`Formula::bands`]
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        if values.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }
        let v = eval(&self.expr, values);
        if v.is_finite() {
            v
        } else {
            f64::NAN
        }
    }

    /// Evaluate over every cell of an image.
    ///
    /// # Errors
    /// [`Error::BandNotFound`] when the image lacks a referenced band.
    pub fn apply(&self, image: &Image) -> Result<Raster<f64>> {
        let inputs: Vec<&Raster<f64>> = self
            .bands
            .iter()
            .map(|name| image.band(name))
            .collect::<Result<_>>()?;
        let template = match (inputs.first(), image.iter().next()) {
            (Some(first), _) => *first,
            (None, Some((_, band))) => band,
            (None, None) => {
                return Err(Error::Algorithm(format!(
                    "formula '{}' applied to an image without bands",
                    self.source
                )))
            }
        };
        let (rows, cols) = template.shape();

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut values = vec![0.0; inputs.len()];
                let mut line = Vec::with_capacity(cols);
                for col in 0..cols {
                    for (slot, band) in values.iter_mut().zip(&inputs) {
                        *slot = unsafe { band.get_unchecked(row, col) };
                    }
                    line.push(self.evaluate(&values));
                }
                line
            })
            .collect();

        template.derive(data, Some(f64::NAN))
    }
}

impl FromStr for Formula {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Formula::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn image(bands: &[(&str, f64)]) -> Image {
        Image::from_bands(bands.iter().map(|&(n, v)| (n, Raster::filled(3, 3, v)))).unwrap()
    }

    #[test]
    fn test_ndvi_formula() {
        let img = image(&[("NIR", 0.8), ("RED", 0.2)]);
        let f = Formula::parse("(NIR - RED) / (NIR + RED)").unwrap();
        assert_eq!(f.bands(), &["NIR".to_string(), "RED".to_string()]);
        assert_relative_eq!(f.apply(&img).unwrap().get(1, 1).unwrap(), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_power_and_precedence() {
        let f = Formula::parse("1 / ((0.1 - RED)**2 + (0.06 - NIR)**2)").unwrap();
        let expected = 1.0 / ((0.1f64 - 0.05).powi(2) + (0.06f64 - 0.3).powi(2));
        assert_relative_eq!(f.evaluate(&[0.05, 0.3]), expected, epsilon = 1e-9);

        // right-associative, binds tighter than unary minus
        assert_relative_eq!(Formula::parse("2 ** 3 ** 2").unwrap().evaluate(&[]), 512.0);
        assert_relative_eq!(Formula::parse("-2 ** 2").unwrap().evaluate(&[]), -4.0);
        assert_relative_eq!(Formula::parse("10 * A - 9.8 * B + 2").unwrap().evaluate(&[0.2, 0.1]), 3.02, epsilon = 1e-12);
    }

    #[test]
    fn test_division_by_zero_is_nan() {
        let f = Formula::parse("A / B").unwrap();
        assert!(f.evaluate(&[1.0, 0.0]).is_nan());
        assert!(f.evaluate(&[f64::NAN, 1.0]).is_nan());
    }

    #[test]
    fn test_negative_base_fractional_power_is_nan() {
        let f = Formula::parse("A ** 0.5").unwrap();
        assert!(f.evaluate(&[-4.0]).is_nan());
        assert_relative_eq!(f.evaluate(&[4.0]), 2.0);
    }

    #[test]
    fn test_repeated_band_uses_one_slot() {
        let f = Formula::parse("A * A + A").unwrap();
        assert_eq!(f.bands().len(), 1);
        assert_relative_eq!(f.evaluate(&[3.0]), 12.0);
    }

    #[test]
    fn test_invalid_formulas() {
        assert!(Formula::parse("(NIR - ").is_err());
        assert!(Formula::parse("NIR $ RED").is_err());
        assert!(Formula::parse("NIR RED").is_err());
        assert!(Formula::parse("   ").is_err());
        assert!("1..2 + A".parse::<Formula>().is_err());
    }

    #[test]
    fn test_missing_band_error() {
        let img = image(&[("NIR", 0.8)]);
        let f = Formula::parse("(NIR - RED) / (NIR + RED)").unwrap();
        assert!(matches!(f.apply(&img), Err(Error::BandNotFound(_))));
    }
}
