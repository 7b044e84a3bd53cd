//! Calculator function: evaluates arithmetic expressions.
//!
//! Supports `+`, `-`, `*`, `/`, `%`, `^` (right-associative), parentheses,
//! unary negation and decimal numbers, via a small recursive-descent
//! parser.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{CallArgs, Function, FunctionOutput, ParamSpec, ParamType};

pub struct Calculator;

#[async_trait]
impl Function for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, %, ^, parentheses, and decimal numbers."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "expression",
            ParamType::String,
            "The expression to evaluate, e.g. '(2 + 3) * 4'",
        )]
    }

    async fn invoke(&self, args: CallArgs) -> Result<FunctionOutput, ToolError> {
        let expression = args.str("expression").unwrap_or_default();
        let value = evaluate(expression).map_err(|reason| ToolError::ExecutionFailed {
            function: self.name().into(),
            reason,
        })?;
        Ok(FunctionOutput::Json(serde_json::json!({
            "expression": expression,
            "result": format_number(value),
        })))
    }
}

/// Render integers without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate an arithmetic expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("Unexpected token at position {}: {tok:?}", parser.pos));
    }
    if !result.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let tok = match c {
            c if c.is_whitespace() => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                let text = &input[start..end];
                Token::Number(text.parse().map_err(|_| format!("Invalid number: {text}"))?)
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        };
        tokens.push(tok);
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                    left += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.bump();
                    left -= self.parse_term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    // term = unary (('*' | '/' | '%') unary)*
    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    left *= self.parse_unary()?;
                }
                Some(op @ (Token::Slash | Token::Percent)) => {
                    self.bump();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    if op == Token::Slash {
                        left /= right;
                    } else {
                        left %= right;
                    }
                }
                _ => return Ok(left),
            }
        }
    }

    // unary = '-' unary | power
    fn parse_unary(&mut self) -> Result<f64, String> {
        if self.peek() == Some(Token::Minus) {
            self.bump();
            return Ok(-self.parse_unary()?);
        }
        self.parse_power()
    }

    // power = primary ('^' unary)?
    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_primary()?;
        if self.peek() == Some(Token::Caret) {
            self.bump();
            let exponent = self.parse_unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // primary = NUMBER | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of expression".into()),
        }
    }
}
