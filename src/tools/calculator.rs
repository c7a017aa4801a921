// SPDX-License-Identifier: MIT

//! Arithmetic over `+ - * /`, parentheses and decimal numbers

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    #[error("unexpected '{0}' at position {1}")]
    Unexpected(char, usize),
    #[error("expression ended early")]
    UnexpectedEnd,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("division by zero")]
    DivisionByZero,
}

/// First run of arithmetic characters in `text` that contains a digit
pub fn extract_expression(text: &str) -> Option<&str> {
    let is_arith = |c: char| c.is_ascii_digit() || "+-*/().".contains(c);
    let mut rest = text;

    while let Some(start) = rest.find(is_arith) {
        let tail = &rest[start..];
        let end = tail
            .find(|c: char| !is_arith(c) && !c.is_whitespace())
            .unwrap_or(tail.len());
        let candidate = tail[..end].trim_end();
        if candidate.chars().any(|c| c.is_ascii_digit()) {
            return Some(candidate);
        }
        rest = &tail[end..];
    }
    None
}

/// Evaluate `expr` with the usual precedence
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        chars: expr.chars().collect(),
        pos: 0,
    };
    let value = parser.expression()?;
    parser.skip_whitespace();
    match parser.peek() {
        Some(c) => Err(CalcError::Unexpected(c, parser.pos)),
        None => Ok(value),
    }
}

/// Render like a calculator display: `5`, `2.5`
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn next_op(&mut self, ops: &[char]) -> Option<char> {
        self.skip_whitespace();
        let c = self.peek().filter(|c| ops.contains(c))?;
        self.pos += 1;
        Some(c)
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(op) = self.next_op(&['+', '-']) {
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        while let Some(op) = self.next_op(&['*', '/']) {
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else if rhs == 0.0 {
                return Err(CalcError::DivisionByZero);
            } else {
                value /= rhs;
            }
        }
        Ok(value)
    }

    // factor := '-' factor | '(' expression ')' | number
    fn factor(&mut self) -> Result<f64, CalcError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(CalcError::UnexpectedEnd),
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expression()?;
                self.skip_whitespace();
                match self.peek() {
                    Some(')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(c) => Err(CalcError::Unexpected(c, self.pos)),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.pos += 1;
                }
                let literal: String = self.chars[start..self.pos].iter().collect();
                literal
                    .parse()
                    .map_err(|_| CalcError::InvalidNumber(literal))
            }
            Some(c) => Err(CalcError::Unexpected(c, self.pos)),
        }
    }
}
