//! Condition expression parser
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := unary ("and" unary)*
//! unary      := "not" unary | "(" or_expr ")" | "true" | "false" | comparison
//! comparison := path op literal
//! ```

use super::ast::{CompareOp, Expression, Literal};
use super::ConditionError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Op(CompareOp),
    LParen,
    RParen,
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        source: input,
    };
    let expr = parser.parse_or()?;

    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(parser.unexpected(tok.clone())),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(ConditionError::UnterminatedString(input.to_string()));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::NotEq, 2),
                    ('>', Some('=')) => (CompareOp::Gte, 2),
                    ('<', Some('=')) => (CompareOp::Lte, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => {
                        return Err(ConditionError::Unexpected {
                            token: c.to_string(),
                            input: input.to_string(),
                        })
                    }
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word == "contains" {
                    tokens.push(Token::Op(CompareOp::Contains));
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
            other => {
                return Err(ConditionError::Unexpected {
                    token: other.to_string(),
                    input: input.to_string(),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == keyword)
    }

    fn unexpected(&self, token: Token) -> ConditionError {
        let token = match token {
            Token::Ident(s) => s,
            Token::Str(s) => format!("'{}'", s),
            Token::Number(n) => n.to_string(),
            Token::Op(op) => op.to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        };
        ConditionError::Unexpected {
            token,
            input: self.source.to_string(),
        }
    }

    fn end_of_input(&self) -> ConditionError {
        ConditionError::UnexpectedEnd(self.source.to_string())
    }

    fn parse_or(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ConditionError> {
        match self.next() {
            None => Err(self.end_of_input()),
            Some(Token::Ident(word)) if word == "not" => {
                Ok(Expression::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(self.unexpected(tok)),
                    None => Err(self.end_of_input()),
                }
            }
            Some(Token::Ident(word)) if word == "true" && !self.at_operator() => Ok(Expression::True),
            Some(Token::Ident(word)) if word == "false" && !self.at_operator() => Ok(Expression::False),
            Some(Token::Ident(path)) => self.parse_comparison(path),
            Some(tok) => Err(self.unexpected(tok)),
        }
    }

    fn at_operator(&self) -> bool {
        matches!(self.peek(), Some(Token::Op(_)))
    }

    fn parse_comparison(&mut self, left: String) -> Result<Expression, ConditionError> {
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            Some(tok) => return Err(self.unexpected(tok)),
            None => return Err(self.end_of_input()),
        };

        let right = match self.next() {
            Some(Token::Str(s)) => Literal::String(s),
            Some(Token::Number(n)) => Literal::Number(n),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Literal::Boolean(true),
                "false" => Literal::Boolean(false),
                "null" => Literal::Null,
                _ => return Err(self.unexpected(Token::Ident(word))),
            },
            Some(tok) => return Err(self.unexpected(tok)),
            None => return Err(self.end_of_input()),
        };

        Ok(Expression::Compare { left, op, right })
    }
}
