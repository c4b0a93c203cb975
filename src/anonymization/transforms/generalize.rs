//! Case-based generalization
//!
//! Each case pairs a predicate over `$this` with a replacement value. The
//! first case whose predicate holds wins; values matching no case are kept
//! or redacted.
//!
//! Predicate grammar:
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | primary
//! primary := "(" expr ")"
//!          | "$this" ("=" | "!=" | "<" | "<=" | ">" | ">=") literal
//!          | "$this" "in" "(" literal ("," literal)* ")"
//!          | "$this" ".startsWith(" string ")"
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::Outcome;
use crate::anonymization::context::OperationKind;
use crate::domain::{NodeId, RecordTree, Result, Scalar};

/// What happens to values no case matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtherValues {
    Keep,
    #[default]
    Redact,
}

/// Literal on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare(Comparison, Literal),
    In(Vec<Literal>),
    StartsWith(String),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

/// Predicate parse failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateError {
    pub predicate: String,
    pub message: String,
}

impl fmt::Display for PredicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid predicate '{}': {}", self.predicate, self.message)
    }
}

impl std::error::Error for PredicateError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    This,
    Ident(String),
    Str(String),
    Num(f64),
    Op(Comparison),
    LParen,
    RParen,
    Comma,
    Dot,
}

fn tokenize(text: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(char::is_ascii_digit) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(Comparison::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(Comparison::Ne));
                i += 2;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                tokens.push(Token::Op(match (c, or_equal) {
                    ('<', true) => Comparison::Le,
                    ('<', false) => Comparison::Lt,
                    (_, true) => Comparison::Ge,
                    (_, false) => Comparison::Gt,
                }));
                i += if or_equal { 2 } else { 1 };
            }
            '\'' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == '\'')
                    .map(|p| start + p)
                    .ok_or("unterminated string literal")?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '$' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word != "$this" {
                    return Err(format!("unknown variable '{word}'"));
                }
                tokens.push(Token::This);
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let number: String = chars[start..i].iter().collect();
                let value = number
                    .parse()
                    .map_err(|_| format!("invalid number '{number}'"))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    fn keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn or(&mut self) -> std::result::Result<Predicate, String> {
        let mut left = self.and()?;
        while self.keyword("or") {
            self.position += 1;
            let right = self.and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> std::result::Result<Predicate, String> {
        let mut left = self.unary()?;
        while self.keyword("and") {
            self.position += 1;
            let right = self.unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> std::result::Result<Predicate, String> {
        if self.keyword("not") {
            self.position += 1;
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> std::result::Result<Predicate, String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::This) => self.test(),
            Some(token) => Err(format!("expected '$this' or '(', found {token:?}")),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn test(&mut self) -> std::result::Result<Predicate, String> {
        match self.next() {
            Some(Token::Op(op)) => Ok(Predicate::Compare(op, self.literal()?)),
            Some(Token::Ident(word)) if word == "in" => {
                self.expect(Token::LParen)?;
                let mut items = vec![self.literal()?];
                while self.peek() == Some(&Token::Comma) {
                    self.position += 1;
                    items.push(self.literal()?);
                }
                self.expect(Token::RParen)?;
                Ok(Predicate::In(items))
            }
            Some(Token::Dot) => match self.next() {
                Some(Token::Ident(function)) if function == "startsWith" => {
                    self.expect(Token::LParen)?;
                    let prefix = match self.next() {
                        Some(Token::Str(s)) => s,
                        _ => return Err("startsWith expects a string literal".to_string()),
                    };
                    self.expect(Token::RParen)?;
                    Ok(Predicate::StartsWith(prefix))
                }
                other => Err(format!("unsupported function {other:?}")),
            },
            Some(token) => Err(format!("expected comparison after '$this', found {token:?}")),
            None => Err("expected comparison after '$this'".to_string()),
        }
    }

    fn literal(&mut self) -> std::result::Result<Literal, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Literal::Number(n)),
            Some(Token::Str(s)) => Ok(Literal::Text(s)),
            Some(token) => Err(format!("expected literal, found {token:?}")),
            None => Err("expected literal, found end of input".to_string()),
        }
    }
}

impl Predicate {
    pub fn parse(text: &str) -> std::result::Result<Self, PredicateError> {
        let error = |message: String| PredicateError {
            predicate: text.to_string(),
            message,
        };
        let tokens = tokenize(text).map_err(error)?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let predicate = parser.or().map_err(error)?;
        if let Some(token) = parser.peek() {
            return Err(error(format!("unexpected trailing {token:?}")));
        }
        Ok(predicate)
    }

    /// Evaluates against a scalar
    pub fn holds(&self, value: &Scalar) -> bool {
        match self {
            Self::Compare(op, literal) => compare(value, literal).is_some_and(|ordering| match op {
                Comparison::Eq => ordering == Ordering::Equal,
                Comparison::Ne => ordering != Ordering::Equal,
                Comparison::Lt => ordering == Ordering::Less,
                Comparison::Le => ordering != Ordering::Greater,
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Ge => ordering != Ordering::Less,
            }),
            Self::In(items) => items
                .iter()
                .any(|item| compare(value, item) == Some(Ordering::Equal)),
            Self::StartsWith(prefix) => value.to_text().starts_with(prefix.as_str()),
            Self::And(a, b) => a.holds(value) && b.holds(value),
            Self::Or(a, b) => a.holds(value) || b.holds(value),
            Self::Not(inner) => !inner.holds(value),
        }
    }
}

fn compare(value: &Scalar, literal: &Literal) -> Option<Ordering> {
    match literal {
        Literal::Number(n) => value.as_f64()?.partial_cmp(n),
        Literal::Text(t) => Some(value.to_text().as_str().cmp(t.as_str())),
    }
}

/// One `{ predicate, value }` case
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizeCase {
    pub predicate: Predicate,
    pub source: String,
    pub value: Scalar,
}

/// Resolved generalize settings
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizeSettings {
    pub cases: Vec<GeneralizeCase>,
    pub other_values: OtherValues,
}

/// Generalizes one node's value
pub fn generalize(
    tree: &mut RecordTree,
    node: NodeId,
    settings: &GeneralizeSettings,
) -> Result<Outcome> {
    let Some(value) = tree.value(node) else {
        return Ok(Outcome::unchanged());
    };

    match settings.cases.iter().find(|case| case.predicate.holds(value)) {
        Some(case) if case.value == *value => Ok(Outcome::unchanged()),
        Some(case) => {
            let replacement = case.value.clone();
            tree.set_value(node, Some(replacement));
            Ok(Outcome::changed(OperationKind::Generalized))
        }
        None => match settings.other_values {
            OtherValues::Keep => Ok(Outcome::unchanged()),
            OtherValues::Redact => {
                tree.set_value(node, None);
                Ok(Outcome::changed(OperationKind::Redacted))
            }
        },
    }
}
