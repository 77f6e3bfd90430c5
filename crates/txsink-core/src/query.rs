//! Filter expressions: a conjunction of `tag op value` comparisons.
//!
//! ```text
//! tx.height >= 1 AND tx.height <= 2 AND account.owner = 'Ivan'
//! message.sender EXISTS
//! wasm._contract_address CONTAINS 'orai1'
//! ```
//!
//! Numbers keep their exact decimal literal so that no precision is lost
//! before a caller decides how to interpret them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── Operator ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Lt,
    Leq,
    Gt,
    Geq,
    Contains,
    Exists,
}

impl Operator {
    /// `<`, `<=`, `>` and `>=`.
    pub fn is_range(self) -> bool {
        matches!(self, Self::Lt | Self::Leq | Self::Gt | Self::Geq)
    }

    /// The SQL comparison operator, for the operators that have one.
    pub fn sql(self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Lt => Some("<"),
            Self::Leq => Some("<="),
            Self::Gt => Some(">"),
            Self::Geq => Some(">="),
            Self::Contains | Self::Exists => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Lt => write!(f, "<"),
            Self::Leq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Geq => write!(f, ">="),
            Self::Contains => write!(f, "CONTAINS"),
            Self::Exists => write!(f, "EXISTS"),
        }
    }
}

// ─── Number ───────────────────────────────────────────────────────────────────

/// A decimal literal (`-?digits(.digits)?`) kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Number(String);

impl Number {
    pub fn parse(literal: &str) -> Option<Self> {
        let digits = literal.strip_prefix('-').unwrap_or(literal);
        let (int, frac) = match digits.split_once('.') {
            Some((int, frac)) => (int, Some(frac)),
            None => (digits, None),
        };
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int) || !frac.map_or(true, all_digits) {
            return None;
        }
        Some(Self(literal.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact conversion to `i64`. Fails on a non-zero fractional part or on
    /// overflow.
    pub fn to_i64_exact(&self) -> Result<i64, IndexerError> {
        let int = match self.0.split_once('.') {
            Some((int, frac)) if frac.bytes().all(|b| b == b'0') => int,
            Some(_) => return Err(self.conversion_error()),
            None => self.0.as_str(),
        };
        int.parse::<i64>().map_err(|_| self.conversion_error())
    }

    fn conversion_error(&self) -> IndexerError {
        IndexerError::RangeConversion {
            value: self.0.clone(),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Value / Condition ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Number(Number),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "'{s}'"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One comparison of a filter expression. `arg` is `None` only for `EXISTS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub tag: String,
    pub op: Operator,
    pub arg: Option<Value>,
}

impl Condition {
    pub fn new(tag: impl Into<String>, op: Operator, arg: impl Into<Value>) -> Self {
        Self {
            tag: tag.into(),
            op,
            arg: Some(arg.into()),
        }
    }

    pub fn eq(tag: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self::new(tag, Operator::Eq, arg)
    }

    pub fn lt(tag: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self::new(tag, Operator::Lt, arg)
    }

    pub fn leq(tag: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self::new(tag, Operator::Leq, arg)
    }

    pub fn gt(tag: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self::new(tag, Operator::Gt, arg)
    }

    pub fn geq(tag: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self::new(tag, Operator::Geq, arg)
    }

    pub fn contains(tag: impl Into<String>, needle: &str) -> Self {
        Self::new(tag, Operator::Contains, needle)
    }

    pub fn exists(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            op: Operator::Exists,
            arg: None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{} {} {}", self.tag, self.op, arg),
            None => write!(f, "{} {}", self.tag, self.op),
        }
    }
}

// ─── Query ────────────────────────────────────────────────────────────────────

/// An immutable conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn parse(input: &str) -> Result<Self, IndexerError> {
        Parser::new(input).parse()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl FromStr for Query {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

// ─── Parser ───────────────────────────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn parse(mut self) -> Result<Query, IndexerError> {
        let mut conditions = Vec::new();
        loop {
            conditions.push(self.condition()?);
            self.skip_ws();
            if self.at_end() {
                break;
            }
            if !self.keyword("AND") {
                return Err(self.error("expected AND"));
            }
        }
        Ok(Query { conditions })
    }

    fn condition(&mut self) -> Result<Condition, IndexerError> {
        self.skip_ws();
        let tag = self.take_while(is_tag_byte);
        if tag.is_empty() {
            return Err(self.error("expected tag"));
        }
        let tag = tag.to_string();
        self.skip_ws();

        if self.keyword("EXISTS") {
            return Ok(Condition::exists(tag));
        }
        let op = if self.keyword("CONTAINS") {
            Operator::Contains
        } else {
            self.operator()?
        };

        self.skip_ws();
        let arg = self.value()?;
        if op == Operator::Contains && !matches!(arg, Value::Str(_)) {
            return Err(self.error("CONTAINS requires a string"));
        }
        Ok(Condition {
            tag,
            op,
            arg: Some(arg),
        })
    }

    fn operator(&mut self) -> Result<Operator, IndexerError> {
        for (symbol, op) in [
            ("<=", Operator::Leq),
            (">=", Operator::Geq),
            ("<", Operator::Lt),
            (">", Operator::Gt),
            ("=", Operator::Eq),
        ] {
            if self.rest().starts_with(symbol) {
                self.pos += symbol.len();
                return Ok(op);
            }
        }
        Err(self.error("expected operator"))
    }

    fn value(&mut self) -> Result<Value, IndexerError> {
        if self.rest().starts_with('\'') {
            let start = self.pos + 1;
            let Some(len) = self.src[start..].find('\'') else {
                return Err(self.error("unterminated string"));
            };
            self.pos = start + len + 1;
            return Ok(Value::Str(self.src[start..start + len].to_string()));
        }
        let literal = self.take_while(|b| b.is_ascii_digit() || b == b'.' || b == b'-');
        match Number::parse(literal) {
            Some(n) => Ok(Value::Number(n)),
            None => Err(self.error("expected string or number")),
        }
    }

    /// Consume `word` (case-insensitive) if it is followed by a non-tag byte.
    fn keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        let Some(head) = rest.get(..word.len()) else {
            return false;
        };
        let boundary = rest
            .as_bytes()
            .get(word.len())
            .map_or(true, |b| !is_tag_byte(*b));
        if head.eq_ignore_ascii_case(word) && boundary {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && pred(bytes[self.pos]) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn skip_ws(&mut self) {
        self.take_while(|b| b.is_ascii_whitespace());
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, what: &str) -> IndexerError {
        IndexerError::query(format!("{what} at offset {} in {:?}", self.pos, self.src))
    }
}

fn is_tag_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}
