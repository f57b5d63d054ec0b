//! Natural ("human") string ordering
//!
//! Splits a string into maximal digit runs and non-digit runs, so that
//! `chr2 < chr10 < chr22 < chrX`. Digit runs compare by numeric value of
//! arbitrary length (no integer parsing, no overflow). At a position where
//! one key has a digit run and the other a text run, the digit run sorts
//! first.

use std::cmp::Ordering;
use std::fmt;

/// One run of a natural key
#[derive(Debug, Clone)]
pub enum Token {
    /// Maximal run of ASCII digits, original text preserved
    Number(String),
    /// Maximal run of anything else
    Text(String),
}

impl Token {
    pub fn as_str(&self) -> &str {
        match self {
            Token::Number(s) | Token::Text(s) => s,
        }
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Number(a), Token::Number(b)) => compare_digits(a, b),
            (Token::Number(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Number(_)) => Ordering::Greater,
            (Token::Text(a), Token::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Token {}

/// Sortable key: compared lexicographically token by token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<Token>);

impl NaturalKey {
    pub fn new(s: &str) -> Self {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for c in s.chars() {
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != in_digits {
                tokens.push(make_token(std::mem::take(&mut current), in_digits));
            }
            in_digits = is_digit;
            current.push(c);
        }
        if !current.is_empty() {
            tokens.push(make_token(current, in_digits));
        }

        NaturalKey(tokens)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }
}

impl From<&str> for NaturalKey {
    fn from(s: &str) -> Self {
        NaturalKey::new(s)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.0 {
            f.write_str(token.as_str())?;
        }
        Ok(())
    }
}

fn make_token(run: String, digits: bool) -> Token {
    if digits {
        Token::Number(run)
    } else {
        Token::Text(run)
    }
}

/// Compare two ASCII digit strings by numeric value
///
/// Leading zeros are ignored, so `"007"` and `"7"` compare equal.
pub fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Natural comparison of two strings
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    NaturalKey::new(a).cmp(&NaturalKey::new(b))
}

/// Sort strings in natural order; ties fall back to plain byte order
pub fn sort_natural<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by_cached_key(|s| (NaturalKey::new(s.as_ref()), s.as_ref().to_string()));
}
