//! Dynamic row cell values.
//!
//! Source rows are fetched without compile-time schemas, so cells are a small
//! dynamic enum. The canonical rendering feeds row fingerprints and must stay
//! stable across releases: changing it would invalidate every stored row hash
//! and force a full rewrite of hashed tables.

use std::fmt;

/// A single cell of a source or destination row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The textual form used for filters, scrub-source gathering, and PID
    /// comparison. Blobs have no textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null | Self::Blob(_) => None,
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Canonical rendering for row fingerprints. Distinct types render
    /// distinctly (`i:`, `r:`, `t:`, `b:`) so `Integer(1)` and `Text("1")`
    /// never collide.
    pub fn canonical(&self) -> String {
        match self {
            Self::Null => "n".to_string(),
            Self::Integer(i) => format!("i:{i}"),
            Self::Real(f) => format!("r:{f}"),
            Self::Text(s) => format!("t:{s}"),
            Self::Blob(b) => format!("b:{}", hex::encode(b)),
        }
    }

    /// Approximate in-memory size, used for commit-batch accounting.
    pub fn approx_bytes(&self) -> usize {
        match self {
            Self::Null => 1,
            Self::Integer(_) | Self::Real(_) => 8,
            Self::Text(s) => s.len(),
            Self::Blob(b) => b.len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        match s {
            Some(s) => Self::Text(s),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms_are_type_tagged() {
        assert_ne!(
            Value::Integer(1).canonical(),
            Value::Text("1".to_string()).canonical()
        );
        assert_eq!(Value::Null.canonical(), "n");
    }

    #[test]
    fn text_conversion() {
        assert_eq!(Value::Integer(42).as_text().as_deref(), Some("42"));
        assert_eq!(Value::Null.as_text(), None);
        assert_eq!(Value::Blob(vec![1, 2]).as_text(), None);
    }
}
