//! Scalar cell values shared by stored rows and snapshots
//!
//! Values read from the database keep their column type; values read from a
//! CSV snapshot are plain strings. Both sides meet in [`Value::normalized`],
//! which is the only representation used for equality and key lookup.

use chrono::{NaiveDate, NaiveDateTime};

/// Token written for `true` when a value is normalized
pub const TRUE_TOKEN: &str = "TRUE";
/// Token written for `false` when a value is normalized
pub const FALSE_TOKEN: &str = "FALSE";

/// A single cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null/empty value
    #[default]
    Null,
    /// Text value
    String(String),
    /// Whole number
    Int(i64),
    /// Floating point
    Float(f64),
    /// Arbitrary precision number, kept as the server rendered it
    Numeric(String),
    /// Boolean
    Bool(bool),
    /// Calendar day
    Date(NaiveDate),
    /// Timestamp (timezone-aware columns are converted to UTC first)
    DateTime(NaiveDateTime),
}

impl Value {
    /// True for null and for strings that normalize to nothing
    pub fn is_empty(&self) -> bool {
        self.normalized().is_empty()
    }

    /// A `real` column value, widened through its shortest decimal form so
    /// `0.1f32` stays `0.1` instead of `0.10000000149011612`
    pub fn from_f32(f: f32) -> Self {
        Value::Float(f.to_string().parse().unwrap_or(f64::from(f)))
    }

    /// Equality after normalization.
    ///
    /// Text compared with a number is read as a decimal first, so `10.50`
    /// matches a stored `10.5`.
    pub fn matches(&self, other: &Value) -> bool {
        self.normalized_against(other) == other.normalized_against(self)
    }

    fn normalized_against(&self, other: &Value) -> String {
        match (self, other) {
            (Value::String(s), Value::Int(_) | Value::Float(_) | Value::Numeric(_))
                if is_decimal(s) =>
            {
                canonical_decimal(s)
            }
            _ => self.normalized(),
        }
    }

    /// Canonical text used for comparison and lookup.
    ///
    /// - numbers become canonical decimal strings (`10.50` → `10.5`, `3.0` → `3`)
    /// - dates and timestamps become the ISO calendar day (`2024-03-01`)
    /// - null becomes the empty string
    /// - booleans become `TRUE` / `FALSE`
    pub fn normalized(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => canonical_float(*f),
            Value::Numeric(n) => canonical_decimal(n),
            Value::Bool(true) => TRUE_TOKEN.to_string(),
            Value::Bool(false) => FALSE_TOKEN.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.date().format("%Y-%m-%d").to_string(),
        }
    }

    /// Text bound as a statement parameter; `None` is SQL NULL.
    ///
    /// Empty strings are written as NULL. Timestamps keep their time of day,
    /// unlike [`Value::normalized`].
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            other => Some(other.normalized()),
        }
    }
}

/// Render a float without exponent or trailing zeros
fn canonical_float(f: f64) -> String {
    if f == 0.0 {
        // Avoid "-0"
        return "0".to_string();
    }
    // f64's Display is the shortest round-trip form and never uses an exponent
    f.to_string()
}

/// Plain decimal literal: optional sign, digits, optional fraction
fn is_decimal(s: &str) -> bool {
    let s = s.trim();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    (!whole.is_empty() || !fraction.is_empty())
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit())
}

/// Strip insignificant zeros and signs from a decimal string
fn canonical_decimal(n: &str) -> String {
    let trimmed = n.trim();
    if !is_decimal(trimmed) {
        // NaN and friends
        return trimmed.to_string();
    }

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    let whole = match whole.trim_start_matches('0') {
        "" => "0",
        whole => whole,
    };
    let fraction = fraction.trim_end_matches('0');

    let magnitude = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };
    if negative && magnitude != "0" {
        format!("-{}", magnitude)
    } else {
        magnitude
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "(null)"),
            other => write!(f, "{}", other.normalized()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
