//! Property-list values as stored in the network preferences.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A proxy settings dictionary keyed by setting name.
pub type ProxyDict = BTreeMap<String, PrefValue>;

/// A property-list value.
///
/// Equality is structural. Dictionaries compare independent of key order. A
/// [`PrefValue::Bool`] equals the [`PrefValue::Integer`] `0` or `1` with the
/// same truth value, because the preferences store keeps enable flags as
/// numbers whichever form was written. Every value equals itself, including
/// a NaN [`PrefValue::Real`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// String.
    String(String),
    /// Ordered list.
    Array(Vec<PrefValue>),
    /// Nested dictionary.
    Dictionary(BTreeMap<String, PrefValue>),
    /// A value of a type the proxy settings never hold (data, dates, ...),
    /// kept as its description so the key stays visible when comparing.
    Opaque(String),
}

impl PrefValue {
    /// Returns the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested dictionary, if this is one.
    pub fn as_dict(&self) -> Option<&BTreeMap<String, PrefValue>> {
        match self {
            Self::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the mutable nested dictionary, if this is one.
    pub fn as_dict_mut(&mut self) -> Option<&mut BTreeMap<String, PrefValue>> {
        match self {
            Self::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }
}

impl PartialEq for PrefValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Dictionary(a), Self::Dictionary(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits() || a == b,
            (Self::Opaque(a), Self::Opaque(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u16> for PrefValue {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<PrefValue>> From<Vec<T>> for PrefValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<ProxyDict> for PrefValue {
    fn from(value: ProxyDict) -> Self {
        Self::Dictionary(value)
    }
}
