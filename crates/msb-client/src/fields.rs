//! Alias-tolerant field lookup for orchestrator payloads.
//!
//! The orchestrator does not pin down key spellings across versions, so each
//! logical field is declared once as an ordered [`Aliases`] table. Lookups
//! take the first alias whose value has the expected JSON type; a key that is
//! present with the wrong type is skipped, not treated as a match.

use serde_json::Value;

/// Ordered list of accepted keys for one logical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aliases(pub &'static [&'static str]);

impl Aliases {
    /// Keys in lookup order.
    pub fn keys(&self) -> &'static [&'static str] {
        self.0
    }

    fn find<'a, T>(&self, payload: &'a Value, pick: impl Fn(&'a Value) -> Option<T>) -> Option<T> {
        let object = payload.as_object()?;
        self.0
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(pick)
    }

    /// First numeric value.
    pub fn number(&self, payload: &Value) -> Option<f64> {
        self.find(payload, Value::as_f64)
    }

    /// First numeric value as an integer; fractional values are truncated.
    pub fn integer(&self, payload: &Value) -> Option<i64> {
        self.find(payload, |v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }

    /// First numeric value as a non-negative count, zero when absent.
    pub fn count(&self, payload: &Value) -> u64 {
        self.find(payload, |v| {
            v.as_u64()
                .or_else(|| v.as_f64().map(|f| if f > 0.0 { f as u64 } else { 0 }))
        })
        .unwrap_or(0)
    }

    /// First string value.
    pub fn text<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        self.find(payload, Value::as_str)
    }

    /// First non-empty string value; blank strings fall through to later
    /// aliases.
    pub fn non_empty_text<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        self.find(payload, |v| v.as_str().filter(|s| !s.is_empty()))
    }

    /// First array value.
    pub fn array<'a>(&self, payload: &'a Value) -> Option<&'a Vec<Value>> {
        self.find(payload, Value::as_array)
    }

    /// First boolean value.
    pub fn flag(&self, payload: &Value) -> Option<bool> {
        self.find(payload, Value::as_bool)
    }
}
