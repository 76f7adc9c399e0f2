//! Named parameter binding
//!
//! Command templates refer to values as `@Name`. A [`Params`] bag supplies
//! those values by name; [`bind_named`] walks the placeholders of a prepared
//! statement and binds the matching entries. A placeholder without a matching
//! entry is an error; bind `None` to store NULL.

use std::fmt;

use rusqlite::types::{ToSql, Value};
use rusqlite::Statement;
use serde::Serialize;

use crate::error::Result;

pub(crate) type BoxedValue = Box<dyn ToSql + Send + Sync>;

/// Ordered set of named statement parameters.
#[derive(Default)]
pub struct Params {
    values: Vec<(String, BoxedValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value, replacing any previous value with the same name.
    pub fn with<V>(mut self, name: &str, value: V) -> Self
    where
        V: ToSql + Send + Sync + 'static,
    {
        self.set(name, value);
        self
    }

    /// Set a named value in place.
    pub fn set<V>(&mut self, name: &str, value: V)
    where
        V: ToSql + Send + Sync + 'static,
    {
        let boxed: BoxedValue = Box::new(value);
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = boxed,
            None => self.values.push((name.to_string(), boxed)),
        }
    }

    /// Bind every top-level field of a serializable object.
    ///
    /// ```rust,ignore
    /// let params = Params::from_serialize(&serde_json::json!({ "CustomerName": "Peter" }))?;
    /// ```
    pub fn from_serialize<S: Serialize + ?Sized>(object: &S) -> Result<Self> {
        let serde_json::Value::Object(map) = serde_json::to_value(object)? else {
            return Err(<serde_json::Error as serde::ser::Error>::custom(
                "parameters must serialize to an object with named fields",
            )
            .into());
        };

        let mut params = Params::new();
        for (name, value) in map {
            params.set(&name, json_to_sql(value));
        }
        Ok(params)
    }

    /// Look up a value by name; falls back to a case-insensitive match.
    pub fn get(&self, name: &str) -> Option<&(dyn ToSql + Send + Sync)> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.values.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)))
            .map(|(_, v)| v.as_ref())
    }

    /// Remove a value by name, with the same lookup rules as [`Params::get`].
    pub(crate) fn take(&mut self, name: &str) -> Option<BoxedValue> {
        let position = self
            .values
            .iter()
            .position(|(n, _)| n == name)
            .or_else(|| self.values.iter().position(|(n, _)| n.eq_ignore_ascii_case(name)))?;
        Some(self.values.remove(position).1)
    }

    pub(crate) fn push_boxed(&mut self, name: String, value: BoxedValue) {
        self.values.push((name, value));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn json_to_sql(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(b as i64),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Text(s),
        nested => Value::Text(nested.to_string()),
    }
}

/// Bind `params` to the named placeholders of a prepared statement.
///
/// Fails with [`rusqlite::Error::InvalidParameterName`] for the first
/// placeholder that has no value in `params`.
pub fn bind_named(stmt: &mut Statement<'_>, params: &Params) -> rusqlite::Result<()> {
    for index in 1..=stmt.parameter_count() {
        let Some(placeholder) = stmt.parameter_name(index) else {
            continue;
        };
        let name = placeholder
            .trim_start_matches(|c| matches!(c, '@' | ':' | '$'))
            .to_string();
        match params.get(&name) {
            Some(value) => stmt.raw_bind_parameter(index, value)?,
            None => return Err(rusqlite::Error::InvalidParameterName(format!("@{}", name))),
        }
    }
    Ok(())
}
