//! Row mapping helpers.
//!
//! Turns a [`StatementResult`] into name-addressable rows or JSON text.

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{Col, LibsqlError, StatementResult, Value};

/// Lightweight row view for name-based access helpers.
#[derive(Clone, Copy, Debug)]
pub struct RowRef<'a> {
    /// Query columns aligned with `values`.
    pub cols: &'a [Col],
    /// Row values aligned with `cols`.
    pub values: &'a [Value],
}

impl<'a> RowRef<'a> {
    /// Returns a value by case-insensitive column name.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let idx = self
            .cols
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(name))?;
        self.values.get(idx)
    }

    /// Returns an integer value by column name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a float value by column name.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a text value by column name.
    pub fn get_text(&self, name: &str) -> Option<&'a str> {
        match self.get(name)? {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns a blob value by column name.
    pub fn get_blob(&self, name: &str) -> Option<&'a [u8]> {
        match self.get(name)? {
            Value::Blob(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Column name / value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.cols
            .iter()
            .map(|col| col.name.as_str())
            .zip(self.values.iter())
    }

    /// Owned name/value pairs in column order.
    pub fn to_owned_pairs(&self) -> Vec<(String, Value)> {
        self.iter()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect()
    }

    /// JSON object keyed by column name, in column order.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.iter()
            .map(|(name, value)| (name.to_owned(), value_to_json(value)))
            .collect()
    }
}

/// Zips columns with each row.
pub fn to_rows(result: &StatementResult) -> Vec<RowRef<'_>> {
    result.rows_iter().collect()
}

/// Serializes rows as a JSON array of objects.
pub fn to_text(result: &StatementResult) -> String {
    serde_json::Value::Array(
        result
            .rows_iter()
            .map(|row| serde_json::Value::Object(row.to_json()))
            .collect(),
    )
    .to_string()
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(value) => (*value).into(),
        Value::Float(value) => serde_json::Number::from_f64(*value)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(value) => value.clone().into(),
        Value::Blob(bytes) => STANDARD.encode(bytes).into(),
    }
}

/// How a result set should be materialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    /// Rows as name/value views.
    Assoc,
    /// Rows serialized as JSON text.
    Obj,
    /// The decoded result untouched.
    Raw,
}

impl FromStr for FetchMode {
    type Err = LibsqlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assoc" | "1" => Ok(Self::Assoc),
            "obj" | "2" => Ok(Self::Obj),
            "raw" | "3" => Ok(Self::Raw),
            _ => Err(LibsqlError::UndefinedFetchOption(value.to_owned())),
        }
    }
}

impl TryFrom<u8> for FetchMode {
    type Error = LibsqlError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Assoc),
            2 => Ok(Self::Obj),
            3 => Ok(Self::Raw),
            other => Err(LibsqlError::UndefinedFetchOption(other.to_string())),
        }
    }
}

/// Materialized result set.
#[derive(Debug)]
pub enum Fetched<'a> {
    Rows(Vec<RowRef<'a>>),
    Text(String),
    Raw(&'a StatementResult),
}

pub fn fetch(result: &StatementResult, mode: FetchMode) -> Fetched<'_> {
    match mode {
        FetchMode::Assoc => Fetched::Rows(to_rows(result)),
        FetchMode::Obj => Fetched::Text(to_text(result)),
        FetchMode::Raw => Fetched::Raw(result),
    }
}
