//! Encoders used to embed structured data in a message.

use serde::Serialize;
use serde_json::Value;

use crate::error::LLMError;

/// Turns a serializable value into message bytes.
pub trait Serializer {
    fn serialize<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, LLMError>;
}

/// Compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, LLMError> {
        serde_json::to_vec(value)
            .map_err(|err| LLMError::input(format!("could not serialize value to JSON: {err}")))
    }
}

/// One JSON document per line.
///
/// Sequences are written one element per line; any other value is written as a
/// single line.
///
/// # Examples
///
/// ```
/// use kotoba_adapter::serializer::{JsonLinesSerializer, Serializer};
///
/// let rows = vec![vec!["one", "two"], vec!["three", "four"]];
/// let bytes = JsonLinesSerializer.serialize(&rows).unwrap();
/// assert_eq!(String::from_utf8(bytes).unwrap(), "[\"one\",\"two\"]\n[\"three\",\"four\"]\n");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesSerializer;

impl Serializer for JsonLinesSerializer {
    fn serialize<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, LLMError> {
        let value = serde_json::to_value(value).map_err(|err| {
            LLMError::input(format!("could not serialize value to JSON lines: {err}"))
        })?;
        let rows = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        let mut out = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut out, &row).map_err(|err| {
                LLMError::input(format!("could not serialize value to JSON lines: {err}"))
            })?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

/// CSV rows.
///
/// Accepts a sequence of sequences of strings; any other shape is rejected.
///
/// # Examples
///
/// ```
/// use kotoba_adapter::serializer::{CsvSerializer, Serializer};
///
/// let rows = vec![vec!["name", "note"], vec!["Ada", "first, programmer"]];
/// let bytes = CsvSerializer.serialize(&rows).unwrap();
/// assert_eq!(String::from_utf8(bytes).unwrap(), "name,note\nAda,\"first, programmer\"\n");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSerializer;

impl Serializer for CsvSerializer {
    fn serialize<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, LLMError> {
        let value = serde_json::to_value(value)
            .map_err(|err| LLMError::input(format!("could not serialize value to CSV: {err}")))?;
        let rows = csv_rows(&value)
            .ok_or_else(|| LLMError::input("CSV serializer accepts rows of strings"))?;

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        for row in rows {
            writer
                .write_record(row)
                .map_err(|err| LLMError::input(format!("could not write CSV row: {err}")))?;
        }
        writer
            .into_inner()
            .map_err(|err| LLMError::input(format!("could not flush CSV output: {}", err.error())))
    }
}

fn csv_rows(value: &Value) -> Option<Vec<Vec<&str>>> {
    value
        .as_array()?
        .iter()
        .map(|row| {
            row.as_array()?
                .iter()
                .map(Value::as_str)
                .collect::<Option<Vec<_>>>()
        })
        .collect()
}
