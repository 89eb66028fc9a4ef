use csv::StringRecord;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::debug;

use super::structures::{FieldType, RowSchema, UniformRow};

/// Build a row from delimited fields.
///
/// Returns `None` when the field count does not match the header.
pub fn text_row(
    schema: &RowSchema,
    record: &StringRecord,
    field_types: &HashMap<String, FieldType>,
) -> Option<UniformRow> {
    if record.len() != schema.len() {
        return None;
    }

    let mut row = UniformRow::new();
    for (name, raw) in schema.fields().iter().zip(record.iter()) {
        let value = match field_types.get(name) {
            Some(&field_type) => coerce(name, raw, field_type),
            None => Value::String(raw.to_string()),
        };
        row.insert(name.clone(), value);
    }
    Some(row)
}

/// Convert raw text to the declared type.
///
/// Empty text for a typed field is `null`. Text that does not parse stays a
/// string so no data is lost.
pub fn coerce(name: &str, raw: &str, field_type: FieldType) -> Value {
    let trimmed = raw.trim();
    if field_type != FieldType::String && trimmed.is_empty() {
        return Value::Null;
    }

    let parsed = match field_type {
        FieldType::String => return Value::String(raw.to_string()),
        FieldType::Integer => trimmed.parse::<i64>().ok().map(Value::from),
        FieldType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Value::Bool(true)),
            "false" | "0" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
    };

    parsed.unwrap_or_else(|| {
        debug!("Field {} value {:?} is not {:?}", name, raw, field_type);
        Value::String(raw.to_string())
    })
}

/// Build a row from one framed JSON element.
///
/// Returns `None` unless the element parses as an object.
pub fn json_row(element: &[u8]) -> Option<UniformRow> {
    match serde_json::from_slice::<Value>(element) {
        Ok(Value::Object(map)) => Some(UniformRow::from(map)),
        Ok(other) => {
            debug!("Skipping non-object element of type {}", json_kind(&other));
            None
        }
        Err(e) => {
            debug!("Skipping unparsable element: {}", e);
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a row from a decoded Parquet record
pub fn columnar_row(record: &parquet::record::Row) -> UniformRow {
    match record.to_json_value() {
        Value::Object(map) => UniformRow::from(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            UniformRow::from(map)
        }
    }
}
