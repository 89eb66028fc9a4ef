use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Identity fields shared by parts and entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonFields {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One dataset part as listed by the metadata service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePart {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(default)]
    pub url: String,
    /// Byte length, when the lister knows it
    #[serde(default)]
    pub length: Option<u64>,
}

impl RemotePart {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            common: CommonFields {
                id: id.into(),
                name: file_name(&url).to_string(),
            },
            url,
            length: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.common.id
    }
}

/// Fetchable handle for one physical file backing a part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingEntity {
    #[serde(flatten)]
    pub common: CommonFields,
    pub href: String,
    #[serde(default)]
    pub declared_length: Option<u64>,
}

impl ProcessingEntity {
    pub fn new(href: impl Into<String>) -> Self {
        let href = href.into();
        let name = file_name(&href).to_string();
        Self {
            common: CommonFields {
                id: name.clone(),
                name,
            },
            href,
            declared_length: None,
        }
    }

    /// File name used for format sniffing, falling back to the href
    pub fn file_name(&self) -> &str {
        if self.common.name.is_empty() {
            file_name(&self.href)
        } else {
            &self.common.name
        }
    }
}

/// Last path segment of a URL or path, ignoring any query string
fn file_name(href: &str) -> &str {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Wire format of a dataset, picked from the first entity's file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
    Columnar,
}

impl Format {
    /// Sniff the format from a file-name suffix
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(Format::Text),
            "json" | "jsonl" | "ndjson" => Some(Format::Json),
            "parquet" => Some(Format::Columnar),
            _ => None,
        }
    }
}

/// Next byte window to request from the active part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub offset: u64,
    pub length: u64,
}

impl FetchWindow {
    pub fn new(length: u64) -> Self {
        Self { offset: 0, length }
    }

    /// Inclusive last byte of the window: `offset + length`
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
}

/// Ordered field names of the active part
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSchema {
    fields: Vec<String>,
}

impl RowSchema {
    /// Build a schema from header names.
    ///
    /// A repeated name gets a numeric suffix (`a`, `a_1`, `a_2`) so that
    /// every column keeps its own key in the materialized row.
    pub fn new(names: Vec<String>) -> Self {
        let mut seen = HashSet::with_capacity(names.len());
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let mut unique = name.clone();
            let mut suffix = 1;
            while seen.contains(&unique) {
                unique = format!("{}_{}", name, suffix);
                suffix += 1;
            }
            seen.insert(unique.clone());
            fields.push(unique);
        }
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// One materialized record: field name to value, in field order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniformRow(Map<String, Value>);

impl UniformRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }
}

impl From<Map<String, Value>> for UniformRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl std::fmt::Display for UniformRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sniffing() {
        assert_eq!(Format::from_file_name("part-0001.csv"), Some(Format::Text));
        assert_eq!(Format::from_file_name("part.TXT"), Some(Format::Text));
        assert_eq!(Format::from_file_name("rows.json"), Some(Format::Json));
        assert_eq!(Format::from_file_name("rows.ndjson"), Some(Format::Json));
        assert_eq!(
            Format::from_file_name("batch.snappy.parquet"),
            Some(Format::Columnar)
        );
        assert_eq!(Format::from_file_name("archive.zip"), None);
        assert_eq!(Format::from_file_name("noext"), None);
    }

    #[test]
    fn test_entity_file_name_from_href() {
        let entity = ProcessingEntity::new("https://store.example.com/a/b/part-7.json?sig=abc");
        assert_eq!(entity.file_name(), "part-7.json");
        assert_eq!(entity.common.id, "part-7.json");
    }

    #[test]
    fn test_entity_decodes_flattened_common_fields() {
        let json = r#"{"id":"e1","name":"data.csv","href":"https://x/y","declared_length":42}"#;
        let entity: ProcessingEntity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.common.id, "e1");
        assert_eq!(entity.file_name(), "data.csv");
        assert_eq!(entity.declared_length, Some(42));
    }

    #[test]
    fn test_row_keeps_insertion_order() {
        let mut row = UniformRow::new();
        row.insert("zeta", Value::from(1));
        row.insert("alpha", Value::from(2));
        assert_eq!(row.fields().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(row.to_string(), r#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn test_window_end_is_inclusive() {
        let window = FetchWindow {
            offset: 10,
            length: 5,
        };
        assert_eq!(window.end(), 15);
    }

    #[test]
    fn test_schema_renames_repeated_headers() {
        let names = ["a", "a", "b", "a", "a_1"].map(String::from).to_vec();
        let schema = RowSchema::new(names);
        assert_eq!(schema.fields(), &["a", "a_1", "b", "a_2", "a_1_1"]);
    }
}
