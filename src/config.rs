//! Reader and HTTP configuration.
//!
//! Nothing here is owned by the readers: the window size is fixed per
//! reader, the delimiter and escape come from the dataset descriptor, and
//! credentials come from whoever builds the fetcher.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::metadata::DatasetDescriptor;
use crate::record::FieldType;

/// Default fetch window: 8 MiB.
pub const DEFAULT_WINDOW_SIZE: u64 = 8 * 1024 * 1024;

/// Settings shared by all chunked readers of one facade
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Bytes requested per byte-range fetch
    pub window_size: u64,
    /// Field delimiter for delimited text
    pub delimiter: u8,
    /// Escape character for delimited text
    pub escape: Option<u8>,
    /// Declared field types, consulted when materializing text rows
    pub field_types: HashMap<String, FieldType>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            delimiter: b',',
            escape: Some(b'\\'),
            field_types: HashMap::new(),
        }
    }
}

impl ReaderConfig {
    /// Overlay the settings a dataset descriptor declares
    pub fn with_descriptor(mut self, descriptor: &DatasetDescriptor) -> Result<Self> {
        if let Some(ref delimiter) = descriptor.delimiter {
            self.delimiter = single_byte("delimiter", delimiter)?;
        }
        if let Some(ref escape) = descriptor.escape {
            self.escape = if escape.is_empty() {
                None
            } else {
                Some(single_byte("escape", escape)?)
            };
        }
        for field in &descriptor.fields {
            self.field_types.insert(field.name.clone(), field.field_type);
        }
        Ok(self)
    }

    pub fn with_window_size(mut self, window_size: u64) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::Config("window size must be positive".to_string()));
        }
        self.window_size = window_size;
        Ok(self)
    }
}

/// Accept exactly one ASCII character, with `\t` spelled out for tabs
fn single_byte(what: &str, value: &str) -> Result<u8> {
    if value == "\\t" {
        return Ok(b'\t');
    }
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(Error::Config(format!(
            "{} must be a single ASCII character, got {:?}",
            what, value
        ))),
    }
}

/// Settings for [`HttpRangeFetcher`](crate::io::HttpRangeFetcher)
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts allowed for timeouts and connect failures
    pub max_retries: u32,
    /// Base delay; attempt `n` sleeps `n * backoff`
    pub backoff: Duration,
    /// Sent as `Authorization: Bearer <token>`
    pub bearer_token: Option<String>,
    /// Header carrying the organization id
    pub org_header: String,
    pub org_id: Option<String>,
    /// Ignore `HTTP_PROXY` and friends from the environment
    pub no_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 10,
            backoff: Duration::from_millis(500),
            bearer_token: None,
            org_header: "x-org-id".to_string(),
            org_id: None,
            no_proxy: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldSpec;

    #[test]
    fn test_descriptor_overrides_defaults() {
        let descriptor = DatasetDescriptor {
            delimiter: Some("|".to_string()),
            escape: Some(String::new()),
            fields: vec![FieldSpec {
                name: "qty".to_string(),
                field_type: FieldType::Integer,
            }],
            ..Default::default()
        };
        let config = ReaderConfig::default().with_descriptor(&descriptor).unwrap();
        assert_eq!(config.delimiter, b'|');
        assert_eq!(config.escape, None);
        assert_eq!(config.field_types.get("qty"), Some(&FieldType::Integer));
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn test_tab_delimiter() {
        let descriptor = DatasetDescriptor {
            delimiter: Some("\\t".to_string()),
            ..Default::default()
        };
        let config = ReaderConfig::default().with_descriptor(&descriptor).unwrap();
        assert_eq!(config.delimiter, b'\t');
    }

    #[test]
    fn test_rejects_multi_char_delimiter() {
        let descriptor = DatasetDescriptor {
            delimiter: Some("::".to_string()),
            ..Default::default()
        };
        assert!(ReaderConfig::default().with_descriptor(&descriptor).is_err());
    }

    #[test]
    fn test_rejects_zero_window() {
        assert!(ReaderConfig::default().with_window_size(0).is_err());
    }
}
