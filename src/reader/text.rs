use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ChunkedReader, fetch_window};
use crate::config::ReaderConfig;
use crate::error::Result;
use crate::io::RangeFetch;
use crate::record::framer::{complete_lines_len, parse_delimited};
use crate::record::materialize::text_row;
use crate::record::{FetchWindow, ProcessingEntity, RowSchema, UniformRow};

/// Chunked reader for delimited text.
///
/// Each fetch asks for `[offset, offset + window]`. The bytes after the last
/// line terminator are held back and prepended to the next fetch, so records
/// never break at a window edge. The first record of the part is its header.
pub struct TextChunkedReader<F: RangeFetch> {
    fetcher: Arc<F>,
    entity: ProcessingEntity,
    config: Arc<ReaderConfig>,
    window: FetchWindow,
    /// Learned from the first response and trusted from then on
    total_length: Option<u64>,
    residual: Vec<u8>,
    schema: Option<RowSchema>,
    /// Parsed rows not yet handed out
    pending: VecDeque<UniformRow>,
    exhausted: bool,
    error_count: u64,
}

impl<F: RangeFetch> TextChunkedReader<F> {
    pub fn new(fetcher: Arc<F>, entity: ProcessingEntity, config: Arc<ReaderConfig>) -> Self {
        let window = FetchWindow::new(config.window_size);
        let exhausted = entity.declared_length == Some(0);
        Self {
            fetcher,
            entity,
            config,
            window,
            total_length: None,
            residual: Vec::new(),
            schema: None,
            pending: VecDeque::new(),
            exhausted,
            error_count: 0,
        }
    }

    /// Header captured from the part, once seen
    pub fn schema(&self) -> Option<&RowSchema> {
        self.schema.as_ref()
    }

    async fn fetch_next(&mut self) -> Result<()> {
        let href = &self.entity.href;
        let resp = fetch_window(&*self.fetcher, href, self.window.offset, self.window.end()).await?;
        let content_range = resp.content_range;

        let total = match self.total_length {
            Some(total) => {
                if content_range.total != total {
                    warn!(
                        "{} changed length from {} to {} while reading; keeping {}",
                        href, total, content_range.total, total
                    );
                }
                total
            }
            None => {
                if let Some(declared) = self.entity.declared_length {
                    if declared != content_range.total {
                        warn!(
                            "{} declared {} bytes but the store reports {}",
                            href, declared, content_range.total
                        );
                    }
                }
                self.total_length = Some(content_range.total);
                content_range.total
            }
        };

        // Servers clamp the last window, so this is offset + window + 1 except at the end
        let next_offset = content_range.next_offset();
        let final_chunk = next_offset >= total;

        let mut buf = std::mem::take(&mut self.residual);
        buf.extend_from_slice(&resp.bytes);
        let complete = complete_lines_len(&buf, final_chunk);
        self.residual = buf.split_off(complete);

        debug!(
            "{}: window {}-{} gave {} complete bytes, {} residual",
            href,
            self.window.offset,
            self.window.end(),
            buf.len(),
            self.residual.len()
        );

        let parsed = parse_delimited(&buf, self.config.delimiter, self.config.escape);
        self.error_count += parsed.malformed;

        for record in parsed.records {
            let Some(ref schema) = self.schema else {
                let fields = record
                    .iter()
                    .enumerate()
                    .map(|(i, f)| {
                        if i == 0 {
                            f.trim_start_matches('\u{feff}').to_string()
                        } else {
                            f.to_string()
                        }
                    })
                    .collect::<Vec<String>>();
                let schema = RowSchema::new(fields.clone());
                if schema.fields() != fields.as_slice() {
                    warn!(
                        "{}: repeated header names, reading columns as {:?}",
                        href,
                        schema.fields()
                    );
                }
                self.schema = Some(schema);
                continue;
            };

            match text_row(schema, &record, &self.config.field_types) {
                Some(row) => self.pending.push_back(row),
                None => {
                    self.error_count += 1;
                    warn!(
                        "{}: dropping record with {} fields, header has {}",
                        href,
                        record.len(),
                        schema.len()
                    );
                }
            }
        }

        self.window.offset = next_offset;
        if final_chunk {
            self.exhausted = true;
            self.residual.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl<F: RangeFetch + 'static> ChunkedReader for TextChunkedReader<F> {
    async fn read(&mut self, budget: usize) -> Result<Vec<UniformRow>> {
        if self.pending.is_empty() && !self.exhausted {
            self.fetch_next().await?;
        }
        let take = budget.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn has_more(&self) -> bool {
        !self.exhausted || !self.pending.is_empty()
    }

    fn error_count(&self) -> u64 {
        self.error_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFetcher;
    use serde_json::Value;

    fn open_reader(data: &'static [u8], window: u64) -> (Arc<MemoryFetcher>, TextChunkedReader<MemoryFetcher>) {
        let fetcher = Arc::new(MemoryFetcher::new().with_object("mem://t.csv", data));
        let config = Arc::new(ReaderConfig::default().with_window_size(window).unwrap());
        let entity = ProcessingEntity::new("mem://t.csv");
        (fetcher.clone(), TextChunkedReader::new(fetcher, entity, config))
    }

    async fn drain(reader: &mut TextChunkedReader<MemoryFetcher>, budget: usize) -> Vec<UniformRow> {
        let mut rows = Vec::new();
        while reader.has_more() {
            rows.extend(reader.read(budget).await.unwrap());
        }
        rows
    }

    fn column(rows: &[UniformRow], field: &str) -> Vec<String> {
        rows.iter()
            .map(|r| r.get(field).and_then(Value::as_str).unwrap_or("").to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_records_survive_every_window_size() {
        let data: &[u8] = b"id,name\n1,alpha\n2,beta\r\n3,gamma\n4,delta";
        for window in 1..=data.len() as u64 + 2 {
            let (_, mut reader) = open_reader(data, window);
            let rows = drain(&mut reader, 2).await;
            assert_eq!(column(&rows, "id"), vec!["1", "2", "3", "4"], "window {}", window);
            assert_eq!(
                column(&rows, "name"),
                vec!["alpha", "beta", "gamma", "delta"],
                "window {}",
                window
            );
            assert_eq!(reader.error_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_mid_row_split() {
        // Window of 5 requests 6 bytes: "a,b\nc," then "d\n" completes the row
        let (fetcher, mut reader) = open_reader(b"a,b\nc,d\n", 5);
        let rows = drain(&mut reader, 10).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Value::from("c")));
        assert_eq!(rows[0].get("b"), Some(&Value::from("d")));
        assert_eq!(reader.schema().unwrap().fields(), &["a", "b"]);
        assert_eq!(reader.error_count(), 0);
        assert_eq!(fetcher.range_requests(), 2);
    }

    #[tokio::test]
    async fn test_column_mismatch_is_counted_and_dropped() {
        let (_, mut reader) = open_reader(b"a,b\n1,2,3\n4,5\n", 1024);
        let rows = drain(&mut reader, 10).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Value::from("4")));
        assert_eq!(reader.error_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_rows_drain_without_fetching() {
        let (fetcher, mut reader) = open_reader(b"h\n1\n2\n3\n", 1024);
        let first = reader.read(1).await.unwrap();
        assert_eq!(column(&first, "h"), vec!["1"]);
        assert_eq!(fetcher.range_requests(), 1);

        let rest = reader.read(5).await.unwrap();
        assert_eq!(column(&rest, "h"), vec!["2", "3"]);
        assert_eq!(fetcher.range_requests(), 1);
        assert!(!reader.has_more());
    }

    #[tokio::test]
    async fn test_header_only_and_empty_parts() {
        let (_, mut reader) = open_reader(b"a,b\n", 1024);
        assert!(drain(&mut reader, 10).await.is_empty());
        assert_eq!(reader.error_count(), 0);

        let (fetcher, mut empty) = open_reader(b"", 1024);
        assert!(drain(&mut empty, 10).await.is_empty());
        assert_eq!(fetcher.range_requests(), 1);
    }

    #[tokio::test]
    async fn test_declared_empty_entity_is_never_fetched() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let mut entity = ProcessingEntity::new("mem://missing.csv");
        entity.declared_length = Some(0);
        let reader = TextChunkedReader::new(fetcher.clone(), entity, Arc::new(ReaderConfig::default()));
        assert!(!reader.has_more());
        assert_eq!(fetcher.range_requests(), 0);
    }

    #[tokio::test]
    async fn test_bom_is_stripped_from_header() {
        let (_, mut reader) = open_reader(b"\xEF\xBB\xBFid,v\n1,2\n", 1024);
        let rows = drain(&mut reader, 10).await;
        assert_eq!(rows[0].fields().collect::<Vec<_>>(), vec!["id", "v"]);
    }

    #[tokio::test]
    async fn test_repeated_header_names_keep_every_column() {
        let (_, mut reader) = open_reader(b"a,a,b\n1,2,3\n", 1024);
        let rows = drain(&mut reader, 10).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to_string(), r#"{"a":"1","a_1":"2","b":"3"}"#);
        assert_eq!(reader.error_count(), 0);
    }
}
