use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ChunkedReader, fetch_window};
use crate::error::{Error, Result};
use crate::io::RangeFetch;
use crate::record::framer::JsonFramer;
use crate::record::materialize::json_row;
use crate::record::{ProcessingEntity, UniformRow};

/// Chunked reader for a JSON array of objects.
///
/// Windows are requested back to back (`offset = limit + 1; limit += window`)
/// and fed to a [`JsonFramer`], which carries bracket depth and any partial
/// object from one window to the next. Objects parsed beyond what the caller
/// asked for wait in an overflow queue that is drained before the next fetch.
pub struct JsonChunkedReader<F: RangeFetch> {
    fetcher: Arc<F>,
    entity: ProcessingEntity,
    window_size: u64,
    offset: u64,
    limit: u64,
    framer: JsonFramer,
    overflow: VecDeque<UniformRow>,
    exhausted: bool,
    error_count: u64,
}

impl<F: RangeFetch> JsonChunkedReader<F> {
    pub fn new(fetcher: Arc<F>, entity: ProcessingEntity, window_size: u64) -> Self {
        let window_size = window_size.max(1);
        let exhausted = entity.declared_length == Some(0);
        Self {
            fetcher,
            entity,
            window_size,
            offset: 0,
            limit: window_size - 1,
            framer: JsonFramer::new(),
            overflow: VecDeque::new(),
            exhausted,
            error_count: 0,
        }
    }

    /// Fetch one window and return every object it completes
    async fn fetch_next(&mut self) -> Result<Vec<UniformRow>> {
        let href = &self.entity.href;
        let resp = fetch_window(&*self.fetcher, href, self.offset, self.limit).await?;
        let content_range = resp.content_range;
        let done = content_range.reaches_end();

        if !done && content_range.next_offset() != self.limit + 1 {
            return Err(Error::protocol(
                href,
                format!(
                    "asked for bytes {}-{} of {} but got {:?}",
                    self.offset, self.limit, content_range.total, content_range.span
                ),
            ));
        }

        let frames = self.framer.push(&resp.bytes);
        self.error_count += frames.malformed;

        let mut rows = Vec::with_capacity(frames.elements.len());
        for element in &frames.elements {
            match json_row(element) {
                Some(row) => rows.push(row),
                None => {
                    self.error_count += 1;
                    warn!("{}: dropping malformed element of {} bytes", href, element.len());
                }
            }
        }

        debug!(
            "{}: bytes {}-{}/{} gave {} objects, {} residual bytes",
            href,
            self.offset,
            self.limit,
            content_range.total,
            rows.len(),
            self.framer.residual_len()
        );

        if done {
            let unfinished = self.framer.finish();
            if unfinished > 0 {
                warn!("{}: stream ended inside an unbalanced element", href);
            }
            self.error_count += unfinished;
            self.exhausted = true;
        }

        self.offset = self.limit + 1;
        self.limit += self.window_size;
        Ok(rows)
    }
}

#[async_trait]
impl<F: RangeFetch + 'static> ChunkedReader for JsonChunkedReader<F> {
    async fn read(&mut self, budget: usize) -> Result<Vec<UniformRow>> {
        if !self.overflow.is_empty() {
            let take = budget.min(self.overflow.len());
            return Ok(self.overflow.drain(..take).collect());
        }
        if self.exhausted {
            return Ok(Vec::new());
        }

        let mut rows = self.fetch_next().await?;
        if rows.len() > budget {
            self.overflow.extend(rows.drain(budget..));
        }
        Ok(rows)
    }

    fn has_more(&self) -> bool {
        !self.exhausted || !self.overflow.is_empty()
    }

    fn error_count(&self) -> u64 {
        self.error_count
    }
}
