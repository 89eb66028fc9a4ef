//! Pull-based record readers.
//!
//! ## Architecture
//!
//! - [`sequencer`]: walks parts and their processing entities in order
//! - [`text`]: delimited text over byte-range windows
//! - [`json`]: JSON arrays of objects over byte-range windows
//! - [`columnar`]: Parquet, downloaded whole and decoded by the codec
//!
//! [`RecordReader`] ties them together: it picks the format from the first
//! entity's file name, opens one [`ChunkedReader`] per entity, and moves to
//! the next entity when the current one runs dry.
//!
//! ## Execution model
//!
//! Everything happens inside [`RecordReader::read`]. There is no prefetch
//! and no background task; a fetch is issued only when every buffered row
//! has been handed out.

mod columnar;
mod json;
mod sequencer;
mod text;

pub use columnar::ColumnarReader;
pub use json::JsonChunkedReader;
pub use sequencer::PartSequencer;
pub use text::TextChunkedReader;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::io::{RangeFetch, RangeResponse};
use crate::metadata::{MetadataService, PartFilter};
use crate::record::{Format, ProcessingEntity, UniformRow};

/// Reader over a single processing entity
#[async_trait]
pub trait ChunkedReader: Send {
    /// Return at most `budget` rows.
    ///
    /// May return fewer, or none, while [`has_more`](Self::has_more) is
    /// still true; callers keep pulling.
    async fn read(&mut self, budget: usize) -> Result<Vec<UniformRow>>;

    /// False once the entity is exhausted and every buffered row is handed out
    fn has_more(&self) -> bool;

    /// Malformed records skipped so far
    fn error_count(&self) -> u64;
}

/// Fetch `start..=end` and check the response is the window that was asked for
pub(crate) async fn fetch_window<F: RangeFetch + ?Sized>(
    fetcher: &F,
    href: &str,
    start: u64,
    end: u64,
) -> Result<RangeResponse> {
    let resp = fetcher.fetch_range(href, start, end).await?;
    resp.validate(href)?;
    if let Some((served_start, _)) = resp.content_range.span {
        if served_start != start {
            return Err(Error::protocol(
                href,
                format!("asked for offset {} but got {}", start, served_start),
            ));
        }
    }
    Ok(resp)
}

/// Format-agnostic row reader over a whole dataset view.
///
/// ## Example
///
/// ```no_run
/// use std::sync::Arc;
/// use rowrange::{HttpConfig, HttpRangeFetcher, ManifestMetadata, PartFilter, ReaderConfig, RecordReader};
///
/// # async fn run() -> rowrange::Result<()> {
/// let fetcher = Arc::new(HttpRangeFetcher::new(&HttpConfig::default())?);
/// let metadata = Arc::new(ManifestMetadata::from_urls("sales", ["https://example.com/part-0.csv"]));
/// let mut reader = RecordReader::open(
///     fetcher,
///     metadata,
///     "sales",
///     &PartFilter::default(),
///     ReaderConfig::default(),
/// )
/// .await?;
///
/// while reader.has_more_data() {
///     for row in reader.read(1000).await? {
///         println!("{}", row);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct RecordReader<F: RangeFetch + 'static, M: MetadataService> {
    fetcher: Arc<F>,
    sequencer: PartSequencer<M>,
    config: Arc<ReaderConfig>,
    format: Format,
    active: Option<Box<dyn ChunkedReader>>,
    /// Errors counted by readers already left behind
    retired_errors: u64,
    finished: bool,
    rows_read: u64,
}

impl<F: RangeFetch + 'static, M: MetadataService> RecordReader<F, M> {
    /// List the dataset's parts and open a reader on the first entity.
    ///
    /// An empty dataset yields a reader that is already finished; no data
    /// request is made. A zero window size is rejected before anything is
    /// listed.
    pub async fn open(
        fetcher: Arc<F>,
        metadata: Arc<M>,
        dataset_view_id: &str,
        filter: &PartFilter,
        config: ReaderConfig,
    ) -> Result<Self> {
        if config.window_size == 0 {
            return Err(Error::Config("window size must be positive".to_string()));
        }
        let sequencer = PartSequencer::new(metadata, dataset_view_id, filter).await?;

        let format = match sequencer.current_entity() {
            Some(entity) => Format::from_file_name(entity.file_name()).unwrap_or_else(|| {
                warn!(
                    "Cannot tell the format of {}; reading it as delimited text",
                    entity.file_name()
                );
                Format::Text
            }),
            None => Format::Text,
        };
        info!("Reading dataset view {} as {:?}", dataset_view_id, format);

        let mut reader = Self {
            fetcher,
            sequencer,
            config: Arc::new(config),
            format,
            active: None,
            retired_errors: 0,
            finished: false,
            rows_read: 0,
        };
        match reader.sequencer.current_entity().cloned() {
            Some(entity) => reader.active = Some(reader.open_entity(entity)),
            None => reader.finished = true,
        }
        Ok(reader)
    }

    fn open_entity(&self, entity: ProcessingEntity) -> Box<dyn ChunkedReader> {
        debug!("Opening {} as {:?}", entity.href, self.format);
        match self.format {
            Format::Text => Box::new(TextChunkedReader::new(
                self.fetcher.clone(),
                entity,
                self.config.clone(),
            )),
            Format::Json => Box::new(JsonChunkedReader::new(
                self.fetcher.clone(),
                entity,
                self.config.window_size,
            )),
            Format::Columnar => Box::new(ColumnarReader::new(self.fetcher.clone(), entity)),
        }
    }

    /// Retire the active reader and open the next entity, if there is one
    async fn rotate(&mut self) -> Result<()> {
        if let Some(done) = self.active.take() {
            self.retired_errors += done.error_count();
        }
        if self.sequencer.advance().await? {
            if let Some(entity) = self.sequencer.current_entity().cloned() {
                self.active = Some(self.open_entity(entity));
            }
        } else {
            info!(
                "Dataset exhausted after {} rows, {} malformed records",
                self.rows_read, self.retired_errors
            );
            self.finished = true;
        }
        Ok(())
    }

    /// Pull up to `n` rows.
    ///
    /// Fewer than `n` rows come back only at the end of the dataset. On
    /// error, rows gathered during this call are discarded.
    pub async fn read(&mut self, n: usize) -> Result<Vec<UniformRow>> {
        let mut rows = Vec::with_capacity(n.min(4096));

        while rows.len() < n && !self.finished {
            if self.active.as_ref().is_none_or(|r| !r.has_more()) {
                self.rotate().await?;
                continue;
            }
            let Some(active) = self.active.as_mut() else {
                continue;
            };
            let batch = active.read(n - rows.len()).await?;
            rows.extend(batch);
        }

        self.rows_read += rows.len() as u64;
        Ok(rows)
    }

    /// False once the dataset is exhausted, and from then on
    pub fn has_more_data(&self) -> bool {
        !self.finished
            && (self.active.as_ref().is_some_and(|r| r.has_more()) || self.sequencer.has_more())
    }

    /// Malformed records skipped across all entities read so far
    pub fn error_count(&self) -> u64 {
        self.retired_errors + self.active.as_ref().map_or(0, |r| r.error_count())
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}
