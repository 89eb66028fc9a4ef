//! # rowrange
//!
//! Chunked record reader for remote CSV, JSON and Parquet files.
//!
//! Dataset parts live in a remote object store that is only reachable
//! through HTTP byte-range reads. This library pulls those parts in fixed
//! windows, reassembles whole records across window boundaries, and hands
//! them out as uniform rows, moving from one part to the next on its own.
//!
//! ## Features
//!
//! - Delimited text with a header row, configurable delimiter and escape
//! - JSON arrays of objects, framed by bracket depth across windows
//! - Parquet parts, downloaded whole and decoded with the `parquet` crate
//! - Pull-based `read(n)` with no prefetch and bounded buffering
//! - Malformed records are counted and skipped, never fatal
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowrange::{LocalFileFetcher, ManifestMetadata, PartFilter, ReaderConfig, RecordReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Arc::new(LocalFileFetcher::new());
//!     let metadata = Arc::new(ManifestMetadata::from_urls("demo", ["data/part-0.csv", "data/part-1.csv"]));
//!
//!     let mut reader =
//!         RecordReader::open(fetcher, metadata, "demo", &PartFilter::default(), ReaderConfig::default())
//!             .await?;
//!
//!     while reader.has_more_data() {
//!         for row in reader.read(500).await? {
//!             println!("{}", row);
//!         }
//!     }
//!     eprintln!("{} malformed records skipped", reader.error_count());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod metadata;
pub mod reader;
pub mod record;

pub use cli::Cli;
pub use config::{HttpConfig, ReaderConfig};
pub use error::{Error, Result};
pub use io::{HttpRangeFetcher, LocalFileFetcher, MemoryFetcher, RangeFetch};
pub use metadata::{ManifestMetadata, MetadataService, PartFilter};
pub use reader::{ChunkedReader, RecordReader};
pub use record::{Format, ProcessingEntity, RemotePart, UniformRow};
