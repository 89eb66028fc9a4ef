//! Main entry point for the rowrange CLI application.
//!
//! Reads every row of a dataset, local or remote, and prints it to stdout
//! as one JSON object per line.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};

use rowrange::logging::init_logging;
use rowrange::{
    Cli, HttpConfig, HttpRangeFetcher, LocalFileFetcher, ManifestMetadata, PartFilter, RangeFetch,
    ReaderConfig, RecordReader,
};

/// Application entry point.
///
/// Loads the dataset description and dispatches to the HTTP or local
/// fetcher depending on where the parts live.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        e.exit();
    }
    init_logging(cli.log_level.as_deref());

    let metadata = match cli.manifest {
        Some(ref path) => ManifestMetadata::from_file(Path::new(path))
            .await
            .with_context(|| format!("failed to load manifest {}", path))?,
        None => ManifestMetadata::from_urls(&cli.dataset, cli.urls.iter().cloned()),
    };

    let mut config = ReaderConfig::default()
        .with_descriptor(metadata.descriptor())?
        .with_window_size(cli.window)?;
    if let Some(ref delimiter) = cli.delimiter {
        // Flag wins over the manifest
        config = config.with_descriptor(&rowrange::metadata::DatasetDescriptor {
            delimiter: Some(delimiter.clone()),
            ..Default::default()
        })?;
    }

    if cli.is_http() {
        // reqwest links rustls; pick a process-wide crypto provider up front
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let http = HttpConfig {
            bearer_token: cli.token.clone(),
            org_id: cli.org.clone(),
            no_proxy: cli.no_proxy,
            ..Default::default()
        };
        let fetcher = Arc::new(HttpRangeFetcher::new(&http)?);
        process_dataset(fetcher, metadata, config, &cli).await
    } else {
        let fetcher = Arc::new(LocalFileFetcher::new());
        process_dataset(fetcher, metadata, config, &cli).await
    }
}

/// Pull rows until the dataset or the row limit is exhausted.
async fn process_dataset<F: RangeFetch + 'static>(
    fetcher: Arc<F>,
    metadata: ManifestMetadata,
    config: ReaderConfig,
    cli: &Cli,
) -> Result<()> {
    let dataset = if cli.dataset.is_empty() {
        metadata.descriptor().dataset_view_id.clone()
    } else {
        cli.dataset.clone()
    };
    let filter = PartFilter {
        part_ids: cli.parts.clone(),
    };

    let mut reader = RecordReader::open(
        fetcher.clone(),
        Arc::new(metadata),
        &dataset,
        &filter,
        config,
    )
    .await?;

    let mut stdout = BufWriter::new(tokio::io::stdout());
    let mut rows_written = 0u64;

    while reader.has_more_data() {
        let budget = cli.next_batch(rows_written);
        if budget == 0 {
            break;
        }
        for row in reader.read(budget).await? {
            stdout.write_all(row.to_string().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            rows_written += 1;
        }
    }
    stdout.flush().await?;

    if !cli.quiet {
        eprintln!(
            "\n{} rows ({:?}), {} malformed records skipped, {} transferred",
            rows_written,
            reader.format(),
            reader.error_count(),
            format_size(fetcher.transferred_bytes())
        );
    }

    Ok(())
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
