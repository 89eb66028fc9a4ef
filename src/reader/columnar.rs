use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use parquet::file::reader::SerializedFileReader;
use parquet::record::reader::RowIter;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::iter::Peekable;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::ChunkedReader;
use crate::error::{Error, Result};
use crate::io::RangeFetch;
use crate::record::materialize::columnar_row;
use crate::record::{ProcessingEntity, UniformRow};

const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Smallest valid file: leading magic, footer length, trailing magic
const MIN_PARQUET_SIZE: u64 = 12;

/// Reader for Parquet parts.
///
/// Parquet cannot be decoded from arbitrary byte windows, so the whole part
/// is downloaded into a temporary file on the first read and handed to the
/// codec. The temporary file lives as long as the reader.
pub struct ColumnarReader<F: RangeFetch> {
    fetcher: Arc<F>,
    entity: ProcessingEntity,
    rows: Option<Peekable<RowIter<'static>>>,
    download: Option<NamedTempFile>,
    exhausted: bool,
}

impl<F: RangeFetch> ColumnarReader<F> {
    pub fn new(fetcher: Arc<F>, entity: ProcessingEntity) -> Self {
        Self {
            fetcher,
            entity,
            rows: None,
            download: None,
            exhausted: false,
        }
    }

    async fn open(&mut self) -> Result<()> {
        let download = NamedTempFile::new()?;
        let written = self
            .fetcher
            .fetch_to_file(&self.entity.href, download.path())
            .await?;
        info!(
            "Downloaded {} ({} bytes) to {}",
            self.entity.href,
            written,
            download.path().display()
        );

        validate_footer(&self.entity.href, download.path())?;

        let reader = SerializedFileReader::new(download.reopen()?)?;
        let rows = reader.into_iter().peekable();
        self.rows = Some(rows);
        self.download = Some(download);
        Ok(())
    }
}

/// Check the Parquet framing before handing the file to the codec
fn validate_footer(href: &str, path: &Path) -> Result<()> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < MIN_PARQUET_SIZE {
        return Err(Error::protocol(
            href,
            format!("{} bytes is too short for a parquet file", len),
        ));
    }

    let mut head = [0u8; 4];
    file.read_exact(&mut head)?;

    file.seek(SeekFrom::End(-8))?;
    let metadata_len = file.read_u32::<LittleEndian>()? as u64;
    let mut tail = [0u8; 4];
    file.read_exact(&mut tail)?;

    if &head != PARQUET_MAGIC || &tail != PARQUET_MAGIC {
        return Err(Error::protocol(href, "missing PAR1 magic"));
    }
    if metadata_len > len - MIN_PARQUET_SIZE {
        return Err(Error::protocol(
            href,
            format!(
                "footer claims {} metadata bytes in a {} byte file",
                metadata_len, len
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl<F: RangeFetch + 'static> ChunkedReader for ColumnarReader<F> {
    async fn read(&mut self, budget: usize) -> Result<Vec<UniformRow>> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        if self.rows.is_none() {
            self.open().await?;
        }
        let Some(rows) = self.rows.as_mut() else {
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(budget.min(4096));
        while out.len() < budget {
            match rows.next() {
                Some(record) => out.push(columnar_row(&record?)),
                None => break,
            }
        }

        if rows.peek().is_none() {
            debug!("{}: codec has no rows left", self.entity.href);
            self.exhausted = true;
            self.rows = None;
            self.download = None;
        }
        Ok(out)
    }

    fn has_more(&self) -> bool {
        !self.exhausted
    }

    fn error_count(&self) -> u64 {
        0
    }
}
