use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ContentRange, RangeFetch, RangeResponse};
use crate::error::Result;

/// Range fetcher over the local filesystem.
///
/// `href` is a plain path or a `file://` URL. Responses carry the same
/// content-range a well-behaved HTTP server would send.
#[derive(Default)]
pub struct LocalFileFetcher {
    transferred_bytes: AtomicU64,
}

impl LocalFileFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn local_path(href: &str) -> PathBuf {
    PathBuf::from(href.strip_prefix("file://").unwrap_or(href))
}

fn read_at(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

#[async_trait]
impl RangeFetch for LocalFileFetcher {
    async fn fetch_range(&self, href: &str, start: u64, end: u64) -> Result<RangeResponse> {
        let file = std::fs::File::open(local_path(href))?;
        let total = file.metadata()?.len();

        if start >= total {
            return Ok(RangeResponse {
                bytes: Bytes::new(),
                content_range: ContentRange::unsatisfied(total),
            });
        }

        let end = end.min(total - 1);
        let mut buf = vec![0u8; (end - start + 1) as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = read_at(&file, start + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        self.transferred_bytes
            .fetch_add(filled as u64, Ordering::Relaxed);

        Ok(RangeResponse {
            bytes: Bytes::from(buf),
            content_range: ContentRange::new(start, start + filled.max(1) as u64 - 1, total),
        })
    }

    async fn fetch_to_file(&self, href: &str, dest: &Path) -> Result<u64> {
        let copied = tokio::fs::copy(local_path(href), dest).await?;
        self.transferred_bytes.fetch_add(copied, Ordering::Relaxed);
        Ok(copied)
    }

    fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_local_ranges() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let href = file.path().to_string_lossy().to_string();

        let fetcher = LocalFileFetcher::new();
        let resp = fetcher.fetch_range(&href, 2, 5).await.unwrap();
        assert_eq!(&resp.bytes[..], b"2345");
        assert_eq!(resp.content_range, ContentRange::new(2, 5, 10));

        let tail = fetcher.fetch_range(&href, 8, 100).await.unwrap();
        assert_eq!(&tail.bytes[..], b"89");
        assert!(tail.content_range.reaches_end());

        let past = fetcher.fetch_range(&href, 10, 20).await.unwrap();
        assert!(past.bytes.is_empty());
        assert_eq!(fetcher.transferred_bytes(), 6);
    }

    #[tokio::test]
    async fn test_file_url_and_copy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"payload").unwrap();
        let href = format!("file://{}", file.path().display());

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("copy.bin");
        let fetcher = LocalFileFetcher::new();
        assert_eq!(fetcher.fetch_to_file(&href, &dest).await.unwrap(), 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }
}
