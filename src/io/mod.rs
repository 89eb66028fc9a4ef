mod http;
mod local;
mod memory;

pub use http::HttpRangeFetcher;
pub use local::LocalFileFetcher;
pub use memory::MemoryFetcher;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::error::{Error, Result};

/// Trait for byte-range access to remote objects
#[async_trait]
pub trait RangeFetch: Send + Sync {
    /// Fetch bytes `start..=end` of `href`.
    ///
    /// The server may clamp `end` to the last byte of the object; the
    /// returned [`ContentRange`] describes what was actually served.
    async fn fetch_range(&self, href: &str, start: u64, end: u64) -> Result<RangeResponse>;

    /// Download the whole object into `dest` with a single unranged request
    async fn fetch_to_file(&self, href: &str, dest: &Path) -> Result<u64>;

    /// Total bytes received so far
    fn transferred_bytes(&self) -> u64 {
        0
    }
}

/// One served byte window
#[derive(Debug, Clone)]
pub struct RangeResponse {
    pub bytes: Bytes,
    pub content_range: ContentRange,
}

impl RangeResponse {
    /// Check that the body length agrees with the advertised span
    pub fn validate(&self, href: &str) -> Result<()> {
        let expected = self.content_range.len();
        if self.bytes.len() as u64 != expected {
            return Err(Error::protocol(
                href,
                format!(
                    "content-range announces {} bytes but body has {}",
                    expected,
                    self.bytes.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Parsed `Content-Range` header value.
///
/// `span` is `None` for the unsatisfied form `bytes */total`, which servers
/// send when the requested start lies past the end of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub span: Option<(u64, u64)>,
    pub total: u64,
}

impl ContentRange {
    pub fn new(start: u64, end: u64, total: u64) -> Self {
        Self {
            span: Some((start, end)),
            total,
        }
    }

    pub fn unsatisfied(total: u64) -> Self {
        Self { span: None, total }
    }

    /// Parse `bytes start-end/total` or `bytes */total`
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = rest.split_once('/')?;
        let total = total.trim().parse().ok()?;

        if range.trim() == "*" {
            return Some(Self::unsatisfied(total));
        }

        let (start, end) = range.split_once('-')?;
        let start: u64 = start.trim().parse().ok()?;
        let end: u64 = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
        Some(Self::new(start, end, total))
    }

    /// Number of bytes in the served span
    pub fn len(&self) -> u64 {
        match self.span {
            Some((start, end)) => end - start + 1,
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset of the first byte not covered by this response
    pub fn next_offset(&self) -> u64 {
        match self.span {
            Some((_, end)) => end + 1,
            None => self.total,
        }
    }

    /// True when the served span reaches the last byte of the object
    pub fn reaches_end(&self) -> bool {
        self.next_offset() >= self.total
    }
}

/// Build the range answer for `start..=end` over an object of `data.len()` bytes
pub(crate) fn slice_range(data: &[u8], start: u64, end: u64) -> RangeResponse {
    let total = data.len() as u64;
    if start >= total {
        return RangeResponse {
            bytes: Bytes::new(),
            content_range: ContentRange::unsatisfied(total),
        };
    }
    let end = end.min(total - 1);
    RangeResponse {
        bytes: Bytes::copy_from_slice(&data[start as usize..=end as usize]),
        content_range: ContentRange::new(start, end, total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        let cr = ContentRange::parse("bytes 0-99/1234").unwrap();
        assert_eq!(cr, ContentRange::new(0, 99, 1234));
        assert_eq!(cr.len(), 100);
        assert_eq!(cr.next_offset(), 100);
        assert!(!cr.reaches_end());

        let last = ContentRange::parse("bytes 1200-1233/1234").unwrap();
        assert!(last.reaches_end());
    }

    #[test]
    fn test_parse_unsatisfied_range() {
        let cr = ContentRange::parse("bytes */0").unwrap();
        assert_eq!(cr.total, 0);
        assert!(cr.is_empty());
        assert!(cr.reaches_end());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ContentRange::parse("").is_none());
        assert!(ContentRange::parse("items 0-1/2").is_none());
        assert!(ContentRange::parse("bytes 5-2/10").is_none());
        assert!(ContentRange::parse("bytes 0-9").is_none());
        assert!(ContentRange::parse("bytes 0-9/*").is_none());
    }

    #[test]
    fn test_slice_range_clamps_to_object() {
        let resp = slice_range(b"hello", 3, 100);
        assert_eq!(&resp.bytes[..], b"lo");
        assert_eq!(resp.content_range, ContentRange::new(3, 4, 5));
        assert!(resp.validate("mem").is_ok());

        let past = slice_range(b"hello", 5, 10);
        assert!(past.bytes.is_empty());
        assert_eq!(past.content_range, ContentRange::unsatisfied(5));
    }

    #[test]
    fn test_validate_detects_short_body() {
        let resp = RangeResponse {
            bytes: Bytes::from_static(b"abc"),
            content_range: ContentRange::new(0, 9, 10),
        };
        assert!(matches!(resp.validate("x"), Err(Error::Protocol { .. })));
    }
}
