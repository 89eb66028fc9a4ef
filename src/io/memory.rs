use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::{RangeFetch, RangeResponse, slice_range};
use crate::error::{Error, Result};

/// In-memory object store.
///
/// Serves ranges out of byte buffers keyed by href and counts every request,
/// which makes it the fetcher of choice for exercising readers offline.
#[derive(Default)]
pub struct MemoryFetcher {
    objects: HashMap<String, Bytes>,
    range_requests: AtomicUsize,
    full_requests: AtomicUsize,
    transferred_bytes: AtomicU64,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under `href`
    pub fn with_object(mut self, href: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.objects.insert(href.into(), data.into());
        self
    }

    /// Number of ranged requests served so far
    pub fn range_requests(&self) -> usize {
        self.range_requests.load(Ordering::Relaxed)
    }

    /// Number of whole-object downloads served so far
    pub fn full_requests(&self) -> usize {
        self.full_requests.load(Ordering::Relaxed)
    }

    fn object(&self, href: &str) -> Result<&Bytes> {
        self.objects.get(href).ok_or_else(|| Error::Status {
            url: href.to_string(),
            status: 404,
            body: "no such object".to_string(),
        })
    }
}

#[async_trait]
impl RangeFetch for MemoryFetcher {
    async fn fetch_range(&self, href: &str, start: u64, end: u64) -> Result<RangeResponse> {
        self.range_requests.fetch_add(1, Ordering::Relaxed);
        let response = slice_range(self.object(href)?, start, end);
        self.transferred_bytes
            .fetch_add(response.bytes.len() as u64, Ordering::Relaxed);
        Ok(response)
    }

    async fn fetch_to_file(&self, href: &str, dest: &Path) -> Result<u64> {
        self.full_requests.fetch_add(1, Ordering::Relaxed);
        let data = self.object(href)?;
        tokio::fs::write(dest, data).await?;
        self.transferred_bytes
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data.len() as u64)
    }

    fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}
