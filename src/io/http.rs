use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{ContentRange, RangeFetch, RangeResponse};
use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// HTTP Range fetcher for remote dataset parts
pub struct HttpRangeFetcher {
    client: Client,
    transferred_bytes: AtomicU64,
    max_retries: u32,
    backoff: std::time::Duration,
}

impl HttpRangeFetcher {
    /// Create a new fetcher.
    ///
    /// Credentials from `config` are attached to every request.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = config.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid bearer token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(ref org) = config.org_id {
            let name = HeaderName::from_bytes(config.org_header.as_bytes())
                .map_err(|e| Error::Config(format!("invalid org header name: {}", e)))?;
            let value = HeaderValue::from_str(org)
                .map_err(|e| Error::Config(format!("invalid org id: {}", e)))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers);
        if config.no_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            transferred_bytes: AtomicU64::new(0),
            max_retries: config.max_retries.max(1),
            backoff: config.backoff,
        })
    }

    /// Send a request, retrying timeouts and connect failures.
    ///
    /// Unknown hosts fail immediately; so does anything else that is not a
    /// transport hiccup. `retry_count` is shared with the body read that
    /// follows, so one request never exceeds `max_retries` attempts.
    async fn send(&self, url: &str, range: Option<&str>, retry_count: &mut u32) -> Result<Response> {
        loop {
            let mut request = self.client.get(url);
            if let Some(range) = range {
                request = request.header(RANGE, range);
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_transient(&e) => self.back_off(url, retry_count, e).await?,
                Err(e) => return Err(transport(url, e)),
            }
        }
    }

    /// Count one failed attempt and wait `backoff * attempt` before the next
    async fn back_off(&self, url: &str, retry_count: &mut u32, err: reqwest::Error) -> Result<()> {
        *retry_count += 1;
        if *retry_count >= self.max_retries {
            return Err(Error::RetriesExhausted {
                url: url.to_string(),
                attempts: *retry_count,
                source: err,
            });
        }
        warn!(
            "Connection error, retry {}/{}: {}",
            retry_count, self.max_retries, err
        );
        tokio::time::sleep(self.backoff * *retry_count).await;
        Ok(())
    }
}

fn transport(url: &str, source: reqwest::Error) -> Error {
    Error::Transport {
        url: url.to_string(),
        source,
    }
}

/// Failures that get another attempt: timeouts, refused connections, broken bodies
fn is_transient(err: &reqwest::Error) -> bool {
    (err.is_timeout() || err.is_connect() || err.is_body()) && !is_unknown_host(err)
}

/// Walk the error chain looking for a name-resolution failure
fn is_unknown_host(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        let msg = e.to_string();
        if msg.contains("dns error") || msg.contains("failed to lookup address") {
            return true;
        }
        source = e.source();
    }
    false
}

/// Turn a non-success response into an error carrying its body
async fn status_error(url: &str, resp: Response) -> Error {
    let status = resp.status().as_u16();
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => format!("<unreadable body: {}>", e),
    };
    Error::Status {
        url: url.to_string(),
        status,
        body,
    }
}

fn content_range(url: &str, resp: &Response) -> Result<ContentRange> {
    let value = resp
        .headers()
        .get(CONTENT_RANGE)
        .ok_or_else(|| Error::protocol(url, "missing Content-Range header"))?;
    let value = value
        .to_str()
        .map_err(|_| Error::protocol(url, "Content-Range header is not ASCII"))?;
    ContentRange::parse(value)
        .ok_or_else(|| Error::protocol(url, format!("unparsable Content-Range {:?}", value)))
}

#[async_trait]
impl RangeFetch for HttpRangeFetcher {
    async fn fetch_range(&self, href: &str, start: u64, end: u64) -> Result<RangeResponse> {
        let range = format!("bytes={}-{}", start, end);
        debug!("GET {} Range: {}", href, range);

        let mut retry_count = 0;

        loop {
            let resp = self.send(href, Some(&range), &mut retry_count).await?;

            match resp.status() {
                StatusCode::PARTIAL_CONTENT => {}
                StatusCode::RANGE_NOT_SATISFIABLE => {
                    // Window starts past the end; `bytes */total` tells us the size
                    let content_range = content_range(href, &resp)?;
                    return Ok(RangeResponse {
                        bytes: bytes::Bytes::new(),
                        content_range: ContentRange::unsatisfied(content_range.total),
                    });
                }
                StatusCode::OK => {
                    return Err(Error::protocol(
                        href,
                        "server ignored the Range request (200 OK)",
                    ));
                }
                _ => return Err(status_error(href, resp).await),
            }

            let content_range = content_range(href, &resp)?;
            let bytes = match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(e) if is_transient(&e) => {
                    self.back_off(href, &mut retry_count, e).await?;
                    continue;
                }
                Err(e) => return Err(transport(href, e)),
            };
            self.transferred_bytes
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);

            let response = RangeResponse {
                bytes,
                content_range,
            };
            response.validate(href)?;
            return Ok(response);
        }
    }

    async fn fetch_to_file(&self, href: &str, dest: &Path) -> Result<u64> {
        debug!("GET {} -> {}", href, dest.display());

        let mut retry_count = 0;

        'attempt: loop {
            let mut resp = self.send(href, None, &mut retry_count).await?;
            if !resp.status().is_success() {
                return Err(status_error(href, resp).await);
            }

            // Truncates whatever an interrupted attempt left behind
            let mut file = tokio::fs::File::create(dest).await?;
            let mut written = 0u64;
            loop {
                let chunk = match resp.chunk().await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(e) if is_transient(&e) => {
                        self.back_off(href, &mut retry_count, e).await?;
                        continue 'attempt;
                    }
                    Err(e) => return Err(transport(href, e)),
                };
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                self.transferred_bytes
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            file.flush().await?;

            return Ok(written);
        }
    }

    fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}
