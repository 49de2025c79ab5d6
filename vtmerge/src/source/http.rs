//! Shared HTTP plumbing for upstream sources.

use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::StatusCode;
use tracing::debug;

use super::{RequestContext, SourceError, TileJson};

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Gzip member header.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True for inbound headers never forwarded upstream.
fn is_skipped(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
            | "accept-encoding"
    )
}

/// Copies the inbound headers that are safe to pass to an upstream.
///
/// Drops `Host`, hop-by-hop headers and `Accept-Encoding`; the body must
/// come back in a form this process can decode.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if is_skipped(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Appends the inbound query string to an upstream URL.
pub(crate) fn with_query(url: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if url.contains('?') => format!("{}&{}", url, q),
        Some(q) => format!("{}?{}", url, q),
        None => url.to_string(),
    }
}

/// Inflates gzip bodies; anything else is returned as is.
pub(crate) fn inflate(body: Bytes) -> Result<Bytes, SourceError> {
    if !body.starts_with(&GZIP_MAGIC) {
        return Ok(body);
    }
    let mut out = Vec::with_capacity(body.len() * 4);
    GzDecoder::new(body.as_ref())
        .read_to_end(&mut out)
        .map_err(|e| SourceError::unavailable(format!("failed to inflate tile: {}", e)))?;
    Ok(Bytes::from(out))
}

/// Async HTTP client shared by every HTTP source.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default timeout.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a fetcher with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                SourceError::InvalidConfig(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// GETs a URL with the request's forwarded headers and query string.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(body))` on 2xx other than 204
    /// - `Ok(None)` on 204 or 404
    /// - `Err(Unavailable)` carrying the status for anything else
    pub async fn get(&self, url: &str, ctx: &RequestContext) -> Result<Option<Bytes>, SourceError> {
        let url = with_query(url, ctx.query.as_deref());
        let response = self
            .client
            .get(&url)
            .headers(forwardable_headers(&ctx.headers))
            .send()
            .await
            .map_err(|e| SourceError::unavailable(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            debug!(url = %url, status = status.as_u16(), "Upstream has no content");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                status: Some(status.as_u16()),
                reason: format!("HTTP {} from {}", status, url),
            });
        }

        response.bytes().await.map(Some).map_err(|e| SourceError::Unavailable {
            status: Some(status.as_u16()),
            reason: format!("failed to read response from {}: {}", url, e),
        })
    }

    /// GETs and parses a JSON object. A missing document is an error.
    pub async fn get_json(&self, url: &str, ctx: &RequestContext) -> Result<TileJson, SourceError> {
        let body = self.get(url, ctx).await?.ok_or_else(|| SourceError::Unavailable {
            status: Some(StatusCode::NOT_FOUND.as_u16()),
            reason: format!("no document at {}", url),
        })?;
        serde_json::from_slice(&body)
            .map_err(|e| SourceError::unavailable(format!("invalid JSON from {}: {}", url, e)))
    }
}
