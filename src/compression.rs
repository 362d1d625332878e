//! Gzip response encoding, negotiated per request.
//!
//! The chain never knows about this: the server picks an [`Encoding`] from the
//! request's `Accept-Encoding` header before dispatch and runs the finished
//! response through [`encode`] afterwards.

use std::io::Write;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, HeaderValue, VARY};
use http::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::response::Response;

/// Compression settings, the `[compression]` table of the config file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Bodies shorter than this are sent as-is.
    pub min_size: usize,
    /// Gzip level, 0 (store) to 9 (best).
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: true, min_size: 1400, level: 6 }
    }
}

/// A content coding the server can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Identity,
}

impl Encoding {
    /// Picks gzip when the client accepts it with a non-zero q-value, either
    /// by name or through `*`. An explicit `gzip;q=0` beats the wildcard.
    pub fn negotiate(accept_encoding: Option<&str>) -> Self {
        let Some(header) = accept_encoding else { return Self::Identity };

        let mut gzip_q = None;
        let mut star_q = None;

        for item in header.split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim();
            let q = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|v| v.trim().parse::<f32>().ok())
                .unwrap_or(1.0);

            if coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip") {
                gzip_q = Some(q);
            } else if coding == "*" {
                star_q = Some(q);
            }
        }

        match gzip_q.or(star_q) {
            Some(q) if q > 0.0 => Self::Gzip,
            _ => Self::Identity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Identity => "identity",
        }
    }
}

/// Applies `encoding` to `response` if it is worth it.
///
/// Left untouched: responses below `min_size`, already-encoded responses,
/// and statuses that never carry a body. Every response gets
/// `Vary: Accept-Encoding` while compression is enabled, since the same URL
/// may be served either way.
pub fn encode(mut response: Response, encoding: Encoding, config: &CompressionConfig) -> Response {
    if !config.enabled {
        return response;
    }

    if !varies_on_accept_encoding(&response) {
        response
            .headers
            .append(VARY, HeaderValue::from_static("accept-encoding"));
    }

    if encoding == Encoding::Identity
        || response.body.len() < config.min_size
        || response.headers.contains_key(CONTENT_ENCODING)
        || matches!(response.status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED)
    {
        return response;
    }

    match gzip(&response.body, config.level) {
        Ok(compressed) => {
            response.body = Bytes::from(compressed);
            response
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
            response.headers.remove(CONTENT_LENGTH);
        }
        Err(e) => warn!("gzip failed, sending identity: {e}"),
    }
    response
}

fn gzip(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    encoder.finish()
}

fn varies_on_accept_encoding(response: &Response) -> bool {
    response.headers.get_all(VARY).iter().any(|v| {
        v.to_str()
            .map(|s| s.split(',').any(|t| t.trim().eq_ignore_ascii_case("accept-encoding")))
            .unwrap_or(false)
    })
}
