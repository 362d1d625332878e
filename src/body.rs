//! Buffered request bodies.
//!
//! An HTTP body is a stream: read it once and it is gone. Every step in a
//! chain that wants to decode the payload would otherwise race the others for
//! the bytes. [`RawBody`] reads the stream to the end exactly once, up front,
//! and from then on hands every consumer its own view of the same bytes:
//!
//! ```text
//! Incoming ──collect()──▶ RawBody(Bytes) ──reader()──▶ io::Read   (fresh each call)
//!                                        ──to_body()─▶ Full<Bytes> (fresh each call)
//!                                        ──decode_json::<T>()──▶ T
//! ```
//!
//! Bodies are held entirely in memory. Size limits belong to the reverse
//! proxy in front of the server.

use std::io;

use bytes::{Buf, Bytes};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{DecodeError, Error};

/// The captured payload of one request.
///
/// Cloning is an atomic reference-count increment; the bytes are never
/// copied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawBody(Bytes);

impl RawBody {
    /// A body with no bytes, as sent by a bodiless `GET`.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Drains an HTTP body to the end.
    ///
    /// An empty body yields an empty `RawBody`. A fault on the underlying
    /// stream is returned as [`Error::Io`].
    pub async fn capture<B>(body: B) -> Result<Self, Error>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = body
            .collect()
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?;
        Ok(Self(collected.to_bytes()))
    }

    /// Drains any async reader to end-of-input.
    pub async fn read_from<R>(mut reader: R) -> Result<Self, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Self(Bytes::from(buf)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new blocking reader positioned at the first byte.
    ///
    /// Each call starts over; draining one reader leaves every other reader
    /// (and the `RawBody` itself) untouched.
    pub fn reader(&self) -> bytes::buf::Reader<Bytes> {
        self.0.clone().reader()
    }

    /// A new HTTP body carrying the captured bytes, for handing the request
    /// on to code that expects to read a stream.
    pub fn to_body(&self) -> Full<Bytes> {
        Full::new(self.0.clone())
    }

    /// Decodes the payload as JSON.
    ///
    /// Decoding reads from a fresh [`reader`](Self::reader), so it can be
    /// repeated any number of times, into the same or different types, and
    /// every attempt sees the original bytes. Only the first JSON value is
    /// read; anything after it is left alone.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let mut de = serde_json::Deserializer::from_reader(self.reader());
        T::deserialize(&mut de).map_err(DecodeError::new)
    }
}

impl From<Bytes> for RawBody {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

/// Captures the body of `req` and puts a replayable copy back in its place.
///
/// The returned request can be read like the original; the returned
/// [`RawBody`] can be decoded as often as needed.
pub async fn buffer<B>(
    req: http::Request<B>,
) -> Result<(http::Request<Full<Bytes>>, RawBody), Error>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let raw = RawBody::capture(body).await?;
    let restored = http::Request::from_parts(parts, raw.to_body());
    Ok((restored, raw))
}
