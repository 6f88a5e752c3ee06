// Copyright 2020 Palantir Technologies, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use crate::APPLICATION_JSON;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use conjure_error::Error;
use http::HeaderValue;
use serde::Serialize;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// A request body.
///
/// This trait can be most easily implemented with the [async-trait crate](https://docs.rs/async-trait). In-memory
/// bodies can use the `BytesBody` type rather than creating a new implementation of this trait.
///
/// Every attempt of a request must transmit exactly the same bytes, so the client materializes the body once before
/// the first attempt. Bodies that are not fully buffered are written out a single time and then reset; a body that
/// cannot be reset is single-read and the request fails with a `BodyReplayError` without making any attempts.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use replay_client::{Body, BodyWriter};
/// use conjure_error::Error;
/// use http::HeaderValue;
/// use std::pin::Pin;
/// use tokio::io::AsyncWriteExt;
///
/// pub struct SimpleBody;
///
/// #[async_trait]
/// impl Body for SimpleBody {
///     fn content_length(&self) -> Option<u64> {
///         None
///     }
///
///     fn content_type(&self) -> HeaderValue {
///         HeaderValue::from_static("application/octet-stream")
///     }
///
///     async fn write(self: Pin<&mut Self>, mut w: Pin<&mut BodyWriter>) -> Result<(), Error> {
///         w.write_all(b"hello world").await.map_err(Error::internal_safe)
///     }
///
///     async fn reset(self: Pin<&mut Self>) -> bool {
///         true
///     }
/// }
/// ```
#[async_trait]
pub trait Body {
    /// Returns the length of the body if known.
    fn content_length(&self) -> Option<u64>;

    /// Returns the content type of the body.
    fn content_type(&self) -> HeaderValue;

    /// Returns the entire body if it is fully buffered.
    ///
    /// `write` will only be called if this method returns `None`.
    ///
    /// The default implementation returns `None`.
    fn full_body(&self) -> Option<Bytes> {
        None
    }

    /// Writes the body data out.
    async fn write(self: Pin<&mut Self>, w: Pin<&mut BodyWriter>) -> Result<(), Error>;

    /// Resets the body to its start.
    ///
    /// Returns `true` iff the body was successfully reset.
    ///
    /// Requests with non-resettable bodies are rejected.
    async fn reset(self: Pin<&mut Self>) -> bool;
}

/// A simple type implementing `Body` which consists of a byte buffer and a content type.
///
/// It reports its content length and is resettable.
pub struct BytesBody {
    body: Bytes,
    content_type: HeaderValue,
}

impl BytesBody {
    /// Creates a new `BytesBody`.
    pub fn new<T>(body: T, content_type: HeaderValue) -> BytesBody
    where
        T: Into<Bytes>,
    {
        BytesBody {
            body: body.into(),
            content_type,
        }
    }

    /// Creates a new `BytesBody` containing the JSON serialization of a value.
    ///
    /// The value is serialized once, up front.
    pub fn json<T>(value: &T) -> Result<BytesBody, Error>
    where
        T: ?Sized + Serialize,
    {
        let body = conjure_serde::json::to_vec(value).map_err(Error::internal)?;
        Ok(BytesBody::new(body, APPLICATION_JSON.clone()))
    }
}

#[async_trait]
impl Body for BytesBody {
    fn content_length(&self) -> Option<u64> {
        Some(self.body.len() as u64)
    }

    fn content_type(&self) -> HeaderValue {
        self.content_type.clone()
    }

    fn full_body(&self) -> Option<Bytes> {
        Some(self.body.clone())
    }

    async fn write(self: Pin<&mut Self>, _: Pin<&mut BodyWriter>) -> Result<(), Error> {
        unreachable!()
    }

    async fn reset(self: Pin<&mut Self>) -> bool {
        true
    }
}

/// The asynchronous writer passed to `Body::write`.
///
/// Everything written is collected into the buffer which is replayed on each attempt of the request.
pub struct BodyWriter {
    buf: BytesMut,
}

impl BodyWriter {
    pub(crate) fn new() -> BodyWriter {
        BodyWriter {
            buf: BytesMut::new(),
        }
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Writes a block of body bytes.
    pub async fn write_bytes(&mut self, bytes: Bytes) -> io::Result<()> {
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }
}

impl AsyncWrite for BodyWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[derive(Serialize)]
    struct Payload {
        status: u16,
    }

    #[test]
    fn json_body() {
        let body = BytesBody::json(&Payload { status: 500 }).unwrap();

        assert_eq!(body.content_type(), "application/json");
        assert_eq!(body.full_body().unwrap(), &br#"{"status":500}"#[..]);
        assert_eq!(body.content_length(), Some(14));
    }

    #[tokio::test]
    async fn writer_collects_writes() {
        let mut writer = BodyWriter::new();
        writer.write_all(b"hello ").await.unwrap();
        writer.write_bytes(Bytes::from_static(b"wor")).await.unwrap();
        writer.write_all(b"ld").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(writer.finish(), "hello world");
    }
}
