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
use bytes::Bytes;
use http::HeaderMap;
use http_body::SizeHint;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The request body type passed to the raw HTTP client.
///
/// Each attempt of a request receives its own `RawBody`, positioned at the start of the request's replay buffer.
/// Consuming one attempt's body has no effect on the body of any other attempt.
pub struct RawBody {
    inner: Option<Bytes>,
}

impl RawBody {
    pub(crate) fn empty() -> RawBody {
        RawBody { inner: None }
    }

    pub(crate) fn new(bytes: Bytes) -> RawBody {
        if bytes.is_empty() {
            RawBody::empty()
        } else {
            RawBody { inner: Some(bytes) }
        }
    }
}

impl http_body::Body for RawBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_data(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        Poll::Ready(self.inner.take().map(Ok))
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        let len = self.inner.as_ref().map_or(0, |b| b.len() as u64);
        SizeHint::with_exact(len)
    }
}
