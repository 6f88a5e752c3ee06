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
use crate::errors::BodyReplayError;
use crate::raw::RawBody;
use crate::{Body, BodyWriter};
use bytes::Bytes;
use conjure_error::Error;
use http::HeaderValue;
use std::pin::Pin;
use witchcraft_log::info;

/// A request body materialized into an immutable buffer.
///
/// A `ReplayBody` is created once per request, before the first attempt, and is never shared between requests. Each
/// attempt reads the buffer through its own `RawBody`.
pub(crate) struct ReplayBody {
    bytes: Bytes,
    content_type: HeaderValue,
}

impl ReplayBody {
    pub(crate) async fn materialize(
        mut body: Pin<Box<dyn Body + Sync + Send>>,
    ) -> Result<ReplayBody, Error> {
        let content_type = body.content_type();

        let bytes = match body.full_body() {
            Some(bytes) => bytes,
            None => {
                let mut writer = BodyWriter::new();
                body.as_mut().write(Pin::new(&mut writer)).await?;

                if !body.as_mut().reset().await {
                    info!("unable to reset request body");
                    return Err(Error::internal_safe(BodyReplayError(())));
                }

                writer.finish()
            }
        };

        if let Some(content_length) = body.content_length() {
            if content_length != bytes.len() as u64 {
                return Err(Error::internal_safe(
                    "request body length did not match its content length",
                )
                .with_safe_param("contentLength", content_length)
                .with_safe_param("bodyLength", bytes.len()));
            }
        }

        Ok(ReplayBody {
            bytes,
            content_type,
        })
    }

    pub(crate) fn content_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub(crate) fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    /// Returns a new body positioned at the start of the buffer.
    pub(crate) fn attempt_body(&self) -> RawBody {
        RawBody::new(self.bytes.clone())
    }
}
