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
use crate::blocking::Client;
use crate::raw::{RawBody, Service};
use crate::{Body, Request, Response};
use bytes::Bytes;
use conjure_error::Error;
use http::{HeaderMap, Method};
use std::error;
use std::time::Duration;
use url::Url;

/// A builder for a blocking HTTP request.
pub struct RequestBuilder<'a, T> {
    client: &'a Client<T>,
    request: Request,
}

impl<'a, T> RequestBuilder<'a, T> {
    pub(crate) fn new(client: &'a Client<T>, method: Method, url: Url) -> RequestBuilder<'a, T> {
        RequestBuilder {
            client,
            request: Request::new(method, url),
        }
    }

    /// Returns a mutable reference to the headers of this request.
    ///
    /// The `Accept: */*` header is set by default, but can be overridden.
    ///
    /// The `Content-Length` and `Content-Type` headers are fully controlled by `replay_client`, which will overwrite
    /// any existing value.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request.headers
    }

    /// Sets the request body.
    pub fn body<U>(mut self, body: U) -> RequestBuilder<'a, T>
    where
        U: Body + 'static + Sync + Send,
    {
        self.request.body(body);
        self
    }

    /// Sets the deadline for this request, overriding the client's request timeout.
    pub fn timeout(mut self, timeout: Duration) -> RequestBuilder<'a, T> {
        self.request.timeout = Some(timeout);
        self
    }
}

impl<'a, T, B> RequestBuilder<'a, T>
where
    T: Service<http::Request<RawBody>, Response = http::Response<B>> + 'static + Sync + Send,
    T::Error: Into<Box<dyn error::Error + Sync + Send>>,
    B: http_body::Body<Data = Bytes> + 'static + Send,
    B::Error: Into<Box<dyn error::Error + Sync + Send>>,
{
    /// Makes the request.
    pub fn send(self) -> Result<Response, Error> {
        self.client.send(self.request)
    }
}
