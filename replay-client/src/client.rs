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
use crate::raw::{BuildRawClient, DefaultRawClient, RawBody, Service};
use crate::retry::RetryPolicy;
use crate::{builder, send, Builder, Request, RequestBuilder, Response};
use bytes::Bytes;
use conjure_error::Error;
use http::Method;
use std::error;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// State shared by every request made through a client.
///
/// It holds the raw client, whose connection pool is reused across requests, and immutable configuration. Nothing
/// specific to an individual request is stored here.
pub(crate) struct ClientState<T> {
    pub(crate) service: String,
    pub(crate) raw_client: T,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) request_timeout: Duration,
    pub(crate) backoff_slot_size: Duration,
}

impl<T> ClientState<T> {
    pub(crate) fn new<U>(builder: &Builder<builder::Complete<U>>) -> Result<ClientState<T>, Error>
    where
        U: BuildRawClient<RawClient = T>,
    {
        let raw_client = builder.get_raw_client_builder().build_raw_client(builder)?;

        Ok(ClientState {
            service: builder.get_service().to_string(),
            raw_client,
            retry_policy: builder.get_retry_policy().clone(),
            request_timeout: builder.get_request_timeout(),
            backoff_slot_size: builder.get_backoff_slot_size(),
        })
    }
}

/// An asynchronous HTTP client which retries requests.
///
/// Clients are cheap to clone, and clones share the same connection pool. Any number of requests can be made
/// concurrently through a client; each request tracks its own body and retry state.
pub struct Client<T = DefaultRawClient> {
    pub(crate) state: Arc<ClientState<T>>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Client {
            state: self.state.clone(),
        }
    }
}

impl Client {
    /// Creates a new `Builder` for clients.
    #[inline]
    pub fn builder() -> Builder<builder::ServiceStage> {
        Builder::new()
    }
}

impl<T> Client<T> {
    pub(crate) fn new(state: Arc<ClientState<T>>) -> Client<T> {
        Client { state }
    }

    /// Returns a new request builder.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder<'_, T> {
        RequestBuilder::new(self, method, url)
    }

    /// Returns a new builder for a GET request.
    pub fn get(&self, url: Url) -> RequestBuilder<'_, T> {
        self.request(Method::GET, url)
    }

    /// Returns a new builder for a POST request.
    pub fn post(&self, url: Url) -> RequestBuilder<'_, T> {
        self.request(Method::POST, url)
    }

    /// Returns a new builder for a PUT request.
    pub fn put(&self, url: Url) -> RequestBuilder<'_, T> {
        self.request(Method::PUT, url)
    }

    /// Returns a new builder for a PATCH request.
    pub fn patch(&self, url: Url) -> RequestBuilder<'_, T> {
        self.request(Method::PATCH, url)
    }

    /// Returns a new builder for a DELETE request.
    pub fn delete(&self, url: Url) -> RequestBuilder<'_, T> {
        self.request(Method::DELETE, url)
    }
}

impl<T, B> Client<T>
where
    T: Service<http::Request<RawBody>, Response = http::Response<B>> + Sync + Send,
    T::Error: Into<Box<dyn error::Error + Sync + Send>>,
    B: http_body::Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn error::Error + Sync + Send>>,
{
    pub(crate) async fn send(&self, request: Request) -> Result<Response, Error> {
        send::send(&self.state, request).await
    }
}
