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
use crate::blocking::RequestBuilder;
use crate::raw::{DefaultRawClient, RawBody, Service};
use crate::{builder, Builder, Request, Response};
use bytes::Bytes;
use conjure_error::Error;
use futures::channel::oneshot;
use futures::executor;
use http::Method;
use once_cell::sync::OnceCell;
use std::{error, io};
use tokio::runtime::{self, Handle, Runtime};
use url::Url;

fn default_handle() -> io::Result<&'static Handle> {
    static RUNTIME: OnceCell<Runtime> = OnceCell::new();
    RUNTIME
        .get_or_try_init(|| {
            runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("replay-client")
                .build()
        })
        .map(Runtime::handle)
}

/// A blocking HTTP client which retries requests.
pub struct Client<T = DefaultRawClient> {
    pub(crate) client: crate::Client<T>,
    pub(crate) handle: Option<Handle>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Client {
            client: self.client.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl Client {
    /// Returns a new `Builder` for clients.
    #[inline]
    pub fn builder() -> Builder<builder::ServiceStage> {
        Builder::new()
    }
}

impl<T> Client<T> {
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
    T: Service<http::Request<RawBody>, Response = http::Response<B>> + 'static + Sync + Send,
    T::Error: Into<Box<dyn error::Error + Sync + Send>>,
    B: http_body::Body<Data = Bytes> + 'static + Send,
    B::Error: Into<Box<dyn error::Error + Sync + Send>>,
{
    pub(crate) fn send(&self, request: Request) -> Result<Response, Error> {
        let handle = match &self.handle {
            Some(handle) => handle,
            None => default_handle().map_err(Error::internal_safe)?,
        };

        let (sender, receiver) = oneshot::channel();

        handle.spawn({
            let client = self.client.clone();
            async move {
                let r = client.send(request).await;
                let _ = sender.send(r);
            }
        });

        match executor::block_on(receiver) {
            Ok(r) => r,
            Err(e) => Err(Error::internal_safe(e)),
        }
    }
}
