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
//! The client builder.
use crate::blocking;
use crate::client::ClientState;
use crate::config::ServiceConfig;
use crate::raw::{BuildRawClient, DefaultRawClientBuilder};
use crate::retry::{self, RetryPolicy};
use crate::{Client, Response};
use conjure_error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// A builder to construct [`Client`]s and [`blocking::Client`]s.
pub struct Builder<T = Complete>(T);

/// The service builder stage.
pub struct ServiceStage(());

/// The complete builder stage.
pub struct Complete<T = DefaultRawClientBuilder> {
    service: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    backoff_slot_size: Duration,
    retry_policy: RetryPolicy,
    blocking_handle: Option<Handle>,
    raw_client_builder: T,
}

impl Default for Builder<ServiceStage> {
    #[inline]
    fn default() -> Self {
        Builder::new()
    }
}

impl Builder<ServiceStage> {
    /// Creates a new builder with default settings.
    #[inline]
    pub fn new() -> Self {
        Builder(ServiceStage(()))
    }

    /// Sets the name of the service this client will communicate with.
    ///
    /// This is used in logging to allow differentiation between different clients.
    #[inline]
    pub fn service(self, service: &str) -> Builder {
        Builder(Complete {
            service: service.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5 * 60),
            backoff_slot_size: Duration::from_millis(250),
            retry_policy: RetryPolicy::new(4).condition(retry::transport_error),
            blocking_handle: None,
            raw_client_builder: DefaultRawClientBuilder,
        })
    }
}

#[cfg(test)]
impl Builder {
    pub(crate) fn for_test() -> Self {
        Builder::new()
            .service("test")
            .backoff_slot_size(Duration::from_secs(0))
    }
}

impl<T> Builder<Complete<T>> {
    /// Applies configuration settings from a `ServiceConfig` to the builder.
    #[inline]
    pub fn from_config(mut self, config: &ServiceConfig) -> Self {
        if let Some(connect_timeout) = config.connect_timeout() {
            self = self.connect_timeout(connect_timeout);
        }

        if let Some(request_timeout) = config.request_timeout() {
            self = self.request_timeout(request_timeout);
        }

        if let Some(backoff_slot_size) = config.backoff_slot_size() {
            self = self.backoff_slot_size(backoff_slot_size);
        }

        if let Some(max_num_retries) = config.max_num_retries() {
            self = self.max_num_retries(max_num_retries);
        }

        self
    }

    /// Returns the builder's configured service name.
    #[inline]
    pub fn get_service(&self) -> &str {
        &self.0.service
    }

    /// Sets the connect timeout.
    ///
    /// Defaults to 10 seconds.
    #[inline]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.0.connect_timeout = connect_timeout;
        self
    }

    /// Returns the builder's configured connect timeout.
    #[inline]
    pub fn get_connect_timeout(&self) -> Duration {
        self.0.connect_timeout
    }

    /// Sets the request timeout.
    ///
    /// This is the deadline for an entire request, covering all of its attempts and the backoff between them. An
    /// attempt still in flight when it elapses is aborted, and no further attempts are made. It can be overridden on
    /// individual requests.
    ///
    /// Defaults to 5 minutes.
    #[inline]
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.0.request_timeout = request_timeout;
        self
    }

    /// Returns the builder's configured request timeout.
    #[inline]
    pub fn get_request_timeout(&self) -> Duration {
        self.0.request_timeout
    }

    /// Sets the backoff slot size.
    ///
    /// This is the upper bound on the initial delay before retrying a request. It grows exponentially as additional
    /// attempts are made for a given request.
    ///
    /// Defaults to 250 milliseconds.
    #[inline]
    pub fn backoff_slot_size(mut self, backoff_slot_size: Duration) -> Self {
        self.0.backoff_slot_size = backoff_slot_size;
        self
    }

    /// Returns the builder's configured backoff slot size.
    #[inline]
    pub fn get_backoff_slot_size(&self) -> Duration {
        self.0.backoff_slot_size
    }

    /// Sets the maximum number of times a request attempt will be retried before giving up.
    ///
    /// A request will be attempted at most `max_num_retries + 1` times.
    ///
    /// Defaults to 4.
    #[inline]
    pub fn max_num_retries(mut self, max_num_retries: u32) -> Self {
        self.0.retry_policy.set_max_num_retries(max_num_retries);
        self
    }

    /// Returns the builder's configured maximum number of retries.
    #[inline]
    pub fn get_max_num_retries(&self) -> u32 {
        self.0.retry_policy.max_num_retries()
    }

    /// Appends a condition to the retry policy.
    ///
    /// An attempt is retried if any condition returns `true` for its outcome.
    ///
    /// The default policy retries transport errors.
    #[inline]
    pub fn retry_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Result<Response, Error>) -> bool + 'static + Sync + Send,
    {
        self.0.retry_policy = self.0.retry_policy.condition(condition);
        self
    }

    /// Replaces the retry policy, including its maximum number of retries.
    #[inline]
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.0.retry_policy = retry_policy;
        self
    }

    /// Returns the builder's configured retry policy.
    #[inline]
    pub fn get_retry_policy(&self) -> &RetryPolicy {
        &self.0.retry_policy
    }

    /// Sets the `Handle` to the tokio `Runtime` to be used by blocking clients.
    ///
    /// This has no effect on async clients.
    ///
    /// Defaults to a `replay-client` internal `Runtime`.
    #[inline]
    pub fn blocking_handle(mut self, blocking_handle: Handle) -> Self {
        self.0.blocking_handle = Some(blocking_handle);
        self
    }

    /// Returns the builder's configured blocking handle.
    #[inline]
    pub fn get_blocking_handle(&self) -> Option<&Handle> {
        self.0.blocking_handle.as_ref()
    }

    /// Sets the raw client builder.
    ///
    /// Defaults to `DefaultRawClientBuilder`.
    #[inline]
    pub fn raw_client_builder<U>(self, raw_client_builder: U) -> Builder<Complete<U>> {
        Builder(Complete {
            service: self.0.service,
            connect_timeout: self.0.connect_timeout,
            request_timeout: self.0.request_timeout,
            backoff_slot_size: self.0.backoff_slot_size,
            retry_policy: self.0.retry_policy,
            blocking_handle: self.0.blocking_handle,
            raw_client_builder,
        })
    }

    /// Returns the builder's configured raw client builder.
    #[inline]
    pub fn get_raw_client_builder(&self) -> &T {
        &self.0.raw_client_builder
    }
}

impl<T> Builder<Complete<T>>
where
    T: BuildRawClient,
{
    /// Creates a new `Client`.
    pub fn build(&self) -> Result<Client<T::RawClient>, Error> {
        let state = ClientState::new(self)?;
        Ok(Client::new(Arc::new(state)))
    }

    /// Creates a new `blocking::Client`.
    pub fn build_blocking(&self) -> Result<blocking::Client<T::RawClient>, Error> {
        self.build().map(|client| blocking::Client {
            client,
            handle: self.0.blocking_handle.clone(),
        })
    }
}
