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
//! An HTTP client which retries requests without losing their bodies.
//!
//! Retrying a request is only correct if every attempt transmits the same request. `replay_client` guarantees that
//! the full request body is sent on every attempt, and that requests made concurrently through one shared client never
//! observe each other's body or retry state.
//!
//! This crate provides both asynchronous and blocking clients.
//!
//! # Configuration
//!
//! A client's configuration can be built up programmatically, or deserialized from a configuration file. The
//! `ServicesConfig` supports configuration for multiple downstream services, as well as defaults that apply to all of
//! them:
//!
//! ```yaml
//! services:
//!   auth-service:
//!     max-num-retries: 2
//!   cache-service:
//!     request-timeout: 10s
//! # options set at this level will apply as defaults to all configured services
//! backoff-slot-size: 100ms
//! ```
//!
//! # Usage
//!
//! ```
//! use replay_client::{BytesBody, Client};
//! use replay_client::config::ServiceConfig;
//!
//! # async fn foo() -> Result<(), conjure_error::Error> {
//! let config = ServiceConfig::builder().max_num_retries(2u32).build();
//! let client = Client::builder()
//!     .service("widget-service")
//!     .from_config(&config)
//!     .retry_condition(replay_client::retry::server_error)
//!     .build()?;
//!
//! let response = client
//!     .post("http://localhost:8080/widgets".parse().unwrap())
//!     .body(BytesBody::json(&vec![1, 2, 3])?)
//!     .send()
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! The `blocking::Client`'s API is identical, with the exception that you don't `.await` on methods:
//!
//! ```
//! # fn foo(client: replay_client::blocking::Client) -> Result<(), conjure_error::Error> {
//! let response = client
//!     .delete("http://localhost:8080/widgets/12345".parse().unwrap())
//!     .send()?;
//! # Ok(()) }
//! ```
//!
//! # Behavior
//!
//! ## Body Replay
//!
//! A request body is materialized into an immutable buffer once, before the first attempt is made. Each attempt then
//! reads the body through its own cursor over that buffer, so a retry re-sends exactly the bytes of the first attempt.
//! Bodies which report a full in-memory representation are used directly. Streaming bodies are written once, and then
//! reset to confirm that they could be replayed. A body which cannot be reset is rejected with a `BodyReplayError`
//! before any request is sent.
//!
//! ## Retries
//!
//! After each attempt, the outcome (a response or an error) is passed to the client's `RetryPolicy`. If any of the
//! policy's conditions matches, the request has retries remaining, and its deadline has not passed, the client waits
//! and then makes another attempt. The wait is an exponential backoff with full jitter: a random duration between zero
//! and the backoff slot size multiplied by two to the power of the retry number. By default, transport errors are
//! retried up to 4 times.
//!
//! The outcome of the last attempt is returned to the caller as-is. Running out of retries is not itself an error.
//!
//! ## Deadlines
//!
//! Each request has a deadline, 5 minutes after it was started by default. It can be changed for the client with
//! `Builder::request_timeout` and for an individual request with `RequestBuilder::timeout`. An attempt still in
//! progress when the deadline passes fails with a `TimeoutError`, and no further attempts are made.
#![warn(missing_docs, clippy::all)]

pub use crate::body::*;
pub use crate::builder::Builder;
pub use crate::client::*;
pub use crate::request::*;
pub use crate::response::*;
use http::header::HeaderValue;
use once_cell::sync::Lazy;

pub mod blocking;
mod body;
pub mod builder;
mod client;
pub mod errors;
pub mod raw;
mod replay;
mod request;
mod response;
pub mod retry;
mod send;

/// Client configuration.
///
/// This is just a reexport of the `replay_client_config` crate for convenience.
pub mod config {
    #[doc(inline)]
    pub use replay_client_config::*;
}

static APPLICATION_JSON: Lazy<HeaderValue> =
    Lazy::new(|| HeaderValue::from_static("application/json"));
