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
//! The blocking client API.
//!
//! A `blocking::Client` runs requests on a tokio runtime and blocks the calling thread until the request, including
//! all of its attempts, has completed. Retry and body replay behavior is identical to the asynchronous client.
//!
//! The blocking client must not be used from within an asynchronous context.
pub use crate::blocking::client::*;
pub use crate::blocking::request::*;

mod client;
mod request;
