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
//! Error types.
//!
//! These are used as the causes of the `conjure_error::Error`s returned by the client, and can be detected by
//! downcasting the error's cause.

use std::error::Error;
use std::fmt;

/// The request's body could not be replayed.
///
/// Bodies which are not fully buffered must be resettable so that every attempt can transmit the same bytes. A body
/// that fails to reset is rejected before any attempt is made.
#[derive(Debug)]
pub struct BodyReplayError(pub(crate) ());

impl fmt::Display for BodyReplayError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("request body cannot be replayed")
    }
}

impl Error for BodyReplayError {}

/// The request's deadline elapsed before an attempt completed.
#[derive(Debug)]
pub struct TimeoutError(pub(crate) ());

impl fmt::Display for TimeoutError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("request timed out")
    }
}

impl Error for TimeoutError {}
