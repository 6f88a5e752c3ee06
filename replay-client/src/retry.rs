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
//! Retry policies.
//!
//! A [`RetryPolicy`] decides whether the outcome of a request attempt warrants another attempt. It consists of an
//! ordered list of conditions, which are combined with a logical OR, and a maximum number of retries. A policy with a
//! maximum of `N` retries will make at most `N + 1` attempts of a single request.
//!
//! Conditions receive the outcome of an attempt: either the fully-read response or the error that prevented one from
//! being received. Transport errors such as refused connections are ordinary inputs to a condition.
//!
//! ```
//! use replay_client::retry::{self, RetryPolicy};
//!
//! let policy = RetryPolicy::new(1)
//!     .condition(retry::transport_error)
//!     .condition(|outcome| match outcome {
//!         Ok(response) => response.status().as_u16() > 499,
//!         Err(_) => false,
//!     });
//! ```
use crate::Response;
use conjure_error::Error;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

type Condition = Arc<dyn Fn(&Result<Response, Error>) -> bool + Sync + Send>;

/// A policy determining which request attempts are retried.
///
/// The policy itself is immutable and shared by every request made through a client. The count of remaining retries
/// is tracked separately for each request.
#[derive(Clone)]
pub struct RetryPolicy {
    conditions: Vec<Condition>,
    max_num_retries: u32,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("RetryPolicy")
            .field("conditions", &self.conditions.len())
            .field("max_num_retries", &self.max_num_retries)
            .finish()
    }
}

impl RetryPolicy {
    /// Creates a new policy with no conditions.
    ///
    /// A policy with no conditions never retries.
    pub fn new(max_num_retries: u32) -> RetryPolicy {
        RetryPolicy {
            conditions: vec![],
            max_num_retries,
        }
    }

    /// Appends a condition to the policy.
    pub fn condition<F>(mut self, condition: F) -> RetryPolicy
    where
        F: Fn(&Result<Response, Error>) -> bool + 'static + Sync + Send,
    {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub(crate) fn set_max_num_retries(&mut self, max_num_retries: u32) {
        self.max_num_retries = max_num_retries;
    }

    /// Returns the maximum number of retries of a single request.
    pub fn max_num_retries(&self) -> u32 {
        self.max_num_retries
    }

    /// Determines if any of the policy's conditions request a retry for the outcome of an attempt.
    ///
    /// This does not take the retry limit into account.
    pub fn should_retry(&self, outcome: &Result<Response, Error>) -> bool {
        self.conditions.iter().any(|condition| condition(outcome))
    }

    pub(crate) fn budget(&self) -> RetryBudget {
        RetryBudget {
            remaining: self.max_num_retries,
        }
    }
}

/// The retries remaining for a single request.
pub(crate) struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    /// Consumes one retry, returning `false` if none are left.
    pub(crate) fn try_consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(remaining) => {
                self.remaining = remaining;
                true
            }
            None => false,
        }
    }
}

/// A condition which retries attempts that failed without a response.
pub fn transport_error(outcome: &Result<Response, Error>) -> bool {
    outcome.is_err()
}

/// A condition which retries attempts that received a 5xx response.
pub fn server_error(outcome: &Result<Response, Error>) -> bool {
    match outcome {
        Ok(response) => response.status().is_server_error(),
        Err(_) => false,
    }
}

/// Returns a condition which retries attempts that received a response with one of the specified statuses.
pub fn status<I>(statuses: I) -> impl Fn(&Result<Response, Error>) -> bool + 'static + Sync + Send
where
    I: IntoIterator<Item = StatusCode>,
{
    let statuses = statuses.into_iter().collect::<Vec<_>>();
    move |outcome| match outcome {
        Ok(response) => statuses.contains(&response.status()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;

    fn response(status: StatusCode) -> Result<Response, Error> {
        Ok(Response::new(status, HeaderMap::new(), Bytes::new()))
    }

    fn error() -> Result<Response, Error> {
        Err(Error::internal_safe("connection refused"))
    }

    #[test]
    fn no_conditions() {
        let policy = RetryPolicy::new(3);

        assert!(!policy.should_retry(&error()));
        assert!(!policy.should_retry(&response(StatusCode::INTERNAL_SERVER_ERROR)));
    }

    #[test]
    fn any_condition() {
        let policy = RetryPolicy::new(1)
            .condition(transport_error)
            .condition(status([StatusCode::TOO_MANY_REQUESTS]));

        assert!(policy.should_retry(&error()));
        assert!(policy.should_retry(&response(StatusCode::TOO_MANY_REQUESTS)));
        assert!(!policy.should_retry(&response(StatusCode::OK)));
        assert!(!policy.should_retry(&response(StatusCode::INTERNAL_SERVER_ERROR)));
    }

    #[test]
    fn server_errors() {
        assert!(server_error(&response(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(server_error(&response(StatusCode::SERVICE_UNAVAILABLE)));
        assert!(!server_error(&response(StatusCode::NOT_FOUND)));
        assert!(!server_error(&error()));
    }

    #[test]
    fn budget_bounds_retries() {
        let policy = RetryPolicy::new(2);

        let mut budget = policy.budget();
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert!(!budget.try_consume());

        // each request gets a fresh budget
        assert!(policy.budget().try_consume());
    }

    #[test]
    fn zero_budget() {
        assert!(!RetryPolicy::new(0).budget().try_consume());
    }
}
