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
use crate::client::ClientState;
use crate::errors::TimeoutError;
use crate::raw::{RawBody, Service};
use crate::replay::ReplayBody;
use crate::retry::RetryBudget;
use crate::{Request, Response};
use bytes::Bytes;
use conjure_error::Error;
use http::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, Method, Uri};
use rand::Rng;
use std::error;
use std::time::Duration;
use tokio::time::{self, Instant};
use witchcraft_log::{debug, info};

/// Executes a single logical request.
///
/// The request body is materialized before the first attempt, and every piece of state tracking the request's
/// progress is local to this call. Attempts are made sequentially: an attempt finishes, the retry policy evaluates its
/// outcome, and the next attempt starts only after any backoff has elapsed. The outcome of the last attempt is
/// returned unchanged.
pub(crate) async fn send<T, B>(client: &ClientState<T>, request: Request) -> Result<Response, Error>
where
    T: Service<http::Request<RawBody>, Response = http::Response<B>> + Sync + Send,
    T::Error: Into<Box<dyn error::Error + Sync + Send>>,
    B: http_body::Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn error::Error + Sync + Send>>,
{
    let deadline = Instant::now() + request.timeout.unwrap_or(client.request_timeout);

    let uri = request
        .url
        .as_str()
        .parse::<Uri>()
        .map_err(|e| Error::internal_safe(e).with_unsafe_param("url", request.url.as_str()))?;

    let body = match request.body {
        Some(body) => match time::timeout_at(deadline, ReplayBody::materialize(body)).await {
            Ok(body) => Some(body?),
            Err(_) => {
                info!(
                    "request deadline exceeded while buffering body",
                    safe: {
                        service: client.service,
                    }
                );
                return Err(Error::internal_safe(TimeoutError(())));
            }
        },
        None => None,
    };

    let mut state = State {
        client,
        method: request.method,
        uri,
        headers: new_headers(request.headers, body.as_ref()),
        body,
        budget: client.retry_policy.budget(),
        deadline,
        attempt: 0,
    };

    state.send().await
}

fn new_headers(mut headers: HeaderMap, body: Option<&ReplayBody>) -> HeaderMap {
    headers.remove(CONNECTION);
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_TYPE);

    if let Some(body) = body {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.content_length()));
        headers.insert(CONTENT_TYPE, body.content_type().clone());
    }

    headers
}

struct State<'a, T> {
    client: &'a ClientState<T>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<ReplayBody>,
    budget: RetryBudget,
    deadline: Instant,
    attempt: u32,
}

impl<'a, T, B> State<'a, T>
where
    T: Service<http::Request<RawBody>, Response = http::Response<B>> + Sync + Send,
    T::Error: Into<Box<dyn error::Error + Sync + Send>>,
    B: http_body::Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn error::Error + Sync + Send>>,
{
    async fn send(&mut self) -> Result<Response, Error> {
        loop {
            self.attempt += 1;
            debug!(
                "sending request attempt",
                safe: {
                    service: self.client.service,
                    attempt: self.attempt,
                }
            );

            let outcome = self.send_attempt().await;

            let backoff = match self.prepare_for_retry(&outcome) {
                Some(backoff) => backoff,
                None => return outcome,
            };

            let backoff_millis = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
            debug!(
                "retrying request",
                safe: {
                    service: self.client.service,
                    attempt: self.attempt,
                    backoffMillis: backoff_millis,
                }
            );

            if backoff > Duration::from_secs(0) {
                time::sleep(backoff).await;
            }
        }
    }

    async fn send_attempt(&self) -> Result<Response, Error> {
        // timeout_at polls the attempt once even if the deadline has already passed
        if Instant::now() >= self.deadline {
            return Err(Error::internal_safe(TimeoutError(())));
        }

        match time::timeout_at(self.deadline, self.send_raw()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::internal_safe(TimeoutError(()))),
        }
    }

    async fn send_raw(&self) -> Result<Response, Error> {
        let response = self
            .client
            .raw_client
            .call(self.new_request())
            .await
            .map_err(Error::internal_safe)?;

        let (parts, body) = response.into_parts();
        let body = hyper::body::to_bytes(body)
            .await
            .map_err(Error::internal_safe)?;

        Ok(Response::new(parts.status, parts.headers, body))
    }

    fn new_request(&self) -> http::Request<RawBody> {
        let body = match &self.body {
            Some(body) => body.attempt_body(),
            None => RawBody::empty(),
        };

        let mut request = http::Request::new(body);
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }

    // Returns the delay before the next attempt, or `None` if the outcome is final.
    fn prepare_for_retry(&mut self, outcome: &Result<Response, Error>) -> Option<Duration> {
        if !self.client.retry_policy.should_retry(outcome) {
            return None;
        }

        if Instant::now() >= self.deadline {
            info!(
                "request deadline exceeded",
                safe: {
                    service: self.client.service,
                    attempts: self.attempt,
                }
            );
            return None;
        }

        if !self.budget.try_consume() {
            info!(
                "exceeded retry limits",
                safe: {
                    service: self.client.service,
                    attempts: self.attempt,
                }
            );
            return None;
        }

        let backoff = self.backoff();
        match Instant::now().checked_add(backoff) {
            Some(wake) if wake < self.deadline => Some(backoff),
            _ => {
                info!(
                    "request deadline would be exceeded before the next attempt",
                    safe: {
                        service: self.client.service,
                        attempts: self.attempt,
                    }
                );
                None
            }
        }
    }

    // Exponential backoff with full jitter.
    fn backoff(&self) -> Duration {
        let scale = 1 << self.attempt.min(16);
        let max = self
            .client
            .backoff_slot_size
            .checked_mul(scale)
            .unwrap_or(Duration::MAX);

        // gen_range panics when the range is empty
        if max == Duration::from_secs(0) {
            Duration::from_secs(0)
        } else {
            rand::thread_rng().gen_range(Duration::from_secs(0)..max)
        }
    }
}

#[cfg(test)]
mod test {
    use crate::errors::{BodyReplayError, TimeoutError};
    use crate::raw::{BuildRawClient, RawBody, Service};
    use crate::{builder, retry, Body, BodyWriter, Builder, BytesBody, Client};
    use async_trait::async_trait;
    use bytes::Bytes;
    use conjure_error::Error;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use http::{HeaderMap, HeaderValue, StatusCode};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time;
    use url::Url;

    enum Step {
        Respond(StatusCode),
        Fail(&'static str),
        Hang,
    }

    struct Attempt {
        headers: HeaderMap,
        body: Bytes,
    }

    #[derive(Clone)]
    struct MockRawClient {
        steps: Arc<Mutex<VecDeque<Step>>>,
        attempts: Arc<Mutex<Vec<Attempt>>>,
    }

    impl MockRawClient {
        fn new(steps: Vec<Step>) -> MockRawClient {
            MockRawClient {
                steps: Arc::new(Mutex::new(steps.into())),
                attempts: Arc::new(Mutex::new(vec![])),
            }
        }

        fn bodies(&self) -> Vec<Bytes> {
            self.attempts.lock().iter().map(|a| a.body.clone()).collect()
        }
    }

    impl BuildRawClient for MockRawClient {
        type RawClient = MockRawClient;

        fn build_raw_client(
            &self,
            _: &Builder<builder::Complete<Self>>,
        ) -> Result<Self::RawClient, Error> {
            Ok(self.clone())
        }
    }

    impl Service<http::Request<RawBody>> for MockRawClient {
        type Response = http::Response<hyper::Body>;
        type Error = &'static str;

        async fn call(
            &self,
            req: http::Request<RawBody>,
        ) -> Result<Self::Response, Self::Error> {
            let (parts, body) = req.into_parts();
            let body = hyper::body::to_bytes(body).await.unwrap();
            self.attempts.lock().push(Attempt {
                headers: parts.headers,
                body,
            });

            let step = self.steps.lock().pop_front().expect("unexpected attempt");
            match step {
                Step::Respond(status) => Ok(http::Response::builder()
                    .status(status)
                    .body(hyper::Body::empty())
                    .unwrap()),
                Step::Fail(message) => Err(message),
                Step::Hang => {
                    time::sleep(Duration::from_secs(60 * 60)).await;
                    Ok(http::Response::new(hyper::Body::empty()))
                }
            }
        }
    }

    fn client(builder: Builder, raw: &MockRawClient) -> Client<MockRawClient> {
        builder.raw_client_builder(raw.clone()).build().unwrap()
    }

    fn url() -> Url {
        "http://localhost:1234/widgets".parse().unwrap()
    }

    fn body() -> BytesBody {
        BytesBody::new("hello world", HeaderValue::from_static("text/plain"))
    }

    #[tokio::test]
    async fn always_server_error() {
        let raw = MockRawClient::new(vec![
            Step::Respond(StatusCode::INTERNAL_SERVER_ERROR),
            Step::Respond(StatusCode::INTERNAL_SERVER_ERROR),
        ]);
        let client = client(
            Builder::for_test()
                .max_num_retries(1)
                .retry_condition(retry::server_error),
            &raw,
        );

        let response = client.post(url()).body(body()).send().await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), "");
        assert_eq!(raw.bodies(), vec!["hello world", "hello world"]);
    }

    #[tokio::test]
    async fn success_after_server_error() {
        let raw = MockRawClient::new(vec![
            Step::Respond(StatusCode::INTERNAL_SERVER_ERROR),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(
            Builder::for_test()
                .max_num_retries(1)
                .retry_condition(retry::server_error),
            &raw,
        );

        let response = client.post(url()).body(body()).send().await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(raw.bodies(), vec!["hello world", "hello world"]);
    }

    #[tokio::test]
    async fn retry_after_transport_error() {
        let raw = MockRawClient::new(vec![
            Step::Fail("connection refused"),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(Builder::for_test().max_num_retries(1), &raw);

        let response = client.post(url()).body(body()).send().await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(raw.bodies(), vec!["hello world", "hello world"]);
    }

    #[tokio::test]
    async fn give_up_after_limit() {
        let raw = MockRawClient::new(vec![
            Step::Fail("attempt 1"),
            Step::Fail("attempt 2"),
            Step::Fail("attempt 3"),
            Step::Fail("attempt 4"),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(Builder::for_test().max_num_retries(3), &raw);

        let err = client.put(url()).body(body()).send().await.unwrap_err();

        assert_eq!(err.cause().to_string(), "attempt 4");
        assert_eq!(raw.bodies().len(), 4);
        assert!(raw.bodies().iter().all(|b| b == "hello world"));
    }

    #[tokio::test]
    async fn no_retries() {
        let raw = MockRawClient::new(vec![Step::Fail("connection refused")]);
        let client = client(Builder::for_test().max_num_retries(0), &raw);

        let err = client.post(url()).body(body()).send().await.unwrap_err();

        assert_eq!(err.cause().to_string(), "connection refused");
        assert_eq!(raw.bodies().len(), 1);
    }

    #[tokio::test]
    async fn no_retry_unmatched_outcome() {
        let raw = MockRawClient::new(vec![Step::Respond(StatusCode::INTERNAL_SERVER_ERROR)]);
        let client = client(Builder::for_test(), &raw);

        let response = client.post(url()).body(body()).send().await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(raw.bodies().len(), 1);
    }

    #[tokio::test]
    async fn fresh_budget_per_request() {
        let raw = MockRawClient::new(vec![
            Step::Fail("connection refused"),
            Step::Respond(StatusCode::OK),
            Step::Fail("connection refused"),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(Builder::for_test().max_num_retries(1), &raw);

        for _ in 0..2 {
            let response = client.get(url()).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(raw.bodies().len(), 4);
    }

    #[tokio::test]
    async fn content_headers() {
        let raw = MockRawClient::new(vec![Step::Respond(StatusCode::OK)]);
        let client = client(Builder::for_test(), &raw);

        let mut request = client.post(url()).body(body());
        request
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("1000"));
        request.send().await.unwrap();

        let attempts = raw.attempts.lock();
        assert_eq!(attempts[0].headers.get(CONTENT_LENGTH).unwrap(), "11");
        assert_eq!(attempts[0].headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn no_body() {
        let raw = MockRawClient::new(vec![
            Step::Fail("connection refused"),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(Builder::for_test(), &raw);

        client.get(url()).send().await.unwrap();

        let attempts = raw.attempts.lock();
        assert_eq!(attempts.len(), 2);
        for attempt in &*attempts {
            assert_eq!(attempt.headers.get(CONTENT_LENGTH), None);
            assert_eq!(attempt.headers.get(CONTENT_TYPE), None);
            assert_eq!(attempt.body, "");
        }
    }

    struct StreamedBody {
        writes: Arc<AtomicU32>,
        resettable: bool,
    }

    #[async_trait]
    impl Body for StreamedBody {
        fn content_length(&self) -> Option<u64> {
            None
        }

        fn content_type(&self) -> HeaderValue {
            HeaderValue::from_static("text/plain")
        }

        async fn write(self: Pin<&mut Self>, mut w: Pin<&mut BodyWriter>) -> Result<(), Error> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            w.write_all(b"hello ").await.unwrap();
            w.flush().await.unwrap();
            w.write_all(b"world").await.unwrap();
            Ok(())
        }

        async fn reset(self: Pin<&mut Self>) -> bool {
            self.resettable
        }
    }

    #[tokio::test]
    async fn streamed_body_written_once() {
        let raw = MockRawClient::new(vec![
            Step::Respond(StatusCode::SERVICE_UNAVAILABLE),
            Step::Fail("connection reset"),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(
            Builder::for_test()
                .max_num_retries(2)
                .retry_condition(retry::status([StatusCode::SERVICE_UNAVAILABLE])),
            &raw,
        );

        let writes = Arc::new(AtomicU32::new(0));
        let body = StreamedBody {
            writes: writes.clone(),
            resettable: true,
        };
        let response = client.post(url()).body(body).send().await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            raw.bodies(),
            vec!["hello world", "hello world", "hello world"]
        );
        assert_eq!(raw.attempts.lock()[2].headers.get(CONTENT_LENGTH).unwrap(), "11");
    }

    #[tokio::test]
    async fn single_read_body_rejected() {
        let raw = MockRawClient::new(vec![Step::Respond(StatusCode::OK)]);
        let client = client(Builder::for_test(), &raw);

        let body = StreamedBody {
            writes: Arc::new(AtomicU32::new(0)),
            resettable: false,
        };
        let err = client.post(url()).body(body).send().await.unwrap_err();

        assert!(err.cause().is::<BodyReplayError>());
        assert!(raw.bodies().is_empty());
    }

    #[tokio::test]
    async fn deadline_aborts_attempt() {
        time::pause();

        let raw = MockRawClient::new(vec![Step::Hang, Step::Respond(StatusCode::OK)]);
        let client = client(Builder::for_test().max_num_retries(1), &raw);

        let err = client
            .post(url())
            .body(body())
            .timeout(Duration::from_secs(1))
            .send()
            .await
            .unwrap_err();

        assert!(err.cause().is::<TimeoutError>());
        assert_eq!(raw.bodies().len(), 1);
    }

    #[tokio::test]
    async fn request_timeout_from_builder() {
        time::pause();

        let raw = MockRawClient::new(vec![Step::Hang]);
        let client = client(
            Builder::for_test().request_timeout(Duration::from_secs(5)),
            &raw,
        );

        let err = client.get(url()).send().await.unwrap_err();

        assert!(err.cause().is::<TimeoutError>());
    }

    #[tokio::test]
    async fn backoff_between_attempts() {
        time::pause();

        let raw = MockRawClient::new(vec![
            Step::Fail("connection refused"),
            Step::Fail("connection refused"),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(
            Builder::for_test()
                .max_num_retries(2)
                .backoff_slot_size(Duration::from_millis(10)),
            &raw,
        );

        let response = client.post(url()).body(body()).send().await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(raw.bodies().len(), 3);
    }

    #[tokio::test]
    async fn backoff_past_deadline_returns_last_outcome() {
        time::pause();

        let raw = MockRawClient::new(vec![
            Step::Fail("connection refused"),
            Step::Respond(StatusCode::OK),
        ]);
        let client = client(
            Builder::for_test()
                .max_num_retries(1)
                .backoff_slot_size(Duration::from_secs(60 * 60)),
            &raw,
        );

        let err = client
            .post(url())
            .body(body())
            .timeout(Duration::from_millis(1))
            .send()
            .await
            .unwrap_err();

        assert_eq!(err.cause().to_string(), "connection refused");
        assert_eq!(raw.bodies().len(), 1);
    }

    struct SlowBody {
        delay: Duration,
    }

    #[async_trait]
    impl Body for SlowBody {
        fn content_length(&self) -> Option<u64> {
            None
        }

        fn content_type(&self) -> HeaderValue {
            HeaderValue::from_static("text/plain")
        }

        async fn write(self: Pin<&mut Self>, mut w: Pin<&mut BodyWriter>) -> Result<(), Error> {
            time::sleep(self.delay).await;
            w.write_all(b"hello world").await.unwrap();
            Ok(())
        }

        async fn reset(self: Pin<&mut Self>) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn deadline_bounds_body_buffering() {
        time::pause();

        let raw = MockRawClient::new(vec![Step::Respond(StatusCode::OK)]);
        let client = client(Builder::for_test(), &raw);

        let start = time::Instant::now();
        let err = client
            .post(url())
            .body(SlowBody {
                delay: Duration::from_secs(60 * 60),
            })
            .timeout(Duration::from_secs(1))
            .send()
            .await
            .unwrap_err();

        assert!(err.cause().is::<TimeoutError>());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(raw.bodies().is_empty());
    }

    #[tokio::test]
    async fn no_attempt_after_deadline() {
        time::pause();

        let raw = MockRawClient::new(vec![Step::Respond(StatusCode::OK)]);
        let client = client(Builder::for_test(), &raw);

        let err = client
            .post(url())
            .body(SlowBody {
                delay: Duration::from_secs(1),
            })
            .timeout(Duration::from_secs(1))
            .send()
            .await
            .unwrap_err();

        assert!(err.cause().is::<TimeoutError>());
        assert!(raw.bodies().is_empty());
    }
}
