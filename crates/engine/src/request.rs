//! Scatter/gather requests.
//!
//! [`Aggregator::request_with`] publishes one request with a private reply
//! subject and feeds every reply to a callback until one of the following
//! ends the operation:
//!
//! - the hard deadline (`timeout`) passes,
//! - the expected number of replies has been received,
//! - for requests of unknown cardinality, no reply arrived within the quiet
//!   period since the last one ([`QUIET_PERIOD`]),
//! - a reply reports that the service is unavailable (status `503`).
//!
//! The reply collector and the quiet-period timer race against each other.
//! Both mutate a small state machine (`Waiting` → `Cancelling` → `Done`)
//! behind one lock and raise a shared cancellation token; whichever fires
//! first wins and the reply subscription is torn down on every exit path.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{
    sync::{Mutex, Notify},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    bus::{Bus, BusMessage, Subscription},
    compression::{decode_body, is_unavailable, request_headers},
    error::RequestError,
};

/// Extra time granted after each reply while the reply count is unknown.
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

const SYSTEM_SUBJECT_PREFIX: &str = "$SYS";

/// Body of an outbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestPayload {
    /// Sent as an empty JSON object.
    #[default]
    Empty,
    /// Pre-serialized text, sent verbatim.
    Raw(String),
    Json(Value),
}

impl RequestPayload {
    /// Serialize any value into a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, RequestError> {
        Ok(RequestPayload::Json(serde_json::to_value(value)?))
    }

    fn to_bytes(&self) -> Result<Bytes, RequestError> {
        Ok(match self {
            RequestPayload::Empty => Bytes::from_static(b"{}"),
            RequestPayload::Raw(text) => Bytes::from(text.clone()),
            RequestPayload::Json(value) => Bytes::from(serde_json::to_vec(value)?),
        })
    }
}

impl From<String> for RequestPayload {
    fn from(text: String) -> Self {
        RequestPayload::Raw(text)
    }
}

impl From<&str> for RequestPayload {
    fn from(text: &str) -> Self {
        RequestPayload::Raw(text.to_string())
    }
}

impl From<Value> for RequestPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RequestPayload::Empty,
            value => RequestPayload::Json(value),
        }
    }
}

impl From<Map<String, Value>> for RequestPayload {
    fn from(object: Map<String, Value>) -> Self {
        RequestPayload::Json(Value::Object(object))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Cancelling,
    Done,
}

#[derive(Debug)]
struct Tracker {
    phase: Phase,
    received: usize,
    quiet_deadline: Instant,
}

/// State shared by the waiting request, the reply collector and the timer.
#[derive(Debug)]
struct Shared {
    tracker: Mutex<Tracker>,
    reset: Notify,
    done: CancellationToken,
}

/// Sends requests over a [`Bus`] and aggregates the replies.
#[derive(Clone)]
pub struct Aggregator {
    bus: Arc<dyn Bus>,
}

impl Aggregator {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    /// Send a request and collect every reply body in arrival order.
    ///
    /// `expected_replies` of `0` means the number of responders is unknown;
    /// see the module documentation for when collection stops.
    pub async fn request(
        &self,
        payload: impl Into<RequestPayload>,
        subject: &str,
        expected_replies: usize,
        timeout: Duration,
    ) -> Result<Vec<Bytes>, RequestError> {
        let mut replies = Vec::new();
        self.request_with(payload, subject, expected_replies, timeout, |body| replies.push(body))
            .await?;
        Ok(replies)
    }

    /// Send a request and hand each decoded reply body to `on_reply`.
    ///
    /// Returns the number of replies delivered.
    pub async fn request_with<F>(
        &self,
        payload: impl Into<RequestPayload>,
        subject: &str,
        expected_replies: usize,
        timeout: Duration,
        mut on_reply: F,
    ) -> Result<usize, RequestError>
    where
        F: FnMut(Bytes) + Send,
    {
        if subject.trim().is_empty() {
            return Err(RequestError::invalid("subject must not be empty"));
        }
        if timeout.is_zero() {
            return Err(RequestError::invalid("timeout must be greater than zero"));
        }
        let body = payload.into().to_bytes()?;

        let inbox = self.bus.new_inbox();
        let mut subscription = self.bus.subscribe(&inbox).await.map_err(RequestError::Subscribe)?;

        debug!(
            subject,
            expected_replies,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "sending request"
        );
        let started = Instant::now();
        let outcome = self
            .gather(subscription.as_mut(), body, subject, &inbox, expected_replies, timeout, &mut on_reply)
            .await;

        if let Err(err) = subscription.unsubscribe().await {
            debug!(subject, "reply subscription teardown failed: {err}");
        }

        match outcome {
            Ok(received) => {
                debug!(
                    subject,
                    received,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "request finished"
                );
                Ok(received)
            }
            Err(RequestError::NoResponders) if subject.starts_with(SYSTEM_SUBJECT_PREFIX) => {
                Err(RequestError::SystemPermission)
            }
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn gather<F>(
        &self,
        subscription: &mut dyn Subscription,
        body: Bytes,
        subject: &str,
        inbox: &str,
        expected_replies: usize,
        timeout: Duration,
        on_reply: &mut F,
    ) -> Result<usize, RequestError>
    where
        F: FnMut(Bytes) + Send,
    {
        let hard_deadline = Instant::now() + timeout;
        let unbounded = expected_replies == 0;

        if !unbounded {
            subscription
                .unsubscribe_after(expected_replies as u64)
                .await
                .map_err(RequestError::Subscribe)?;
        }

        let request = BusMessage {
            subject: subject.to_string(),
            reply: Some(inbox.to_string()),
            headers: request_headers(subject),
            payload: body,
        };
        self.bus.publish(request).await.map_err(RequestError::Publish)?;

        let shared = Arc::new(Shared {
            tracker: Mutex::new(Tracker {
                phase: Phase::Waiting,
                received: 0,
                quiet_deadline: hard_deadline,
            }),
            reset: Notify::new(),
            done: CancellationToken::new(),
        });
        let timer = unbounded.then(|| tokio::spawn(run_quiet_timer(Arc::clone(&shared))));

        let outcome = tokio::select! {
            result = collect_replies(&shared, subscription, expected_replies, on_reply) => result,
            _ = shared.done.cancelled() => Ok(()),
            _ = sleep_until(hard_deadline) => {
                trace!(subject, "request deadline reached");
                Ok(())
            }
        };

        shared.done.cancel();
        let received = {
            let mut tracker = shared.tracker.lock().await;
            tracker.phase = Phase::Done;
            tracker.received
        };
        if let Some(timer) = timer
            && let Err(err) = timer.await
        {
            debug!(subject, "quiet period timer ended abnormally: {err}");
        }

        outcome.map(|()| received)
    }
}

/// Reply collector. Runs until the subscription closes, the expected count
/// is reached or a reply fails the request.
async fn collect_replies<F>(
    shared: &Shared,
    subscription: &mut dyn Subscription,
    expected_replies: usize,
    on_reply: &mut F,
) -> Result<(), RequestError>
where
    F: FnMut(Bytes) + Send,
{
    while let Some(message) = subscription.next().await {
        let mut tracker = shared.tracker.lock().await;
        if tracker.phase != Phase::Waiting {
            break;
        }

        let BusMessage {
            subject,
            headers,
            payload,
            ..
        } = message;
        let body = decode_body(&headers, payload).map_err(|source| RequestError::Decompress { subject, source })?;

        if expected_replies == 0 {
            tracker.quiet_deadline = Instant::now() + QUIET_PERIOD;
            shared.reset.notify_one();
            trace!(received = tracker.received, "quiet period restarted");
        }

        if is_unavailable(&headers) {
            tracker.phase = Phase::Cancelling;
            return Err(RequestError::NoResponders);
        }

        on_reply(body);
        tracker.received += 1;

        if expected_replies > 0 && tracker.received >= expected_replies {
            tracker.phase = Phase::Cancelling;
            shared.done.cancel();
            break;
        }
    }
    Ok(())
}

/// Quiet-period timer. Sleeps until the current deadline and cancels the
/// request if no reply moved the deadline in the meantime.
async fn run_quiet_timer(shared: Arc<Shared>) {
    loop {
        let deadline = {
            let tracker = shared.tracker.lock().await;
            if tracker.phase != Phase::Waiting {
                return;
            }
            tracker.quiet_deadline
        };

        tokio::select! {
            _ = shared.done.cancelled() => return,
            _ = shared.reset.notified() => continue,
            _ = sleep_until(deadline) => {}
        }

        let mut tracker = shared.tracker.lock().await;
        if tracker.phase == Phase::Waiting && Instant::now() >= tracker.quiet_deadline {
            tracker.phase = Phase::Cancelling;
            shared.done.cancel();
            return;
        }
    }
}
