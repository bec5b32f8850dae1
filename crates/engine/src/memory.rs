//! In-process bus.
//!
//! Subjects are matched exactly (no wildcards). Like a real server, a
//! request published with a reply subject to a subject nobody listens on is
//! answered with a `503` status message. Every published message is recorded
//! so callers can inspect the traffic afterwards.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::trace;

use crate::{
    bus::{Bus, BusError, BusMessage, Subscription},
    compression::{NO_RESPONDERS_STATUS, STATUS_HEADER},
};

#[derive(Debug)]
struct Route {
    id: u64,
    sender: UnboundedSender<BusMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    routes: Mutex<HashMap<String, Vec<Route>>>,
    published: Mutex<Vec<BusMessage>>,
}

impl Inner {
    fn detach(&self, subject: &str, id: u64) {
        let mut routes = lock(&self.routes);
        if let Some(listeners) = routes.get_mut(subject) {
            listeners.retain(|route| route.id != id);
            if listeners.is_empty() {
                routes.remove(subject);
            }
        }
    }

    fn deliver(&self, message: BusMessage) -> usize {
        let routes = lock(&self.routes);
        let Some(listeners) = routes.get(&message.subject) else {
            return 0;
        };
        listeners
            .iter()
            .filter(|route| route.sender.send(message.clone()).is_ok())
            .count()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A publish/subscribe bus living entirely inside the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, in publish order.
    pub fn published(&self) -> Vec<BusMessage> {
        lock(&self.inner.published).clone()
    }

    /// Messages published to exactly `subject`.
    pub fn published_to(&self, subject: &str) -> Vec<BusMessage> {
        lock(&self.inner.published)
            .iter()
            .filter(|message| message.subject == subject)
            .cloned()
            .collect()
    }

    /// Number of live subscriptions on `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        lock(&self.inner.routes).get(subject).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Bus for MemoryBus {
    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, BusError> {
        if subject.trim().is_empty() {
            return Err(BusError::subscribe(subject, "empty subject"));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded_channel();
        lock(&self.inner.routes)
            .entry(subject.to_string())
            .or_default()
            .push(Route { id, sender });
        Ok(Box::new(MemorySubscription {
            id,
            subject: subject.to_string(),
            receiver,
            remaining: None,
            inner: Arc::clone(&self.inner),
            closed: false,
        }))
    }

    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        if message.subject.trim().is_empty() {
            return Err(BusError::publish(&message.subject, "empty subject"));
        }
        lock(&self.inner.published).push(message.clone());

        let reply = message.reply.clone();
        let subject = message.subject.clone();
        let delivered = self.inner.deliver(message);
        trace!(%subject, delivered, "memory bus publish");

        if delivered == 0
            && let Some(reply) = reply
        {
            let status = BusMessage::new(reply, Bytes::new()).with_header(STATUS_HEADER, NO_RESPONDERS_STATUS);
            self.inner.deliver(status);
        }
        Ok(())
    }
}

struct MemorySubscription {
    id: u64,
    subject: String,
    receiver: UnboundedReceiver<BusMessage>,
    remaining: Option<u64>,
    inner: Arc<Inner>,
    closed: bool,
}

impl MemorySubscription {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.detach(&self.subject, self.id);
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<BusMessage> {
        if self.remaining == Some(0) {
            self.close();
            return None;
        }
        let message = self.receiver.recv().await?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.close();
            }
        }
        Some(message)
    }

    async fn unsubscribe_after(&mut self, count: u64) -> Result<(), BusError> {
        self.remaining = Some(count);
        if count == 0 {
            self.close();
        }
        Ok(())
    }

    async fn unsubscribe(&mut self) -> Result<(), BusError> {
        self.close();
        self.receiver.close();
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.close();
    }
}
