//! The publish/subscribe seam.
//!
//! The engine never talks to a concrete client. It publishes and subscribes
//! through [`Bus`], which lets the same aggregation code run against a live
//! NATS connection or the in-process [`crate::MemoryBus`].

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use thiserror::Error;

/// Transport failure reported by a [`Bus`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("subscribe to '{subject}' failed: {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },

    #[error("unsubscribe failed: {reason}")]
    Unsubscribe { reason: String },
}

impl BusError {
    pub fn subscribe(subject: impl Into<String>, reason: impl ToString) -> Self {
        Self::Subscribe {
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }

    pub fn publish(subject: impl Into<String>, reason: impl ToString) -> Self {
        Self::Publish {
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unsubscribe(reason: impl ToString) -> Self {
        Self::Unsubscribe {
            reason: reason.to_string(),
        }
    }
}

/// Ordered message headers with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any value stored under a differently cased name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.0.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// A message as seen on the bus, in either direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub reply: Option<String>,
    pub headers: Headers,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A live subscription. Messages are yielded in arrival order.
#[async_trait]
pub trait Subscription: Send {
    /// Next message, or `None` once the subscription is closed.
    async fn next(&mut self) -> Option<BusMessage>;

    /// Close the subscription automatically after `count` more messages.
    async fn unsubscribe_after(&mut self, count: u64) -> Result<(), BusError>;

    async fn unsubscribe(&mut self) -> Result<(), BusError>;
}

/// A publish/subscribe connection handle.
///
/// The engine only borrows the handle; it never closes it.
#[async_trait]
pub trait Bus: Send + Sync {
    /// A fresh, unique subject suitable for receiving replies.
    fn new_inbox(&self) -> String;

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, BusError>;

    async fn publish(&self, message: BusMessage) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.insert("Content-Encoding", "snappy");
        assert_eq!(headers.get("content-encoding"), Some("snappy"));
        headers.insert("CONTENT-ENCODING", "identity");
        assert_eq!(headers.get("Content-Encoding"), Some("identity"));
        assert_eq!(headers.iter().count(), 1);
    }
}
