//! [`Bus`] adapter over a live `async_nats` connection.

use async_nats::{Client, HeaderMap, Subscriber};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::trace;

use crate::{
    bus::{Bus, BusError, BusMessage, Headers, Subscription},
    compression::{CONTENT_ENCODING_HEADER, STATUS_HEADER},
};

/// Headers from the wire that the engine looks at.
const FORWARDED_HEADERS: [&str; 2] = [CONTENT_ENCODING_HEADER, STATUS_HEADER];

/// A bus backed by an established NATS connection.
///
/// The connection is owned by the caller; dropping the bus does not close it.
#[derive(Debug, Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn to_header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers.iter() {
        map.insert(name, value);
    }
    map
}

fn from_nats(message: async_nats::Message) -> BusMessage {
    let mut headers = Headers::new();
    if let Some(wire) = message.headers.as_ref() {
        for name in FORWARDED_HEADERS {
            if let Some(value) = wire.get(name) {
                headers.insert(name, value.as_str());
            }
        }
    }
    // No-responder notices arrive as a status line rather than a header.
    if let Some(status) = message.status {
        headers.insert(STATUS_HEADER, status.as_u16().to_string());
    }
    BusMessage {
        subject: message.subject.to_string(),
        reply: message.reply.map(|reply| reply.to_string()),
        headers,
        payload: message.payload,
    }
}

#[async_trait]
impl Bus for NatsBus {
    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, BusError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|err| BusError::subscribe(subject, err))?;
        Ok(Box::new(NatsSubscription { subscriber }))
    }

    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        let BusMessage {
            subject,
            reply,
            headers,
            payload,
        } = message;
        trace!(%subject, reply = reply.as_deref(), bytes = payload.len(), "nats publish");

        let result = match reply {
            Some(reply) => {
                self.client
                    .publish_with_reply_and_headers(subject.clone(), reply, to_header_map(&headers), payload)
                    .await
            }
            None => {
                self.client
                    .publish_with_headers(subject.clone(), to_header_map(&headers), payload)
                    .await
            }
        };
        result.map_err(|err| BusError::publish(&subject, err))?;
        self.client.flush().await.map_err(|err| BusError::publish(&subject, err))
    }
}

struct NatsSubscription {
    subscriber: Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next(&mut self) -> Option<BusMessage> {
        self.subscriber.next().await.map(from_nats)
    }

    async fn unsubscribe_after(&mut self, count: u64) -> Result<(), BusError> {
        self.subscriber
            .unsubscribe_after(count)
            .await
            .map_err(BusError::unsubscribe)
    }

    async fn unsubscribe(&mut self) -> Result<(), BusError> {
        self.subscriber.unsubscribe().await.map_err(BusError::unsubscribe)
    }
}
