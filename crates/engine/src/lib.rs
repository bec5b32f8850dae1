//! # Microsh Engine
//!
//! Request/reply aggregation over a publish/subscribe bus.
//!
//! A request is published once with a private reply subject and may be
//! answered by zero, one or many responders. The [`Aggregator`] collects those
//! replies under a deadline, transparently decodes snappy-compressed bodies,
//! treats a `503` status as "no responders", and for requests of unknown
//! cardinality keeps listening for as long as replies keep arriving within a
//! short quiet period.
//!
//! ## Architecture
//!
//! - **`bus`**: the [`Bus`]/[`Subscription`] seam and the message types
//! - **`request`**: the aggregation state machine
//! - **`compression`**: header conventions and body decoding
//! - **`memory`**: an in-process bus for tests and embedding
//! - **`nats`**: the adapter over an `async_nats::Client`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use microsh_engine::{Aggregator, MemoryBus, RequestPayload};
//!
//! # async fn demo() -> Result<(), microsh_engine::RequestError> {
//! let aggregator = Aggregator::new(Arc::new(MemoryBus::new()));
//! let replies = aggregator
//!     .request(RequestPayload::Empty, "$SRV.INFO", 0, Duration::from_secs(10))
//!     .await?;
//! println!("{} services answered", replies.len());
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod compression;
pub mod error;
pub mod memory;
pub mod nats;
pub mod request;

pub use bus::{Bus, BusError, BusMessage, Headers, Subscription};
pub use error::RequestError;
pub use memory::MemoryBus;
pub use nats::NatsBus;
pub use request::{Aggregator, QUIET_PERIOD, RequestPayload};
