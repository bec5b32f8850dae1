//! Service discovery over the bus.

use std::time::Duration;

use bytes::Bytes;
use microsh_engine::{Aggregator, RequestPayload};
use microsh_types::ServiceInfo;
use tracing::debug;

use crate::{CommandCatalog, DiscoveryError};

/// Subject every service instance answers with its [`ServiceInfo`].
pub const DISCOVERY_SUBJECT: &str = "$SRV.INFO";

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Ask every service on the bus to describe itself.
///
/// The number of instances is unknown, so collection stops one quiet period
/// after the last answer. Answers are returned in arrival order, one per
/// instance.
///
/// # Errors
///
/// Fails when the request fails (including when nothing answers at all) or
/// when any answer is not a valid service description.
pub async fn discover(aggregator: &Aggregator) -> Result<Vec<ServiceInfo>, DiscoveryError> {
    let replies = aggregator
        .request(RequestPayload::Empty, DISCOVERY_SUBJECT, 0, DISCOVERY_TIMEOUT)
        .await?;
    debug!(answers = replies.len(), "discovery finished");
    parse_discovery(&replies)
}

/// Parse raw discovery answers.
pub fn parse_discovery(replies: &[Bytes]) -> Result<Vec<ServiceInfo>, DiscoveryError> {
    replies
        .iter()
        .map(|reply| serde_json::from_slice::<ServiceInfo>(reply).map_err(DiscoveryError::from))
        .collect()
}

/// Discover the services on the bus and build their command trees.
pub async fn discover_catalog(aggregator: &Aggregator) -> anyhow::Result<CommandCatalog> {
    let services = discover(aggregator).await?;
    Ok(CommandCatalog::from_services(services)?)
}
