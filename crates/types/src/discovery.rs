//! Service discovery documents.
//!
//! Every service instance answers the discovery subject with one
//! [`ServiceInfo`] document listing its endpoints.

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// Discovery answer of a single service instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub endpoints: Vec<EndpointInfo>,
}

/// One remotely invocable operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    #[serde(default)]
    pub name: String,
    /// Dot separated subject; the first segment names the service.
    pub subject: String,
    #[serde(default)]
    pub queue_group: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl EndpointInfo {
    pub fn new(subject: impl Into<String>, metadata: Option<Metadata>) -> Self {
        Self {
            subject: subject.into(),
            metadata,
            ..Default::default()
        }
    }

    /// Subject segments after the leading service segment, skipping empty ones.
    pub fn command_path(&self) -> impl Iterator<Item = &str> {
        self.subject.split('.').skip(1).filter(|segment| !segment.is_empty())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<EndpointInfo>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<EndpointInfo>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Collapse the answers of several instances of the same service into one
/// document per service name, keeping the order in which services first
/// answered. Endpoints are unioned by subject; the first non-empty
/// description wins.
pub fn merge_services(infos: impl IntoIterator<Item = ServiceInfo>) -> Vec<ServiceInfo> {
    let mut merged: Vec<ServiceInfo> = Vec::new();
    for info in infos {
        let Some(existing) = merged.iter_mut().find(|service| service.name == info.name) else {
            merged.push(info);
            continue;
        };
        if existing.description.is_empty() {
            existing.description = info.description;
        }
        for endpoint in info.endpoints {
            if !existing.endpoints.iter().any(|known| known.subject == endpoint.subject) {
                existing.endpoints.push(endpoint);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_response() {
        let json = r#"{
            "name": "orders",
            "id": "4nKr2",
            "version": "1.2.0",
            "description": "Order management",
            "type": "io.nats.micro.v1.info_response",
            "metadata": null,
            "endpoints": [
                {"name": "get", "subject": "orders.get", "queue_group": "q", "metadata": {"_nats.shell.summary": "Get"}},
                {"name": "list", "subject": "orders.list", "metadata": null}
            ]
        }"#;
        let info: ServiceInfo = serde_json::from_str(json).expect("parse info");
        assert_eq!(info.name, "orders");
        assert_eq!(info.kind, "io.nats.micro.v1.info_response");
        assert_eq!(info.endpoints.len(), 2);
        assert_eq!(info.endpoints[0].metadata.as_ref().unwrap().summary(), "Get");
        assert!(info.endpoints[1].metadata.is_none());
    }

    #[test]
    fn null_endpoints_are_empty() {
        let info: ServiceInfo = serde_json::from_str(r#"{"name":"idle","endpoints":null}"#).unwrap();
        assert!(info.endpoints.is_empty());
    }

    #[test]
    fn command_path_drops_service_segment() {
        let endpoint = EndpointInfo::new("orders.items.add", None);
        assert_eq!(endpoint.command_path().collect::<Vec<_>>(), vec!["items", "add"]);
        assert_eq!(EndpointInfo::new("orders", None).command_path().count(), 0);
    }

    #[test]
    fn merge_collapses_instances() {
        let first = ServiceInfo {
            name: "orders".into(),
            endpoints: vec![EndpointInfo::new("orders.get", None)],
            ..Default::default()
        };
        let second = ServiceInfo {
            name: "orders".into(),
            description: "Order management".into(),
            endpoints: vec![EndpointInfo::new("orders.get", None), EndpointInfo::new("orders.list", None)],
            ..Default::default()
        };
        let other = ServiceInfo {
            name: "billing".into(),
            ..Default::default()
        };
        let merged = merge_services([first, other, second]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "orders");
        assert_eq!(merged[0].description, "Order management");
        assert_eq!(merged[0].endpoints.len(), 2);
        assert_eq!(merged[1].name, "billing");
    }
}
