//! Endpoint metadata codec.
//!
//! Services attach an opaque string map to each endpoint. Three namespaced
//! keys carry the command help and the serialized parameter list; every other
//! key belongs to someone else and is passed through untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parameter::{Parameter, ParameterError, decode_parameters, encode_parameters};

pub const SUMMARY_KEY: &str = "_nats.shell.summary";
pub const DESCRIPTION_KEY: &str = "_nats.shell.description";
pub const PARAMETERS_KEY: &str = "_nats.shell.parameters";

/// A single change applied to a [`Metadata`] map.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataOption {
    Summary(String),
    Description(String),
    Parameters(Vec<Parameter>),
    Entries(HashMap<String, String>),
}

pub fn with_summary(text: impl Into<String>) -> MetadataOption {
    MetadataOption::Summary(text.into())
}

pub fn with_description(text: impl Into<String>) -> MetadataOption {
    MetadataOption::Description(text.into())
}

/// Appends to any parameter list already present.
pub fn with_parameters(parameters: impl IntoIterator<Item = Parameter>) -> MetadataOption {
    MetadataOption::Parameters(parameters.into_iter().collect())
}

/// Merges arbitrary keys, overwriting existing values.
pub fn with_entries(entries: HashMap<String, String>) -> MetadataOption {
    MetadataOption::Entries(entries)
}

/// Opaque key/value metadata of one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    /// Build metadata by applying `options` in order to an empty map.
    pub fn new(options: impl IntoIterator<Item = MetadataOption>) -> Self {
        let mut metadata = Metadata::default();
        for option in options {
            metadata.apply(option);
        }
        metadata
    }

    pub fn apply(&mut self, option: MetadataOption) {
        match option {
            MetadataOption::Summary(text) => {
                self.0.insert(SUMMARY_KEY.to_string(), text);
            }
            MetadataOption::Description(text) => {
                self.0.insert(DESCRIPTION_KEY.to_string(), text);
            }
            MetadataOption::Parameters(mut added) => {
                // An undecodable existing list is replaced rather than extended.
                let mut parameters = decode_parameters(self.0.get(PARAMETERS_KEY).map(String::as_str)).unwrap_or_default();
                parameters.append(&mut added);
                self.0.insert(PARAMETERS_KEY.to_string(), encode_parameters(&parameters));
            }
            MetadataOption::Entries(entries) => self.0.extend(entries),
        }
    }

    /// One-line summary, empty when absent.
    pub fn summary(&self) -> &str {
        self.get(SUMMARY_KEY).unwrap_or_default()
    }

    /// Long description, empty when absent.
    pub fn description(&self) -> &str {
        self.get(DESCRIPTION_KEY).unwrap_or_default()
    }

    /// Decoded parameter list; empty when absent or malformed.
    ///
    /// Returns an error only for a parameter of unknown kind.
    pub fn parameters(&self) -> Result<Vec<Parameter>, ParameterError> {
        decode_parameters(self.get(PARAMETERS_KEY))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl From<HashMap<String, String>> for Metadata {
    fn from(entries: HashMap<String, String>) -> Self {
        Metadata(entries)
    }
}

impl From<Metadata> for HashMap<String, String> {
    fn from(metadata: Metadata) -> Self {
        metadata.0
    }
}
