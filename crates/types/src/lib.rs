//! Shared type definitions for the microsh workspace.
//!
//! This crate holds the data model that flows between discovery, the command
//! tree builder and the request engine: typed invocation parameters, the
//! namespaced endpoint metadata codec, and the service discovery documents
//! answered by services on the bus.

pub mod discovery;
pub mod metadata;
pub mod parameter;

pub use discovery::{EndpointInfo, ServiceInfo, merge_services};
pub use metadata::{
    DESCRIPTION_KEY, Metadata, MetadataOption, PARAMETERS_KEY, SUMMARY_KEY, with_description, with_entries,
    with_parameters, with_summary,
};
pub use parameter::{ParamKind, ParamOption, ParamValue, Parameter, ParameterError, decode_parameters, encode_parameters};
