//! Registry crate for building the microsh command tree.
//!
//! This crate discovers the services answering on the bus, turns each
//! service's endpoint subjects into a tree of commands, mirrors that tree as
//! a Clap command hierarchy, and runs the selected command by sending a
//! request assembled from its parameter flags.

pub mod clap_builder;
pub mod discovery;
pub mod error;
pub mod invocation;
pub mod models;
pub mod tree;

pub use clap_builder::{GLOBAL_FLAGS, build_clap, create_root_command};
pub use discovery::{DISCOVERY_SUBJECT, DISCOVERY_TIMEOUT, discover, discover_catalog, parse_discovery};
pub use error::{BuildError, DiscoveryError, InvocationError};
pub use invocation::{INVOCATION_TIMEOUT, LeafAction};
pub use models::{CommandCatalog, Selection};
pub use tree::{CommandNode, build_tree};
