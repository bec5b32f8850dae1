//! Command tree construction.
//!
//! Each discovered service becomes one tree. Endpoint subjects are split on
//! `.`; the first segment names the service (the root) and every further
//! segment descends one level, creating intermediate nodes on demand. The
//! node reached by the last segment receives the endpoint.

use std::collections::{BTreeMap, HashSet};

use microsh_types::{EndpointInfo, Parameter, ServiceInfo};
use tracing::debug;

use crate::{BuildError, clap_builder::GLOBAL_FLAGS, invocation::LeafAction};

/// One segment of a command path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandNode {
    pub name: String,
    pub summary: String,
    pub description: String,
    /// Present when the node can be invoked.
    pub endpoint: Option<LeafAction>,
    pub children: BTreeMap<String, CommandNode>,
}

impl CommandNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_invocable(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn child(&self, name: &str) -> Option<&CommandNode> {
        self.children.get(name)
    }

    /// Walk `path` below this node.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&CommandNode> {
        path.iter().try_fold(self, |node, segment| node.child(segment.as_ref()))
    }

    /// Number of invocable nodes in this subtree, this node included.
    pub fn leaf_count(&self) -> usize {
        usize::from(self.is_invocable()) + self.children.values().map(CommandNode::leaf_count).sum::<usize>()
    }

    fn descend<'a>(&mut self, path: impl Iterator<Item = &'a str>) -> &mut CommandNode {
        path.fold(self, |node, segment| {
            node.children
                .entry(segment.to_string())
                .or_insert_with(|| CommandNode::new(segment))
        })
    }
}

/// Build the command tree of one service.
///
/// The root is named after the service and summarized by its description.
/// An endpoint whose subject has no segments beyond the service name makes
/// the root itself invocable.
///
/// # Errors
///
/// Returns a [`BuildError`] when an endpoint's parameter list declares an
/// unknown kind, repeats a name or uses a name reserved by the shell. A
/// parameter list that is not valid JSON is not an error; the endpoint is
/// built without parameters.
pub fn build_tree(info: &ServiceInfo) -> Result<CommandNode, BuildError> {
    let mut root = CommandNode {
        name: info.name.clone(),
        summary: info.description.clone(),
        ..Default::default()
    };

    for endpoint in &info.endpoints {
        let action = leaf_action(endpoint)?;
        let node = root.descend(endpoint.command_path());
        if let Some(metadata) = &endpoint.metadata {
            node.summary = metadata.summary().to_string();
            node.description = metadata.description().to_string();
        }
        if node.endpoint.is_some() {
            debug!(subject = %endpoint.subject, "endpoint replaces an earlier one on the same path");
        }
        node.endpoint = Some(action);
    }

    Ok(root)
}

fn leaf_action(endpoint: &EndpointInfo) -> Result<LeafAction, BuildError> {
    let parameters = match &endpoint.metadata {
        Some(metadata) => metadata.parameters().map_err(|source| BuildError::Parameters {
            subject: endpoint.subject.clone(),
            source,
        })?,
        None => Vec::new(),
    };
    check_parameter_names(&endpoint.subject, &parameters)?;
    Ok(LeafAction::new(endpoint.subject.clone(), parameters))
}

fn check_parameter_names(subject: &str, parameters: &[Parameter]) -> Result<(), BuildError> {
    let mut seen = HashSet::new();
    for parameter in parameters {
        let name = parameter.name();
        if name.trim().is_empty() {
            return Err(BuildError::UnnamedParameter {
                subject: subject.to_string(),
            });
        }
        if name == "help" || GLOBAL_FLAGS.contains(&name) {
            return Err(BuildError::ReservedParameter {
                subject: subject.to_string(),
                name: name.to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(BuildError::DuplicateParameter {
                subject: subject.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
