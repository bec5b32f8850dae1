use clap::{ArgMatches, Command as ClapCommand};
use microsh_types::{ServiceInfo, merge_services};
use tracing::{debug, warn};

use crate::{BuildError, CommandNode, LeafAction, clap_builder, tree::build_tree};

/// The commands available on the bus: one tree per discovered service.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    services: Vec<CommandNode>,
}

/// The command selected by a parsed command line.
#[derive(Debug)]
pub struct Selection<'a> {
    /// Command names from the service down to the selected node.
    pub path: Vec<&'a str>,
    pub node: &'a CommandNode,
    /// Matches of the selected node, where its flags live.
    pub matches: &'a ArgMatches,
}

impl Selection<'_> {
    pub fn action(&self) -> Option<&LeafAction> {
        self.node.endpoint.as_ref()
    }
}

impl CommandCatalog {
    /// Builds the catalog from discovery answers.
    ///
    /// Answers from several instances of one service are merged first, so
    /// each service appears once. Services without a name cannot be
    /// addressed from the command line and are skipped.
    ///
    /// # Errors
    ///
    /// Fails on the first endpoint that cannot be turned into a command; see
    /// [`build_tree`].
    pub fn from_services(infos: impl IntoIterator<Item = ServiceInfo>) -> Result<Self, BuildError> {
        let mut services = Vec::new();
        for info in merge_services(infos) {
            if info.name.trim().is_empty() {
                warn!(id = %info.id, "skipping service without a name");
                continue;
            }
            let tree = build_tree(&info)?;
            debug!(service = %tree.name, commands = tree.leaf_count(), "built command tree");
            services.push(tree);
        }
        Ok(Self { services })
    }

    pub fn services(&self) -> &[CommandNode] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&CommandNode> {
        self.services.iter().find(|service| service.name == name)
    }

    /// Finds a node by its full command path, service name first.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&CommandNode> {
        let (service, rest) = path.split_first()?;
        self.service(service.as_ref())?.find(rest)
    }

    pub fn build_clap(&self) -> ClapCommand {
        clap_builder::build_clap(self)
    }

    /// Follows the subcommands recorded in `matches` (parsed from
    /// [`CommandCatalog::build_clap`]) down to the selected node. Returns
    /// `None` when no service was selected.
    pub fn select<'a>(&'a self, matches: &'a ArgMatches) -> Option<Selection<'a>> {
        let (service, mut current) = matches.subcommand()?;
        let mut node = self.service(service)?;
        let mut path = vec![node.name.as_str()];

        while let Some((name, sub_matches)) = current.subcommand() {
            node = node.child(name)?;
            path.push(node.name.as_str());
            current = sub_matches;
        }

        Some(Selection {
            path,
            node,
            matches: current,
        })
    }
}
