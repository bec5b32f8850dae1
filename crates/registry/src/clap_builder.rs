use clap::{Arg, ArgAction, Command as ClapCommand};
use microsh_types::{ParamKind, ParamValue, Parameter};

use crate::{CommandCatalog, CommandNode};

/// Flags accepted at every level of the command tree.
pub const GLOBAL_FLAGS: [&str; 4] = ["server", "context", "creds", "verbose"];

/// Builds a complete Clap command tree from the catalog's services.
///
/// Every discovered service becomes a subcommand of the root, and each
/// service's command tree is mirrored below it. Invocable nodes carry one
/// flag per endpoint parameter.
///
/// The generated command tree includes the global connection and logging
/// flags, which apply to all commands.
///
/// # Arguments
///
/// * `catalog` - The catalog containing the command tree of every service
///
/// # Returns
///
/// A configured ClapCommand that can be used for argument parsing and help
/// generation.
///
/// # Examples
///
/// ```rust
/// use microsh_registry::{CommandCatalog, build_clap};
///
/// let catalog = CommandCatalog::from_services(Vec::new()).unwrap();
/// let root = build_clap(&catalog);
/// assert_eq!(root.get_name(), "microsh");
/// ```
pub fn build_clap(catalog: &CommandCatalog) -> ClapCommand {
    catalog
        .services()
        .iter()
        .fold(create_root_command(), |root, service| root.subcommand(build_node_command(service)))
}

/// Creates the root command with global flags.
///
/// The root is also what the binary parses before discovery to find out how
/// to connect, so it must stay usable without any service subcommands.
///
/// - `--server` - Server URL to connect to
/// - `--context` - Connection context to use
/// - `--creds` - Credentials file
/// - `--verbose` - Enables verbose logging output
pub fn create_root_command() -> ClapCommand {
    ClapCommand::new("microsh")
        .about("Shell for the services available on a NATS system")
        .disable_help_subcommand(true)
        .arg(
            Arg::new("server")
                .long("server")
                .value_name("URL")
                .help("NATS server URL")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("NAME")
                .help("Connection context to use")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("creds")
                .long("creds")
                .value_name("FILE")
                .help("User credentials file")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .help("Verbose logging")
                .global(true)
                .action(ArgAction::SetTrue),
        )
}

/// Builds the command for one tree node and, recursively, its children.
///
/// Clap requires `'static` strings for names and help text. The tree is
/// built once per process, so the strings are leaked.
fn build_node_command(node: &CommandNode) -> ClapCommand {
    let mut command = ClapCommand::new(leak(&node.name)).disable_help_subcommand(true);
    if !node.summary.is_empty() {
        command = command.about(leak(&node.summary));
    }
    if !node.description.is_empty() {
        command = command.long_about(leak(&node.description));
    }

    if let Some(action) = &node.endpoint {
        command = action
            .parameters()
            .iter()
            .fold(command, |command, parameter| command.arg(build_parameter_argument(parameter)));
    }

    node.children
        .values()
        .fold(command, |command, child| command.subcommand(build_node_command(child)))
}

/// Builds a single flag argument for an endpoint parameter.
///
/// The value is parsed into a [`ParamValue`] of the parameter's kind while
/// the command line is parsed, so type errors are reported by clap. Boolean
/// flags may be given bare (`--force`) or with an explicit value
/// (`--force=false`). Numeric flags take negative values in either form
/// (`--offset -5`, `--offset=-5`). Flags are never marked required here; required
/// parameters are checked when the command runs.
///
/// # Arguments
///
/// * `parameter` - The parameter to expose as a flag
///
/// # Returns
///
/// A fully configured Clap Arg representing the parameter.
pub fn build_parameter_argument(parameter: &Parameter) -> Arg {
    let name = leak(parameter.name());
    let kind = parameter.kind();
    let mut arg = Arg::new(name)
        .long(name)
        .action(ArgAction::Set)
        .value_parser(move |raw: &str| ParamValue::parse(kind, raw));

    arg = match kind {
        ParamKind::Boolean => arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_name("BOOL"),
        ParamKind::Integer | ParamKind::Float => arg.allow_negative_numbers(true).value_name(value_name(kind)),
        other => arg.value_name(value_name(other)),
    };

    arg = add_default_value(arg, parameter);
    arg.help(generate_help_text(parameter))
}

fn value_name(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::String => "STRING",
        ParamKind::Integer => "INT",
        ParamKind::Float => "FLOAT",
        ParamKind::Boolean => "BOOL",
        ParamKind::Duration => "DURATION",
    }
}

/// Adds the parameter's default, rendered the way the value parser reads it
/// back, so clap shows it in help and applies it when the flag is absent.
fn add_default_value(arg: Arg, parameter: &Parameter) -> Arg {
    match parameter.default_value() {
        Some(default) => arg.default_value(leak(&default.to_string())),
        None => arg,
    }
}

fn generate_help_text(parameter: &Parameter) -> String {
    let text = match parameter.summary() {
        Some(summary) if !summary.is_empty() => summary.to_string(),
        _ => format!("type: {}", parameter.kind()),
    };
    if parameter.is_required() {
        format!("{text} (required)")
    } else {
        text
    }
}

fn leak(text: &str) -> &'static str {
    Box::leak(text.to_string().into_boxed_str())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use microsh_types::{EndpointInfo, Metadata, ParamOption, ServiceInfo, with_parameters, with_summary};

    use super::*;

    fn catalog() -> CommandCatalog {
        let lookup = Metadata::new([
            with_summary("Look up an order"),
            with_parameters([
                Parameter::new("id", ParamKind::String, [ParamOption::required(), ParamOption::summary("Order id")])
                    .unwrap(),
                Parameter::new(
                    "wait",
                    ParamKind::Duration,
                    [ParamOption::default_value(ParamValue::Duration(Duration::from_millis(1500)))],
                )
                .unwrap(),
            ]),
        ]);
        CommandCatalog::from_services([ServiceInfo {
            name: "orders".into(),
            description: "Order service".into(),
            endpoints: vec![
                EndpointInfo::new("orders.get", Some(lookup)),
                EndpointInfo::new("orders.items.list", None),
            ],
            ..Default::default()
        }])
        .unwrap()
    }

    #[test]
    fn mirrors_the_command_tree() {
        let root = build_clap(&catalog());
        root.clone().debug_assert();

        let orders = root.find_subcommand("orders").expect("service command");
        assert_eq!(orders.get_about().map(ToString::to_string).as_deref(), Some("Order service"));
        let get = orders.find_subcommand("get").expect("leaf command");
        assert_eq!(get.get_about().map(ToString::to_string).as_deref(), Some("Look up an order"));
        assert!(orders.find_subcommand("items").and_then(|items| items.find_subcommand("list")).is_some());
    }

    #[test]
    fn parameter_flags_are_typed_and_optional_for_clap() {
        let root = build_clap(&catalog());
        let get = root.find_subcommand("orders").and_then(|orders| orders.find_subcommand("get")).unwrap();

        let id = get.get_arguments().find(|arg| arg.get_id() == "id").expect("id flag");
        assert!(!id.is_required_set());
        assert!(id.get_help().map(ToString::to_string).unwrap_or_default().contains("(required)"));

        let wait = get.get_arguments().find(|arg| arg.get_id() == "wait").expect("wait flag");
        let defaults: Vec<_> = wait
            .get_default_values()
            .iter()
            .map(|value| value.to_string_lossy().into_owned())
            .collect();
        assert_eq!(defaults, ["1s 500ms"]);
    }

    #[test]
    fn defaults_parse_back_through_the_flag() {
        let matches = build_clap(&catalog())
            .try_get_matches_from(["microsh", "orders", "get", "--id", "42"])
            .unwrap();
        let (_, orders) = matches.subcommand().unwrap();
        let (_, get) = orders.subcommand().unwrap();
        assert_eq!(
            get.get_one::<ParamValue>("wait"),
            Some(&ParamValue::Duration(Duration::from_millis(1500)))
        );
    }

    #[test]
    fn global_flags_are_accepted_below_the_root() {
        let matches = build_clap(&catalog())
            .try_get_matches_from(["microsh", "orders", "get", "--server", "nats://demo:4222"])
            .unwrap();
        let (_, orders) = matches.subcommand().unwrap();
        let (_, get) = orders.subcommand().unwrap();
        assert_eq!(get.get_one::<String>("server").map(String::as_str), Some("nats://demo:4222"));
    }
}
