use std::{env, io, process::ExitCode, sync::Arc};

use anyhow::{Context, Result, bail};
use async_nats::ConnectOptions;
use clap::{ArgMatches, Command as ClapCommand};
use microsh_engine::{Aggregator, NatsBus};
use microsh_registry::{create_root_command, discover_catalog};
use tracing::debug;

mod config;

use config::{ConnectionArgs, ConnectionProfile};

const CLIENT_NAME: &str = "microsh";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Connection and logging flags are needed before the command tree exists.
    let early = read_early_flags();
    init_tracing(early.try_get_one::<bool>("verbose").ok().flatten().copied().unwrap_or(false));
    let connection = ConnectionArgs::from_matches(&early);

    let profile = ConnectionProfile::load(&connection).context("failed to load connection profile")?;
    let client = connect(&profile).await?;
    let aggregator = Aggregator::new(Arc::new(NatsBus::new(client)));

    let catalog = discover_catalog(&aggregator).await?;
    let mut cli = catalog.build_clap();
    let matches = cli
        .try_get_matches_from_mut(env::args_os())
        .unwrap_or_else(|err| err.exit());

    let Some(selection) = catalog.select(&matches) else {
        cli.print_help()?;
        return Ok(ExitCode::SUCCESS);
    };
    if ConnectionArgs::from_matches(selection.matches) != connection {
        bail!("connection flags (--server, --context, --creds) must be given before the service name");
    }

    let Some(action) = selection.action() else {
        command_at(&cli, &selection.path).print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match action.invoke(&aggregator, selection.matches, &mut io::stdout()).await {
        Ok(received) => {
            debug!(subject = action.subject(), received, "command finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Parse just the global flags, leaving everything from the service name on
/// to the full command tree.
fn read_early_flags() -> ArgMatches {
    create_root_command()
        .allow_external_subcommands(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .ignore_errors(true)
        .try_get_matches_from(env::args_os())
        .unwrap_or_default()
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| default_level.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

async fn connect(profile: &ConnectionProfile) -> Result<async_nats::Client> {
    let mut options = match &profile.creds {
        Some(path) => ConnectOptions::with_credentials_file(path.clone())
            .await
            .with_context(|| format!("failed to load credentials from {}", path.display()))?,
        None => ConnectOptions::new(),
    };
    options = options.name(CLIENT_NAME);
    if let Some(token) = &profile.token {
        options = options.token(token.clone());
    }
    if let (Some(user), Some(password)) = (&profile.user, &profile.password) {
        options = options.user_and_password(user.clone(), password.clone());
    }

    debug!(server = %profile.server, context = profile.context.as_deref(), "connecting");
    options
        .connect(profile.server.as_str())
        .await
        .with_context(|| format!("failed to connect to {}", profile.server))
}

/// The (built) subcommand reached by following `path` from the root.
fn command_at(cli: &ClapCommand, path: &[&str]) -> ClapCommand {
    path.iter().fold(cli.clone(), |command, name| {
        command.find_subcommand(name).cloned().unwrap_or(command)
    })
}
