//! Connection profile.
//!
//! Connection settings come from the command line, the environment and the
//! NATS CLI context files, in that order of precedence. Contexts live under
//! `$XDG_CONFIG_HOME/nats` (or `~/.config/nats`): `context.txt` names the
//! selected context and `context/<name>.json` holds its settings.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use clap::ArgMatches;
use dirs_next::home_dir;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_SERVER: &str = "nats://127.0.0.1:4222";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown context '{name}': {} does not exist", .path.display())]
    UnknownContext { name: String, path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid context file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Connection flags given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArgs {
    pub server: Option<String>,
    pub context: Option<String>,
    pub creds: Option<String>,
}

impl ConnectionArgs {
    /// Reads the global connection flags. Missing or undeclared flags read as
    /// absent.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let read = |id: &str| {
            matches
                .try_get_one::<String>(id)
                .ok()
                .flatten()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            server: read("server"),
            context: read("context"),
            creds: read("creds"),
        }
    }
}

/// Settings stored in a context file. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContextFile {
    pub description: String,
    pub url: String,
    pub user: String,
    pub password: String,
    pub token: String,
    pub creds: String,
}

/// Everything needed to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Name of the context the settings came from, if any.
    pub context: Option<String>,
    pub server: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub creds: Option<PathBuf>,
}

impl ConnectionProfile {
    pub fn load(args: &ConnectionArgs) -> Result<Self, ConfigError> {
        Self::load_from(&context_dir(), args)
    }

    /// Resolve the profile against the context directory `dir`.
    pub fn load_from(dir: &Path, args: &ConnectionArgs) -> Result<Self, ConfigError> {
        let context = selected_context(dir, args)?;
        let file = match &context {
            Some(name) => read_context(dir, name)?,
            None => ContextFile::default(),
        };

        let server = args
            .server
            .clone()
            .or_else(|| non_empty_var("NATS_URL"))
            .or_else(|| non_empty(&file.url))
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let creds = args
            .creds
            .clone()
            .or_else(|| non_empty_var("NATS_CREDS"))
            .or_else(|| non_empty(&file.creds))
            .map(|path| expand_tilde(&path));

        debug!(context = context.as_deref(), %server, "resolved connection profile");
        Ok(Self {
            context,
            server,
            user: non_empty(&file.user),
            password: non_empty(&file.password),
            token: non_empty(&file.token),
            creds,
        })
    }
}

/// Directory holding the NATS CLI contexts.
pub fn context_dir() -> PathBuf {
    if let Ok(path) = env::var("XDG_CONFIG_HOME")
        && !path.trim().is_empty()
    {
        return expand_tilde(&path).join("nats");
    }

    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("nats")
}

fn selected_context(dir: &Path, args: &ConnectionArgs) -> Result<Option<String>, ConfigError> {
    if let Some(name) = args.context.clone().or_else(|| non_empty_var("NATS_CONTEXT")) {
        return Ok(Some(name));
    }

    let path = dir.join("context.txt");
    match fs::read_to_string(&path) {
        Ok(content) => Ok(non_empty(&content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}

fn read_context(dir: &Path, name: &str) -> Result<ContextFile, ConfigError> {
    let path = dir.join("context").join(format!("{name}.json"));
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::UnknownContext {
                name: name.to_string(),
                path,
            });
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().as_deref().and_then(non_empty)
}

pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}
