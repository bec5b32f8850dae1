//! Running an invocable command.

use std::{io::Write, time::Duration};

use clap::ArgMatches;
use microsh_engine::Aggregator;
use microsh_types::{ParamValue, Parameter};
use serde_json::{Map, Value};
use tracing::debug;

use crate::InvocationError;

/// How long a single invocation waits for replies.
pub const INVOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// The action behind an invocable command: the subject to request and the
/// parameters that make up the request body.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafAction {
    subject: String,
    parameters: Vec<Parameter>,
}

impl LeafAction {
    pub fn new(subject: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            subject: subject.into(),
            parameters,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Current value of `parameter`: what the user passed, its default, or
    /// the zero value of its kind.
    fn value_of(parameter: &Parameter, matches: &ArgMatches) -> ParamValue {
        matches
            .try_get_one::<ParamValue>(parameter.name())
            .ok()
            .flatten()
            .cloned()
            .unwrap_or_else(|| parameter.initial_value())
    }

    /// Assemble the request body from the parsed command line.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::MissingParameter`] for the first required
    /// parameter whose value is the zero value of its kind. Booleans are
    /// never missing.
    pub fn request_body(&self, matches: &ArgMatches) -> Result<Map<String, Value>, InvocationError> {
        let mut body = Map::new();
        for parameter in &self.parameters {
            let value = Self::value_of(parameter, matches);
            if parameter.is_required() && value.is_missing() {
                return Err(InvocationError::missing(parameter.name()));
            }
            body.insert(parameter.name().to_string(), value.to_json());
        }
        Ok(body)
    }

    /// Send the request and write every reply to `out`, one per line, in
    /// arrival order. Returns the number of replies.
    ///
    /// Nothing is published when a required parameter is missing.
    pub async fn invoke<W>(&self, aggregator: &Aggregator, matches: &ArgMatches, out: &mut W) -> Result<usize, InvocationError>
    where
        W: Write + Send,
    {
        let body = self.request_body(matches)?;
        debug!(subject = %self.subject, parameters = body.len(), "invoking endpoint");

        let mut write_error = None;
        let received = aggregator
            .request_with(body, &self.subject, 0, INVOCATION_TIMEOUT, |payload| {
                if write_error.is_none()
                    && let Err(err) = writeln!(out, "{}", String::from_utf8_lossy(&payload))
                {
                    write_error = Some(err);
                }
            })
            .await?;

        if let Some(err) = write_error {
            return Err(err.into());
        }
        out.flush()?;
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use clap::Command;
    use microsh_types::{ParamKind, ParamOption};

    use super::*;
    use crate::clap_builder::build_parameter_argument;

    fn parse(action: &LeafAction, args: &[&str]) -> ArgMatches {
        let command = action
            .parameters()
            .iter()
            .fold(Command::new("leaf"), |command, parameter| command.arg(build_parameter_argument(parameter)));
        command
            .try_get_matches_from(std::iter::once("leaf").chain(args.iter().copied()))
            .expect("valid command line")
    }

    fn action(parameters: Vec<Parameter>) -> LeafAction {
        LeafAction::new("svc.run", parameters)
    }

    #[test]
    fn body_uses_typed_values_and_defaults() {
        let action = action(vec![
            Parameter::new("name", ParamKind::String, []).unwrap(),
            Parameter::new("count", ParamKind::Integer, [ParamOption::default_value(ParamValue::Integer(3))]).unwrap(),
            Parameter::new("ratio", ParamKind::Float, []).unwrap(),
            Parameter::new("dry-run", ParamKind::Boolean, []).unwrap(),
            Parameter::new("wait", ParamKind::Duration, []).unwrap(),
        ]);
        let matches = parse(&action, &["--name", "widget", "--ratio", "0.5", "--dry-run", "--wait", "1m30s"]);

        let body = action.request_body(&matches).unwrap();
        assert_eq!(body["name"], "widget");
        assert_eq!(body["count"], 3);
        assert_eq!(body["ratio"], 0.5);
        assert_eq!(body["dry-run"], true);
        assert_eq!(body["wait"], Duration::from_secs(90).as_nanos() as u64);
    }

    #[test]
    fn boolean_accepts_explicit_values() {
        let action = action(vec![
            Parameter::new("force", ParamKind::Boolean, [ParamOption::default_value(ParamValue::Boolean(true))]).unwrap(),
        ]);
        assert_eq!(action.request_body(&parse(&action, &[])).unwrap()["force"], true);
        assert_eq!(action.request_body(&parse(&action, &["--force=false"])).unwrap()["force"], false);
    }

    #[test]
    fn required_zero_value_is_missing() {
        let action = action(vec![Parameter::new("id", ParamKind::String, [ParamOption::required()]).unwrap()]);
        let err = action.request_body(&parse(&action, &[])).unwrap_err();
        assert!(matches!(err, InvocationError::MissingParameter { ref name } if name == "id"));
        assert!(err.to_string().contains("parameter required"));

        let err = action.request_body(&parse(&action, &["--id", ""])).unwrap_err();
        assert!(matches!(err, InvocationError::MissingParameter { .. }));
    }

    #[test]
    fn required_boolean_is_never_missing() {
        let action = action(vec![Parameter::new("confirm", ParamKind::Boolean, [ParamOption::required()]).unwrap()]);
        assert_eq!(action.request_body(&parse(&action, &[])).unwrap()["confirm"], false);
    }

    #[test]
    fn numeric_flags_take_negative_values() {
        let action = action(vec![
            Parameter::new("offset", ParamKind::Integer, []).unwrap(),
            Parameter::new("delta", ParamKind::Float, []).unwrap(),
        ]);
        let body = action.request_body(&parse(&action, &["--offset", "-5", "--delta", "-0.5"])).unwrap();
        assert_eq!(body["offset"], -5);
        assert_eq!(body["delta"], -0.5);

        let body = action.request_body(&parse(&action, &["--offset=-7"])).unwrap();
        assert_eq!(body["offset"], -7);
    }

    #[test]
    fn typed_flags_reject_bad_input() {
        let action = action(vec![Parameter::new("count", ParamKind::Integer, []).unwrap()]);
        let command = Command::new("leaf").arg(build_parameter_argument(&action.parameters()[0]));
        assert!(command.try_get_matches_from(["leaf", "--count", "many"]).is_err());
    }
}
