//! The build-script front end.
//!
//! [`BuildScript`] ties the pieces together: declared options, user
//! variables, registered actions, and the command-line surface that
//! dispatches them. A user build script is a bin crate whose `main`
//! builds a `BuildScript` and calls [`BuildScript::run`].
//!
//! # Command line
//!
//! ```text
//! script [ACTION] [-D NAME[=VALUE]]... [-l] [-r] [-v] [--<action>-<arg> ...]
//! ```
//!
//! With no `ACTION` the registered default action runs. `-D` assignments
//! set declared script options (bare `NAME` means `1`); each registered
//! action additionally exposes its declared arguments as
//! `--<action>-<arg>` flags grouped per action in `--help`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::Instant;

use clap::{Arg, ArgAction, ArgMatches, Command};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::action::{Action, ActionError, ArgKind, Invocation, Registry, builtin};
use crate::output;
use crate::vars::{VarError, VarTable};

/// Length of the truncated option-table hash exposed as `$option_hash`.
const OPTION_HASH_LEN: usize = 8;

/// Errors raised by the front end itself.
#[derive(Debug, Error)]
pub enum ScriptError {
  #[error(transparent)]
  Action(#[from] ActionError),

  #[error(transparent)]
  Var(#[from] VarError),

  /// A `-D` assignment did not parse.
  #[error("cannot parse option assignment `{0}` (expected NAME or NAME=VALUE)")]
  MalformedOption(String),

  /// A `-D` assignment named an option the script never declared.
  #[error("option `{0}` is not declared")]
  UndeclaredOption(String),

  /// A script option was declared twice.
  #[error("option `{0}` is declared twice")]
  DuplicateOption(String),

  /// An option value was rejected by the option's validator.
  #[error("value `{value}` is not valid for option `{name}`")]
  InvalidOptionValue { name: String, value: String },

  /// No action named `ninja` is registered.
  #[error("no `ninja` action is registered; the script must define the action that generates the build description")]
  MissingGenerator,

  /// The command line did not parse.
  #[error("argument error: {0}")]
  Usage(#[from] clap::Error),
}

/// A declared script option, settable with `-D name=value`.
pub struct ScriptOption {
  name: String,
  default: String,
  description: String,
  validate: Option<Box<dyn Fn(&str) -> bool>>,
}

impl ScriptOption {
  pub fn new(name: impl Into<String>, default: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      default: default.into(),
      description: String::new(),
      validate: None,
    }
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  /// Attach a validator; rejected values fail the run.
  pub fn validate(mut self, validate: impl Fn(&str) -> bool + 'static) -> Self {
    self.validate = Some(Box::new(validate));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

/// The build-script builder and dispatcher.
pub struct BuildScript {
  description: String,
  variables: Vec<(String, String)>,
  options: Vec<ScriptOption>,
  pending: Vec<Action>,
}

impl BuildScript {
  /// Start a build script with the given description.
  ///
  /// The `release` option and the built-in `build`, `clean` and `compdb`
  /// actions are always present.
  pub fn new(description: impl Into<String>) -> Self {
    Self {
      description: description.into(),
      variables: Vec::new(),
      options: vec![
        ScriptOption::new("release", "0")
          .describe("Use the release profile")
          .validate(|value| matches!(value, "0" | "1")),
      ],
      pending: Vec::new(),
    }
  }

  /// Define a script variable, available as `$name` in expansions.
  pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.variables.push((name.into(), value.into()));
    self
  }

  /// Declare a script option.
  pub fn option(mut self, option: ScriptOption) -> Self {
    self.options.push(option);
    self
  }

  /// Register an action.
  pub fn action(mut self, action: Action) -> Self {
    self.pending.push(action);
    self
  }

  /// Parse the process command line and dispatch.
  pub fn run(self) -> crate::Result<()> {
    self.dispatch(std::env::args_os())
  }

  /// Like [`BuildScript::run`] with an explicit argument list.
  pub fn run_from<I, T>(self, args: I) -> crate::Result<()>
  where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
  {
    self.dispatch(args)
  }

  fn dispatch<I, T>(self, args: I) -> crate::Result<()>
  where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
  {
    for (position, option) in self.options.iter().enumerate() {
      if self.options[..position].iter().any(|other| other.name == option.name) {
        return Err(ScriptError::DuplicateOption(option.name.clone()).into());
      }
    }

    let mut registry = Registry::new();
    registry.register(builtin::build())?;
    registry.register(builtin::clean())?;
    registry.register(builtin::compdb())?;
    for action in self.pending {
      registry.register(action)?;
    }

    let command = build_command(&self.description, &registry);
    let matches = match command.try_get_matches_from(args) {
      Ok(matches) => matches,
      Err(error)
        if matches!(
          error.kind(),
          clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
        ) =>
      {
        let _ = error.print();
        return Ok(());
      }
      Err(error) => return Err(ScriptError::Usage(error).into()),
    };

    let filter = if matches.get_flag("verbose") {
      EnvFilter::new("debug")
    } else {
      EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).without_time().try_init();

    if matches.get_flag("list") {
      print_catalog(&registry, &self.options);
      return Ok(());
    }

    // Settle the option table: defaults, then -r, then -D assignments.
    let mut options: BTreeMap<String, String> = self
      .options
      .iter()
      .map(|option| (option.name.clone(), option.default.clone()))
      .collect();
    if matches.get_flag("release") {
      options.insert("release".to_string(), "1".to_string());
    }
    if let Some(assignments) = matches.get_many::<String>("option") {
      for assignment in assignments {
        let (name, value) = parse_assignment(assignment)?;
        let Some(declared) = self.options.iter().find(|option| option.name == name) else {
          return Err(ScriptError::UndeclaredOption(name).into());
        };
        if let Some(validate) = &declared.validate
          && !validate(&value)
        {
          return Err(ScriptError::InvalidOptionValue { name, value }.into());
        }
        options.insert(name, value);
      }
    }

    let mut vars = VarTable::with_builtins();
    for (name, value) in &self.variables {
      vars.define(name.as_str(), value.as_str())?;
    }
    vars.set("option_hash", option_hash(&options));
    debug!(option_hash = %vars.get("option_hash").unwrap_or_default(), "settled options");

    if !registry.contains(builtin::GENERATOR_ACTION) {
      return Err(ScriptError::MissingGenerator.into());
    }

    let requested = matches.get_one::<String>("action").map(String::as_str);
    let chain = registry.resolve(requested)?;
    if chain.is_empty() {
      output::print_warning("no action requested and no default action is registered");
      return Ok(());
    }

    let started = Instant::now();
    for action in chain {
      let args_table = collect_action_args(&matches, action);
      output::print_info(&format!("run {}", action.name()));

      let action_started = Instant::now();
      let invocation = Invocation {
        options: &options,
        args: &args_table,
        vars: &vars,
      };
      (action.run)(&invocation)?;
      debug!(
        action = %action.name(),
        elapsed = %output::format_duration(action_started.elapsed()),
        "action finished"
      );
    }
    output::print_success(&format!("done in {}", output::format_duration(started.elapsed())));

    Ok(())
  }
}

/// Assemble the clap command from the fixed surface plus one argument
/// per declared action argument.
fn build_command(description: &str, registry: &Registry) -> Command {
  let mut command = Command::new("build-script")
    .about(description.to_string())
    .version(env!("CARGO_PKG_VERSION"))
    .arg(
      Arg::new("action")
        .value_name("ACTION")
        .help("Action to run (defaults to the registered default action)"),
    )
    .arg(
      Arg::new("option")
        .short('D')
        .long("option")
        .value_name("NAME[=VALUE]")
        .action(ArgAction::Append)
        .help("Set a declared script option"),
    )
    .arg(
      Arg::new("list")
        .short('l')
        .long("list")
        .action(ArgAction::SetTrue)
        .help("List available actions and options"),
    )
    .arg(
      Arg::new("release")
        .short('r')
        .long("release")
        .action(ArgAction::SetTrue)
        .help("Use the release profile"),
    )
    .arg(
      Arg::new("verbose")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Enable verbose logging"),
    );

  for action in registry.actions() {
    for arg in action.args() {
      let id = action_arg_id(action.name(), arg.name());
      let cli_arg = Arg::new(id.clone())
        .long(id)
        .help(arg.description().to_string())
        .help_heading(format!("{} options", action.name()));
      let cli_arg = match arg.kind() {
        ArgKind::Flag => cli_arg.action(ArgAction::SetTrue),
        ArgKind::List => cli_arg.action(ArgAction::Append).value_name("VALUE").num_args(1..),
        ArgKind::Value => cli_arg.action(ArgAction::Set).value_name("VALUE"),
      };
      command = command.arg(cli_arg);
    }
  }

  command
}

fn action_arg_id(action: &str, arg: &str) -> String {
  format!("{action}-{arg}").replace('_', "-")
}

/// Collect one action's argument values out of the parsed matches.
fn collect_action_args(matches: &ArgMatches, action: &Action) -> BTreeMap<String, String> {
  let mut table = BTreeMap::new();
  for arg in action.args() {
    let id = action_arg_id(action.name(), arg.name());
    let value = match arg.kind() {
      ArgKind::Flag => {
        if matches.get_flag(&id) {
          "1".to_string()
        } else {
          "0".to_string()
        }
      }
      ArgKind::List => matches
        .get_many::<String>(&id)
        .map(|values| values.cloned().collect::<Vec<_>>().join(" "))
        .unwrap_or_default(),
      ArgKind::Value => matches.get_one::<String>(&id).cloned().unwrap_or_default(),
    };
    table.insert(arg.name().to_string(), value);
  }
  table
}

/// Parse a `-D` assignment: `NAME` means `NAME=1`.
fn parse_assignment(assignment: &str) -> Result<(String, String), ScriptError> {
  let parts: Vec<&str> = assignment.split('=').collect();
  match parts.as_slice() {
    [name] if !name.is_empty() => Ok(((*name).to_string(), "1".to_string())),
    [name, value] if !name.is_empty() => Ok(((*name).to_string(), (*value).to_string())),
    _ => Err(ScriptError::MalformedOption(assignment.to_string())),
  }
}

/// Truncated hash of the settled option table, exposed as `$option_hash`.
fn option_hash(options: &BTreeMap<String, String>) -> String {
  let mut hasher = Sha256::new();
  for (name, value) in options {
    hasher.update(format!("{name}={value},").as_bytes());
  }
  let digest = format!("{:x}", hasher.finalize());
  digest[..OPTION_HASH_LEN].to_string()
}

fn print_catalog(registry: &Registry, options: &[ScriptOption]) {
  output::print_info("actions:");
  for action in registry.actions() {
    let marker = if action.is_default() { " (default)" } else { "" };
    output::print_stat(&format!("{}{marker}", action.name()), action.description());
  }
  output::print_info("options:");
  for option in options {
    output::print_stat(&option.name, &format!("{} [default: {}]", option.description, option.default));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bare_assignment_means_one() {
    assert_eq!(parse_assignment("verbose").unwrap(), ("verbose".into(), "1".into()));
  }

  #[test]
  fn assignment_splits_name_and_value() {
    assert_eq!(parse_assignment("opt_level=3").unwrap(), ("opt_level".into(), "3".into()));
  }

  #[test]
  fn double_equals_is_malformed() {
    assert!(matches!(parse_assignment("a=b=c"), Err(ScriptError::MalformedOption(_))));
    assert!(matches!(parse_assignment(""), Err(ScriptError::MalformedOption(_))));
  }

  #[test]
  fn option_hash_is_deterministic_and_value_sensitive() {
    let mut options = BTreeMap::new();
    options.insert("release".to_string(), "0".to_string());
    let first = option_hash(&options);
    assert_eq!(first.len(), OPTION_HASH_LEN);
    assert_eq!(first, option_hash(&options));

    options.insert("release".to_string(), "1".to_string());
    assert_ne!(first, option_hash(&options));
  }

  #[test]
  fn action_arg_ids_use_dashes() {
    assert_eq!(action_arg_id("package", "skip_tests"), "package-skip-tests");
  }
}
