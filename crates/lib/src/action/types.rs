use std::collections::BTreeMap;

use thiserror::Error;

use crate::vars::VarTable;

/// Errors raised during action registration and resolution.
#[derive(Debug, Error)]
pub enum ActionError {
  /// An action name was registered twice.
  #[error("action `{0}` is already registered")]
  Duplicate(String),

  /// More than one action carries the default flag.
  #[error("actions `{first}` and `{second}` are both marked default")]
  MultipleDefaults { first: String, second: String },

  /// A requested action name is not registered.
  #[error("unknown action `{0}`")]
  Unknown(String),

  /// An action declares a dependency on a name that is not registered.
  #[error("action `{action}` depends on unknown action `{dep}`")]
  UnknownDependency { action: String, dep: String },

  /// The dependency graph contains a cycle.
  #[error("dependency cycle involving action `{0}`")]
  Cycle(String),
}

/// Everything an action body receives when it runs.
pub struct Invocation<'a> {
  /// The settled script options (name to value).
  pub options: &'a BTreeMap<String, String>,
  /// This action's command-line argument values (name to value).
  pub args: &'a BTreeMap<String, String>,
  /// The variable table for this run.
  pub vars: &'a VarTable,
}

/// The callable behind an action.
pub type ActionFn = Box<dyn Fn(&Invocation<'_>) -> crate::Result<()>>;

/// How an action argument surfaces on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
  /// `--action-name VALUE`
  Value,
  /// `--action-name` (boolean flag; `"1"` when set, `"0"` otherwise)
  Flag,
  /// `--action-name V1 V2 ...` (values joined with spaces)
  List,
}

/// A declared per-action command-line argument.
#[derive(Debug, Clone)]
pub struct ActionArg {
  pub(crate) name: String,
  pub(crate) description: String,
  pub(crate) kind: ArgKind,
}

impl ActionArg {
  pub fn value(name: impl Into<String>) -> Self {
    Self::with_kind(name, ArgKind::Value)
  }

  pub fn flag(name: impl Into<String>) -> Self {
    Self::with_kind(name, ArgKind::Flag)
  }

  pub fn list(name: impl Into<String>) -> Self {
    Self::with_kind(name, ArgKind::List)
  }

  fn with_kind(name: impl Into<String>, kind: ArgKind) -> Self {
    Self {
      name: name.into(),
      description: String::new(),
      kind,
    }
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn kind(&self) -> ArgKind {
    self.kind
  }
}

/// A named, dependency-ordered entry point.
pub struct Action {
  pub(crate) name: String,
  pub(crate) description: String,
  pub(crate) deps: Vec<String>,
  pub(crate) default: bool,
  pub(crate) args: Vec<ActionArg>,
  pub(crate) run: ActionFn,
}

impl Action {
  /// Create an action from a name and its body.
  pub fn new(name: impl Into<String>, run: impl Fn(&Invocation<'_>) -> crate::Result<()> + 'static) -> Self {
    Self {
      name: name.into(),
      description: String::new(),
      deps: Vec::new(),
      default: false,
      args: Vec::new(),
      run: Box::new(run),
    }
  }

  /// Attach a description shown by `--list`.
  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  /// Declare dependencies, run before this action in the given order.
  pub fn depends_on<I, S>(mut self, deps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.deps.extend(deps.into_iter().map(Into::into));
    self
  }

  /// Mark this action as the default when none is requested.
  pub fn default(mut self) -> Self {
    self.default = true;
    self
  }

  /// Declare a per-action command-line argument.
  pub fn arg(mut self, arg: ActionArg) -> Self {
    self.args.push(arg);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn deps(&self) -> &[String] {
    &self.deps
  }

  pub fn is_default(&self) -> bool {
    self.default
  }

  pub fn args(&self) -> &[ActionArg] {
    &self.args
  }
}
