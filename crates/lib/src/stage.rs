//! The stage contract: named transformations over file groups.
//!
//! A stage declares which input shapes it accepts, registers exactly one
//! rule in the [`Generator`], and maps each concrete input group to one
//! output path. Stages never talk to the build description directly;
//! they go through [`Generator::add_rule`] / [`Generator::add_build`],
//! which own ordering and de-duplication.
//!
//! Two variants ship with the crate: [`CommandStage`] for ordinary
//! command rules and [`UnitStage`], the pass-through identity used to
//! keep a group unchanged in one branch of a fan-out. Build scripts are
//! expected to implement [`Stage`] themselves for anything more exotic
//! (linking, archiving, code generation).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::generator::{BuildEdge, Generator, GeneratorError, Rule};
use crate::shell::join_command;
use crate::vars::{VarError, VarTable};

/// Errors raised by stage configuration and build emission.
#[derive(Debug, Error)]
pub enum StageError {
  /// An option key was set that the stage never declared.
  #[error("stage `{stage}` does not recognize option `{key}`")]
  UnrecognizedOption { stage: String, key: String },

  /// The input group had the wrong number of paths for this stage.
  #[error("stage `{stage}` expected {expected} input path(s), got {actual}")]
  InvalidArity {
    stage: String,
    expected: &'static str,
    actual: usize,
  },

  #[error(transparent)]
  Generator(#[from] GeneratorError),

  #[error(transparent)]
  Var(#[from] VarError),
}

/// The shape tag carried by every file group.
///
/// Tags are derived from file extensions: `main.c` is `Ext("c")`. Paths
/// without an extension, and groups folded from mixed extensions, are
/// `Untyped` and can only flow into stages that accept [`TypeTag::Any`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
  /// Accepts every group, including untyped ones.
  Any,
  /// A lowercased file extension.
  Ext(String),
  /// No extension, or a mix of extensions after folding.
  Untyped,
}

impl TypeTag {
  /// Derive the tag for a path from its extension.
  pub fn of_path(path: &str) -> TypeTag {
    Path::new(path)
      .extension()
      .and_then(|ext| ext.to_str())
      .filter(|ext| !ext.is_empty())
      .map(|ext| TypeTag::Ext(ext.to_ascii_lowercase()))
      .unwrap_or(TypeTag::Untyped)
  }
}

impl fmt::Display for TypeTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypeTag::Any => write!(f, "any"),
      TypeTag::Ext(ext) => write!(f, "{ext}"),
      TypeTag::Untyped => write!(f, "untyped"),
    }
  }
}

/// A named, configurable transformation unit.
pub trait Stage {
  /// The stage name, used as the downstream rule name.
  fn name(&self) -> &str;

  /// The input shapes this stage accepts.
  fn input_types(&self) -> Vec<TypeTag>;

  /// Emit this stage's rule definition into the generator.
  ///
  /// Called once per stage argument per `apply`; emitting the same
  /// definition again is a no-op at the generator, and emitting a
  /// different definition under the same name is a contract violation.
  fn generate_rule(&self, ninja: &mut Generator) -> Result<(), StageError>;

  /// Emit one build edge for a concrete input group and return the
  /// output path.
  ///
  /// The output must be a pure function of the input group and the
  /// stage's option values.
  fn generate_build(&self, ninja: &mut Generator, inputs: &[String]) -> Result<String, StageError>;

  /// Produce a detached copy carrying the same option values.
  fn inherit(&self) -> Box<dyn Stage>;

  /// Whether a group with this tag may flow into the stage.
  fn accepts(&self, tag: &TypeTag) -> bool {
    let accepted = self.input_types();
    if accepted.iter().any(|t| matches!(t, TypeTag::Any)) {
      return true;
    }
    !matches!(tag, TypeTag::Untyped) && accepted.contains(tag)
  }
}

/// A declared-keys option bag shared by stage variants.
///
/// Keys are declared with defaults when the stage is constructed; setting
/// anything else is rejected at that point rather than at use time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOptions {
  values: BTreeMap<String, String>,
}

impl StageOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare a recognized key with its default value.
  pub fn declare(mut self, key: &str, default: &str) -> Self {
    self.values.insert(key.to_string(), default.to_string());
    self
  }

  /// Set a declared key. Returns `false` if the key was never declared.
  pub fn try_set(&mut self, key: &str, value: impl Into<String>) -> bool {
    match self.values.get_mut(key) {
      Some(slot) => {
        *slot = value.into();
        true
      }
      None => false,
    }
  }

  /// Read a declared key; undeclared keys read as empty.
  pub fn get(&self, key: &str) -> &str {
    self.values.get(key).map(String::as_str).unwrap_or("")
  }
}

/// The identity stage: passes a one-path group through unchanged.
///
/// `generate_rule` and `generate_build` perform no generator mutation,
/// which makes transform and pass-through branches uniform in a
/// multi-stage `apply`.
#[derive(Debug, Clone)]
pub struct UnitStage {
  name: String,
}

impl UnitStage {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

impl Default for UnitStage {
  fn default() -> Self {
    Self::new("unit")
  }
}

impl Stage for UnitStage {
  fn name(&self) -> &str {
    &self.name
  }

  fn input_types(&self) -> Vec<TypeTag> {
    vec![TypeTag::Any]
  }

  fn generate_rule(&self, _ninja: &mut Generator) -> Result<(), StageError> {
    Ok(())
  }

  fn generate_build(&self, _ninja: &mut Generator, inputs: &[String]) -> Result<String, StageError> {
    if inputs.len() != 1 {
      return Err(StageError::InvalidArity {
        stage: self.name.clone(),
        expected: "exactly 1",
        actual: inputs.len(),
      });
    }
    Ok(inputs[0].clone())
  }

  fn inherit(&self) -> Box<dyn Stage> {
    Box::new(self.clone())
  }
}

/// A general-purpose command stage.
///
/// Command fragments are expanded through the variable table when the
/// stage is constructed and joined with shell quoting; write ninja's own
/// placeholders as `$$in` / `$$out` so they survive expansion.
///
/// Declared options: `description`, `depfile`, `out_dir`, `out_suffix`.
/// The output path for a group is its first input (relocated under
/// `out_dir` when set) with `out_suffix` appended.
#[derive(Debug, Clone)]
pub struct CommandStage {
  name: String,
  command: String,
  accepted: Vec<TypeTag>,
  options: StageOptions,
  vars: VarTable,
}

impl CommandStage {
  /// Build a command stage from variable-expanded fragments.
  pub fn new(vars: &VarTable, name: impl Into<String>, fragments: &[&str]) -> Result<Self, StageError> {
    let mut expanded = Vec::with_capacity(fragments.len());
    for fragment in fragments {
      expanded.push(vars.expand(fragment)?);
    }
    Ok(Self {
      name: name.into(),
      command: join_command(&expanded),
      accepted: vec![TypeTag::Any],
      options: StageOptions::new()
        .declare("description", "")
        .declare("depfile", "")
        .declare("out_dir", "")
        .declare("out_suffix", ".out"),
      vars: vars.clone(),
    })
  }

  /// Narrow the accepted input types.
  pub fn accept(mut self, types: impl IntoIterator<Item = TypeTag>) -> Self {
    self.accepted = types.into_iter().collect();
    self
  }

  /// Set a declared option; the value is variable-expanded.
  pub fn set(&mut self, key: &str, value: &str) -> Result<&mut Self, StageError> {
    let value = self.vars.expand(value)?;
    if !self.options.try_set(key, value) {
      return Err(StageError::UnrecognizedOption {
        stage: self.name.clone(),
        key: key.to_string(),
      });
    }
    Ok(self)
  }

  /// Chainable [`CommandStage::set`].
  pub fn with(mut self, key: &str, value: &str) -> Result<Self, StageError> {
    self.set(key, value)?;
    Ok(self)
  }

  fn output_for(&self, first: &str) -> String {
    let suffix = self.options.get("out_suffix");
    let out_dir = self.options.get("out_dir");
    if out_dir.is_empty() {
      return format!("{first}{suffix}");
    }
    let base = Path::new(first)
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| first.to_string());
    format!("{}/{base}{suffix}", out_dir.trim_end_matches('/'))
  }
}

impl Stage for CommandStage {
  fn name(&self) -> &str {
    &self.name
  }

  fn input_types(&self) -> Vec<TypeTag> {
    self.accepted.clone()
  }

  fn generate_rule(&self, ninja: &mut Generator) -> Result<(), StageError> {
    let mut rule = Rule::new(&self.name, &self.command);
    let description = self.options.get("description");
    if !description.is_empty() {
      rule = rule.with_description(description);
    }
    let depfile = self.options.get("depfile");
    if !depfile.is_empty() {
      rule = rule.with_depfile(depfile);
    }
    ninja.add_rule(rule)?;
    Ok(())
  }

  fn generate_build(&self, ninja: &mut Generator, inputs: &[String]) -> Result<String, StageError> {
    let Some(first) = inputs.first() else {
      return Err(StageError::InvalidArity {
        stage: self.name.clone(),
        expected: "at least 1",
        actual: 0,
      });
    };
    let output = self.output_for(first);
    ninja.add_build(BuildEdge::new(&self.name, &output, inputs.to_vec()))?;
    Ok(output)
  }

  fn inherit(&self) -> Box<dyn Stage> {
    Box::new(self.clone())
  }
}
