//! Build-description accumulation and serialization.
//!
//! A [`Generator`] collects rule definitions, build edges and default
//! targets while a build script runs, then serializes them as a ninja
//! build description. Stages never write text themselves; they mutate the
//! accumulator through [`Generator::add_rule`] and [`Generator::add_build`]
//! and the generator owns ordering and de-duplication.
//!
//! Serialization happens exactly once, at the end of a
//! [`Generator::scoped`] block. On the error path nothing is written: the
//! artifact on disk is either a complete description or absent.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while accumulating or writing a description.
#[derive(Debug, Error)]
pub enum GeneratorError {
  /// A rule name was registered twice with differing definitions.
  #[error("rule `{0}` is already registered with a different definition")]
  DuplicateRule(String),

  /// A build edge referenced a rule that was never registered.
  #[error("build for `{output}` references unknown rule `{rule}`")]
  UnknownRule { rule: String, output: String },

  /// The description could not be written to disk.
  #[error("failed to write build description to {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// A named rule definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
  pub name: String,
  pub command: String,
  pub description: String,
  pub depfile: String,
}

impl Rule {
  /// Create a rule with the given name and command template.
  pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      command: command.into(),
      description: String::new(),
      depfile: String::new(),
    }
  }

  /// Attach a human-readable description shown by the build tool.
  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  /// Attach a dependency-file path template.
  pub fn with_depfile(mut self, depfile: impl Into<String>) -> Self {
    self.depfile = depfile.into();
    self
  }
}

/// One build statement: a rule applied to inputs, producing an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEdge {
  pub rule: String,
  pub output: String,
  pub inputs: Vec<String>,
  pub order_deps: Vec<String>,
}

impl BuildEdge {
  /// Create a build edge with no order-only dependencies.
  pub fn new(rule: impl Into<String>, output: impl Into<String>, inputs: Vec<String>) -> Self {
    Self {
      rule: rule.into(),
      output: output.into(),
      inputs,
      order_deps: Vec::new(),
    }
  }

  /// Attach order-only dependencies (rendered after `||`).
  pub fn with_order_deps(mut self, order_deps: Vec<String>) -> Self {
    self.order_deps = order_deps;
    self
  }
}

/// The build-description accumulator.
pub struct Generator {
  path: PathBuf,
  rules: Vec<Rule>,
  rule_index: HashMap<String, usize>,
  builds: Vec<BuildEdge>,
  defaults: Vec<String>,
}

impl Generator {
  /// Create an empty accumulator that will serialize to `path`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      rules: Vec::new(),
      rule_index: HashMap::new(),
      builds: Vec::new(),
      defaults: Vec::new(),
    }
  }

  /// Run `body` against a fresh accumulator and serialize on success.
  ///
  /// This is the scoped acquisition entry point: the accumulator exists
  /// only inside the closure, and the artifact is written exactly once
  /// when the closure returns `Ok`. If the closure fails, nothing is
  /// written, so a partially constructed description never reaches disk.
  pub fn scoped<T, E>(path: impl Into<PathBuf>, body: impl FnOnce(&mut Generator) -> Result<T, E>) -> Result<T, E>
  where
    E: From<GeneratorError>,
  {
    let mut generator = Generator::new(path);
    let value = body(&mut generator)?;
    generator.write()?;
    Ok(value)
  }

  /// Register a rule definition.
  ///
  /// Registering the same definition again is a no-op, which makes stage
  /// rule emission idempotent. Registering a different definition under
  /// an existing name fails.
  pub fn add_rule(&mut self, rule: Rule) -> Result<(), GeneratorError> {
    if let Some(&index) = self.rule_index.get(&rule.name) {
      if self.rules[index] == rule {
        return Ok(());
      }
      return Err(GeneratorError::DuplicateRule(rule.name));
    }
    debug!(rule = %rule.name, "registered rule");
    self.rule_index.insert(rule.name.clone(), self.rules.len());
    self.rules.push(rule);
    Ok(())
  }

  /// Append a build edge. The referenced rule must already be registered.
  pub fn add_build(&mut self, edge: BuildEdge) -> Result<(), GeneratorError> {
    if !self.rule_index.contains_key(&edge.rule) {
      return Err(GeneratorError::UnknownRule {
        rule: edge.rule,
        output: edge.output,
      });
    }
    self.builds.push(edge);
    Ok(())
  }

  /// Append one default target.
  pub fn add_default(&mut self, path: impl Into<String>) {
    self.defaults.push(path.into());
  }

  /// Append default targets, preserving order. Duplicates are allowed.
  pub fn add_defaults(&mut self, paths: impl IntoIterator<Item = String>) {
    self.defaults.extend(paths);
  }

  /// True if a rule with this name is registered.
  pub fn has_rule(&self, name: &str) -> bool {
    self.rule_index.contains_key(name)
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  pub fn builds(&self) -> &[BuildEdge] {
    &self.builds
  }

  pub fn defaults(&self) -> &[String] {
    &self.defaults
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Render the accumulated description as ninja syntax.
  pub fn render(&self) -> String {
    let mut text = String::new();
    text.push_str(&format!(
      "# Generated by ninjagen at {}\n",
      Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    text.push_str("# Do not edit; re-run the build script to regenerate.\n");

    for rule in &self.rules {
      text.push('\n');
      text.push_str(&format!("rule {}\n", rule.name));
      text.push_str(&format!("    command = {}\n", rule.command));
      if !rule.description.is_empty() {
        text.push_str(&format!("    description = {}\n", rule.description));
      }
      if !rule.depfile.is_empty() {
        text.push_str(&format!("    depfile = {}\n", rule.depfile));
      }
    }

    if !self.builds.is_empty() {
      text.push('\n');
    }
    for edge in &self.builds {
      let mut line = format!("build {}: {}", edge.output, edge.rule);
      for input in &edge.inputs {
        line.push(' ');
        line.push_str(input);
      }
      if !edge.order_deps.is_empty() {
        line.push_str(" ||");
        for dep in &edge.order_deps {
          line.push(' ');
          line.push_str(dep);
        }
      }
      text.push_str(&line);
      text.push('\n');
    }

    text.push('\n');
    text.push_str(&format!("# {} build statement(s) generated\n", self.builds.len()));
    if !self.defaults.is_empty() {
      text.push_str(&format!("default {}\n", self.defaults.join(" ")));
    }

    text
  }

  /// Serialize the description to the configured path.
  pub fn write(&self) -> Result<(), GeneratorError> {
    let text = self.render();
    fs::write(&self.path, text).map_err(|source| GeneratorError::Write {
      path: self.path.clone(),
      source,
    })?;
    info!(
      path = %self.path.display(),
      rules = self.rules.len(),
      builds = self.builds.len(),
      "wrote build description"
    );
    Ok(())
  }
}
