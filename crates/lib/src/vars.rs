//! Variable tables and `$name` expression expansion.
//!
//! Build scripts configure commands, paths and glob patterns through
//! `$name` / `${name}` references that are resolved against a [`VarTable`].
//! Expansion is repeated until the expression settles, so a variable may
//! reference other variables.
//!
//! # Escaping
//!
//! `$$` produces a literal `$`. This is how ninja's own placeholders are
//! written through to the build description: a command fragment of
//! `$$in -o $$out` settles to `$in -o $out`.
//!
//! # Built-ins
//!
//! [`VarTable::with_builtins`] seeds the conventional variables a build
//! script expects: `root`, `target`, `build`, `option_hash`, `date`,
//! `time`, `timestamp`, `script`, and an `env_<name>` mirror of every
//! process environment variable.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

/// Maximum number of substitution passes before expansion is aborted.
const MAX_EXPAND_STEPS: usize = 16;

/// Errors that can occur while defining or expanding variables.
#[derive(Debug, Error)]
pub enum VarError {
  /// An expression referenced a variable that is not in the table.
  #[error("variable `{name}` is not defined (used in `{expr}`)")]
  Undefined { name: String, expr: String },

  /// Expansion kept producing new references.
  #[error("expansion of `{expr}` did not settle after {limit} steps")]
  DepthExceeded { expr: String, limit: usize },

  /// A name was defined twice.
  #[error("variable `{0}` is already defined")]
  Redefined(String),

  /// A `${` reference had no closing brace.
  #[error("unterminated `${{` reference in `{0}`")]
  Unterminated(String),
}

/// One piece of a scanned expression.
enum Segment {
  /// Literal text, emitted unchanged.
  Literal(String),
  /// A `$$` escape, kept as-is between passes and settled to `$` at the end.
  Escape,
  /// A `$name` or `${name}` reference.
  Reference(String),
}

/// A string-to-string variable table with settle-until-done expansion.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
  vars: BTreeMap<String, String>,
}

impl VarTable {
  /// Create an empty table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a table seeded with the conventional build-script variables.
  pub fn with_builtins() -> Self {
    let mut table = Self::new();
    let root = std::env::current_dir()
      .map(|dir| dir.display().to_string().replace('\\', "/"))
      .unwrap_or_else(|_| ".".to_string());
    let now = chrono::Local::now();

    table.set("root", root);
    table.set("target", "target");
    table.set("build", "target/build");
    table.set("option_hash", "unknown");
    table.set("date", now.format("%Y-%m-%d").to_string());
    table.set("time", now.format("%H:%M:%S").to_string());
    table.set("timestamp", now.timestamp().to_string());
    table.set("script", std::env::args().next().unwrap_or_default());

    // Mirror the process environment; first value wins on case collisions.
    for (name, value) in std::env::vars() {
      let key = format!("env_{}", name.to_lowercase());
      table.vars.entry(key).or_insert(value);
    }

    table
  }

  /// Look up a variable.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(name).map(String::as_str)
  }

  /// Insert or overwrite a variable.
  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.vars.insert(name.into(), value.into());
  }

  /// Insert a variable, failing if the name is already taken.
  pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), VarError> {
    let name = name.into();
    if self.vars.contains_key(&name) {
      return Err(VarError::Redefined(name));
    }
    debug!(name = %name, "defined variable");
    self.vars.insert(name, value.into());
    Ok(())
  }

  /// Expand every `$name` / `${name}` reference in `expr`.
  ///
  /// Substitution repeats until no references remain, at most
  /// [`MAX_EXPAND_STEPS`] passes. `$$` settles to a literal `$` and a lone
  /// `$` that starts no reference passes through unchanged.
  pub fn expand(&self, expr: &str) -> Result<String, VarError> {
    let mut current = expr.to_string();

    for _ in 0..MAX_EXPAND_STEPS {
      let segments = scan(&current, expr)?;

      if !segments.iter().any(|s| matches!(s, Segment::Reference(_))) {
        // Settled: collapse escapes and return.
        let mut settled = String::new();
        for segment in segments {
          match segment {
            Segment::Literal(text) => settled.push_str(&text),
            Segment::Escape => settled.push('$'),
            Segment::Reference(_) => {}
          }
        }
        return Ok(settled);
      }

      let mut next = String::new();
      for segment in segments {
        match segment {
          Segment::Literal(text) => next.push_str(&text),
          Segment::Escape => next.push_str("$$"),
          Segment::Reference(name) => {
            let value = self.vars.get(&name).ok_or_else(|| VarError::Undefined {
              name: name.clone(),
              expr: expr.to_string(),
            })?;
            next.push_str(value);
          }
        }
      }
      current = next;
    }

    Err(VarError::DepthExceeded {
      expr: expr.to_string(),
      limit: MAX_EXPAND_STEPS,
    })
  }

  /// Expand `expr` and lexically normalize the result as a path.
  pub fn expand_path(&self, expr: &str) -> Result<String, VarError> {
    Ok(normalize_path(&self.expand(expr)?))
  }
}

/// Scan one expansion pass worth of segments out of `current`.
///
/// `origin` is the expression as the caller wrote it, used for errors.
fn scan(current: &str, origin: &str) -> Result<Vec<Segment>, VarError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = current.chars().peekable();

  while let Some(ch) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some('$') => {
        chars.next();
        flush(&mut segments, &mut literal);
        segments.push(Segment::Escape);
      }
      Some('{') => {
        chars.next();
        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          name.push(c);
        }
        if !closed {
          return Err(VarError::Unterminated(origin.to_string()));
        }
        flush(&mut segments, &mut literal);
        segments.push(Segment::Reference(name));
      }
      Some(&c) if c.is_ascii_alphabetic() || c == '_' => {
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
          if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
          } else {
            break;
          }
        }
        flush(&mut segments, &mut literal);
        segments.push(Segment::Reference(name));
      }
      _ => literal.push('$'),
    }
  }

  flush(&mut segments, &mut literal);
  Ok(segments)
}

fn flush(segments: &mut Vec<Segment>, literal: &mut String) {
  if !literal.is_empty() {
    segments.push(Segment::Literal(std::mem::take(literal)));
  }
}

/// Lexically normalize a `/`-separated path: collapse `.` and empty
/// components and resolve `..` against preceding components.
fn normalize_path(path: &str) -> String {
  let path = path.replace('\\', "/");
  let absolute = path.starts_with('/');
  let mut parts: Vec<&str> = Vec::new();

  for part in path.split('/') {
    match part {
      "" | "." => {}
      ".." => match parts.last() {
        Some(&"..") | None => {
          if !absolute {
            parts.push("..");
          }
        }
        Some(_) => {
          parts.pop();
        }
      },
      _ => parts.push(part),
    }
  }

  let joined = parts.join("/");
  if absolute {
    format!("/{joined}")
  } else if joined.is_empty() {
    ".".to_string()
  } else {
    joined
  }
}
