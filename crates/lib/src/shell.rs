//! Command execution for actions.
//!
//! Actions drive external tools (most prominently `ninja` itself) through
//! these helpers. Every argv element is variable-expanded before the
//! process is spawned. A non-zero exit status is an error; there is no
//! retry, the user fixes the script and re-runs.

use std::fs;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::vars::{VarError, VarTable};

/// Errors raised while running commands or saving their output.
#[derive(Debug, Error)]
pub enum ShellError {
  /// An empty argv was passed.
  #[error("empty command")]
  Empty,

  /// The process could not be started.
  #[error("failed to spawn `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  /// The process exited with a non-zero status.
  #[error("command `{cmd}` exited with status {code:?}")]
  Failed { cmd: String, code: Option<i32> },

  /// A file could not be written.
  #[error("failed to write {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Var(#[from] VarError),
}

/// Run a command, inheriting stdio.
pub fn execute(vars: &VarTable, argv: &[&str]) -> Result<(), ShellError> {
  let (program, args, cmd_display) = expand_argv(vars, argv)?;
  info!(cmd = %cmd_display, "running command");

  let status = Command::new(&program)
    .args(&args)
    .status()
    .map_err(|source| ShellError::Spawn {
      cmd: cmd_display.clone(),
      source,
    })?;

  if !status.success() {
    return Err(ShellError::Failed {
      cmd: cmd_display,
      code: status.code(),
    });
  }
  Ok(())
}

/// Run a command and return its trimmed stdout.
pub fn execute_with_stdout(vars: &VarTable, argv: &[&str]) -> Result<String, ShellError> {
  let (program, args, cmd_display) = expand_argv(vars, argv)?;
  info!(cmd = %cmd_display, "running command");

  let output = Command::new(&program)
    .args(&args)
    .output()
    .map_err(|source| ShellError::Spawn {
      cmd: cmd_display.clone(),
      source,
    })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    return Err(ShellError::Failed {
      cmd: cmd_display,
      code: output.status.code(),
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Write string content to a variable-expanded path; returns that path.
pub fn save_content(vars: &VarTable, path: &str, content: &str) -> Result<String, ShellError> {
  let path = vars.expand_path(path)?;
  fs::write(&path, content).map_err(|source| ShellError::Io {
    path: path.clone(),
    source,
  })?;
  debug!(path = %path, bytes = content.len(), "saved content");
  Ok(path)
}

/// Join argv elements into one display string, quoting spaced elements.
pub fn join_command(args: &[String]) -> String {
  args
    .iter()
    .map(|arg| {
      if arg.contains(' ') {
        format!("\"{arg}\"")
      } else {
        arg.clone()
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

fn expand_argv(vars: &VarTable, argv: &[&str]) -> Result<(String, Vec<String>, String), ShellError> {
  let mut expanded = Vec::with_capacity(argv.len());
  for arg in argv {
    expanded.push(vars.expand(arg)?);
  }
  let Some((program, args)) = expanded.split_first() else {
    return Err(ShellError::Empty);
  };
  let display = join_command(&expanded);
  Ok((program.clone(), args.to_vec(), display))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn join_command_quotes_spaced_arguments() {
    let args = vec!["gcc".to_string(), "-DGREETING=hello world".to_string()];
    assert_eq!(join_command(&args), "gcc \"-DGREETING=hello world\"");
  }

  #[test]
  fn empty_argv_is_rejected() {
    let vars = VarTable::new();
    assert!(matches!(execute(&vars, &[]), Err(ShellError::Empty)));
  }

  #[test]
  fn save_content_expands_path() {
    let temp = TempDir::new().unwrap();
    let mut vars = VarTable::new();
    vars.set("out", temp.path().display().to_string());

    let written = save_content(&vars, "$out/result.txt", "payload").unwrap();

    assert!(written.ends_with("result.txt"));
    assert_eq!(fs::read_to_string(temp.path().join("result.txt")).unwrap(), "payload");
  }

  #[cfg(unix)]
  #[test]
  fn execute_reports_exit_code() {
    let vars = VarTable::new();
    let err = execute(&vars, &["sh", "-c", "exit 3"]).unwrap_err();
    assert!(matches!(err, ShellError::Failed { code: Some(3), .. }));
  }

  #[cfg(unix)]
  #[test]
  fn execute_succeeds_on_zero_status() {
    let vars = VarTable::new();
    execute(&vars, &["sh", "-c", "exit 0"]).unwrap();
  }

  #[cfg(unix)]
  #[test]
  fn stdout_is_captured_and_trimmed() {
    let vars = VarTable::new();
    let out = execute_with_stdout(&vars, &["sh", "-c", "echo hello"]).unwrap();
    assert_eq!(out, "hello");
  }

  #[cfg(unix)]
  #[test]
  fn arguments_are_variable_expanded() {
    let mut vars = VarTable::new();
    vars.set("msg", "expanded");
    let out = execute_with_stdout(&vars, &["echo", "$msg"]).unwrap();
    assert_eq!(out, "expanded");
  }

  #[test]
  fn missing_program_is_a_spawn_error() {
    let vars = VarTable::new();
    let err = execute(&vars, &["definitely-not-a-real-binary-0xff"]).unwrap_err();
    assert!(matches!(err, ShellError::Spawn { .. }));
  }
}
