//! Built-in actions: driving the build tool over the generated description.
//!
//! Every build script gets `build`, `clean` and `compdb` for free. All
//! three depend on a script-supplied action named [`GENERATOR_ACTION`],
//! the one that actually writes the build description. The dispatcher
//! refuses to run without it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action::Action;
use crate::shell;

/// Name of the script-supplied action that generates the build description.
pub const GENERATOR_ACTION: &str = "ninja";

/// Output extensions a compilation-database entry must produce.
const OBJECT_EXTENSIONS: &[&str] = &["o", "obj"];

/// Source extensions worth keeping in the compilation database.
const SOURCE_EXTENSIONS: &[&str] = &["c", "h", "s", "asm", "cc", "hpp", "cpp", "ixx", "cxx"];

/// `-fno-*` flags clangd understands; everything else in that family is
/// stripped from the recorded commands.
const KEPT_FEATURE_FLAGS: &[&str] = &["-fno-exceptions", "-fno-rtti"];

/// Run `ninja` over the generated description.
pub fn build() -> Action {
  Action::new("build", |invocation| {
    shell::execute(invocation.vars, &["ninja"])?;
    Ok(())
  })
  .describe("Run `ninja` over the generated build description")
  .depends_on([GENERATOR_ACTION])
}

/// Run `ninja -t clean`.
pub fn clean() -> Action {
  Action::new("clean", |invocation| {
    shell::execute(invocation.vars, &["ninja", "-t", "clean"])?;
    Ok(())
  })
  .describe("Run `ninja -t clean`")
  .depends_on([GENERATOR_ACTION])
}

/// Export a clangd-friendly `compile_commands.json`.
pub fn compdb() -> Action {
  Action::new("compdb", |invocation| {
    let raw = shell::execute_with_stdout(invocation.vars, &["ninja", "-t", "compdb"])?;
    let simplified = simplify_compdb(&raw)?;
    let path = shell::save_content(invocation.vars, "compile_commands.json", &simplified)?;
    info!(path = %path, "wrote compilation database");
    Ok(())
  })
  .describe("Export compile_commands.json via `ninja -t compdb`")
  .depends_on([GENERATOR_ACTION])
}

/// One entry of a clang compilation database.
#[derive(Debug, Serialize, Deserialize)]
struct CompdbEntry {
  file: String,
  output: String,
  directory: String,
  command: String,
}

/// Reduce a raw `ninja -t compdb` dump to the entries clangd cares about.
///
/// Keeps entries whose source has a C-family extension and whose output
/// is an object file, and strips compiler flags clangd chokes on.
fn simplify_compdb(raw: &str) -> Result<String, serde_json::Error> {
  let entries: Vec<CompdbEntry> = serde_json::from_str(raw)?;
  let kept: Vec<CompdbEntry> = entries
    .into_iter()
    .filter(|entry| {
      has_extension(&entry.file, SOURCE_EXTENSIONS) && has_extension(&entry.output, OBJECT_EXTENSIONS)
    })
    .map(|entry| CompdbEntry {
      command: filter_command(&entry.command),
      ..entry
    })
    .collect();
  serde_json::to_string_pretty(&kept)
}

fn has_extension(path: &str, allowed: &[&str]) -> bool {
  Path::new(path)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| allowed.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

fn filter_command(command: &str) -> String {
  split_arguments(command)
    .into_iter()
    .filter(|arg| !is_stripped_flag(arg))
    .map(|arg| if arg.contains(' ') { format!("\"{arg}\"") } else { arg })
    .collect::<Vec<_>>()
    .join(" ")
}

fn is_stripped_flag(arg: &str) -> bool {
  arg.starts_with("-fno-") && !KEPT_FEATURE_FLAGS.contains(&arg)
}

/// Split a recorded command line, honoring double quotes.
fn split_arguments(command: &str) -> Vec<String> {
  let mut args = Vec::new();
  let mut current = String::new();
  let mut quoted = false;

  for ch in command.chars() {
    match ch {
      '"' => quoted = !quoted,
      c if c.is_whitespace() && !quoted => {
        if !current.is_empty() {
          args.push(std::mem::take(&mut current));
        }
      }
      c => current.push(c),
    }
  }
  if !current.is_empty() {
    args.push(current);
  }
  args
}
