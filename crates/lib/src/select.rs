//! Glob-based selection of seed file groups.
//!
//! Selection turns a glob pattern into the initial [`FileGroup`] for a
//! pipeline: one single-path group per match, in the sorted order the
//! matcher produces, so repeated runs see the same sequence. Patterns are
//! variable-expanded first, so `$root/src/*.c` works as expected.
//!
//! An empty selection is an empty file group, not an error: a script may
//! legitimately proceed with zero files. Pattern syntax problems and
//! unreadable directory entries are reported as distinct error kinds.

use thiserror::Error;
use tracing::debug;

use crate::pipeline::FileGroup;
use crate::vars::{VarError, VarTable};

/// Errors raised while seeding a selection.
#[derive(Debug, Error)]
pub enum SelectError {
  /// The glob pattern itself does not parse.
  #[error("invalid glob pattern `{pattern}`: {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  /// A matched entry could not be read.
  #[error("failed to read entry while matching `{pattern}`: {source}")]
  Read {
    pattern: String,
    #[source]
    source: glob::GlobError,
  },

  #[error(transparent)]
  Var(#[from] VarError),
}

/// Seed a file group from a single glob pattern.
pub fn select(vars: &VarTable, pattern: &str) -> Result<FileGroup, SelectError> {
  select_with(vars, &[pattern], &[])
}

/// Seed a file group from several patterns with substring excludes.
///
/// Matches are collected pattern by pattern; any match whose path
/// contains one of the `exclude` substrings is dropped.
pub fn select_with(vars: &VarTable, patterns: &[&str], exclude: &[&str]) -> Result<FileGroup, SelectError> {
  let mut paths = Vec::new();

  for pattern in patterns {
    let expanded = vars.expand_path(pattern)?;
    let matches = glob::glob(&expanded).map_err(|source| SelectError::Pattern {
      pattern: expanded.clone(),
      source,
    })?;
    for entry in matches {
      let path = entry.map_err(|source| SelectError::Read {
        pattern: expanded.clone(),
        source,
      })?;
      let path = path.to_string_lossy().replace('\\', "/");
      if exclude.iter().any(|needle| path.contains(needle)) {
        continue;
      }
      paths.push(path);
    }
  }

  debug!(count = paths.len(), "selected files");
  Ok(FileGroup::from_paths(paths))
}
