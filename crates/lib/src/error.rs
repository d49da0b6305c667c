//! Crate-level error aggregation.
//!
//! Each module carries its own error enum; this type folds them together
//! so action bodies and build-script `main` functions can use one
//! [`Result`] throughout.

use thiserror::Error;

use crate::action::ActionError;
use crate::generator::GeneratorError;
use crate::pipeline::PipelineError;
use crate::script::ScriptError;
use crate::select::SelectError;
use crate::shell::ShellError;
use crate::stage::StageError;
use crate::vars::VarError;

/// Any error a build script can surface.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Var(#[from] VarError),

  #[error(transparent)]
  Generator(#[from] GeneratorError),

  #[error(transparent)]
  Stage(#[from] StageError),

  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  #[error(transparent)]
  Select(#[from] SelectError),

  #[error(transparent)]
  Shell(#[from] ShellError),

  #[error(transparent)]
  Action(#[from] ActionError),

  #[error(transparent)]
  Script(#[from] ScriptError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Result type for build-script operations.
pub type Result<T> = std::result::Result<T, Error>;
