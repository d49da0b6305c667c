//! ninjagen: a declarative generator for ninja build descriptions.
//!
//! A build script describes named transformation stages and threads file
//! groups through them; ninjagen compiles that description into
//! rule/build statements plus a registry of invokable actions:
//!
//! - [`stage::Stage`]: a named transformation that registers one rule
//!   and maps each input group to an output path
//! - [`pipeline::FileGroup`]: the immutable group algebra (`apply`,
//!   `fold`, `merge`, `collect_files`)
//! - [`generator::Generator`]: the scoped accumulator that serializes
//!   the build description exactly once
//! - [`action`]: named entry points with dependency-ordered dispatch
//! - [`script::BuildScript`]: the command-line front end tying it all
//!   together

pub mod action;
pub mod error;
pub mod generator;
pub mod output;
pub mod pipeline;
pub mod script;
pub mod select;
pub mod shell;
pub mod stage;
pub mod vars;

pub use action::{Action, ActionArg, ArgKind, Invocation, Registry};
pub use error::{Error, Result};
pub use generator::{BuildEdge, Generator, Rule};
pub use pipeline::FileGroup;
pub use script::{BuildScript, ScriptOption};
pub use select::{select, select_with};
pub use stage::{CommandStage, Stage, StageOptions, TypeTag, UnitStage};
pub use vars::VarTable;
