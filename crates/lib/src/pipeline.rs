//! The file-group algebra: `apply`, `fold`, `merge`, `collect_files`.
//!
//! A [`FileGroup`] is an immutable nested collection of file paths: a
//! sequence of branches, each holding one or more groups, each group an
//! ordered list of paths with a [`TypeTag`]. Selection seeds one branch
//! per matched file; [`FileGroup::apply`] fans every group out through a
//! list of stages; [`FileGroup::fold`] flattens that fan-out back into
//! flat groups; [`FileGroup::collect_files`] produces the final path
//! list.
//!
//! Every operation returns a new value, so one `FileGroup` can feed
//! several independent `apply` calls without interference.
//!
//! # Ordering
//!
//! `apply` fans out group-major, stage-minor: the outer loop walks the
//! current groups in order, the inner loop walks the stage arguments in
//! the order given. `fold` concatenates each branch's groups in that same
//! stage order, so `apply([s1, s2]).fold().collect_files()` yields, per
//! original group, the `s1` output followed by the `s2` output.

use thiserror::Error;

use crate::generator::Generator;
use crate::stage::{Stage, StageError, TypeTag};

/// Errors raised while threading groups through stages.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// `apply` was called with an empty stage list.
  #[error("`apply` requires at least one stage")]
  NoStages,

  /// A group's tag did not match the stage's accepted input types.
  #[error("stage `{stage}` cannot accept `{actual}` input (accepts: {expected})")]
  InputMismatch {
    stage: String,
    expected: String,
    actual: String,
  },

  #[error(transparent)]
  Stage(#[from] StageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Group {
  paths: Vec<String>,
  tag: TypeTag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Branch {
  groups: Vec<Group>,
}

/// An immutable, ordered, nested collection of file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileGroup {
  branches: Vec<Branch>,
}

impl FileGroup {
  /// The empty file group.
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed a file group with one single-path group per given path.
  pub fn from_paths<I, S>(paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let branches = paths
      .into_iter()
      .map(|path| {
        let path = path.into();
        let tag = TypeTag::of_path(&path);
        Branch {
          groups: vec![Group { paths: vec![path], tag }],
        }
      })
      .collect();
    Self { branches }
  }

  /// Seed a file group holding all paths in one group.
  pub fn from_group<I, S>(paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
    let tag = uniform_tag(&paths);
    Self {
      branches: vec![Branch {
        groups: vec![Group { paths, tag }],
      }],
    }
  }

  /// True when the group holds no branches at all.
  pub fn is_empty(&self) -> bool {
    self.branches.is_empty()
  }

  /// Total number of groups across all branches.
  pub fn group_count(&self) -> usize {
    self.branches.iter().map(|branch| branch.groups.len()).sum()
  }

  /// Run every group through every stage, producing a branched group.
  ///
  /// For each current group (outer, in order) and each stage (inner, in
  /// argument order) this emits the stage's rule (once per call; the
  /// generator de-duplicates across calls), type-checks the group against
  /// the stage's accepted inputs, emits one build edge, and records the
  /// returned output path. The result holds one branch per original
  /// group, containing one single-path group per stage.
  pub fn apply(&self, ninja: &mut Generator, stages: &[&dyn Stage]) -> Result<FileGroup, PipelineError> {
    if stages.is_empty() {
      return Err(PipelineError::NoStages);
    }

    for stage in stages {
      stage.generate_rule(ninja)?;
    }

    let mut branches = Vec::new();
    for group in self.iter_groups() {
      let mut fanout = Vec::with_capacity(stages.len());
      for stage in stages {
        if !stage.accepts(&group.tag) {
          return Err(PipelineError::InputMismatch {
            stage: stage.name().to_string(),
            expected: describe_tags(&stage.input_types()),
            actual: group.tag.to_string(),
          });
        }
        let output = stage.generate_build(ninja, &group.paths)?;
        let tag = TypeTag::of_path(&output);
        fanout.push(Group {
          paths: vec![output],
          tag,
        });
      }
      branches.push(Branch { groups: fanout });
    }

    Ok(FileGroup { branches })
  }

  /// Flatten one level of branching.
  ///
  /// Each branch's groups are concatenated into a single flat group, in
  /// stage-argument order. A branch whose groups share one tag keeps it;
  /// mixed tags fold to [`TypeTag::Untyped`]. Folding an unbranched group
  /// returns an equivalent structure.
  pub fn fold(&self) -> FileGroup {
    let branches = self
      .branches
      .iter()
      .map(|branch| {
        let mut paths = Vec::new();
        let mut tag: Option<TypeTag> = None;
        for group in &branch.groups {
          tag = Some(match tag {
            None => group.tag.clone(),
            Some(current) if current == group.tag => current,
            Some(_) => TypeTag::Untyped,
          });
          paths.extend(group.paths.iter().cloned());
        }
        Branch {
          groups: vec![Group {
            paths,
            tag: tag.unwrap_or(TypeTag::Untyped),
          }],
        }
      })
      .collect();
    FileGroup { branches }
  }

  /// Gather every path of every branch into one flat group.
  ///
  /// This is the whole-structure counterpart of [`FileGroup::fold`],
  /// used to collect per-file outputs into a single input group (for
  /// example, all objects into one link).
  pub fn merge(&self) -> FileGroup {
    let paths: Vec<String> = self.collect_files();
    let tag = uniform_tag(&paths);
    FileGroup {
      branches: vec![Branch {
        groups: vec![Group { paths, tag }],
      }],
    }
  }

  /// Concatenate two file groups, branches of `self` first.
  pub fn concat(&self, other: &FileGroup) -> FileGroup {
    let mut branches = self.branches.clone();
    branches.extend(other.branches.iter().cloned());
    FileGroup { branches }
  }

  /// Flatten the whole structure into an ordered path list.
  pub fn collect_files(&self) -> Vec<String> {
    self
      .iter_groups()
      .flat_map(|group| group.paths.iter().cloned())
      .collect()
  }

  fn iter_groups(&self) -> impl Iterator<Item = &Group> {
    self.branches.iter().flat_map(|branch| branch.groups.iter())
  }
}

fn uniform_tag(paths: &[String]) -> TypeTag {
  let mut tags = paths.iter().map(|path| TypeTag::of_path(path));
  let Some(first) = tags.next() else {
    return TypeTag::Untyped;
  };
  if tags.all(|tag| tag == first) { first } else { TypeTag::Untyped }
}

fn describe_tags(tags: &[TypeTag]) -> String {
  tags.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
