//! Action registration and dependency-ordered resolution.
//!
//! Actions are the entry points a build script exposes on the command
//! line. Each action declares an ordered dependency list; resolving a
//! request yields the transitive closure in execution order:
//! dependencies run before dependents, in declared order, and every
//! action runs at most once.
//!
//! The whole dependency graph is verified before anything runs: an
//! unknown dependency or a cycle fails resolution for every request, and
//! no action body executes.

pub mod builtin;
mod types;

pub use types::*;

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use tracing::debug;

/// The set of registered actions.
#[derive(Default)]
pub struct Registry {
  actions: Vec<Action>,
  index: HashMap<String, usize>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an action.
  ///
  /// Fails on a duplicate name, or when a second action is marked
  /// default.
  pub fn register(&mut self, action: Action) -> Result<(), ActionError> {
    if self.index.contains_key(&action.name) {
      return Err(ActionError::Duplicate(action.name));
    }
    if action.default
      && let Some(existing) = self.actions.iter().find(|a| a.default)
    {
      return Err(ActionError::MultipleDefaults {
        first: existing.name.clone(),
        second: action.name,
      });
    }
    debug!(action = %action.name, "registered action");
    self.index.insert(action.name.clone(), self.actions.len());
    self.actions.push(action);
    Ok(())
  }

  /// Look up an action by name.
  pub fn get(&self, name: &str) -> Option<&Action> {
    self.index.get(name).map(|&index| &self.actions[index])
  }

  /// True if an action with this name is registered.
  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  /// The action marked default, if any.
  pub fn default_action(&self) -> Option<&Action> {
    self.actions.iter().find(|action| action.default)
  }

  /// All registered actions, in registration order.
  pub fn actions(&self) -> impl Iterator<Item = &Action> {
    self.actions.iter()
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  /// Resolve a request to an execution order.
  ///
  /// `None` resolves through the default action; if no default is
  /// registered the order is empty. The registry-wide dependency graph
  /// is verified first, so a cycle anywhere fails every request before
  /// any action body runs.
  pub fn resolve(&self, requested: Option<&str>) -> Result<Vec<&Action>, ActionError> {
    self.verify_acyclic()?;

    let start = match requested {
      Some(name) => Some(
        self
          .index
          .get(name)
          .copied()
          .ok_or_else(|| ActionError::Unknown(name.to_string()))?,
      ),
      None => self.actions.iter().position(|action| action.default),
    };
    let Some(start) = start else {
      return Ok(Vec::new());
    };

    let mut visited = vec![false; self.actions.len()];
    let mut order = Vec::new();
    self.collect(start, &mut visited, &mut order);

    Ok(order.into_iter().map(|index| &self.actions[index]).collect())
  }

  /// Verify that the dependency graph is complete and acyclic.
  fn verify_acyclic(&self) -> Result<(), ActionError> {
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..self.actions.len()).map(|index| graph.add_node(index)).collect();

    for (index, action) in self.actions.iter().enumerate() {
      for dep in &action.deps {
        let dep_index = self.index.get(dep).ok_or_else(|| ActionError::UnknownDependency {
          action: action.name.clone(),
          dep: dep.clone(),
        })?;
        // Edge from dependency to dependent.
        graph.add_edge(nodes[*dep_index], nodes[index], ());
      }
    }

    toposort(&graph, None).map_err(|cycle| ActionError::Cycle(self.actions[graph[cycle.node_id()]].name.clone()))?;
    Ok(())
  }

  /// Depth-first post-order walk: dependencies first, declared order,
  /// each action once. Assumes `verify_acyclic` has passed.
  fn collect(&self, index: usize, visited: &mut [bool], order: &mut Vec<usize>) {
    if visited[index] {
      return;
    }
    visited[index] = true;
    for dep in &self.actions[index].deps {
      if let Some(&dep_index) = self.index.get(dep) {
        self.collect(dep_index, visited, order);
      }
    }
    order.push(index);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn noop(name: &str) -> Action {
    Action::new(name, |_| Ok(()))
  }

  fn names(actions: &[&Action]) -> Vec<String> {
    actions.iter().map(|action| action.name().to_string()).collect()
  }

  #[test]
  fn duplicate_registration_fails() {
    let mut registry = Registry::new();
    registry.register(noop("build")).unwrap();
    assert!(matches!(
      registry.register(noop("build")),
      Err(ActionError::Duplicate(name)) if name == "build"
    ));
  }

  #[test]
  fn second_default_fails() {
    let mut registry = Registry::new();
    registry.register(noop("a").default()).unwrap();
    let err = registry.register(noop("b").default()).unwrap_err();
    assert!(matches!(err, ActionError::MultipleDefaults { .. }));
  }

  #[test]
  fn no_request_resolves_through_default() {
    let mut registry = Registry::new();
    registry.register(noop("a").default()).unwrap();
    registry.register(noop("b")).unwrap();

    assert_eq!(names(&registry.resolve(None).unwrap()), ["a"]);
  }

  #[test]
  fn no_request_and_no_default_runs_nothing() {
    let mut registry = Registry::new();
    registry.register(noop("a")).unwrap();
    assert!(registry.resolve(None).unwrap().is_empty());
  }

  #[test]
  fn request_pulls_in_transitive_dependencies() {
    let mut registry = Registry::new();
    registry.register(noop("a").default()).unwrap();
    registry.register(noop("b")).unwrap();
    registry.register(noop("c").depends_on(["a"])).unwrap();

    assert_eq!(names(&registry.resolve(Some("c")).unwrap()), ["a", "c"]);
    assert_eq!(names(&registry.resolve(Some("b")).unwrap()), ["b"]);
  }

  #[test]
  fn diamond_dependencies_run_once_in_declared_order() {
    let mut registry = Registry::new();
    registry.register(noop("base")).unwrap();
    registry.register(noop("left").depends_on(["base"])).unwrap();
    registry.register(noop("right").depends_on(["base"])).unwrap();
    registry.register(noop("top").depends_on(["left", "right"])).unwrap();

    assert_eq!(
      names(&registry.resolve(Some("top")).unwrap()),
      ["base", "left", "right", "top"]
    );
  }

  #[test]
  fn declared_dependency_order_is_preserved() {
    let mut registry = Registry::new();
    registry.register(noop("zeta")).unwrap();
    registry.register(noop("alpha")).unwrap();
    registry.register(noop("pack").depends_on(["zeta", "alpha"])).unwrap();

    assert_eq!(names(&registry.resolve(Some("pack")).unwrap()), ["zeta", "alpha", "pack"]);
  }

  #[test]
  fn unknown_request_fails() {
    let registry = Registry::new();
    assert!(matches!(registry.resolve(Some("nope")), Err(ActionError::Unknown(_))));
  }

  #[test]
  fn unknown_dependency_fails() {
    let mut registry = Registry::new();
    registry.register(noop("a").depends_on(["ghost"])).unwrap();
    assert!(matches!(
      registry.resolve(Some("a")),
      Err(ActionError::UnknownDependency { dep, .. }) if dep == "ghost"
    ));
  }

  #[test]
  fn cycle_fails_every_request_before_execution() {
    let mut registry = Registry::new();
    registry.register(noop("a").depends_on(["b"])).unwrap();
    registry.register(noop("b").depends_on(["a"])).unwrap();
    registry.register(noop("c")).unwrap();

    assert!(matches!(registry.resolve(Some("a")), Err(ActionError::Cycle(_))));
    assert!(matches!(registry.resolve(Some("b")), Err(ActionError::Cycle(_))));
    // The graph is verified as a whole: even an unrelated request fails.
    assert!(matches!(registry.resolve(Some("c")), Err(ActionError::Cycle(_))));
  }
}
