use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;
use swc_core::ecma::ast::Ident;
use swc_core::ecma::atoms::Atom;

use crate::arena::NodeId;
use crate::scope::{BindingKey, ScopeId, ScopeManager};

/// A binding that comes from another module, either through `import` or a
/// statically known `require()` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDep {
  pub source: Atom,
  pub local: Ident,
  /// Imported name, `None` for namespace imports and whole-module requires
  pub imported: Option<Atom>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExternalDepEntry {
  pub dep: ExternalDep,
  /// The node that declares `local`
  pub node: NodeId,
}

/// Dependency edges between the nodes of a module.
///
/// An edge `a -> b` means that `a` can only be kept if `b` is kept too.
#[derive(Debug)]
pub struct DependencyGraph {
  scope: ScopeManager,
  edges: Vec<(NodeId, NodeId)>,
  dependencies: HashMap<NodeId, Vec<NodeId>>,
  dependents: HashMap<NodeId, Vec<NodeId>>,
  binding_dependencies: HashMap<BindingKey, Vec<NodeId>>,
  binding_dependents: HashMap<BindingKey, Vec<NodeId>>,
  exports: IndexSet<NodeId>,
  external_deps: Vec<ExternalDepEntry>,
}

impl DependencyGraph {
  pub fn new(scope: ScopeManager) -> Self {
    DependencyGraph {
      scope,
      edges: Vec::new(),
      dependencies: HashMap::new(),
      dependents: HashMap::new(),
      binding_dependencies: HashMap::new(),
      binding_dependents: HashMap::new(),
      exports: IndexSet::new(),
      external_deps: Vec::new(),
    }
  }

  pub fn scope(&self) -> &ScopeManager {
    &self.scope
  }

  pub fn add_edge(&mut self, dependent: NodeId, dependency: NodeId) {
    if dependent == dependency {
      return;
    }
    let dependencies = self.dependencies.entry(dependent).or_default();
    if dependencies.contains(&dependency) {
      return;
    }
    dependencies.push(dependency);
    self.dependents.entry(dependency).or_default().push(dependent);
    self.edges.push((dependent, dependency));

    if let Some(key) = self.scope.resolve(dependent) {
      self
        .binding_dependencies
        .entry(key)
        .or_default()
        .push(dependency);
    }
    if let Some(key) = self.scope.resolve(dependency) {
      self.binding_dependents.entry(key).or_default().push(dependent);
    }
  }

  pub fn add_export(&mut self, node: NodeId) {
    self.exports.insert(node);
  }

  pub(crate) fn add_external_dep(&mut self, dep: ExternalDep, node: NodeId) {
    self.external_deps.push(ExternalDepEntry { dep, node });
  }

  pub fn edges(&self) -> &[(NodeId, NodeId)] {
    &self.edges
  }

  pub fn dependencies(&self, node: NodeId) -> &[NodeId] {
    self
      .dependencies
      .get(&node)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn dependents(&self, node: NodeId) -> &[NodeId] {
    self
      .dependents
      .get(&node)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Everything the uses and declarations of a binding depend on
  pub fn binding_dependencies(&self, key: &BindingKey) -> &[NodeId] {
    self
      .binding_dependencies
      .get(key)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Every node that depends on a use or the declaration of a binding
  pub fn binding_dependents(&self, key: &BindingKey) -> &[NodeId] {
    self
      .binding_dependents
      .get(key)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn exports(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.exports.iter().copied()
  }

  pub fn is_export(&self, node: NodeId) -> bool {
    self.exports.contains(&node)
  }

  pub fn external_deps(&self) -> impl Iterator<Item = &ExternalDep> {
    self.external_deps.iter().map(|entry| &entry.dep)
  }

  /// External dependencies whose local binding is alive
  pub fn alive_external_deps(&self, alive: &HashSet<NodeId>) -> Vec<ExternalDep> {
    self
      .external_deps
      .iter()
      .filter(|entry| alive.contains(&entry.node))
      .map(|entry| entry.dep.clone())
      .collect()
  }

  /// Whether `name` is declared at the top level of the module
  pub fn is_declared(&self, name: &str) -> bool {
    self
      .scope
      .is_declared(&BindingKey::new(ScopeId::MODULE, name))
  }

  /// Declarations of top-level names
  pub fn get_leafs(&self, names: &[&str]) -> Vec<Option<NodeId>> {
    names
      .iter()
      .map(|name| {
        self
          .scope
          .get_declaration(&BindingKey::new(ScopeId::MODULE, *name))
      })
      .collect()
  }

  /// Nodes reachable from `roots` together with the nodes reachable from
  /// the exports of the module.
  pub fn get_alive(&self, roots: &[NodeId]) -> HashSet<NodeId> {
    let mut alive = self.reachable(roots.iter().copied());
    alive.extend(self.reachable(self.exports()));
    alive
  }

  fn reachable(&self, roots: impl Iterator<Item = NodeId>) -> HashSet<NodeId> {
    let mut alive = HashSet::new();
    let mut queue: VecDeque<NodeId> = roots.collect();
    while let Some(node) = queue.pop_front() {
      if !alive.insert(node) {
        continue;
      }
      for dependency in self.dependencies(node) {
        if !alive.contains(dependency) {
          queue.push_back(*dependency);
        }
      }
    }
    alive
  }
}

#[cfg(test)]
mod tests {
  use linaria_swc_runner::test_utils::parse_test_module;

  use super::*;
  use crate::arena::NodeArena;

  fn empty_graph() -> DependencyGraph {
    let (module, _) = parse_test_module("");
    let arena = NodeArena::build(&module);
    DependencyGraph::new(ScopeManager::build(&module, &arena))
  }

  #[test]
  fn test_alive_follows_edges() {
    let mut graph = empty_graph();
    let [a, b, c, d] = [0, 1, 2, 3].map(NodeId::new);
    graph.add_edge(a, b);
    graph.add_edge(b, c);
    graph.add_edge(d, a);

    let alive = graph.get_alive(&[a]);
    assert_eq!(alive, HashSet::from([a, b, c]));
    assert_eq!(graph.dependents(a), &[d]);
  }

  #[test]
  fn test_exports_are_always_alive() {
    let mut graph = empty_graph();
    let [a, b, c] = [0, 1, 2].map(NodeId::new);
    graph.add_edge(b, c);
    graph.add_export(b);

    let alive = graph.get_alive(&[a]);
    assert_eq!(alive, HashSet::from([a, b, c]));
  }

  #[test]
  fn test_alive_set_grows_with_roots() {
    let mut graph = empty_graph();
    let [a, b, c, d] = [0, 1, 2, 3].map(NodeId::new);
    graph.add_edge(a, b);
    graph.add_edge(c, d);

    let small = graph.get_alive(&[a]);
    let large = graph.get_alive(&[a, c]);
    assert!(small.is_subset(&large));
    assert_eq!(large.len(), 4);
  }

  #[test]
  fn test_duplicate_and_self_edges_are_ignored() {
    let mut graph = empty_graph();
    let [a, b] = [0, 1].map(NodeId::new);
    graph.add_edge(a, b);
    graph.add_edge(a, b);
    graph.add_edge(a, a);
    assert_eq!(graph.edges().len(), 1);
  }
}
