//! Dependency graph construction and layered topological sort.

use crate::error::{OrchestratorError, Result};
use stagehand_core::Module;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// A set of modules whose dependencies all sit in earlier layers.
///
/// Ordered by name so that identical inputs enumerate identically.
pub type Layer = BTreeSet<String>;

/// A validated dependency graph: module name -> names it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    /// module -> [dependencies]
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build the graph for a module set.
    ///
    /// Every dependency must name a module of the set. Cycles are not
    /// rejected here; [`partition`] reports them.
    pub fn build(modules: &[Module]) -> Result<Self> {
        let mut edges = BTreeMap::new();
        for module in modules {
            let deps: BTreeSet<String> = module.dependencies.iter().cloned().collect();
            if edges.insert(module.name.clone(), deps).is_some() {
                return Err(OrchestratorError::DuplicateModule(module.name.clone()));
            }
        }

        for module in modules {
            if let Some(missing) = module.dependencies.iter().find(|d| !edges.contains_key(*d)) {
                return Err(OrchestratorError::UnknownDependency {
                    module: module.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        debug!("Built dependency graph with {} modules", edges.len());
        Ok(Self { edges })
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no modules.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether a module is part of the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Dependencies of a module.
    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(name)
    }

    /// All module names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }
}

/// Sort the graph into layers (Kahn-style).
///
/// With `include_optional` every module of the graph is placed. Otherwise
/// only `selected_names` are placed, and dependencies outside that subset
/// count as already satisfied.
pub fn partition<I, S>(graph: &DependencyGraph, selected_names: I, include_optional: bool) -> Result<Vec<Layer>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let members: BTreeSet<&str> = if include_optional {
        graph.names().collect()
    } else {
        let mut members = BTreeSet::new();
        for name in selected_names {
            let name = name.as_ref();
            let (key, _) = graph
                .edges
                .get_key_value(name)
                .ok_or_else(|| OrchestratorError::UnknownModule(name.to_string()))?;
            members.insert(key.as_str());
        }
        members
    };

    // Unassigned module -> its dependencies not yet assigned to a layer
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = members
        .iter()
        .map(|&name| {
            let deps = graph.edges[name]
                .iter()
                .map(String::as_str)
                .filter(|dep| members.contains(dep))
                .collect();
            (name, deps)
        })
        .collect();

    let mut layers: Vec<Layer> = Vec::new();
    while !pending.is_empty() {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(&name, _)| name)
            .collect();

        if ready.is_empty() {
            return Err(OrchestratorError::CyclicDependency {
                cycle: find_cycle(&pending),
            });
        }

        for name in &ready {
            pending.remove(name);
        }
        for deps in pending.values_mut() {
            for name in &ready {
                deps.remove(name);
            }
        }

        debug!("Layer {}: {:?}", layers.len(), ready);
        layers.push(ready.into_iter().map(str::to_string).collect());
    }

    Ok(layers)
}

/// Walk first-dependency edges among stuck modules until one repeats.
///
/// Every stuck module still waits on another stuck module, so the walk
/// always closes a cycle.
fn find_cycle(pending: &BTreeMap<&str, BTreeSet<&str>>) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    let Some(mut current) = pending.keys().next().copied() else {
        return Vec::new();
    };

    loop {
        if let Some(&start) = position.get(current) {
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(current.to_string());
            return cycle;
        }
        position.insert(current, path.len());
        path.push(current);

        match pending.get(current).and_then(|deps| deps.iter().next().copied()) {
            Some(next) => current = next,
            None => return path.iter().map(|s| s.to_string()).collect(),
        }
    }
}
