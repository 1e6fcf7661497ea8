use crate::error::Error;
use crate::stats::{NodeId, Stats};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::warn;

/// Every node of a frozen [`Stats`] tree, bucketed by function then module.
///
/// Buckets keep traversal order, and nested occurrences of a function are
/// indexed alongside their ancestors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyIndex {
    functions: HashMap<String, IndexMap<String, Vec<NodeId>>>,
}

impl HierarchyIndex {
    pub fn build(stats: &Stats) -> Self {
        let mut functions: HashMap<String, IndexMap<String, Vec<NodeId>>> = HashMap::new();
        for thread in stats.threads() {
            for (id, node) in stats.walk(thread.children.values()) {
                functions
                    .entry(node.label.function.clone())
                    .or_default()
                    .entry(node.label.module.clone())
                    .or_default()
                    .push(id);
            }
        }
        HierarchyIndex { functions }
    }

    /// Exact lookup on both function and module.
    pub fn get(&self, function: &str, module: &str) -> &[NodeId] {
        self.functions
            .get(function)
            .and_then(|modules| modules.get(module))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Nodes of `function` in the first module ending with `module`.
    ///
    /// More than one matching module is reported and the first one, in
    /// traversal order, wins.
    pub fn find(&self, function: &str, module: &str) -> &[NodeId] {
        let Some(modules) = self.functions.get(function) else {
            return &[];
        };
        let matches: Vec<(&String, &Vec<NodeId>)> = modules
            .iter()
            .filter(|(name, _)| name.ends_with(module))
            .collect();

        match *matches.as_slice() {
            [] => &[],
            [(_, first)] => first.as_slice(),
            [(_, first), ..] => {
                let err = Error::AmbiguousModuleMatch {
                    function: function.to_string(),
                    module: module.to_string(),
                    matches: matches.iter().map(|(name, _)| (*name).clone()).collect(),
                };
                warn!("{}", err);
                first.as_slice()
            }
        }
    }

    pub fn functions(&self) -> usize {
        self.functions.len()
    }
}
