use crate::stats::{NodeId, Stats};
use std::collections::HashSet;

/// Finds the nodes of `function` in a module ending with `module` under
/// `roots`, roots included.
///
/// Descent stops at the first match along a path, so recursive calls are
/// only counted through their outermost frame. With a non-zero `line` only
/// matches on exactly that line are kept.
pub fn locate(stats: &Stats, roots: &[NodeId], function: &str, module: &str, line: u32) -> Vec<NodeId> {
    let mut found = Vec::new();
    for root in roots {
        collect(stats, *root, function, module, &mut found);
    }
    if line != 0 {
        found.retain(|id| stats.node(*id).label.line == line);
    }
    found
}

fn collect(stats: &Stats, id: NodeId, function: &str, module: &str, found: &mut Vec<NodeId>) {
    let node = stats.node(id);
    if node.label.matches(function, module) {
        found.push(id);
        return;
    }
    for child in node.children.values() {
        collect(stats, *child, function, module, found);
    }
}

/// Drops every node that has another of `ids` among its ancestors.
pub fn outermost(stats: &Stats, ids: &[NodeId]) -> Vec<NodeId> {
    let members: HashSet<NodeId> = ids.iter().copied().collect();
    ids.iter()
        .copied()
        .filter(|id| !stats.has_ancestor(*id, |p| members.contains(&p)))
        .collect()
}
