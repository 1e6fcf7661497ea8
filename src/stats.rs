//! The aggregate call tree.
//!
//! Nodes live in one arena and refer to each other by [`NodeId`]. Each node
//! carries the inclusive metrics of every sample whose stack passed through it.

use crate::defs::ProfileMode;
use crate::structs::{Frame, Metrics, Sample};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, event, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct FrameStats {
    pub label: Frame,
    pub total: Metrics,
    pub parent: Option<NodeId>,
    pub children: BTreeMap<Frame, NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadStats {
    pub total: Metrics,
    pub children: BTreeMap<Frame, NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessStats {
    pub threads: BTreeMap<String, ThreadStats>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldSummary {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub processes: BTreeMap<u32, ProcessStats>,
    nodes: Vec<FrameStats>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &FrameStats {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.processes.is_empty()
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadStats> {
        self.processes
            .values()
            .flat_map(|process| process.threads.values())
    }

    /// Adds one sample along its stack, creating nodes on first sight.
    pub fn update(&mut self, sample: &Sample) {
        let thread = self
            .processes
            .entry(sample.pid)
            .or_default()
            .threads
            .entry(sample.tid.clone())
            .or_default();
        thread.total += sample.metrics;

        let Some((outermost, rest)) = sample.frames.split_first() else {
            return;
        };

        let mut current = match thread.children.get(outermost) {
            Some(id) => *id,
            None => {
                let id = NodeId(self.nodes.len());
                thread.children.insert(outermost.clone(), id);
                self.nodes.push(FrameStats::new(outermost.clone(), None));
                id
            }
        };
        self.nodes[current.0].total += sample.metrics;

        for frame in rest {
            let next = match self.nodes[current.0].children.get(frame) {
                Some(id) => *id,
                None => {
                    let id = NodeId(self.nodes.len());
                    self.nodes[current.0].children.insert(frame.clone(), id);
                    self.nodes.push(FrameStats::new(frame.clone(), Some(current)));
                    id
                }
            };
            self.nodes[next.0].total += sample.metrics;
            current = next;
        }
    }

    /// Parses and folds raw records. Records that fail to parse are dropped.
    pub fn fold<I, S>(&mut self, records: I, mode: ProfileMode) -> FoldSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = FoldSummary::default();
        for record in records {
            let record = record.as_ref();
            if record.trim().is_empty() {
                continue;
            }
            match Sample::parse(record, mode) {
                Ok(sample) => {
                    self.update(&sample);
                    summary.accepted += 1;
                }
                Err(e) => {
                    debug!("dropping record: {}", e);
                    summary.rejected += 1;
                }
            }
        }
        event!(
            Level::INFO,
            "folded {} samples into {} nodes, dropped {}",
            summary.accepted,
            self.nodes.len(),
            summary.rejected
        );
        summary
    }

    /// Every node of `ids`, followed by its descendants, depth first.
    pub fn walk<'a>(&'a self, ids: impl IntoIterator<Item = &'a NodeId>) -> Walk<'a> {
        let mut stack: Vec<NodeId> = ids.into_iter().copied().collect();
        stack.reverse();
        Walk { stats: self, stack }
    }

    /// Whether any proper ancestor of `id` satisfies `pred`.
    pub fn has_ancestor(&self, id: NodeId, mut pred: impl FnMut(NodeId) -> bool) -> bool {
        let mut parent = self.node(id).parent;
        while let Some(p) = parent {
            if pred(p) {
                return true;
            }
            parent = self.node(p).parent;
        }
        false
    }
}

impl FrameStats {
    fn new(label: Frame, parent: Option<NodeId>) -> Self {
        FrameStats {
            label,
            total: Metrics::default(),
            parent,
            children: BTreeMap::new(),
        }
    }
}

pub struct Walk<'a> {
    stats: &'a Stats,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (NodeId, &'a FrameStats);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.stats.node(id);
        self.stack.extend(node.children.values().rev());
        Some((id, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(frames: &[&str], time: u64) -> Sample {
        Sample {
            pid: 1,
            tid: "1".into(),
            frames: frames.iter().map(|f| Frame::new(*f, "mod.py", 0)).collect(),
            metrics: Metrics {
                time,
                ..Default::default()
            },
        }
    }

    fn child<'a>(stats: &'a Stats, node: &FrameStats, function: &str) -> &'a FrameStats {
        stats.node(node.children[&Frame::new(function, "mod.py", 0)])
    }

    #[test]
    fn totals_are_inclusive() {
        let mut stats = Stats::new();
        stats.update(&sample(&["a", "b"], 100));
        stats.update(&sample(&["a", "c"], 50));

        let thread = &stats.processes[&1].threads["1"];
        assert_eq!(thread.total.time, 150);
        let a = stats.node(thread.children[&Frame::new("a", "mod.py", 0)]);
        assert_eq!(a.total.time, 150);
        assert_eq!(a.children.len(), 2);
        assert_eq!(child(&stats, a, "b").total.time, 100);
        assert_eq!(child(&stats, a, "c").total.time, 50);
    }

    #[test]
    fn parent_covers_children() {
        let mut stats = Stats::new();
        for (frames, time) in [
            (&["a", "b", "c"][..], 10),
            (&["a", "b"][..], 7),
            (&["a"][..], 3),
            (&["a", "d", "c"][..], 4),
            (&["e"][..], 1),
        ] {
            stats.update(&sample(frames, time));
        }
        for thread in stats.threads() {
            for (_, node) in stats.walk(thread.children.values()) {
                let below: u64 = node
                    .children
                    .values()
                    .map(|id| stats.node(*id).total.time)
                    .sum();
                assert!(node.total.time >= below, "{}", node.label);
            }
        }
    }

    #[test]
    fn separate_threads_and_processes() {
        let mut stats = Stats::new();
        let mut other = sample(&["a"], 5);
        other.tid = "2".into();
        stats.update(&sample(&["a"], 5));
        stats.update(&other);
        other.pid = 2;
        stats.update(&other);

        assert_eq!(stats.processes.len(), 2);
        assert_eq!(stats.processes[&1].threads.len(), 2);
        assert_eq!(stats.len(), 3);
    }

    #[test]
    fn fold_skips_bad_records() {
        let mut stats = Stats::new();
        let summary = stats.fold(
            [
                "P1;T1;mod.py:a:0;mod.py:b:0 100",
                "P1;T1;mod.py:a:0 oops",
                "",
                "not a sample",
                "P1;T1;mod.py:a:0;mod.py:c:0 50",
            ],
            ProfileMode::Time,
        );
        assert_eq!(
            summary,
            FoldSummary {
                accepted: 2,
                rejected: 2
            }
        );
        assert_eq!(stats.processes[&1].threads["1"].total.time, 150);
    }

    #[test]
    fn fold_saturates_huge_metrics() {
        let record = format!("P1;T1;mod.py:a:0 {}", i64::MAX);
        let mut stats = Stats::new();
        let summary = stats.fold([record.as_str(); 3], ProfileMode::Time);
        assert_eq!(summary.accepted, 3);

        let thread = &stats.processes[&1].threads["1"];
        assert_eq!(thread.total.time, u64::MAX);
        let a = stats.node(thread.children[&Frame::new("a", "mod.py", 0)]);
        assert_eq!(a.total.time, u64::MAX);
    }

    #[test]
    fn walk_is_depth_first_and_stable() {
        let mut stats = Stats::new();
        stats.update(&sample(&["a", "b"], 1));
        stats.update(&sample(&["a", "c"], 1));
        stats.update(&sample(&["d"], 1));

        let order = |stats: &Stats| -> Vec<String> {
            stats
                .threads()
                .flat_map(|t| stats.walk(t.children.values()))
                .map(|(_, node)| node.label.function.clone())
                .collect()
        };
        assert_eq!(order(&stats), ["a", "b", "c", "d"]);
        assert_eq!(order(&stats), order(&stats.clone()));
    }
}
