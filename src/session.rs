//! One profiling run, from the first sample to the last check.
//!
//! A session collects raw records first. [`Session::freeze`] folds them into
//! the call tree exactly once; after that the tree is read-only and budgets
//! may be checked against it.

use crate::check::{evaluate, Budget, TestId};
use crate::defs::ProfileMode;
use crate::error::{Error, Result};
use crate::index::HierarchyIndex;
use crate::locate::{locate, outermost};
use crate::read::Collector;
use crate::report::Report;
use crate::stats::{FoldSummary, Stats};
use crate::structs::Metrics;
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use std::time::Duration;
use tracing::{debug, event, warn, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Frozen,
}

pub struct Session {
    mode: ProfileMode,
    phase: Phase,
    pending: Vec<String>,
    stats: Stats,
    summary: FoldSummary,
    index: OnceCell<HierarchyIndex>,
    tests: IndexMap<TestId, Vec<Budget>>,
}

impl Session {
    pub fn new(mode: ProfileMode) -> Self {
        Session {
            mode,
            phase: Phase::Collecting,
            pending: Vec::new(),
            stats: Stats::new(),
            summary: FoldSummary::default(),
            index: OnceCell::new(),
            tests: IndexMap::new(),
        }
    }

    pub fn mode(&self) -> ProfileMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_frozen(&self) -> bool {
        self.phase == Phase::Frozen
    }

    /// Declares budgets for a test. Declaring the same test again appends.
    pub fn register_test(&mut self, test: TestId, budgets: impl IntoIterator<Item = Budget>) {
        self.tests.entry(test).or_default().extend(budgets);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn push_record(&mut self, record: impl Into<String>) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::Frozen);
        }
        self.pending.push(record.into());
        Ok(())
    }

    pub fn extend_records<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        if self.is_frozen() {
            return Err(Error::Frozen);
        }
        self.pending.extend(records.into_iter().map(Into::into));
        Ok(())
    }

    /// Takes every record from `collector` once its stream ends, or once
    /// `limit` has passed if one is given.
    pub async fn collect(
        &mut self,
        collector: Collector,
        limit: Option<Duration>,
        grace: Duration,
    ) -> anyhow::Result<usize> {
        if self.is_frozen() {
            return Err(Error::Frozen.into());
        }
        let records = match limit {
            Some(limit) => collector.join_within(limit, grace).await?,
            None => collector.join().await?,
        };
        let count = records.len();
        self.pending.extend(records);
        event!(Level::DEBUG, "collected {} records", count);
        Ok(count)
    }

    /// Folds every pending record and ends collection.
    pub fn freeze(&mut self) -> FoldSummary {
        if self.is_frozen() {
            return self.summary;
        }
        let pending = std::mem::take(&mut self.pending);
        self.summary = self.stats.fold(&pending, self.mode);
        self.phase = Phase::Frozen;
        event!(Level::INFO, "session frozen with {} samples", self.summary.accepted);
        self.summary
    }

    pub fn summary(&self) -> FoldSummary {
        self.summary
    }

    pub fn stats(&self) -> Result<&Stats> {
        if !self.is_frozen() {
            return Err(Error::NotFrozen);
        }
        Ok(&self.stats)
    }

    /// The index over the frozen tree, built on first use.
    pub fn index(&self) -> Result<&HierarchyIndex> {
        if !self.is_frozen() {
            return Err(Error::NotFrozen);
        }
        Ok(self.index.get_or_init(|| {
            let index = HierarchyIndex::build(&self.stats);
            debug!("indexed {} functions", index.functions());
            index
        }))
    }

    /// Evaluates every registered budget.
    ///
    /// Tests that left no trace in the samples are skipped. Budgets whose
    /// limit cannot be read are reported apart from pass/fail outcomes.
    pub fn check(&self) -> Result<Report> {
        if !self.is_frozen() {
            return Err(Error::NotFrozen);
        }
        let mut report = Report::new(self.mode, self.summary);
        if report.no_data() {
            event!(Level::INFO, "no data collected, nothing to check");
            return Ok(report);
        }

        let index = self.index()?;
        for (test, budgets) in &self.tests {
            let found = index.find(&test.function, &test.module);
            if found.is_empty() {
                debug!("no samples for {}", test);
                continue;
            }
            let roots = outermost(&self.stats, found);
            let baseline: Metrics = roots.iter().map(|id| self.stats.node(*id).total).sum();

            for budget in budgets {
                let target = budget.target(test);
                let located: Vec<Metrics> = locate(
                    &self.stats,
                    &roots,
                    &target.function,
                    &target.module,
                    target.line,
                )
                .into_iter()
                .map(|id| self.stats.node(id).total)
                .collect();

                match evaluate(budget, target, &located, baseline) {
                    Ok(outcome) => report.push_outcome(test.clone(), outcome),
                    Err(e) if e.is_limit_error() => {
                        warn!("cannot check {}: {}", test, e);
                        report.push_invalid(test.clone(), budget.clone(), &e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        event!(
            Level::INFO,
            "{} checks, {} failed, {} invalid",
            report.entries.len(),
            report.failed(),
            report.invalid()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_queries_while_collecting() {
        let mut session = Session::new(ProfileMode::Time);
        session.push_record("P1;T1;t.py:test_a:1 10").unwrap();
        assert!(matches!(session.check(), Err(Error::NotFrozen)));
        assert!(matches!(session.index(), Err(Error::NotFrozen)));
        assert!(matches!(session.stats(), Err(Error::NotFrozen)));
        assert_eq!(session.pending(), 1);
    }

    #[test]
    fn freezing_is_final() {
        let mut session = Session::new(ProfileMode::Time);
        session
            .extend_records(["P1;T1;t.py:test_a:1 10", "junk"])
            .unwrap();
        let summary = session.freeze();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(session.phase(), Phase::Frozen);
        assert_eq!(session.pending(), 0);

        assert!(matches!(
            session.push_record("P1;T1;t.py:test_a:1 10"),
            Err(Error::Frozen)
        ));
        assert_eq!(session.freeze(), summary);
    }

    #[test]
    fn index_is_built_once() {
        let mut session = Session::new(ProfileMode::Time);
        session.push_record("P1;T1;t.py:test_a:1 10").unwrap();
        session.freeze();
        let first = session.index().unwrap() as *const HierarchyIndex;
        let second = session.index().unwrap() as *const HierarchyIndex;
        assert_eq!(first, second);
    }

    #[test]
    fn same_test_registered_twice_appends() {
        let mut session = Session::new(ProfileMode::Time);
        let test = TestId::new("test_a", "t.py");
        session.register_test(test.clone(), [Budget::total_time("50%")]);
        session.register_test(test, [Budget::total_time("60%")]);
        session
            .extend_records(["P1;T1;/src/t.py:test_a:1 10"])
            .unwrap();
        session.freeze();
        let report = session.check().unwrap();
        assert_eq!(report.entries.len(), 2);
    }
}
