//! Aggregates call-stack samples from an external statistical profiler into
//! a per-process, per-thread call tree and checks declared time and memory
//! budgets of tests against it.

pub mod check;
pub mod defs;
pub mod error;
pub mod index;
pub mod locate;
pub mod parse;
pub mod read;
pub mod report;
pub mod session;
pub mod stats;
pub mod structs;
pub mod write;

pub use check::{evaluate, Budget, CheckKind, CheckOutcome, Limit, Target, TestId, Unit};
pub use defs::ProfileMode;
pub use error::{Error, Result};
pub use index::HierarchyIndex;
pub use locate::locate;
pub use read::{Collector, Manifest, TestBudgets};
pub use report::{Report, ReportEntry};
pub use session::{Phase, Session};
pub use stats::{FoldSummary, FrameStats, NodeId, Stats};
pub use structs::{Frame, Metrics, Sample};
