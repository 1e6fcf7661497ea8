use crate::defs::{Bytes, Microseconds};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// One position in a call stack. Line 0 stands for the whole function.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Frame {
    pub function: String,
    pub module: String,
    pub line: u32,
}

impl Frame {
    pub fn new(function: impl Into<String>, module: impl Into<String>, line: u32) -> Self {
        Frame {
            function: function.into(),
            module: module.into(),
            line,
        }
    }

    /// Same function, with `module` being a suffix of this frame's module.
    pub fn matches(&self, function: &str, module: &str) -> bool {
        self.function == function && self.module.ends_with(module)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.function, self.line)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub time: Microseconds,
    pub memory_alloc: Bytes,
    // non-positive when recorded
    pub memory_dealloc: Bytes,
}

impl AddAssign for Metrics {
    fn add_assign(&mut self, other: Self) {
        // totals pin at the bounds instead of wrapping
        self.time = self.time.saturating_add(other.time);
        self.memory_alloc = self.memory_alloc.saturating_add(other.memory_alloc);
        self.memory_dealloc = self.memory_dealloc.saturating_add(other.memory_dealloc);
    }
}

impl std::iter::Sum for Metrics {
    fn sum<I: Iterator<Item = Metrics>>(iter: I) -> Self {
        iter.fold(Metrics::default(), |mut total, m| {
            total += m;
            total
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub pid: u32,
    pub tid: String,
    /// Outermost frame first.
    pub frames: Vec<Frame>,
    pub metrics: Metrics,
}
