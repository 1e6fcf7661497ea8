//! Declared budgets and their evaluation.
//!
//! Every kind of check is listed once in [`CHECKS`] next to the function
//! that evaluates it.

use crate::error::{Error, Result};
use crate::structs::Metrics;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    TotalTime,
    TotalMemory,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Microseconds,
    Bytes,
}

type Evaluator = fn(&Budget, Target, &[Metrics], Metrics) -> Result<CheckOutcome>;

/// Indexed by `CheckKind` discriminant.
pub static CHECKS: [(CheckKind, &str, Evaluator); 2] = [
    (CheckKind::TotalTime, "total_time", total_time),
    (CheckKind::TotalMemory, "total_memory", total_memory),
];

impl CheckKind {
    pub fn name(self) -> &'static str {
        CHECKS[self as usize].1
    }

    fn evaluator(self) -> Evaluator {
        CHECKS[self as usize].2
    }
}

/// A limit as declared. Strings are resolved against the check's unit and
/// baseline only at evaluation time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(from = "Value", into = "Value")]
pub enum Limit {
    Duration(Duration),
    Integer(i64),
    Float(f64),
    Text(String),
    Other(Value),
}

impl Limit {
    fn kind(&self) -> &'static str {
        match self {
            Limit::Duration(_) => "duration",
            Limit::Integer(_) => "integer",
            Limit::Float(_) => "float",
            Limit::Text(_) => "string",
            Limit::Other(Value::Null) => "null",
            Limit::Other(Value::Bool(_)) => "boolean",
            Limit::Other(Value::Array(_)) => "array",
            Limit::Other(Value::Object(_)) => "object",
            Limit::Other(_) => "value",
        }
    }

    fn unsupported(&self, check: CheckKind) -> Error {
        Error::UnsupportedLimitType {
            kind: self.kind().to_string(),
            check: check.name().to_string(),
        }
    }
}

impl From<Value> for Limit {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Limit::Integer(i),
                None => n.as_f64().map_or(Limit::Other(Value::Number(n)), Limit::Float),
            },
            Value::String(s) => Limit::Text(s),
            other => Limit::Other(other),
        }
    }
}

impl From<Limit> for Value {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Duration(d) => Value::from(d.as_micros() as u64),
            Limit::Integer(i) => Value::from(i),
            Limit::Float(f) => Value::from(f),
            Limit::Text(s) => Value::String(s),
            Limit::Other(v) => v,
        }
    }
}

impl From<Duration> for Limit {
    fn from(d: Duration) -> Self {
        Limit::Duration(d)
    }
}

impl From<&str> for Limit {
    fn from(s: &str) -> Self {
        Limit::Text(s.to_string())
    }
}

impl From<i64> for Limit {
    fn from(i: i64) -> Self {
        Limit::Integer(i)
    }
}

impl From<f64> for Limit {
    fn from(f: f64) -> Self {
        Limit::Float(f)
    }
}

/// One declared check. Function and module default to the test's own.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Budget {
    pub kind: CheckKind,
    pub limit: Limit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub net: bool,
}

impl Budget {
    pub fn total_time(limit: impl Into<Limit>) -> Self {
        Budget::new(CheckKind::TotalTime, limit.into())
    }

    pub fn total_memory(limit: impl Into<Limit>) -> Self {
        Budget::new(CheckKind::TotalMemory, limit.into())
    }

    fn new(kind: CheckKind, limit: Limit) -> Self {
        Budget {
            kind,
            limit,
            function: None,
            module: None,
            line: 0,
            net: false,
        }
    }

    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn net(mut self, net: bool) -> Self {
        self.net = net;
        self
    }

    /// What this budget measures when declared on `test`.
    pub fn target(&self, test: &TestId) -> Target {
        Target {
            function: self.function.clone().unwrap_or_else(|| test.function.clone()),
            module: self.module.clone().unwrap_or_else(|| test.module.clone()),
            line: self.line,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct TestId {
    pub function: String,
    pub module: String,
}

impl TestId {
    pub fn new(function: impl Into<String>, module: impl Into<String>) -> Self {
        TestId {
            function: function.into(),
            module: module.into(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.function)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Target {
    pub function: String,
    pub module: String,
    pub line: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub target: Target,
    pub actual: f64,
    pub expected: f64,
    pub unit: Unit,
    pub result: bool,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.result
    }

    pub fn delta(&self) -> f64 {
        self.actual - self.expected
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Target {
            function,
            module,
            line,
        } = &self.target;
        write!(f, "{function}")?;
        if *line != 0 {
            write!(f, ":{line}")?;
        }
        write!(f, " ({module}) ")?;

        let delta = self.delta();
        if delta > 0.0 {
            write!(f, "+{}", self.unit.format(delta))?;
        } else {
            write!(f, "-{}", self.unit.format(-delta))?;
        }
        if self.expected != 0.0 {
            write!(
                f,
                " ({:.1}% of {})",
                delta * 100.0 / self.expected,
                self.unit.format(self.expected)
            )?;
        }
        Ok(())
    }
}

impl Unit {
    pub fn format(self, value: f64) -> String {
        match self {
            Unit::Microseconds => {
                if value > 1e6 {
                    format!("{:.1} s", value / 1e6)
                } else if value > 1e3 {
                    format!("{:.1} ms", value / 1e3)
                } else {
                    format!("{value:.1} μs")
                }
            }
            Unit::Bytes => {
                const KB: f64 = (1u64 << 10) as f64;
                const MB: f64 = (1u64 << 20) as f64;
                const GB: f64 = (1u64 << 30) as f64;
                if value > GB {
                    format!("{:.1} GB", value / GB)
                } else if value > MB {
                    format!("{:.1} MB", value / MB)
                } else if value > KB {
                    format!("{:.1} KB", value / KB)
                } else {
                    format!("{value:.0} B")
                }
            }
        }
    }
}

/// Evaluates `budget` over the totals of the nodes found for `target`,
/// resolving percentages against the test's `baseline` totals.
///
/// No located totals means an actual value of zero, which passes any
/// non-negative limit.
pub fn evaluate(
    budget: &Budget,
    target: Target,
    located: &[Metrics],
    baseline: Metrics,
) -> Result<CheckOutcome> {
    (budget.kind.evaluator())(budget, target, located, baseline)
}

fn total_time(
    budget: &Budget,
    target: Target,
    located: &[Metrics],
    baseline: Metrics,
) -> Result<CheckOutcome> {
    let actual = located
        .iter()
        .map(|m| m.time)
        .fold(0, u64::saturating_add) as f64;
    let expected = match &budget.limit {
        Limit::Duration(d) => d.as_micros() as f64,
        Limit::Integer(i) => *i as f64,
        Limit::Float(f) => *f,
        Limit::Text(text) => percentage(text, baseline.time as f64)?,
        other => return Err(other.unsupported(budget.kind)),
    };
    Ok(outcome(budget.kind, target, actual, expected, Unit::Microseconds))
}

fn total_memory(
    budget: &Budget,
    target: Target,
    located: &[Metrics],
    baseline: Metrics,
) -> Result<CheckOutcome> {
    let memory = |m: &Metrics| {
        if budget.net {
            m.memory_alloc.saturating_add(m.memory_dealloc)
        } else {
            m.memory_alloc
        }
    };
    let actual = located.iter().map(memory).fold(0, i64::saturating_add) as f64;
    let expected = match &budget.limit {
        Limit::Integer(i) => *i as f64,
        Limit::Text(text) => size(text, memory(&baseline) as f64)?,
        other => return Err(other.unsupported(budget.kind)),
    };
    Ok(outcome(budget.kind, target, actual, expected, Unit::Bytes))
}

fn outcome(kind: CheckKind, target: Target, actual: f64, expected: f64, unit: Unit) -> CheckOutcome {
    CheckOutcome {
        kind,
        target,
        actual,
        expected,
        unit,
        result: actual <= expected,
    }
}

fn percentage(text: &str, baseline: f64) -> Result<f64> {
    let number = text
        .trim()
        .strip_suffix('%')
        .ok_or_else(|| Error::malformed_limit(text, "expected a percentage"))?;
    let perc: f64 = number
        .trim()
        .parse()
        .ok()
        .filter(|perc: &f64| perc.is_finite())
        .ok_or_else(|| Error::malformed_limit(text, "bad percentage"))?;
    Ok(perc / 100.0 * baseline)
}

fn size(text: &str, baseline: f64) -> Result<f64> {
    let upper = text.trim().to_uppercase();
    if upper.ends_with('%') {
        return percentage(&upper, baseline);
    }
    for (suffix, shift) in [("GB", 30), ("MB", 20), ("KB", 10), ("B", 0)] {
        if let Some(number) = upper.strip_suffix(suffix) {
            let n: i64 = number
                .trim()
                .parse()
                .map_err(|_| Error::malformed_limit(text, "bad size"))?;
            return n
                .checked_mul(1 << shift)
                .map(|bytes| bytes as f64)
                .ok_or_else(|| Error::malformed_limit(text, "size too large"));
        }
    }
    Err(Error::malformed_limit(text, "unknown size unit"))
}
