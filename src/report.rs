use crate::check::{Budget, CheckOutcome, TestId};
use crate::defs::ProfileMode;
use crate::error::Error;
use crate::stats::FoldSummary;
use serde_derive::Serialize;
use std::path::Path;
use tera::{Context, Tera};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportEntry {
    Checked { test: TestId, outcome: CheckOutcome },
    /// The budget itself could not be understood.
    Invalid {
        test: TestId,
        budget: Budget,
        reason: String,
    },
}

/// Outcomes in declaration order, tests in registration order.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mode: ProfileMode,
    pub samples: FoldSummary,
    pub entries: Vec<ReportEntry>,
}

const SUMMARY_TEMPLATE: &str = "{{ rule }} budgeteer report {{ rule }}
profile mode: {{ mode }}
{% if no_data -%}
No data collected.
{% else -%}
{% if dump %}Collected stats written on {{ dump }}
{% endif -%}
Collected a total of {{ accepted }} samples{% if rejected > 0 %} ({{ rejected }} dropped){% endif %}
{% for line in invalid %}could not check {{ line }}
{% endfor -%}
{% for line in failures %}{{ line }}
{% endfor -%}
{% if failed > 0 %}
{{ rule }} {{ failed }} check{% if failed > 1 %}s{% endif %} failed {{ rule }}
{% endif -%}
{% endif -%}
";

impl Report {
    pub fn new(mode: ProfileMode, samples: FoldSummary) -> Self {
        Report {
            mode,
            samples,
            entries: Vec::new(),
        }
    }

    pub fn no_data(&self) -> bool {
        self.samples.accepted == 0
    }

    pub fn push_outcome(&mut self, test: TestId, outcome: CheckOutcome) {
        self.entries.push(ReportEntry::Checked { test, outcome });
    }

    pub fn push_invalid(&mut self, test: TestId, budget: Budget, error: &Error) {
        self.entries.push(ReportEntry::Invalid {
            test,
            budget,
            reason: error.to_string(),
        });
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&TestId, &CheckOutcome)> {
        self.entries.iter().filter_map(|entry| match entry {
            ReportEntry::Checked { test, outcome } => Some((test, outcome)),
            ReportEntry::Invalid { .. } => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.outcomes().filter(|(_, outcome)| !outcome.passed()).count()
    }

    pub fn invalid(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, ReportEntry::Invalid { .. }))
            .count()
    }

    /// Human readable summary of the failing and unreadable checks.
    pub fn render(&self, dump: Option<&Path>) -> Result<String, Error> {
        let failures: Vec<String> = self
            .outcomes()
            .filter(|(_, outcome)| !outcome.passed())
            .map(|(test, outcome)| format!("{test} {outcome}"))
            .collect();
        let invalid: Vec<String> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ReportEntry::Invalid { test, budget, reason } => {
                    Some(format!("{test} {}: {reason}", budget.kind.name()))
                }
                ReportEntry::Checked { .. } => None,
            })
            .collect();

        let mut tera = Tera::default();
        tera.add_raw_template("summary.txt", SUMMARY_TEMPLATE)?;
        let mut context = Context::new();
        context.insert("rule", "=====");
        context.insert("mode", &self.mode.to_string());
        context.insert("no_data", &self.no_data());
        context.insert("dump", &dump.map(|p| p.display().to_string()));
        context.insert("accepted", &self.samples.accepted);
        context.insert("rejected", &self.samples.rejected);
        context.insert("failures", &failures);
        context.insert("invalid", &invalid);
        context.insert("failed", &self.failed());
        Ok(tera.render("summary.txt", &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{CheckKind, Target, Unit};

    fn outcome(actual: f64, expected: f64) -> CheckOutcome {
        CheckOutcome {
            kind: CheckKind::TotalTime,
            target: Target {
                function: "helper".into(),
                module: "util.py".into(),
                line: 0,
            },
            actual,
            expected,
            unit: Unit::Microseconds,
            result: actual <= expected,
        }
    }

    fn samples(accepted: usize) -> FoldSummary {
        FoldSummary {
            accepted,
            rejected: 1,
        }
    }

    #[test]
    fn counts_failures_apart_from_invalid_budgets() {
        let test = TestId::new("test_a", "test_x.py");
        let mut report = Report::new(ProfileMode::Time, samples(10));
        report.push_outcome(test.clone(), outcome(10.0, 20.0));
        report.push_outcome(test.clone(), outcome(30.0, 20.0));
        report.push_invalid(
            test.clone(),
            Budget::total_time("20"),
            &Error::malformed_limit("20", "expected a percentage"),
        );

        assert_eq!(report.failed(), 1);
        assert_eq!(report.invalid(), 1);
        assert_eq!(report.outcomes().count(), 2);
    }

    #[test]
    fn renders_failures() {
        let test = TestId::new("test_a", "test_x.py");
        let mut report = Report::new(ProfileMode::Time, samples(10));
        report.push_outcome(test.clone(), outcome(10.0, 20.0));
        report.push_outcome(test.clone(), outcome(30.0, 20.0));
        report.push_invalid(
            test,
            Budget::total_memory(true_limit()),
            &Error::UnsupportedLimitType {
                kind: "boolean".into(),
                check: "total_memory".into(),
            },
        );

        let text = report.render(Some(Path::new("/tmp/.budgeteer_1.json"))).unwrap();
        assert!(text.contains("Collected stats written on /tmp/.budgeteer_1.json"));
        assert!(text.contains("Collected a total of 10 samples (1 dropped)"));
        assert!(text.contains("test_x.py::test_a helper (util.py) +10.0 μs (50.0% of 20.0 μs)"));
        assert!(text.contains("could not check test_x.py::test_a total_memory"));
        assert!(text.contains("1 check failed"));
        assert!(!text.contains("-10.0"));
    }

    #[test]
    fn renders_no_data() {
        let report = Report::new(ProfileMode::Full, samples(0));
        let text = report.render(None).unwrap();
        assert!(text.contains("profile mode: full"));
        assert!(text.contains("No data collected."));
        assert!(!text.contains("failed"));
    }

    fn true_limit() -> crate::check::Limit {
        crate::check::Limit::Other(serde_json::Value::Bool(true))
    }
}
