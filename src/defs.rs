use clap::{Parser, ValueEnum};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub type Microseconds = u64;
pub type Bytes = i64;

pub type SampleQueue = deadqueue::unlimited::Queue<String>;

pub const FRAME_CACHE_SIZE: usize = 10000;
pub const DUMP_PREFIX: &str = ".budgeteer_";

/// What the external profiler recorded for every sample.
#[derive(ValueEnum, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    /// Elapsed time only.
    #[default]
    Time,
    /// A single signed memory counter per sample.
    Memory,
    /// Time, allocations and deallocations.
    Full,
}

impl ProfileMode {
    pub fn tracks_deallocations(self) -> bool {
        self == ProfileMode::Full
    }
}

impl fmt::Display for ProfileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileMode::Time => "time",
            ProfileMode::Memory => "memory",
            ProfileMode::Full => "full",
        };
        f.write_str(name)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "Check declared time and memory budgets against sampled call stacks."
)]
pub struct Args {
    #[arg(short, long, env = "BUDGETEER_BUDGETS", help = "JSON manifest of tests and their checks.")]
    pub budgets: PathBuf,
    #[arg(
        short,
        long,
        env = "BUDGETEER_SAMPLES",
        help = "sample records, one per line. reads stdin when omitted."
    )]
    pub samples: Option<PathBuf>,
    #[arg(value_enum, short = 'm', long, env = "BUDGETEER_PROFILE_MODE", default_value_t = ProfileMode::Time)]
    pub profile_mode: ProfileMode,
    #[arg(
        short,
        long,
        env = "BUDGETEER_TIMEOUT",
        help = "stop reading samples after this many seconds."
    )]
    pub timeout: Option<u64>,
    #[arg(
        long,
        env = "BUDGETEER_GRACE_MS",
        default_value_t = 500,
        help = "how long a stopped reader may take to wind down."
    )]
    pub grace_ms: u64,
    #[arg(
        short,
        long,
        num_args = 0..=1,
        env = "BUDGETEER_DUMP",
        help = "write the aggregated call tree as json. a timestamped file is used when no path is given."
    )]
    pub dump: Option<Option<PathBuf>>,
    #[arg(value_enum, short, long, env = "BUDGETEER_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_command_line() {
        let args = Args::try_parse_from(["budgeteer", "--budgets", "checks.json"]).unwrap();
        assert_eq!(args.budgets, PathBuf::from("checks.json"));
        assert_eq!(args.profile_mode, ProfileMode::Time);
        assert!(args.samples.is_none());
        assert!(args.dump.is_none());
    }

    #[test]
    fn dump_without_a_path() {
        let args = Args::try_parse_from([
            "budgeteer",
            "--budgets",
            "checks.json",
            "--profile-mode",
            "full",
            "--dump",
        ])
        .unwrap();
        assert_eq!(args.profile_mode, ProfileMode::Full);
        assert_eq!(args.dump, Some(None));
    }

    #[test]
    fn only_full_mode_tracks_deallocations() {
        assert!(!ProfileMode::Time.tracks_deallocations());
        assert!(!ProfileMode::Memory.tracks_deallocations());
        assert!(ProfileMode::Full.tracks_deallocations());
    }
}
