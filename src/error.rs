use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A raw record that could not be turned into a [`crate::structs::Sample`].
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("malformed limit {limit:?}: {reason}")]
    MalformedLimit { limit: String, reason: String },

    #[error("unsupported limit type {kind} for {check} check")]
    UnsupportedLimitType { kind: String, check: String },

    #[error("function {function} occurs in many modules matching {module:?}: {matches:?}")]
    AmbiguousModuleMatch {
        function: String,
        module: String,
        matches: Vec<String>,
    },

    #[error("profiling data is still being collected")]
    NotFrozen,

    #[error("profiling data is frozen, start a new session")]
    Frozen,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Template(#[from] tera::Error),
}

impl Error {
    pub fn invalid_sample(record: &str, reason: &str) -> Self {
        Error::InvalidSample(format!("{reason} in {record:?}"))
    }

    pub fn malformed_limit(limit: &str, reason: impl Into<String>) -> Self {
        Error::MalformedLimit {
            limit: limit.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors caused by a broken budget declaration rather than by the code
    /// being measured.
    pub fn is_limit_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedLimit { .. } | Error::UnsupportedLimitType { .. }
        )
    }
}
