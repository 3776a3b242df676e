use crate::process::ProcessStatus;

/// Errors that can occur within the event lifecycle engine.
///
/// Validation failures (bad silence definitions, disallowed status
/// transitions) are distinct variants from not-found outcomes so callers can
/// branch on "doesn't exist" vs "bad input".
///
/// # Examples
///
/// ```rust
/// use faultline_event::error::EventError;
///
/// let err = EventError::InvalidSilence("at least one predicate is required".to_string());
/// assert!(err.to_string().contains("predicate"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Silence definition failed validation (e.g. empty predicate list).
    #[error("Event: invalid silence: {0}")]
    InvalidSilence(String),

    /// A predicate regex failed to compile. Raised at create/update time,
    /// never at match time.
    #[error("Event: invalid pattern for label '{label}': {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },

    /// The requested process-status transition is not in the allow-list.
    /// Both ends of the rejected transition are reported.
    #[error("Event: invalid status transition: current={from}, attempted={to}")]
    InvalidTransition { from: ProcessStatus, to: ProcessStatus },

    /// A required record was not found.
    #[error("Event: {entity} not found (key={key})")]
    NotFound { entity: &'static str, key: String },

    /// A lookup strategy failed while resolving a fingerprint. Cascades treat
    /// this as a miss and continue with the next strategy.
    #[error("Event: lookup strategy '{strategy}' failed: {message}")]
    LookupFailed { strategy: &'static str, message: String },
}

/// Convenience `Result` alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, EventError>;
