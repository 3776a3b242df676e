/// Errors that can occur within the notification subsystem.
///
/// Channel adapters return these; the dispatcher converts them into
/// per-route report entries rather than letting one failure abort a batch.
///
/// # Examples
///
/// ```rust
/// use faultline_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Target or channel configuration is missing a required field or
    /// contains an invalid value.
    #[error("Notify: invalid configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// No channel instance exists for the type (e.g. SMTP never configured).
    #[error("Notify: channel '{0}' is not configured")]
    ChannelUnavailable(String),

    /// A target has no deliverable route or default for the send at hand.
    #[error("Notify: no deliverable configuration: {0}")]
    NoDeliverableRoute(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// SMTP transport error when sending email.
    #[error("Notify: SMTP error: {0}")]
    Smtp(String),

    /// JSON serialization or deserialization failed.
    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The external API accepted the request but reported an error.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },

    /// Generic notification error for cases not covered by other variants.
    #[error("Notify: {0}")]
    Other(String),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
