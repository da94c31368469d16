//! Error types for inbox-monitor.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox credential resolution errors.
///
/// `Unavailable` is the only hard-stop error in the crate: an
/// unauthenticated mailbox client is unsafe to run, so ingestion halts
/// rather than silently falling back. It never affects aggregation.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No usable mailbox credentials: {tried}")]
    Unavailable { tried: String },
}

/// Mail provider errors (listing/fetching from the mailbox).
///
/// Per-message decode failures are NOT errors — they are counted and the
/// batch continues. Only whole-batch failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Message listing failed: {reason}")]
    ListFailed { reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Backend source errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Expected condition that drives the fallback chain — the backend is
    /// down, slow, unauthorized, or not configured. Logged as an
    /// informational skip, never as an error.
    #[error("Source {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    /// The backend answered with a shape the adapter does not recognize.
    /// Drives fallback like `Unavailable`, but logged at warn since it may
    /// indicate a contract break.
    #[error("Source {name} returned an unexpected schema: {detail}")]
    Protocol { name: String, detail: String },
}

impl SourceError {
    /// Build an `Unavailable` from any transport-level failure.
    pub fn unavailable(name: &str, reason: impl ToString) -> Self {
        Self::Unavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build a `Protocol` from a schema mismatch.
    pub fn protocol(name: &str, detail: impl ToString) -> Self {
        Self::Protocol {
            name: name.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Source name this error refers to.
    pub fn source_name(&self) -> &str {
        match self {
            Self::Unavailable { name, .. } | Self::Protocol { name, .. } => name,
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
