use std::fmt;

use crate::template::TemplateError;

/// A single failure recorded during a publish run.
///
/// The variant determines how much work the failure cancels:
/// - `Template` / `Config` / `Connection` → the whole target is skipped
/// - `Upload` / `Cancelled` → only that artifact; siblings are still attempted
#[derive(Debug)]
pub enum PublishError {
    /// A templated field could not be rendered.
    Template {
        target: String,
        field: &'static str,
        source: TemplateError,
    },
    /// Unknown provider, empty bucket, malformed endpoint.
    Configuration { target: String, message: String },
    /// Backend unreachable, auth rejected, or the handle failed to close.
    Connection {
        target: String,
        source: anyhow::Error,
    },
    /// One artifact failed to transfer.
    Upload {
        target: String,
        key: String,
        source: anyhow::Error,
    },
    /// The run was cancelled before this artifact was attempted.
    Cancelled { target: String, key: String },
}

impl PublishError {
    /// Identity of the target this failure belongs to.
    pub fn target(&self) -> &str {
        match self {
            Self::Template { target, .. }
            | Self::Configuration { target, .. }
            | Self::Connection { target, .. }
            | Self::Upload { target, .. }
            | Self::Cancelled { target, .. } => target,
        }
    }

    /// Mistakes in the release configuration. Re-running won't help.
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Template { .. } | Self::Configuration { .. })
    }

    /// Failures that may succeed on a later run (network, backend, timeout).
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Upload { .. } | Self::Cancelled { .. }
        )
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template {
                target,
                field,
                source,
            } => write!(f, "{target}: template error in {field}: {source}"),
            Self::Configuration { target, message } => {
                write!(f, "{target}: configuration error: {message}")
            }
            Self::Connection { target, source } => {
                write!(f, "{target}: connection error: {source:#}")
            }
            Self::Upload {
                target,
                key,
                source,
            } => write!(f, "{target}: upload of {key} failed: {source:#}"),
            Self::Cancelled { target, key } => {
                write!(f, "{target}: upload of {key} cancelled")
            }
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Template { source, .. } => Some(source),
            Self::Connection { source, .. } | Self::Upload { source, .. } => Some(source.as_ref()),
            Self::Configuration { .. } | Self::Cancelled { .. } => None,
        }
    }
}

/// Every failure from one publish run.
///
/// Returned only when at least one target or artifact failed. The individual
/// errors keep their variants so callers can tell a typo in the bucket template
/// apart from a flaky endpoint.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<PublishError>,
}

impl AggregateError {
    pub const fn new(errors: Vec<PublishError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[PublishError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<PublishError> {
        self.errors
    }

    pub const fn len(&self) -> usize {
        self.errors.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors belonging to one target, in the order they were recorded.
    pub fn for_target<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a PublishError> {
        self.errors.iter().filter(move |e| e.target() == target)
    }

    /// `Ok(())` for an empty aggregate, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publish failed with {} error(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
