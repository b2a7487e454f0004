//! Error types and non-fatal diagnostics.

use std::fmt;
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Errors that can occur while configuring or running the exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Failed to read a configuration file.
    #[error("failed to read configuration file '{path}': {source}")]
    ConfigRead {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML content.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Failed to bind the exposition listener.
    #[error("failed to bind exposition listener: {0}")]
    Bind(String),

    /// The service or exporter is not running.
    #[error("not running")]
    NotRunning,

    /// The service or exporter is already running.
    #[error("already running")]
    AlreadyRunning,
}

/// Non-fatal diagnostics emitted by the registry.
///
/// None of these terminate anything; the worst user-visible outcome is a
/// series temporarily missing from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An existing series rejected the caller's label values.
    TypeMismatch {
        /// Composite key of the series.
        key: String,
    },
    /// A live series has no configured descriptor and was skipped on collect.
    DescriptorNotFound {
        /// Composite key of the series.
        key: String,
    },
    /// A write to an undeclared metric name fell back to gauge semantics.
    UnknownKindFallback {
        /// Composite key of the series.
        key: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { key } => {
                write!(f, "series '{key}' rejected incompatible label values")
            }
            Self::DescriptorNotFound { key } => {
                write!(f, "no descriptor for live series '{key}', skipped on collect")
            }
            Self::UnknownKindFallback { key } => {
                write!(f, "no descriptor for '{key}', falling back to gauge")
            }
        }
    }
}

/// One-way channel for [`Diagnostic`]s.
///
/// Diagnostics go to the installed channel when one exists, and to the
/// log otherwise. Reporting never blocks the caller.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    tx: RwLock<Option<mpsc::UnboundedSender<Diagnostic>>>,
}

impl DiagnosticSink {
    /// Install the channel receiving future diagnostics.
    pub fn install(&self, tx: mpsc::UnboundedSender<Diagnostic>) {
        let mut guard = self.tx.write().expect("diagnostic sink lock poisoned");
        *guard = Some(tx);
    }

    /// Report one diagnostic.
    pub fn report(&self, diagnostic: Diagnostic) {
        let guard = self.tx.read().expect("diagnostic sink lock poisoned");
        if let Some(tx) = guard.as_ref() {
            match tx.send(diagnostic) {
                Ok(()) => {}
                Err(err) => warn!(diagnostic = %err.0, "diagnostic sink closed"),
            }
            return;
        }
        warn!(diagnostic = %diagnostic, "metrics diagnostic");
    }
}
