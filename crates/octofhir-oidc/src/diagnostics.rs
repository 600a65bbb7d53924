//! Diagnostics sink.
//!
//! The engine reports expected rejections and non-fatal anomalies here
//! instead of failing. Emitting is synchronous and must not block.

/// Severity channel of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticLevel {
    /// Expected protocol rejections (unknown code, wrong kind, expired ticket).
    Verbose,
    /// Non-fatal anomalies (several presenters embedded into one token).
    Warning,
    /// Unexpected faults that were contained (misconfigured verification key).
    Error,
}

/// Receives engine diagnostics.
pub trait Diagnostics: Send + Sync {
    /// Records a diagnostic message.
    fn emit(&self, level: DiagnosticLevel, message: &str);

    /// Records a verbose message.
    fn verbose(&self, message: &str) {
        self.emit(DiagnosticLevel::Verbose, message);
    }

    /// Records a warning.
    fn warning(&self, message: &str) {
        self.emit(DiagnosticLevel::Warning, message);
    }

    /// Records an error.
    fn error(&self, message: &str) {
        self.emit(DiagnosticLevel::Error, message);
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, level: DiagnosticLevel, message: &str) {
        match level {
            DiagnosticLevel::Verbose => tracing::debug!("{}", message),
            DiagnosticLevel::Warning => tracing::warn!("{}", message),
            DiagnosticLevel::Error => tracing::error!("{}", message),
        }
    }
}
