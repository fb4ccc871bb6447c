//! Failure reporting.
//!
//! When a bootstrap fails the shell turns the error into a [`FailureReport`], hands it
//! to a [`FailureReporter`] and keeps a copy. Nothing propagates past the shell.

use std::error::Error as _;
use std::fmt;

use crate::bootstrap::BootstrapState;
use crate::error::{BootstrapError, ErrorKind};

/// A captured bootstrap failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureReport {
    /// Stage that was running when the failure happened.
    pub stage: BootstrapState,
    pub kind: ErrorKind,
    /// Top-level description.
    pub message: String,
    /// Underlying causes, outermost first.
    pub causes: Vec<String>,
}

impl FailureReport {
    pub fn new(stage: BootstrapState, error: &BootstrapError) -> Self {
        let message = error.to_string();
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            // Transparent variants repeat their inner error verbatim.
            if text != message && causes.last() != Some(&text) {
                causes.push(text);
            }
            source = cause.source();
        }

        Self {
            stage,
            kind: error.kind(),
            message,
            causes,
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bootstrap failed while {}: {}", self.stage, self.message)?;
        for cause in &self.causes {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Receives failure reports from the shell.
pub trait FailureReporter {
    fn report(&mut self, report: &FailureReport);
}

/// Logs failures through `tracing` at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&mut self, report: &FailureReport) {
        tracing::error!(
            stage = %report.stage,
            kind = ?report.kind,
            causes = ?report.causes,
            "bootstrap failed: {}",
            report.message
        );
    }
}

impl<F: FnMut(&FailureReport)> FailureReporter for F {
    fn report(&mut self, report: &FailureReport) {
        self(report)
    }
}
