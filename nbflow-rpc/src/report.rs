// Error Reporting
// User-facing surfaces for application errors and unhandled failures

use crate::error::{ApplicationError, RpcError, RpcResult};

use std::sync::Mutex;

/// Where RPC failures are shown to the user
///
/// `application_error` is the titled dialog raised at the call site;
/// `unhandled` is the process-wide technical-details dialog.
pub trait ErrorReporter: Send + Sync {
    fn application_error(&self, title: &str, err: &ApplicationError);

    fn unhandled(&self, err: &RpcError);
}

/// Title of the dialog shown when a call site gives none
pub const DEFAULT_ERROR_TITLE: &str = "An RPC Error has occurred";

/// Display policy for one call result
///
/// Application errors are shown under `title` and resolve to `Ok(None)`.
/// Kernel and parse errors are returned untouched for the caller to
/// propagate or hand to [`report_unhandled`].
pub fn report_application<T>(
    result: RpcResult<T>,
    title: &str,
    reporter: &dyn ErrorReporter,
) -> RpcResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RpcError::Application(err)) => {
            reporter.application_error(title, &err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Funnel an error that reached the top of a task into the reporter
pub fn report_unhandled(reporter: &dyn ErrorReporter, err: &RpcError) {
    tracing::error!(error = %err, title = err.title(), "unhandled RPC failure");
    reporter.unhandled(err);
}

/// Reporter that only emits log events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn application_error(&self, title: &str, err: &ApplicationError) {
        tracing::warn!(
            title,
            function = %err.function,
            code = err.code,
            message = %err.message,
            details = err.details.as_deref().unwrap_or(""),
            "backend reported an error"
        );
    }

    fn unhandled(&self, err: &RpcError) {
        tracing::error!(details = ?err.details(), "{}", err.title());
    }
}

/// A report captured by [`RecordingReporter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Application { title: String, error: ApplicationError },
    Unhandled { title: String, details: Vec<String> },
}

/// Reporter that keeps every report in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().map(|r| r.is_empty()).unwrap_or(true)
    }

    fn push(&self, report: Report) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}

impl ErrorReporter for RecordingReporter {
    fn application_error(&self, title: &str, err: &ApplicationError) {
        self.push(Report::Application {
            title: title.to_string(),
            error: err.clone(),
        });
    }

    fn unhandled(&self, err: &RpcError) {
        self.push(Report::Unhandled {
            title: err.title().to_string(),
            details: err.details(),
        });
    }
}
