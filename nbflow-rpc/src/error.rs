// RPC error taxonomy
// Kernel failures, undecodable payloads and backend application errors

use std::fmt;

use thiserror::Error;

pub type RpcResult<T> = Result<T, RpcError>;

/// Status codes returned by the backend in the response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    ImportError,
    EncodingError,
    NotFound,
    InternalError,
    ServiceUnavailable,
    /// Any code the client does not know; the raw value is kept
    Unhandled(i64),
}

impl ErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ErrorCode::Ok,
            1 => ErrorCode::ImportError,
            2 => ErrorCode::EncodingError,
            3 => ErrorCode::NotFound,
            4 => ErrorCode::InternalError,
            5 => ErrorCode::ServiceUnavailable,
            other => ErrorCode::Unhandled(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::ImportError => 1,
            ErrorCode::EncodingError => 2,
            ErrorCode::NotFound => 3,
            ErrorCode::InternalError => 4,
            ErrorCode::ServiceUnavailable => 5,
            ErrorCode::Unhandled(code) => *code,
        }
    }

    /// Human-readable name used in error dialogs
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::ImportError => "ImportError",
            ErrorCode::EncodingError => "EncodingError",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::ServiceUnavailable => "ServiceUnavailable",
            ErrorCode::Unhandled(_) => "UnhandledError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Error reported by the backend through a non-zero envelope code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationError {
    pub function: String,
    pub code: i64,
    pub message: String,
    pub details: Option<String>,
    pub class_name: Option<String>,
    pub transaction_id: Option<String>,
}

impl ApplicationError {
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }

    /// Lines shown in the user-facing error dialog
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Function: {}", self.function),
            format!("Code: {}", self.error_code()),
            format!("Message: {}", self.message),
        ];
        if let Some(details) = &self.details {
            lines.push(format!("Details: {}", details));
        }
        if let Some(trans_id) = &self.transaction_id {
            lines.push(format!("Transaction ID: {}", trans_id));
        }
        lines
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed with {}: {}",
            self.function,
            self.error_code(),
            self.message
        )?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Errors raised while calling into the kernel
#[derive(Debug, Error)]
pub enum RpcError {
    /// The execution itself failed or was aborted
    #[error("kernel error while running {function}: status '{status}'")]
    Kernel {
        function: String,
        status: String,
        traceback: Vec<String>,
    },

    /// The payload was not valid base64-encoded JSON
    #[error("failed to parse response of {function}: {reason}")]
    ResponseParse {
        function: String,
        payload: String,
        reason: String,
    },

    #[error("{0}")]
    Application(ApplicationError),

    /// Anything not raised by the RPC stack itself
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl RpcError {
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// True when the kernel dropped the request because it was busy
    pub fn is_busy(&self) -> bool {
        matches!(self, RpcError::Kernel { status, .. } if status == "aborted")
    }

    pub fn as_application(&self) -> Option<&ApplicationError> {
        match self {
            RpcError::Application(err) => Some(err),
            _ => None,
        }
    }

    /// Title used when the error is surfaced to the user
    pub fn title(&self) -> &'static str {
        match self {
            RpcError::Kernel { .. } => "Kernel failure",
            RpcError::ResponseParse { .. } => "Failed to parse server response",
            RpcError::Application(_) => "An error has occurred",
            RpcError::Unexpected(_) => "Unexpected error",
        }
    }

    /// Technical details for the generic error dialog
    pub fn details(&self) -> Vec<String> {
        match self {
            RpcError::Kernel {
                function,
                status,
                traceback,
            } => {
                let mut lines = vec![
                    format!("Function: {}", function),
                    format!("Status: {}", status),
                ];
                lines.extend(traceback.iter().cloned());
                lines
            }
            RpcError::ResponseParse {
                function,
                payload,
                reason,
            } => vec![
                format!("Function: {}", function),
                format!("Reason: {}", reason),
                format!("Payload: {}", payload),
            ],
            RpcError::Application(err) => err.summary_lines(),
            RpcError::Unexpected(msg) => vec![msg.clone()],
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Unexpected(err.to_string())
    }
}
