// Kernel Module
// Execution targets that RPC code strings are submitted to

pub mod scripted;
pub mod subprocess;

pub use scripted::ScriptedKernel;
pub use subprocess::SubprocessKernel;

/// Status reported by a kernel for one execution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelStatus {
    Ok,
    Error,
    /// The kernel was busy with a prior request and dropped this one
    Aborted,
    Other(String),
}

impl KernelStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "ok" => KernelStatus::Ok,
            "error" => KernelStatus::Error,
            "aborted" => KernelStatus::Aborted,
            other => KernelStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KernelStatus::Ok => "ok",
            KernelStatus::Error => "error",
            KernelStatus::Aborted => "aborted",
            KernelStatus::Other(s) => s,
        }
    }
}

/// Reply to an execution request
#[derive(Debug, Clone, PartialEq)]
pub struct KernelReply {
    pub status: KernelStatus,
    /// Text representation of the requested expression, when it evaluated
    pub payload: Option<String>,
    pub ename: Option<String>,
    pub evalue: Option<String>,
    pub traceback: Vec<String>,
}

impl KernelReply {
    pub fn ok(payload: impl Into<String>) -> Self {
        Self {
            status: KernelStatus::Ok,
            payload: Some(payload.into()),
            ename: None,
            evalue: None,
            traceback: Vec::new(),
        }
    }

    pub fn error(
        ename: impl Into<String>,
        evalue: impl Into<String>,
        traceback: Vec<String>,
    ) -> Self {
        Self {
            status: KernelStatus::Error,
            payload: None,
            ename: Some(ename.into()),
            evalue: Some(evalue.into()),
            traceback,
        }
    }

    pub fn aborted() -> Self {
        Self {
            status: KernelStatus::Aborted,
            payload: None,
            ename: None,
            evalue: None,
            traceback: Vec::new(),
        }
    }
}

/// A live process that executes code strings
///
/// Implementations are expected to serialize inbound requests and report
/// [`KernelStatus::Aborted`] for requests that arrive while busy.
#[async_trait::async_trait]
pub trait Kernel: Send + Sync {
    /// Execute `code` and evaluate `expression` afterwards
    async fn execute(&self, code: &str, expression: &str) -> KernelReply;
}
