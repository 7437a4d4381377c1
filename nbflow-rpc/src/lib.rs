// nbflow RPC layer
// Calls backend functions by executing generated code inside a kernel

pub mod client;
pub mod envelope;
pub mod error;
pub mod kernel;
pub mod report;

pub use client::{RpcClient, RpcConfig};
pub use envelope::{RpcContext, RpcRequest};
pub use error::{ApplicationError, ErrorCode, RpcError, RpcResult};
pub use kernel::{Kernel, KernelReply, KernelStatus, ScriptedKernel, SubprocessKernel};
pub use report::{
    report_application, report_unhandled, ErrorReporter, RecordingReporter, Report,
    TracingReporter, DEFAULT_ERROR_TITLE,
};
