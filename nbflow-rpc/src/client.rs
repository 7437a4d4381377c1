// RPC Client
// Executes backend functions inside a kernel and classifies the outcome

use crate::envelope::{
    decode_response, RpcContext, RpcRequest, DEFAULT_ENTRY_MODULE, RESULT_VARIABLE,
};
use crate::error::{RpcError, RpcResult};
use crate::kernel::{Kernel, KernelStatus};
use crate::report::{report_application, ErrorReporter, DEFAULT_ERROR_TITLE};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Python module exposing the backend `run` entry point
    pub entry_module: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            entry_module: DEFAULT_ENTRY_MODULE.to_string(),
        }
    }
}

/// Client for backend functions reachable through a kernel
#[derive(Clone)]
pub struct RpcClient {
    kernel: Arc<dyn Kernel>,
    config: RpcConfig,
}

impl RpcClient {
    pub fn new(kernel: Arc<dyn Kernel>) -> Self {
        Self {
            kernel,
            config: RpcConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Run a request once, without retrying on a busy kernel
    pub async fn execute_once(&self, request: &RpcRequest) -> RpcResult<Value> {
        let code = request.to_code(&self.config.entry_module)?;
        let reply = self.kernel.execute(&code, RESULT_VARIABLE).await;

        if reply.status != KernelStatus::Ok {
            let mut traceback = reply.traceback;
            if traceback.is_empty() {
                if let (Some(ename), Some(evalue)) = (&reply.ename, &reply.evalue) {
                    traceback.push(format!("{}: {}", ename, evalue));
                }
            }
            return Err(RpcError::Kernel {
                function: request.function.clone(),
                status: reply.status.as_str().to_string(),
                traceback,
            });
        }

        let payload = reply.payload.ok_or_else(|| RpcError::ResponseParse {
            function: request.function.clone(),
            payload: String::new(),
            reason: "kernel returned no value for the result expression".to_string(),
        })?;

        decode_response(&request.function, &payload)?.into_result(&request.function)
    }

    /// Run a request, retrying immediately for as long as the kernel is busy
    pub async fn call(&self, request: &RpcRequest) -> RpcResult<Value> {
        let mut attempt: u64 = 1;
        loop {
            match self.execute_once(request).await {
                Err(err) if err.is_busy() => {
                    tracing::debug!(
                        function = %request.function,
                        attempt,
                        "kernel busy, retrying"
                    );
                    attempt += 1;
                }
                other => {
                    if let Err(err) = &other {
                        tracing::debug!(
                            function = %request.function,
                            attempt,
                            error = %err,
                            "rpc call failed"
                        );
                    }
                    return other;
                }
            }
        }
    }

    /// Call a backend function by name
    pub async fn invoke(
        &self,
        function: &str,
        kwargs: Value,
        context: RpcContext,
    ) -> RpcResult<Value> {
        let request = RpcRequest::new(function, kwargs).with_context(context);
        self.call(&request).await
    }

    /// Call a backend function and deserialize its result
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        function: &str,
        kwargs: Value,
        context: RpcContext,
    ) -> RpcResult<T> {
        let value = self.invoke(function, kwargs, context).await?;
        serde_json::from_value(value).map_err(|e| RpcError::ResponseParse {
            function: function.to_string(),
            payload: String::new(),
            reason: format!("unexpected result shape: {}", e),
        })
    }

    /// Call and surface application errors to the user instead of returning them
    ///
    /// Application errors resolve to `Ok(None)` after being reported.
    /// Kernel and parse errors still propagate.
    pub async fn invoke_or_report<T: DeserializeOwned>(
        &self,
        function: &str,
        kwargs: Value,
        context: RpcContext,
        reporter: &dyn ErrorReporter,
    ) -> RpcResult<Option<T>> {
        let result = self.invoke_as(function, kwargs, context).await;
        report_application(result, DEFAULT_ERROR_TITLE, reporter)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelReply, ScriptedKernel};
    use crate::report::{RecordingReporter, Report};
    use serde_json::json;

    fn client_with(kernel: Arc<ScriptedKernel>) -> RpcClient {
        RpcClient::new(kernel)
    }

    #[tokio::test]
    async fn test_busy_kernel_is_retried_until_success() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.push_reply(KernelReply::aborted());
        kernel.push_reply(KernelReply::aborted());
        kernel.push_result(json!({"namespace": "kubeflow-user"}));

        let client = client_with(kernel.clone());
        let result = client
            .invoke("nb.get_namespace", json!({}), RpcContext::default())
            .await
            .unwrap();

        assert_eq!(result, json!({"namespace": "kubeflow-user"}));
        assert_eq!(kernel.calls(), 3);
    }

    #[tokio::test]
    async fn test_kernel_error_is_not_retried() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.push_reply(KernelReply::error(
            "ModuleNotFoundError",
            "No module named 'kale'",
            vec!["Traceback (most recent call last):".to_string()],
        ));
        kernel.push_result(json!(true));

        let client = client_with(kernel.clone());
        let err = client
            .invoke("nb.validate_notebook", json!({}), RpcContext::default())
            .await
            .unwrap_err();

        match err {
            RpcError::Kernel {
                function, status, ..
            } => {
                assert_eq!(function, "nb.validate_notebook");
                assert_eq!(status, "error");
            }
            other => panic!("expected kernel error, got {:?}", other),
        }
        assert_eq!(kernel.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_spawn_is_not_retried() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.push_reply(KernelReply {
            status: KernelStatus::Other("spawn-failed".to_string()),
            payload: None,
            ename: Some("SpawnError".to_string()),
            evalue: Some("No such file or directory".to_string()),
            traceback: Vec::new(),
        });
        kernel.push_result(json!(true));

        let client = client_with(kernel.clone());
        let err = client
            .invoke("nb.validate_notebook", json!({}), RpcContext::default())
            .await
            .unwrap_err();

        assert!(!err.is_busy());
        match err {
            RpcError::Kernel {
                status, traceback, ..
            } => {
                assert_eq!(status, "spawn-failed");
                assert_eq!(traceback, vec!["SpawnError: No such file or directory"]);
            }
            other => panic!("expected kernel error, got {:?}", other),
        }
        assert_eq!(kernel.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_json_payload_is_parse_error() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.push_reply(KernelReply::ok("'this is not an envelope'"));

        let client = client_with(kernel);
        let err = client
            .invoke("nb.list_volumes", json!({}), RpcContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::ResponseParse { .. }));
    }

    #[tokio::test]
    async fn test_non_zero_code_is_application_error() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.push_app_error(3, "run not found");

        let client = client_with(kernel);
        let err = client
            .invoke("kfp.get_run", json!({"run_id": "r1"}), RpcContext::default())
            .await
            .unwrap_err();

        let app = err.as_application().unwrap();
        assert_eq!(app.code, 3);
        assert_eq!(app.message, "run not found");
    }

    #[tokio::test]
    async fn test_reporting_call_swallows_application_errors_only() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.push_app_error(4, "boom");
        kernel.push_reply(KernelReply::ok("'%%%'"));

        let client = client_with(kernel);
        let reporter = RecordingReporter::new();

        let first: Option<Value> = client
            .invoke_or_report(
                "nb.compile_notebook",
                json!({}),
                RpcContext::default(),
                &reporter,
            )
            .await
            .unwrap();
        assert!(first.is_none());

        let second: RpcResult<Option<Value>> = client
            .invoke_or_report(
                "nb.compile_notebook",
                json!({}),
                RpcContext::default(),
                &reporter,
            )
            .await;
        assert!(matches!(second, Err(RpcError::ResponseParse { .. })));

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            &reports[0],
            Report::Application { title, error } if error.code == 4 && title == DEFAULT_ERROR_TITLE
        ));
    }

    #[tokio::test]
    async fn test_result_shape_mismatch_is_parse_error() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.push_result(json!("not a number"));

        let client = client_with(kernel);
        let err = client
            .invoke_as::<u32>("nb.get_namespace", json!({}), RpcContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::ResponseParse { .. }));
    }
}
