// RPC Envelope
// Request serialization into kernel code and response envelope decoding

use crate::error::{ApplicationError, RpcError, RpcResult};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variable the backend result is bound to inside the kernel
pub const RESULT_VARIABLE: &str = "__nbflow_rpc_result";

/// Python module exposing the backend `run` entry point
pub const DEFAULT_ENTRY_MODULE: &str = "kale.rpc.run";

/// Context sent alongside every call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcContext {
    /// Path of the notebook the call is made for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nb_path: Option<String>,
}

impl RpcContext {
    pub fn for_notebook(path: impl Into<String>) -> Self {
        Self {
            nb_path: Some(path.into()),
        }
    }
}

/// A single call into the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub function: String,
    pub kwargs: Value,
    pub context: RpcContext,
}

impl RpcRequest {
    pub fn new(function: impl Into<String>, kwargs: Value) -> Self {
        Self {
            function: function.into(),
            kwargs,
            context: RpcContext::default(),
        }
    }

    pub fn with_context(mut self, context: RpcContext) -> Self {
        self.context = context;
        self
    }

    /// Build the code string executed in the kernel
    pub fn to_code(&self, entry_module: &str) -> RpcResult<String> {
        let kwargs = encode_payload(&self.kwargs)?;
        let context = encode_payload(&self.context)?;
        // A JSON string literal is also a valid Python string literal
        let function = serde_json::to_string(&self.function)?;

        Ok(format!(
            "from {module} import run as __nbflow_rpc_run\n\
             {var} = __nbflow_rpc_run({function}, '{kwargs}', '{context}')",
            module = entry_module,
            var = RESULT_VARIABLE,
            function = function,
            kwargs = kwargs,
            context = context,
        ))
    }
}

/// Response envelope produced by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    pub code: i64,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub err_message: Option<String>,
    #[serde(default)]
    pub err_details: Option<String>,
    #[serde(default)]
    pub err_cls: Option<String>,
    #[serde(default)]
    pub trans_id: Option<Value>,
}

impl ResponseEnvelope {
    /// Split the envelope into its result or an application error
    pub fn into_result(self, function: &str) -> RpcResult<Value> {
        if self.code == 0 {
            return Ok(self.result);
        }

        let transaction_id = self.trans_id.and_then(|id| match id {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });

        Err(RpcError::Application(ApplicationError {
            function: function.to_string(),
            code: self.code,
            message: self.err_message.unwrap_or_default(),
            details: self.err_details,
            class_name: self.err_cls,
            transaction_id,
        }))
    }
}

/// JSON-serialize a value and base64 encode it
pub fn encode_payload<T: Serialize>(value: &T) -> RpcResult<String> {
    let json = serde_json::to_vec(value)?;
    Ok(STANDARD.encode(json))
}

/// Decode the text the kernel returned for the result expression
pub fn decode_response(function: &str, payload: &str) -> RpcResult<ResponseEnvelope> {
    let parse_error = |reason: String| RpcError::ResponseParse {
        function: function.to_string(),
        payload: payload.to_string(),
        reason,
    };

    let encoded = strip_repr_quotes(payload.trim());
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| parse_error(format!("invalid base64: {}", e)))?;

    serde_json::from_slice(&bytes).map_err(|e| parse_error(format!("invalid JSON: {}", e)))
}

/// The kernel reports a Python string as its repr, e.g. `'abc'`
fn strip_repr_quotes(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}
