// Scripted Kernel
// Deterministic in-memory kernel replaying queued replies

use super::{Kernel, KernelReply};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Kernel that answers from a queue of prepared replies
///
/// Replies can be queued globally (consumed in order) or per backend
/// function, matched against the function name found in the code string.
/// Every executed code string is recorded.
#[derive(Debug, Default)]
pub struct ScriptedKernel {
    queue: Mutex<VecDeque<KernelReply>>,
    by_function: Mutex<HashMap<String, VecDeque<KernelReply>>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw reply
    pub fn push_reply(&self, reply: KernelReply) -> &Self {
        lock(&self.queue).push_back(reply);
        self
    }

    /// Queue a successful backend result
    pub fn push_result(&self, result: Value) -> &Self {
        self.push_reply(KernelReply::ok(envelope_payload(0, result, None)))
    }

    /// Queue a backend application error
    pub fn push_app_error(&self, code: i64, message: &str) -> &Self {
        self.push_reply(KernelReply::ok(envelope_payload(code, Value::Null, Some(message))))
    }

    /// Queue a reply for a specific backend function
    pub fn on(&self, function: &str, reply: KernelReply) -> &Self {
        lock(&self.by_function)
            .entry(function.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a successful result for a specific backend function
    pub fn on_result(&self, function: &str, result: Value) -> &Self {
        self.on(function, KernelReply::ok(envelope_payload(0, result, None)))
    }

    /// Queue an application error for a specific backend function
    pub fn on_app_error(&self, function: &str, code: i64, message: &str) -> &Self {
        self.on(
            function,
            KernelReply::ok(envelope_payload(code, Value::Null, Some(message))),
        )
    }

    /// Number of execute calls received so far
    pub fn calls(&self) -> usize {
        lock(&self.executed).len()
    }

    /// Code strings executed so far
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    /// Number of executions that invoked `function`
    pub fn calls_to(&self, function: &str) -> usize {
        let needle = quoted(function);
        lock(&self.executed)
            .iter()
            .filter(|code| code.contains(&needle))
            .count()
    }

    /// Keyword arguments of every call to `function`, oldest first
    pub fn kwargs_for(&self, function: &str) -> Vec<Value> {
        let needle = quoted(function);
        lock(&self.executed)
            .iter()
            .filter(|code| code.contains(&needle))
            .filter_map(|code| decode_kwargs(code))
            .collect()
    }

    fn next_reply(&self, code: &str) -> KernelReply {
        {
            let mut by_function = lock(&self.by_function);
            for (function, replies) in by_function.iter_mut() {
                if code.contains(&quoted(function)) {
                    if let Some(reply) = replies.pop_front() {
                        return reply;
                    }
                }
            }
        }

        lock(&self.queue).pop_front().unwrap_or_else(|| {
            KernelReply::error(
                "RuntimeError",
                "no scripted reply left",
                vec!["ScriptedKernel ran out of replies".to_string()],
            )
        })
    }
}

#[async_trait::async_trait]
impl Kernel for ScriptedKernel {
    async fn execute(&self, code: &str, _expression: &str) -> KernelReply {
        lock(&self.executed).push(code.to_string());
        self.next_reply(code)
    }
}

/// Encode a backend envelope the way the kernel would print it
pub fn envelope_payload(code: i64, result: Value, message: Option<&str>) -> String {
    let envelope = json!({
        "code": code,
        "result": result,
        "err_message": message,
        "err_details": null,
        "err_cls": null,
        "trans_id": null,
    });
    format!("'{}'", STANDARD.encode(envelope.to_string()))
}

/// The kwargs payload is the first single-quoted literal of the code string
fn decode_kwargs(code: &str) -> Option<Value> {
    let encoded = code.split('\'').nth(1)?;
    let bytes = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// The function name literal as embedded by `RpcRequest::to_code`
fn quoted(function: &str) -> String {
    serde_json::to_string(function).unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
