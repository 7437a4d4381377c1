// Subprocess Kernel
// Runs every request in a fresh Python interpreter

use super::{Kernel, KernelReply, KernelStatus};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Kernel backed by a one-shot Python process per request
///
/// State does not survive between requests. A lock serializes requests
/// so concurrent callers queue instead of racing for the interpreter.
pub struct SubprocessKernel {
    python: PathBuf,
    working_dir: Option<PathBuf>,
    busy: Mutex<()>,
}

impl SubprocessKernel {
    /// Create a kernel with an explicit interpreter path
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            working_dir: None,
            busy: Mutex::new(()),
        }
    }

    /// Locate `python3` (or `python`) on PATH
    pub fn discover() -> Option<Self> {
        ["python3", "python"]
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .map(Self::new)
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn python(&self) -> &Path {
        &self.python
    }
}

#[async_trait::async_trait]
impl Kernel for SubprocessKernel {
    async fn execute(&self, code: &str, expression: &str) -> KernelReply {
        let _guard = self.busy.lock().await;

        let script = format!("{}\nprint(repr({}))", code, expression);

        let mut cmd = Command::new(&self.python);
        cmd.arg("-c").arg(&script);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    python = %self.python.display(),
                    error = %e,
                    "failed to spawn interpreter"
                );
                return KernelReply {
                    status: KernelStatus::Other("spawn-failed".to_string()),
                    payload: None,
                    ename: Some("SpawnError".to_string()),
                    evalue: Some(e.to_string()),
                    traceback: vec![format!(
                        "Failed to spawn '{}': {}",
                        self.python.display(),
                        e
                    )],
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let traceback: Vec<String> = stderr.lines().map(str::to_string).collect();
            let last = traceback.last().cloned().unwrap_or_default();
            let (ename, evalue) = match last.split_once(": ") {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => (last.clone(), String::new()),
            };
            return KernelReply::error(ename, evalue, traceback);
        }

        let payload = stdout.lines().last().unwrap_or_default().to_string();
        KernelReply::ok(payload)
    }
}
