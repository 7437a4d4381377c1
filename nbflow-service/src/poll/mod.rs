// Long-poll Trackers
// Background tasks that follow a run or tuning experiment until it settles

use crate::backend::{Backend, KatibExperiment, RunInfo};

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default interval between run status polls
pub const RUN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default interval between tuning experiment polls
pub const EXPERIMENT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What a tracker follows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerTarget {
    Run { run_id: String },
    Experiment { name: String, namespace: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSpec {
    pub target: TrackerTarget,
    pub interval: Duration,
}

impl TrackerSpec {
    pub fn run(run_id: impl Into<String>) -> Self {
        Self {
            target: TrackerTarget::Run {
                run_id: run_id.into(),
            },
            interval: RUN_POLL_INTERVAL,
        }
    }

    pub fn experiment(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            target: TrackerTarget::Experiment {
                name: name.into(),
                namespace: namespace.into(),
            },
            interval: EXPERIMENT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// One observation made by a tracker
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedStatus {
    Run(RunInfo),
    Experiment(KatibExperiment),
    /// The status call failed; the tracker stops after sending this
    Error(String),
}

impl TrackedStatus {
    /// Whether polling should stop after this observation
    pub fn is_terminal(&self) -> bool {
        match self {
            TrackedStatus::Run(run) => !matches!(run.status.as_deref(), None | Some("Running")),
            TrackedStatus::Experiment(exp) => {
                matches!(exp.status.as_deref(), Some("Succeeded") | Some("Failed"))
            }
            TrackedStatus::Error(_) => true,
        }
    }
}

/// Receives every observation in order
///
/// Returning `false` means nobody is listening any more and the tracker
/// stops.
pub trait StatusSink: Send + 'static {
    fn send(&self, status: TrackedStatus) -> bool;
}

impl StatusSink for mpsc::UnboundedSender<TrackedStatus> {
    fn send(&self, status: TrackedStatus) -> bool {
        mpsc::UnboundedSender::send(self, status).is_ok()
    }
}

/// How a tracker ended
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOutcome {
    /// A terminal status was observed
    Finished { status: TrackedStatus, polls: u32 },
    /// The status call failed
    Failed { error: String, polls: u32 },
    /// Cancelled through its handle
    Cancelled { polls: u32 },
    /// The sink went away
    Detached { polls: u32 },
}

/// Handle to a running tracker
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    handle: JoinHandle<TrackerOutcome>,
}

impl PollHandle {
    /// Stop the tracker at its next suspension point
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the tracker to end
    pub async fn join(self) -> TrackerOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => TrackerOutcome::Failed {
                error: e.to_string(),
                polls: 0,
            },
        }
    }
}

/// Start following `spec` in the background
pub fn spawn_tracker<S: StatusSink>(backend: Backend, spec: TrackerSpec, sink: S) -> PollHandle {
    let token = CancellationToken::new();
    let handle = tokio::spawn(track(backend, spec, sink, token.clone()));
    PollHandle { token, handle }
}

async fn track<S: StatusSink>(
    backend: Backend,
    spec: TrackerSpec,
    sink: S,
    token: CancellationToken,
) -> TrackerOutcome {
    let mut polls: u32 = 0;

    loop {
        let status = tokio::select! {
            _ = token.cancelled() => return TrackerOutcome::Cancelled { polls },
            status = poll_once(&backend, &spec.target) => status,
        };
        polls += 1;
        tracing::debug!(tracked = ?spec.target, polls, status = ?status, "tracker poll");

        let terminal = status.is_terminal();
        if !sink.send(status.clone()) {
            return TrackerOutcome::Detached { polls };
        }
        if terminal {
            return match status {
                TrackedStatus::Error(error) => {
                    tracing::warn!(
                        tracked = ?spec.target,
                        error = %error,
                        "tracker stopped on error"
                    );
                    TrackerOutcome::Failed { error, polls }
                }
                status => TrackerOutcome::Finished { status, polls },
            };
        }

        tokio::select! {
            _ = token.cancelled() => return TrackerOutcome::Cancelled { polls },
            _ = tokio::time::sleep(spec.interval) => {}
        }
    }
}

async fn poll_once(backend: &Backend, target: &TrackerTarget) -> TrackedStatus {
    let result = match target {
        TrackerTarget::Run { run_id } => backend.get_run(run_id).await.map(TrackedStatus::Run),
        TrackerTarget::Experiment { name, namespace } => backend
            .get_katib_experiment(name, namespace)
            .await
            .map(TrackedStatus::Experiment),
    };
    result.unwrap_or_else(|e| TrackedStatus::Error(e.to_string()))
}
