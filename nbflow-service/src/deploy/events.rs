// Deploy Events
// Progress reporting for deployment workflows

use crate::backend::RokTask;
use crate::deploy::state::{DeployIndex, DeployType};
use crate::poll::{StatusSink, TrackedStatus};

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for deployment progress events
pub type ProgressSender = mpsc::UnboundedSender<DeployEvent>;

/// Receiver for deployment progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<DeployEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Stages of a deployment, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStage {
    Validate,
    Snapshot,
    Compile,
    Upload,
    Run,
    Tune,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployStage::Validate => "validate",
            DeployStage::Snapshot => "snapshot",
            DeployStage::Compile => "compile",
            DeployStage::Upload => "upload",
            DeployStage::Run => "run",
            DeployStage::Tune => "tune",
        };
        f.write_str(name)
    }
}

/// How a stage failure is presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Error glyph in the stage's progress row
    Inline(String),
    /// Blocking dialog with a title and detail lines
    ///
    /// Application errors are shown by the error reporter itself, so
    /// their dialogs carry no detail lines here.
    Dialog { title: String, details: Vec<String> },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Inline(message) => f.write_str(message),
            StageError::Dialog { title, details } => {
                write!(f, "{}", title)?;
                for line in details {
                    write!(f, "\n  {}", line)?;
                }
                Ok(())
            }
        }
    }
}

/// Events emitted while a deployment runs
#[derive(Debug, Clone)]
pub enum DeployEvent {
    DeployStarted {
        index: DeployIndex,
        deploy_type: DeployType,
    },

    StageStarted {
        index: DeployIndex,
        stage: DeployStage,
    },

    StageCompleted {
        index: DeployIndex,
        stage: DeployStage,
        duration: Duration,
    },

    StageFailed {
        index: DeployIndex,
        stage: DeployStage,
        error: StageError,
    },

    /// Advisory messages that never block the deployment
    Warnings {
        index: DeployIndex,
        warnings: Vec<String>,
    },

    /// Latest state of the snapshot task
    SnapshotProgress { index: DeployIndex, task: RokTask },

    /// Observation from a run or experiment tracker
    TrackerUpdate {
        index: DeployIndex,
        status: TrackedStatus,
    },

    DeployFinished {
        index: DeployIndex,
        success: bool,
        duration: Duration,
    },
}

impl DeployEvent {
    pub fn index(&self) -> DeployIndex {
        match self {
            DeployEvent::DeployStarted { index, .. }
            | DeployEvent::StageStarted { index, .. }
            | DeployEvent::StageCompleted { index, .. }
            | DeployEvent::StageFailed { index, .. }
            | DeployEvent::Warnings { index, .. }
            | DeployEvent::SnapshotProgress { index, .. }
            | DeployEvent::TrackerUpdate { index, .. }
            | DeployEvent::DeployFinished { index, .. } => *index,
        }
    }
}

/// Fire-and-forget event emission; a closed channel is ignored
pub trait EventSender {
    fn send_event(&self, event: DeployEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: DeployEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: DeployEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

/// Forwards tracker observations into a deployment's progress channel
#[derive(Debug, Clone)]
pub struct TrackerForwarder {
    index: DeployIndex,
    progress: ProgressSender,
}

impl TrackerForwarder {
    pub fn new(index: DeployIndex, progress: ProgressSender) -> Self {
        Self { index, progress }
    }
}

impl StatusSink for TrackerForwarder {
    fn send(&self, status: TrackedStatus) -> bool {
        self.progress
            .send(DeployEvent::TrackerUpdate {
                index: self.index,
                status,
            })
            .is_ok()
    }
}
