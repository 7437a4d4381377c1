// Deploy Module
// Deployment orchestration: stages, progress events and per-session state

pub mod events;
pub mod state;
pub mod warnings;
pub mod workflow;

pub use events::{
    progress_channel, DeployEvent, DeployStage, EventSender, ProgressReceiver, ProgressSender,
    StageError, TrackerForwarder,
};
pub use state::{DeployIndex, DeployRun, DeploySession, DeployType};
pub use warnings::{compile_warnings, effective_image};
pub use workflow::{
    tuning_experiment_name, DeployOutcome, DeployRequest, DeployWorkflow, WorkflowConfig,
};
