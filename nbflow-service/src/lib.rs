// nbflow Service Library
// Step tag graph maintenance and notebook deployment orchestration

pub mod backend;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod notebook;
pub mod poll;
pub mod settings;
pub mod tags;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};
pub use settings::Settings;

// Re-export tag and graph types
pub use graph::{
    check_document, closest_prior_step, list_all_step_names, rename, CellRole, DocumentIssue,
    GraphError, StepDag, StepIndex,
};
pub use tags::{decode, encode, StepTag, StepTags};

// Re-export notebook types
pub use notebook::{CellId, NotebookDocument, NotebookError, NotebookHost, NotebookMetadata};

// Re-export deployment types
pub use backend::{Backend, Environment, ResumedExploration, RpcFunction};
pub use deploy::{
    progress_channel, DeployEvent, DeployOutcome, DeployRequest, DeploySession, DeployStage,
    DeployType, DeployWorkflow, ProgressSender, WorkflowConfig,
};
pub use poll::{spawn_tracker, PollHandle, TrackedStatus, TrackerOutcome, TrackerSpec};
