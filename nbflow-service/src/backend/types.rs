// Backend Types
// Result shapes returned by backend functions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// File name of the human-readable script written next to a compiled package
pub const SCRIPT_FILE_NAME: &str = "kale.py";

/// Output of `nb.compile_notebook`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPipeline {
    pub pipeline_package_path: String,
    #[serde(default)]
    pub pipeline_metadata: Value,
}

impl CompiledPipeline {
    /// Script generated alongside the package
    pub fn script_path(&self) -> PathBuf {
        Path::new(&self.pipeline_package_path).with_file_name(SCRIPT_FILE_NAME)
    }

    /// Name of the compiled pipeline, if the metadata carries one
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_metadata.get("pipeline_name")?.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRef {
    #[serde(default, rename = "pipelineid")]
    pub pipeline_id: String,
    #[serde(default, rename = "versionid")]
    pub version_id: String,
    #[serde(default)]
    pub name: String,
}

/// Output of `kfp.upload_pipeline`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPipeline {
    #[serde(default)]
    pub already_exists: bool,
    #[serde(default)]
    pub pipeline: PipelineRef,
}

/// A pipeline run as reported by `kfp.run_pipeline` and `kfp.get_run`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// A pipeline experiment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A hyperparameter tuning experiment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KatibExperiment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub trials: u32,
    #[serde(default, rename = "trialsRunning")]
    pub trials_running: u32,
    #[serde(default, rename = "trialsSucceeded")]
    pub trials_succeeded: u32,
    #[serde(default, rename = "trialsFailed")]
    pub trials_failed: u32,
    #[serde(default, rename = "maxTrialCount")]
    pub max_trial_count: u32,
    #[serde(default, rename = "currentOptimalTrial")]
    pub current_optimal_trial: Value,
}

/// Object version produced by a finished snapshot task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotResult {
    #[serde(default)]
    pub event: SnapshotEvent,
}

/// A snapshot task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RokTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub result: Option<SnapshotResult>,
    #[serde(default)]
    pub progress: Option<u32>,
}

impl RokTask {
    /// Whether the task has stopped, successfully or not
    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_str(), "success" | "error" | "canceled")
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_path_replaces_file_name() {
        let compiled = CompiledPipeline {
            pipeline_package_path: "/x/pipeline.yaml".to_string(),
            pipeline_metadata: json!({"pipeline_name": "demo"}),
        };
        assert_eq!(compiled.script_path(), PathBuf::from("/x/kale.py"));
        assert_eq!(compiled.pipeline_name(), Some("demo"));
    }

    #[test]
    fn test_upload_shape() {
        let uploaded: UploadedPipeline = serde_json::from_value(json!({
            "already_exists": false,
            "pipeline": {"pipelineid": "p1", "versionid": "v1", "name": "demo"}
        }))
        .unwrap();
        assert_eq!(uploaded.pipeline.pipeline_id, "p1");
        assert_eq!(uploaded.pipeline.version_id, "v1");
    }

    #[test]
    fn test_task_states() {
        let task: RokTask = serde_json::from_value(json!({
            "id": "t1",
            "status": "success",
            "bucket": "notebooks",
            "result": {"event": {"object": "obj", "version": "v2"}}
        }))
        .unwrap();
        assert!(task.is_finished());
        assert!(task.is_success());
        assert_eq!(task.result.unwrap().event.version, "v2");

        let running = RokTask {
            status: "running".to_string(),
            ..Default::default()
        };
        assert!(!running.is_finished());
    }
}
