// Notebook Metadata
// Document-level deployment configuration stored in the notebook

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Namespaced key holding the deployment configuration
pub const METADATA_KEY: &str = "kubeflow_notebook";

/// Deployment configuration of a notebook
///
/// Explicit `null`s read as the field's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Experiment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub experiment_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pipeline_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pipeline_description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub docker_image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub volumes: Vec<Volume>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snapshot_volumes: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub autosnapshot: bool,
    /// Run a hyperparameter tuning experiment instead of a single run
    #[serde(default, deserialize_with = "null_as_default")]
    pub katib_run: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub katib_metadata: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps_defaults: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub storage_class_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub volume_access_mode: String,
    /// Fields this client does not interpret, kept for round-tripping
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotebookMetadata {
    /// Volumes that must be snapshotted before compiling
    pub fn clone_volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes
            .iter()
            .filter(|v| v.volume_type == VolumeType::Clone)
    }

    pub fn has_clone_volumes(&self) -> bool {
        self.clone_volumes().next().is_some()
    }

    /// Experiment name to use, preferring the selected experiment
    pub fn effective_experiment_name(&self) -> &str {
        match &self.experiment {
            Some(exp) if !exp.name.is_empty() => &exp.name,
            _ => &self.experiment_name,
        }
    }
}

/// Pipeline experiment reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Volume mounted into pipeline steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mount_point: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snapshot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Kind of a volume; kinds this client does not know keep their raw name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VolumeType {
    Pv,
    Pvc,
    NewPvc,
    Clone,
    Other(String),
}

impl VolumeType {
    pub fn as_str(&self) -> &str {
        match self {
            VolumeType::Pv => "pv",
            VolumeType::Pvc => "pvc",
            VolumeType::NewPvc => "new_pvc",
            VolumeType::Clone => "clone",
            VolumeType::Other(raw) => raw,
        }
    }
}

impl From<String> for VolumeType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pv" => VolumeType::Pv,
            "pvc" => VolumeType::Pvc,
            "new_pvc" => VolumeType::NewPvc,
            "clone" => VolumeType::Clone,
            _ => VolumeType::Other(raw),
        }
    }
}

impl From<VolumeType> for String {
    fn from(volume_type: VolumeType) -> Self {
        match volume_type {
            VolumeType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
