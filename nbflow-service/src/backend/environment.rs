// Notebook Environment
// Cluster facts gathered on open and resuming an exploration run

use crate::backend::{Backend, ExperimentInfo};
use crate::notebook::Volume;

use nbflow_rpc::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the backend reports about the cluster a notebook runs in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    pub namespace: String,
    /// `None` when the backend cannot tell which image the notebook uses
    pub base_image: Option<String>,
    pub rok_available: bool,
    /// Volumes mounted in the notebook server; only listed when snapshots work
    pub volumes: Vec<Volume>,
    pub experiments: Vec<ExperimentInfo>,
    /// Labels of the pod defaults applied to the notebook server
    pub pod_default_labels: Value,
}

/// Output of `nb.explore_notebook`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationState {
    #[serde(default)]
    pub is_exploration: bool,
    #[serde(default)]
    pub step_name: String,
}

/// A finished exploration whose data was loaded back into the kernel
#[derive(Debug, Clone, PartialEq)]
pub struct ResumedExploration {
    /// Step whose outputs were restored
    pub step_name: String,
    pub restored: Value,
}

impl Backend {
    /// Gather cluster facts for a freshly opened notebook
    pub async fn environment(&self) -> RpcResult<Environment> {
        let namespace = self.get_namespace().await?;
        let base_image = match self.get_base_image().await {
            Ok(image) if !image.is_empty() => Some(image),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "base image unavailable");
                None
            }
        };

        // A backend without snapshot support answers with an application error
        let rok_available = match self.check_rok_availability().await {
            Ok(available) => available,
            Err(RpcError::Application(err)) => {
                tracing::debug!(message = %err.message, "snapshots unavailable");
                false
            }
            Err(e) => return Err(e),
        };
        let volumes = if rok_available {
            self.list_volumes().await?
        } else {
            Vec::new()
        };

        let experiments = self.list_experiments().await?;
        let pod_default_labels = self.find_poddefault_labels().await?;
        tracing::debug!(
            %namespace,
            rok_available,
            volumes = volumes.len(),
            experiments = experiments.len(),
            "environment gathered"
        );

        Ok(Environment {
            namespace,
            base_image,
            rok_available,
            volumes,
            experiments,
            pod_default_labels,
        })
    }

    /// Restore the data of a notebook that was launched to explore a step
    ///
    /// Returns `None` for an ordinary notebook. The marshal directory is
    /// removed only after the data was loaded.
    pub async fn resume_exploration(&self) -> RpcResult<Option<ResumedExploration>> {
        let state = self.explore_notebook().await?;
        if !state.is_exploration {
            return Ok(None);
        }
        tracing::info!(step = %state.step_name, "resuming exploration");

        let restored = self.unmarshal_data().await?;
        self.remove_marshal_dir().await?;
        Ok(Some(ResumedExploration {
            step_name: state.step_name,
            restored,
        }))
    }
}
