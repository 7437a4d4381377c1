// Backend Module
// Typed wrappers around the backend functions reachable over RPC

pub mod environment;
pub mod types;

pub use environment::{Environment, ExplorationState, ResumedExploration};
pub use types::{
    CompiledPipeline, ExperimentInfo, KatibExperiment, PipelineRef, RokTask, RunInfo,
    SnapshotEvent, SnapshotResult, UploadedPipeline, SCRIPT_FILE_NAME,
};

use crate::notebook::{NotebookMetadata, Volume};

use nbflow_rpc::{RpcClient, RpcContext, RpcResult};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;

/// Backend functions, grouped by namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcFunction {
    ListVolumes,
    GetBaseImage,
    ValidateNotebook,
    CompileNotebook,
    ExploreNotebook,
    FindPodDefaultLabels,
    GetNamespace,
    RemoveMarshalDir,
    UnmarshalData,
    ListExperiments,
    CreateExperiment,
    UploadPipeline,
    RunPipeline,
    GetRun,
    CreateKatibExperiment,
    GetKatibExperiment,
    SnapshotNotebook,
    GetTask,
    ReplaceClonedVolumes,
    CheckRokAvailability,
}

impl RpcFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcFunction::ListVolumes => "nb.list_volumes",
            RpcFunction::GetBaseImage => "nb.get_base_image",
            RpcFunction::ValidateNotebook => "nb.validate_notebook",
            RpcFunction::CompileNotebook => "nb.compile_notebook",
            RpcFunction::ExploreNotebook => "nb.explore_notebook",
            RpcFunction::FindPodDefaultLabels => "nb.find_poddefault_labels_on_server",
            RpcFunction::GetNamespace => "nb.get_namespace",
            RpcFunction::RemoveMarshalDir => "nb.remove_marshal_dir",
            RpcFunction::UnmarshalData => "nb.unmarshal_data",
            RpcFunction::ListExperiments => "kfp.list_experiments",
            RpcFunction::CreateExperiment => "kfp.create_experiment",
            RpcFunction::UploadPipeline => "kfp.upload_pipeline",
            RpcFunction::RunPipeline => "kfp.run_pipeline",
            RpcFunction::GetRun => "kfp.get_run",
            RpcFunction::CreateKatibExperiment => "katib.create_katib_experiment",
            RpcFunction::GetKatibExperiment => "katib.get_experiment",
            RpcFunction::SnapshotNotebook => "rok.snapshot_notebook",
            RpcFunction::GetTask => "rok.get_task",
            RpcFunction::ReplaceClonedVolumes => "rok.replace_cloned_volumes",
            RpcFunction::CheckRokAvailability => "rok.check_rok_availability",
        }
    }
}

impl fmt::Display for RpcFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed access to the backend on behalf of one notebook
#[derive(Debug, Clone)]
pub struct Backend {
    client: RpcClient,
    context: RpcContext,
}

impl Backend {
    pub fn new(client: RpcClient) -> Self {
        Self {
            client,
            context: RpcContext::default(),
        }
    }

    /// Attach the notebook path to every call
    pub fn for_notebook(client: RpcClient, nb_path: impl Into<String>) -> Self {
        Self {
            client,
            context: RpcContext::for_notebook(nb_path),
        }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn context(&self) -> &RpcContext {
        &self.context
    }

    fn nb_path(&self) -> Value {
        json!(self.context.nb_path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        function: RpcFunction,
        kwargs: Value,
    ) -> RpcResult<T> {
        self.client
            .invoke_as(function.as_str(), kwargs, self.context.clone())
            .await
    }

    // nb.*

    pub async fn list_volumes(&self) -> RpcResult<Vec<Volume>> {
        self.call(RpcFunction::ListVolumes, json!({})).await
    }

    pub async fn get_base_image(&self) -> RpcResult<String> {
        self.call(RpcFunction::GetBaseImage, json!({})).await
    }

    /// Check that the notebook can be turned into a pipeline
    ///
    /// Only an explicit `false` from the backend counts as a failed check;
    /// detailed problems come back as application errors.
    pub async fn validate_notebook(&self, overrides: &NotebookMetadata) -> RpcResult<bool> {
        let value: Value = self
            .call(
                RpcFunction::ValidateNotebook,
                json!({
                    "source_notebook_path": self.nb_path(),
                    "notebook_metadata_overrides": overrides,
                }),
            )
            .await?;
        Ok(value != Value::Bool(false))
    }

    pub async fn compile_notebook(
        &self,
        overrides: &NotebookMetadata,
        debug: bool,
    ) -> RpcResult<CompiledPipeline> {
        self.call(
            RpcFunction::CompileNotebook,
            json!({
                "source_notebook_path": self.nb_path(),
                "notebook_metadata_overrides": overrides,
                "debug": debug,
            }),
        )
        .await
    }

    pub async fn explore_notebook(&self) -> RpcResult<ExplorationState> {
        self.call(
            RpcFunction::ExploreNotebook,
            json!({ "source_notebook_path": self.nb_path() }),
        )
        .await
    }

    pub async fn find_poddefault_labels(&self) -> RpcResult<Value> {
        self.call(RpcFunction::FindPodDefaultLabels, json!({})).await
    }

    pub async fn get_namespace(&self) -> RpcResult<String> {
        self.call(RpcFunction::GetNamespace, json!({})).await
    }

    pub async fn remove_marshal_dir(&self) -> RpcResult<()> {
        let _: Value = self
            .call(
                RpcFunction::RemoveMarshalDir,
                json!({ "source_notebook_path": self.nb_path() }),
            )
            .await?;
        Ok(())
    }

    pub async fn unmarshal_data(&self) -> RpcResult<Value> {
        self.call(
            RpcFunction::UnmarshalData,
            json!({ "source_notebook_path": self.nb_path() }),
        )
        .await
    }

    // kfp.*

    pub async fn list_experiments(&self) -> RpcResult<Vec<ExperimentInfo>> {
        self.call(RpcFunction::ListExperiments, json!({})).await
    }

    pub async fn create_experiment(&self, name: &str) -> RpcResult<ExperimentInfo> {
        self.call(
            RpcFunction::CreateExperiment,
            json!({ "experiment_name": name }),
        )
        .await
    }

    pub async fn upload_pipeline(
        &self,
        compiled: &CompiledPipeline,
        overwrite: bool,
    ) -> RpcResult<UploadedPipeline> {
        self.call(
            RpcFunction::UploadPipeline,
            json!({
                "pipeline_package_path": compiled.pipeline_package_path,
                "pipeline_metadata": compiled.pipeline_metadata,
                "overwrite": overwrite,
            }),
        )
        .await
    }

    pub async fn run_pipeline(
        &self,
        pipeline_metadata: &Value,
        pipeline: &PipelineRef,
    ) -> RpcResult<RunInfo> {
        self.call(
            RpcFunction::RunPipeline,
            json!({
                "pipeline_metadata": pipeline_metadata,
                "pipeline_id": pipeline.pipeline_id,
                "version_id": pipeline.version_id,
            }),
        )
        .await
    }

    pub async fn get_run(&self, run_id: &str) -> RpcResult<RunInfo> {
        self.call(RpcFunction::GetRun, json!({ "run_id": run_id }))
            .await
    }

    // katib.*

    pub async fn create_katib_experiment(
        &self,
        request: &Value,
        pipeline: &PipelineRef,
    ) -> RpcResult<KatibExperiment> {
        self.call(
            RpcFunction::CreateKatibExperiment,
            json!({
                "request": request,
                "pipeline_id": pipeline.pipeline_id,
                "version_id": pipeline.version_id,
            }),
        )
        .await
    }

    pub async fn get_katib_experiment(
        &self,
        name: &str,
        namespace: &str,
    ) -> RpcResult<KatibExperiment> {
        self.call(
            RpcFunction::GetKatibExperiment,
            json!({ "experiment": name, "namespace": namespace }),
        )
        .await
    }

    // rok.*

    pub async fn check_rok_availability(&self) -> RpcResult<bool> {
        self.call(RpcFunction::CheckRokAvailability, json!({})).await
    }

    pub async fn snapshot_notebook(&self) -> RpcResult<RokTask> {
        self.call(RpcFunction::SnapshotNotebook, json!({})).await
    }

    pub async fn get_task(&self, task_id: &str) -> RpcResult<RokTask> {
        self.call(RpcFunction::GetTask, json!({ "task_id": task_id }))
            .await
    }

    /// Point cloned volumes at the snapshot a finished task produced
    pub async fn replace_cloned_volumes(
        &self,
        bucket: &str,
        event: &SnapshotEvent,
        volumes: &[Volume],
    ) -> RpcResult<Vec<Volume>> {
        self.call(
            RpcFunction::ReplaceClonedVolumes,
            json!({
                "bucket": bucket,
                "obj": event.object,
                "version": event.version,
                "volumes": volumes,
            }),
        )
        .await
    }
}
