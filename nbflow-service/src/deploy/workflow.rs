// Deploy Workflow
// Validate, snapshot, compile, upload and run a notebook as a pipeline

use crate::backend::{Backend, CompiledPipeline, PipelineRef, RokTask, SnapshotEvent};
use crate::deploy::events::{
    DeployEvent, DeployStage, EventSender, ProgressSender, StageError, TrackerForwarder,
};
use crate::deploy::state::{DeployIndex, DeployRun, DeploySession, DeployType};
use crate::deploy::warnings::{compile_warnings, effective_image};
use crate::notebook::NotebookMetadata;
use crate::poll::{spawn_tracker, PollHandle, TrackerSpec};
use crate::settings::Settings;

use nbflow_rpc::{
    report_application, report_unhandled, ErrorReporter, RpcResult, TracingReporter,
};
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 5;

/// One deployment request
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub metadata: NotebookMetadata,
    pub deploy_type: DeployType,
    pub debug: bool,
}

impl DeployRequest {
    pub fn new(metadata: NotebookMetadata, deploy_type: DeployType) -> Self {
        Self {
            metadata,
            deploy_type,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Result of a workflow run
#[derive(Debug)]
pub struct DeployOutcome {
    pub index: DeployIndex,
    pub success: bool,
    pub failed_stage: Option<DeployStage>,
    /// Tracker following the submitted run or experiment
    pub tracker: Option<PollHandle>,
}

/// Timing of the polls the workflow performs
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub snapshot_interval: Duration,
    pub run_interval: Duration,
    pub experiment_interval: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for WorkflowConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            snapshot_interval: settings.snapshot_interval(),
            run_interval: settings.run_interval(),
            experiment_interval: settings.experiment_interval(),
        }
    }
}

/// Failure of a single stage
struct StageFailure {
    stage: DeployStage,
    error: StageError,
}

/// Deployment orchestrator
///
/// Stages run strictly in order and the first failure ends the workflow.
/// Nothing is retried here; busy-kernel retries happen in the RPC client.
pub struct DeployWorkflow {
    backend: Backend,
    config: WorkflowConfig,
    event_tx: Option<ProgressSender>,
    reporter: Arc<dyn ErrorReporter>,
}

impl DeployWorkflow {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            config: WorkflowConfig::default(),
            event_tx: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Start a deployment in `session` and drive it to completion
    ///
    /// Run and tune submissions return as soon as they are accepted; the
    /// returned tracker keeps following them. Other deployments may run
    /// against the same session at the same time.
    pub async fn run(&self, session: &DeploySession, request: DeployRequest) -> DeployOutcome {
        let index = session.start(request.deploy_type);
        let started = Instant::now();
        tracing::info!(%index, deploy_type = %request.deploy_type, "deployment started");
        self.event_tx.send_event(DeployEvent::DeployStarted {
            index,
            deploy_type: request.deploy_type,
        });

        let mut tracker = None;
        let deployment = Deployment { session, index };
        let failed_stage = match self.drive(&deployment, request, &mut tracker).await {
            Ok(()) => None,
            Err(failure) => {
                tracing::warn!(
                    %index,
                    stage = %failure.stage,
                    error = %failure.error,
                    "deployment stage failed"
                );
                self.event_tx.send_event(DeployEvent::StageFailed {
                    index,
                    stage: failure.stage,
                    error: failure.error,
                });
                Some(failure.stage)
            }
        };
        session.finish(index, failed_stage);

        let success = failed_stage.is_none();
        let duration = started.elapsed();
        tracing::info!(%index, success, ?duration, "deployment finished");
        self.event_tx.send_event(DeployEvent::DeployFinished {
            index,
            success,
            duration,
        });

        DeployOutcome {
            index,
            success,
            failed_stage,
            tracker,
        }
    }

    async fn drive(
        &self,
        deployment: &Deployment<'_>,
        request: DeployRequest,
        tracker: &mut Option<PollHandle>,
    ) -> Result<(), StageFailure> {
        let index = deployment.index;
        let mut metadata = request.metadata;

        self.validate(deployment, &metadata).await?;

        if metadata.has_clone_volumes() {
            self.snapshot(deployment, &mut metadata).await?;
        }

        self.collect_warnings(deployment, &metadata).await;

        let compiled = self.compile(deployment, &metadata, request.debug).await?;
        if !request.deploy_type.uploads() {
            return Ok(());
        }

        let uploaded = {
            let stage = self.begin(index, DeployStage::Upload);
            let result = self.backend.upload_pipeline(&compiled, false).await;
            let uploaded = self.settle(DeployStage::Upload, "Upload failed", result)?;
            tracing::info!(
                %index,
                pipeline = %uploaded.pipeline.name,
                already_exists = uploaded.already_exists,
                "pipeline uploaded"
            );
            deployment.update(|run| run.upload = Some(uploaded.clone()));
            self.complete(index, DeployStage::Upload, stage);
            uploaded
        };
        if !request.deploy_type.runs() {
            return Ok(());
        }

        let handle = if metadata.katib_run {
            self.tune(deployment, &metadata, &compiled, &uploaded.pipeline)
                .await?
        } else {
            let stage = self.begin(index, DeployStage::Run);
            let result = self
                .backend
                .run_pipeline(&compiled.pipeline_metadata, &uploaded.pipeline)
                .await;
            let run = self.settle(DeployStage::Run, "Run failed", result)?;
            tracing::info!(%index, run_id = %run.id, "pipeline run submitted");
            deployment.update(|record| record.run = Some(run.clone()));
            self.complete(index, DeployStage::Run, stage);
            let spec = TrackerSpec::run(run.id).with_interval(self.config.run_interval);
            self.track(index, spec)
        };
        *tracker = handle;

        Ok(())
    }

    async fn validate(
        &self,
        deployment: &Deployment<'_>,
        metadata: &NotebookMetadata,
    ) -> Result<(), StageFailure> {
        let stage = self.begin(deployment.index, DeployStage::Validate);
        let result = self.backend.validate_notebook(metadata).await;
        let valid = self.settle(DeployStage::Validate, "Notebook validation failed", result)?;
        deployment.update(|run| run.notebook_validation = Some(valid));
        if !valid {
            return Err(StageFailure {
                stage: DeployStage::Validate,
                error: StageError::Inline("notebook validation failed".to_string()),
            });
        }
        self.complete(deployment.index, DeployStage::Validate, stage);
        Ok(())
    }

    async fn snapshot(
        &self,
        deployment: &Deployment<'_>,
        metadata: &mut NotebookMetadata,
    ) -> Result<(), StageFailure> {
        const TITLE: &str = "Snapshot failed";
        let index = deployment.index;
        let stage = self.begin(index, DeployStage::Snapshot);

        let result = self.backend.snapshot_notebook().await;
        let mut task = self.settle(DeployStage::Snapshot, TITLE, result)?;
        loop {
            self.event_tx.send_event(DeployEvent::SnapshotProgress {
                index,
                task: task.clone(),
            });
            deployment.update(|run| run.task = Some(task.clone()));
            if task.is_finished() {
                break;
            }
            tokio::time::sleep(self.config.snapshot_interval).await;
            let result = self.backend.get_task(&task.id).await;
            task = self.settle(DeployStage::Snapshot, TITLE, result)?;
        }

        let event = snapshot_event(&task)?;
        let result = self
            .backend
            .replace_cloned_volumes(&task.bucket, &event, &metadata.volumes)
            .await;
        metadata.volumes = self.settle(DeployStage::Snapshot, TITLE, result)?;

        self.complete(index, DeployStage::Snapshot, stage);
        Ok(())
    }

    async fn collect_warnings(&self, deployment: &Deployment<'_>, metadata: &NotebookMetadata) {
        let base_image = match self.backend.get_base_image().await {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!(error = %e, "base image unavailable, skipping image check");
                None
            }
        };
        let image = effective_image(&metadata.docker_image, base_image.as_deref());
        let warnings = compile_warnings(image, base_image.as_deref());
        if warnings.is_empty() {
            return;
        }
        deployment.update(|run| run.warnings = warnings.clone());
        self.event_tx.send_event(DeployEvent::Warnings {
            index: deployment.index,
            warnings,
        });
    }

    async fn compile(
        &self,
        deployment: &Deployment<'_>,
        metadata: &NotebookMetadata,
        debug: bool,
    ) -> Result<CompiledPipeline, StageFailure> {
        let index = deployment.index;
        let stage = self.begin(index, DeployStage::Compile);
        let result = self.backend.compile_notebook(metadata, debug).await;
        let compiled = self.settle(DeployStage::Compile, "Compilation failed", result)?;
        let script = compiled.script_path();
        tracing::info!(
            %index,
            package = %compiled.pipeline_package_path,
            script = %script.display(),
            "notebook compiled"
        );
        deployment.update(|run| {
            run.script_path = Some(script);
            run.compiled = Some(compiled.clone());
        });
        self.complete(index, DeployStage::Compile, stage);
        Ok(compiled)
    }

    async fn tune(
        &self,
        deployment: &Deployment<'_>,
        metadata: &NotebookMetadata,
        compiled: &CompiledPipeline,
        pipeline: &PipelineRef,
    ) -> Result<Option<PollHandle>, StageFailure> {
        const TITLE: &str = "Tuning experiment failed";
        let index = deployment.index;
        let stage = self.begin(index, DeployStage::Tune);

        let experiment_name = tuning_experiment_name(metadata.effective_experiment_name());
        let result = self.backend.create_experiment(&experiment_name).await;
        let experiment = self.settle(DeployStage::Tune, TITLE, result)?;

        let request = json!({
            "katib_metadata": metadata.katib_metadata,
            "experiment_name": experiment.name,
            "experiment_id": experiment.id,
            "pipeline_metadata": compiled.pipeline_metadata,
        });
        let result = self.backend.create_katib_experiment(&request, pipeline).await;
        let katib = self.settle(DeployStage::Tune, TITLE, result)?;
        tracing::info!(%index, experiment = %katib.name, "tuning experiment submitted");
        deployment.update(|run| run.katib_experiment = Some(katib.clone()));
        self.complete(index, DeployStage::Tune, stage);

        let spec = TrackerSpec::experiment(katib.name, katib.namespace)
            .with_interval(self.config.experiment_interval);
        Ok(self.track(index, spec))
    }

    /// Trackers report through the progress channel; without one nothing is tracked
    fn track(&self, index: DeployIndex, spec: TrackerSpec) -> Option<PollHandle> {
        let tx = self.event_tx.clone()?;
        Some(spawn_tracker(
            self.backend.clone(),
            spec,
            TrackerForwarder::new(index, tx),
        ))
    }

    fn begin(&self, index: DeployIndex, stage: DeployStage) -> Instant {
        tracing::debug!(%index, %stage, "stage started");
        self.event_tx
            .send_event(DeployEvent::StageStarted { index, stage });
        Instant::now()
    }

    fn complete(&self, index: DeployIndex, stage: DeployStage, started: Instant) {
        self.event_tx.send_event(DeployEvent::StageCompleted {
            index,
            stage,
            duration: started.elapsed(),
        });
    }

    /// Apply the error display policy to a stage's RPC result
    ///
    /// Application errors are shown under `title` by the reporter; anything
    /// else goes to the unhandled-error surface. Both end the stage.
    fn settle<T>(
        &self,
        stage: DeployStage,
        title: &str,
        result: RpcResult<T>,
    ) -> Result<T, StageFailure> {
        let details = match report_application(result, title, self.reporter.as_ref()) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => Vec::new(),
            Err(err) => {
                report_unhandled(self.reporter.as_ref(), &err);
                err.details()
            }
        };
        Err(StageFailure {
            stage,
            error: StageError::Dialog {
                title: title.to_string(),
                details,
            },
        })
    }
}

/// One deployment's record within a shared session
struct Deployment<'a> {
    session: &'a DeploySession,
    index: DeployIndex,
}

impl Deployment<'_> {
    fn update(&self, apply: impl FnOnce(&mut DeployRun)) {
        self.session.update(self.index, apply);
    }
}

fn snapshot_event(task: &RokTask) -> Result<SnapshotEvent, StageFailure> {
    if !task.is_success() {
        return Err(StageFailure {
            stage: DeployStage::Snapshot,
            error: StageError::Inline(format!(
                "snapshot task {} ended with status '{}'",
                task.id, task.status
            )),
        });
    }
    task.result
        .as_ref()
        .map(|result| result.event.clone())
        .ok_or_else(|| StageFailure {
            stage: DeployStage::Snapshot,
            error: StageError::Inline(format!("snapshot task {} returned no result", task.id)),
        })
}

/// Name for a new tuning experiment: the base name plus a random suffix
pub fn tuning_experiment_name(base: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", base, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::events::progress_channel;
    use crate::notebook::{Volume, VolumeType};
    use crate::poll::{TrackedStatus, TrackerOutcome};
    use nbflow_rpc::{Kernel, KernelReply, RecordingReporter, Report, RpcClient, ScriptedKernel};
    use serde_json::{Map, Value};
    use std::path::PathBuf;
    use tokio::sync::Notify;

    /// Holds calls to one backend function until released
    struct GatedKernel {
        inner: ScriptedKernel,
        gated: String,
        entered: Notify,
        release: Notify,
    }

    impl GatedKernel {
        fn new(function: &str) -> Self {
            Self {
                inner: ScriptedKernel::new(),
                gated: serde_json::to_string(function).unwrap(),
                entered: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Kernel for GatedKernel {
        async fn execute(&self, code: &str, expression: &str) -> KernelReply {
            if code.contains(&self.gated) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.execute(code, expression).await
        }
    }

    fn script_compile_only(kernel: &ScriptedKernel) {
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_result("nb.compile_notebook", compiled());
    }

    fn workflow(kernel: &Arc<ScriptedKernel>) -> DeployWorkflow {
        let backend = Backend::for_notebook(RpcClient::new(kernel.clone()), "/x/demo.ipynb");
        DeployWorkflow::new(backend).with_config(WorkflowConfig {
            snapshot_interval: Duration::from_millis(1),
            run_interval: Duration::from_millis(1),
            experiment_interval: Duration::from_millis(1),
        })
    }

    fn compiled() -> Value {
        json!({
            "pipeline_package_path": "/x/pipeline.yaml",
            "pipeline_metadata": {"pipeline_name": "demo"}
        })
    }

    fn uploaded() -> Value {
        json!({
            "already_exists": false,
            "pipeline": {"pipelineid": "p1", "versionid": "v1", "name": "demo"}
        })
    }

    fn clone_volume() -> Volume {
        Volume {
            volume_type: VolumeType::Clone,
            name: "workspace".to_string(),
            mount_point: "/home/jovyan".to_string(),
            size: None,
            size_type: None,
            snapshot: false,
            snapshot_name: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_compile_only_deployment() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_result("nb.compile_notebook", compiled());
        let session = DeploySession::new();

        let request = DeployRequest::new(NotebookMetadata::default(), DeployType::Compile);
        let outcome = workflow(&kernel).run(&session, request).await;

        assert!(outcome.success);
        assert!(outcome.tracker.is_none());
        let record = session.get(outcome.index).unwrap();
        assert_eq!(record.notebook_validation, Some(true));
        assert_eq!(record.script_path, Some(PathBuf::from("/x/kale.py")));
        assert_eq!(
            record.compiled.as_ref().unwrap().pipeline_package_path,
            "/x/pipeline.yaml"
        );
        assert!(record.upload.is_none());
        assert!(record.run.is_none());
        assert!(record.task.is_none());
        assert!(!record.in_progress);
        assert_eq!(kernel.calls_to("rok.snapshot_notebook"), 0);
        assert_eq!(kernel.calls_to("kfp.upload_pipeline"), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_halts() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(false));
        let (tx, mut rx) = progress_channel();
        let session = DeploySession::new();

        let request = DeployRequest::new(NotebookMetadata::default(), DeployType::Run);
        let outcome = workflow(&kernel)
            .with_progress(tx)
            .run(&session, request)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.failed_stage, Some(DeployStage::Validate));
        assert_eq!(kernel.calls(), 1);
        let record = session.get(outcome.index).unwrap();
        assert_eq!(record.notebook_validation, Some(false));
        assert!(!record.in_progress);

        let mut failed = false;
        while let Ok(event) = rx.try_recv() {
            if let DeployEvent::StageFailed { stage, error, .. } = event {
                assert_eq!(stage, DeployStage::Validate);
                assert!(matches!(error, StageError::Inline(_)));
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn test_compile_application_error_is_reported() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_app_error("nb.compile_notebook", 2, "bad step");
        let reporter = Arc::new(RecordingReporter::new());
        let session = DeploySession::new();

        let request = DeployRequest::new(NotebookMetadata::default(), DeployType::Upload);
        let outcome = workflow(&kernel)
            .with_reporter(reporter.clone())
            .run(&session, request)
            .await;

        assert_eq!(outcome.failed_stage, Some(DeployStage::Compile));
        assert_eq!(kernel.calls_to("kfp.upload_pipeline"), 0);
        assert!(matches!(
            reporter.reports().as_slice(),
            [Report::Application { title, .. }] if title == "Compilation failed"
        ));
    }

    #[tokio::test]
    async fn test_snapshot_rewrites_clone_volumes() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result(
            "rok.snapshot_notebook",
            json!({"id": "t1", "status": "running", "bucket": "notebooks"}),
        );
        kernel.on_result(
            "rok.get_task",
            json!({"id": "t1", "status": "running", "bucket": "notebooks"}),
        );
        kernel.on_result(
            "rok.get_task",
            json!({
                "id": "t1",
                "status": "success",
                "bucket": "notebooks",
                "result": {"event": {"object": "demo", "version": "v7"}}
            }),
        );
        kernel.on_result(
            "rok.replace_cloned_volumes",
            json!([{"type": "pvc", "name": "workspace", "mount_point": "/home/jovyan"}]),
        );
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_result("nb.compile_notebook", compiled());
        let session = DeploySession::new();

        let metadata = NotebookMetadata {
            volumes: vec![clone_volume()],
            ..Default::default()
        };
        let outcome = workflow(&kernel)
            .run(&session, DeployRequest::new(metadata, DeployType::Compile))
            .await;

        assert!(outcome.success);
        assert_eq!(kernel.calls_to("rok.get_task"), 2);
        let record = session.get(outcome.index).unwrap();
        assert!(record.task.as_ref().unwrap().is_success());
        assert_eq!(kernel.calls_to("rok.replace_cloned_volumes"), 1);
        assert!(record.compiled.is_some());

        let replace = kernel.kwargs_for("rok.replace_cloned_volumes");
        assert_eq!(replace[0]["bucket"], "notebooks");
        assert_eq!(replace[0]["obj"], "demo");
        assert_eq!(replace[0]["version"], "v7");

        let compile = kernel.kwargs_for("nb.compile_notebook");
        let volume = &compile[0]["notebook_metadata_overrides"]["volumes"][0];
        assert_eq!(volume["type"], "pvc");
        assert_eq!(volume["name"], "workspace");
        assert_eq!(volume["mount_point"], "/home/jovyan");
    }

    #[tokio::test]
    async fn test_failed_snapshot_halts() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result(
            "rok.snapshot_notebook",
            json!({"id": "t1", "status": "error", "bucket": "notebooks"}),
        );
        let session = DeploySession::new();

        let metadata = NotebookMetadata {
            volumes: vec![clone_volume()],
            ..Default::default()
        };
        let outcome = workflow(&kernel)
            .run(&session, DeployRequest::new(metadata, DeployType::Compile))
            .await;

        assert_eq!(outcome.failed_stage, Some(DeployStage::Snapshot));
        assert_eq!(kernel.calls_to("nb.compile_notebook"), 0);
    }

    #[tokio::test]
    async fn test_run_hands_off_to_tracker() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_result("nb.compile_notebook", compiled());
        kernel.on_result("kfp.upload_pipeline", uploaded());
        kernel.on_result("kfp.run_pipeline", json!({"id": "r1", "name": "demo-run"}));
        kernel.on_result("kfp.get_run", json!({"id": "r1", "status": "Running"}));
        kernel.on_result("kfp.get_run", json!({"id": "r1", "status": "Succeeded"}));
        let (tx, mut rx) = progress_channel();
        let session = DeploySession::new();

        let request = DeployRequest::new(NotebookMetadata::default(), DeployType::Run);
        let outcome = workflow(&kernel)
            .with_progress(tx)
            .run(&session, request)
            .await;

        assert!(outcome.success);
        let record = session.get(outcome.index).unwrap();
        assert_eq!(record.upload.as_ref().unwrap().pipeline.pipeline_id, "p1");
        assert_eq!(record.run.as_ref().unwrap().id, "r1");

        let tracker = outcome.tracker.unwrap();
        assert!(matches!(tracker.join().await, TrackerOutcome::Finished { polls: 2, .. }));

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DeployEvent::TrackerUpdate {
                status: TrackedStatus::Run(run),
                ..
            } = event
            {
                statuses.push(run.status.unwrap_or_default());
            }
        }
        assert_eq!(statuses, vec!["Running", "Succeeded"]);
    }

    #[tokio::test]
    async fn test_tune_creates_suffixed_experiment() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_result("nb.compile_notebook", compiled());
        kernel.on_result("kfp.upload_pipeline", uploaded());
        kernel.on_result("kfp.create_experiment", json!({"id": "e1", "name": "exp-abcde"}));
        kernel.on_result(
            "katib.create_katib_experiment",
            json!({"name": "demo-katib", "namespace": "kubeflow-user"}),
        );
        let session = DeploySession::new();

        let metadata = NotebookMetadata {
            experiment_name: "exp".to_string(),
            katib_run: true,
            ..Default::default()
        };
        let outcome = workflow(&kernel)
            .run(&session, DeployRequest::new(metadata, DeployType::Run))
            .await;

        assert!(outcome.success);
        assert_eq!(kernel.calls_to("kfp.run_pipeline"), 0);
        let record = session.get(outcome.index).unwrap();
        assert_eq!(record.katib_experiment.as_ref().unwrap().name, "demo-katib");

        let created = kernel.kwargs_for("kfp.create_experiment");
        let name = created[0]["experiment_name"].as_str().unwrap();
        assert!(name.starts_with("exp-"));
        assert_eq!(name.len(), "exp-".len() + 5);

        let katib = kernel.kwargs_for("katib.create_katib_experiment");
        assert_eq!(katib[0]["request"]["experiment_name"], "exp-abcde");
        assert_eq!(katib[0]["pipeline_id"], "p1");
    }

    #[tokio::test]
    async fn test_tune_experiment_creation_error_fails_stage() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_result("nb.compile_notebook", compiled());
        kernel.on_result("kfp.upload_pipeline", uploaded());
        kernel.on_app_error("kfp.create_experiment", 4, "forbidden");
        let session = DeploySession::new();

        let metadata = NotebookMetadata {
            katib_run: true,
            ..Default::default()
        };
        let outcome = workflow(&kernel)
            .run(&session, DeployRequest::new(metadata, DeployType::Run))
            .await;

        assert_eq!(outcome.failed_stage, Some(DeployStage::Tune));
        assert_eq!(kernel.calls_to("katib.create_katib_experiment"), 0);
    }

    #[tokio::test]
    async fn test_image_mismatch_warns_without_blocking() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on_result("nb.validate_notebook", json!(true));
        kernel.on_result("nb.get_base_image", json!("img:1"));
        kernel.on_result("nb.compile_notebook", compiled());
        let session = DeploySession::new();

        let metadata = NotebookMetadata {
            docker_image: "custom:2".to_string(),
            ..Default::default()
        };
        let outcome = workflow(&kernel)
            .run(&session, DeployRequest::new(metadata, DeployType::Compile))
            .await;

        assert!(outcome.success);
        assert!(!session.get(outcome.index).unwrap().warnings.is_empty());
    }

    #[tokio::test]
    async fn test_compile_only_event_order() {
        let kernel = Arc::new(ScriptedKernel::new());
        script_compile_only(&kernel);
        let (tx, mut rx) = progress_channel();
        let session = DeploySession::new();

        let request = DeployRequest::new(NotebookMetadata::default(), DeployType::Compile);
        let outcome = workflow(&kernel)
            .with_progress(tx)
            .run(&session, request)
            .await;
        assert!(outcome.success);

        let mut trail = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.index(), outcome.index);
            trail.push(match event {
                DeployEvent::DeployStarted { .. } => "deploy started".to_string(),
                DeployEvent::StageStarted { stage, .. } => format!("{} started", stage),
                DeployEvent::StageCompleted { stage, .. } => format!("{} completed", stage),
                DeployEvent::DeployFinished { success, .. } => {
                    format!("deploy finished {}", success)
                }
                other => format!("{:?}", other),
            });
        }
        assert_eq!(
            trail,
            vec![
                "deploy started",
                "validate started",
                "validate completed",
                "compile started",
                "compile completed",
                "deploy finished true",
            ]
        );
    }

    #[tokio::test]
    async fn test_kernel_failure_goes_to_unhandled_surface() {
        let kernel = Arc::new(ScriptedKernel::new());
        kernel.on(
            "nb.validate_notebook",
            KernelReply::error(
                "ModuleNotFoundError",
                "No module named 'kale'",
                vec!["Traceback (most recent call last):".to_string()],
            ),
        );
        let reporter = Arc::new(RecordingReporter::new());
        let (tx, mut rx) = progress_channel();
        let session = DeploySession::new();

        let request = DeployRequest::new(NotebookMetadata::default(), DeployType::Compile);
        let outcome = workflow(&kernel)
            .with_reporter(reporter.clone())
            .with_progress(tx)
            .run(&session, request)
            .await;

        assert_eq!(outcome.failed_stage, Some(DeployStage::Validate));
        assert!(matches!(
            reporter.reports().as_slice(),
            [Report::Unhandled { title, .. }] if title == "Kernel failure"
        ));
        let dialog = std::iter::from_fn(|| rx.try_recv().ok()).find_map(|event| match event {
            DeployEvent::StageFailed { error, .. } => Some(error),
            _ => None,
        });
        match dialog {
            Some(StageError::Dialog { title, details }) => {
                assert_eq!(title, "Notebook validation failed");
                assert!(details.iter().any(|line| line.contains("nb.validate_notebook")));
            }
            other => panic!("expected a dialog, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dismissed_deployment_ignores_later_stage_results() {
        let kernel = Arc::new(GatedKernel::new("nb.compile_notebook"));
        script_compile_only(&kernel.inner);
        let session = DeploySession::new();
        let backend = Backend::for_notebook(RpcClient::new(kernel.clone()), "/x/demo.ipynb");
        let workflow = DeployWorkflow::new(backend);

        let task = tokio::spawn({
            let session = session.clone();
            async move {
                let request = DeployRequest::new(NotebookMetadata::default(), DeployType::Compile);
                workflow.run(&session, request).await
            }
        });

        kernel.entered.notified().await;
        let index = session.visible()[0].index;
        assert!(session.get(index).unwrap().in_progress);
        assert!(session.dismiss(index));
        kernel.release.notify_one();

        let outcome = task.await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.index, index);
        let record = session.get(index).unwrap();
        assert!(record.deleted);
        assert_eq!(record.notebook_validation, Some(true));
        assert!(record.compiled.is_none());
        assert!(record.script_path.is_none());
        assert!(!record.in_progress);
        assert!(session.visible().is_empty());
    }

    #[tokio::test]
    async fn test_deployments_share_one_session() {
        let kernel = Arc::new(ScriptedKernel::new());
        script_compile_only(&kernel);
        script_compile_only(&kernel);
        let session = DeploySession::new();
        let workflow = workflow(&kernel);

        let (first, second) = tokio::join!(
            workflow.run(
                &session,
                DeployRequest::new(NotebookMetadata::default(), DeployType::Compile)
            ),
            workflow.run(
                &session,
                DeployRequest::new(NotebookMetadata::default(), DeployType::Compile)
            ),
        );

        assert!(first.success && second.success);
        assert_ne!(first.index, second.index);
        assert_eq!(session.len(), 2);
        assert!(session.visible().iter().all(|run| run.succeeded()));
    }

    #[test]
    fn test_tuning_experiment_name() {
        let name = tuning_experiment_name("exp");
        let suffix = name.strip_prefix("exp-").unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
