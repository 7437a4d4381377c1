use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use nbflow_rpc::{ApplicationError, ErrorReporter, RpcError};
use nbflow_service::deploy::StageError;
use nbflow_service::{
    progress_channel, DeployEvent, DeployRequest, DeploySession, DeployType, DeployWorkflow,
    NotebookDocument, TrackedStatus, WorkflowConfig,
};

/// Validate, compile and optionally upload and run a notebook
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Path to the .ipynb file
    pub notebook: PathBuf,

    /// How far to go: compile, upload or run
    #[arg(long = "type", value_name = "TYPE", default_value = "compile")]
    pub deploy_type: DeployType,

    /// Compile in debug mode
    #[arg(long)]
    pub debug: bool,

    /// Python interpreter hosting the backend (default: python3 on PATH)
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Return once the run is submitted instead of following it
    #[arg(long)]
    pub detach: bool,
}

/// Prints backend errors the way the notebook UI shows its dialogs
pub struct ConsoleReporter;

impl ErrorReporter for ConsoleReporter {
    fn application_error(&self, title: &str, err: &ApplicationError) {
        output::error(title);
        for line in err.summary_lines() {
            output::detail(&line);
        }
    }

    fn unhandled(&self, err: &RpcError) {
        output::error(err.title());
        for line in err.details() {
            output::detail(&line);
        }
    }
}

pub async fn execute(args: DeployArgs) -> Result<()> {
    let notebook_path = super::notebook_path(&args.notebook)?;
    let settings = super::load_settings()?;

    let doc = NotebookDocument::load(&notebook_path)?.with_metadata_key(&settings.metadata_key);
    let metadata = doc.metadata()?;
    let backend = super::connect(&notebook_path, args.python.as_ref(), &settings)?;

    let pipeline_name = if metadata.pipeline_name.is_empty() {
        "pipeline".to_string()
    } else {
        metadata.pipeline_name.clone()
    };
    output::info(&format!(
        "Deploying '{}' ({}) from {}",
        pipeline_name,
        args.deploy_type,
        notebook_path.display()
    ));

    let (tx, mut rx) = progress_channel();
    let workflow = DeployWorkflow::new(backend)
        .with_config(WorkflowConfig::from(&settings))
        .with_progress(tx)
        .with_reporter(Arc::new(ConsoleReporter));
    let request = DeployRequest::new(metadata, args.deploy_type).with_debug(args.debug);

    // Run the workflow in the background and render its events here
    let session = DeploySession::new();
    let deploy_handle = tokio::spawn({
        let session = session.clone();
        async move { workflow.run(&session, request).await }
    });

    let mut overall_success = true;
    while let Some(event) = rx.recv().await {
        match &event {
            DeployEvent::DeployStarted { index, deploy_type } => {
                output::header(&format!("Deployment {} ({})", index, deploy_type));
            }

            DeployEvent::StageStarted { stage, .. } => {
                output::stage(&stage.to_string(), "...");
            }

            DeployEvent::StageCompleted {
                stage, duration, ..
            } => {
                output::stage(
                    &stage.to_string(),
                    &format!("OK ({:.2}s)", duration.as_secs_f64()),
                );
            }

            DeployEvent::StageFailed { stage, error, .. } => match error {
                StageError::Inline(message) => {
                    output::failure(&format!("{} failed: {}", stage, message));
                }
                StageError::Dialog { title, .. } => {
                    output::failure(&format!("{}: {}", stage, title));
                }
            },

            DeployEvent::Warnings { warnings, .. } => {
                for warning in warnings {
                    output::warning(warning);
                }
            }

            DeployEvent::SnapshotProgress { task, .. } => {
                let progress = task
                    .progress
                    .map(|p| format!(" {}%", p))
                    .unwrap_or_default();
                output::dim(&format!("        snapshot {}{}", task.status, progress));
            }

            DeployEvent::TrackerUpdate { status, .. } => match status {
                TrackedStatus::Run(run) => {
                    let state = run.status.as_deref().unwrap_or("Pending");
                    output::dim(&format!("        run {} {}", run.id, state));
                    if status.is_terminal() && state != "Succeeded" {
                        overall_success = false;
                    }
                }
                TrackedStatus::Experiment(exp) => {
                    let state = exp.status.as_deref().unwrap_or("Created");
                    output::dim(&format!(
                        "        experiment {} {} ({} running, {} succeeded, {} failed)",
                        exp.name, state, exp.trials_running, exp.trials_succeeded, exp.trials_failed
                    ));
                    if status.is_terminal() && state != "Succeeded" {
                        overall_success = false;
                    }
                }
                TrackedStatus::Error(message) => {
                    output::error(&format!("Status check failed: {}", message));
                    overall_success = false;
                }
            },

            DeployEvent::DeployFinished {
                success, duration, ..
            } => {
                overall_success &= *success;
                if *success {
                    output::success(&format!(
                        "Deployment finished in {:.2}s",
                        duration.as_secs_f64()
                    ));
                } else {
                    output::failure(&format!(
                        "Deployment failed after {:.2}s",
                        duration.as_secs_f64()
                    ));
                }
                if args.detach || !*success {
                    break;
                }
            }
        }
    }

    let outcome = deploy_handle.await?;
    if let Some(tracker) = outcome.tracker {
        if args.detach {
            tracker.cancel();
        }
        tracker.join().await;
    }

    if let Some(record) = session.get(outcome.index) {
        if let Some(compiled) = &record.compiled {
            let name = compiled.pipeline_name().unwrap_or(&pipeline_name);
            output::info(&format!("Compiled pipeline '{}'", name));
        }
        if let Some(script) = &record.script_path {
            output::info(&format!("Pipeline script: {}", script.display()));
        }
        if let Some(upload) = &record.upload {
            output::info(&format!(
                "Pipeline '{}' (id {}, version {}){}",
                upload.pipeline.name,
                upload.pipeline.pipeline_id,
                upload.pipeline.version_id,
                if upload.already_exists { ", new version" } else { "" }
            ));
        }
    }

    if !overall_success {
        std::process::exit(1);
    }

    Ok(())
}
