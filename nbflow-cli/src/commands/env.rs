use crate::commands::deploy::ConsoleReporter;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use nbflow_rpc::{report_application, report_unhandled, RpcResult};
use nbflow_service::graph::{cell_steps, CellRole};
use nbflow_service::NotebookDocument;

/// Show what the backend knows about the notebook's cluster
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Path to the .ipynb file
    pub notebook: PathBuf,

    /// Python interpreter hosting the backend (default: python3 on PATH)
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,
}

/// Load the data of an exploration run back into a kernel
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Path to the .ipynb file
    pub notebook: PathBuf,

    /// Python interpreter hosting the backend (default: python3 on PATH)
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,
}

pub async fn info(args: InfoArgs) -> Result<()> {
    let notebook_path = super::notebook_path(&args.notebook)?;
    let settings = super::load_settings()?;
    let backend = super::connect(&notebook_path, args.python.as_ref(), &settings)?;

    let Some(env) = settle("Failed to read the environment", backend.environment().await) else {
        std::process::exit(1);
    };

    output::header(&format!("{}", notebook_path.display()));
    output::status("Namespace", &env.namespace);
    output::status("Image", env.base_image.as_deref().unwrap_or("unknown"));
    output::status(
        "Snapshots",
        if env.rok_available { "available" } else { "unavailable" },
    );
    for volume in &env.volumes {
        output::dim(&format!(
            "  volume {} ({}) at {}",
            volume.name, volume.volume_type, volume.mount_point
        ));
    }
    let experiments: Vec<&str> = env.experiments.iter().map(|e| e.name.as_str()).collect();
    if !experiments.is_empty() {
        output::status("Experiments", &experiments.join(", "));
    }
    if let Some(labels) = env.pod_default_labels.as_object() {
        for (key, value) in labels {
            output::dim(&format!("  pod default {}={}", key, value));
        }
    }
    Ok(())
}

pub async fn resume(args: ResumeArgs) -> Result<()> {
    let notebook_path = super::notebook_path(&args.notebook)?;
    let settings = super::load_settings()?;
    let doc = NotebookDocument::load(&notebook_path)?.with_metadata_key(&settings.metadata_key);
    let backend = super::connect(&notebook_path, args.python.as_ref(), &settings)?;

    let result = backend.resume_exploration().await;
    let resumed = match settle("Failed to resume exploration", result) {
        Some(Some(resumed)) => resumed,
        Some(None) => {
            output::info("Notebook was not launched to explore a step");
            return Ok(());
        }
        None => std::process::exit(1),
    };

    output::success(&format!("Restored the outputs of step '{}'", resumed.step_name));
    if let Some(names) = resumed.restored.as_object() {
        for name in names.keys() {
            output::dim(&format!("  {}", name));
        }
    }
    let last_cell = cell_steps(&doc)
        .into_iter()
        .filter(|entry| match &entry.role {
            CellRole::Step(name) | CellRole::MergedInto(name) => *name == resumed.step_name,
            _ => false,
        })
        .map(|entry| entry.position)
        .last();
    if let Some(position) = last_cell {
        output::info(&format!("Continue from cell {}", position + 1));
    }
    Ok(())
}

/// Show a failed call the way deploy does; `None` once it was reported
fn settle<T>(title: &str, result: RpcResult<T>) -> Option<T> {
    match report_application(result, title, &ConsoleReporter) {
        Ok(value) => value,
        Err(err) => {
            report_unhandled(&ConsoleReporter, &err);
            None
        }
    }
}
