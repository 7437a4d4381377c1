use crate::output;

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;

use nbflow_service::graph::{
    cell_steps, clear_step, existing_owner, merge_into_previous, on_cell_removed, set_step,
};
use nbflow_service::tags::{is_assignable_name, is_reserved_name};
use nbflow_service::{
    check_document, rename, CellId, CellRole, NotebookDocument, NotebookHost, StepDag, StepTags,
};

/// Inspect and edit the step tags of a notebook
#[derive(Args, Debug)]
pub struct StepsArgs {
    #[command(subcommand)]
    pub command: StepsCommand,
}

#[derive(Subcommand, Debug)]
pub enum StepsCommand {
    /// Show every cell's step and the resulting execution order
    List {
        /// Path to the .ipynb file
        notebook: PathBuf,
    },

    /// Make a cell the start of a step
    Set {
        notebook: PathBuf,

        /// Cell position (0-based)
        cell: usize,

        /// Step name, or a reserved name such as `imports` or `skip`
        name: String,

        /// Step that must run first (can be repeated)
        #[arg(long = "prev", value_name = "STEP")]
        dependencies: Vec<String>,

        /// Resource limit (can be repeated, format: key=value)
        #[arg(long = "limit", value_name = "KEY=VALUE")]
        limits: Vec<String>,
    },

    /// Remove a cell's step tags and drop edges pointing at it
    Clear { notebook: PathBuf, cell: usize },

    /// Merge a cell into the step above it
    Merge { notebook: PathBuf, cell: usize },

    /// Rename the dependencies on a step
    Rename {
        notebook: PathBuf,
        old: String,
        new: String,
    },

    /// Delete a cell and drop edges to the step it declared
    Remove { notebook: PathBuf, cell: usize },

    /// Report duplicate names, invalid names, dangling edges and cycles
    Check { notebook: PathBuf },
}

pub fn execute(args: StepsArgs) -> Result<()> {
    match args.command {
        StepsCommand::List { notebook } => list(&notebook),

        StepsCommand::Set {
            notebook,
            cell,
            name,
            dependencies,
            limits,
        } => {
            if !is_assignable_name(&name) {
                bail!(
                    "Invalid step name '{}': use lowercase letters, digits and underscores",
                    name
                );
            }
            let mut step = StepTags::new(&name).with_dependencies(dependencies);
            for limit in &limits {
                let (key, value) = limit.split_once('=').ok_or_else(|| {
                    eyre!("Invalid limit format '{}'. Expected key=value", limit)
                })?;
                step = step.with_limit(key, value);
            }

            let mut doc = open(&notebook)?;
            let id = cell_id(&doc, cell)?;
            if let Some(owner) = existing_owner(&doc, &name, id) {
                let position = doc.position(owner).map_or(owner.to_string(), |p| p.to_string());
                bail!("Step '{}' is already declared by cell {}", name, position);
            }
            set_step(&mut doc, id, &step)?;
            output::success(&format!("Cell {} starts step '{}'", cell, name));
            Ok(())
        }

        StepsCommand::Clear { notebook, cell } => {
            let mut doc = open(&notebook)?;
            let id = cell_id(&doc, cell)?;
            let name = step_name(&doc, id);
            clear_step(&mut doc, id, &name)?;
            output::success(&format!("Cleared step tags of cell {}", cell));
            Ok(())
        }

        StepsCommand::Merge { notebook, cell } => {
            let mut doc = open(&notebook)?;
            let id = cell_id(&doc, cell)?;
            merge_into_previous(&mut doc, id)?;
            match nbflow_service::closest_prior_step(&doc, cell) {
                Some(target) => output::success(&format!("Cell {} merged into '{}'", cell, target)),
                None => output::warning(&format!("Cell {} has no step above it", cell)),
            }
            Ok(())
        }

        StepsCommand::Rename { notebook, old, new } => {
            let mut doc = open(&notebook)?;
            rename(&mut doc, &old, &new)?;
            if new.is_empty() || is_reserved_name(&new) {
                output::success(&format!("Dropped dependencies on '{}'", old));
            } else {
                output::success(&format!("Dependencies on '{}' now point at '{}'", old, new));
            }
            Ok(())
        }

        StepsCommand::Remove { notebook, cell } => {
            let mut doc = open(&notebook)?;
            let id = cell_id(&doc, cell)?;
            let removed = doc
                .remove_cell(id)
                .ok_or_else(|| eyre!("Cell {} disappeared", cell))?;
            on_cell_removed(&mut doc, &removed)?;
            doc.save()?;
            output::success(&format!("Removed cell {}", cell));
            Ok(())
        }

        StepsCommand::Check { notebook } => {
            let doc = open(&notebook)?;
            output::status("Checking", &format!("{}", notebook.display()));
            let issues = check_document(&doc);
            if issues.is_empty() {
                output::success("No problems found");
                return Ok(());
            }
            for issue in &issues {
                output::failure(&issue.to_string());
            }
            output::dim(&format!("  {} problem(s)", issues.len()));
            std::process::exit(1);
        }
    }
}

fn list(notebook: &Path) -> Result<()> {
    let doc = open(notebook)?;
    output::header(&format!("{}", notebook.display()));

    for entry in cell_steps(&doc) {
        let role = match &entry.role {
            CellRole::Step(name) => format!("\x1b[1m{}\x1b[0m", name),
            CellRole::Reserved(name) => format!("[{}]", name),
            CellRole::Skip => "[skip]".to_string(),
            CellRole::MergedInto(name) => format!("  \u{2502} {}", name),
            CellRole::Unassigned => "  -".to_string(),
        };
        let mut line = format!("{:>4}  {}", entry.position, role);
        if let Some(tags) = &entry.tags {
            if !tags.dependencies.is_empty() {
                line.push_str(&format!("  <- {}", tags.dependencies.join(", ")));
            }
            for (key, value) in &tags.limits {
                line.push_str(&format!("  {}={}", key, value));
            }
        }
        println!("{}", line);
    }

    println!();
    match StepDag::from_host(&doc).execution_levels() {
        Ok(levels) => {
            for (i, level) in levels.iter().enumerate() {
                output::dim(&format!("  level {}: {}", i + 1, level.join(", ")));
            }
        }
        Err(e) => output::warning(&e.to_string()),
    }
    Ok(())
}

fn open(path: &Path) -> Result<NotebookDocument> {
    let settings = super::load_settings()?;
    Ok(NotebookDocument::load(path)?.with_metadata_key(settings.metadata_key))
}

fn cell_id(doc: &NotebookDocument, position: usize) -> Result<CellId> {
    doc.cell_at(position).ok_or_else(|| {
        eyre!(
            "Cell {} does not exist (notebook has {} cells)",
            position,
            doc.len()
        )
    })
}

fn step_name(doc: &NotebookDocument, cell: CellId) -> String {
    nbflow_service::graph::cell_step(doc, cell)
        .map(|step| step.step_name)
        .unwrap_or_default()
}
