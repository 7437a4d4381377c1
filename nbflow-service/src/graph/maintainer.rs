// Dependency Graph Maintainer
// Keeps step tags consistent across renames, merges and deletions

use crate::notebook::{CellId, NotebookHost, NotebookResult};
use crate::tags::{decode, encode, is_reserved_name, StepTag, StepTags, SKIP};

use std::collections::BTreeSet;

/// Decoded step information of a cell; `None` when untagged or unknown
pub fn cell_step<H: NotebookHost + ?Sized>(host: &H, cell: CellId) -> Option<StepTags> {
    host.tags(cell).and_then(|tags| decode(&tags))
}

/// Every anchor step name in the document (non-empty, not `skip`)
pub fn list_all_step_names<H: NotebookHost + ?Sized>(host: &H) -> BTreeSet<String> {
    host.cell_ids()
        .into_iter()
        .filter_map(|cell| cell_step(host, cell))
        .filter(StepTags::is_anchor)
        .map(|step| step.step_name)
        .collect()
}

/// Name of the nearest step above position `index`
///
/// This is the step an untagged cell at `index` is merged into. Empty and
/// `skip` cells are passed over.
pub fn closest_prior_step<H: NotebookHost + ?Sized>(host: &H, index: usize) -> Option<String> {
    let cells = host.cell_ids();
    let end = index.min(cells.len());
    cells[..end]
        .iter()
        .rev()
        .filter_map(|&cell| cell_step(host, cell))
        .find(StepTags::is_anchor)
        .map(|step| step.step_name)
}

/// Rewrite every `prev:<old>` edge to point at `new`
///
/// When `new` is empty or reserved the edges are dropped instead. All
/// cells are rewritten before the document is saved once.
pub fn rename<H: NotebookHost + ?Sized>(host: &mut H, old: &str, new: &str) -> NotebookResult<()> {
    let drop_edges = new.is_empty() || is_reserved_name(new);
    let mut touched = 0usize;

    for cell in host.cell_ids() {
        let Some(raw) = host.tags(cell) else {
            continue;
        };
        let Some(mut step) = decode(&raw) else {
            continue;
        };
        if !step.dependencies.iter().any(|dep| dep == old) {
            continue;
        }

        let mut dependencies: Vec<String> = Vec::with_capacity(step.dependencies.len());
        for dep in step.dependencies {
            let dep = if dep == old {
                if drop_edges {
                    continue;
                }
                new.to_string()
            } else {
                dep
            };
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }
        step.dependencies = dependencies;

        host.set_tags(cell, merge_tags(&raw, &step));
        touched += 1;
    }

    tracing::debug!(old, new, cells = touched, "renamed step references");
    host.save()
}

/// Turn a cell back into a plain continuation cell and drop edges to `name`
pub fn clear_step<H: NotebookHost + ?Sized>(
    host: &mut H,
    cell: CellId,
    name: &str,
) -> NotebookResult<()> {
    let raw = host.tags(cell).unwrap_or_default();
    host.set_tags(cell, merge_tags(&raw, &StepTags::default()));
    rename(host, name, "")
}

/// Merge a cell into the closest prior step
pub fn merge_into_previous<H: NotebookHost + ?Sized>(
    host: &mut H,
    cell: CellId,
) -> NotebookResult<()> {
    let name = cell_step(host, cell)
        .map(|step| step.step_name)
        .unwrap_or_default();
    clear_step(host, cell, &name)
}

/// Drop edges to the step a removed cell declared
///
/// `removed_tags` are the cell's tags as they were before removal.
pub fn on_cell_removed<H: NotebookHost + ?Sized>(
    host: &mut H,
    removed_tags: &[String],
) -> NotebookResult<()> {
    match decode(removed_tags) {
        Some(step) if !step.step_name.is_empty() => rename(host, &step.step_name, ""),
        _ => Ok(()),
    }
}

/// Write a cell's step information
///
/// If the cell previously declared a different step, references to the
/// old name follow it to the new one.
pub fn set_step<H: NotebookHost + ?Sized>(
    host: &mut H,
    cell: CellId,
    step: &StepTags,
) -> NotebookResult<()> {
    let raw = host.tags(cell).unwrap_or_default();
    let previous = decode(&raw).map(|s| s.step_name).unwrap_or_default();

    host.set_tags(cell, merge_tags(&raw, step));

    if !previous.is_empty() && previous != step.step_name {
        rename(host, &previous, &step.step_name)
    } else {
        host.save()
    }
}

/// How a cell takes part in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellRole {
    /// Starts a pipeline step
    Step(String),
    /// Carries a reserved pseudo-step such as `imports`
    Reserved(String),
    /// Excluded from the pipeline
    Skip,
    /// Continues the named step
    MergedInto(String),
    /// No step above it to merge into
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellStep {
    pub cell: CellId,
    pub position: usize,
    pub tags: Option<StepTags>,
    pub role: CellRole,
}

/// Derived view of every cell's role, recomputed on each call
pub fn cell_steps<H: NotebookHost + ?Sized>(host: &H) -> Vec<CellStep> {
    let mut current: Option<String> = None;
    let mut result = Vec::new();

    for (position, cell) in host.cell_ids().into_iter().enumerate() {
        let tags = cell_step(host, cell);
        let name = tags.as_ref().map(|t| t.step_name.as_str()).unwrap_or("");

        let role = if name.is_empty() {
            match &current {
                Some(anchor) => CellRole::MergedInto(anchor.clone()),
                None => CellRole::Unassigned,
            }
        } else if name == SKIP {
            CellRole::Skip
        } else {
            current = Some(name.to_string());
            if is_reserved_name(name) {
                CellRole::Reserved(name.to_string())
            } else {
                CellRole::Step(name.to_string())
            }
        };

        result.push(CellStep {
            cell,
            position,
            tags,
            role,
        });
    }

    result
}

/// Encode `step` and keep the tags the codec does not own
fn merge_tags(existing: &[String], step: &StepTags) -> Vec<String> {
    let mut tags = encode(step);
    tags.extend(
        existing
            .iter()
            .filter(|tag| StepTag::parse(tag).is_none())
            .cloned(),
    );
    tags
}
