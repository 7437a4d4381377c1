// Step Index
// Cached per-cell step view, rebuilt when the notebook changes

use crate::graph::maintainer::{cell_steps, CellRole, CellStep};
use crate::notebook::{CellId, NotebookHost};

use std::collections::BTreeSet;

/// Lazily rebuilt view over [`cell_steps`]
///
/// The cache is keyed on the host's generation counter, so any edit to the
/// cells or their tags invalidates it.
#[derive(Debug, Default)]
pub struct StepIndex {
    generation: Option<u64>,
    entries: Vec<CellStep>,
}

impl StepIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view of the host's cells
    pub fn entries<H: NotebookHost + ?Sized>(&mut self, host: &H) -> &[CellStep] {
        let generation = host.generation();
        if self.generation != Some(generation) {
            self.entries = cell_steps(host);
            self.generation = Some(generation);
            tracing::trace!(generation, cells = self.entries.len(), "step index rebuilt");
        }
        &self.entries
    }

    pub fn role<H: NotebookHost + ?Sized>(&mut self, host: &H, cell: CellId) -> Option<CellRole> {
        self.entries(host)
            .iter()
            .find(|entry| entry.cell == cell)
            .map(|entry| entry.role.clone())
    }

    /// Names of real pipeline steps in document order
    pub fn step_names<H: NotebookHost + ?Sized>(&mut self, host: &H) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.entries(host)
            .iter()
            .filter_map(|entry| match &entry.role {
                CellRole::Step(name) => Some(name.clone()),
                _ => None,
            })
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// Cells belonging to `step`, its anchor first
    ///
    /// Untagged cells below a `skip` cell still merge into the step above it.
    pub fn cells_of<H: NotebookHost + ?Sized>(&mut self, host: &H, step: &str) -> Vec<CellId> {
        self.entries(host)
            .iter()
            .filter(|entry| match &entry.role {
                CellRole::Step(name) | CellRole::Reserved(name) | CellRole::MergedInto(name) => {
                    name == step
                }
                CellRole::Skip | CellRole::Unassigned => false,
            })
            .map(|entry| entry.cell)
            .collect()
    }
}
