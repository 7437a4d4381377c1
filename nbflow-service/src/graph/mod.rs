// Graph Module
// Step graph derived from cell tags and the operations that keep it consistent

pub mod check;
pub mod dag;
pub mod index;
pub mod maintainer;

pub use check::{check_document, existing_owner, DocumentIssue};
pub use dag::{DependencyGraph, GraphError, StepDag, StepNode};
pub use index::StepIndex;
pub use maintainer::{
    cell_step, cell_steps, clear_step, closest_prior_step, list_all_step_names,
    merge_into_previous, on_cell_removed, rename, set_step, CellRole, CellStep,
};
