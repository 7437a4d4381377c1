// Notebook Module
// Host-owned notebook surface and the on-disk .ipynb document

pub mod document;
pub mod metadata;

pub use document::{NotebookDocument, NotebookError, NotebookResult};
pub use metadata::{Experiment, NotebookMetadata, Volume, VolumeType, METADATA_KEY};

use std::fmt;

/// Stable identity of a cell, independent of its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// What the graph logic needs from the application owning the notebook
pub trait NotebookHost {
    /// Cell identities in document order
    fn cell_ids(&self) -> Vec<CellId>;

    /// Raw `tags` metadata of a cell; `None` if the cell is unknown or untagged
    fn tags(&self, cell: CellId) -> Option<Vec<String>>;

    /// Replace the `tags` metadata of a cell
    fn set_tags(&mut self, cell: CellId, tags: Vec<String>);

    /// Request that the document be persisted
    fn save(&mut self) -> NotebookResult<()>;

    /// Counter bumped on every change to cells or their tags
    fn generation(&self) -> u64;

    /// Position of a cell in document order
    fn position(&self, cell: CellId) -> Option<usize> {
        self.cell_ids().iter().position(|id| *id == cell)
    }
}
