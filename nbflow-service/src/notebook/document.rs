// Notebook Document
// In-memory .ipynb document implementing the notebook host surface

use crate::notebook::metadata::{NotebookMetadata, METADATA_KEY};
use crate::notebook::{CellId, NotebookHost};

use serde_json::{json, Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur loading or saving a notebook
#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("Notebook not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid notebook JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid notebook: {0}")]
    InvalidFormat(String),

    #[error("Invalid deployment metadata under '{key}': {source}")]
    InvalidMetadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type NotebookResult<T> = Result<T, NotebookError>;

#[derive(Debug, Clone)]
struct Cell {
    id: CellId,
    raw: Value,
}

/// A notebook held as JSON with stable cell identities
///
/// Fields outside of cell tags and the deployment metadata key are kept
/// untouched so a load/save cycle does not lose information.
#[derive(Debug, Clone)]
pub struct NotebookDocument {
    path: Option<PathBuf>,
    root: Map<String, Value>,
    cells: Vec<Cell>,
    next_id: u64,
    generation: u64,
    saves: usize,
    metadata_key: String,
}

impl NotebookDocument {
    /// Create an empty nbformat 4 notebook that is never written to disk
    pub fn new() -> Self {
        let mut root = Map::new();
        root.insert("metadata".to_string(), json!({}));
        root.insert("nbformat".to_string(), json!(4));
        root.insert("nbformat_minor".to_string(), json!(5));
        Self {
            path: None,
            root,
            cells: Vec::new(),
            next_id: 0,
            generation: 0,
            saves: 0,
            metadata_key: METADATA_KEY.to_string(),
        }
    }

    /// Load a notebook file
    pub fn load(path: impl AsRef<Path>) -> NotebookResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NotebookError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let mut doc = Self::parse(&content)?;
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    /// Parse notebook JSON
    pub fn parse(content: &str) -> NotebookResult<Self> {
        let value: Value = serde_json::from_str(content)?;
        let Value::Object(mut root) = value else {
            return Err(NotebookError::InvalidFormat(
                "top level must be an object".to_string(),
            ));
        };

        let raw_cells = match root.remove("cells") {
            Some(Value::Array(cells)) => cells,
            Some(_) => {
                return Err(NotebookError::InvalidFormat(
                    "'cells' must be an array".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let mut doc = Self::new();
        doc.root = root;
        for raw in raw_cells {
            let id = doc.allocate_id();
            doc.cells.push(Cell { id, raw });
        }
        Ok(doc)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// Read and write the deployment configuration under another key
    pub fn with_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_key = key.into();
        self
    }

    /// Number of save requests received so far
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at a document position
    pub fn cell_at(&self, index: usize) -> Option<CellId> {
        self.cells.get(index).map(|c| c.id)
    }

    /// Append a code cell and return its identity
    pub fn push_cell(&mut self, source: &str, tags: Vec<String>) -> CellId {
        self.insert_cell(self.cells.len(), source, tags)
    }

    /// Insert a code cell at `index` (clamped to the end)
    pub fn insert_cell(&mut self, index: usize, source: &str, tags: Vec<String>) -> CellId {
        let id = self.allocate_id();
        let mut raw = json!({
            "cell_type": "code",
            "execution_count": null,
            "metadata": {},
            "outputs": [],
            "source": source,
        });
        if !tags.is_empty() {
            raw["metadata"]["tags"] = json!(tags);
        }
        let index = index.min(self.cells.len());
        self.cells.insert(index, Cell { id, raw });
        self.generation += 1;
        id
    }

    /// Remove a cell, returning its tags as they were at removal time
    pub fn remove_cell(&mut self, cell: CellId) -> Option<Vec<String>> {
        let index = self.cells.iter().position(|c| c.id == cell)?;
        let removed = self.cells.remove(index);
        self.generation += 1;
        Some(read_tags(&removed.raw).unwrap_or_default())
    }

    /// Source text of a cell
    pub fn source(&self, cell: CellId) -> Option<String> {
        let raw = &self.find(cell)?.raw;
        match raw.get("source")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(lines) => Some(
                lines
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .concat(),
            ),
            _ => None,
        }
    }

    /// Deployment configuration, or defaults when the notebook has none
    pub fn metadata(&self) -> NotebookResult<NotebookMetadata> {
        let value = self
            .root
            .get("metadata")
            .and_then(|m| m.get(&self.metadata_key));
        match value {
            None | Some(Value::Null) => Ok(NotebookMetadata::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|source| {
                NotebookError::InvalidMetadata {
                    key: self.metadata_key.clone(),
                    source,
                }
            }),
        }
    }

    /// Replace the deployment configuration
    pub fn set_metadata(&mut self, metadata: &NotebookMetadata) -> NotebookResult<()> {
        let value = serde_json::to_value(metadata)?;
        let entry = self
            .root
            .entry("metadata".to_string())
            .or_insert_with(|| json!({}));
        match entry {
            Value::Object(map) => {
                map.insert(self.metadata_key.clone(), value);
            }
            other => {
                let mut map = Map::new();
                map.insert(self.metadata_key.clone(), value);
                *other = Value::Object(map);
            }
        }
        Ok(())
    }

    /// Full notebook JSON
    pub fn to_value(&self) -> Value {
        let mut root = self.root.clone();
        root.insert(
            "cells".to_string(),
            Value::Array(self.cells.iter().map(|c| c.raw.clone()).collect()),
        );
        Value::Object(root)
    }

    fn find(&self, cell: CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == cell)
    }

    fn allocate_id(&mut self) -> CellId {
        let id = CellId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Default for NotebookDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl NotebookHost for NotebookDocument {
    fn cell_ids(&self) -> Vec<CellId> {
        self.cells.iter().map(|c| c.id).collect()
    }

    fn tags(&self, cell: CellId) -> Option<Vec<String>> {
        read_tags(&self.find(cell)?.raw)
    }

    fn set_tags(&mut self, cell: CellId, tags: Vec<String>) {
        let Some(entry) = self.cells.iter_mut().find(|c| c.id == cell) else {
            return;
        };
        if !entry.raw.is_object() {
            return;
        }
        if !entry.raw.get("metadata").is_some_and(Value::is_object) {
            entry.raw["metadata"] = json!({});
        }
        if let Some(metadata) = entry.raw["metadata"].as_object_mut() {
            if tags.is_empty() {
                metadata.remove("tags");
            } else {
                metadata.insert("tags".to_string(), json!(tags));
            }
        }
        self.generation += 1;
    }

    fn save(&mut self) -> NotebookResult<()> {
        self.saves += 1;
        if let Some(path) = &self.path {
            let mut content = serde_json::to_string_pretty(&self.to_value())?;
            content.push('\n');
            fs::write(path, content)?;
            tracing::debug!(path = %path.display(), "notebook saved");
        }
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn position(&self, cell: CellId) -> Option<usize> {
        self.cells.iter().position(|c| c.id == cell)
    }
}

/// Read `metadata.tags`, ignoring non-string entries
fn read_tags(raw: &Value) -> Option<Vec<String>> {
    let tags = raw.get("metadata")?.get("tags")?.as_array()?;
    Some(
        tags.iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
  "cells": [
    {"cell_type": "code", "metadata": {"tags": ["imports"]}, "source": ["import os\n"],
     "outputs": [], "execution_count": null},
    {"cell_type": "markdown", "metadata": {}, "source": "# Title"},
    {"cell_type": "code", "metadata": {"tags": ["block:load", 5]}, "source": "x = 1",
     "outputs": [], "execution_count": 1}
  ],
  "metadata": {"kernelspec": {"name": "python3"}, "kubeflow_notebook": {"pipeline_name": "demo"}},
  "nbformat": 4,
  "nbformat_minor": 4
}"##;

    #[test]
    fn test_parse_and_read_tags() {
        let doc = NotebookDocument::parse(SAMPLE).unwrap();

        assert_eq!(doc.len(), 3);
        let ids = doc.cell_ids();
        assert_eq!(doc.tags(ids[0]), Some(vec!["imports".to_string()]));
        assert_eq!(doc.tags(ids[1]), None);
        assert_eq!(doc.tags(ids[2]), Some(vec!["block:load".to_string()]));
        assert_eq!(doc.source(ids[0]).as_deref(), Some("import os\n"));
        assert_eq!(doc.metadata().unwrap().pipeline_name, "demo");
    }

    #[test]
    fn test_cell_ids_survive_insert_and_remove() {
        let mut doc = NotebookDocument::parse(SAMPLE).unwrap();
        let ids = doc.cell_ids();

        let inserted = doc.insert_cell(0, "y = 2", vec!["block:first".to_string()]);
        assert_eq!(doc.position(inserted), Some(0));
        assert_eq!(doc.position(ids[2]), Some(3));

        let removed = doc.remove_cell(ids[0]).unwrap();
        assert_eq!(removed, vec!["imports".to_string()]);
        assert_eq!(doc.position(ids[2]), Some(2));
        assert_eq!(doc.tags(ids[2]), Some(vec!["block:load".to_string()]));
    }

    #[test]
    fn test_set_tags_bumps_generation() {
        let mut doc = NotebookDocument::parse(SAMPLE).unwrap();
        let cell = doc.cell_at(1).unwrap();
        let before = doc.generation();

        doc.set_tags(cell, vec!["block:notes".to_string()]);
        assert_eq!(doc.tags(cell), Some(vec!["block:notes".to_string()]));
        assert!(doc.generation() > before);

        doc.set_tags(cell, Vec::new());
        assert_eq!(doc.tags(cell), None);
    }

    #[test]
    fn test_save_round_trip_preserves_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.ipynb");
        fs::write(&path, SAMPLE).unwrap();

        let mut doc = NotebookDocument::load(&path).unwrap();
        let mut metadata = doc.metadata().unwrap();
        metadata.docker_image = "python:3.11".to_string();
        doc.set_metadata(&metadata).unwrap();
        doc.save().unwrap();

        let reloaded = NotebookDocument::load(&path).unwrap();
        assert_eq!(reloaded.metadata().unwrap().docker_image, "python:3.11");
        assert_eq!(reloaded.metadata().unwrap().pipeline_name, "demo");
        let value = reloaded.to_value();
        assert_eq!(value["metadata"]["kernelspec"]["name"], "python3");
        assert_eq!(value["cells"][2]["execution_count"], 1);
        assert_eq!(doc.save_count(), 1);
    }

    #[test]
    fn test_custom_metadata_key() {
        let doc = NotebookDocument::parse(SAMPLE)
            .unwrap()
            .with_metadata_key("other_key");
        assert_eq!(doc.metadata().unwrap().pipeline_name, "");

        let doc = doc.with_metadata_key("kubeflow_notebook");
        assert_eq!(doc.metadata().unwrap().pipeline_name, "demo");
    }

    #[test]
    fn test_unreadable_metadata_is_an_error() {
        let content = SAMPLE.replace(
            r#"{"pipeline_name": "demo"}"#,
            r#"{"pipeline_name": "demo", "volumes": [{"name": "no-type"}]}"#,
        );
        let doc = NotebookDocument::parse(&content).unwrap();

        let err = doc.metadata().unwrap_err();
        assert!(matches!(
            err,
            NotebookError::InvalidMetadata { ref key, .. } if key == "kubeflow_notebook"
        ));
    }

    #[test]
    fn test_null_image_keeps_the_rest_of_the_metadata() {
        let content = SAMPLE.replace(
            r#"{"pipeline_name": "demo"}"#,
            r#"{"pipeline_name": "demo", "experiment_name": "exp", "docker_image": null}"#,
        );
        let doc = NotebookDocument::parse(&content).unwrap();

        let metadata = doc.metadata().unwrap();
        assert_eq!(metadata.pipeline_name, "demo");
        assert_eq!(metadata.experiment_name, "exp");
        assert_eq!(metadata.docker_image, "");
    }

    #[test]
    fn test_load_missing_file() {
        let err = NotebookDocument::load("/definitely/not/here.ipynb").unwrap_err();
        assert!(matches!(err, NotebookError::NotFound(_)));
    }
}
