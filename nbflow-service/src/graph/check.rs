// Document Check
// Structural problems in a notebook's step tags

use crate::graph::dag::{GraphError, StepDag};
use crate::graph::maintainer::cell_step;
use crate::notebook::{CellId, NotebookHost};
use crate::tags::{is_reserved_name, is_valid_step_name};

use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentIssue {
    /// More than one cell declares the same step
    DuplicateStep { name: String, cells: Vec<CellId> },
    /// A block name that is neither reserved nor a valid identifier
    InvalidName { name: String, cell: CellId },
    /// A dependency on a step no cell declares
    DanglingDependency {
        step: String,
        dependency: String,
        cell: CellId,
    },
    /// Steps that depend on each other
    Cycle(Vec<String>),
}

impl fmt::Display for DocumentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentIssue::DuplicateStep { name, cells } => {
                write!(f, "step '{}' is declared by {} cells", name, cells.len())
            }
            DocumentIssue::InvalidName { name, cell } => {
                write!(f, "{}: '{}' is not a valid step name", cell, name)
            }
            DocumentIssue::DanglingDependency {
                step,
                dependency,
                cell,
            } => {
                let step = if step.is_empty() { "<unnamed>" } else { step };
                write!(
                    f,
                    "{}: step '{}' depends on unknown step '{}'",
                    cell, step, dependency
                )
            }
            DocumentIssue::Cycle(names) => {
                write!(f, "circular dependency between: {}", names.join(", "))
            }
        }
    }
}

/// Whether declaring `name` makes a cell the owner of a unique step
fn claims_name(name: &str) -> bool {
    !name.is_empty() && !is_reserved_name(name)
}

/// First cell other than `cell` that already declares step `name`
///
/// Reserved names and the empty name may appear on any number of cells.
pub fn existing_owner<H: NotebookHost + ?Sized>(
    host: &H,
    name: &str,
    cell: CellId,
) -> Option<CellId> {
    if !claims_name(name) {
        return None;
    }
    host.cell_ids().into_iter().find(|&other| {
        other != cell && cell_step(host, other).map_or(false, |step| step.step_name == name)
    })
}

/// Every structural problem in the document, in document order
pub fn check_document<H: NotebookHost + ?Sized>(host: &H) -> Vec<DocumentIssue> {
    let mut issues = Vec::new();
    let mut owners: HashMap<String, Vec<CellId>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut declared = BTreeSet::new();
    let mut edges: Vec<(CellId, String, String)> = Vec::new();

    for cell in host.cell_ids() {
        let Some(step) = cell_step(host, cell) else {
            continue;
        };
        let name = step.step_name;

        if claims_name(&name) {
            if !is_valid_step_name(&name) {
                issues.push(DocumentIssue::InvalidName {
                    name: name.clone(),
                    cell,
                });
            }
            if !owners.contains_key(&name) {
                order.push(name.clone());
            }
            owners.entry(name.clone()).or_default().push(cell);
        }
        if !name.is_empty() {
            declared.insert(name.clone());
        }

        for dep in step.dependencies {
            edges.push((cell, name.clone(), dep));
        }
    }

    for name in order {
        if let Some(cells) = owners.remove(&name) {
            if cells.len() > 1 {
                issues.push(DocumentIssue::DuplicateStep { name, cells });
            }
        }
    }

    for (cell, step, dependency) in edges {
        if !declared.contains(&dependency) {
            issues.push(DocumentIssue::DanglingDependency {
                step,
                dependency,
                cell,
            });
        }
    }

    if let Err(GraphError::Cycle(names)) = StepDag::from_host(host).topological_order() {
        issues.push(DocumentIssue::Cycle(names));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::NotebookDocument;

    fn tags(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_document_has_no_issues() {
        let mut doc = NotebookDocument::new();
        doc.push_cell("", tags(&["imports"]));
        doc.push_cell("", tags(&["block:load"]));
        doc.push_cell("", tags(&["block:train", "prev:load"]));

        assert!(check_document(&doc).is_empty());
    }

    #[test]
    fn test_reports_each_issue_kind() {
        let mut doc = NotebookDocument::new();
        let bad = doc.push_cell("", tags(&["block:Load-Data"]));
        let a1 = doc.push_cell("", tags(&["block:a", "prev:b"]));
        let b = doc.push_cell("", tags(&["block:b", "prev:a"]));
        let a2 = doc.push_cell("", tags(&["block:a"]));
        doc.push_cell("", tags(&["prev:ghost"]));

        let issues = check_document(&doc);

        assert!(issues.contains(&DocumentIssue::InvalidName {
            name: "Load-Data".to_string(),
            cell: bad,
        }));
        assert!(issues.contains(&DocumentIssue::DuplicateStep {
            name: "a".to_string(),
            cells: vec![a1, a2],
        }));
        assert!(issues.iter().any(|i| matches!(
            i,
            DocumentIssue::DanglingDependency { dependency, .. } if dependency == "ghost"
        )));
        assert!(issues.contains(&DocumentIssue::Cycle(vec![
            "a".to_string(),
            "b".to_string()
        ])));
        assert!(!issues.iter().any(|i| matches!(
            i,
            DocumentIssue::DanglingDependency { cell, .. } if *cell == b
        )));
    }

    #[test]
    fn test_existing_owner_finds_other_declaring_cell() {
        let mut doc = NotebookDocument::new();
        let load = doc.push_cell("", tags(&["block:load"]));
        let train = doc.push_cell("", tags(&["block:train", "prev:load"]));
        doc.push_cell("", tags(&["imports"]));
        let spare = doc.push_cell("", Vec::new());

        assert_eq!(existing_owner(&doc, "load", spare), Some(load));
        assert_eq!(existing_owner(&doc, "load", train), Some(load));
        // A cell does not conflict with itself
        assert_eq!(existing_owner(&doc, "load", load), None);
        assert_eq!(existing_owner(&doc, "evaluate", spare), None);
        assert_eq!(existing_owner(&doc, "imports", spare), None);
        assert_eq!(existing_owner(&doc, "", spare), None);
    }
}
