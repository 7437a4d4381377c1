// Step names
// Reserved pseudo-step names and name validation

use regex::Regex;
use std::sync::LazyLock;

/// Cell holds imports shared by every step
pub const IMPORTS: &str = "imports";
/// Cell holds function definitions shared by every step
pub const FUNCTIONS: &str = "functions";
/// Cell declares pipeline parameters
pub const PIPELINE_PARAMETERS: &str = "pipeline-parameters";
/// Cell declares pipeline metrics
pub const PIPELINE_METRICS: &str = "pipeline-metrics";
/// Cell is excluded from the pipeline
pub const SKIP: &str = "skip";

/// Pseudo-step names with special compilation semantics
pub const RESERVED_NAMES: [&str; 5] = [
    IMPORTS,
    FUNCTIONS,
    PIPELINE_PARAMETERS,
    PIPELINE_METRICS,
    SKIP,
];

static STEP_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[_a-z][_a-z0-9]*$").ok());

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Whether `name` is usable as a user-defined step name
pub fn is_valid_step_name(name: &str) -> bool {
    STEP_NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Whether `name` may appear as a cell's block name
pub fn is_assignable_name(name: &str) -> bool {
    is_reserved_name(name) || is_valid_step_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved_name("skip"));
        assert!(is_reserved_name("pipeline-parameters"));
        assert!(!is_reserved_name("train"));
    }

    #[test]
    fn test_step_name_validation() {
        assert!(is_valid_step_name("load_data"));
        assert!(is_valid_step_name("_private"));
        assert!(is_valid_step_name("step2"));
        assert!(!is_valid_step_name("2step"));
        assert!(!is_valid_step_name("Train"));
        assert!(!is_valid_step_name("has-dash"));
        assert!(!is_valid_step_name(""));
    }

    #[test]
    fn test_assignable_names() {
        assert!(is_assignable_name("pipeline-metrics"));
        assert!(is_assignable_name("train"));
        assert!(!is_assignable_name("pipeline metrics"));
    }
}
