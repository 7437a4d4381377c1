// Tag Codec
// Encodes a step's identity, dependencies and limits into cell tags

use crate::tags::names::is_reserved_name;

use std::collections::BTreeMap;
use std::fmt;

const BLOCK_PREFIX: &str = "block:";
const PREV_PREFIX: &str = "prev:";
const LIMIT_PREFIX: &str = "limit:";

/// A single tag understood by the codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTag {
    /// `block:<name>`, or the bare name for reserved names
    Block(String),
    /// `prev:<name>`
    Prev(String),
    /// `limit:<key>:<value>`
    Limit { key: String, value: String },
}

impl StepTag {
    /// Parse one raw tag, returning `None` for tags the codec does not own
    pub fn parse(raw: &str) -> Option<Self> {
        if is_reserved_name(raw) {
            return Some(StepTag::Block(raw.to_string()));
        }
        if let Some(name) = raw.strip_prefix(BLOCK_PREFIX) {
            return Some(StepTag::Block(name.to_string()));
        }
        if let Some(name) = raw.strip_prefix(PREV_PREFIX) {
            return Some(StepTag::Prev(name.to_string()));
        }
        if let Some(rest) = raw.strip_prefix(LIMIT_PREFIX) {
            // The key is taken up to the first colon; everything after the
            // second colon of the full tag is the value.
            let mut parts = rest.splitn(2, ':');
            let key = parts.next().unwrap_or_default().to_string();
            let value = parts.next().unwrap_or_default().to_string();
            return Some(StepTag::Limit { key, value });
        }
        None
    }
}

impl fmt::Display for StepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTag::Block(name) if is_reserved_name(name) => write!(f, "{}", name),
            StepTag::Block(name) => write!(f, "{}{}", BLOCK_PREFIX, name),
            StepTag::Prev(name) => write!(f, "{}{}", PREV_PREFIX, name),
            StepTag::Limit { key, value } => write!(f, "{}{}:{}", LIMIT_PREFIX, key, value),
        }
    }
}

/// Decoded step information of one cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTags {
    /// Block name; empty when the cell continues the previous step
    pub step_name: String,
    /// Names of steps that must run before this one
    pub dependencies: Vec<String>,
    /// Resource limits, e.g. `nvidia.com/gpu -> 1`
    pub limits: BTreeMap<String, String>,
}

impl StepTags {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            ..Default::default()
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.limits.insert(key.into(), value.into());
        self
    }

    /// Whether the cell names a step that takes part in the graph
    pub fn is_step(&self) -> bool {
        !self.step_name.is_empty() && !is_reserved_name(&self.step_name)
    }

    /// Whether the cell anchors a step that later cells can merge into
    pub fn is_anchor(&self) -> bool {
        !self.step_name.is_empty() && self.step_name != crate::tags::names::SKIP
    }
}

/// Decode a cell's tags; `None` when the cell carries no tags at all
pub fn decode<S: AsRef<str>>(tags: &[S]) -> Option<StepTags> {
    if tags.is_empty() {
        return None;
    }

    let mut decoded = StepTags::default();
    let mut has_block = false;

    for raw in tags {
        match StepTag::parse(raw.as_ref()) {
            Some(StepTag::Block(name)) => {
                if !has_block {
                    decoded.step_name = name;
                    has_block = true;
                }
            }
            Some(StepTag::Prev(name)) => decoded.dependencies.push(name),
            Some(StepTag::Limit { key, value }) => {
                decoded.limits.insert(key, value);
            }
            None => {}
        }
    }

    Some(decoded)
}

/// Encode step information as tags: block, then prevs, then limits
pub fn encode(step: &StepTags) -> Vec<String> {
    let mut tags = Vec::with_capacity(1 + step.dependencies.len() + step.limits.len());

    if !step.step_name.is_empty() {
        tags.push(StepTag::Block(step.step_name.clone()).to_string());
    }
    tags.extend(
        step.dependencies
            .iter()
            .map(|dep| StepTag::Prev(dep.clone()).to_string()),
    );
    tags.extend(step.limits.iter().map(|(key, value)| {
        StepTag::Limit {
            key: key.clone(),
            value: value.clone(),
        }
        .to_string()
    }));

    tags
}
