// Deploy State
// Per-deployment records and the session that owns them

use crate::backend::{CompiledPipeline, KatibExperiment, RokTask, RunInfo, UploadedPipeline};
use crate::deploy::events::DeployStage;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifier of one deployment attempt within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeployIndex(u64);

impl DeployIndex {
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeployIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How far a deployment goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployType {
    Compile,
    Upload,
    Run,
}

impl DeployType {
    pub fn uploads(&self) -> bool {
        matches!(self, DeployType::Upload | DeployType::Run)
    }

    pub fn runs(&self) -> bool {
        matches!(self, DeployType::Run)
    }
}

impl fmt::Display for DeployType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployType::Compile => "compile",
            DeployType::Upload => "upload",
            DeployType::Run => "run",
        };
        f.write_str(name)
    }
}

impl FromStr for DeployType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compile" => Ok(DeployType::Compile),
            "upload" => Ok(DeployType::Upload),
            "run" => Ok(DeployType::Run),
            other => Err(format!(
                "unknown deployment type '{}' (expected compile, upload or run)",
                other
            )),
        }
    }
}

/// Everything known about one deployment attempt
#[derive(Debug, Clone)]
pub struct DeployRun {
    pub index: DeployIndex,
    pub deploy_type: DeployType,
    pub in_progress: bool,
    pub notebook_validation: Option<bool>,
    pub task: Option<RokTask>,
    pub compiled: Option<CompiledPipeline>,
    pub script_path: Option<PathBuf>,
    pub upload: Option<UploadedPipeline>,
    pub run: Option<RunInfo>,
    pub katib_experiment: Option<KatibExperiment>,
    pub warnings: Vec<String>,
    pub failed_stage: Option<DeployStage>,
    /// Hidden from view; in-flight work is not aborted
    pub deleted: bool,
}

impl DeployRun {
    fn new(index: DeployIndex, deploy_type: DeployType) -> Self {
        Self {
            index,
            deploy_type,
            in_progress: true,
            notebook_validation: None,
            task: None,
            compiled: None,
            script_path: None,
            upload: None,
            run: None,
            katib_experiment: None,
            warnings: Vec::new(),
            failed_stage: None,
            deleted: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.in_progress && self.failed_stage.is_none()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    next_index: u64,
    runs: BTreeMap<DeployIndex, DeployRun>,
}

/// Deployments started during one session
///
/// Clones share the same records, so several workflows can run against
/// one session while a viewer reads or dismisses them. Locks are held only
/// for the duration of a single read or update.
#[derive(Debug, Clone, Default)]
pub struct DeploySession {
    state: Arc<Mutex<SessionState>>,
}

impl DeploySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for a new deployment attempt
    pub fn start(&self, deploy_type: DeployType) -> DeployIndex {
        let mut state = self.lock();
        let index = DeployIndex(state.next_index);
        state.next_index += 1;
        state.runs.insert(index, DeployRun::new(index, deploy_type));
        index
    }

    /// Snapshot of one record
    pub fn get(&self, index: DeployIndex) -> Option<DeployRun> {
        self.lock().runs.get(&index).cloned()
    }

    /// Apply a stage result to a record
    ///
    /// Dismissed records no longer take stage results; returns whether the
    /// update was applied.
    pub fn update(&self, index: DeployIndex, apply: impl FnOnce(&mut DeployRun)) -> bool {
        match self.lock().runs.get_mut(&index) {
            Some(run) if !run.deleted => {
                apply(run);
                true
            }
            Some(run) => {
                tracing::debug!(index = %run.index, "ignoring update to dismissed deployment");
                false
            }
            None => false,
        }
    }

    /// Mark a record as no longer in progress, dismissed or not
    pub fn finish(&self, index: DeployIndex, failed_stage: Option<DeployStage>) {
        if let Some(run) = self.lock().runs.get_mut(&index) {
            run.in_progress = false;
            if !run.deleted {
                run.failed_stage = failed_stage;
            }
        }
    }

    /// Hide a deployment; its record is kept
    pub fn dismiss(&self, index: DeployIndex) -> bool {
        match self.lock().runs.get_mut(&index) {
            Some(run) => {
                run.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Deployments that have not been dismissed, oldest first
    pub fn visible(&self) -> Vec<DeployRun> {
        self.lock()
            .runs
            .values()
            .filter(|run| !run.deleted)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().runs.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_monotonic_per_session() {
        let session = DeploySession::new();
        let a = session.start(DeployType::Compile);
        let b = session.start(DeployType::Run);
        assert!(b > a);

        let other = DeploySession::new().start(DeployType::Run);
        assert_eq!(other, a);
    }

    #[test]
    fn test_dismiss_is_soft() {
        let session = DeploySession::new();
        let a = session.start(DeployType::Compile);
        let b = session.start(DeployType::Upload);

        assert!(session.dismiss(a));
        assert_eq!(session.len(), 2);
        assert!(session.get(a).unwrap().deleted);
        let visible: Vec<DeployIndex> = session.visible().iter().map(|r| r.index).collect();
        assert_eq!(visible, vec![b]);
    }

    #[test]
    fn test_dismissed_record_ignores_stage_updates() {
        let session = DeploySession::new();
        let index = session.start(DeployType::Compile);

        assert!(session.update(index, |run| run.notebook_validation = Some(true)));
        session.dismiss(index);
        let applied = session.update(index, |run| {
            run.script_path = Some(PathBuf::from("/x/kale.py"));
        });
        assert!(!applied);
        session.finish(index, Some(DeployStage::Compile));

        let run = session.get(index).unwrap();
        assert_eq!(run.notebook_validation, Some(true));
        assert!(run.script_path.is_none());
        assert!(run.failed_stage.is_none());
        assert!(!run.in_progress);
    }

    #[test]
    fn test_clones_share_records() {
        let session = DeploySession::new();
        let viewer = session.clone();

        let index = session.start(DeployType::Run);
        viewer.dismiss(index);

        assert!(session.get(index).unwrap().deleted);
        assert!(session.visible().is_empty());
        assert_eq!(viewer.len(), 1);
    }

    #[test]
    fn test_deploy_type_parsing() {
        assert_eq!("Run".parse::<DeployType>(), Ok(DeployType::Run));
        assert!("deploy".parse::<DeployType>().is_err());
        assert!(DeployType::Run.uploads());
        assert!(!DeployType::Compile.uploads());
    }
}
