pub mod deploy;
pub mod env;
pub mod steps;

use crate::output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;

use nbflow_rpc::{RpcClient, RpcConfig, SubprocessKernel};
use nbflow_service::{Backend, Settings};

/// Settings from the default location; a broken file is an error
pub fn load_settings() -> Result<Settings> {
    Settings::load().wrap_err_with(|| {
        format!(
            "Failed to load settings from {}",
            Settings::default_path().display()
        )
    })
}

/// Canonical path of an existing notebook
pub fn notebook_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        bail!("Notebook not found: {}", path.display());
    }
    Ok(path.canonicalize()?)
}

/// Backend for `notebook`, served by a kernel started next to it
///
/// The interpreter is `python` if given, then the configured one, then
/// the first `python3` on PATH.
pub fn connect(notebook: &Path, python: Option<&PathBuf>, settings: &Settings) -> Result<Backend> {
    let kernel = match python.or(settings.python.as_ref()) {
        Some(python) => SubprocessKernel::new(python),
        None => SubprocessKernel::discover()
            .ok_or_else(|| eyre!("No Python interpreter found on PATH; pass --python"))?,
    };
    let kernel = match notebook.parent() {
        Some(dir) => kernel.with_working_dir(dir),
        None => kernel,
    };
    tracing::debug!(
        python = %kernel.python().display(),
        notebook = %notebook.display(),
        "starting backend kernel"
    );
    output::status("Kernel", &format!("{}", kernel.python().display()));

    let client = RpcClient::new(Arc::new(kernel)).with_config(RpcConfig {
        entry_module: settings.entry_module.clone(),
    });
    Ok(Backend::for_notebook(
        client,
        notebook.to_string_lossy().to_string(),
    ))
}
