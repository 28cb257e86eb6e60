//! Web UI installation and removal.
//!
//! `install` lays down a self-contained tree the server can use as its web
//! root: the browser assets, a `models.json` catalog and a
//! `pull-bridge.toml` whose `web_root` points back at the tree. `uninstall`
//! removes it again. Both accept a dry-run flag that reports the planned
//! actions without touching the disk.

pub mod catalog;

use std::env;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

use self::catalog::{bundled_catalog, render_catalog, ModelEntry};

/// Directory created under the home directory when no target is given.
pub const DEFAULT_DIR_NAME: &str = "ollama-webui";

/// Config file written into an installed tree.
pub const CONFIG_FILE_NAME: &str = "pull-bridge.toml";

/// File whose presence marks a directory as an installed web UI.
pub const MARKER_FILE: &str = "index.html";

const STATIC_ASSETS: &[(&str, &str)] = &[
    ("index.html", include_str!("../../assets/index.html")),
    ("style.css", include_str!("../../assets/style.css")),
    ("script.js", include_str!("../../assets/script.js")),
];

/// One filesystem change performed, or planned under dry-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployAction {
    /// Create a directory and any missing parents.
    CreateDir(PathBuf),
    /// Write (or overwrite) a file.
    WriteFile(PathBuf),
    /// Recursively delete a directory.
    RemoveTree(PathBuf),
}

impl Display for DeployAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir(path) => write!(f, "create {}", path.display()),
            Self::WriteFile(path) => write!(f, "write {}", path.display()),
            Self::RemoveTree(path) => write!(f, "remove {}", path.display()),
        }
    }
}

/// Summary of an install or uninstall run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    /// Whether the actions were only planned.
    pub dry_run: bool,
    /// Actions in the order they were (or would be) applied.
    pub actions: Vec<DeployAction>,
}

/// Options for [`install`].
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Directory the web UI is written to.
    pub target: PathBuf,
    /// Report actions without performing them.
    pub dry_run: bool,
    /// Catalog written as `models.json`; the bundled one when `None`.
    pub catalog: Option<Vec<ModelEntry>>,
}

#[derive(Serialize)]
struct ConfigTemplate<'a> {
    web_root: String,
    bind_address: String,
    http_port: u16,
    pull_command: &'a str,
    pull_command_args: &'a [String],
}

/// `$HOME/ollama-webui` (or `%USERPROFILE%\ollama-webui`).
///
/// # Errors
///
/// Returns `AppError::Deploy` when no home directory is known.
pub fn default_target() -> Result<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(DEFAULT_DIR_NAME))
        .ok_or_else(|| {
            AppError::Deploy("no home directory found; pass the target directory explicitly".into())
        })
}

/// Render every file of the web UI tree rooted at `target`.
///
/// # Errors
///
/// Returns `AppError::Deploy` if the catalog or config cannot be rendered.
pub fn render_bundle(target: &Path, catalog: &[ModelEntry]) -> Result<Vec<(&'static str, String)>> {
    let mut files: Vec<(&'static str, String)> = STATIC_ASSETS
        .iter()
        .map(|(name, body)| (*name, (*body).to_owned()))
        .collect();
    files.push(("models.json", render_catalog(catalog)?));
    files.push((CONFIG_FILE_NAME, render_config(target)?));
    Ok(files)
}

/// Install the web UI into `options.target`, overwriting existing files.
///
/// # Errors
///
/// Returns `AppError::Deploy` if the target path cannot be resolved or a
/// file cannot be rendered, and `AppError::Io` if writing fails.
pub fn install(options: &InstallOptions) -> Result<DeployReport> {
    let target = absolute(&options.target)?;
    let catalog = match &options.catalog {
        Some(catalog) => catalog.clone(),
        None => bundled_catalog()?,
    };
    let files = render_bundle(&target, &catalog)?;

    let mut report = DeployReport {
        dry_run: options.dry_run,
        actions: Vec::with_capacity(files.len() + 1),
    };

    report.actions.push(DeployAction::CreateDir(target.clone()));
    if options.dry_run {
        info!(path = %target.display(), "[dry-run] would create directory");
    } else {
        fs::create_dir_all(&target)?;
        debug!(path = %target.display(), "directory ready");
    }

    for (name, body) in files {
        let path = target.join(name);
        if options.dry_run {
            info!(path = %path.display(), "[dry-run] would write file");
        } else {
            fs::write(&path, body)?;
            debug!(path = %path.display(), "wrote file");
        }
        report.actions.push(DeployAction::WriteFile(path));
    }

    if !options.dry_run {
        info!(path = %target.display(), "web UI installed");
    }
    Ok(report)
}

/// Remove an installed web UI tree.
///
/// A missing directory is not an error; the report is simply empty.
///
/// # Errors
///
/// Returns `AppError::Deploy` if `target` is not a directory or does not
/// contain [`MARKER_FILE`], and `AppError::Io` if deletion fails.
pub fn uninstall(target: &Path, dry_run: bool) -> Result<DeployReport> {
    let target = absolute(target)?;
    let mut report = DeployReport {
        dry_run,
        actions: Vec::new(),
    };

    if !target.exists() {
        info!(path = %target.display(), "nothing to uninstall: directory does not exist");
        return Ok(report);
    }
    if !target.is_dir() {
        return Err(AppError::Deploy(format!(
            "{} is not a directory",
            target.display()
        )));
    }
    if !target.join(MARKER_FILE).is_file() {
        return Err(AppError::Deploy(format!(
            "{} does not look like a web UI install (no {MARKER_FILE}); refusing to delete it",
            target.display()
        )));
    }

    if dry_run {
        info!(path = %target.display(), "[dry-run] would delete directory");
    } else {
        fs::remove_dir_all(&target)?;
        info!(path = %target.display(), "web UI removed");
    }
    report.actions.push(DeployAction::RemoveTree(target));
    Ok(report)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(AppError::Deploy("target directory must not be empty".into()));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir()
        .map_err(|err| AppError::Deploy(format!("cannot resolve current directory: {err}")))?;
    Ok(cwd.join(path))
}

fn render_config(target: &Path) -> Result<String> {
    let defaults = GlobalConfig::default();
    let template = ConfigTemplate {
        web_root: target.to_string_lossy().into_owned(),
        bind_address: defaults.bind_address.to_string(),
        http_port: defaults.http_port,
        pull_command: &defaults.pull_command,
        pull_command_args: &defaults.pull_command_args,
    };
    toml::to_string(&template)
        .map_err(|err| AppError::Deploy(format!("failed to render {CONFIG_FILE_NAME}: {err}")))
}
