//! Configuration management for devrunner.
//!
//! Two files are involved: the project paths file (`project_paths.json`), a flat
//! mapping from project id to directory that the user edits from the UI, and the
//! optional runner settings file (`devrunner.toml`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::project::ProjectKind;

/// Default location of the project paths file, relative to the working directory.
pub const PATHS_FILE: &str = "project_paths.json";
/// Default location of the runner settings file.
pub const SETTINGS_FILE: &str = "devrunner.toml";

/// Directory configured for each project kind.
///
/// Every kind always has a value; keys missing from the file keep their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectPaths {
    java: String,
    cpp: String,
    python: String,
    typescript: String,
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self {
            java: ProjectKind::Java.default_path().to_string(),
            cpp: ProjectKind::Cpp.default_path().to_string(),
            python: ProjectKind::Python.default_path().to_string(),
            typescript: ProjectKind::TypeScript.default_path().to_string(),
        }
    }
}

impl ProjectPaths {
    /// Loads the defaults overlaid with whatever keys the file provides.
    ///
    /// A missing file is not an error. Unknown keys are ignored; anything but a
    /// JSON object of strings is rejected.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let load_error = |source: std::io::Error| RunnerError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        };
        let raw = std::fs::read_to_string(path).map_err(load_error)?;
        let entries: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|err| load_error(err.into()))?;
        let mut paths = Self::default();
        for kind in ProjectKind::ALL {
            if let Some(value) = entries.get(kind.id()) {
                paths.set(kind, value.as_str());
            }
        }
        Ok(paths)
    }

    /// Like [`ProjectPaths::load`], but keeps the defaults when loading fails.
    pub fn load_or_default(path: &Path) -> (Self, Option<RunnerError>) {
        match Self::load(path) {
            Ok(paths) => (paths, None),
            Err(err) => {
                tracing::warn!(error = %err, "using default project paths");
                (Self::default(), Some(err))
            }
        }
    }

    /// Writes the mapping as JSON indented with four spaces, replacing the file.
    pub fn save(&self, path: &Path) -> Result<(), RunnerError> {
        let save_error = |source: std::io::Error| RunnerError::ConfigSave {
            path: path.to_path_buf(),
            source,
        };
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)
            .map_err(|err| save_error(err.into()))?;
        out.push(b'\n');
        std::fs::write(path, out).map_err(save_error)?;
        tracing::info!(path = %path.display(), "saved project paths");
        Ok(())
    }

    pub fn get(&self, kind: ProjectKind) -> &str {
        match kind {
            ProjectKind::Java => &self.java,
            ProjectKind::Cpp => &self.cpp,
            ProjectKind::Python => &self.python,
            ProjectKind::TypeScript => &self.typescript,
        }
    }

    pub fn set(&mut self, kind: ProjectKind, value: impl Into<String>) {
        let slot = match kind {
            ProjectKind::Java => &mut self.java,
            ProjectKind::Cpp => &mut self.cpp,
            ProjectKind::Python => &mut self.python,
            ProjectKind::TypeScript => &mut self.typescript,
        };
        *slot = value.into();
    }
}

/// Top-level structure of `devrunner.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Maximum number of output lines kept in memory per project.
    pub max_lines: Option<usize>,
    /// Whether to use Unicode symbols in the TUI (default: true).
    pub symbols: Option<bool>,
    /// Template for per-launch output log files (e.g. "logs/{name}-{time}.log").
    pub log_file: Option<String>,
    /// Grace period between interrupting and killing children on quit.
    pub shutdown_ms: Option<u64>,
    /// Alternative location of the project paths file.
    pub paths_file: Option<PathBuf>,
    /// Start the TypeScript project with `npm run dev` instead of its script.
    pub typescript_npm: Option<bool>,
}

/// Loads and parses the settings file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}
