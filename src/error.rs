//! Failure taxonomy for launch attempts and the reports shown to the user.
//!
//! Every failure is caught at the boundary of the action that triggered it and
//! turned into an `ErrorReport` via [`RunnerError::report`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::platform::Platform;
use crate::project::ProjectKind;

/// Why no runnable script could be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMissing {
    /// Neither the platform script nor a fallback exists.
    NoScript,
    /// `run.sh` exists but WSL is not available.
    SubsystemUnavailable,
    /// `run.sh` exists but the user declined to run it through WSL.
    FallbackDeclined,
    /// Direct npm mode was requested but `npm` is not on the search path.
    NpmMissing,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to load project paths from {}: {source}", path.display())]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to save project paths to {}: {source}", path.display())]
    ConfigSave {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("project path does not exist: {}", path.display())]
    PathNotFound { kind: ProjectKind, path: PathBuf },

    #[error("no runnable script for {kind} in {}", dir.display())]
    ScriptNotFound {
        kind: ProjectKind,
        dir: PathBuf,
        reason: ScriptMissing,
    },

    #[error("failed to start {program} for {kind}: {source}")]
    Spawn {
        kind: ProjectKind,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("error reading {label} output: {source}")]
    OutputStream {
        label: String,
        #[source]
        source: io::Error,
    },

    #[error("{step} failed: {detail}")]
    Install { step: String, detail: String },
}

/// A user-facing report: a title and a body that may contain captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub title: String,
    pub body: String,
}

impl ErrorReport {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

impl RunnerError {
    /// Converts the error into a report with enough context to self-diagnose.
    pub fn report(&self, platform: Platform) -> ErrorReport {
        match self {
            RunnerError::ConfigLoad { path, source } => ErrorReport::new(
                "Configuration Error",
                format!(
                    "Error loading config {}: {}\n\nDefault project paths remain in effect.",
                    path.display(),
                    source
                ),
            ),
            RunnerError::ConfigSave { path, source } => ErrorReport::new(
                "Save Error",
                format!("Error saving config {}: {}", path.display(), source),
            ),
            RunnerError::PathNotFound { kind, path } => ErrorReport::new(
                "Path Error",
                format!(
                    "Project path does not exist: {}\n\nProject: {}\n{}",
                    path.display(),
                    kind,
                    Platform::host_description()
                ),
            ),
            RunnerError::ScriptNotFound { kind, dir, reason } => ErrorReport::new(
                "Script Not Found",
                format!(
                    "{}\n\nProject: {}\n{}\n\n{}",
                    script_missing_text(*reason, dir, platform),
                    kind,
                    Platform::host_description(),
                    platform.launch_hint()
                ),
            ),
            RunnerError::Spawn { kind, .. } => ErrorReport::new(
                "Error",
                format!(
                    "Error running {} project:\n{}\n\n{}\n\n{}",
                    kind,
                    self,
                    platform.launch_hint(),
                    platform.toolchain_summary()
                ),
            ),
            RunnerError::OutputStream { .. } => ErrorReport::new("Error", self.to_string()),
            RunnerError::Install { .. } => ErrorReport::new(
                "Installation Error",
                format!("{}\n\n{}", self, platform.toolchain_summary()),
            ),
        }
    }
}

fn script_missing_text(reason: ScriptMissing, dir: &std::path::Path, platform: Platform) -> String {
    match (reason, platform) {
        (ScriptMissing::NoScript, Platform::Windows) => format!(
            "Neither run.ps1 nor run.sh was found in {}\n\n\
             Please make sure you have the appropriate script files for your platform.",
            dir.display()
        ),
        (ScriptMissing::NoScript, Platform::Unix) => format!(
            "Script file run.sh not found in {}\n\n\
             Please make sure you have the appropriate script files for your platform.",
            dir.display()
        ),
        (ScriptMissing::SubsystemUnavailable, _) => format!(
            "The PowerShell script (run.ps1) was not found in {}.\n\
             A shell script (run.sh) exists, but Windows Subsystem for Linux (WSL) is not available.\n\n\
             Please make sure you have the appropriate script files for your platform, or install WSL.",
            dir.display()
        ),
        (ScriptMissing::FallbackDeclined, _) => format!(
            "PowerShell script not found in {}, and running run.sh through WSL was declined.",
            dir.display()
        ),
        (ScriptMissing::NpmMissing, _) => {
            "npm not found. Please install Node.js from https://nodejs.org/".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_not_found_report_names_path_and_kind() {
        let err = RunnerError::PathNotFound {
            kind: ProjectKind::Python,
            path: PathBuf::from("/nowhere/Python"),
        };
        let report = err.report(Platform::Unix);
        assert_eq!(report.title, "Path Error");
        assert!(report.body.contains("/nowhere/Python"));
        assert!(report.body.contains("python"));
    }

    #[test]
    fn spawn_report_lists_toolchains() {
        let err = RunnerError::Spawn {
            kind: ProjectKind::Java,
            program: "powershell".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
        };
        let report = err.report(Platform::Windows);
        assert!(report.body.contains("Error running java project"));
        assert!(report.body.contains("JDK 17 or later"));
        assert!(report.body.contains("Set-ExecutionPolicy"));
    }

    #[test]
    fn declined_fallback_is_explained() {
        let err = RunnerError::ScriptNotFound {
            kind: ProjectKind::Cpp,
            dir: PathBuf::from("C:\\proj"),
            reason: ScriptMissing::FallbackDeclined,
        };
        let report = err.report(Platform::Windows);
        assert_eq!(report.title, "Script Not Found");
        assert!(report.body.contains("declined"));
    }
}
