//! Script resolution: deciding what to run for a project on this platform.
//!
//! Resolution happens once per launch attempt. When the only runnable option
//! is the Unix script through WSL on Windows, the caller gets a
//! [`Resolution::ConfirmFallback`] and asks the user before launching.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::deps;
use crate::error::{RunnerError, ScriptMissing};
use crate::platform::Platform;
use crate::project::ProjectKind;

/// Checks for the Linux compatibility subsystem.
pub trait SubsystemProbe {
    fn wsl_available(&self) -> bool;
}

const WSL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of running `wsl --status` on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe {
    wsl: bool,
}

impl HostProbe {
    /// Runs the probe. A probe that does not finish within a few seconds
    /// counts as no subsystem.
    pub async fn detect(platform: Platform) -> Self {
        if platform != Platform::Windows {
            return Self { wsl: false };
        }
        let status = Command::new("wsl")
            .arg("--status")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        let wsl = match tokio::time::timeout(WSL_PROBE_TIMEOUT, status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "wsl is not available");
                false
            }
            Err(_) => {
                tracing::warn!("wsl --status timed out");
                false
            }
        };
        Self { wsl }
    }
}

impl SubsystemProbe for HostProbe {
    fn wsl_available(&self) -> bool {
        self.wsl
    }
}

/// How a resolved project is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `powershell -ExecutionPolicy Bypass -NoProfile -File run.ps1`
    PowerShell { script: PathBuf },
    /// `run.sh` through WSL, from the project directory.
    Wsl { script: PathBuf },
    /// `run.sh` executed directly.
    Shell { script: PathBuf },
    /// `npm run dev`, optionally preceded by `npm install`.
    NpmDev { npm: PathBuf, install_first: bool },
}

/// A validated decision about what to run and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPlan {
    pub kind: ProjectKind,
    /// Absolute project directory, used as the working directory.
    pub dir: PathBuf,
    pub invocation: Invocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready(ScriptPlan),
    /// Only the WSL fallback is available and the user must approve it.
    ConfirmFallback(ScriptPlan),
}

/// What to do when the WSL fallback is the only option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    Ask,
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub platform: Platform,
    pub fallback: FallbackPolicy,
    /// Start TypeScript through npm instead of its script.
    pub npm_direct: bool,
}

/// Resolves the configured path of `kind` into a launch plan.
pub fn resolve(
    kind: ProjectKind,
    configured: &str,
    options: ResolveOptions,
    probe: &dyn SubsystemProbe,
) -> Result<Resolution, RunnerError> {
    let dir = project_dir(kind, configured)?;

    if options.npm_direct && kind == ProjectKind::TypeScript {
        let Some(npm) = deps::locate("npm") else {
            return Err(script_missing(kind, dir, ScriptMissing::NpmMissing));
        };
        let install_first = !dir.join("node_modules").exists();
        return Ok(Resolution::Ready(ScriptPlan {
            kind,
            dir,
            invocation: Invocation::NpmDev { npm, install_first },
        }));
    }

    match options.platform {
        Platform::Windows => {
            let ps1 = dir.join(Platform::Windows.script_name());
            if ps1.exists() {
                return Ok(Resolution::Ready(ScriptPlan {
                    kind,
                    dir,
                    invocation: Invocation::PowerShell { script: ps1 },
                }));
            }
            let sh = dir.join(Platform::Unix.script_name());
            if !sh.exists() {
                return Err(script_missing(kind, dir, ScriptMissing::NoScript));
            }
            if !probe.wsl_available() {
                return Err(script_missing(kind, dir, ScriptMissing::SubsystemUnavailable));
            }
            let plan = ScriptPlan {
                kind,
                dir,
                invocation: Invocation::Wsl { script: sh },
            };
            match options.fallback {
                FallbackPolicy::Ask => Ok(Resolution::ConfirmFallback(plan)),
                FallbackPolicy::Accept => Ok(Resolution::Ready(plan)),
                FallbackPolicy::Decline => Err(declined(plan)),
            }
        }
        Platform::Unix => {
            let sh = dir.join(Platform::Unix.script_name());
            if !sh.exists() {
                return Err(script_missing(kind, dir, ScriptMissing::NoScript));
            }
            Ok(Resolution::Ready(ScriptPlan {
                kind,
                dir,
                invocation: Invocation::Shell { script: sh },
            }))
        }
    }
}

/// The error for a fallback plan the user turned down.
pub fn declined(plan: ScriptPlan) -> RunnerError {
    script_missing(plan.kind, plan.dir, ScriptMissing::FallbackDeclined)
}

fn project_dir(kind: ProjectKind, configured: &str) -> Result<PathBuf, RunnerError> {
    let not_found = || RunnerError::PathNotFound {
        kind,
        path: PathBuf::from(configured),
    };
    if configured.trim().is_empty() {
        return Err(not_found());
    }
    let dir = std::path::absolute(Path::new(configured)).map_err(|_| not_found())?;
    if !dir.exists() {
        return Err(RunnerError::PathNotFound { kind, path: dir });
    }
    Ok(dir)
}

fn script_missing(kind: ProjectKind, dir: PathBuf, reason: ScriptMissing) -> RunnerError {
    RunnerError::ScriptNotFound { kind, dir, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(bool);

    impl SubsystemProbe for FixedProbe {
        fn wsl_available(&self) -> bool {
            self.0
        }
    }

    fn options(platform: Platform, fallback: FallbackPolicy) -> ResolveOptions {
        ResolveOptions {
            platform,
            fallback,
            npm_direct: false,
        }
    }

    fn project_with(scripts: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for script in scripts {
            std::fs::write(dir.path().join(script), "echo hi\n").unwrap();
        }
        dir
    }

    fn dir_str(dir: &tempfile::TempDir) -> String {
        dir.path().display().to_string()
    }

    #[test]
    fn missing_path_is_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope").display().to_string();
        for platform in [Platform::Windows, Platform::Unix] {
            let err = resolve(
                ProjectKind::Java,
                &missing,
                options(platform, FallbackPolicy::Ask),
                &FixedProbe(true),
            )
            .unwrap_err();
            assert!(matches!(err, RunnerError::PathNotFound { .. }));
        }
        let err = resolve(
            ProjectKind::Java,
            "  ",
            options(Platform::Unix, FallbackPolicy::Ask),
            &FixedProbe(true),
        )
        .unwrap_err();
        assert!(matches!(err, RunnerError::PathNotFound { .. }));
    }

    #[test]
    fn windows_prefers_powershell_script() {
        let dir = project_with(&["run.ps1", "run.sh"]);
        let resolution = resolve(
            ProjectKind::Cpp,
            &dir_str(&dir),
            options(Platform::Windows, FallbackPolicy::Ask),
            &FixedProbe(true),
        )
        .unwrap();
        let Resolution::Ready(plan) = resolution else {
            panic!("expected ready plan");
        };
        assert_eq!(
            plan.invocation,
            Invocation::PowerShell {
                script: dir.path().join("run.ps1")
            }
        );
    }

    #[test]
    fn windows_fallback_follows_policy() {
        let dir = project_with(&["run.sh"]);
        let path = dir_str(&dir);
        let ask = resolve(
            ProjectKind::Python,
            &path,
            options(Platform::Windows, FallbackPolicy::Ask),
            &FixedProbe(true),
        )
        .unwrap();
        assert!(matches!(ask, Resolution::ConfirmFallback(ScriptPlan {
            invocation: Invocation::Wsl { .. },
            ..
        })));

        let accept = resolve(
            ProjectKind::Python,
            &path,
            options(Platform::Windows, FallbackPolicy::Accept),
            &FixedProbe(true),
        )
        .unwrap();
        assert!(matches!(accept, Resolution::Ready(_)));

        let decline = resolve(
            ProjectKind::Python,
            &path,
            options(Platform::Windows, FallbackPolicy::Decline),
            &FixedProbe(true),
        )
        .unwrap_err();
        assert!(matches!(
            decline,
            RunnerError::ScriptNotFound {
                reason: ScriptMissing::FallbackDeclined,
                ..
            }
        ));
    }

    #[test]
    fn windows_fallback_needs_subsystem() {
        let dir = project_with(&["run.sh"]);
        let err = resolve(
            ProjectKind::TypeScript,
            &dir_str(&dir),
            options(Platform::Windows, FallbackPolicy::Accept),
            &FixedProbe(false),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::ScriptNotFound {
                reason: ScriptMissing::SubsystemUnavailable,
                ..
            }
        ));
    }

    #[test]
    fn script_not_found_iff_no_eligible_script() {
        let layouts: [&[&str]; 4] = [&[], &["run.ps1"], &["run.sh"], &["run.ps1", "run.sh"]];
        for kind in ProjectKind::ALL {
            for layout in layouts {
                let dir = project_with(layout);
                let has_ps1 = layout.contains(&"run.ps1");
                let has_sh = layout.contains(&"run.sh");
                for (platform, eligible) in [
                    (Platform::Windows, has_ps1 || has_sh),
                    (Platform::Unix, has_sh),
                ] {
                    let result = resolve(
                        kind,
                        &dir_str(&dir),
                        options(platform, FallbackPolicy::Accept),
                        &FixedProbe(true),
                    );
                    let not_found = matches!(result, Err(RunnerError::ScriptNotFound { .. }));
                    assert_eq!(
                        not_found, !eligible,
                        "{kind} {platform:?} with {layout:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn unix_runs_shell_script_from_absolute_dir() {
        let dir = project_with(&["run.sh"]);
        let Resolution::Ready(plan) = resolve(
            ProjectKind::Java,
            &dir_str(&dir),
            options(Platform::Unix, FallbackPolicy::Ask),
            &FixedProbe(false),
        )
        .unwrap() else {
            panic!("expected ready plan");
        };
        assert!(plan.dir.is_absolute());
        assert_eq!(
            plan.invocation,
            Invocation::Shell {
                script: dir.path().join("run.sh")
            }
        );
    }

    #[tokio::test]
    async fn host_probe_finds_no_subsystem_off_windows() {
        assert!(!HostProbe::detect(Platform::Unix).await.wsl_available());
    }
}
