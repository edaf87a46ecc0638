//! Toolchain probing and Windows package-manager installs.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::RunnerError;
use crate::events::Event;
use crate::monitor::{self, MonitorSpec};
use crate::platform::Platform;
use crate::project::{ProjectKind, RunId};

const MSYS2_BASH: &str = r"C:\msys64\usr\bin\bash.exe";
const MINGW_PACKAGES: &str = "pacman -S --noconfirm mingw-w64-x86_64-gcc mingw-w64-x86_64-make";

/// Finds an executable on the search path.
pub fn locate(tool: &str) -> Option<PathBuf> {
    which::which(tool).ok()
}

/// Whether `tool` resolves on the search path. Lookup failures count as absent.
pub fn is_available(tool: &str) -> bool {
    locate(tool).is_some()
}

/// Executables a project kind needs to build and run.
pub fn required_tools(kind: ProjectKind) -> &'static [&'static str] {
    match kind {
        ProjectKind::Java => &["javac"],
        ProjectKind::Cpp => &["cmake", "g++"],
        ProjectKind::Python => &["python"],
        ProjectKind::TypeScript => &["npm"],
    }
}

/// One installer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    /// Shown as the output prefix and in failure reports.
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
}

impl InstallStep {
    fn winget(label: &str, id: &str) -> Self {
        Self {
            label: label.to_string(),
            program: "powershell".to_string(),
            args: vec![
                "-Command".to_string(),
                format!("winget install -e --id {}", id),
            ],
        }
    }

    fn mingw() -> Self {
        Self {
            label: "MinGW Installation".to_string(),
            program: MSYS2_BASH.to_string(),
            args: vec!["-lc".to_string(), MINGW_PACKAGES.to_string()],
        }
    }
}

/// Steps needed to install what is missing for `kind`, in order.
///
/// Empty when every required tool is already available.
pub fn install_plan(kind: ProjectKind, is_available: impl Fn(&str) -> bool) -> Vec<InstallStep> {
    match kind {
        ProjectKind::Java if !is_available("javac") => {
            vec![InstallStep::winget("JDK Installation", "Oracle.JDK.17")]
        }
        ProjectKind::Cpp => {
            let mut steps = Vec::new();
            if !is_available("cmake") {
                steps.push(InstallStep::winget("CMake Installation", "Kitware.CMake"));
            }
            if !is_available("g++") {
                steps.push(InstallStep::winget("MSYS2 Installation", "MSYS2.MSYS2"));
                steps.push(InstallStep::mingw());
            }
            steps
        }
        ProjectKind::Python if !is_available("python") => {
            vec![InstallStep::winget("Python Installation", "Python.Python.3.9")]
        }
        ProjectKind::TypeScript if !is_available("npm") => {
            vec![InstallStep::winget("Node.js Installation", "OpenJS.NodeJS.LTS")]
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Installs are only automated on Windows.
    Unsupported,
    UpToDate,
    /// Every step succeeded; the application must restart to see the tools.
    Installed { steps: Vec<String> },
}

impl InstallOutcome {
    /// Message shown once installation completes.
    pub fn message(&self, kind: ProjectKind) -> String {
        match self {
            InstallOutcome::Unsupported => format!(
                "Automatic installation is only available on Windows.\n\n{}",
                Platform::Unix.toolchain(kind)
            ),
            InstallOutcome::UpToDate => {
                format!("All tools required by the {} project are available.", kind)
            }
            InstallOutcome::Installed { steps } => format!(
                "{} completed. Please restart the application.",
                steps.join(", ")
            ),
        }
    }
}

/// Installs the tools `kind` is missing, one step at a time.
///
/// Output of every step is streamed to the project's log. The first failing
/// step aborts the rest.
pub async fn install_if_missing(
    kind: ProjectKind,
    platform: Platform,
    run: RunId,
    tx: mpsc::Sender<Event>,
) -> Result<InstallOutcome, RunnerError> {
    if platform != Platform::Windows {
        return Ok(InstallOutcome::Unsupported);
    }
    let steps = install_plan(kind, is_available);
    if steps.is_empty() {
        return Ok(InstallOutcome::UpToDate);
    }
    let mut done = Vec::with_capacity(steps.len());
    for step in steps {
        run_step(kind, run, &step, tx.clone()).await?;
        done.push(step.label);
    }
    Ok(InstallOutcome::Installed { steps: done })
}

async fn run_step(
    kind: ProjectKind,
    run: RunId,
    step: &InstallStep,
    tx: mpsc::Sender<Event>,
) -> Result<(), RunnerError> {
    tracing::info!(%kind, step = %step.label, "running installer");
    let mut child = Command::new(&step.program)
        .args(&step.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| RunnerError::Install {
            step: step.label.clone(),
            detail: format!("cannot start {}: {}", step.program, err),
        })?;

    let lines = monitor::merge_output(&mut child);
    let watcher = monitor::spawn_monitor(MonitorSpec::helper(kind, run, step.label.clone()), lines, tx);
    let status = child.wait().await.map_err(|err| RunnerError::Install {
        step: step.label.clone(),
        detail: err.to_string(),
    })?;
    let _ = watcher.await;

    if !status.success() {
        return Err(RunnerError::Install {
            step: step.label.clone(),
            detail: format!("exited with {}", status),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(steps: &[InstallStep]) -> Vec<&str> {
        steps.iter().map(|step| step.label.as_str()).collect()
    }

    #[test]
    fn nothing_to_install_when_tools_present() {
        for kind in ProjectKind::ALL {
            assert!(install_plan(kind, |_| true).is_empty());
        }
    }

    #[test]
    fn java_installs_jdk_through_winget() {
        let steps = install_plan(ProjectKind::Java, |_| false);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].program, "powershell");
        assert_eq!(
            steps[0].args,
            vec!["-Command", "winget install -e --id Oracle.JDK.17"]
        );
    }

    #[test]
    fn cpp_installs_only_missing_parts() {
        let steps = install_plan(ProjectKind::Cpp, |tool| tool == "cmake");
        assert_eq!(labels(&steps), vec!["MSYS2 Installation", "MinGW Installation"]);
        assert_eq!(steps[1].program, r"C:\msys64\usr\bin\bash.exe");
        assert_eq!(steps[1].args[1], MINGW_PACKAGES);

        let steps = install_plan(ProjectKind::Cpp, |tool| tool == "g++");
        assert_eq!(labels(&steps), vec!["CMake Installation"]);
    }

    #[test]
    fn required_tools_match_install_probes() {
        for kind in ProjectKind::ALL {
            let probed = std::cell::RefCell::new(Vec::new());
            install_plan(kind, |tool| {
                probed.borrow_mut().push(tool.to_string());
                true
            });
            assert_eq!(probed.into_inner(), required_tools(kind));
        }
    }

    #[tokio::test]
    async fn non_windows_install_is_a_no_op() {
        let (tx, mut rx) = mpsc::channel(4);
        let outcome = install_if_missing(ProjectKind::Python, Platform::Unix, 1, tx)
            .await
            .unwrap();
        assert_eq!(outcome, InstallOutcome::Unsupported);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn installed_message_asks_for_restart() {
        let outcome = InstallOutcome::Installed {
            steps: vec!["JDK Installation".into()],
        };
        assert!(outcome
            .message(ProjectKind::Java)
            .contains("Please restart the application"));
    }
}
