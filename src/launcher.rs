//! Child process construction.
//!
//! Turns a resolved [`ScriptPlan`] into a [`LaunchRequest`] carrying the
//! augmented environment, and a request into a ready-to-spawn `Command`.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::RunnerError;
use crate::events::Event;
use crate::monitor::{self, MonitorSpec};
use crate::platform::Platform;
use crate::project::{ProjectKind, RunId};
use crate::resolver::{Invocation, ScriptPlan};

const MSYS2_BINS: [&str; 2] = [r"C:\msys64\mingw64\bin", r"C:\msys64\usr\bin"];
const UNIX_SYSTEM_PATH: &str = "/opt/homebrew/bin:/opt/homebrew/sbin:/usr/local/bin:/usr/bin:/bin";
const NPM_INSTALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Everything needed to start one project process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub plan: ScriptPlan,
    pub env: HashMap<String, String>,
}

impl LaunchRequest {
    /// Builds a request using a copy of the current process environment.
    pub fn new(plan: ScriptPlan, platform: Platform) -> Self {
        let base = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        let env = child_environment(platform, base, |path| path.exists());
        Self { plan, env }
    }

    pub fn kind(&self) -> ProjectKind {
        self.plan.kind
    }

    /// Whether `npm install` has to run before the dev server starts.
    pub fn needs_preparation(&self) -> bool {
        matches!(
            self.plan.invocation,
            Invocation::NpmDev {
                install_first: true,
                ..
            }
        )
    }
}

/// Copies `base` and puts the toolchain directories ahead of the search path.
pub fn child_environment(
    platform: Platform,
    base: impl IntoIterator<Item = (String, String)>,
    dir_exists: impl Fn(&Path) -> bool,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = base.into_iter().collect();
    match platform {
        Platform::Windows => {
            // Windows treats variable names case-insensitively.
            let path_key = env
                .keys()
                .find(|key| key.eq_ignore_ascii_case("path"))
                .cloned();
            let existing = path_key.and_then(|key| env.remove(&key));
            let program_files = env.get("ProgramFiles").cloned();
            let program_files_x86 = env.get("ProgramFiles(x86)").cloned();

            let mut entries: Vec<String> = MSYS2_BINS.iter().map(|dir| dir.to_string()).collect();
            if let Some(pf) = &program_files {
                entries.push(format!(r"{}\Java\jdk-17\bin", pf));
                entries.push(format!(r"{}\CMake\bin", pf));
                entries.push(format!(r"{}\nodejs", pf));
            }
            if let Some(pf) = &program_files_x86 {
                entries.push(format!(r"{}\Java\jdk-17\bin", pf));
            }
            if let Some(existing) = existing {
                entries.push(existing);
            }
            let separator = platform.path_separator().to_string();
            env.insert("Path".to_string(), entries.join(&separator));

            let has_java_home = env.keys().any(|key| key.eq_ignore_ascii_case("JAVA_HOME"));
            if !has_java_home {
                if let Some(pf) = &program_files {
                    let java_home = format!(r"{}\Java\jdk-17", pf);
                    if dir_exists(Path::new(&java_home)) {
                        env.insert("JAVA_HOME".to_string(), java_home);
                    }
                }
            }
        }
        Platform::Unix => {
            let path = match env.get("PATH") {
                Some(existing) => format!("{}:{}", UNIX_SYSTEM_PATH, existing),
                None => UNIX_SYSTEM_PATH.to_string(),
            };
            env.insert("PATH".to_string(), path);
        }
    }
    env
}

/// Program name shown in spawn errors.
pub fn program_label(invocation: &Invocation) -> String {
    match invocation {
        Invocation::PowerShell { .. } => "powershell".to_string(),
        Invocation::Wsl { .. } => "wsl".to_string(),
        Invocation::Shell { script } => script.display().to_string(),
        Invocation::NpmDev { npm, .. } => npm.display().to_string(),
    }
}

/// Builds the command for a request. Output is piped for the monitor.
pub fn build_command(request: &LaunchRequest) -> Command {
    let plan = &request.plan;
    let mut command = match &plan.invocation {
        Invocation::PowerShell { script } => {
            let mut command = Command::new("powershell");
            command
                .args(["-ExecutionPolicy", "Bypass", "-NoProfile", "-File"])
                .arg(script);
            command
        }
        Invocation::Wsl { .. } => {
            let mut command = Command::new("wsl");
            command.args(["bash", "-c", "chmod +x ./run.sh && ./run.sh"]);
            command
        }
        Invocation::Shell { script } => {
            make_executable(script);
            Command::new(script)
        }
        Invocation::NpmDev { npm, .. } => {
            let mut command = Command::new(npm);
            command.args(["run", "dev"]);
            command
        }
    };
    command
        .current_dir(&plan.dir)
        .envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    own_process_group(&mut command);
    command
}

/// Puts the child in its own process group so the whole tree can be stopped.
pub fn own_process_group(command: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }

    #[cfg(not(any(unix, windows)))]
    let _ = command;
}

#[cfg(unix)]
fn make_executable(script: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let result = std::fs::metadata(script).and_then(|meta| {
        let mut permissions = meta.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        std::fs::set_permissions(script, permissions)
    });
    if let Err(err) = result {
        tracing::warn!(script = %script.display(), error = %err, "cannot mark script executable");
    }
}

#[cfg(not(unix))]
fn make_executable(_script: &Path) {}

/// Runs `npm install` in the project directory, streaming through a monitor.
///
/// Bounded by a five minute timeout; the child is killed when it expires.
pub async fn install_node_modules(
    request: &LaunchRequest,
    run: RunId,
    tx: mpsc::Sender<Event>,
) -> Result<(), RunnerError> {
    let Invocation::NpmDev { npm, .. } = &request.plan.invocation else {
        return Ok(());
    };
    let kind = request.kind();
    let failed = |detail: String| RunnerError::Install {
        step: "npm install".to_string(),
        detail,
    };

    let mut command = Command::new(npm);
    command
        .arg("install")
        .current_dir(&request.plan.dir)
        .envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = command.spawn().map_err(|err| RunnerError::Spawn {
        kind,
        program: npm.display().to_string(),
        source: err,
    })?;
    let lines = monitor::merge_output(&mut child);
    let watcher = monitor::spawn_monitor(MonitorSpec::helper(kind, run, "npm install"), lines, tx);

    tracing::info!(dir = %request.plan.dir.display(), "running npm install");
    let status = match tokio::time::timeout(NPM_INSTALL_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => return Err(failed(err.to_string())),
        Err(_) => {
            let _ = child.kill().await;
            return Err(failed("timed out after 5 minutes".to_string()));
        }
    };
    let _ = watcher.await;
    if !status.success() {
        return Err(failed(format!("exited with {}", status)));
    }
    Ok(())
}
