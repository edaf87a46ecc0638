//! Process execution and management.
//!
//! The `ProcessManager` owns one slot per project kind. Launching into a slot
//! terminates whatever that slot was running before, so at most one child per
//! project is alive at any time. Output is handed to a monitor task; exits are
//! collected by polling from the UI loop.

use std::collections::HashMap;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;

use crate::error::RunnerError;
use crate::events::Event;
use crate::launcher::{self, LaunchRequest};
use crate::monitor::{self, MonitorSpec};
use crate::project::{ProjectKind, RunId};

/// A process that was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launched {
    pub run: RunId,
    pub pid: Option<u32>,
}

/// A tracked process that finished on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit {
    pub kind: ProjectKind,
    pub run: RunId,
    pub code: Option<i32>,
}

struct Slot {
    run: RunId,
    child: Child,
}

/// Manages the lifecycle of project processes.
pub struct ProcessManager {
    slots: HashMap<ProjectKind, Slot>,
    event_tx: mpsc::Sender<Event>,
    shutdown_grace: Duration,
    next_run: RunId,
}

impl ProcessManager {
    pub fn new(event_tx: mpsc::Sender<Event>, shutdown_grace: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            event_tx,
            shutdown_grace,
            next_run: 1,
        }
    }

    /// Hands out a fresh run id. Helper processes (installers, `npm install`)
    /// use one too so their output can be told apart from stale runs.
    pub fn allocate_run(&mut self) -> RunId {
        let run = self.next_run;
        self.next_run += 1;
        run
    }

    /// Starts the project described by `request`, replacing any running one.
    pub async fn launch(&mut self, request: &LaunchRequest) -> Result<Launched, RunnerError> {
        let kind = request.kind();
        self.terminate(kind).await;

        let run = self.allocate_run();
        let mut command = launcher::build_command(request);
        let mut child = command.spawn().map_err(|err| RunnerError::Spawn {
            kind,
            program: launcher::program_label(&request.plan.invocation),
            source: err,
        })?;
        let pid = child.id();
        tracing::info!(%kind, run, pid, dir = %request.plan.dir.display(), "project started");

        let lines = monitor::merge_output(&mut child);
        monitor::spawn_monitor(MonitorSpec::project(kind, run), lines, self.event_tx.clone());
        self.slots.insert(kind, Slot { run, child });
        Ok(Launched { run, pid })
    }

    /// Forcibly stops the process in `kind`'s slot, if any.
    pub async fn terminate(&mut self, kind: ProjectKind) {
        let Some(mut slot) = self.slots.remove(&kind) else {
            return;
        };
        tracing::info!(%kind, run = slot.run, "terminating previous process");
        if let Some(pid) = slot.child.id() {
            kill_process_group(pid).await;
        }
        let _ = slot.child.kill().await;
        let _ = slot.child.wait().await;
    }

    /// Run id of the process tracked for `kind`.
    pub fn current_run(&self, kind: ProjectKind) -> Option<RunId> {
        self.slots.get(&kind).map(|slot| slot.run)
    }

    /// Collects processes that have exited since the last poll.
    pub fn poll_exits(&mut self) -> Vec<Exit> {
        let mut exits = Vec::new();
        self.slots.retain(|kind, slot| match slot.child.try_wait() {
            Ok(Some(status)) => {
                exits.push(Exit {
                    kind: *kind,
                    run: slot.run,
                    code: status.code(),
                });
                false
            }
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(%kind, run = slot.run, error = %err, "cannot poll process");
                exits.push(Exit {
                    kind: *kind,
                    run: slot.run,
                    code: None,
                });
                false
            }
        });
        exits.sort_by_key(|exit| exit.kind);
        exits
    }

    /// Interrupts every running process, then kills those still alive after the grace period.
    pub async fn shutdown_all(&mut self) {
        for (kind, slot) in self.slots.iter() {
            if let Some(pid) = slot.child.id() {
                tracing::debug!(%kind, pid, "interrupting");
                interrupt_process_group(pid);
            }
        }
        let grace = self.shutdown_grace;
        for (kind, mut slot) in self.slots.drain() {
            match wait_for_exit(&mut slot.child, grace).await {
                Some(_) => {}
                None => {
                    tracing::debug!(%kind, "killing after grace period");
                    if let Some(pid) = slot.child.id() {
                        kill_process_group(pid).await;
                    }
                    let _ = slot.child.kill().await;
                    let _ = slot.child.wait().await;
                }
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    unsafe {
        let pid = pid as i32;
        let _ = libc::kill(-pid, signal);
        let _ = libc::kill(pid, signal);
    }
}

#[cfg(unix)]
fn interrupt_process_group(pid: u32) {
    signal_group(pid, libc::SIGINT);
}

#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    signal_group(pid, libc::SIGKILL);
}

#[cfg(windows)]
fn interrupt_process_group(pid: u32) {
    use windows_sys::Win32::System::Console::GenerateConsoleCtrlEvent;
    use windows_sys::Win32::System::Console::CTRL_BREAK_EVENT;
    // CTRL_BREAK is the only console signal a new process group receives.
    unsafe {
        let _ = GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid);
    }
}

/// Kills `pid` and every process it started, so a dev server launched by
/// `powershell` does not outlive it.
#[cfg(windows)]
async fn kill_process_group(pid: u32) {
    let result = tokio::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;
    if let Err(err) = result {
        tracing::warn!(pid, error = %err, "taskkill failed");
    }
}

#[cfg(not(any(unix, windows)))]
fn interrupt_process_group(_pid: u32) {}

#[cfg(not(any(unix, windows)))]
async fn kill_process_group(_pid: u32) {}

async fn wait_for_exit(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    if timeout.is_zero() {
        return None;
    }
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(_)) | Err(_) => None,
    }
}


#[cfg(all(test, windows))]
mod windows_tests {
    use super::*;

    #[tokio::test]
    async fn tree_kill_stops_shell_and_its_children() {
        let mut child = tokio::process::Command::new("cmd")
            .args(["/C", "ping -n 30 127.0.0.1 > NUL"])
            .spawn()
            .unwrap();
        kill_process_group(child.id().unwrap()).await;
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
    }
}
