//! Project kinds and the per-project runtime state.
//!
//! `ProjectKind` is the closed set of sample projects the runner knows about.
//! `ProjectState` is what the UI loop keeps for each of them: status, pid, the
//! current run id and the scrollback of its output.

use std::fmt;
use std::time::Instant;

use crate::output::LogBuffer;

/// Identifies one launch of a project. Events from older runs carry a stale id.
pub type RunId = u64;

/// One of the four sample projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum ProjectKind {
    Java,
    Cpp,
    Python,
    #[value(name = "typescript")]
    TypeScript,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 4] = [
        ProjectKind::Java,
        ProjectKind::Cpp,
        ProjectKind::Python,
        ProjectKind::TypeScript,
    ];

    /// Key used in the paths file and in output prefixes.
    pub fn id(self) -> &'static str {
        match self {
            ProjectKind::Java => "java",
            ProjectKind::Cpp => "cpp",
            ProjectKind::Python => "python",
            ProjectKind::TypeScript => "typescript",
        }
    }

    /// Human readable name.
    pub fn label(self) -> &'static str {
        match self {
            ProjectKind::Java => "Java",
            ProjectKind::Cpp => "C++",
            ProjectKind::Python => "Python",
            ProjectKind::TypeScript => "TypeScript",
        }
    }

    pub fn index(self) -> usize {
        match self {
            ProjectKind::Java => 0,
            ProjectKind::Cpp => 1,
            ProjectKind::Python => 2,
            ProjectKind::TypeScript => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Path used when the paths file does not mention this project.
    pub fn default_path(self) -> &'static str {
        match self {
            ProjectKind::Java => "../Java",
            ProjectKind::Cpp => "../starterCPP",
            ProjectKind::Python => "../Python",
            ProjectKind::TypeScript => "../starterTS",
        }
    }

    /// Whether the output of this project is scanned for a dev-server URL.
    pub fn serves_http(self) -> bool {
        matches!(self, ProjectKind::TypeScript)
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// The current lifecycle status of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectStatus {
    /// Never launched in this session.
    Idle,
    /// Waiting on a preparation step such as `npm install`.
    Preparing,
    /// Child process is running.
    Running,
    /// Child process has exited.
    Exited { code: Option<i32> },
    /// The last launch attempt failed before a process was running.
    Failed { error: String },
}

/// Runtime state of a single project slot.
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub kind: ProjectKind,
    pub status: ProjectStatus,
    /// Process ID (if running).
    pub pid: Option<u32>,
    /// Run id of the process currently tracked in this slot.
    pub run: Option<RunId>,
    /// Runs of helper processes (`npm install`, installers) streaming into this slot.
    pub helpers: Vec<RunId>,
    pub started_at: Option<Instant>,
    /// Output lines, including installer output routed to this project.
    pub logs: LogBuffer,
    /// Current scroll position in the log view.
    pub scroll: usize,
    /// Whether the log view is currently following new output.
    pub follow: bool,
}

impl ProjectState {
    pub fn new(kind: ProjectKind, max_lines: usize) -> Self {
        Self {
            kind,
            status: ProjectStatus::Idle,
            pid: None,
            run: None,
            helpers: Vec::new(),
            started_at: None,
            logs: LogBuffer::new(max_lines),
            scroll: 0,
            follow: true,
        }
    }

    /// Whether events of `run` belong to this slot's current process or one
    /// of its live helpers.
    pub fn accepts(&self, run: RunId) -> bool {
        self.run == Some(run) || self.helpers.contains(&run)
    }

    /// Forgets a finished helper run. Returns false when it was not tracked.
    pub fn finish_helper(&mut self, run: RunId) -> bool {
        let before = self.helpers.len();
        self.helpers.retain(|helper| *helper != run);
        self.helpers.len() != before
    }
}
