//! Event definitions for the application event loop.
//!
//! Background tasks (output monitors, installers, preparation steps, input and
//! signal listeners) never touch `App` directly; they post one of these events
//! and the loop applies it in its own turn.

use crossterm::event::KeyEvent;

use crate::deps::InstallOutcome;
use crate::error::ErrorReport;
use crate::launcher::LaunchRequest;
use crate::project::{ProjectKind, RunId};

#[derive(Debug)]
pub enum Event {
    /// A line of merged output from a project or one of its helpers.
    Output {
        kind: ProjectKind,
        run: RunId,
        line: String,
    },
    /// A dev-server banner was seen in the output of `run`.
    UrlDiscovered {
        kind: ProjectKind,
        run: RunId,
        url: String,
    },
    /// A monitor detected a failure and attached the captured output.
    ErrorReport {
        kind: ProjectKind,
        run: RunId,
        report: ErrorReport,
    },
    /// The preparation step (such as `npm install`) running as `run` finished.
    Prepared {
        kind: ProjectKind,
        run: RunId,
        result: Result<LaunchRequest, ErrorReport>,
    },
    /// The toolchain installation running as `run` finished.
    InstallFinished {
        kind: ProjectKind,
        run: RunId,
        result: Result<InstallOutcome, ErrorReport>,
    },
    /// Ctrl-C or SIGTERM was received.
    Shutdown,
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize,
}
