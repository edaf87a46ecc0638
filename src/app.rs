//! Application state and UI logic.
//!
//! `App` holds everything the terminal UI shows: the four project slots, the
//! editable project paths, the queue of modal dialogs and the dev-server URL.
//! Key presses are translated into [`AppAction`]s which the event loop carries
//! out, since most of them need the process manager or the filesystem.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::ProjectPaths;
use crate::deps::InstallOutcome;
use crate::error::ErrorReport;
use crate::output::sanitize_text;
use crate::platform::Platform;
use crate::project::{ProjectKind, ProjectState, ProjectStatus, RunId};
use crate::resolver::ScriptPlan;
use crate::runner::{Exit, Launched};

/// Directory that `x` exports project logs into.
pub const EXPORT_DIR: &str = "devrunner-logs";

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation mode.
    Normal,
    /// Editing the selected project's path.
    EditPath,
}

/// A dialog drawn over the main view. Only the front of the queue is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Error { report: ErrorReport, scroll: u16 },
    /// Asks whether `run.sh` may be started through WSL.
    ConfirmFallback(ScriptPlan),
    Notice {
        title: String,
        text: String,
        /// Quit once the notice is dismissed.
        exit_on_close: bool,
    },
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    None,
    Quit,
    /// Resolve and start a project.
    Launch(ProjectKind),
    /// The user approved the WSL fallback for this plan.
    ConfirmFallback(ScriptPlan),
    DeclineFallback(ScriptPlan),
    SavePaths,
    OpenBrowser(String),
    Install(ProjectKind),
    Export(ProjectKind),
    CopyReport(ErrorReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
    level: StatusLevel,
}

/// The main application state container.
#[derive(Debug)]
pub struct App {
    /// One slot per project kind, in `ProjectKind::ALL` order.
    pub projects: Vec<ProjectState>,
    pub paths: ProjectPaths,
    pub selected: usize,
    pub input_mode: InputMode,
    /// Buffer for the path being edited.
    pub input: String,
    pub platform: Platform,
    pub should_quit: bool,
    /// Height of the log view area (for scrolling calculations).
    pub log_view_height: usize,
    pub use_symbols: bool,
    pub show_help: bool,
    modals: VecDeque<Modal>,
    /// Last dev-server URL of the current TypeScript run. Browser opening is
    /// enabled exactly when this is set.
    browser_url: Option<String>,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(paths: ProjectPaths, platform: Platform, max_lines: usize, use_symbols: bool) -> Self {
        Self {
            projects: ProjectKind::ALL
                .into_iter()
                .map(|kind| ProjectState::new(kind, max_lines))
                .collect(),
            paths,
            selected: 0,
            input_mode: InputMode::Normal,
            input: String::new(),
            platform,
            should_quit: false,
            log_view_height: 0,
            use_symbols,
            show_help: false,
            modals: VecDeque::new(),
            browser_url: None,
            status_message: None,
        }
    }

    pub fn selected_kind(&self) -> ProjectKind {
        ProjectKind::from_index(self.selected).unwrap_or(ProjectKind::Java)
    }

    pub fn selected_project(&self) -> Option<&ProjectState> {
        self.projects.get(self.selected)
    }

    fn selected_project_mut(&mut self) -> Option<&mut ProjectState> {
        self.projects.get_mut(self.selected)
    }

    pub fn project(&self, kind: ProjectKind) -> &ProjectState {
        &self.projects[kind.index()]
    }

    fn project_mut(&mut self, kind: ProjectKind) -> &mut ProjectState {
        &mut self.projects[kind.index()]
    }

    pub fn browser_url(&self) -> Option<&str> {
        self.browser_url.as_deref()
    }

    pub fn active_modal(&self) -> Option<&Modal> {
        self.modals.front()
    }

    pub fn push_modal(&mut self, modal: Modal) {
        self.modals.push_back(modal);
    }

    pub fn show_error(&mut self, report: ErrorReport) {
        self.push_modal(Modal::Error { report, scroll: 0 });
    }

    pub fn show_notice(&mut self, title: impl Into<String>, text: impl Into<String>) {
        self.push_modal(Modal::Notice {
            title: title.into(),
            text: text.into(),
            exit_on_close: false,
        });
    }

    /// A launch attempt for `kind` is waiting on the preparation step `helper`.
    pub fn on_preparing(&mut self, kind: ProjectKind, helper: RunId) {
        let project = self.project_mut(kind);
        project.status = ProjectStatus::Preparing;
        project.pid = None;
        project.run = None;
        project.helpers.push(helper);
        if kind.serves_http() {
            self.browser_url = None;
        }
    }

    pub fn on_launched(&mut self, kind: ProjectKind, launched: Launched) {
        let project = self.project_mut(kind);
        project.status = ProjectStatus::Running;
        project.pid = launched.pid;
        project.run = Some(launched.run);
        project.started_at = Some(Instant::now());
        if kind.serves_http() {
            self.browser_url = None;
        }
    }

    /// Whether events of `run` should still reach `kind`'s slot.
    pub fn accepts(&self, kind: ProjectKind, run: RunId) -> bool {
        self.project(kind).accepts(run)
    }

    /// A helper run of `kind` has delivered its result. Returns false for
    /// helpers the slot no longer tracks.
    pub fn finish_helper(&mut self, kind: ProjectKind, run: RunId) -> bool {
        self.project_mut(kind).finish_helper(run)
    }

    /// Appends a line of `run`'s output. Lines of replaced runs are dropped.
    pub fn on_output(&mut self, kind: ProjectKind, run: RunId, line: String) {
        if !self.accepts(kind, run) {
            return;
        }
        let view = self.log_view_height.max(1);
        let project = self.project_mut(kind);
        let dropped = project.logs.push(line);
        if project.follow {
            project.scroll = project.logs.len().saturating_sub(view);
        } else if dropped && project.scroll > 0 {
            project.scroll -= 1;
        }
    }

    /// Records a URL announced by `run`. Runs that were replaced are ignored.
    pub fn on_url(&mut self, kind: ProjectKind, run: RunId, url: String) {
        if !kind.serves_http() || self.project(kind).run != Some(run) {
            return;
        }
        self.set_status_message(format!("Dev server at {} (press o to open)", url));
        self.browser_url = Some(url);
    }

    pub fn on_error_report(&mut self, kind: ProjectKind, run: RunId, report: ErrorReport) {
        if self.accepts(kind, run) {
            self.show_error(report);
        }
    }

    pub fn on_exit(&mut self, exit: Exit) {
        let project = self.project_mut(exit.kind);
        if project.run != Some(exit.run) {
            return;
        }
        project.status = ProjectStatus::Exited { code: exit.code };
        project.pid = None;
    }

    /// A launch attempt failed before a process was running.
    pub fn on_failed(&mut self, kind: ProjectKind, report: ErrorReport) {
        self.project_mut(kind).status = ProjectStatus::Failed {
            error: report.title.clone(),
        };
        self.show_error(report);
    }

    /// An installer run for `kind` started.
    pub fn on_installing(&mut self, kind: ProjectKind, helper: RunId) {
        self.project_mut(kind).helpers.push(helper);
        self.set_status_message(format!("Checking tools for {}...", kind.label()));
    }

    pub fn on_install_finished(
        &mut self,
        kind: ProjectKind,
        helper: Option<RunId>,
        result: Result<InstallOutcome, ErrorReport>,
    ) {
        if let Some(helper) = helper {
            self.finish_helper(kind, helper);
        }
        match result {
            Ok(outcome @ InstallOutcome::Installed { .. }) => {
                self.push_modal(Modal::Notice {
                    title: "Installation Complete".to_string(),
                    text: outcome.message(kind),
                    exit_on_close: true,
                });
            }
            Ok(outcome) => self.show_notice("Dependencies", outcome.message(kind)),
            Err(report) => self.show_error(report),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return AppAction::Quit;
        }
        if !self.modals.is_empty() {
            return self.handle_modal_key(key);
        }
        match self.input_mode {
            InputMode::EditPath => self.handle_edit_input(key),
            InputMode::Normal => self.handle_normal_input(key),
        }
    }

    fn handle_modal_key(&mut self, key: KeyEvent) -> AppAction {
        let Some(modal) = self.modals.front_mut() else {
            return AppAction::None;
        };
        match modal {
            Modal::ConfirmFallback(plan) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    let plan = plan.clone();
                    self.modals.pop_front();
                    AppAction::ConfirmFallback(plan)
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    let plan = plan.clone();
                    self.modals.pop_front();
                    AppAction::DeclineFallback(plan)
                }
                _ => AppAction::None,
            },
            Modal::Error { report, scroll } => match key.code {
                KeyCode::Char('c') => AppAction::CopyReport(report.clone()),
                KeyCode::Up => {
                    *scroll = scroll.saturating_sub(1);
                    AppAction::None
                }
                KeyCode::Down => {
                    *scroll = scroll.saturating_add(1);
                    AppAction::None
                }
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => {
                    self.modals.pop_front();
                    AppAction::None
                }
                _ => AppAction::None,
            },
            Modal::Notice { exit_on_close, .. } => match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => {
                    let exit = *exit_on_close;
                    self.modals.pop_front();
                    if exit {
                        self.should_quit = true;
                        AppAction::Quit
                    } else {
                        AppAction::None
                    }
                }
                _ => AppAction::None,
            },
        }
    }

    fn handle_edit_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input.clear();
            }
            KeyCode::Enter => {
                let kind = self.selected_kind();
                let value = self.input.trim().to_string();
                self.input.clear();
                self.input_mode = InputMode::Normal;
                if value.is_empty() {
                    self.set_status_warning("Path unchanged: empty input");
                } else {
                    self.paths.set(kind, value);
                    self.set_status_message(format!("{} path updated (press s to save)", kind.label()));
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.input.push(c);
            }
            _ => {}
        }
        AppAction::None
    }

    fn handle_normal_input(&mut self, key: KeyEvent) -> AppAction {
        let kind = self.selected_kind();
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Up => {
                if self.selected > 0 {
                    self.select(self.selected - 1);
                }
                AppAction::None
            }
            KeyCode::Down => {
                if self.selected + 1 < self.projects.len() {
                    self.select(self.selected + 1);
                }
                AppAction::None
            }
            KeyCode::Tab => {
                self.select((self.selected + 1) % self.projects.len().max(1));
                AppAction::None
            }
            KeyCode::Char(c @ '1'..='4') => {
                self.select(c as usize - '1' as usize);
                AppAction::None
            }
            KeyCode::Enter | KeyCode::Char('l') => {
                if self.project(kind).status == ProjectStatus::Preparing {
                    self.set_status_warning(format!("{} is still preparing", kind.label()));
                    AppAction::None
                } else {
                    AppAction::Launch(kind)
                }
            }
            KeyCode::Char('e') => {
                self.input = self.paths.get(kind).to_string();
                self.input_mode = InputMode::EditPath;
                AppAction::None
            }
            KeyCode::Char('s') => AppAction::SavePaths,
            KeyCode::Char('o') => match self.browser_url.clone() {
                Some(url) => AppAction::OpenBrowser(url),
                None => {
                    self.set_status_warning("No dev server URL detected yet");
                    AppAction::None
                }
            },
            KeyCode::Char('i') => AppAction::Install(kind),
            KeyCode::Char('x') => AppAction::Export(kind),
            KeyCode::Char('f') => {
                self.toggle_follow();
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
                AppAction::None
            }
            KeyCode::PageUp => {
                self.scroll_up(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll_down(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::Home => {
                if let Some(project) = self.selected_project_mut() {
                    project.scroll = 0;
                    project.follow = false;
                }
                AppAction::None
            }
            KeyCode::End => {
                if let Some(project) = self.selected_project_mut() {
                    project.follow = true;
                }
                self.ensure_follow();
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn select(&mut self, index: usize) {
        if index < self.projects.len() {
            self.selected = index;
            if self.selected_project().map(|p| p.follow).unwrap_or(true) {
                self.ensure_follow();
            }
        }
    }

    pub fn scroll_up(&mut self, amount: usize) {
        let view = self.log_view_height.max(1);
        if let Some(project) = self.selected_project_mut() {
            let max_scroll = project.logs.len().saturating_sub(view);
            let current = if project.follow { max_scroll } else { project.scroll };
            project.scroll = current.saturating_sub(amount).min(max_scroll);
            project.follow = false;
        }
    }

    pub fn scroll_down(&mut self, amount: usize) {
        let view = self.log_view_height.max(1);
        if let Some(project) = self.selected_project_mut() {
            let max_scroll = project.logs.len().saturating_sub(view);
            let current = if project.follow { max_scroll } else { project.scroll };
            let next = (current + amount).min(max_scroll);
            project.scroll = next;
            project.follow = next == max_scroll;
        }
    }

    pub fn ensure_follow(&mut self) {
        let view = self.log_view_height.max(1);
        if let Some(project) = self.selected_project_mut() {
            project.scroll = project.logs.len().saturating_sub(view);
        }
    }

    pub fn set_log_view_height(&mut self, height: usize) {
        self.log_view_height = height;
        let view = height.max(1);
        if let Some(project) = self.selected_project_mut() {
            let max_scroll = project.logs.len().saturating_sub(view);
            if project.follow {
                project.scroll = max_scroll;
            } else {
                project.scroll = project.scroll.min(max_scroll);
            }
        }
    }

    fn toggle_follow(&mut self) {
        if let Some(project) = self.selected_project_mut() {
            project.follow = !project.follow;
            if project.follow {
                self.ensure_follow();
            }
        }
    }

    pub fn status_line(&self) -> String {
        let Some(project) = self.selected_project() else {
            return "No projects".to_string();
        };
        let pid = project
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        let elapsed = match (&project.status, project.started_at) {
            (ProjectStatus::Running, Some(started)) => format_duration(started.elapsed()),
            _ => "-".into(),
        };
        format!(
            "{} | status: {} | pid: {} | lines: {} | elapsed: {} | follow: {}",
            project.kind.label(),
            status_text(&project.status),
            pid,
            project.logs.len(),
            elapsed,
            if project.follow { "on" } else { "off" },
        )
    }

    /// OS and script type line shown at the top of the screen.
    pub fn header_line(&self) -> String {
        format!(
            "{} | Script type: {}",
            Platform::host_description(),
            self.platform.script_type()
        )
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        let message = self.status_message.as_ref()?;
        let visible = match message.ttl {
            Some(ttl) => message.at.elapsed() < ttl,
            None => true,
        };
        visible.then_some((message.text.as_str(), message.level))
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Info, Some(Duration::from_secs(3)));
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Warning, Some(Duration::from_secs(5)));
    }

    fn set_status(&mut self, message: impl Into<String>, level: StatusLevel, ttl: Option<Duration>) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl,
            level,
        });
    }

    /// Writes the plain-text log of `kind` to `<dir>/<id>-<epoch>.log`.
    pub fn export_logs(&mut self, kind: ProjectKind, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {} directory", dir.display()))?;
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = dir.join(format!("{}-{}.log", kind.id(), epoch));
        let mut output = String::new();
        for line in self.project(kind).logs.iter() {
            output.push_str(&sanitize_text(line));
            output.push('\n');
        }
        fs::write(&path, output).with_context(|| format!("failed to write {}", path.display()))?;
        self.set_status_message(format!("Exported logs to {}", path.display()));
        Ok(path)
    }
}

pub fn status_text(status: &ProjectStatus) -> String {
    match status {
        ProjectStatus::Idle => "idle".to_string(),
        ProjectStatus::Preparing => "preparing".to_string(),
        ProjectStatus::Running => "running".to_string(),
        ProjectStatus::Exited { code } => {
            let code = code.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
            format!("exited ({})", code)
        }
        ProjectStatus::Failed { error } => format!("failed ({})", error),
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Invocation;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn make_app() -> App {
        App::new(ProjectPaths::default(), Platform::Unix, 100, false)
    }

    fn fallback_plan() -> ScriptPlan {
        ScriptPlan {
            kind: ProjectKind::Python,
            dir: PathBuf::from(r"C:\proj\Python"),
            invocation: Invocation::Wsl {
                script: PathBuf::from(r"C:\proj\Python\run.sh"),
            },
        }
    }

    #[test]
    fn enter_launches_selected_project() {
        let mut app = make_app();
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppAction::Launch(ProjectKind::Cpp));
        app.handle_key(key(KeyCode::Char('4')));
        assert_eq!(
            app.handle_key(key(KeyCode::Char('l'))),
            AppAction::Launch(ProjectKind::TypeScript)
        );
    }

    #[test]
    fn editing_a_path_updates_mapping() {
        let mut app = make_app();
        app.handle_key(key(KeyCode::Char('e')));
        assert_eq!(app.input_mode, InputMode::EditPath);
        assert_eq!(app.input, "../Java");
        for _ in 0.."../Java".len() {
            app.handle_key(key(KeyCode::Backspace));
        }
        for c in "/srv/java".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.paths.get(ProjectKind::Java), "/srv/java");
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::SavePaths);
    }

    #[test]
    fn url_from_replaced_run_is_ignored() {
        let mut app = make_app();
        app.on_launched(ProjectKind::TypeScript, Launched { run: 1, pid: None });
        app.on_url(ProjectKind::TypeScript, 1, "http://localhost:5173/".into());
        assert_eq!(app.browser_url(), Some("http://localhost:5173/"));

        app.on_launched(ProjectKind::TypeScript, Launched { run: 2, pid: None });
        assert_eq!(app.browser_url(), None);
        app.on_url(ProjectKind::TypeScript, 1, "http://localhost:5173/".into());
        assert_eq!(app.browser_url(), None);
        app.on_url(ProjectKind::TypeScript, 2, "http://localhost:5174/".into());
        app.handle_key(key(KeyCode::Char('4')));
        assert_eq!(
            app.handle_key(key(KeyCode::Char('o'))),
            AppAction::OpenBrowser("http://localhost:5174/".into())
        );
    }

    #[test]
    fn open_without_url_does_nothing() {
        let mut app = make_app();
        assert_eq!(app.handle_key(key(KeyCode::Char('o'))), AppAction::None);
        assert!(app.status_message().is_some());
    }

    #[test]
    fn relaunching_other_kinds_keeps_url() {
        let mut app = make_app();
        app.on_launched(ProjectKind::TypeScript, Launched { run: 1, pid: None });
        app.on_url(ProjectKind::TypeScript, 1, "http://127.0.0.1:3000/".into());
        app.on_launched(ProjectKind::Java, Launched { run: 2, pid: None });
        assert_eq!(app.browser_url(), Some("http://127.0.0.1:3000/"));
    }

    #[test]
    fn fallback_confirmation_round_trip() {
        let mut app = make_app();
        app.push_modal(Modal::ConfirmFallback(fallback_plan()));
        // Normal keys are swallowed while a modal is open.
        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppAction::None);
        assert_eq!(
            app.handle_key(key(KeyCode::Char('y'))),
            AppAction::ConfirmFallback(fallback_plan())
        );
        assert!(app.active_modal().is_none());

        app.push_modal(Modal::ConfirmFallback(fallback_plan()));
        assert_eq!(
            app.handle_key(key(KeyCode::Esc)),
            AppAction::DeclineFallback(fallback_plan())
        );
    }

    #[test]
    fn error_modals_queue_and_copy() {
        let mut app = make_app();
        app.on_launched(ProjectKind::Java, Launched { run: 1, pid: None });
        app.on_error_report(ProjectKind::Java, 1, ErrorReport::new("java Error", "java: boom\n"));
        app.on_failed(ProjectKind::Cpp, ErrorReport::new("Path Error", "missing"));
        assert_eq!(
            app.project(ProjectKind::Cpp).status,
            ProjectStatus::Failed {
                error: "Path Error".into()
            }
        );
        assert_eq!(
            app.handle_key(key(KeyCode::Char('c'))),
            AppAction::CopyReport(ErrorReport::new("java Error", "java: boom\n"))
        );
        app.handle_key(key(KeyCode::Esc));
        match app.active_modal() {
            Some(Modal::Error { report, .. }) => assert_eq!(report.title, "Path Error"),
            other => panic!("unexpected modal {:?}", other),
        }
    }

    #[test]
    fn successful_install_quits_after_notice() {
        let mut app = make_app();
        app.on_installing(ProjectKind::Java, 1);
        app.on_install_finished(
            ProjectKind::Java,
            Some(1),
            Ok(InstallOutcome::Installed {
                steps: vec!["JDK Installation".into()],
            }),
        );
        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppAction::Quit);
        assert!(app.should_quit);

        let mut app = make_app();
        app.on_install_finished(ProjectKind::Java, None, Ok(InstallOutcome::UpToDate));
        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppAction::None);
        assert!(!app.should_quit);
    }

    #[test]
    fn exit_of_stale_run_is_ignored() {
        let mut app = make_app();
        app.on_launched(ProjectKind::Python, Launched { run: 5, pid: Some(10) });
        app.on_exit(Exit {
            kind: ProjectKind::Python,
            run: 4,
            code: Some(1),
        });
        assert_eq!(app.project(ProjectKind::Python).status, ProjectStatus::Running);
        app.on_exit(Exit {
            kind: ProjectKind::Python,
            run: 5,
            code: Some(0),
        });
        assert_eq!(
            app.project(ProjectKind::Python).status,
            ProjectStatus::Exited { code: Some(0) }
        );
    }

    #[test]
    fn export_writes_plain_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app();
        app.on_launched(ProjectKind::Java, Launched { run: 1, pid: None });
        app.on_output(ProjectKind::Java, 1, "\u{1b}[31mred\u{1b}[0m".into());
        app.on_output(ProjectKind::Java, 1, "plain".into());
        let path = app.export_logs(ProjectKind::Java, dir.path()).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("java-"));
        assert_eq!(fs::read_to_string(path).unwrap(), "red\nplain\n");
    }

    #[test]
    fn scrolling_disables_follow_until_end() {
        let mut app = make_app();
        app.set_log_view_height(2);
        app.on_launched(ProjectKind::Java, Launched { run: 1, pid: None });
        for i in 0..10 {
            app.on_output(ProjectKind::Java, 1, format!("line {}", i));
        }
        assert_eq!(app.project(ProjectKind::Java).scroll, 8);
        app.handle_key(key(KeyCode::PageUp));
        assert!(!app.project(ProjectKind::Java).follow);
        assert_eq!(app.project(ProjectKind::Java).scroll, 6);
        app.handle_key(key(KeyCode::End));
        assert!(app.project(ProjectKind::Java).follow);
        assert_eq!(app.project(ProjectKind::Java).scroll, 8);
    }

    #[test]
    fn events_of_replaced_run_are_dropped() {
        let mut app = make_app();
        app.on_launched(ProjectKind::TypeScript, Launched { run: 1, pid: None });
        app.on_output(ProjectKind::TypeScript, 1, "tick".into());
        app.on_launched(ProjectKind::TypeScript, Launched { run: 2, pid: None });
        app.on_output(ProjectKind::TypeScript, 1, "tick".into());
        app.on_error_report(
            ProjectKind::TypeScript,
            1,
            ErrorReport::new("typescript Error", "typescript: error\n"),
        );
        app.on_output(ProjectKind::TypeScript, 2, "ready".into());

        let lines: Vec<&String> = app.project(ProjectKind::TypeScript).logs.iter().collect();
        assert_eq!(lines, vec!["tick", "ready"]);
        assert!(app.active_modal().is_none());
    }

    #[test]
    fn helper_output_reaches_preparing_slot() {
        let mut app = make_app();
        app.on_preparing(ProjectKind::TypeScript, 7);
        app.on_output(ProjectKind::TypeScript, 7, "[npm install] added 12 packages".into());
        assert_eq!(app.project(ProjectKind::TypeScript).logs.len(), 1);

        assert!(app.finish_helper(ProjectKind::TypeScript, 7));
        app.on_launched(ProjectKind::TypeScript, Launched { run: 8, pid: None });
        assert!(!app.accepts(ProjectKind::TypeScript, 7));
        assert!(app.accepts(ProjectKind::TypeScript, 8));
        assert!(!app.finish_helper(ProjectKind::TypeScript, 7));
    }

    #[test]
    fn launch_is_ignored_while_preparing() {
        let mut app = make_app();
        app.on_preparing(ProjectKind::TypeScript, 3);
        app.handle_key(key(KeyCode::Char('4')));
        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppAction::None);
        assert!(matches!(app.status_message(), Some((_, StatusLevel::Warning))));

        app.finish_helper(ProjectKind::TypeScript, 3);
        app.on_failed(ProjectKind::TypeScript, ErrorReport::new("Error", "npm install failed"));
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppAction::Launch(ProjectKind::TypeScript)
        );
    }
}
