//! devrunner: launcher for the Java, C++, Python and TypeScript starter projects.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, loads the project paths and runner settings, and either runs one
//! of the headless subcommands or the terminal UI event loop.

mod app;
mod browser;
mod clipboard;
mod config;
mod deps;
mod error;
mod events;
mod launcher;
mod monitor;
mod output;
mod platform;
mod project;
mod resolver;
mod runner;
mod tui;

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppAction, Modal, EXPORT_DIR};
use crate::config::{ProjectPaths, Settings, PATHS_FILE, SETTINGS_FILE};
use crate::deps::InstallOutcome;
use crate::error::ErrorReport;
use crate::events::Event;
use crate::launcher::LaunchRequest;
use crate::output::LogFiles;
use crate::platform::Platform;
use crate::project::{ProjectKind, RunId};
use crate::resolver::{FallbackPolicy, HostProbe, Resolution, ResolveOptions, ScriptPlan};
use crate::runner::{Launched, ProcessManager};

const DEFAULT_MAX_LINES: usize = 10_000;
const DEFAULT_SHUTDOWN_MS: u64 = 1500;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "devrunner",
    version,
    about = "Launch the Java, C++, Python and TypeScript starter projects",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to devrunner.toml settings file.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Ignore any devrunner.toml in the current directory.
    #[arg(long, global = true)]
    no_settings: bool,
    /// Project paths file (default: project_paths.json).
    #[arg(long, global = true)]
    paths: Option<PathBuf>,
    /// Max log lines kept per project.
    #[arg(long)]
    max_lines: Option<usize>,
    /// Log file template (e.g. "logs/{name}-{time}.log").
    #[arg(long, global = true)]
    log_file: Option<String>,
    /// Time to wait after interrupting projects before killing them (ms).
    #[arg(long, global = true)]
    shutdown_ms: Option<u64>,
    /// Start the TypeScript project with `npm run dev` instead of its script.
    #[arg(long, global = true)]
    npm: bool,
    /// Use plain ASCII instead of Unicode symbols.
    #[arg(long)]
    no_symbols: bool,
    /// Write diagnostics of the terminal UI to this file.
    #[arg(long)]
    trace_file: Option<PathBuf>,
    /// Log more diagnostics.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Launch projects without the terminal UI and print their output.
    Run {
        #[arg(required = true, value_enum)]
        projects: Vec<ProjectKind>,
        /// Run run.sh through WSL when run.ps1 is missing (Windows).
        #[arg(long)]
        wsl: bool,
    },
    /// Report which required tools are on the search path.
    Check {
        #[arg(value_enum)]
        project: Option<ProjectKind>,
    },
    /// Install the tools a project is missing (Windows).
    Install {
        #[arg(value_enum)]
        project: ProjectKind,
    },
    /// Print the effective project paths.
    Paths,
    /// Show version information.
    Version,
}

/// Runtime configuration derived from CLI arguments and the settings file.
#[derive(Debug, Clone, PartialEq)]
struct RunSettings {
    max_lines: usize,
    use_symbols: bool,
    log_file: Option<String>,
    shutdown: Duration,
    paths_file: PathBuf,
    npm_direct: bool,
}

impl RunSettings {
    fn from_cli(cli: &Cli, settings: Settings) -> Self {
        let max_lines = cli
            .max_lines
            .or(settings.max_lines)
            .unwrap_or(DEFAULT_MAX_LINES)
            .max(1);
        let use_symbols = !cli.no_symbols && settings.symbols.unwrap_or(true);
        let shutdown_ms = cli
            .shutdown_ms
            .or(settings.shutdown_ms)
            .unwrap_or(DEFAULT_SHUTDOWN_MS);
        let paths_file = cli
            .paths
            .clone()
            .or(settings.paths_file)
            .unwrap_or_else(|| PathBuf::from(PATHS_FILE));
        Self {
            max_lines,
            use_symbols,
            log_file: cli.log_file.clone().or(settings.log_file),
            shutdown: Duration::from_millis(shutdown_ms),
            paths_file,
            npm_direct: cli.npm || settings.typescript_npm.unwrap_or(false),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let headless = cli.command.is_some();
    init_tracing(&cli, headless)?;
    let settings = RunSettings::from_cli(&cli, load_settings_file(&cli)?);
    let platform = Platform::current();
    tracing::debug!(?settings, ?platform, "starting");

    match cli.command {
        Some(Commands::Version) => {
            println!("devrunner {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Paths) => print_paths(&settings, platform),
        Some(Commands::Check { project }) => {
            print_check(project);
            Ok(())
        }
        Some(Commands::Install { project }) => install_headless(project, platform).await,
        Some(Commands::Run { projects, wsl }) => {
            run_headless(projects, wsl, &settings, platform).await
        }
        None => run_tui(&settings, platform).await,
    }
}

fn load_settings_file(cli: &Cli) -> Result<Settings> {
    if cli.no_settings {
        return Ok(Settings::default());
    }
    let path = cli
        .settings
        .clone()
        .or_else(|| Some(PathBuf::from(SETTINGS_FILE)).filter(|path| path.exists()));
    match path {
        Some(path) => config::load_settings(&path),
        None => Ok(Settings::default()),
    }
}

fn init_tracing(cli: &Cli, headless: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "info" } else { "warn" }));
    if headless {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        return Ok(());
    }
    // Anything written to the terminal would corrupt the alternate screen.
    let Some(path) = &cli.trace_file else {
        return Ok(());
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init();
    Ok(())
}

fn load_paths(settings: &RunSettings, platform: Platform) -> (ProjectPaths, Option<ErrorReport>) {
    let (paths, err) = ProjectPaths::load_or_default(&settings.paths_file);
    (paths, err.map(|err| err.report(platform)))
}

/// What `Session::start` did with a plan.
enum Started {
    Launched(Launched),
    /// A preparation step is running as this helper run; its result arrives
    /// as [`Event::Prepared`].
    Preparing(RunId),
}

/// Owns everything the event loop needs besides `App`.
struct Session {
    manager: ProcessManager,
    log_files: LogFiles,
    event_tx: mpsc::Sender<Event>,
    platform: Platform,
    settings: RunSettings,
    fallback: FallbackPolicy,
    /// Filled on first resolution.
    probe: Option<HostProbe>,
}

impl Session {
    fn new(settings: &RunSettings, platform: Platform, fallback: FallbackPolicy, event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            manager: ProcessManager::new(event_tx.clone(), settings.shutdown),
            log_files: LogFiles::new(settings.log_file.clone()),
            event_tx,
            platform,
            settings: settings.clone(),
            fallback,
            probe: None,
        }
    }

    async fn host_probe(&mut self) -> HostProbe {
        if let Some(probe) = self.probe {
            return probe;
        }
        let probe = HostProbe::detect(self.platform).await;
        self.probe = Some(probe);
        probe
    }

    async fn resolve(&mut self, kind: ProjectKind, paths: &ProjectPaths) -> Result<Resolution, ErrorReport> {
        let probe = self.host_probe().await;
        let options = ResolveOptions {
            platform: self.platform,
            fallback: self.fallback,
            npm_direct: self.settings.npm_direct,
        };
        resolver::resolve(kind, paths.get(kind), options, &probe).map_err(|err| {
            tracing::warn!(%kind, error = %err, "cannot resolve project");
            err.report(self.platform)
        })
    }

    /// Starts a resolved plan, or schedules its preparation step.
    async fn start(&mut self, plan: ScriptPlan) -> Result<Started, ErrorReport> {
        let kind = plan.kind;
        let request = LaunchRequest::new(plan, self.platform);
        if request.needs_preparation() {
            self.manager.terminate(kind).await;
            let run = self.manager.allocate_run();
            let tx = self.event_tx.clone();
            let platform = self.platform;
            tokio::spawn(async move {
                let result = match launcher::install_node_modules(&request, run, tx.clone()).await {
                    Ok(()) => Ok(request),
                    Err(err) => Err(err.report(platform)),
                };
                let _ = tx.send(Event::Prepared { kind, run, result }).await;
            });
            return Ok(Started::Preparing(run));
        }
        self.spawn(&request).await.map(Started::Launched)
    }

    async fn spawn(&mut self, request: &LaunchRequest) -> Result<Launched, ErrorReport> {
        let kind = request.kind();
        let launched = self
            .manager
            .launch(request)
            .await
            .map_err(|err| err.report(self.platform))?;
        if let Some(path) = self.log_files.open(kind) {
            tracing::info!(%kind, path = %path.display(), "writing output log");
        }
        Ok(launched)
    }

    fn install(&mut self, kind: ProjectKind) -> RunId {
        let run = self.manager.allocate_run();
        let tx = self.event_tx.clone();
        let platform = self.platform;
        tokio::spawn(async move {
            let result = deps::install_if_missing(kind, platform, run, tx.clone())
                .await
                .map_err(|err| err.report(platform));
            let _ = tx.send(Event::InstallFinished { kind, run, result }).await;
        });
        run
    }
}

async fn run_tui(settings: &RunSettings, platform: Platform) -> Result<()> {
    let (paths, load_error) = load_paths(settings, platform);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut session = Session::new(settings, platform, FallbackPolicy::Ask, event_tx.clone());
    let mut app = App::new(paths, platform, settings.max_lines, settings.use_symbols);
    if let Some(report) = load_error {
        app.show_error(report);
    }

    let mut terminal = tui::init_terminal().context("failed to initialize terminal")?;
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());
    drop(event_tx);

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Event::Output { kind, run, line } => {
                        if app.accepts(kind, run) {
                            session.log_files.write_line(kind, &line);
                            app.on_output(kind, run, line);
                        }
                    }
                    Event::UrlDiscovered { kind, run, url } => app.on_url(kind, run, url),
                    Event::ErrorReport { kind, run, report } => app.on_error_report(kind, run, report),
                    Event::Prepared { kind, run, result } => {
                        if app.finish_helper(kind, run) {
                            match result {
                                Ok(request) => match session.spawn(&request).await {
                                    Ok(launched) => app.on_launched(kind, launched),
                                    Err(report) => app.on_failed(kind, report),
                                },
                                Err(report) => app.on_failed(kind, report),
                            }
                        }
                    }
                    Event::InstallFinished { kind, run, result } => {
                        app.on_install_finished(kind, Some(run), result)
                    }
                    Event::Shutdown => app.should_quit = true,
                    Event::Key(key) => {
                        let action = app.handle_key(key);
                        handle_app_action(action, &mut app, &mut session).await;
                    }
                    Event::Resize => {
                        let _ = terminal.autoresize();
                    }
                }
            }
            _ = ticker.tick() => {
                for exit in session.manager.poll_exits() {
                    tracing::info!(kind = %exit.kind, run = exit.run, code = ?exit.code, "project exited");
                    app.on_exit(exit);
                }
            }
        }

        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            outcome = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    session.manager.shutdown_all().await;
    session.log_files.flush_all();
    tui::restore_terminal(terminal)?;
    outcome
}

async fn handle_app_action(action: AppAction, app: &mut App, session: &mut Session) {
    let platform = session.platform;
    match action {
        AppAction::None | AppAction::Quit => {}
        AppAction::Launch(kind) => match session.resolve(kind, &app.paths).await {
            Ok(Resolution::Ready(plan)) => start_plan(plan, app, session).await,
            Ok(Resolution::ConfirmFallback(plan)) => app.push_modal(Modal::ConfirmFallback(plan)),
            Err(report) => app.on_failed(kind, report),
        },
        AppAction::ConfirmFallback(plan) => start_plan(plan, app, session).await,
        AppAction::DeclineFallback(plan) => {
            let kind = plan.kind;
            app.on_failed(kind, resolver::declined(plan).report(platform));
        }
        AppAction::SavePaths => match app.paths.save(&session.settings.paths_file) {
            Ok(()) => app.set_status_message(format!(
                "Saved project paths to {}",
                session.settings.paths_file.display()
            )),
            Err(err) => app.show_error(err.report(platform)),
        },
        AppAction::OpenBrowser(url) => match browser::open_url(Some(url.as_str())) {
            Ok(_) => app.set_status_message(format!("Opened {}", url)),
            Err(err) => app.show_notice("Browser", format!("{:#}", err)),
        },
        AppAction::Install(kind) => {
            if platform == Platform::Windows {
                let run = session.install(kind);
                app.on_installing(kind, run);
            } else {
                app.on_install_finished(kind, None, Ok(InstallOutcome::Unsupported));
            }
        }
        AppAction::Export(kind) => {
            if let Err(err) = app.export_logs(kind, Path::new(EXPORT_DIR)) {
                app.set_status_warning(format!("Export failed: {:#}", err));
            }
        }
        AppAction::CopyReport(report) => match clipboard::copy_report(&report) {
            Ok(()) => app.set_status_message("Copied error report to clipboard"),
            Err(err) => app.set_status_warning(format!("Clipboard failed: {:#}", err)),
        },
    }
}

async fn start_plan(plan: ScriptPlan, app: &mut App, session: &mut Session) {
    let kind = plan.kind;
    match session.start(plan).await {
        Ok(Started::Launched(launched)) => {
            app.on_launched(kind, launched);
            app.set_status_message(format!("Started {}", kind.label()));
        }
        Ok(Started::Preparing(helper)) => {
            app.on_preparing(kind, helper);
            app.set_status_message("Installing npm packages...");
        }
        Err(report) => app.on_failed(kind, report),
    }
}

async fn run_headless(
    projects: Vec<ProjectKind>,
    wsl: bool,
    settings: &RunSettings,
    platform: Platform,
) -> Result<()> {
    let (paths, load_error) = load_paths(settings, platform);
    if let Some(report) = load_error {
        print_report(&report);
    }
    let fallback = if wsl {
        FallbackPolicy::Accept
    } else {
        FallbackPolicy::Decline
    };
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut session = Session::new(settings, platform, fallback, event_tx.clone());
    spawn_signal_listener(event_tx.clone());
    drop(event_tx);

    // Projects that are running or preparing.
    let mut active = BTreeSet::new();
    // Preparation runs still streaming output.
    let mut helpers = HashSet::new();
    let kinds: BTreeSet<ProjectKind> = projects.into_iter().collect();
    for kind in kinds {
        let plan = match session.resolve(kind, &paths).await {
            Ok(Resolution::Ready(plan)) | Ok(Resolution::ConfirmFallback(plan)) => plan,
            Err(report) => {
                print_report(&report);
                continue;
            }
        };
        match session.start(plan).await {
            Ok(Started::Launched(launched)) => println!("[{}] started (run {})", kind, launched.run),
            Ok(Started::Preparing(helper)) => {
                helpers.insert(helper);
                println!("[{}] running npm install", kind);
            }
            Err(report) => {
                print_report(&report);
                continue;
            }
        }
        active.insert(kind);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    while !active.is_empty() {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                Event::Output { kind, run, line } => {
                    if is_live(&session, &helpers, kind, run) {
                        session.log_files.write_line(kind, &line);
                        println!("[{}] {}", kind, line);
                    }
                }
                Event::UrlDiscovered { kind, run, url } => {
                    if session.manager.current_run(kind) == Some(run) {
                        println!("[{}] dev server at {}", kind, url);
                    }
                }
                Event::ErrorReport { kind, run, report } => {
                    if is_live(&session, &helpers, kind, run) {
                        print_report(&report);
                    }
                }
                Event::Prepared { kind, run, result } => {
                    helpers.remove(&run);
                    let spawned = match result {
                        Ok(request) => session.spawn(&request).await.map(|_| ()),
                        Err(report) => Err(report),
                    };
                    if let Err(report) = spawned {
                        print_report(&report);
                        active.remove(&kind);
                    }
                }
                Event::Shutdown => break,
                Event::InstallFinished { .. } | Event::Key(_) | Event::Resize => {}
            },
            _ = ticker.tick() => {
                for exit in session.manager.poll_exits() {
                    let code = exit.code.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
                    println!("[{}] exited ({})", exit.kind, code);
                    active.remove(&exit.kind);
                }
            }
        }
    }

    session.manager.shutdown_all().await;
    session.log_files.flush_all();
    Ok(())
}

/// Whether `run` is the tracked process of `kind` or a running preparation step.
fn is_live(session: &Session, helpers: &HashSet<RunId>, kind: ProjectKind, run: RunId) -> bool {
    session.manager.current_run(kind) == Some(run) || helpers.contains(&run)
}

async fn install_headless(kind: ProjectKind, platform: Platform) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(256);
    let task = tokio::spawn(deps::install_if_missing(kind, platform, 1, tx));
    while let Some(event) = rx.recv().await {
        match event {
            Event::Output { line, .. } => println!("{}", line),
            Event::ErrorReport { report, .. } => print_report(&report),
            _ => {}
        }
    }
    let outcome = task
        .await
        .context("installer task failed")?
        .map_err(|err| anyhow::anyhow!("{}", err.report(platform).body))?;
    println!("{}", outcome.message(kind));
    Ok(())
}

fn print_check(project: Option<ProjectKind>) {
    let kinds = match project {
        Some(kind) => vec![kind],
        None => ProjectKind::ALL.to_vec(),
    };
    for kind in kinds {
        for tool in deps::required_tools(kind) {
            match deps::locate(tool) {
                Some(path) => println!("{:<10} {:<6} {}", kind, tool, path.display()),
                None => println!("{:<10} {:<6} missing", kind, tool),
            }
        }
    }
}

fn print_paths(settings: &RunSettings, platform: Platform) -> Result<()> {
    let paths = ProjectPaths::load(&settings.paths_file)
        .map_err(|err| anyhow::anyhow!("{}", err.report(platform).body))?;
    println!("# {}", settings.paths_file.display());
    for kind in ProjectKind::ALL {
        println!("{:<10} {}", kind, paths.get(kind));
    }
    Ok(())
}

fn print_report(report: &ErrorReport) {
    eprintln!("== {} ==\n{}", report.title, report.body.trim_end());
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let sent = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key))
                    if key.kind == crossterm::event::KeyEventKind::Press =>
                {
                    tx.blocking_send(Event::Key(key))
                }
                Ok(crossterm::event::Event::Resize(_, _)) => tx.blocking_send(Event::Resize),
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        let _ = tx.send(Event::Shutdown).await;
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_subcommand_parses_project_ids() {
        let cli = Cli::try_parse_from(["devrunner", "run", "typescript", "cpp", "--wsl"]).unwrap();
        match cli.command {
            Some(Commands::Run { projects, wsl }) => {
                assert_eq!(projects, vec![ProjectKind::TypeScript, ProjectKind::Cpp]);
                assert!(wsl);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["devrunner", "run", "rust"]).is_err());
        assert!(Cli::try_parse_from(["devrunner", "run"]).is_err());
    }

    #[test]
    fn cli_flags_override_settings_file() {
        let cli = Cli::try_parse_from([
            "devrunner",
            "--max-lines",
            "50",
            "--paths",
            "other.json",
            "--no-symbols",
        ])
        .unwrap();
        let file: Settings = toml::from_str(
            "max_lines = 10\nshutdown_ms = 300\ntypescript_npm = true\npaths_file = \"cfg.json\"\n",
        )
        .unwrap();
        let settings = RunSettings::from_cli(&cli, file);
        assert_eq!(settings.max_lines, 50);
        assert_eq!(settings.paths_file, PathBuf::from("other.json"));
        assert_eq!(settings.shutdown, Duration::from_millis(300));
        assert!(settings.npm_direct);
        assert!(!settings.use_symbols);
    }

    #[test]
    fn defaults_without_settings_file() {
        let cli = Cli::try_parse_from(["devrunner"]).unwrap();
        let settings = RunSettings::from_cli(&cli, Settings::default());
        assert_eq!(settings.max_lines, DEFAULT_MAX_LINES);
        assert_eq!(settings.paths_file, PathBuf::from(PATHS_FILE));
        assert_eq!(settings.shutdown, Duration::from_millis(DEFAULT_SHUTDOWN_MS));
        assert!(settings.use_symbols);
        assert!(!settings.npm_direct);
    }
}
