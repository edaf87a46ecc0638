//! Output monitoring for launched processes.
//!
//! Each child gets one monitor task that consumes its merged stdout/stderr line
//! by line. Lines are buffered for error reports, scanned for a dev-server URL
//! (TypeScript only) and classified as error signals. Everything the monitor
//! learns is posted to the UI loop as an [`Event`]; it never touches UI state.

use std::io;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ErrorReport, RunnerError};
use crate::events::Event;
use crate::output::strip_ansi;
use crate::project::{ProjectKind, RunId};

/// Benign SDL warning printed by the C++ sample on machines without touch input.
pub const SDL_TOUCH_WARNING: &str = "SDL Error after display: Unknown touch device id";

const ERROR_KEYWORDS: [&str; 4] = ["error", "exception", "failed", "not found"];

// Order matters: the first pattern that matches wins.
const URL_PATTERNS: [&str; 4] = [
    r"Local:\s*(https?://\S+)",
    r"(https?://(?:localhost|127\.0\.0\.1)\S+)",
    r"➜\s*Local:\s*(https?://\S+)",
    r"VITE\s*.*?(https?://(?:localhost|127\.0\.0\.1)\S+)",
];

static URL_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    URL_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Extracts a dev-server URL from one line of output, if the line announces one.
pub fn extract_url(line: &str) -> Option<String> {
    let clean = strip_ansi(line);
    let lower = clean.to_lowercase();
    if !(lower.contains("local:") || lower.contains("localhost:") || lower.contains("127.0.0.1:"))
    {
        return None;
    }
    URL_REGEXES.iter().find_map(|regex| {
        let url = regex.captures(&clean)?.get(1)?.as_str();
        Some(strip_ansi(url).trim().to_string())
    })
}

/// Whether a line should be treated as a sign that the process is failing.
pub fn is_error_signal(line: &str) -> bool {
    let lower = line.to_lowercase();
    if !ERROR_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        return false;
    }
    let touch_device = lower.contains("touch device");
    let suppressed = lower.contains("error after display")
        || (touch_device && lower.contains("not found"))
        || (touch_device && lower.contains("sdl") && lower.contains("error"));
    !suppressed
}

/// What a monitor watches and how it classifies lines.
#[derive(Debug, Clone)]
pub struct MonitorSpec {
    /// Project whose log receives the output.
    pub kind: ProjectKind,
    pub run: RunId,
    /// Used as buffer prefix and in report titles (`java`, `npm install`, ...).
    pub label: String,
    pub detect_url: bool,
    pub skip_touch_warning: bool,
    /// Prefix displayed lines with `[label]`; set for helper processes.
    pub tag_output: bool,
}

impl MonitorSpec {
    /// Monitor for the project's own script or dev server.
    pub fn project(kind: ProjectKind, run: RunId) -> Self {
        Self {
            kind,
            run,
            label: kind.id().to_string(),
            detect_url: kind.serves_http(),
            skip_touch_warning: kind == ProjectKind::Cpp,
            tag_output: false,
        }
    }

    /// Monitor for a helper such as an installer or `npm install`.
    pub fn helper(kind: ProjectKind, run: RunId, label: impl Into<String>) -> Self {
        Self {
            kind,
            run,
            label: label.into(),
            detect_url: false,
            skip_touch_warning: false,
            tag_output: true,
        }
    }
}

/// Result of observing one line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LineOutcome {
    /// The line was dropped entirely (known benign warning).
    pub discarded: bool,
    pub url: Option<String>,
    /// Set on the first error signal of this process lifetime only.
    pub error: Option<ErrorReport>,
}

/// Per-process classification state.
#[derive(Debug)]
pub struct LineMonitor {
    spec: MonitorSpec,
    buffer: String,
    error_reported: bool,
}

impl LineMonitor {
    pub fn new(spec: MonitorSpec) -> Self {
        Self {
            spec,
            buffer: String::new(),
            error_reported: false,
        }
    }

    pub fn observe(&mut self, line: &str) -> LineOutcome {
        if self.spec.skip_touch_warning && line.contains(SDL_TOUCH_WARNING) {
            return LineOutcome {
                discarded: true,
                ..LineOutcome::default()
            };
        }

        self.buffer.push_str(&self.spec.label);
        self.buffer.push_str(": ");
        self.buffer.push_str(line);
        self.buffer.push('\n');

        let mut outcome = LineOutcome::default();
        if self.spec.detect_url {
            outcome.url = extract_url(line);
        }
        if !self.error_reported && is_error_signal(line) {
            self.error_reported = true;
            outcome.error = Some(ErrorReport::new(
                format!("{} Error", self.spec.label),
                self.buffer.clone(),
            ));
        }
        outcome
    }

    /// Report for a stream that broke, unless an error was already reported.
    pub fn stream_failed(&mut self, source: io::Error) -> Option<ErrorReport> {
        if self.error_reported {
            return None;
        }
        self.error_reported = true;
        let cause = source.to_string();
        let err = RunnerError::OutputStream {
            label: self.spec.label.clone(),
            source,
        };
        tracing::warn!(kind = %self.spec.kind, run = self.spec.run, error = %err, "output stream failed");
        Some(ErrorReport::new(
            "Error",
            format!(
                "Error reading {} output:\n{}\n\nFull output:\n{}",
                self.spec.label, cause, self.buffer
            ),
        ))
    }

    fn display_line(&self, line: String) -> String {
        if self.spec.tag_output {
            format!("[{}] {}", self.spec.label, line)
        } else {
            line
        }
    }
}

/// Merges a child's stdout and stderr into one line stream.
///
/// The receiver yields `Err` once if reading either pipe fails, and closes
/// when both pipes reach end of stream.
pub fn merge_output(child: &mut Child) -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(256);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_lines(stderr, tx));
    }
    rx
}

async fn pump_lines<R>(reader: R, tx: mpsc::Sender<io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Ok(decode_line(&buf))).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Starts the monitor task for one process.
pub fn spawn_monitor(
    spec: MonitorSpec,
    lines: mpsc::Receiver<io::Result<String>>,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(monitor(spec, lines, tx))
}

/// Consumes a merged line stream until it closes, posting events to the UI loop.
pub async fn monitor(
    spec: MonitorSpec,
    mut lines: mpsc::Receiver<io::Result<String>>,
    tx: mpsc::Sender<Event>,
) {
    let kind = spec.kind;
    let run = spec.run;
    let mut state = LineMonitor::new(spec);
    while let Some(item) = lines.recv().await {
        let line = match item {
            Ok(line) => line,
            Err(err) => {
                if let Some(report) = state.stream_failed(err) {
                    let _ = tx.send(Event::ErrorReport { kind, run, report }).await;
                }
                return;
            }
        };
        let outcome = state.observe(&line);
        if outcome.discarded {
            continue;
        }
        let line = state.display_line(line);
        if tx.send(Event::Output { kind, run, line }).await.is_err() {
            return;
        }
        if let Some(url) = outcome.url {
            tracing::info!(%kind, run, %url, "dev server url discovered");
            let _ = tx.send(Event::UrlDiscovered { kind, run, url }).await;
        }
        if let Some(report) = outcome.error {
            let _ = tx.send(Event::ErrorReport { kind, run, report }).await;
        }
    }
    tracing::debug!(%kind, run, "output stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_url_patterns_compile() {
        assert_eq!(URL_REGEXES.len(), URL_PATTERNS.len());
    }

    #[test]
    fn extracts_vite_local_banner() {
        assert_eq!(
            extract_url("➜  Local:   http://localhost:5173/").as_deref(),
            Some("http://localhost:5173/")
        );
    }

    #[test]
    fn extracts_only_from_the_banner_line() {
        assert_eq!(extract_url("VITE v5.0.0  ready in 300 ms"), None);
        assert_eq!(
            extract_url("➜  Local: http://127.0.0.1:3000/").as_deref(),
            Some("http://127.0.0.1:3000/")
        );
    }

    #[test]
    fn extracts_through_ansi_codes() {
        let line = "  \u{1b}[32m➜\u{1b}[39m  \u{1b}[1mLocal\u{1b}[22m:   \u{1b}[36mhttp://localhost:\u{1b}[1m5173\u{1b}[22m/\u{1b}[39m";
        assert_eq!(extract_url(line).as_deref(), Some("http://localhost:5173/"));
    }

    #[test]
    fn extracts_bare_localhost_url() {
        assert_eq!(
            extract_url("Server listening on https://localhost:8443/app").as_deref(),
            Some("https://localhost:8443/app")
        );
        assert_eq!(extract_url("see http://example.com:80/"), None);
    }

    #[test]
    fn classifies_error_lines() {
        assert!(is_error_signal("Error: cannot find module 'vite'"));
        assert!(is_error_signal("java.lang.NullPointerException"));
        assert!(is_error_signal("BUILD FAILED in 3s"));
        assert!(is_error_signal("cmake: command not found"));
        assert!(!is_error_signal("compiled successfully"));
    }

    #[test]
    fn suppresses_touch_device_noise() {
        assert!(!is_error_signal("SDL Error after display: Unknown touch device id 3"));
        assert!(!is_error_signal("sdl error after display"));
        assert!(!is_error_signal("touch device not found"));
        assert!(!is_error_signal("SDL error: touch device 7 missing"));
    }

    #[test]
    fn cpp_touch_warning_is_discarded_without_buffering() {
        let mut monitor = LineMonitor::new(MonitorSpec::project(ProjectKind::Cpp, 1));
        let outcome = monitor.observe("SDL Error after display: Unknown touch device id 3");
        assert!(outcome.discarded);
        assert!(outcome.error.is_none());
        assert!(monitor.buffer.is_empty());
    }

    #[test]
    fn reports_first_error_once_with_buffer() {
        let mut monitor = LineMonitor::new(MonitorSpec::project(ProjectKind::TypeScript, 1));
        assert!(monitor.observe("> starter@1.0.0 dev").error.is_none());
        let report = monitor
            .observe("Error: cannot find module 'vite'")
            .error
            .unwrap();
        assert_eq!(report.title, "typescript Error");
        assert_eq!(
            report.body,
            "typescript: > starter@1.0.0 dev\ntypescript: Error: cannot find module 'vite'\n"
        );
        assert!(monitor.observe("Error: still broken").error.is_none());
        assert!(monitor
            .stream_failed(io::Error::new(io::ErrorKind::Other, "pipe closed"))
            .is_none());
    }

    #[test]
    fn every_url_match_updates() {
        let mut monitor = LineMonitor::new(MonitorSpec::project(ProjectKind::TypeScript, 1));
        let first = monitor.observe("Local: http://localhost:5173/").url;
        let second = monitor.observe("Local: http://localhost:5174/").url;
        assert_eq!(first.as_deref(), Some("http://localhost:5173/"));
        assert_eq!(second.as_deref(), Some("http://localhost:5174/"));
    }

    #[test]
    fn non_typescript_projects_do_not_detect_urls() {
        let mut monitor = LineMonitor::new(MonitorSpec::project(ProjectKind::Python, 1));
        assert!(monitor.observe("Local: http://localhost:8000/").url.is_none());
    }

    #[test]
    fn stream_failure_reports_buffer() {
        let mut monitor = LineMonitor::new(MonitorSpec::project(ProjectKind::Java, 4));
        monitor.observe("compiling");
        let report = monitor
            .stream_failed(io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke"))
            .unwrap();
        assert_eq!(report.title, "Error");
        assert!(report.body.starts_with("Error reading java output:\npipe broke"));
        assert!(report.body.ends_with("Full output:\njava: compiling\n"));
    }

    #[test]
    fn decode_line_trims_line_endings_and_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"caf\xff\n"), "caf\u{fffd}");
    }

    async fn collect(spec: MonitorSpec, items: Vec<io::Result<String>>) -> Vec<Event> {
        let (line_tx, line_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let handle = spawn_monitor(spec, line_rx, event_tx);
        for item in items {
            // The monitor stops reading after a stream error.
            let _ = line_tx.send(item).await;
        }
        drop(line_tx);
        handle.await.unwrap();
        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn monitor_posts_url_and_single_error() {
        let events = collect(
            MonitorSpec::project(ProjectKind::TypeScript, 7),
            vec![
                Ok("VITE v5.0.0  ready in 300 ms".to_string()),
                Ok("➜  Local: http://127.0.0.1:3000/".to_string()),
                Ok("Error: one".to_string()),
                Ok("Error: two".to_string()),
            ],
        )
        .await;
        let urls: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                Event::UrlDiscovered { url, run, .. } => Some((url.clone(), *run)),
                _ => None,
            })
            .collect();
        assert_eq!(urls, vec![("http://127.0.0.1:3000/".to_string(), 7)]);
        let errors = events
            .iter()
            .filter(|event| matches!(event, Event::ErrorReport { .. }))
            .count();
        assert_eq!(errors, 1);
        let outputs = events
            .iter()
            .filter(|event| matches!(event, Event::Output { .. }))
            .count();
        assert_eq!(outputs, 4);
    }

    #[tokio::test]
    async fn monitor_reports_stream_failure() {
        let events = collect(
            MonitorSpec::helper(ProjectKind::Java, 2, "JDK Installation"),
            vec![
                Ok("Downloading".to_string()),
                Err(io::Error::new(io::ErrorKind::Other, "read failed")),
                Ok("never seen".to_string()),
            ],
        )
        .await;
        let lines: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                Event::Output { line, .. } => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["[JDK Installation] Downloading"]);
        let report = events.iter().find_map(|event| match event {
            Event::ErrorReport { report, .. } => Some(report.clone()),
            _ => None,
        });
        let report = report.unwrap();
        assert!(report.body.contains("Error reading JDK Installation output"));
        assert!(report.body.contains("JDK Installation: Downloading"));
    }
}
