//! Output buffering and persistence for project logs.
//!
//! `LogBuffer` is the bounded scrollback the UI keeps per project. `LogFiles`
//! mirrors each launch's output to a file when a log template is configured.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use strip_ansi_escapes::strip;

use crate::project::ProjectKind;

/// A fixed-capacity ring buffer of output lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<String>,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: String) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }
}

/// Removes ANSI escape codes. Invalid UTF-8 sequences are replaced.
pub fn strip_ansi(text: &str) -> String {
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Sanitizes text for display: no escape codes and no carriage-return overdraw.
pub fn sanitize_text(text: &str) -> String {
    let plain = strip_ansi(text);
    plain.rsplit('\r').next().unwrap_or("").to_string()
}

/// Per-launch output files created from a template such as `logs/{name}-{time}.log`.
#[derive(Debug, Default)]
pub struct LogFiles {
    template: Option<String>,
    writers: HashMap<ProjectKind, BufWriter<File>>,
}

impl LogFiles {
    pub fn new(template: Option<String>) -> Self {
        Self {
            template,
            writers: HashMap::new(),
        }
    }

    /// Starts a fresh file for a new launch of `kind`, closing the previous one.
    pub fn open(&mut self, kind: ProjectKind) -> Option<PathBuf> {
        let template = self.template.as_deref()?;
        if let Some(mut old) = self.writers.remove(&kind) {
            let _ = old.flush();
        }
        let path = PathBuf::from(render_template(template, kind, &log_timestamp()));
        if let Some(parent) = Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match File::create(&path) {
            Ok(file) => {
                self.writers.insert(kind, BufWriter::new(file));
                Some(path)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot create log file");
                None
            }
        }
    }

    pub fn write_line(&mut self, kind: ProjectKind, line: &str) {
        if let Some(writer) = self.writers.get_mut(&kind) {
            let _ = writeln!(writer, "{}", strip_ansi(line));
        }
    }

    pub fn flush_all(&mut self) {
        for writer in self.writers.values_mut() {
            let _ = writer.flush();
        }
    }
}

fn log_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs().to_string()
}

fn render_template(template: &str, kind: ProjectKind, time: &str) -> String {
    template
        .replace("{name}", kind.id())
        .replace("{index}", &kind.index().to_string())
        .replace("{time}", time)
}
