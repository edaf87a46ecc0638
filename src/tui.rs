//! Terminal User Interface (TUI) rendering and management.
//!
//! The screen has a header with the host description, a project list with the
//! configured path of each project, a log pane for the selected project and a
//! status bar. Modals (error reports, the WSL confirmation, notices) and the
//! help overlay are drawn on top.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::app::{App, InputMode, Modal, StatusLevel};
use crate::output::sanitize_text;
use crate::project::ProjectStatus;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Enables raw mode and enters the alternate screen.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, SetTitle("devrunner"))?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    terminal.draw(|frame| render(app, frame))?;
    Ok(())
}

fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.size();
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(4),
        ])
        .split(area);
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
        .split(vertical[1]);

    let header = Paragraph::new(app.header_line()).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(header, vertical[0]);

    render_projects(app, frame, main[0]);
    render_logs(app, frame, main[1]);
    render_status(app, frame, vertical[2]);

    if app.show_help {
        render_help(frame, area);
    }
    if let Some(modal) = app.active_modal() {
        render_modal(modal, frame, area);
    }
}

fn render_projects(app: &App, frame: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(6) as usize;
    let items: Vec<ListItem> = app
        .projects
        .iter()
        .enumerate()
        .map(|(idx, project)| {
            let selected = idx == app.selected;
            let marker = if selected { "▶ " } else { "  " };
            let name_style = if selected {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mut text = Text::default();
            text.lines.push(Line::from(vec![
                Span::raw(marker),
                Span::styled(
                    format!("[{}] ", status_char(&project.status, app.use_symbols)),
                    status_style(&project.status),
                ),
                Span::styled(format!("{}. {}", idx + 1, project.kind.label()), name_style),
            ]));
            text.lines.push(Line::from(vec![
                Span::raw("    "),
                Span::styled(
                    truncate(app.paths.get(project.kind), width),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
            if project.kind.serves_http() {
                let url = app.browser_url().unwrap_or("no dev server yet");
                text.lines.push(Line::from(vec![
                    Span::raw("    "),
                    Span::styled(
                        truncate(url, width),
                        if app.browser_url().is_some() {
                            Style::default().fg(Color::Green)
                        } else {
                            Style::default().fg(Color::DarkGray)
                        },
                    ),
                ]));
            }
            ListItem::new(text)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title("Projects")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    let mut state = ListState::default();
    state.select(Some(app.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_logs(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(log_title(app))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    let height = inner.height as usize;
    app.set_log_view_height(height);

    let Some(project) = app.selected_project() else {
        frame.render_widget(block, area);
        return;
    };
    let total = project.logs.len();
    let start = if project.follow {
        total.saturating_sub(height)
    } else {
        project.scroll.min(total.saturating_sub(height))
    };
    let width = inner.width.saturating_sub(1) as usize;
    let lines: Vec<Line> = project
        .logs
        .iter()
        .skip(start)
        .take(height)
        .map(|line| log_line(sanitize_text(line), width))
        .collect();

    if lines.is_empty() {
        let empty = Paragraph::new("No output yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }
    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn log_line(text: String, width: usize) -> Line<'static> {
    let text = truncate(&text, width);
    // Helper output is tagged `[label] ...`; dim the tag.
    if text.starts_with('[') {
        if let Some(end) = text.find("] ") {
            let (tag, rest) = text.split_at(end + 2);
            return Line::from(vec![
                Span::styled(tag.to_string(), Style::default().fg(Color::Magenta)),
                Span::raw(rest.to_string()),
            ]);
        }
    }
    Line::from(Span::raw(text))
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let default_help = if app.use_symbols {
        "↑/↓ select | Enter launch | e edit path | s save | o open browser | i install | x export | f follow | ? help | q quit"
    } else {
        "Up/Down select | Enter launch | e edit path | s save | o open browser | i install | x export | f follow | ? help | q quit"
    };
    let help_line = match app.input_mode {
        InputMode::EditPath => Line::from(vec![
            Span::styled(
                format!("{} path: ", app.selected_kind().label()),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(format!("{}{}", app.input, if app.use_symbols { "▌" } else { "|" })),
            Span::styled("  (Enter to apply, Esc to cancel)", Style::default().fg(Color::DarkGray)),
        ]),
        InputMode::Normal => match app.status_message() {
            Some((text, StatusLevel::Warning)) => {
                Line::from(Span::styled(text.to_string(), Style::default().fg(Color::Yellow)))
            }
            Some((text, StatusLevel::Info)) => {
                Line::from(Span::styled(text.to_string(), Style::default().fg(Color::Green)))
            }
            None => Line::from(Span::styled(default_help, Style::default().fg(Color::DarkGray))),
        },
    };
    let status = Paragraph::new(Text::from(vec![Line::from(app.status_line()), help_line])).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(status, area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let help_text = [
        "Navigation:",
        "  Up/Down/Tab  Select project",
        "  1-4          Jump to project",
        "  PageUp/Dn    Scroll logs",
        "  Home/End     Scroll to top/bottom",
        "",
        "Actions:",
        "  Enter / l    Launch (restarts if running)",
        "  e            Edit project path",
        "  s            Save project paths",
        "  o            Open dev server in browser",
        "  i            Install missing tools (Windows)",
        "  x            Export logs to file",
        "  f            Toggle auto-follow",
        "",
        "Dialogs:",
        "  y / n        Answer WSL prompt",
        "  c            Copy error report",
        "  Esc / Enter  Close",
        "",
        "  ?            Toggle this help",
        "  q            Quit",
    ]
    .join("\n");
    let popup = centered_rect(60, 70, area);
    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(Clear, popup);
    frame.render_widget(help, popup);
}

fn render_modal(modal: &Modal, frame: &mut Frame, area: Rect) {
    let (title, body, footer, color, scroll) = match modal {
        Modal::Error { report, scroll } => (
            report.title.clone(),
            report.body.clone(),
            "Up/Down scroll | c copy | Esc close",
            Color::Red,
            *scroll,
        ),
        Modal::ConfirmFallback(plan) => (
            "Run with WSL?".to_string(),
            format!(
                "PowerShell script not found in {}.\n\n\
                 Would you like to try running the shell script (run.sh) using WSL?",
                plan.dir.display()
            ),
            "y yes | n no",
            Color::Yellow,
            0,
        ),
        Modal::Notice { title, text, .. } => {
            (title.clone(), text.clone(), "Enter close", Color::Cyan, 0)
        }
    };
    let popup = centered_rect(70, 60, area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(popup);
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color));
    let text = Paragraph::new(sanitize_text_block(&body))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(Clear, popup);
    frame.render_widget(text, chunks[0]);
    frame.render_widget(
        Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
        chunks[1],
    );
}

fn sanitize_text_block(text: &str) -> String {
    text.lines().map(sanitize_text).collect::<Vec<_>>().join("\n")
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn log_title(app: &App) -> String {
    match app.selected_project() {
        Some(project) => format!(
            "Logs - {} ({})",
            project.kind.label(),
            crate::app::status_text(&project.status)
        ),
        None => "Logs".to_string(),
    }
}

fn status_char(status: &ProjectStatus, use_symbols: bool) -> char {
    if use_symbols {
        return match status {
            ProjectStatus::Idle => '·',
            ProjectStatus::Preparing => '↻',
            ProjectStatus::Running => '▲',
            ProjectStatus::Exited { .. } | ProjectStatus::Failed { .. } => '■',
        };
    }
    match status {
        ProjectStatus::Idle => '.',
        ProjectStatus::Preparing => 'P',
        ProjectStatus::Running => 'R',
        ProjectStatus::Exited { code: Some(0) } => 'E',
        ProjectStatus::Exited { .. } => 'X',
        ProjectStatus::Failed { .. } => 'F',
    }
}

fn status_style(status: &ProjectStatus) -> Style {
    match status {
        ProjectStatus::Idle => Style::default().fg(Color::DarkGray),
        ProjectStatus::Preparing => Style::default().fg(Color::Yellow),
        ProjectStatus::Running => Style::default().fg(Color::Green),
        ProjectStatus::Exited { code: Some(0) } => Style::default().fg(Color::Gray),
        ProjectStatus::Exited { .. } | ProjectStatus::Failed { .. } => Style::default().fg(Color::Red),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("abcdef", 4), "abc~");
        assert_eq!(truncate("abc", 4), "abc");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn helper_tags_are_split_off() {
        let line = log_line("[npm install] added 10 packages".to_string(), 80);
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].content, "[npm install] ");
    }
}
