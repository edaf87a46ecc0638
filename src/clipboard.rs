use anyhow::{Context, Result};

use crate::error::ErrorReport;

/// Text placed on the clipboard for an error report.
pub fn report_text(report: &ErrorReport) -> String {
    format!("{}\n\n{}", report.title, report.body.trim_end())
}

/// Copies an error report so it can be pasted into an issue or chat.
pub fn copy_report(report: &ErrorReport) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("failed to access clipboard")?;
    clipboard
        .set_text(report_text(report))
        .with_context(|| format!("failed to copy '{}' to the clipboard", report.title))?;
    Ok(())
}
