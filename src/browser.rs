//! Opening the discovered dev-server URL in the default browser.

use anyhow::{Context, Result};

/// Opens `url` with the OS default handler.
///
/// Returns `Ok(false)` when there is nothing to open yet.
pub fn open_url(url: Option<&str>) -> Result<bool> {
    let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
        return Ok(false);
    };
    tracing::info!(%url, "opening browser");
    open::that(url).with_context(|| format!("failed to open {} in the browser", url))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_open_without_url() {
        assert!(!open_url(None).unwrap());
        assert!(!open_url(Some("  ")).unwrap());
    }
}
