//! Persisted option defaults.
//!
//! The lowest-priority tier of the option resolution chain: a TOML file
//! (`pytest-discord.toml` by default) holding one optional key per option,
//! spelled in lower snake-case. Values here are consulted only when neither
//! the command line nor the environment supplies the option.
//!
//! # File Format
//!
//! ```toml
//! discord_webhook = "https://discord.com/api/webhooks/123/abc"
//! discord_verbose = 1
//! discord_username = "ci-bot"
//! discord_attach_file = true
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Persisted defaults for the notification options.
///
/// Every field is optional; an absent key simply falls through to the
/// hard-coded fallback for that option. Unknown keys in the file are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Webhook URL of the Discord channel to notify.
    pub discord_webhook: Option<String>,

    /// Verbosity level for the rendered report.
    pub discord_verbose: Option<i64>,

    /// Username override for the posted message.
    pub discord_username: Option<String>,

    /// Icon URL used as the avatar for successful runs.
    pub discord_success_icon: Option<String>,

    /// Icon URL used as the avatar for skipped runs.
    pub discord_skip_icon: Option<String>,

    /// Icon URL used as the avatar for failed runs.
    pub discord_fail_icon: Option<String>,

    /// Whether to attach the full Markdown report as a file.
    pub discord_attach_file: Option<bool>,
}

/// Loads persisted defaults from a TOML file.
///
/// A missing file is not an error: the defaults tier is optional, so this
/// returns an empty [`Defaults`] when the path does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, or contains
/// invalid TOML.
pub fn load_defaults(path: &Path) -> Result<Defaults> {
    if !path.exists() {
        return Ok(Defaults::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read defaults file: {}", path.display()))?;

    load_defaults_str(&content)
        .with_context(|| format!("Failed to parse defaults file: {}", path.display()))
}

/// Loads persisted defaults from a TOML string.
///
/// Useful for testing or for embedding defaults programmatically.
///
/// # Example
///
/// ```
/// use pytest_discord::config::load_defaults_str;
///
/// let defaults = load_defaults_str(r#"
///     discord_username = "nightly"
///     discord_verbose = 1
/// "#)?;
///
/// assert_eq!(defaults.discord_username.as_deref(), Some("nightly"));
/// assert_eq!(defaults.discord_verbose, Some(1));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_defaults_str(content: &str) -> Result<Defaults> {
    let defaults: Defaults = toml::from_str(content).context("Failed to parse defaults")?;

    Ok(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_all_keys() {
        let defaults = load_defaults_str(
            r#"
            discord_webhook = "https://discord.com/api/webhooks/1/a"
            discord_verbose = 2
            discord_username = "bot"
            discord_success_icon = "https://example.com/ok.png"
            discord_skip_icon = "https://example.com/skip.png"
            discord_fail_icon = "https://example.com/fail.png"
            discord_attach_file = true
            "#,
        )
        .unwrap();

        assert_eq!(
            defaults.discord_webhook.as_deref(),
            Some("https://discord.com/api/webhooks/1/a")
        );
        assert_eq!(defaults.discord_verbose, Some(2));
        assert_eq!(defaults.discord_username.as_deref(), Some("bot"));
        assert_eq!(defaults.discord_attach_file, Some(true));
    }

    #[test]
    fn test_empty_content_is_all_absent() {
        let defaults = load_defaults_str("").unwrap();
        assert!(defaults.discord_webhook.is_none());
        assert!(defaults.discord_verbose.is_none());
        assert!(defaults.discord_attach_file.is_none());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let defaults = load_defaults_str("unrelated = \"value\"").unwrap();
        assert!(defaults.discord_webhook.is_none());
    }

    #[test]
    fn test_missing_file_is_empty_defaults() {
        let defaults = load_defaults(Path::new("/nonexistent/pytest-discord.toml")).unwrap();
        assert!(defaults.discord_webhook.is_none());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(load_defaults_str("discord_verbose = [not an int").is_err());
    }
}
