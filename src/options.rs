//! Option resolution for the notification pipeline.
//!
//! Each of the seven notification settings is resolved through the same
//! prioritized chain: an explicit command-line value wins over an
//! environment variable, which wins over a key in the persisted defaults
//! file, which wins over the hard-coded fallback. The order is fixed and
//! never reversed.
//!
//! A setting has one canonical kebab-case name (e.g. `discord-webhook`)
//! from which all three spellings derive:
//!
//! | Tier | Spelling | Example |
//! |------|----------|---------|
//! | CLI flag | `--` + kebab-case | `--discord-webhook` |
//! | Environment | `PYTEST_` + UPPER_SNAKE | `PYTEST_DISCORD_WEBHOOK` |
//! | Defaults file | lower_snake | `discord_webhook` |
//!
//! Type conversions are permissive: a malformed integer or boolean in the
//! environment or defaults file is treated as "value absent" and resolution
//! falls through to the next tier. Nothing here ever errors.

use std::collections::HashMap;

use clap::{ArgAction, Args};

use crate::config::Defaults;

/// Username used when none is configured (or the configured one is empty).
pub const DEFAULT_USERNAME: &str = "pytest-discord";

/// The seven configurable notification settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opt {
    /// Destination webhook URL.
    Webhook,
    /// Report verbosity level.
    Verbose,
    /// Username override for the posted message.
    Username,
    /// Avatar icon for successful runs.
    SuccessIcon,
    /// Avatar icon for skipped runs.
    SkipIcon,
    /// Avatar icon for failed runs.
    FailIcon,
    /// Whether to attach the full Markdown report.
    AttachFile,
}

impl Opt {
    /// Canonical kebab-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Opt::Webhook => "discord-webhook",
            Opt::Verbose => "discord-verbose",
            Opt::Username => "discord-username",
            Opt::SuccessIcon => "discord-success-icon",
            Opt::SkipIcon => "discord-skip-icon",
            Opt::FailIcon => "discord-fail-icon",
            Opt::AttachFile => "discord-attach-file",
        }
    }

    /// Command-line flag spelling.
    pub fn cli_flag(self) -> String {
        format!("--{}", self.name())
    }

    /// Environment variable spelling.
    pub fn env_var(self) -> String {
        format!("PYTEST_{}", self.name().to_uppercase().replace('-', "_"))
    }

    /// Defaults-file key spelling.
    pub fn ini_key(self) -> String {
        self.name().replace('-', "_")
    }
}

/// Command-line flags for the notification options.
///
/// Flattened into the binary's [`clap`] command under its own help heading.
/// Every flag is optional; absence means "fall through to the environment".
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Discord notification")]
pub struct DiscordArgs {
    /// Discord webhook url of a channel to notify pytest results. You can
    /// also specify the value with the PYTEST_DISCORD_WEBHOOK environment
    /// variable.
    #[arg(long, value_name = "WEBHOOK_URL")]
    pub discord_webhook: Option<String>,

    /// Verbosity level for pytest-discord. If not set, the pytest verbosity
    /// level is used. You can also specify the value with the
    /// PYTEST_DISCORD_VERBOSE environment variable.
    #[arg(long, value_name = "VERBOSITY_LEVEL", allow_negative_numbers = true)]
    pub discord_verbose: Option<i64>,

    /// Name for the posted message. Defaults to pytest-discord. You can also
    /// specify the value with the PYTEST_DISCORD_USERNAME environment
    /// variable.
    #[arg(long, value_name = "NAME")]
    pub discord_username: Option<String>,

    /// Url to an icon of a successful run. You can also specify the value
    /// with the PYTEST_DISCORD_SUCCESS_ICON environment variable.
    #[arg(long, value_name = "ICON_URL")]
    pub discord_success_icon: Option<String>,

    /// Url to an icon of a skipped run. You can also specify the value with
    /// the PYTEST_DISCORD_SKIP_ICON environment variable.
    #[arg(long, value_name = "ICON_URL")]
    pub discord_skip_icon: Option<String>,

    /// Url to an icon of a failed run. You can also specify the value with
    /// the PYTEST_DISCORD_FAIL_ICON environment variable.
    #[arg(long, value_name = "ICON_URL")]
    pub discord_fail_icon: Option<String>,

    /// Post pytest results as a markdown file to the channel. You can also
    /// specify the value with the PYTEST_DISCORD_ATTACH_FILE environment
    /// variable.
    #[arg(long, action = ArgAction::SetTrue)]
    pub discord_attach_file: Option<bool>,
}

/// Resolves notification settings through the three-tier chain.
///
/// The resolver snapshots its sources at construction (CLI values, an
/// environment capture, the loaded defaults file) so every lookup is a pure
/// read over fixed data. Tests inject a synthetic environment with
/// [`with_env`](Self::with_env) instead of mutating the process environment.
#[derive(Debug, Clone)]
pub struct OptResolver {
    args: DiscordArgs,
    env: HashMap<String, String>,
    defaults: Defaults,
}

impl OptResolver {
    /// Creates a resolver over parsed CLI flags and loaded defaults,
    /// snapshotting the process environment.
    pub fn new(args: DiscordArgs, defaults: Defaults) -> Self {
        Self {
            args,
            env: std::env::vars().collect(),
            defaults,
        }
    }

    /// Replaces the environment snapshot. Intended for tests.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Resolved webhook URL, or `None` when no destination is configured
    /// anywhere in the chain.
    pub fn webhook_url(&self) -> Option<String> {
        self.resolve_str(
            self.args.discord_webhook.as_deref(),
            Opt::Webhook,
            self.defaults.discord_webhook.as_deref(),
        )
    }

    /// Resolved username. Falls back to [`DEFAULT_USERNAME`]; an empty
    /// configured value counts as absent.
    pub fn username(&self) -> String {
        self.resolve_str(
            self.args.discord_username.as_deref(),
            Opt::Username,
            self.defaults.discord_username.as_deref(),
        )
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string())
    }

    /// Resolved success-run avatar icon URL.
    pub fn success_icon(&self) -> Option<String> {
        self.resolve_str(
            self.args.discord_success_icon.as_deref(),
            Opt::SuccessIcon,
            self.defaults.discord_success_icon.as_deref(),
        )
    }

    /// Resolved skipped-run avatar icon URL.
    pub fn skip_icon(&self) -> Option<String> {
        self.resolve_str(
            self.args.discord_skip_icon.as_deref(),
            Opt::SkipIcon,
            self.defaults.discord_skip_icon.as_deref(),
        )
    }

    /// Resolved failed-run avatar icon URL.
    pub fn fail_icon(&self) -> Option<String> {
        self.resolve_str(
            self.args.discord_fail_icon.as_deref(),
            Opt::FailIcon,
            self.defaults.discord_fail_icon.as_deref(),
        )
    }

    /// Resolved verbosity level.
    ///
    /// A negative command-line value is treated as absent. The final
    /// fallback is `ambient`, the test framework's own verbosity, so this
    /// never resolves to "unset".
    pub fn verbosity(&self, ambient: i64) -> i64 {
        self.args
            .discord_verbose
            .filter(|v| *v >= 0)
            .or_else(|| self.env_value(Opt::Verbose).and_then(|v| to_int(&v)))
            .or(self.defaults.discord_verbose)
            .unwrap_or(ambient)
    }

    /// Resolved attach-file flag. Defaults to `false`.
    ///
    /// Environment values are parsed permissively (`true`/`yes`/`on`/`1`
    /// and their negations, case-insensitive); anything else is treated as
    /// absent, not as an error.
    pub fn attach_file(&self) -> bool {
        self.args
            .discord_attach_file
            .filter(|v| *v)
            .or_else(|| self.env_value(Opt::AttachFile).and_then(|v| to_bool(&v)))
            .or(self.defaults.discord_attach_file)
            .unwrap_or(false)
    }

    /// The shared string chain: CLI > environment > defaults file, where an
    /// empty value at any tier counts as absent.
    fn resolve_str(&self, cli: Option<&str>, opt: Opt, default: Option<&str>) -> Option<String> {
        cli.filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| self.env_value(opt))
            .or_else(|| default.filter(|v| !v.is_empty()).map(str::to_string))
    }

    fn env_value(&self, opt: Opt) -> Option<String> {
        self.env
            .get(&opt.env_var())
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

/// Permissive integer conversion; `None` on failure.
fn to_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Permissive boolean conversion; `None` on failure.
fn to_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
