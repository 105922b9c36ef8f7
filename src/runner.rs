//! pytest invocation wrapper.
//!
//! Runs the user's pytest command with a JUnit XML result file injected,
//! assembles a [`Session`] from the results, and hands back pytest's own
//! exit code untouched.
//!
//! JUnit XML cannot represent an xpassed test (it lands as a plain pass)
//! and only tags xfail through a `type` attribute, so after parsing the
//! result file the runner scans pytest's verbose stdout for `XFAIL` /
//! `XPASS` status lines and recategorizes the matching reports.

use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Local;
use regex::Regex;

use crate::junit;
use crate::session::{Category, ReportStore, Session};

/// Outcome of a wrapped pytest run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The assembled session, ready for the notification hook.
    pub session: Session,

    /// pytest's exit code, propagated unchanged.
    pub exit_code: i32,
}

/// Runs a pytest command and assembles a [`Session`] from its results.
///
/// # Example
///
/// ```no_run
/// use pytest_discord::runner::PytestRunner;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let runner = PytestRunner::new("python -m pytest")
///     .with_args(vec!["tests".to_string()]);
/// let outcome = runner.run(0).await?;
/// println!("pytest exited with {}", outcome.exit_code);
/// # Ok(())
/// # }
/// ```
pub struct PytestRunner {
    command: String,
    args: Vec<String>,
}

impl PytestRunner {
    /// Creates a runner around a pytest command string, e.g.
    /// `"python -m pytest"` or `"pytest"`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Adds extra arguments passed through to pytest.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Runs pytest once and builds the session.
    ///
    /// The command gets `-v` (so status lines are scannable) and
    /// `--junitxml` pointing at a temporary file. Captured output is
    /// re-printed so the wrapped run still reads like pytest.
    ///
    /// A run that produced no result file (usage error, interpreter not
    /// found by pytest itself) yields a session without a start time; the
    /// notification hook skips those.
    ///
    /// # Errors
    ///
    /// Returns an error if the command string cannot be parsed or the
    /// process cannot be spawned at all.
    pub async fn run(&self, verbosity: i64) -> Result<RunOutcome> {
        let mut words =
            shell_words::split(&self.command).context("Failed to parse pytest command")?;
        if words.is_empty() {
            bail!("pytest command is empty");
        }

        let junit_dir = tempfile::tempdir().context("Failed to create result directory")?;
        let junit_path = junit_dir.path().join("junit.xml");

        let program = words.remove(0);
        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&words)
            .arg("-v")
            .arg(format!("--junitxml={}", junit_path.display()))
            .args(&self.args);

        tracing::debug!(command = %self.command, "running pytest");

        let started_at = Local::now();
        let started = Instant::now();
        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to run {program}"))?;
        let duration = started.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        print!("{stdout}");
        eprint!("{stderr}");

        let exit_code = output.status.code().unwrap_or(1);

        let mut session = match junit::read_junit_file(&junit_path) {
            Ok(summary) => {
                let mut store = summary.store;
                apply_status_overrides(&mut store, &stdout);
                Session::new(store)
                    .with_started_at(started_at)
                    .with_duration(duration)
            }
            Err(e) => {
                tracing::warn!("no usable result file from pytest: {e}");
                Session::new(ReportStore::new()).with_duration(duration)
            }
        };
        session = session.with_verbosity(verbosity);

        Ok(RunOutcome { session, exit_code })
    }
}

/// Recategorizes reports from pytest's verbose status lines.
///
/// Matches lines like `tests/test_a.py::test_x XPASS [ 50%]`.
fn apply_status_overrides(store: &mut ReportStore, stdout: &str) {
    let status_re = Regex::new(r"(\S+::\S+)\s+(XFAIL|XPASS)").unwrap();

    for cap in status_re.captures_iter(stdout) {
        let id = &cap[1];
        let category = match &cap[2] {
            "XFAIL" => Category::Xfailed,
            "XPASS" => Category::Xpassed,
            _ => continue,
        };

        if let Some(report) = store.reports_mut().iter_mut().find(|r| r.id == id) {
            report.category = category;
        }
    }
}
