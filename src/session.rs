//! Test session model.
//!
//! This module defines the crate's view of a finished pytest session: the
//! per-test reports collected during the run, the session's timing data, and
//! the output sink used for user-facing diagnostics.
//!
//! A [`Session`] is built once, after the test process has finished, and is
//! immutable from the notification pipeline's point of view. Sessions come
//! from two places:
//!
//! - the [`runner`](crate::runner), which wraps a live pytest invocation, or
//! - the [`junit`](crate::junit) reader, which ingests an existing JUnit XML
//!   result file.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Outcome bucket for a single test report.
///
/// The set of categories is fixed and exhaustive; pytest has no other
/// result buckets and this crate never invents one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Test ran and its assertions held.
    Passed,
    /// Test ran and an assertion failed.
    Failed,
    /// Test was not executed (skip marker, collection-time skip).
    Skipped,
    /// Something other than an assertion went wrong (collection error,
    /// fixture error).
    Error,
    /// Test was expected to fail and did.
    Xfailed,
    /// Test was expected to fail but passed.
    Xpassed,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 6] = [
        Category::Passed,
        Category::Failed,
        Category::Skipped,
        Category::Error,
        Category::Xfailed,
        Category::Xpassed,
    ];

    /// The order categories appear in rendered summary lines.
    pub const SUMMARY_ORDER: [Category; 6] = [
        Category::Failed,
        Category::Passed,
        Category::Skipped,
        Category::Error,
        Category::Xfailed,
        Category::Xpassed,
    ];

    /// Canonical lowercase name, as pytest spells it.
    pub fn label(self) -> &'static str {
        match self {
            Category::Passed => "passed",
            Category::Failed => "failed",
            Category::Skipped => "skipped",
            Category::Error => "error",
            Category::Xfailed => "xfailed",
            Category::Xpassed => "xpassed",
        }
    }

    /// Name used in human-readable output.
    ///
    /// Identical to [`label`](Self::label) except for `error`, which reads
    /// as `"errors"` in summary lines.
    pub fn display_label(self) -> &'static str {
        match self {
            Category::Error => "errors",
            other => other.label(),
        }
    }

    /// Whether reports in this category carry a failure representation
    /// worth showing to the user.
    pub fn is_failure(self) -> bool {
        matches!(self, Category::Failed | Category::Error)
    }
}

/// A single test's outcome as recorded by the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Test identifier in pytest's format, e.g.
    /// `tests/test_math.py::TestClass::test_method`.
    pub id: String,

    /// Outcome bucket this report landed in.
    pub category: Category,

    /// Wall-clock duration of this single test.
    #[serde(default)]
    pub duration: Duration,

    /// Failure representation (traceback text), present for failed and
    /// errored tests that produced one. Reports without a representation
    /// are rendered without detail, never treated as an error.
    pub longrepr: Option<String>,

    /// Captured stdout for this test, if any.
    #[serde(default)]
    pub capstdout: String,

    /// Captured stderr for this test, if any.
    #[serde(default)]
    pub capstderr: String,
}

impl TestReport {
    /// Creates a report with no failure representation or captured output.
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
            duration: Duration::ZERO,
            longrepr: None,
            capstdout: String::new(),
            capstderr: String::new(),
        }
    }

    /// Attaches a failure representation.
    pub fn with_longrepr(mut self, longrepr: impl Into<String>) -> Self {
        self.longrepr = Some(longrepr.into());
        self
    }

    /// Sets the test's duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Ordered collection of every [`TestReport`] a session produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportStore {
    reports: Vec<TestReport>,
}

impl ReportStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a report. Only session builders call this; the notification
    /// pipeline treats the store as sealed.
    pub fn push(&mut self, report: TestReport) {
        self.reports.push(report);
    }

    /// All reports, in the order they were recorded.
    pub fn reports(&self) -> &[TestReport] {
        &self.reports
    }

    /// Mutable access for session builders that refine categories after
    /// the fact (the runner's stdout scan).
    pub fn reports_mut(&mut self) -> &mut [TestReport] {
        &mut self.reports
    }

    /// Reports in a single category, preserving record order.
    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &TestReport> {
        self.reports.iter().filter(move |r| r.category == category)
    }

    /// Total number of reports.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether the session collected no tests at all.
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// A completed test session: the report store plus the metadata the
/// notification pipeline needs.
#[derive(Debug, Clone)]
pub struct Session {
    /// Every report the session recorded.
    pub store: ReportStore,

    /// When the session started. `None` when the session never properly
    /// started (crashed before reporting); the hook aborts silently in
    /// that case rather than notifying with bogus timing.
    pub started_at: Option<DateTime<Local>>,

    /// Wall-clock duration of the whole session.
    pub duration: Duration,

    /// The test framework's ambient verbosity level (`-v` count). Used as
    /// the final fallback when no notification verbosity is configured.
    pub verbosity: i64,
}

impl Session {
    /// Creates a session around a sealed report store.
    pub fn new(store: ReportStore) -> Self {
        Self {
            store,
            started_at: None,
            duration: Duration::ZERO,
            verbosity: 0,
        }
    }

    /// Sets the session start timestamp.
    pub fn with_started_at(mut self, started_at: DateTime<Local>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Sets the session wall-clock duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the ambient verbosity level.
    pub fn with_verbosity(mut self, verbosity: i64) -> Self {
        self.verbosity = verbosity;
        self
    }
}

/// Destination for user-facing diagnostic lines.
///
/// The delivery client writes exactly one line here when webhook resolution
/// fails. Production uses [`TerminalSink`]; tests use [`BufferSink`] to
/// assert on what was written.
pub trait LineSink: Send {
    /// Writes a single line of output.
    fn write_line(&mut self, line: &str);
}

/// Writes lines to the process's stderr stream.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl LineSink for TerminalSink {
    fn write_line(&mut self, line: &str) {
        eprintln!("{line}");
    }
}

/// Collects written lines in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    /// Lines written so far, oldest first.
    pub lines: Vec<String>,
}

impl LineSink for BufferSink {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}
