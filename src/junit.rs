//! JUnit XML result-file ingestion.
//!
//! Parses the JUnit XML files pytest emits via `--junitxml` into a
//! [`ReportStore`] plus session timing. This is the bridge between a pytest
//! process (wrapped or run elsewhere, e.g. in CI) and the notification
//! pipeline.
//!
//! # Category Mapping
//!
//! | JUnit element | Category |
//! |---------------|----------|
//! | bare `<testcase>` | passed |
//! | `<failure>` | failed |
//! | `<error>` | error |
//! | `<skipped type="pytest.xfail">` | xfailed |
//! | `<skipped>` (any other) | skipped |
//!
//! JUnit XML has no way to express an xpassed test; for wrapped runs the
//! [`runner`](crate::runner) recovers that distinction from the pytest
//! stdout status lines.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::session::{Category, ReportStore, Session, TestReport};

/// Result type for JUnit parsing.
pub type JunitResult<T> = Result<T, JunitError>;

/// Errors raised while reading a JUnit XML result file.
#[derive(Debug, thiserror::Error)]
pub enum JunitError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not well-formed XML.
    #[error("Invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// An element carries a malformed attribute.
    #[error("Invalid XML attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// The document parsed but contains no test suite.
    #[error("No testsuite element found")]
    NoTestsuite,
}

/// Parsed contents of a JUnit XML result file.
#[derive(Debug, Clone)]
pub struct JunitSummary {
    /// One report per testcase element.
    pub store: ReportStore,

    /// Session start, from the testsuite `timestamp` attribute if present.
    pub started_at: Option<DateTime<Local>>,

    /// Session duration, from the testsuite `time` attribute(s).
    pub duration: Duration,
}

impl JunitSummary {
    /// Converts the parsed summary into a [`Session`] with the given
    /// ambient verbosity.
    pub fn into_session(self, verbosity: i64) -> Session {
        let mut session = Session::new(self.store)
            .with_duration(self.duration)
            .with_verbosity(verbosity);
        if let Some(started_at) = self.started_at {
            session = session.with_started_at(started_at);
        }
        session
    }
}

/// Reads and parses a JUnit XML file.
pub fn read_junit_file(path: &Path) -> JunitResult<JunitSummary> {
    let content = std::fs::read_to_string(path)?;
    parse_junit(&content)
}

/// Text destination while inside a testcase child element.
enum TextTarget {
    None,
    Longrepr,
    SystemOut,
    SystemErr,
}

/// A testcase element being assembled.
struct PendingCase {
    id: String,
    category: Category,
    duration: Duration,
    message: Option<String>,
    body: String,
    capstdout: String,
    capstderr: String,
}

impl PendingCase {
    fn into_report(self) -> TestReport {
        let mut report = TestReport::new(self.id, self.category).with_duration(self.duration);

        if self.category.is_failure() {
            // Prefer the element body (the full traceback); fall back to
            // the message attribute when the body is empty.
            let text = if self.body.trim().is_empty() {
                self.message.unwrap_or_default()
            } else {
                self.body
            };
            if !text.is_empty() {
                report = report.with_longrepr(text);
            }
        }

        report.capstdout = self.capstdout;
        report.capstderr = self.capstderr;
        report
    }
}

/// Parses JUnit XML content.
///
/// Accepts both a bare `<testsuite>` root and the `<testsuites>` wrapper.
/// Multiple suites are merged into one store; the first suite's timestamp
/// wins and durations are summed.
pub fn parse_junit(content: &str) -> JunitResult<JunitSummary> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut store = ReportStore::new();
    let mut started_at: Option<DateTime<Local>> = None;
    let mut duration = Duration::ZERO;
    let mut saw_testsuite = false;

    let mut case: Option<PendingCase> = None;
    let mut target = TextTarget::None;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"testsuite" => {
                saw_testsuite = true;
                if started_at.is_none() {
                    started_at = attr(&e, b"timestamp")?.and_then(|ts| parse_timestamp(&ts));
                }
                if let Some(time) = attr(&e, b"time")?.and_then(|t| t.parse::<f64>().ok()) {
                    duration += Duration::from_secs_f64(time.max(0.0));
                }
            }

            Event::Start(e) if e.name().as_ref() == b"testcase" => {
                case = Some(pending_case(&e)?);
            }
            Event::Empty(e) if e.name().as_ref() == b"testcase" => {
                store.push(pending_case(&e)?.into_report());
            }
            Event::End(e) if e.name().as_ref() == b"testcase" => {
                if let Some(done) = case.take() {
                    store.push(done.into_report());
                }
                target = TextTarget::None;
            }

            Event::Start(e)
                if matches!(e.name().as_ref(), b"failure" | b"error" | b"skipped") =>
            {
                if let Some(current) = case.as_mut() {
                    current.category = child_category(&e)?;
                    current.message = attr(&e, b"message")?;
                    target = TextTarget::Longrepr;
                }
            }
            Event::Empty(e)
                if matches!(e.name().as_ref(), b"failure" | b"error" | b"skipped") =>
            {
                if let Some(current) = case.as_mut() {
                    current.category = child_category(&e)?;
                    current.message = attr(&e, b"message")?;
                }
            }
            Event::Start(e) if e.name().as_ref() == b"system-out" => {
                target = TextTarget::SystemOut;
            }
            Event::Start(e) if e.name().as_ref() == b"system-err" => {
                target = TextTarget::SystemErr;
            }
            Event::End(e)
                if matches!(
                    e.name().as_ref(),
                    b"failure" | b"error" | b"skipped" | b"system-out" | b"system-err"
                ) =>
            {
                target = TextTarget::None;
            }

            Event::Text(t) => {
                append_text(case.as_mut(), &target, &t.unescape()?);
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                append_text(case.as_mut(), &target, &text);
            }

            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_testsuite {
        return Err(JunitError::NoTestsuite);
    }

    Ok(JunitSummary {
        store,
        started_at,
        duration,
    })
}

/// Reads one attribute's unescaped value, if present.
fn attr(e: &BytesStart<'_>, name: &[u8]) -> JunitResult<Option<String>> {
    for a in e.attributes() {
        let a = a?;
        if a.key.as_ref() == name {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Builds a pending case from a testcase element's attributes.
fn pending_case(e: &BytesStart<'_>) -> JunitResult<PendingCase> {
    let classname = attr(e, b"classname")?.unwrap_or_default();
    let name = attr(e, b"name")?.unwrap_or_default();
    let file = attr(e, b"file")?;
    let time = attr(e, b"time")?
        .and_then(|t| t.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(PendingCase {
        id: testcase_id(&classname, &name, file.as_deref()),
        category: Category::Passed,
        duration: Duration::from_secs_f64(time.max(0.0)),
        message: None,
        body: String::new(),
        capstdout: String::new(),
        capstderr: String::new(),
    })
}

/// Maps a failure/error/skipped child element to its category.
fn child_category(e: &BytesStart<'_>) -> JunitResult<Category> {
    Ok(match e.name().as_ref() {
        b"failure" => Category::Failed,
        b"error" => Category::Error,
        _ => {
            if attr(e, b"type")?.as_deref() == Some("pytest.xfail") {
                Category::Xfailed
            } else {
                Category::Skipped
            }
        }
    })
}

fn append_text(case: Option<&mut PendingCase>, target: &TextTarget, text: &str) {
    let Some(case) = case else {
        return;
    };
    let buffer = match target {
        TextTarget::Longrepr => &mut case.body,
        TextTarget::SystemOut => &mut case.capstdout,
        TextTarget::SystemErr => &mut case.capstderr,
        TextTarget::None => return,
    };
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(text);
}

/// Reconstructs a pytest-style test id from JUnit attributes.
///
/// pytest writes dotted classnames (`tests.test_math.TestAdd`); the `file`
/// attribute, when present, gives the real path and takes precedence.
fn testcase_id(classname: &str, name: &str, file: Option<&str>) -> String {
    if let Some(file) = file.filter(|f| !f.is_empty()) {
        return format!("{file}::{name}");
    }

    if classname.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", classname.replace('.', "/"), name)
    }
}

/// Parses the testsuite timestamp attribute into local time.
fn parse_timestamp(value: &str) -> Option<DateTime<Local>> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Local.from_local_datetime(&naive).single();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" errors="1" failures="1" skipped="2" tests="6"
             time="1.534" timestamp="2024-03-18T09:41:07.123456" hostname="ci-runner">
    <testcase classname="tests.test_math" name="test_add" file="tests/test_math.py" time="0.101"/>
    <testcase classname="tests.test_math" name="test_sub" file="tests/test_math.py" time="0.150">
      <failure message="assert 2 - 1 == 0">def test_sub():
&gt;       assert 2 - 1 == 0
E       assert 1 == 0</failure>
    </testcase>
    <testcase classname="tests.test_math" name="test_div" file="tests/test_math.py" time="0.050">
      <error message="fixture 'db' not found"/>
    </testcase>
    <testcase classname="tests.test_math" name="test_mod" file="tests/test_math.py" time="0.001">
      <skipped message="requires linux"/>
    </testcase>
    <testcase classname="tests.test_math" name="test_pow" file="tests/test_math.py" time="0.002">
      <skipped type="pytest.xfail" message="known broken"/>
    </testcase>
    <testcase classname="tests.test_io" name="test_print" file="tests/test_io.py" time="0.030">
      <system-out>captured output line</system-out>
    </testcase>
  </testsuite>
</testsuites>
"#;

    #[test]
    fn test_parse_categories() {
        let summary = parse_junit(SAMPLE).unwrap();
        let store = &summary.store;

        assert_eq!(store.len(), 6);
        assert_eq!(store.in_category(Category::Passed).count(), 2);
        assert_eq!(store.in_category(Category::Failed).count(), 1);
        assert_eq!(store.in_category(Category::Error).count(), 1);
        assert_eq!(store.in_category(Category::Skipped).count(), 1);
        assert_eq!(store.in_category(Category::Xfailed).count(), 1);
        assert_eq!(store.in_category(Category::Xpassed).count(), 0);
    }

    #[test]
    fn test_parse_ids_prefer_file_attribute() {
        let summary = parse_junit(SAMPLE).unwrap();
        let failed: Vec<_> = summary.store.in_category(Category::Failed).collect();
        assert_eq!(failed[0].id, "tests/test_math.py::test_sub");
    }

    #[test]
    fn test_parse_longrepr_from_body() {
        let summary = parse_junit(SAMPLE).unwrap();
        let failed: Vec<_> = summary.store.in_category(Category::Failed).collect();
        let longrepr = failed[0].longrepr.as_deref().unwrap();
        assert!(longrepr.contains("assert 1 == 0"));
    }

    #[test]
    fn test_parse_longrepr_falls_back_to_message() {
        let summary = parse_junit(SAMPLE).unwrap();
        let errored: Vec<_> = summary.store.in_category(Category::Error).collect();
        assert_eq!(errored[0].longrepr.as_deref(), Some("fixture 'db' not found"));
    }

    #[test]
    fn test_parse_captured_output() {
        let summary = parse_junit(SAMPLE).unwrap();
        let io_case = summary
            .store
            .reports()
            .iter()
            .find(|r| r.id.ends_with("test_print"))
            .unwrap();
        assert_eq!(io_case.capstdout, "captured output line");
    }

    #[test]
    fn test_parse_timing() {
        let summary = parse_junit(SAMPLE).unwrap();
        assert!((summary.duration.as_secs_f64() - 1.534).abs() < 1e-9);

        let started_at = summary.started_at.unwrap();
        assert_eq!(started_at.hour(), 9);
        assert_eq!(started_at.minute(), 41);
    }

    #[test]
    fn test_parse_bare_testsuite_root() {
        let summary = parse_junit(
            r#"<testsuite name="pytest" tests="1" time="0.1">
                 <testcase classname="tests.test_a" name="test_x" time="0.1"/>
               </testsuite>"#,
        )
        .unwrap();
        assert_eq!(summary.store.len(), 1);
        assert_eq!(summary.store.reports()[0].id, "tests/test_a::test_x");
    }

    #[test]
    fn test_no_testsuite_is_an_error() {
        assert!(matches!(
            parse_junit("<unrelated/>"),
            Err(JunitError::NoTestsuite)
        ));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(matches!(
            parse_junit("<testsuite><testcase"),
            Err(JunitError::Xml(_))
        ));
    }

    #[test]
    fn test_into_session_carries_timing() {
        let session = parse_junit(SAMPLE).unwrap().into_session(1);
        assert!(session.started_at.is_some());
        assert_eq!(session.verbosity, 1);
        assert_eq!(session.store.len(), 6);
    }
}
