//! Notification rendering.
//!
//! Builds the size-bounded Discord message for a finished session: the
//! header line, the summary embed, the optional verbose per-group
//! breakdown, truncated failure-detail embeds, and the optional full-report
//! file attachment.
//!
//! # Size Budgets
//!
//! Discord bounds messages three ways and the renderer honors all of them:
//! a per-embed description budget ([`MAX_EMBED_LEN`]), an aggregate
//! character budget across every embed in the message ([`MAX_EMBEDS_LEN`]),
//! and a per-message embed count ([`MAX_EMBED_COUNT`]). Content that would
//! cross a budget is truncated (failure tracebacks keep their *tail* lines,
//! where the root cause lives) or replaced with a terminal `and N other
//! failed` marker; when that happens the full report is redirected into the
//! file attachment instead.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::markdown;
use crate::session::ReportStore;
use crate::stats::{self, FailureDetail, Outcome, ResultCounts};

/// Per-embed description budget, in characters.
pub const MAX_EMBED_LEN: usize = 2048;

/// Aggregate character budget across all embeds in one message.
pub const MAX_EMBEDS_LEN: usize = 6000;

/// Per-message embed count limit.
pub const MAX_EMBED_COUNT: usize = 10;

/// Headroom left under the per-embed budget for heading and fence markup.
const EMBED_HEADROOM: usize = 64;

/// Headroom left under the aggregate budget.
const EMBEDS_HEADROOM: usize = 128;

/// Embed colour for successful runs.
pub const COLOUR_GREEN: u32 = 0x2ecc71;

/// Embed colour for skipped runs.
pub const COLOUR_GOLD: u32 = 0xf1c40f;

/// Embed colour for failed runs.
pub const COLOUR_RED: u32 = 0xe74c3c;

/// Colour selected for an outcome class.
pub fn outcome_colour(outcome: Outcome) -> u32 {
    match outcome {
        Outcome::Success => COLOUR_GREEN,
        Outcome::Skip => COLOUR_GOLD,
        Outcome::Fail => COLOUR_RED,
    }
}

/// A structured, size-bounded rich-text block within the message.
///
/// Serializes to Discord's embed wire shape (`color` spelling included).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    /// Embed body text; at most [`MAX_EMBED_LEN`] characters.
    pub description: String,

    /// Optional footer line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,

    /// Accent colour, as Discord's 24-bit integer.
    #[serde(rename = "color")]
    pub colour: u32,
}

/// Footer of an [`Embed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    /// Footer text.
    pub text: String,
}

impl Embed {
    /// Creates an embed with no footer.
    pub fn new(description: impl Into<String>, colour: u32) -> Self {
        Self {
            description: description.into(),
            footer: None,
            colour,
        }
    }

    /// Adds a footer line. An empty footer is dropped.
    pub fn with_footer(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.footer = Some(EmbedFooter { text });
        }
        self
    }

    /// Characters this embed contributes to the aggregate budget.
    pub fn content_len(&self) -> usize {
        char_len(&self.description)
            + self
                .footer
                .as_ref()
                .map(|f| char_len(&f.text))
                .unwrap_or(0)
    }
}

/// File riding along with the message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// File name shown in the channel.
    pub file_name: String,

    /// Raw file bytes.
    pub content: Vec<u8>,
}

/// The fully rendered notification, ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    /// Message body text (the header line).
    pub header: String,

    /// Ordered embed blocks; at most [`MAX_EMBED_COUNT`].
    pub embeds: Vec<Embed>,

    /// Full-report attachment, present when the attach-file option is set
    /// or the embeds could not carry everything.
    pub attachment: Option<Attachment>,

    /// Whether failure content was dropped to stay under the budgets.
    pub exceeded_embeds_limit: bool,
}

/// Continuous-integration metadata for the header annotation.
///
/// Detected once per pipeline run and passed in, so rendering stays a pure
/// function of its inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CiContext {
    /// Whether the run executed under CI (`CI=true`).
    pub is_ci: bool,

    /// Whether a GitHub Actions step is executing.
    pub github_action: bool,

    /// Repository slug, when GitHub provides one.
    pub repository: Option<String>,

    /// Workflow name, when GitHub provides one.
    pub workflow: Option<String>,
}

impl CiContext {
    /// Detects CI execution from the process environment.
    pub fn detect() -> Self {
        let is_ci = std::env::var("CI")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            is_ci,
            github_action: std::env::var("GITHUB_ACTION").is_ok_and(|v| !v.is_empty()),
            repository: std::env::var("GITHUB_REPOSITORY").ok().filter(|v| !v.is_empty()),
            workflow: std::env::var("GITHUB_WORKFLOW").ok().filter(|v| !v.is_empty()),
        }
    }
}

/// Inputs to [`render`], frozen for the duration of one pipeline run.
#[derive(Debug, Clone)]
pub struct RenderInput<'a> {
    /// The session's sealed report store.
    pub store: &'a ReportStore,

    /// Categorized counts extracted from the store.
    pub counts: ResultCounts,

    /// Overall outcome class.
    pub outcome: Outcome,

    /// Resolved notification verbosity.
    pub verbosity: i64,

    /// Session wall-clock duration.
    pub duration: Duration,

    /// Session start time.
    pub started_at: DateTime<Local>,

    /// CI annotation data.
    pub ci: CiContext,

    /// Resolved attach-file option.
    pub attach_file: bool,
}

/// Renders the notification message.
///
/// Pure: identical inputs produce an identical [`RenderedMessage`].
pub fn render(input: &RenderInput<'_>) -> RenderedMessage {
    let colour = outcome_colour(input.outcome);
    let header = make_header(input.counts.total(), &input.ci);

    let mut embeds = Vec::new();
    let mut total_len = 0usize;
    let mut exceeded = false;

    // Summary embed: counts + duration, with session/host details in the
    // footer at verbosity >= 1.
    let mut summary = Embed::new(
        format!(
            "{} in {:.1} seconds",
            make_results_message(&input.counts),
            input.duration.as_secs_f64()
        ),
        colour,
    );
    if input.verbosity >= 1 {
        summary = summary.with_footer(make_summary_footer(input.started_at));
    }
    total_len += summary.content_len();
    embeds.push(summary);

    if input.verbosity >= 1 {
        exceeded |= push_group_embeds(input, &mut embeds, &mut total_len);
        exceeded |= push_failure_embeds(input.store, colour, &mut embeds, &mut total_len);
    }

    let attachment = if input.attach_file || exceeded {
        let detail = (input.verbosity - 1).max(0);
        let report = markdown::render_report(&header, input.store, detail);
        Some(Attachment {
            file_name: input
                .started_at
                .format("pytest_%Y-%m-%dT%H:%M:%S.md")
                .to_string(),
            content: report.into_bytes(),
        })
    } else {
        None
    };

    RenderedMessage {
        header,
        embeds,
        attachment,
        exceeded_embeds_limit: exceeded,
    }
}

/// Builds the one-line results summary: non-zero categories in summary
/// order, e.g. `"1 failed, 2 passed"`. An empty session reads `"0 tests"`.
pub fn make_results_message(counts: &ResultCounts) -> String {
    let parts: Vec<String> = counts
        .nonzero_in_summary_order()
        .map(|(category, count)| format!("{count} {}", category.display_label()))
        .collect();

    if parts.is_empty() {
        "0 tests".to_string()
    } else {
        parts.join(", ")
    }
}

/// Builds the message header line, with a CI annotation when detected.
fn make_header(tests: usize, ci: &CiContext) -> String {
    let mut msgs = vec![format!("{tests} tests")];

    if ci.is_ci {
        msgs.push("executed by CI".to_string());

        if ci.github_action
            && let (Some(repo), Some(workflow)) = (&ci.repository, &ci.workflow)
        {
            msgs.push(format!("({repo} {workflow})"));
        }
    }

    format!(
        "test summary info: {}: {} {}",
        msgs.join(" "),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Builds the summary-embed footer: start time plus host identification.
fn make_summary_footer(started_at: DateTime<Local>) -> String {
    [
        format!("start at {}", started_at.format("%d. %b %H:%M:%S")),
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
    ]
    .join(",  ")
}

/// Appends the verbose per-group breakdown: one embed per distinct group
/// outcome, colour-matched. Returns whether content had to be dropped.
fn push_group_embeds(
    input: &RenderInput<'_>,
    embeds: &mut Vec<Embed>,
    total_len: &mut usize,
) -> bool {
    let detail = (input.verbosity - 1).max(0);
    let groups = stats::grouped_counts(input.store, detail);

    let mut lines_by_outcome: BTreeMap<Outcome, Vec<String>> = BTreeMap::new();
    for (key, counts) in &groups {
        let stats_list: Vec<String> = counts
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(category, count)| format!("`{count}` {}", category.label()))
            .collect();
        lines_by_outcome
            .entry(stats::classify(counts))
            .or_default()
            .push(format!("`{key}`: {}", stats_list.join(", ")));
    }

    let mut dropped = false;
    for (outcome, lines) in lines_by_outcome {
        let budget = MAX_EMBEDS_LEN - EMBEDS_HEADROOM;
        if *total_len >= budget {
            dropped = true;
            break;
        }

        let joined = lines.join("\n");
        let allowed = MAX_EMBED_LEN.min(budget - *total_len);
        let description = truncate_chars(&joined, allowed);
        if char_len(&description) < char_len(&joined) {
            dropped = true;
        }

        let embed = Embed::new(description, outcome_colour(outcome));
        *total_len += embed.content_len();
        embeds.push(embed);
    }

    dropped
}

/// Appends failure-detail embeds until a budget stops it. Returns whether
/// the aggregate limit was exceeded.
fn push_failure_embeds(
    store: &ReportStore,
    colour: u32,
    embeds: &mut Vec<Embed>,
    total_len: &mut usize,
) -> bool {
    let failures = stats::extract_failures(store);
    let mut exceeded = false;
    let mut delivered = 0usize;

    for detail in &failures {
        if embeds.len() >= MAX_EMBED_COUNT {
            break;
        }

        let block = failure_block(detail);
        if *total_len + char_len(&block) > MAX_EMBEDS_LEN - EMBEDS_HEADROOM {
            let remaining = failures.len() - delivered;
            embeds.push(Embed::new(format!("and {remaining} other failed"), colour));
            exceeded = true;
            break;
        }

        *total_len += char_len(&block);
        embeds.push(Embed::new(block, colour));
        delivered += 1;
    }

    exceeded
}

/// Renders one failure's embed body: a heading plus the traceback tail in
/// a fenced code block, trimmed to the per-embed budget.
///
/// Lines are kept from the end of the text because the root cause of a
/// pytest failure sits at the bottom of the traceback.
fn failure_block(detail: &FailureDetail) -> String {
    let budget = MAX_EMBED_LEN - EMBED_HEADROOM;

    let mut kept: Vec<&str> = Vec::new();
    let mut kept_len = 0usize;
    for line in detail.text.lines().rev() {
        if kept_len + char_len(line) > budget {
            break;
        }
        kept.push(line);
        kept_len += char_len(line) + 1;
    }
    kept.reverse();

    format!(
        "# {}: #{}\n{}",
        detail.category.label(),
        detail.index,
        code_block("py", &kept.join("\n"))
    )
}

/// Wraps text in a fenced code block.
pub(crate) fn code_block(lang: &str, text: &str) -> String {
    format!("```{lang}\n{text}\n```\n")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::session::{Category, ReportStore, TestReport};

    fn input_for<'a>(store: &'a ReportStore, verbosity: i64) -> RenderInput<'a> {
        let counts = stats::extract(store);
        RenderInput {
            store,
            counts,
            outcome: stats::classify(&counts),
            verbosity,
            duration: Duration::from_secs_f64(1.234),
            started_at: Local
                .with_ymd_and_hms(2024, 3, 18, 9, 41, 7)
                .single()
                .unwrap(),
            ci: CiContext::default(),
            attach_file: false,
        }
    }

    #[test]
    fn test_single_pass_summary() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("tests/test_a.py::test_one", Category::Passed));

        let message = render(&input_for(&store, 0));
        assert_eq!(message.embeds.len(), 1);
        assert_eq!(message.embeds[0].description, "1 passed in 1.2 seconds");
        assert_eq!(message.embeds[0].colour, COLOUR_GREEN);
        assert!(message.embeds[0].footer.is_none());
        assert!(message.attachment.is_none());
    }

    #[test]
    fn test_single_skip_is_gold() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("tests/test_a.py::test_one", Category::Skipped));

        let message = render(&input_for(&store, 0));
        assert_eq!(message.embeds[0].description, "1 skipped in 1.2 seconds");
        assert_eq!(message.embeds[0].colour, COLOUR_GOLD);
    }

    #[test]
    fn test_mixed_run_lists_all_categories() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("a.py::t1", Category::Failed).with_longrepr("assert"));
        store.push(TestReport::new("a.py::t2", Category::Passed));
        store.push(TestReport::new("a.py::t3", Category::Skipped));
        store.push(TestReport::new("a.py::t4", Category::Error).with_longrepr("boom"));
        store.push(TestReport::new("a.py::t5", Category::Xfailed));
        store.push(TestReport::new("a.py::t6", Category::Xpassed));

        let message = render(&input_for(&store, 0));
        assert_eq!(
            message.embeds[0].description,
            "1 failed, 1 passed, 1 skipped, 1 errors, 1 xfailed, 1 xpassed in 1.2 seconds"
        );
        assert_eq!(message.embeds[0].colour, COLOUR_RED);
    }

    #[test]
    fn test_zero_tests_still_renders() {
        let store = ReportStore::new();
        let message = render(&input_for(&store, 0));
        assert_eq!(message.embeds[0].description, "0 tests in 1.2 seconds");
        assert!(message.header.starts_with("test summary info: 0 tests"));
    }

    #[test]
    fn test_footer_only_at_verbosity() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("a.py::t1", Category::Passed));

        let quiet = render(&input_for(&store, 0));
        assert!(quiet.embeds[0].footer.is_none());

        let verbose = render(&input_for(&store, 1));
        let footer = verbose.embeds[0].footer.as_ref().unwrap();
        assert!(footer.text.starts_with("start at 18. Mar 09:41:07"));
    }

    #[test]
    fn test_ci_header_annotation() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("a.py::t1", Category::Passed));

        let mut input = input_for(&store, 0);
        input.ci = CiContext {
            is_ci: true,
            github_action: true,
            repository: Some("octo/repo".to_string()),
            workflow: Some("tests".to_string()),
        };

        let message = render(&input);
        assert!(message.header.contains("executed by CI (octo/repo tests)"));
    }

    #[test]
    fn test_group_embeds_at_verbosity() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("tests/test_a.py::t1", Category::Passed));
        store.push(TestReport::new("tests/test_b.py::t2", Category::Skipped));

        let message = render(&input_for(&store, 1));
        // Summary + one embed per distinct group outcome.
        assert_eq!(message.embeds.len(), 3);
        let descriptions: Vec<_> = message.embeds.iter().map(|e| &e.description).collect();
        assert!(descriptions.iter().any(|d| d.contains("`tests/test_a.py`: `1` passed")));
        assert!(descriptions.iter().any(|d| d.contains("`tests/test_b.py`: `1` skipped")));
    }

    #[test]
    fn test_failure_embed_keeps_traceback_tail() {
        let long_trace: String = (0..400)
            .map(|i| format!("frame {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut store = ReportStore::new();
        store.push(
            TestReport::new("a.py::t1", Category::Failed)
                .with_longrepr(format!("{long_trace}\nE       assert root_cause")),
        );

        let message = render(&input_for(&store, 1));
        let failure = message
            .embeds
            .iter()
            .find(|e| e.description.starts_with("# failed: #1"))
            .unwrap();
        assert!(failure.description.contains("E       assert root_cause"));
        assert!(!failure.description.contains("frame 0\n"));
        assert!(char_len(&failure.description) <= MAX_EMBED_LEN);
    }

    #[test]
    fn test_budgets_hold_under_many_failures() {
        let trace = "x".repeat(400);
        let mut store = ReportStore::new();
        for i in 0..50 {
            store.push(
                TestReport::new(format!("a.py::t{i}"), Category::Failed)
                    .with_longrepr(format!("{trace}\nE assert {i}")),
            );
        }

        let message = render(&input_for(&store, 1));
        assert!(message.embeds.len() <= MAX_EMBED_COUNT);

        let total: usize = message.embeds.iter().map(Embed::content_len).sum();
        assert!(total <= MAX_EMBEDS_LEN);
        for embed in &message.embeds {
            assert!(char_len(&embed.description) <= MAX_EMBED_LEN);
        }
    }

    #[test]
    fn test_overflow_adds_marker_and_attachment() {
        let trace = "line\n".repeat(500);
        let mut store = ReportStore::new();
        for i in 0..8 {
            store.push(
                TestReport::new(format!("a.py::t{i}"), Category::Failed)
                    .with_longrepr(trace.clone()),
            );
        }

        let message = render(&input_for(&store, 1));
        assert!(message.exceeded_embeds_limit);
        assert!(
            message
                .embeds
                .iter()
                .any(|e| e.description.starts_with("and ") && e.description.ends_with("other failed"))
        );

        let attachment = message.attachment.as_ref().unwrap();
        assert!(attachment.file_name.starts_with("pytest_2024-03-18T"));
        assert!(attachment.file_name.ends_with(".md"));
    }

    #[test]
    fn test_attach_file_option_forces_attachment() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("a.py::t1", Category::Passed));

        let mut input = input_for(&store, 0);
        input.attach_file = true;

        let message = render(&input);
        assert!(!message.exceeded_embeds_limit);
        let attachment = message.attachment.unwrap();
        let content = String::from_utf8(attachment.content).unwrap();
        assert!(content.starts_with("# test summary info: 1 tests"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("a.py::t1", Category::Failed).with_longrepr("assert 1 == 2"));
        store.push(TestReport::new("a.py::t2", Category::Passed));

        let input = input_for(&store, 1);
        assert_eq!(render(&input), render(&input));
    }
}
