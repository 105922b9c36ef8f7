//! Statistics extraction and outcome classification.
//!
//! Reduces a sealed [`ReportStore`] to the numbers the renderer works from:
//! per-category counts, the overall outcome class, the ordered failure
//! details, and (for verbose reports) per-group sub-counts keyed by the
//! test id's path segments.

use std::collections::BTreeMap;

use crate::session::{Category, ReportStore};

/// Categorized result counts for a session, or for one group within it.
///
/// Keys are fixed and exhaustive: exactly one non-negative count per
/// [`Category`], nothing else can appear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultCounts {
    counts: [usize; 6],
}

impl ResultCounts {
    /// Count for one category.
    pub fn get(&self, category: Category) -> usize {
        self.counts[category as usize]
    }

    /// Increments one category's count.
    pub fn increment(&mut self, category: Category) {
        self.counts[category as usize] += 1;
    }

    /// Total number of reports across all categories.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Combined failed + error count.
    pub fn failures(&self) -> usize {
        self.get(Category::Failed) + self.get(Category::Error)
    }

    /// All (category, count) pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        Category::ALL.iter().map(|c| (*c, self.get(*c)))
    }

    /// Non-zero (category, count) pairs in summary-line order.
    pub fn nonzero_in_summary_order(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        Category::SUMMARY_ORDER
            .iter()
            .map(|c| (*c, self.get(*c)))
            .filter(|(_, count)| *count > 0)
    }
}

/// Overall outcome class derived from [`ResultCounts`].
///
/// Selects the notification colour and avatar icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    /// At least one test passed and nothing failed.
    Success,
    /// Nothing passed, but only because everything was skipped or
    /// expected-failure.
    Skip,
    /// At least one test failed or errored.
    Fail,
}

/// Counts stored reports per category.
pub fn extract(store: &ReportStore) -> ResultCounts {
    let mut counts = ResultCounts::default();
    for report in store.reports() {
        counts.increment(report.category);
    }
    counts
}

/// Classifies a set of counts into an overall [`Outcome`].
///
/// FAIL if `failed + error > 0`; else SKIP if anything was skipped,
/// xfailed, or xpassed while nothing passed; else SUCCESS. An empty session
/// classifies as SUCCESS.
pub fn classify(counts: &ResultCounts) -> Outcome {
    if counts.failures() > 0 {
        return Outcome::Fail;
    }

    let non_run = counts.get(Category::Skipped)
        + counts.get(Category::Xfailed)
        + counts.get(Category::Xpassed);
    if non_run > 0 && counts.get(Category::Passed) == 0 {
        return Outcome::Skip;
    }

    Outcome::Success
}

/// One failure's detail text, extracted from the store.
#[derive(Debug, Clone)]
pub struct FailureDetail {
    /// Whether this came from a failed or an errored test.
    pub category: Category,

    /// 1-based position within its category.
    pub index: usize,

    /// The raw failure representation (traceback text).
    pub text: String,
}

/// Extracts failure details in rendering order: every failed report, then
/// every errored report, each in record order.
///
/// Reports without a representation are skipped silently.
pub fn extract_failures(store: &ReportStore) -> Vec<FailureDetail> {
    let mut details = Vec::new();

    for category in [Category::Failed, Category::Error] {
        for (i, report) in store.in_category(category).enumerate() {
            let Some(text) = report.longrepr.as_deref() else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            details.push(FailureDetail {
                category,
                index: i + 1,
                text: text.to_string(),
            });
        }
    }

    details
}

/// Derives the grouping key for a test id at the given detail level.
///
/// Test ids are `::`-separated paths (`tests/test_math.py::TestAdd::test_int`).
/// Detail level 0 groups by the leading file segment; higher levels keep the
/// whole path, re-joined with `:` for display.
pub fn group_key(id: &str, detail: i64) -> String {
    if detail <= 0 {
        id.split("::").next().unwrap_or(id).to_string()
    } else {
        id.split("::").collect::<Vec<_>>().join(":")
    }
}

/// Groups reports by [`group_key`] and counts each group's categories.
///
/// Returns a sorted map so rendering is deterministic.
pub fn grouped_counts(store: &ReportStore, detail: i64) -> BTreeMap<String, ResultCounts> {
    let mut groups: BTreeMap<String, ResultCounts> = BTreeMap::new();

    for report in store.reports() {
        groups
            .entry(group_key(&report.id, detail))
            .or_default()
            .increment(report.category);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TestReport;

    fn counts(passed: usize, failed: usize, skipped: usize, error: usize) -> ResultCounts {
        let mut c = ResultCounts::default();
        for _ in 0..passed {
            c.increment(Category::Passed);
        }
        for _ in 0..failed {
            c.increment(Category::Failed);
        }
        for _ in 0..skipped {
            c.increment(Category::Skipped);
        }
        for _ in 0..error {
            c.increment(Category::Error);
        }
        c
    }

    #[test]
    fn test_classify_fail_dominates() {
        assert_eq!(classify(&counts(10, 1, 5, 0)), Outcome::Fail);
        assert_eq!(classify(&counts(0, 0, 0, 1)), Outcome::Fail);
        assert_eq!(classify(&counts(0, 1, 1, 1)), Outcome::Fail);
    }

    #[test]
    fn test_classify_skip_requires_no_passes() {
        assert_eq!(classify(&counts(0, 0, 3, 0)), Outcome::Skip);

        let mut xfail_only = ResultCounts::default();
        xfail_only.increment(Category::Xfailed);
        assert_eq!(classify(&xfail_only), Outcome::Skip);

        let mut xpass_only = ResultCounts::default();
        xpass_only.increment(Category::Xpassed);
        assert_eq!(classify(&xpass_only), Outcome::Skip);
    }

    #[test]
    fn test_classify_success_with_any_pass() {
        assert_eq!(classify(&counts(1, 0, 0, 0)), Outcome::Success);
        assert_eq!(classify(&counts(1, 0, 5, 0)), Outcome::Success);
    }

    #[test]
    fn test_classify_empty_session_is_success() {
        assert_eq!(classify(&ResultCounts::default()), Outcome::Success);
    }

    #[test]
    fn test_extract_counts_store() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("a.py::t1", Category::Passed));
        store.push(TestReport::new("a.py::t2", Category::Passed));
        store.push(TestReport::new("a.py::t3", Category::Failed));
        store.push(TestReport::new("b.py::t4", Category::Xpassed));

        let counts = extract(&store);
        assert_eq!(counts.get(Category::Passed), 2);
        assert_eq!(counts.get(Category::Failed), 1);
        assert_eq!(counts.get(Category::Xpassed), 1);
        assert_eq!(counts.get(Category::Error), 0);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_summary_order_lists_failed_first() {
        let c = counts(2, 1, 0, 0);
        let ordered: Vec<_> = c.nonzero_in_summary_order().collect();
        assert_eq!(ordered, vec![(Category::Failed, 1), (Category::Passed, 2)]);
    }

    #[test]
    fn test_extract_failures_order_and_indexing() {
        let mut store = ReportStore::new();
        store.push(
            TestReport::new("a.py::t1", Category::Error).with_longrepr("fixture blew up"),
        );
        store.push(TestReport::new("a.py::t2", Category::Failed).with_longrepr("assert 1 == 2"));
        store.push(TestReport::new("a.py::t3", Category::Failed));
        store.push(TestReport::new("a.py::t4", Category::Failed).with_longrepr("assert x"));

        let failures = extract_failures(&store);
        assert_eq!(failures.len(), 3);

        // Failed before error; report without a representation skipped,
        // but indices still count per category position.
        assert_eq!(failures[0].category, Category::Failed);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].text, "assert 1 == 2");
        assert_eq!(failures[1].category, Category::Failed);
        assert_eq!(failures[1].index, 3);
        assert_eq!(failures[2].category, Category::Error);
        assert_eq!(failures[2].index, 1);
    }

    #[test]
    fn test_group_key_detail_levels() {
        let id = "tests/test_math.py::TestAdd::test_int";
        assert_eq!(group_key(id, 0), "tests/test_math.py");
        assert_eq!(group_key(id, 1), "tests/test_math.py:TestAdd:test_int");
    }

    #[test]
    fn test_grouped_counts_by_file() {
        let mut store = ReportStore::new();
        store.push(TestReport::new("tests/test_a.py::t1", Category::Passed));
        store.push(TestReport::new("tests/test_a.py::t2", Category::Failed));
        store.push(TestReport::new("tests/test_b.py::t3", Category::Skipped));

        let groups = grouped_counts(&store, 0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["tests/test_a.py"].get(Category::Passed), 1);
        assert_eq!(groups["tests/test_a.py"].get(Category::Failed), 1);
        assert_eq!(groups["tests/test_b.py"].get(Category::Skipped), 1);
    }
}
