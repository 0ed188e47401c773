//! Turning reviewer text into a [`Verdict`].
//!
//! The reviewer agent answers in free-form prose. The functions here read it
//! with keyword heuristics:
//!
//! - [`classify`]: rejection keywords beat revision keywords, which beat
//!   approval keywords. Text with none of them needs revision, so an
//!   ambiguous answer never approves anything.
//! - [`extract_issues`]: bullet, numbered and `Issue:`/`Problem:`/`Fix:`
//!   lines, deduplicated, at most [`MAX_ISSUES`].
//! - [`extract_summary`]: first prose line, at most
//!   [`MAX_SUMMARY_CHARS`](super::types::MAX_SUMMARY_CHARS) characters.
//! - [`detect_blocking`]: severity keywords, independent of [`classify`].
//!
//! [`OutputInterpreter`] wraps these behind a trait so a structured reviewer
//! contract can be slotted in. [`StructuredInterpreter`] accepts a JSON verdict
//! object when the reviewer emits one and otherwise reads the prose.

use super::types::{MAX_ISSUES, ReviewResult, Verdict, truncate_summary};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Shorter list items are noise ("Yes", "No", "N/A").
pub const MIN_ISSUE_CHARS: usize = 6;

const REJECTION_KEYWORDS: &[&str] = &["rejected", "reject", "blocking issue", "critical"];

const REVISION_KEYWORDS: &[&str] = &[
    "needs revision",
    "needs-revision",
    "changes requested",
    "request changes",
    "not approved",
    "needs work",
];

const APPROVAL_KEYWORDS: &[&str] = &[
    "lgtm",
    "looks good",
    "approved",
    "approve",
    "passes",
    "all good",
    "ship it",
];

const BLOCKING_KEYWORDS: &[&str] = &[
    "security",
    "data loss",
    "breaking change",
    "requires human review",
    "manual intervention",
    "architectural issue",
];

static BULLET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*•]\s+(.+)$").expect("bullet regex is valid"));

static NUMBERED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+(.+)$").expect("numbered regex is valid"));

static LABELED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:issue|problem|fix)\s*:\s*(.+)$").expect("labeled regex is valid")
});

static RULE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-=*_\s]{3,}$").expect("rule regex is valid"));

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify reviewer text as approved, rejected or needs-revision.
///
/// # Examples
///
/// ```
/// use gatekeeper::review::parser::classify;
/// use gatekeeper::review::ReviewResult;
///
/// assert_eq!(classify("LGTM, looks good"), ReviewResult::Approved);
/// assert_eq!(classify(""), ReviewResult::NeedsRevision);
/// assert_eq!(
///     classify("approved the first part but rejected the security changes"),
///     ReviewResult::Rejected
/// );
/// ```
pub fn classify(output: &str) -> ReviewResult {
    let lower = output.to_lowercase();

    if contains_any(&lower, REJECTION_KEYWORDS) {
        ReviewResult::Rejected
    } else if contains_any(&lower, REVISION_KEYWORDS) {
        ReviewResult::NeedsRevision
    } else if contains_any(&lower, APPROVAL_KEYWORDS) {
        ReviewResult::Approved
    } else {
        ReviewResult::NeedsRevision
    }
}

/// Pull the list item text out of a line, if the line is a list item.
fn list_item(line: &str) -> Option<&str> {
    [&*BULLET_REGEX, &*NUMBERED_REGEX, &*LABELED_REGEX]
        .into_iter()
        .find_map(|re| re.captures(line))
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
}

/// Collect issue lines from reviewer text.
///
/// Items shorter than [`MIN_ISSUE_CHARS`] are dropped, duplicates are
/// dropped case-insensitively, and at most [`MAX_ISSUES`] are returned.
pub fn extract_issues(output: &str) -> Vec<String> {
    normalize_issues(output.lines().filter_map(|line| list_item(line.trim())))
}

fn normalize_issues<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();

    for item in items {
        let item = item.trim();
        if item.chars().count() < MIN_ISSUE_CHARS {
            continue;
        }
        if !seen.insert(item.to_lowercase()) {
            continue;
        }
        issues.push(item.to_string());
        if issues.len() == MAX_ISSUES {
            break;
        }
    }

    issues
}

/// First prose line of the reviewer text, cut to 300 characters.
///
/// Headings, list items, code fences and horizontal rules are skipped.
/// Returns an empty string when there is no prose line.
pub fn extract_summary(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && !line.starts_with("```")
                && !RULE_REGEX.is_match(line)
                && list_item(line).is_none()
        })
        .map(truncate_summary)
        .unwrap_or_default()
}

/// Check the text for severity keywords that need a human regardless of
/// the classification.
pub fn detect_blocking(output: &str) -> bool {
    contains_any(&output.to_lowercase(), BLOCKING_KEYWORDS)
}

/// Run every heuristic over the text.
pub fn parse_output(output: &str) -> Verdict {
    Verdict {
        result: classify(output),
        issues: extract_issues(output),
        summary: extract_summary(output),
        blocking: detect_blocking(output),
    }
}

/// Strategy for reading reviewer output.
pub trait OutputInterpreter: Send + Sync {
    fn interpret(&self, output: &str) -> Verdict;
}

/// Keyword heuristics only.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordInterpreter;

impl OutputInterpreter for KeywordInterpreter {
    fn interpret(&self, output: &str) -> Verdict {
        parse_output(output)
    }
}

/// JSON verdict shape a reviewer may emit.
#[derive(Debug, Deserialize)]
struct StructuredOutput {
    verdict: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    blocking: Option<bool>,
}

/// Accepts a `{"verdict": ...}` JSON object in the output, falling back to
/// keyword heuristics when there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredInterpreter {
    fallback: KeywordInterpreter,
}

impl StructuredInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_json(&self, output: &str) -> Option<Verdict> {
        let json = extract_json_object(output)?;
        let parsed: StructuredOutput = serde_json::from_str(&json).ok()?;

        let result = match parsed.verdict.trim().to_lowercase().replace('_', "-").as_str() {
            "approved" | "approve" | "pass" | "lgtm" => ReviewResult::Approved,
            "rejected" | "reject" | "fail" | "blocked" => ReviewResult::Rejected,
            _ => ReviewResult::NeedsRevision,
        };
        let issues = normalize_issues(parsed.issues.iter().map(String::as_str));
        let summary = parsed
            .summary
            .map(|s| truncate_summary(s.trim()))
            .unwrap_or_default();
        let blocking = parsed.blocking.unwrap_or_else(|| {
            detect_blocking(&summary) || issues.iter().any(|i| detect_blocking(i))
        });

        Some(Verdict {
            result,
            issues,
            summary,
            blocking,
        })
    }
}

impl OutputInterpreter for StructuredInterpreter {
    fn interpret(&self, output: &str) -> Verdict {
        self.from_json(output)
            .unwrap_or_else(|| self.fallback.interpret(output))
    }
}

/// Extract the first balanced JSON object from text that may contain other
/// content. Braces inside strings are not special-cased.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}
