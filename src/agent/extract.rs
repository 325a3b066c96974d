//! Turning an agent session payload into an [`AnalysisResult`].
//!
//! The agent's reply has no fixed shape, so extraction escalates through
//! four strategies and keeps the first value found for each field:
//!
//! 1. **Structured JSON**: a ```` ```json ```` block, the whole text, or any
//!    brace-balanced object carrying `summary`/`confidence`.
//! 2. **Text patterns**: `## Summary` sections, "confidence" numbers,
//!    numbered steps under a Steps heading, the word after "complexity".
//! 3. **Phase headers**: `Phase N:` / `Step N:` / `###` lines, only to
//!    fill an empty step list.
//! 4. **Heuristic**: label-based confidence/complexity when summary or
//!    confidence is still missing; the result is flagged as a fallback.
//!
//! [`extract`] never fails: the returned result always satisfies the
//! `AnalysisResult` invariants.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::github::Issue;
use crate::util::{fenced_blocks, json_object_candidates, truncate_chars};

use super::heuristic::{Heuristic, generic_steps, heuristic, placeholder_summary};
use super::models::{AnalysisResult, Complexity, FallbackReason};

const RESPONSE_FIELDS: [&str; 5] = ["output", "response", "message", "text", "content"];
const USER_MESSAGE_TYPES: &[&str] = &["initial_user_message", "user_message", "user_request"];
const LIST_ITEM_OBJECT_KEYS: &[&str] = &["description", "step", "title", "name", "text"];

const MAX_PHASE_STEPS: usize = 10;
const MAX_SUMMARY_CHARS: usize = 500;
const RAW_EXCERPT_CHARS: usize = 1000;

const SUMMARY_SECTIONS: &[&str] = &["summary"];
const STEP_SECTIONS: &[&str] = &[
    "steps",
    "implementation steps",
    "proposed implementation steps",
    "implementation plan",
    "plan",
];
const CHALLENGE_SECTIONS: &[&str] = &["potential challenges", "challenges", "risks"];
const CRITERIA_SECTIONS: &[&str] = &["success criteria", "acceptance criteria"];
const OTHER_SECTIONS: &[&str] = &["confidence", "confidence score", "complexity"];

// ── Response text location ───────────────────────────────────────────

type TextResolver = fn(&Value) -> Option<String>;

/// Where the agent's reply may live, in priority order.
const TEXT_RESOLVERS: &[(&str, TextResolver)] = &[
    ("output", output_field),
    ("response", response_field),
    ("message", message_field),
    ("text", text_field),
    ("content", content_field),
    ("messages[].content", messages_content),
    ("messages[].message", messages_message),
    ("structured_output", structured_output_field),
    ("result", nested_result),
    ("data", nested_data),
];

fn output_field(payload: &Value) -> Option<String> {
    field_text(payload, "output")
}

fn response_field(payload: &Value) -> Option<String> {
    field_text(payload, "response")
}

fn message_field(payload: &Value) -> Option<String> {
    field_text(payload, "message")
}

fn text_field(payload: &Value) -> Option<String> {
    field_text(payload, "text")
}

fn content_field(payload: &Value) -> Option<String> {
    field_text(payload, "content")
}

fn structured_output_field(payload: &Value) -> Option<String> {
    field_text(payload, "structured_output")
}

fn messages_content(payload: &Value) -> Option<String> {
    messages_joined(payload, "content")
}

fn messages_message(payload: &Value) -> Option<String> {
    messages_joined(payload, "message")
}

fn nested_result(payload: &Value) -> Option<String> {
    nested_text(payload, "result")
}

fn nested_data(payload: &Value) -> Option<String> {
    nested_text(payload, "data")
}

/// A field's value as text. Strings are taken verbatim, other non-empty
/// values are serialized as JSON.
fn field_text(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Null => None,
        Value::String(s) => (!s.trim().is_empty()).then(|| s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn is_user_message(message: &Value) -> bool {
    message.get("role").and_then(Value::as_str) == Some("user")
        || message
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| USER_MESSAGE_TYPES.contains(&t))
}

/// Agent-authored entries of `messages[]`, joined by blank lines. The
/// initial user prompt is skipped: it echoes the JSON schema we asked for.
fn messages_joined(payload: &Value, key: &str) -> Option<String> {
    let joined = payload
        .get("messages")?
        .as_array()?
        .iter()
        .filter(|m| !is_user_message(m))
        .filter_map(|m| m.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    (!joined.is_empty()).then_some(joined)
}

fn nested_text(payload: &Value, container: &str) -> Option<String> {
    let inner = payload.get(container)?;
    match inner {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => RESPONSE_FIELDS
            .iter()
            .find_map(|field| field_text(inner, field))
            .or_else(|| has_core_key(map).then(|| inner.to_string())),
        _ => None,
    }
}

fn resolve_text(payload: &Value) -> Option<(&'static str, String)> {
    TEXT_RESOLVERS
        .iter()
        .find_map(|(source, resolver)| resolver(payload).map(|text| (*source, text)))
}

/// The agent's reply text, if the payload carries one anywhere we know of.
pub fn response_text(payload: &Value) -> Option<String> {
    resolve_text(payload).map(|(_, text)| text)
}

// ── Partial results ──────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq)]
struct PartialAnalysis {
    summary: Option<String>,
    confidence: Option<f64>,
    steps: Vec<String>,
    complexity: Option<Complexity>,
    challenges: Vec<String>,
    criteria: Vec<String>,
}

impl PartialAnalysis {
    fn has_core(&self) -> bool {
        self.summary.is_some() && self.confidence.is_some()
    }

    /// Take fields from `other` only where this one has nothing.
    fn fill_missing(&mut self, other: PartialAnalysis) {
        if self.summary.is_none() {
            self.summary = other.summary;
        }
        if self.confidence.is_none() {
            self.confidence = other.confidence;
        }
        if self.steps.is_empty() {
            self.steps = other.steps;
        }
        if self.complexity.is_none() {
            self.complexity = other.complexity;
        }
        if self.challenges.is_empty() {
            self.challenges = other.challenges;
        }
        if self.criteria.is_empty() {
            self.criteria = other.criteria;
        }
    }
}

/// Agents report confidence either as a fraction or as a percentage.
pub fn normalize_confidence(value: f64) -> f64 {
    if value > 1.0 { value / 100.0 } else { value }
}

// ── Strategy A: structured JSON ──────────────────────────────────────

fn has_core_key(map: &Map<String, Value>) -> bool {
    map.contains_key("summary") || map.contains_key("confidence")
}

/// Fenced ```json blocks first, then the whole text, then every balanced
/// object. The first object with a `summary` or `confidence` key wins;
/// failing that, the first object that parsed at all.
fn structured_object(text: &str) -> Option<Map<String, Value>> {
    let fenced = fenced_blocks(text, "json").into_iter();
    let whole = std::iter::once(text.trim());
    let mut first_parsed = None;

    for candidate in fenced.chain(whole).chain(json_object_candidates(text)) {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        if has_core_key(&map) {
            return Some(map);
        }
        first_parsed.get_or_insert(map);
    }
    first_parsed
}

fn json_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| normalize_confidence(raw))
}

fn json_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn json_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(obj) => LIST_ITEM_OBJECT_KEYS
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn from_json(map: &Map<String, Value>) -> PartialAnalysis {
    PartialAnalysis {
        summary: json_string(map.get("summary")),
        confidence: map.get("confidence").and_then(json_confidence),
        steps: json_list(map.get("implementation_steps")),
        complexity: map
            .get("complexity")
            .and_then(Value::as_str)
            .and_then(Complexity::parse_lenient),
        challenges: json_list(map.get("potential_challenges")),
        criteria: json_list(map.get("success_criteria")),
    }
}

// ── Strategy B: markdown / text patterns ─────────────────────────────

static MD_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]{0,3}#{1,6}[ \t]+(.+?)[ \t#]*$").unwrap());

// "Summary:", "**Implementation Steps:**", "1. Summary" on a line of their own
static LABEL_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:\d+[.)][ \t]*)?\*{0,2}([A-Za-z][A-Za-z &/]*?)\*{0,2}[ \t]*:?[ \t]*\*{0,2}[ \t]*$")
        .unwrap()
});

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)][ \t]*").unwrap());

static SUMMARY_INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?(?:\d+[.)][ \t]*)?\*{0,2}summary\*{0,2}[ \t]*:[ \t]*\*{0,2}[ \t]*(\S.*)$",
    )
    .unwrap()
});

static CONFIDENCE_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)confiden(?:ce|t)(?:[ \t]+(?:score|level|rating))?[\s:=*_\-]*(?:(?:is|of|at|about|around)[ \t]+)?\b(\d{1,3}(?:\.\d+)?)\b[ \t]*(%|/[ \t]*100?\b)?",
    )
    .unwrap()
});

static CONFIDENCE_BEFORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:\.\d+)?)\b[ \t]*(%)?[ \t]*confiden(?:ce|t)").unwrap()
});

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3}(?:\.\d+)?)[ \t]*(%)").unwrap());

static COMPLEXITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)complexity(?:[ \t]+(?:level|rating|estimate))?[\s:=*_\-]*(?:(?:is|of)[ \t]+)?(very[\s_-]*high|low|medium|moderate|high)\b",
    )
    .unwrap()
});

static NUMBERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\d+[.)][ \t]+(.+?)[ \t]*$").unwrap());

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(?:[-*+•]|\d+[.)])[ \t]+(.+?)[ \t]*$").unwrap());

fn normalize_title(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c: char| "*_:#` ".contains(c));
    let unnumbered = LEADING_NUMBER_RE.replace(trimmed, "");
    unnumbered
        .trim_matches(|c: char| "*_:#` ".contains(c))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_known_section(title: &str) -> bool {
    [
        SUMMARY_SECTIONS,
        STEP_SECTIONS,
        CHALLENGE_SECTIONS,
        CRITERIA_SECTIONS,
        OTHER_SECTIONS,
    ]
    .iter()
    .any(|names| title_matches(title, names))
}

fn title_matches(title: &str, names: &[&str]) -> bool {
    names.iter().any(|name| {
        title == *name
            || title
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with([' ', '(', ':']))
    })
}

/// The normalized title if `line` opens a section: any markdown heading,
/// or a bare label line naming a known section.
fn heading_title(line: &str) -> Option<String> {
    if let Some(caps) = MD_HEADING_RE.captures(line) {
        return Some(normalize_title(&caps[1]));
    }
    let caps = LABEL_LINE_RE.captures(line)?;
    let title = normalize_title(&caps[1]);
    is_known_section(&title).then_some(title)
}

/// Body of the first section whose heading matches one of `names`, up to
/// the next heading or the end of the text.
fn section(text: &str, names: &[&str]) -> Option<String> {
    let mut body: Option<Vec<&str>> = None;
    for line in text.lines() {
        let title = heading_title(line);
        if let Some(collected) = body.as_mut() {
            if title.is_some() {
                break;
            }
            collected.push(line);
        } else if title.is_some_and(|t| title_matches(&t, names)) {
            body = Some(Vec::new());
        }
    }
    let joined = body?.join("\n");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn clean_item(raw: &str) -> String {
    raw.replace("**", "").trim().to_string()
}

fn first_paragraph(body: &str) -> Option<String> {
    let paragraph = body
        .split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty())?
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned = clean_item(&paragraph);
    (!cleaned.is_empty()).then(|| truncate_chars(&cleaned, MAX_SUMMARY_CHARS).to_string())
}

fn text_summary(text: &str) -> Option<String> {
    section(text, SUMMARY_SECTIONS)
        .and_then(|body| first_paragraph(&body))
        .or_else(|| {
            SUMMARY_INLINE_RE
                .captures(text)
                .and_then(|caps| first_paragraph(&caps[1]))
        })
}

/// Read a confidence number whose optional unit suffix is capture group 2.
fn confidence_from(caps: &Captures) -> Option<f64> {
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let suffix: Option<String> = caps
        .get(2)
        .map(|m| m.as_str().chars().filter(|c| !c.is_whitespace()).collect());
    let normalized = match suffix.as_deref() {
        Some("%") | Some("/100") => value / 100.0,
        Some("/10") => value / 10.0,
        _ => normalize_confidence(value),
    };
    normalized.is_finite().then_some(normalized)
}

fn text_confidence(text: &str) -> Option<f64> {
    [&*CONFIDENCE_AFTER_RE, &*CONFIDENCE_BEFORE_RE, &*PERCENT_RE]
        .iter()
        .find_map(|re| re.captures_iter(text).find_map(|caps| confidence_from(&caps)))
}

fn text_complexity(text: &str) -> Option<Complexity> {
    COMPLEXITY_RE
        .captures(text)
        .and_then(|caps| Complexity::parse_lenient(&caps[1]))
}

fn section_items(text: &str, names: &[&str], item_re: &Regex) -> Vec<String> {
    section(text, names)
        .map(|body| {
            body.lines()
                .filter_map(|line| item_re.captures(line))
                .map(|caps| clean_item(&caps[1]))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn from_patterns(text: &str) -> PartialAnalysis {
    PartialAnalysis {
        summary: text_summary(text),
        confidence: text_confidence(text),
        steps: section_items(text, STEP_SECTIONS, &NUMBERED_ITEM_RE),
        complexity: text_complexity(text),
        challenges: section_items(text, CHALLENGE_SECTIONS, &LIST_ITEM_RE),
        criteria: section_items(text, CRITERIA_SECTIONS, &LIST_ITEM_RE),
    }
}

// ── Strategy C: phase / step headers ─────────────────────────────────

static PHASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:#{1,6}[ \t]*)?\*{0,2}((?:phase|step)[ \t]+\d+)[ \t]*\*{0,2}[ \t]*[:.)\-–][ \t]*\*{0,2}[ \t]*(.*?)[ \t]*\*{0,2}[ \t]*$",
    )
    .unwrap()
});

static H3_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]{0,3}###[ \t]+(.+?)[ \t#]*$").unwrap());

// "1.1 ...", "a. ...", "- ...": nested under a phase, not a phase itself
static SUB_STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(?:\d+\.\d+|[a-z][.)][ \t]|[-*+•][ \t])").unwrap());

fn phase_steps(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !SUB_STEP_RE.is_match(line))
        .filter_map(|line| {
            if let Some(caps) = PHASE_RE.captures(line) {
                let title = clean_item(&caps[2]);
                return Some(if title.is_empty() {
                    clean_item(&caps[1])
                } else {
                    title
                });
            }
            let caps = H3_RE.captures(line)?;
            let title = clean_item(&caps[1]);
            (!title.is_empty() && !is_known_section(&normalize_title(&title))).then_some(title)
        })
        .take(MAX_PHASE_STEPS)
        .collect()
}

// ── Pipeline ─────────────────────────────────────────────────────────

fn apply_strategies(text: &str) -> PartialAnalysis {
    let mut partial = structured_object(text)
        .map(|map| from_json(&map))
        .unwrap_or_default();

    if !partial.has_core() {
        partial.fill_missing(from_patterns(text));
    }
    if partial.steps.is_empty() {
        partial.steps = phase_steps(text);
    }
    partial
}

fn finalize(partial: PartialAnalysis, issue: &Issue, text: Option<&str>) -> AnalysisResult {
    let parse_exhausted = !partial.has_core();
    let Heuristic {
        confidence: heuristic_confidence,
        complexity: heuristic_complexity,
    } = heuristic(&issue.labels);

    let mut result = AnalysisResult {
        summary: partial
            .summary
            .unwrap_or_else(|| placeholder_summary(issue)),
        confidence: partial
            .confidence
            .unwrap_or(heuristic_confidence)
            .clamp(0.0, 1.0),
        implementation_steps: if partial.steps.is_empty() {
            generic_steps()
        } else {
            partial.steps
        },
        complexity: partial
            .complexity
            .or(parse_exhausted.then_some(heuristic_complexity)),
        potential_challenges: partial.challenges,
        success_criteria: partial.criteria,
        raw_excerpt: text.map(|t| truncate_chars(t, RAW_EXCERPT_CHARS).to_string()),
        ..AnalysisResult::default()
    };

    if parse_exhausted {
        result.mark_fallback(FallbackReason::ParseExhausted);
    }
    result
}

/// Extract a normalized analysis from a raw session payload.
pub fn extract(payload: &Value, issue: &Issue) -> AnalysisResult {
    let resolved = resolve_text(payload);
    let partial = match &resolved {
        Some((source, text)) => {
            debug!(
                issue = issue.number,
                source = *source,
                chars = text.len(),
                "Resolved agent response text"
            );
            apply_strategies(text)
        }
        None => {
            let keys: Vec<&str> = payload
                .as_object()
                .map(|m| m.keys().map(String::as_str).collect())
                .unwrap_or_default();
            warn!(issue = issue.number, ?keys, "No agent response text in session payload");
            PartialAnalysis::default()
        }
    };

    let result = finalize(partial, issue, resolved.as_ref().map(|(_, t)| t.as_str()));
    debug!(
        issue = issue.number,
        confidence = result.confidence,
        steps = result.implementation_steps.len(),
        fallback = result.is_fallback,
        "Extracted analysis"
    );
    result
}

// ── Pull request detection ───────────────────────────────────────────

static PR_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://github\.com/[\w.\-]+/[\w.\-]+/pull/(\d+)").unwrap()
});

static PR_PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"pull/(\d+)").unwrap());

static PR_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:PR|pull request)[ \t]*#(\d+)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub url: Option<String>,
    pub number: Option<u64>,
}

fn pr_number(caps: Option<Captures>) -> Option<u64> {
    caps?.get(1)?.as_str().parse().ok()
}

/// Locate a pull request the agent opened, from the structured
/// `pull_request.url` field or from links in the reply text.
pub fn find_pull_request(payload: &Value) -> Option<PullRequestRef> {
    if let Some(url) = payload.pointer("/pull_request/url").and_then(Value::as_str) {
        return Some(PullRequestRef {
            url: Some(url.to_string()),
            number: pr_number(PR_PATH_RE.captures(url)),
        });
    }

    let text = response_text(payload)?;
    if let Some(caps) = PR_URL_RE.captures(&text) {
        return Some(PullRequestRef {
            url: Some(caps[0].to_string()),
            number: caps[1].parse().ok(),
        });
    }
    pr_number(PR_PATH_RE.captures(&text))
        .or_else(|| pr_number(PR_HASH_RE.captures(&text)))
        .map(|number| PullRequestRef {
            url: None,
            number: Some(number),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bug_issue() -> Issue {
        Issue::new(42, "Login fails with emoji").with_labels(&["bug"])
    }

    fn extract_output(text: &str) -> AnalysisResult {
        extract(&json!({"status": "completed", "output": text}), &bug_issue())
    }

    // ── end-to-end ───────────────────────────────────────────────────

    #[test]
    fn test_fenced_json_end_to_end() {
        let output = "```json\n{\"summary\":\"Fix emoji handling\",\"confidence\":0.9,\"implementation_steps\":[\"a\",\"b\"]}\n```";
        let result = extract_output(output);
        assert_eq!(result.summary, "Fix emoji handling");
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.implementation_steps, vec!["a", "b"]);
        assert!(!result.is_fallback);
        assert!(result.note.is_none());
        assert!(result.complexity.is_none());
    }

    #[test]
    fn test_full_schema_fields() {
        let output = r#"{
            "summary": "Normalize input",
            "confidence": 0.7,
            "implementation_steps": ["one"],
            "complexity": "very_high",
            "potential_challenges": ["legacy clients"],
            "success_criteria": ["tests pass", "no regressions"]
        }"#;
        let result = extract_output(output);
        assert_eq!(result.complexity, Some(Complexity::VeryHigh));
        assert_eq!(result.potential_challenges, vec!["legacy clients"]);
        assert_eq!(result.success_criteria, vec!["tests pass", "no regressions"]);
    }

    // ── Strategy A ───────────────────────────────────────────────────

    #[test]
    fn test_json_beats_conflicting_markdown() {
        let output = "## Summary\nMarkdown summary wins?\n\nConfidence: 20%\n\n\
                      ```json\n{\"summary\": \"JSON summary\", \"confidence\": 0.8}\n```";
        let result = extract_output(output);
        assert_eq!(result.summary, "JSON summary");
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let output = r#"I looked at the code. Result: {"summary": "Escape input", "confidence": 65} Let me know."#;
        let result = extract_output(output);
        assert_eq!(result.summary, "Escape input");
        assert!((result.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_json_inside_envelope_object() {
        let output = r#"{"analysis": {"summary": "Nested", "confidence": 0.5}}"#;
        let result = extract_output(output);
        assert_eq!(result.summary, "Nested");
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_prose_braces_before_json_are_skipped() {
        let output = r#"Use {braces} carefully. {"summary": "Ok", "confidence": 0.4}"#;
        assert_eq!(extract_output(output).summary, "Ok");
    }

    #[test]
    fn test_json_confidence_percentage_and_strings() {
        assert_eq!(extract_output(r#"{"summary": "s", "confidence": 85}"#).confidence, 0.85);
        assert_eq!(extract_output(r#"{"summary": "s", "confidence": 0.85}"#).confidence, 0.85);
        assert_eq!(extract_output(r#"{"summary": "s", "confidence": "85%"}"#).confidence, 0.85);
        assert_eq!(extract_output(r#"{"summary": "s", "confidence": 250}"#).confidence, 1.0);
        assert_eq!(extract_output(r#"{"summary": "s", "confidence": -3}"#).confidence, 0.0);
    }

    #[test]
    fn test_json_step_objects() {
        let output = r#"{"summary": "s", "confidence": 0.5, "implementation_steps": [{"description": "first"}, "second", ""]}"#;
        assert_eq!(extract_output(output).implementation_steps, vec!["first", "second"]);
    }

    #[test]
    fn test_structured_output_object() {
        let payload = json!({
            "status": "finished",
            "structured_output": {"summary": "From structured output", "confidence": 0.6}
        });
        let result = extract(&payload, &bug_issue());
        assert_eq!(result.summary, "From structured output");
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn test_nested_result_object() {
        let payload = json!({"status": "done", "result": {"summary": "In result", "confidence": 0.3}});
        let result = extract(&payload, &bug_issue());
        assert_eq!(result.summary, "In result");
        assert_eq!(result.confidence, 0.3);
    }

    // ── Strategy B ───────────────────────────────────────────────────

    #[test]
    fn test_markdown_sections() {
        let output = "# Analysis\n\n## Summary\nThe login form rejects\nmulti-byte input.\n\nMore detail.\n\n\
                      ## Confidence\n85% confidence\n\n## Complexity\nComplexity: Medium\n\n\
                      ## Implementation Steps\n1. Reproduce the bug\n2. Fix the validator\n   1.1 nested detail\n3. Add tests\n\n\
                      ## Potential Challenges\n- Database collation\n\n## Success Criteria\n- Emoji logins work\n";
        let result = extract_output(output);
        assert_eq!(result.summary, "The login form rejects multi-byte input.");
        assert_eq!(result.confidence, 0.85);
        assert_eq!(result.complexity, Some(Complexity::Medium));
        assert_eq!(
            result.implementation_steps,
            vec!["Reproduce the bug", "Fix the validator", "Add tests"]
        );
        assert_eq!(result.potential_challenges, vec!["Database collation"]);
        assert_eq!(result.success_criteria, vec!["Emoji logins work"]);
        assert!(!result.is_fallback);
    }

    #[test]
    fn test_confidence_score_label() {
        let output = "1. Summary\nFix the emoji bug in login.\n\n2. Confidence Score: 0.75\n";
        let result = extract_output(output);
        assert_eq!(result.summary, "Fix the emoji bug in login.");
        assert_eq!(result.confidence, 0.75);
    }

    #[test]
    fn test_inline_bold_summary() {
        let output = "**Summary:** Strip zero-width joiners.\n**Confidence:** 70%";
        let result = extract_output(output);
        assert_eq!(result.summary, "Strip zero-width joiners.");
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_out_of_ten() {
        assert_eq!(text_confidence("Confidence: 8/10"), Some(0.8));
    }

    #[test]
    fn test_number_before_confidence_word() {
        assert_eq!(text_confidence("I have 85% confidence in this plan"), Some(0.85));
        assert_eq!(text_confidence("Overall 0.7 confidence, pending review"), Some(0.7));
        assert_eq!(text_confidence("The team is 75 confident"), Some(0.75));
    }

    #[test]
    fn test_number_before_confidence_word_in_full_output() {
        let result = extract_output("## Summary\nPatch the tokenizer.\n\nI have 85% confidence in this plan.");
        assert_eq!(result.summary, "Patch the tokenizer.");
        assert_eq!(result.confidence, 0.85);
        assert!(!result.is_fallback);
    }

    #[test]
    fn test_percent_sign_alone() {
        assert_eq!(text_confidence("I am about 60% sure"), Some(0.6));
    }

    #[test]
    fn test_confidence_ignores_long_numbers() {
        assert_eq!(text_confidence("confidence in release 2024"), None);
    }

    #[test]
    fn test_partial_json_merged_with_patterns() {
        let output = "```json\n{\"summary\": \"JSON summary\"}\n```\nConfidence: 80%\nComplexity: high";
        let result = extract_output(output);
        assert_eq!(result.summary, "JSON summary");
        assert!((result.confidence - 0.8).abs() < 1e-9);
        assert_eq!(result.complexity, Some(Complexity::High));
        assert!(!result.is_fallback);
    }

    // ── Strategy C ───────────────────────────────────────────────────

    #[test]
    fn test_phase_headers_capped_at_ten() {
        let mut output = String::from("## Summary\nBig refactor.\nConfidence: 0.5\n\n");
        for n in 1..=15 {
            output.push_str(&format!("Phase {}: Work item {}\n", n, n));
        }
        let result = extract_output(&output);
        assert_eq!(result.implementation_steps.len(), 10);
        assert_eq!(result.implementation_steps[0], "Work item 1");
        assert_eq!(result.implementation_steps[9], "Work item 10");
    }

    #[test]
    fn test_phase_headers_skip_sub_steps() {
        let text = "**Phase 1: Setup**\n1.1 Install deps\na. check versions\n- Step 2: bullet\n\
                    ### Step 2: Build\n### Summary\n### Verify everything\n";
        assert_eq!(phase_steps(text), vec!["Setup", "Build", "Verify everything"]);
    }

    #[test]
    fn test_phase_steps_only_fill_empty_steps() {
        let output = "```json\n{\"summary\": \"s\", \"confidence\": 0.5, \"implementation_steps\": [\"keep\"]}\n```\nPhase 1: ignored";
        assert_eq!(extract_output(output).implementation_steps, vec!["keep"]);
    }

    // ── Strategy D ───────────────────────────────────────────────────

    #[test]
    fn test_empty_payload_falls_back() {
        let result = extract(&json!({}), &bug_issue());
        assert_eq!(result.confidence, 0.75);
        assert_eq!(result.complexity, Some(Complexity::Low));
        assert!(result.is_fallback);
        assert!(!result.note.as_deref().unwrap_or("").is_empty());
        assert_eq!(result.implementation_steps, generic_steps());
        assert!(result.summary.contains("#42"));
        assert!(result.raw_excerpt.is_none());
    }

    #[test]
    fn test_unparseable_text_falls_back() {
        let result = extract_output("I could not finish. Sorry!");
        assert!(result.is_fallback);
        assert_eq!(result.confidence, 0.75);
        assert_eq!(result.implementation_steps.len(), 6);
        assert_eq!(result.raw_excerpt.as_deref(), Some("I could not finish. Sorry!"));
    }

    #[test]
    fn test_summary_without_confidence_uses_heuristic_confidence() {
        let issue = Issue::new(7, "Add dark mode").with_labels(&["enhancement"]);
        let payload = json!({"output": "## Summary\nAdd a theme toggle."});
        let result = extract(&payload, &issue);
        assert_eq!(result.summary, "Add a theme toggle.");
        assert_eq!(result.confidence, 0.60);
        assert_eq!(result.complexity, Some(Complexity::Medium));
        assert!(result.is_fallback);
    }

    #[test]
    fn test_confidence_always_in_range() {
        for text in ["confidence 999", "Confidence: 0.0", "{\"confidence\": 1e308}", "", "100%"] {
            let c = extract_output(text).confidence;
            assert!((0.0..=1.0).contains(&c), "{} -> {}", text, c);
        }
    }

    // ── Response location ────────────────────────────────────────────

    #[test]
    fn test_output_has_priority_over_message() {
        let payload = json!({"message": "from message", "output": "from output"});
        assert_eq!(response_text(&payload).as_deref(), Some("from output"));
    }

    #[test]
    fn test_empty_fields_are_skipped() {
        let payload = json!({"output": "  ", "response": null, "text": "from text"});
        assert_eq!(response_text(&payload).as_deref(), Some("from text"));
    }

    #[test]
    fn test_messages_content_skips_user_prompt() {
        let payload = json!({"messages": [
            {"role": "user", "content": "{\"summary\": \"string\", \"confidence\": 0.0}"},
            {"role": "assistant", "content": "first"},
            {"role": "assistant", "content": "second"}
        ]});
        assert_eq!(response_text(&payload).as_deref(), Some("first\n\nsecond"));
    }

    #[test]
    fn test_devin_message_entries() {
        let payload = json!({"messages": [
            {"type": "initial_user_message", "message": "Analyze this"},
            {"type": "devin_message", "message": "## Summary\nDone.\n\nConfidence: 90%"}
        ]});
        let result = extract(&payload, &bug_issue());
        assert_eq!(result.summary, "Done.");
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_normalize_confidence() {
        assert_eq!(normalize_confidence(85.0), 0.85);
        assert_eq!(normalize_confidence(0.85), 0.85);
        assert_eq!(normalize_confidence(1.0), 1.0);
    }

    // ── Pull requests ────────────────────────────────────────────────

    #[test]
    fn test_find_pull_request_url_in_text() {
        let payload = json!({"output": "Opened https://github.com/acme/app/pull/123 for review"});
        assert_eq!(
            find_pull_request(&payload),
            Some(PullRequestRef {
                url: Some("https://github.com/acme/app/pull/123".into()),
                number: Some(123),
            })
        );
    }

    #[test]
    fn test_find_pull_request_structured_field() {
        let payload = json!({"pull_request": {"url": "https://github.com/acme/app/pull/9"}});
        assert_eq!(find_pull_request(&payload).unwrap().number, Some(9));
    }

    #[test]
    fn test_find_pull_request_number_only() {
        let payload = json!({"output": "Created PR #77"});
        assert_eq!(
            find_pull_request(&payload),
            Some(PullRequestRef {
                url: None,
                number: Some(77)
            })
        );
        assert_eq!(find_pull_request(&json!({"output": "no link"})), None);
    }
}
