//! Shared text utilities for picking JSON out of free-form agent output.

/// Find the end (exclusive byte index) of the brace-balanced object that
/// starts at `start`. Braces inside JSON string literals are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every brace-balanced substring of `text`, in order of its opening brace.
///
/// Nested objects are yielded too, after their parent, so a caller looking
/// for an object with particular keys can find one wrapped in an envelope.
pub fn json_object_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, ch)| ch == '{')
        .filter_map(move |(start, _)| balanced_end(text, start).map(|end| &text[start..end]))
}

/// Contents of every fenced code block tagged with `lang` (case-insensitive).
pub fn fenced_blocks<'a>(text: &'a str, lang: &str) -> Vec<&'a str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let line_end = after_fence.find('\n').unwrap_or(after_fence.len());
        let tag = after_fence[..line_end].trim();
        let body_start = (line_end + 1).min(after_fence.len());
        let body = &after_fence[body_start..];

        let Some(close) = body.find("```") else {
            break;
        };
        if tag.eq_ignore_ascii_case(lang) {
            blocks.push(body[..close].trim());
        }
        rest = &body[close + 3..];
    }
    blocks
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
