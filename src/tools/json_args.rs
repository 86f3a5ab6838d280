//! Repair of raw model-supplied tool-call argument text.
//!
//! Model output is not guaranteed to be well-formed JSON; arguments may be
//! empty, wrapped in prose, or truncated. This module turns such text into
//! strict JSON or rejects it, so downstream decoding never sees free text.

/// Normalize raw argument text into strict JSON.
///
/// Returns `Some(json)` when the input is empty (→ `"{}"`), already valid
/// JSON, or contains a recoverable balanced `{...}` or `[...]` span.
/// Returns `None` when nothing parseable can be extracted; callers must
/// treat that as a hard tool-call failure.
pub fn normalize_json_arguments(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some("{}".to_string());
    }

    if is_valid_json(trimmed) {
        return Some(trimmed.to_string());
    }

    if let Some(extracted) = extract_balanced(trimmed, '{', '}') {
        if is_valid_json(&extracted) {
            return Some(extracted);
        }
    }

    if let Some(extracted) = extract_balanced(trimmed, '[', ']') {
        if is_valid_json(&extracted) {
            return Some(extracted);
        }
    }

    None
}

fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

/// Extract the first balanced `open...close` span, honoring string quoting
/// and backslash escaping so delimiters inside string literals are not
/// miscounted.
fn extract_balanced(input: &str, open: char, close: char) -> Option<String> {
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == open {
            if start.is_none() {
                start = Some(index);
            }
            depth += 1;
        } else if ch == close {
            if depth == 0 {
                continue;
            }
            depth -= 1;
            if depth == 0 {
                if let Some(start) = start {
                    return Some(input[start..index + ch.len_utf8()].trim().to_string());
                }
            }
        }
    }

    None
}
