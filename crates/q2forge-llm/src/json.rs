//! JSON objects embedded in model prose.
//!
//! Models asked for "a JSON object" routinely wrap it in a sentence, add a
//! trailing remark, or nest braces inside string values. The parser first
//! tries the whole text, then the first *complete* object found by brace
//! balancing outside string literals.

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("model output contains no JSON object")]
    NoObject,

    #[error("model output contains invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Parse `text` (or the first balanced `{...}` inside it) as `T`.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, JsonError> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    let start = trimmed.find('{').ok_or(JsonError::NoObject)?;
    let candidate = match balanced_object_end(&trimmed[start..]) {
        Some(len) => &trimmed[start..start + len],
        // Unbalanced: hand serde the tail so the error names the real problem.
        None => &trimmed[start..],
    };
    Ok(serde_json::from_str(candidate)?)
}

/// Byte length of the object starting at `text[0] == '{'`, if it closes.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
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
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
