//! JSON Extractor
//!
//! Isolates the outermost balanced JSON object in a model reply that may be
//! wrapped in prose or markdown fences. Braces inside string literals are
//! ignored, honouring backslash escapes.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no JSON object found in response")]
    NoOpeningBrace,

    #[error("JSON object is not closed ({depth} brace(s) left open)")]
    Unbalanced { depth: usize },

    #[error("located text is not a JSON object")]
    Malformed,
}

/// Return the outermost JSON object contained in `raw`.
pub fn extract_json_object(raw: &str) -> Result<&str, ExtractionError> {
    let trimmed = raw.trim();

    if trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && trimmed.matches('{').count() == trimmed.matches('}').count()
    {
        return Ok(trimmed);
    }

    let start = trimmed.find('{').ok_or(ExtractionError::NoOpeningBrace)?;
    let end = find_object_end(&trimmed[start..])?;
    let candidate = &trimmed[start..start + end + 1];

    if !(candidate.starts_with('{') && candidate.ends_with('}')) {
        return Err(ExtractionError::Malformed);
    }
    Ok(candidate)
}

/// Byte index (relative to `text`) of the brace closing the object that
/// opens at `text[0]`.
fn find_object_end(text: &str) -> Result<usize, ExtractionError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }

    Err(ExtractionError::Unbalanced { depth })
}
