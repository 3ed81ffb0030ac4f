//! Pulling a JSON value out of free-form model output.
//!
//! Models wrap JSON in code fences, prefix it with prose, or trail off with
//! commentary. [`extract_json`] finds the first balanced object or array that
//! actually parses; [`from_llm_text`] decodes it into a target type.

use serde::de::DeserializeOwned;

use super::OracleError;

/// Returns the first balanced `{...}` or `[...]` in `raw` that is valid JSON.
///
/// Brackets inside string literals are ignored. A candidate that balances
/// but fails to parse (e.g. `[note]` in prose) is skipped and the scan
/// resumes after its opening bracket.
pub fn extract_json(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let mut from = 0;
    while let Some(offset) = bytes[from..].iter().position(|b| *b == b'{' || *b == b'[') {
        let start = from + offset;
        if let Some(end) = balanced_end(bytes, start) {
            let candidate = &raw[start..=end];
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        from = start + 1;
    }
    None
}

/// Index of the bracket closing the one at `start`, if any.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decodes model output into `T`, trying the raw text first.
pub fn from_llm_text<T: DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    if let Ok(value) = serde_json::from_str(raw.trim()) {
        return Ok(value);
    }
    let body = extract_json(raw)
        .ok_or_else(|| OracleError::Parse("no JSON object or array found in response".into()))?;
    serde_json::from_str(body).map_err(|e| OracleError::Parse(format!("decoding response JSON: {}", e)))
}
