//! JSON extraction from free-form model output
//!
//! Models asked for raw JSON still wrap it in markdown fences or surround it
//! with prose. Extraction runs two strategies in order:
//!
//! 1. The body of the first fenced code block (optionally tagged `json`)
//! 2. Everything from the first `{` to the last `}`
//!
//! The result is rejected if it is empty or an empty object.

use crate::error::{LlmError, LlmResult};
use crate::logging::log_debug;
use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?s)```(?:json)?\s*(.+?)```").expect("fenced block pattern is valid")
});

/// Response parser for structured output
pub struct ResponseParser;

impl ResponseParser {
    /// Locate the JSON region in raw model output
    ///
    /// Fails with [`LlmError::NoJsonFound`] when neither a fenced block nor a
    /// `{ ... }` span exists, and with [`LlmError::EmptyJson`] when the region
    /// is blank or `{}`.
    pub fn extract_json(raw: &str) -> LlmResult<&str> {
        let extracted = Self::fenced_block(raw)
            .or_else(|| Self::brace_span(raw))
            .ok_or_else(|| LlmError::no_json_found(raw))?;

        log_debug!(
            raw_length = raw.len(),
            extracted_length = extracted.len(),
            "Extracted JSON region from model output"
        );

        if Self::is_void(extracted) {
            return Err(LlmError::empty_json(raw));
        }
        Ok(extracted)
    }

    fn fenced_block(raw: &str) -> Option<&str> {
        FENCED_BLOCK
            .captures(raw)
            .and_then(|captures| captures.get(1))
            .map(|body| body.as_str().trim())
    }

    fn brace_span(raw: &str) -> Option<&str> {
        let start = raw.find('{')?;
        let end = raw.rfind('}')?;
        (start <= end).then(|| &raw[start..=end])
    }

    fn is_void(extracted: &str) -> bool {
        let compact: String = extracted.chars().filter(|c| !c.is_whitespace()).collect();
        compact.is_empty() || compact == "{}"
    }
}
