use serde_json::Value;

use crate::errors::PipelineError;
use crate::textutil::char_len;

/// Returns `false` (skip) when `existing` already looks like a finished translation of `source`:
/// non-empty, at least `min_absolute_length` chars and at least `min_length_ratio` of the source
/// length. This is a length heuristic only; it says nothing about translation quality.
pub fn needs_work(
    source: &str,
    existing: &str,
    min_length_ratio: f64,
    min_absolute_length: usize,
) -> bool {
    if existing.is_empty() {
        return true;
    }
    let existing_len = char_len(existing);
    let done = existing_len >= min_absolute_length
        && existing_len as f64 >= min_length_ratio * char_len(source) as f64;
    !done
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdempotenceGate {
    pub min_length_ratio: f64,
    pub min_absolute_length: usize,
    pub short_result_ratio: f64,
}

impl Default for IdempotenceGate {
    fn default() -> Self {
        Self::new(0.8, 1, 0.3)
    }
}

impl IdempotenceGate {
    pub fn new(min_length_ratio: f64, min_absolute_length: usize, short_result_ratio: f64) -> Self {
        Self {
            min_length_ratio: min_length_ratio.max(0.0),
            // An empty target must never count as done.
            min_absolute_length: min_absolute_length.max(1),
            short_result_ratio: short_result_ratio.max(0.0),
        }
    }

    pub fn needs_work(&self, source: &str, existing: &str) -> bool {
        needs_work(
            source,
            existing,
            self.min_length_ratio,
            self.min_absolute_length,
        )
    }

    /// Structured fields are done once walking the source yields exactly what is stored.
    pub fn plans_need_work(&self, existing: Option<&Value>, translated: &Value) -> bool {
        existing != Some(translated)
    }

    pub fn check_result_length(&self, source: &str, result: &str) -> Result<(), PipelineError> {
        let source_chars = char_len(source);
        let target_chars = char_len(result);
        if (target_chars as f64) < self.short_result_ratio * source_chars as f64 {
            return Err(PipelineError::ImplausiblyShortResult {
                source_chars,
                target_chars,
            });
        }
        Ok(())
    }
}
