//! Tolerant decoding of generator output
//!
//! Generative models asked for JSON frequently return *almost* JSON: wrapped
//! in a markdown code fence, typeset with smart quotes, or with unescaped
//! quotes inside string values. This module extracts a typed value from such
//! text on a best-effort basis.
//!
//! Pipeline, in order: strip code-fence markers, normalize smart quotes to
//! ASCII, attempt a direct parse, and only if that fails run a targeted
//! repair that rewrites stray quotes inside string field values before
//! reparsing. If the repair does not produce valid JSON either, the original
//! parse error is surfaced.
//!
//! The repair step is pattern matching, not a real tokenizer. It can both
//! under- and over-fix, so treat the whole module as best-effort rather than
//! a guarantee for adversarial input.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Error returned when no valid structured value could be produced
///
/// Carries the parse error from the *pre-repair* attempt; the repaired text
/// is a heuristic derivative, so its errors are not meaningful to callers.
#[derive(Debug, Error)]
#[error("generator output is not valid JSON after repair attempts: {source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

/// Matches a quoted string field value: `": "` opener, lazy content, then a
/// closing quote followed by a delimiter or end of input.
static FIELD_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)("\s*:\s*")(.*?)("(?:\s*[,\}\]]|\s*$))"#).expect("repair pattern is valid")
});

/// Extracts a typed value from raw generator text
///
/// # Arguments
/// * `raw` - The verbatim text reply from the generator
///
/// # Returns
/// * `Ok(T)` - The parsed value, possibly after repair
/// * `Err(DecodeError)` - If no valid JSON could be recovered
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let cleaned = normalize(raw);

    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            debug!("direct parse of generator output failed, attempting quote repair");
            let repaired = repair_stray_quotes(&cleaned);
            match serde_json::from_str(&repaired) {
                Ok(value) => {
                    debug!("recovered generator output by rewriting stray inner quotes");
                    Ok(value)
                }
                Err(_) => Err(DecodeError::from(first_err)),
            }
        }
    }
}

/// Strips code-fence markers and normalizes smart quote characters
fn normalize(raw: &str) -> String {
    let defenced = raw.replace("```json", "").replace("```", "");
    defenced
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Rewrites unescaped double quotes inside string field values to single quotes
///
/// Only fields whose content holds a bare `"` and no `\"` escape are touched;
/// anything already escaped is assumed intentional and left alone.
fn repair_stray_quotes(text: &str) -> String {
    FIELD_VALUE
        .replace_all(text, |caps: &regex::Captures| {
            let content = &caps[2];
            if content.contains('"') && !content.contains("\\\"") {
                format!("{}{}{}", &caps[1], content.replace('"', "'"), &caps[3])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}
