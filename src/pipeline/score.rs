//! Review score extraction.
//!
//! Reviewer agents are asked to reply with a JSON object carrying a
//! numeric `score` field, but model output drifts. Extraction tries a
//! ladder of strategies from strictest to loosest and falls back to zero,
//! which fails the quality gate rather than crashing the run.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

/// Typed shape of the reviewer's structured reply.
#[derive(Debug, Deserialize)]
struct ScorePayload {
    score: f64,
}

fn score_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:score|total)["'\s:=]*(\d{1,3})\b"#).expect("valid regex")
    })
}

fn score_fraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3})\s*/\s*100\b").expect("valid regex"))
}

/// Extracts a review score in `0..=100` from reviewer output.
///
/// Strategy ladder:
/// 1. The whole text parses as JSON with a numeric `score` field.
/// 2. A JSON object embedded in surrounding prose (first `{`..last `}`).
/// 3. A labelled number (`score: 87`, `"total" = 90`).
/// 4. A fraction of one hundred (`87/100`).
///
/// Out-of-range candidates are discarded and the ladder continues; if
/// nothing matches the result is `0`.
pub fn extract_score(text: &str) -> u32 {
    let trimmed = text.trim();

    if let Ok(payload) = serde_json::from_str::<ScorePayload>(trimmed) {
        if let Some(score) = in_range(payload.score) {
            return score;
        }
    }

    // JSON object embedded in prose or a markdown fence
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(payload) = serde_json::from_str::<ScorePayload>(&trimmed[start..=end]) {
                if let Some(score) = in_range(payload.score) {
                    return score;
                }
            }
        }
    }

    for re in [score_label_re(), score_fraction_re()] {
        if let Some(caps) = re.captures(trimmed) {
            if let Some(score) = caps[1].parse::<f64>().ok().and_then(in_range) {
                return score;
            }
        }
    }

    debug!(preview = %trimmed.chars().take(80).collect::<String>(), "no score found in review");
    0
}

fn in_range(value: f64) -> Option<u32> {
    if (0.0..=100.0).contains(&value) {
        Some(value.round() as u32)
    } else {
        None
    }
}
