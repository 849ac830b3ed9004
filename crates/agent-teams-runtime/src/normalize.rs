//! Member output normalization and validation (§4.7).
//!
//! Field parsing is isolated here rather than relying on ad-hoc string
//! coercion at call sites, per §9's "dynamic number parsing" redesign note.

use regex::Regex;
use std::sync::OnceLock;

use crate::model::Diagnostics;

const LABELS: [&str; 6] = ["SUMMARY", "CLAIM", "EVIDENCE", "CONFIDENCE", "RESULT", "NEXT_STEP"];

fn label_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?im)^\s*{label}\s*:\s*(.*)$")).expect("static label regex")
}

fn contradiction_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(contradict(s|ion|ory)?|inconsistent|conflict(s|ing)?|disagree(s)?)\b")
            .expect("static contradiction regex")
    })
}

/// Result of validating (and possibly normalizing) a raw member output.
pub struct NormalizedOutput {
    pub text: String,
    pub diagnostics: Diagnostics,
}

/// Reason a normalization attempt ultimately failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationFailure(pub String);

/// Extracts the value following `label:` on its own line, trimmed.
fn extract_field(text: &str, label: &str) -> Option<String> {
    let re = label_regex(label);
    re.captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Whether every required label is present and carries non-trivial content.
fn has_all_labels(text: &str) -> bool {
    LABELS.iter().all(|label| extract_field(text, label).is_some())
}

/// Public label extraction, used when assembling communication context from
/// a partner's normalized output (§4.1 phase 3).
pub fn extract_labeled_field(text: &str, label: &str) -> Option<String> {
    extract_field(text, label)
}

/// Parses the `CONFIDENCE` field as a float in `[0,1]`, defaulting to 0.5 if absent or unparseable.
fn parse_confidence(text: &str) -> f64 {
    extract_field(text, "CONFIDENCE")
        .and_then(|raw| {
            raw.chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect::<String>()
                .parse::<f64>()
                .ok()
        })
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(0.5)
}

/// Counts bullet/numbered-list items in the `EVIDENCE` field.
fn count_evidence_items(text: &str) -> u32 {
    match extract_field(text, "EVIDENCE") {
        None => 0,
        Some(evidence) => {
            let bullet_lines = evidence
                .lines()
                .filter(|line| {
                    let trimmed = line.trim_start();
                    trimmed.starts_with('-') || trimmed.starts_with('*') || trimmed.chars().next().is_some_and(|c| c.is_ascii_digit())
                })
                .count();
            if bullet_lines > 0 {
                bullet_lines as u32
            } else if evidence.is_empty() {
                0
            } else {
                1
            }
        }
    }
}

fn count_signal_words(text: &str) -> u32 {
    contradiction_words().find_iter(text).count() as u32
}

/// Builds diagnostics from a (possibly normalized) output body.
fn diagnostics_for(text: &str) -> Diagnostics {
    let signals = count_signal_words(text);
    Diagnostics {
        confidence: parse_confidence(text),
        evidence_count: count_evidence_items(text),
        contradiction_signals: signals,
        conflict_signals: signals,
    }
}

/// Picks a compact single-line candidate for SUMMARY/CLAIM when the raw
/// output lacks labeled fields: the first non-empty line, truncated.
fn compact_candidate_line(raw: &str) -> String {
    let first_line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first_line.len() > 160 {
        format!("{}...", &first_line[..157])
    } else {
        first_line.to_string()
    }
}

/// Validates a raw member output against §4.7's contract, attempting
/// normalization if labels are missing, and failing only if normalization
/// cannot recover a non-empty, re-validatable body.
pub fn validate_and_normalize(raw: &str) -> Result<NormalizedOutput, NormalizationFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizationFailure("empty output".to_string()));
    }

    if has_all_labels(trimmed) {
        return Ok(NormalizedOutput {
            diagnostics: diagnostics_for(trimmed),
            text: trimmed.to_string(),
        });
    }

    let candidate = compact_candidate_line(trimmed);
    if candidate.is_empty() {
        return Err(NormalizationFailure(
            "no labeled fields and no recoverable content".to_string(),
        ));
    }

    // Intent-only content (a short line with no supporting body) gets the
    // lower synthesized confidence; anything with a longer body is treated
    // as having some substance behind it.
    let confidence = if trimmed.lines().count() <= 1 {
        0.40
    } else {
        0.55
    };

    let synthesized = format!(
        "SUMMARY: {candidate}\nCLAIM: {candidate}\nEVIDENCE: generated-from-raw-output\nCONFIDENCE: {confidence:.2}\nRESULT: {trimmed}\nNEXT_STEP: none\n"
    );

    if !has_all_labels(&synthesized) {
        return Err(NormalizationFailure(
            "normalization could not synthesize required fields".to_string(),
        ));
    }

    Ok(NormalizedOutput {
        diagnostics: diagnostics_for(&synthesized),
        text: synthesized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_output_is_accepted_as_is() {
        let raw = "SUMMARY: looks fine\nCLAIM: works\nEVIDENCE: - a\n- b\nCONFIDENCE: 0.8\nRESULT: done\nNEXT_STEP: none\n";
        let out = validate_and_normalize(raw).unwrap();
        assert_eq!(out.text, raw);
        assert_eq!(out.diagnostics.confidence, 0.8);
        assert_eq!(out.diagnostics.evidence_count, 2);
    }

    #[test]
    fn empty_output_is_rejected() {
        assert!(validate_and_normalize("   ").is_err());
    }

    #[test]
    fn unlabeled_single_line_is_normalized_with_low_confidence() {
        let out = validate_and_normalize("It probably works").unwrap();
        assert!(out.text.contains("SUMMARY: It probably works"));
        assert_eq!(out.diagnostics.confidence, 0.40);
    }

    #[test]
    fn unlabeled_multi_line_is_normalized_with_higher_confidence() {
        let raw = "It probably works\nbecause of X and Y";
        let out = validate_and_normalize(raw).unwrap();
        assert_eq!(out.diagnostics.confidence, 0.55);
    }

    #[test]
    fn confidence_out_of_range_is_clamped() {
        let raw = "SUMMARY: s\nCLAIM: c\nEVIDENCE: e\nCONFIDENCE: 2.5\nRESULT: r\nNEXT_STEP: n\n";
        let out = validate_and_normalize(raw).unwrap();
        assert_eq!(out.diagnostics.confidence, 1.0);
    }

    #[test]
    fn unparseable_confidence_defaults_to_half() {
        let raw = "SUMMARY: s\nCLAIM: c\nEVIDENCE: e\nCONFIDENCE: high\nRESULT: r\nNEXT_STEP: n\n";
        let out = validate_and_normalize(raw).unwrap();
        assert_eq!(out.diagnostics.confidence, 0.5);
    }

    #[test]
    fn contradiction_signals_are_counted() {
        let raw = "SUMMARY: s\nCLAIM: c\nEVIDENCE: this contradicts the prior claim and is inconsistent\nCONFIDENCE: 0.6\nRESULT: r\nNEXT_STEP: n\n";
        let out = validate_and_normalize(raw).unwrap();
        assert!(out.diagnostics.contradiction_signals >= 2);
    }
}
