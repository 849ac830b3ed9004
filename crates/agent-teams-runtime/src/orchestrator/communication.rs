//! Communication-round context assembly and partner-reference detection
//! (§4.1 phase 3).

use crate::constants::{COMMUNICATION_CONTEXT_FIELD_LIMIT, COMMUNICATION_CONTEXT_OTHER_LIMIT, CONTEXT_PREVIEW_LIMIT};
use crate::normalize::extract_labeled_field;

/// The labeled fields pulled out of one partner's prior-round output.
#[derive(Debug, Clone)]
pub struct PartnerContext {
    pub member_id: String,
    pub claim: Option<String>,
    pub evidence: Option<String>,
    pub confidence: Option<String>,
    pub summary: Option<String>,
    pub result: Option<String>,
}

pub fn extract_partner_context(member_id: &str, output: &str) -> PartnerContext {
    PartnerContext {
        member_id: member_id.to_string(),
        claim: extract_labeled_field(output, "CLAIM"),
        evidence: extract_labeled_field(output, "EVIDENCE"),
        confidence: extract_labeled_field(output, "CONFIDENCE"),
        summary: extract_labeled_field(output, "SUMMARY"),
        result: extract_labeled_field(output, "RESULT"),
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= 3 {
        return text.chars().take(limit).collect();
    }
    let head: String = text.chars().take(limit - 3).collect();
    format!("{head}...")
}

/// Renders up to `max_partners` partner blocks, each field truncated to
/// `COMMUNICATION_CONTEXT_FIELD_LIMIT`, with the whole assembled context
/// truncated to `COMMUNICATION_CONTEXT_OTHER_LIMIT`.
pub fn build_communication_context(partners: &[PartnerContext], max_partners: usize) -> String {
    let mut blocks = Vec::new();
    for partner in partners.iter().take(max_partners) {
        let mut block = format!("--- {} ---\n", partner.member_id);
        let fields: [(&str, &Option<String>); 5] = [
            ("CLAIM", &partner.claim),
            ("EVIDENCE", &partner.evidence),
            ("CONFIDENCE", &partner.confidence),
            ("SUMMARY", &partner.summary),
            ("RESULT", &partner.result),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                block.push_str(&format!(
                    "{label}: {}\n",
                    truncate_chars(value, COMMUNICATION_CONTEXT_FIELD_LIMIT)
                ));
            }
        }
        blocks.push(block);
    }
    truncate_chars(&blocks.join("\n"), COMMUNICATION_CONTEXT_OTHER_LIMIT)
}

/// Preview stored on the audit entry (§3).
pub fn context_preview(context: &str) -> String {
    truncate_chars(context, CONTEXT_PREVIEW_LIMIT)
}

/// Scans `output` for mentions of each partner id, splitting into
/// referenced/missing (§4.1 phase 3).
pub fn detect_partner_references(output: &str, partner_ids: &[String]) -> (Vec<String>, Vec<String>) {
    let lower = output.to_lowercase();
    let mut referenced = Vec::new();
    let mut missing = Vec::new();
    for id in partner_ids {
        if lower.contains(&id.to_lowercase()) {
            referenced.push(id.clone());
        } else {
            missing.push(id.clone());
        }
    }
    (referenced, missing)
}
