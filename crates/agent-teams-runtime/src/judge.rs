//! Uncertainty proxy and final judge (§4.8).
//!
//! Mirrors the reference codebase's voting module: deterministic scoring
//! over a set of member results, with tag-based signals rather than free
//! text, and a judge that never throws — any computation here falls back to
//! a proxy-only verdict.

use crate::model::{Diagnostics, FinalJudge, MemberResult, Verdict};

/// Low/high thresholds on `uInter` that separate converged / partial / diverged.
const U_INTER_LOW_THRESHOLD: f64 = 0.2;
const U_INTER_HIGH_THRESHOLD: f64 = 0.55;

/// The `(uIntra, uInter, uSys)` triple plus collapse tags (§4.8).
#[derive(Debug, Clone)]
pub struct UncertaintyProxy {
    pub u_intra: f64,
    pub u_inter: f64,
    pub u_sys: f64,
    pub collapse_signals: Vec<String>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation, 0 for n <= 1.
fn spread(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Computes the uncertainty proxy over all member results (completed and failed).
pub fn compute_uncertainty_proxy(results: &[MemberResult]) -> UncertaintyProxy {
    let completed: Vec<&MemberResult> = results.iter().filter(|r| r.is_completed()).collect();
    let mut collapse_signals = Vec::new();

    if completed.is_empty() {
        collapse_signals.push("all-failed".to_string());
        return UncertaintyProxy {
            u_intra: 1.0,
            u_inter: 0.0,
            u_sys: 1.0,
            collapse_signals,
        };
    }

    let diags: Vec<&Diagnostics> = completed.iter().map(|r| &r.diagnostics).collect();

    // uIntra: average (1 - confidence) weighted by evidence count; low
    // evidence raises intra-uncertainty, so the weight favors low-evidence
    // members contributing more uncertainty, not less.
    let total_weight: f64 = diags.iter().map(|d| 1.0 / (1.0 + d.evidence_count as f64)).sum();
    let u_intra = if total_weight > 0.0 {
        diags
            .iter()
            .map(|d| (1.0 - d.confidence) * (1.0 / (1.0 + d.evidence_count as f64)))
            .sum::<f64>()
            / total_weight
    } else {
        0.0
    };

    let low_evidence = diags.iter().any(|d| d.evidence_count == 0);
    if low_evidence {
        collapse_signals.push("low-evidence".to_string());
    }

    // uInter: undefined with n=1, defined as confidence spread plus a
    // contradiction/conflict penalty otherwise.
    let u_inter = if completed.len() == 1 {
        0.0
    } else {
        let confidences: Vec<f64> = diags.iter().map(|d| d.confidence).collect();
        let confidence_spread = spread(&confidences).min(1.0);
        let total_signals: u32 = diags
            .iter()
            .map(|d| d.contradiction_signals + d.conflict_signals)
            .sum();
        let signal_penalty = (total_signals as f64 / (completed.len() as f64 * 4.0)).min(1.0);
        let combined = (confidence_spread * 0.6 + signal_penalty * 0.4).min(1.0);
        if total_signals > 0 {
            collapse_signals.push("conflicting-claims".to_string());
        }
        combined
    };

    if completed.len() == 1 {
        collapse_signals.push("single-voice".to_string());
    }

    let failed_ratio = (results.len() - completed.len()) as f64 / results.len() as f64;
    let u_sys = (u_intra * 0.4 + u_inter * 0.4 + failed_ratio * 0.2).min(1.0);

    UncertaintyProxy {
        u_intra,
        u_inter,
        u_sys,
        collapse_signals,
    }
}

fn render_reason(verdict: Verdict, proxy: &UncertaintyProxy, completed: usize, total: usize) -> String {
    match verdict {
        Verdict::Failed => "all members failed; no usable output was produced".to_string(),
        Verdict::Partial if completed == 1 => {
            "only one member completed; confidence discounted for lack of corroboration".to_string()
        }
        Verdict::Converged => format!(
            "{completed}/{total} members completed with low disagreement (uInter={:.2})",
            proxy.u_inter
        ),
        Verdict::Diverged => format!(
            "{completed}/{total} members completed but disagree strongly (uInter={:.2})",
            proxy.u_inter
        ),
        Verdict::Partial => format!(
            "{completed}/{total} members completed with moderate disagreement (uInter={:.2})",
            proxy.u_inter
        ),
    }
}

fn render_next_step(verdict: Verdict) -> String {
    match verdict {
        Verdict::Failed => "retry the run or inspect member errors before proceeding".to_string(),
        Verdict::Diverged => "reconcile conflicting claims manually or rerun with more members".to_string(),
        Verdict::Partial => "treat the result as provisional; consider a retry round".to_string(),
        Verdict::Converged => "proceed with the result".to_string(),
    }
}

/// Deterministic stable-profile judge (§4.8). Never panics: any malformed
/// input degrades to the `all-failed`/proxy-only branch rather than erroring.
pub fn judge(results: &[MemberResult]) -> FinalJudge {
    let proxy = compute_uncertainty_proxy(results);
    let completed: Vec<&MemberResult> = results.iter().filter(|r| r.is_completed()).collect();

    let (verdict, confidence) = if completed.is_empty() {
        (Verdict::Failed, 0.0)
    } else if completed.len() == 1 {
        let base = completed[0].diagnostics.confidence;
        (Verdict::Partial, (base * (1.0 - proxy.u_sys)).max(0.0))
    } else if proxy.u_inter < U_INTER_LOW_THRESHOLD {
        (Verdict::Converged, mean(&completed.iter().map(|r| r.diagnostics.confidence).collect::<Vec<_>>()))
    } else if proxy.u_inter >= U_INTER_HIGH_THRESHOLD {
        (Verdict::Diverged, mean(&completed.iter().map(|r| r.diagnostics.confidence).collect::<Vec<_>>()) * 0.5)
    } else {
        (Verdict::Partial, mean(&completed.iter().map(|r| r.diagnostics.confidence).collect::<Vec<_>>()) * 0.75)
    };

    FinalJudge {
        reason: render_reason(verdict, &proxy, completed.len(), results.len()),
        next_step: render_next_step(verdict),
        verdict,
        confidence: confidence.clamp(0.0, 1.0),
        u_intra: proxy.u_intra,
        u_inter: proxy.u_inter,
        u_sys: proxy.u_sys,
        collapse_signals: proxy.collapse_signals,
    }
}

/// The fallback judge produced when the run itself fails catastrophically:
/// a proxy-only verdict with no LLM involvement, matching §4.1's "fatal
/// path still emits a degraded record... with a fallback judge".
pub fn fallback_judge(results: &[MemberResult]) -> FinalJudge {
    judge(results)
}
