//! Reconcile an oracle against what the scanner reported.
//!
//! Matching is a greedy pass over eligible (expected, reported) pairs. Two
//! items are eligible when they share class and file and either
//!
//! - both name an enclosing symbol and the names are equal (line distance is
//!   then unbounded), or
//! - at least one lacks a symbol and their lines differ by at most
//!   `line_tolerance`.
//!
//! Pairs are taken in order of line distance (exact lines first), then oracle
//! insertion order, then the reported item's canonical position. Reported
//! items are sorted canonically before matching, so verdicts never depend on
//! the order the adapter emitted them in.

use crate::adapter::ReportedFinding;
use crate::oracle::FindingInstance;
use crate::taxonomy::VulnerabilityClass;
use serde::Serialize;
use std::cmp::Ordering;

pub const DEFAULT_LINE_TOLERANCE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    pub line_tolerance: u32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            line_tolerance: DEFAULT_LINE_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictKind {
    TruePositive,
    VarianceMatch,
    FalseNegative,
    FalsePositive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub class: VulnerabilityClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<FindingInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported: Option<ReportedFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_distance: Option<u32>,
    /// Matched, but the scanner rated it differently. Informational only.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub severity_mismatch: bool,
}

/// Line distance if `expected` and `reported` may be paired.
fn eligible(expected: &FindingInstance, reported: &ReportedFinding, tolerance: u32) -> Option<u32> {
    if expected.class != reported.class || expected.anchor.file != reported.anchor.file {
        return None;
    }
    let distance = expected.anchor.line.abs_diff(reported.anchor.line);
    match (&expected.anchor.symbol, &reported.anchor.symbol) {
        (Some(a), Some(b)) => (a == b).then_some(distance),
        _ => (distance <= tolerance).then_some(distance),
    }
}

/// Total order over reported findings, independent of emission order.
fn canonical_cmp(a: &ReportedFinding, b: &ReportedFinding) -> Ordering {
    a.anchor
        .file
        .cmp(&b.anchor.file)
        .then(a.anchor.line.cmp(&b.anchor.line))
        .then(a.anchor.columns.cmp(&b.anchor.columns))
        .then(a.class.cmp(&b.class))
        .then(a.anchor.symbol.cmp(&b.anchor.symbol))
        .then(a.severity.cmp(&b.severity))
        .then(a.message.cmp(&b.message))
        .then(a.raw_class.cmp(&b.raw_class))
        .then(a.scanner_id.cmp(&b.scanner_id))
}

/// One verdict per oracle item (in oracle order), then one false positive per
/// unmatched reported item (in canonical order).
pub fn compare(
    expected: &[FindingInstance],
    reported: &[ReportedFinding],
    options: MatchOptions,
) -> Vec<Verdict> {
    let mut canonical: Vec<&ReportedFinding> = reported.iter().collect();
    canonical.sort_by(|a, b| canonical_cmp(a, b));

    let mut candidates: Vec<(u32, usize, usize)> = Vec::new();
    for (oi, o) in expected.iter().enumerate() {
        for (ri, r) in canonical.iter().enumerate() {
            if let Some(distance) = eligible(o, r, options.line_tolerance) {
                candidates.push((distance, oi, ri));
            }
        }
    }
    candidates.sort_unstable();

    let mut matched: Vec<Option<(usize, u32)>> = vec![None; expected.len()];
    let mut taken = vec![false; canonical.len()];
    for (distance, oi, ri) in candidates {
        if matched[oi].is_none() && !taken[ri] {
            matched[oi] = Some((ri, distance));
            taken[ri] = true;
        }
    }

    let mut verdicts = Vec::with_capacity(expected.len() + canonical.len());
    for (o, m) in expected.iter().zip(&matched) {
        let verdict = match *m {
            Some((ri, distance)) => {
                let r = canonical[ri];
                Verdict {
                    kind: if distance == 0 {
                        VerdictKind::TruePositive
                    } else {
                        VerdictKind::VarianceMatch
                    },
                    class: o.class,
                    expected: Some(o.clone()),
                    reported: Some(r.clone()),
                    line_distance: Some(distance),
                    severity_mismatch: o.severity != r.severity,
                }
            }
            None => Verdict {
                kind: VerdictKind::FalseNegative,
                class: o.class,
                expected: Some(o.clone()),
                reported: None,
                line_distance: None,
                severity_mismatch: false,
            },
        };
        verdicts.push(verdict);
    }
    for (r, _) in canonical.iter().zip(&taken).filter(|(_, t)| !**t) {
        verdicts.push(Verdict {
            kind: VerdictKind::FalsePositive,
            class: r.class,
            expected: None,
            reported: Some((*r).clone()),
            line_distance: None,
            severity_mismatch: false,
        });
    }
    verdicts
}
