//! Roll per-fixture verdicts into corpus-wide precision/recall.

use crate::adapter::{AdapterFailure, UnanchoredFinding};
use crate::adapter::mapping::UnknownClassWarning;
use crate::compare::{Verdict, VerdictKind};
use crate::taxonomy::Language;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub true_positive: usize,
    pub variance_match: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

impl Tally {
    pub fn record(&mut self, kind: VerdictKind) {
        match kind {
            VerdictKind::TruePositive => self.true_positive += 1,
            VerdictKind::VarianceMatch => self.variance_match += 1,
            VerdictKind::FalsePositive => self.false_positive += 1,
            VerdictKind::FalseNegative => self.false_negative += 1,
        }
    }

    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a Verdict>) -> Self {
        let mut tally = Self::default();
        for v in verdicts {
            tally.record(v.kind);
        }
        tally
    }

    /// Variance matches count as detections.
    pub fn matched(&self) -> usize {
        self.true_positive + self.variance_match
    }

    pub fn precision(&self) -> Ratio {
        Ratio::of(self.matched(), self.matched() + self.false_positive)
    }

    pub fn recall(&self) -> Ratio {
        Ratio::of(self.matched(), self.matched() + self.false_negative)
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.true_positive += rhs.true_positive;
        self.variance_match += rhs.variance_match;
        self.false_positive += rhs.false_positive;
        self.false_negative += rhs.false_negative;
    }
}

/// A ratio that remembers whether it had anything to measure. A zero
/// denominator yields 1.0 with `vacuous` set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ratio {
    pub value: f64,
    pub vacuous: bool,
}

impl Ratio {
    pub fn of(numerator: usize, denominator: usize) -> Self {
        if denominator == 0 {
            Self {
                value: 1.0,
                vacuous: true,
            }
        } else {
            Self {
                value: numerator as f64 / denominator as f64,
                vacuous: false,
            }
        }
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.vacuous {
            write!(f, "{:.3} (vacuous)", self.value)
        } else {
            write!(f, "{:.3}", self.value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    #[serde(flatten)]
    pub counts: Tally,
    pub precision: Ratio,
    pub recall: Ratio,
}

impl From<Tally> for Metrics {
    fn from(counts: Tally) -> Self {
        Self {
            counts,
            precision: counts.precision(),
            recall: counts.recall(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum FixtureOutcome {
    Scanned {
        counts: Tally,
        verdicts: Vec<Verdict>,
    },
    AdapterFailed {
        failure: AdapterFailure,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub fixture_id: String,
    pub language: Language,
    #[serde(flatten)]
    pub outcome: FixtureOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_classes: Vec<UnknownClassWarning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unanchored: Vec<UnanchoredFinding>,
    pub elapsed_ms: u64,
}

impl FixtureReport {
    pub fn scanned(
        fixture_id: impl Into<String>,
        language: Language,
        verdicts: Vec<Verdict>,
        unknown_classes: Vec<UnknownClassWarning>,
    ) -> Self {
        Self {
            fixture_id: fixture_id.into(),
            language,
            outcome: FixtureOutcome::Scanned {
                counts: Tally::from_verdicts(&verdicts),
                verdicts,
            },
            unknown_classes,
            unanchored: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn with_unanchored(mut self, unanchored: Vec<UnanchoredFinding>) -> Self {
        self.unanchored = unanchored;
        self
    }

    pub fn failed(fixture_id: impl Into<String>, language: Language, failure: AdapterFailure) -> Self {
        Self {
            fixture_id: fixture_id.into(),
            language,
            outcome: FixtureOutcome::AdapterFailed { failure },
            unknown_classes: Vec::new(),
            unanchored: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn verdicts(&self) -> &[Verdict] {
        match &self.outcome {
            FixtureOutcome::Scanned { verdicts, .. } => verdicts,
            FixtureOutcome::AdapterFailed { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFixture {
    pub fixture_id: String,
    pub language: Language,
    pub failure: AdapterFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    pub generated_at: DateTime<Utc>,
    pub corpus_root: PathBuf,
    pub adapter: String,
    pub line_tolerance: u32,
    pub fixtures_total: usize,
    pub fixtures_scanned: usize,
    pub overall: Metrics,
    /// Keyed by class id. Only classes present in a scanned fixture's oracle
    /// or report appear.
    pub by_class: BTreeMap<String, Metrics>,
    pub by_language: BTreeMap<String, Metrics>,
    pub adapter_failures: Vec<FailedFixture>,
    pub unknown_classes: Vec<UnknownClassWarning>,
    /// Findings reported without a line; counted nowhere.
    pub unanchored: Vec<UnanchoredFinding>,
    pub fixtures: Vec<FixtureReport>,
}

/// Run-level facts the aggregator records alongside the numbers.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub corpus_root: PathBuf,
    pub adapter: String,
    pub line_tolerance: u32,
}

impl CorpusReport {
    /// Pure reduction over fixture reports; fixtures are reported in id order.
    pub fn aggregate(context: RunContext, mut fixtures: Vec<FixtureReport>) -> Self {
        fixtures.sort_by(|a, b| a.fixture_id.cmp(&b.fixture_id));

        let mut overall = Tally::default();
        let mut by_class: BTreeMap<String, Tally> = BTreeMap::new();
        let mut by_language: BTreeMap<String, Tally> = BTreeMap::new();
        let mut adapter_failures = Vec::new();
        let mut unknown_classes = Vec::new();
        let mut unanchored = Vec::new();

        for fixture in &fixtures {
            unknown_classes.extend(fixture.unknown_classes.iter().cloned());
            unanchored.extend(fixture.unanchored.iter().cloned());
            match &fixture.outcome {
                FixtureOutcome::AdapterFailed { failure } => {
                    adapter_failures.push(FailedFixture {
                        fixture_id: fixture.fixture_id.clone(),
                        language: fixture.language,
                        failure: failure.clone(),
                    });
                }
                FixtureOutcome::Scanned { counts, verdicts } => {
                    overall += *counts;
                    *by_language
                        .entry(fixture.language.tag().to_string())
                        .or_default() += *counts;
                    for v in verdicts {
                        by_class
                            .entry(v.class.id().to_string())
                            .or_default()
                            .record(v.kind);
                    }
                }
            }
        }

        Self {
            generated_at: Utc::now(),
            corpus_root: context.corpus_root,
            adapter: context.adapter,
            line_tolerance: context.line_tolerance,
            fixtures_total: fixtures.len(),
            fixtures_scanned: fixtures.len() - adapter_failures.len(),
            overall: overall.into(),
            by_class: by_class.into_iter().map(|(k, t)| (k, t.into())).collect(),
            by_language: by_language.into_iter().map(|(k, t)| (k, t.into())).collect(),
            adapter_failures,
            unknown_classes,
            unanchored,
            fixtures,
        }
    }
}
