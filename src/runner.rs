//! Scan dispatch: one adapter call per fixture, bounded concurrency, a
//! timeout on every call, failures kept per fixture.

use crate::adapter::mapping::ClassMapping;
use crate::adapter::{self, AdapterFailure, RawFinding, ScanRequest, ScannerAdapter};
use crate::compare::{self, MatchOptions};
use crate::config::RunConfig;
use crate::corpus::{Corpus, CorpusEntry};
use crate::report::{CorpusReport, FixtureReport, RunContext};
use crate::taxonomy::Language;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub timeout: Duration,
    pub language: Option<Language>,
    pub line_tolerance: u32,
}

impl RunOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            workers: config.workers,
            timeout: config.timeout(),
            language: None,
            line_tolerance: config.line_tolerance,
        }
    }
}

/// Scan every selected fixture and reduce the verdicts into a report.
///
/// The corpus is already validated; nothing here can abort the run. Adapter
/// timeouts, non-zero exits, malformed output and panics are recorded against
/// the fixture that caused them.
pub async fn run_corpus(
    corpus: &Corpus,
    adapter: Arc<dyn ScannerAdapter>,
    mapping: Arc<ClassMapping>,
    options: &RunOptions,
) -> CorpusReport {
    let selected = corpus.with_language(options.language);
    let workers = options.workers.max(1);
    info!(
        fixtures = selected.len(),
        workers,
        timeout_ms = options.timeout.as_millis() as u64,
        adapter = adapter.name(),
        "dispatching scans"
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut join_set: JoinSet<FixtureReport> = JoinSet::new();
    let mut pending: HashMap<Id, (String, Language)> = HashMap::new();
    let match_options = MatchOptions {
        line_tolerance: options.line_tolerance,
    };

    for entry in selected {
        let entry = entry.clone();
        let request = ScanRequest::for_fixture(corpus.root(), &entry.fixture);
        let adapter = Arc::clone(&adapter);
        let mapping = Arc::clone(&mapping);
        let permit = Arc::clone(&semaphore);
        let timeout = options.timeout;
        let owner = (entry.fixture.id.clone(), entry.fixture.language);

        let handle = join_set.spawn(async move {
            let _permit = match permit.acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    return FixtureReport::failed(
                        entry.fixture.id.clone(),
                        entry.fixture.language,
                        AdapterFailure::Crashed {
                            message: format!("worker pool closed: {e}"),
                        },
                    );
                }
            };
            let started = Instant::now();
            let outcome = invoke(adapter, request.clone(), timeout).await;
            let mut report = evaluate(&entry, &request, outcome, &mapping, match_options);
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            report
        });
        pending.insert(handle.id(), owner);
    }

    let fixtures = collect(join_set, pending).await;

    let report = CorpusReport::aggregate(
        RunContext {
            corpus_root: corpus.root().to_path_buf(),
            adapter: adapter.name().to_string(),
            line_tolerance: options.line_tolerance,
        },
        fixtures,
    );
    info!(
        scanned = report.fixtures_scanned,
        failed = report.adapter_failures.len(),
        unknown_classes = report.unknown_classes.len(),
        precision = %report.overall.precision,
        recall = %report.overall.recall,
        "corpus run complete"
    );
    report
}

/// Drain the pool. A task that dies outside the adapter call (a panic while
/// comparing) still yields a report, as a crash of the fixture it owned.
async fn collect(
    mut join_set: JoinSet<FixtureReport>,
    mut pending: HashMap<Id, (String, Language)>,
) -> Vec<FixtureReport> {
    let mut fixtures = Vec::with_capacity(pending.len());
    while let Some(result) = join_set.join_next_with_id().await {
        match result {
            Ok((id, report)) => {
                pending.remove(&id);
                fixtures.push(report);
            }
            Err(e) => {
                warn!(error = %e, "scan task failed");
                if let Some((fixture_id, language)) = pending.remove(&e.id()) {
                    fixtures.push(FixtureReport::failed(
                        fixture_id,
                        language,
                        AdapterFailure::Crashed {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }
    }
    fixtures
}

/// Run the adapter on its own task so a panic surfaces as a `JoinError`
/// instead of tearing down the worker. Aborting the task on timeout drops the
/// adapter future, which kills any child process it spawned.
async fn invoke(
    adapter: Arc<dyn ScannerAdapter>,
    request: ScanRequest,
    timeout: Duration,
) -> Result<Vec<RawFinding>, AdapterFailure> {
    let mut handle = tokio::spawn(async move { adapter.scan(&request).await });
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AdapterFailure::Crashed {
            message: e.to_string(),
        }),
        Err(_) => {
            handle.abort();
            Err(AdapterFailure::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

fn evaluate(
    entry: &CorpusEntry,
    request: &ScanRequest,
    outcome: Result<Vec<RawFinding>, AdapterFailure>,
    mapping: &ClassMapping,
    options: MatchOptions,
) -> FixtureReport {
    let fixture = &entry.fixture;
    match outcome {
        Err(failure) => {
            warn!(fixture = %fixture.id, error = %failure, "adapter failed");
            FixtureReport::failed(fixture.id.clone(), fixture.language, failure)
        }
        Ok(raw) => {
            let normalized = adapter::normalize(request, raw, mapping);
            for w in &normalized.unknown {
                warn!(fixture = %w.fixture_id, raw_class = %w.raw_class, line = w.line, "unmapped class-string");
            }
            let verdicts = compare::compare(&entry.oracle.findings, &normalized.reported, options);
            debug!(fixture = %fixture.id, verdicts = verdicts.len(), "fixture compared");
            for u in &normalized.unanchored {
                warn!(fixture = %u.fixture_id, raw_class = %u.raw_class, file = %u.file.display(), "finding without a line");
            }
            FixtureReport::scanned(fixture.id.clone(), fixture.language, verdicts, normalized.unknown)
                .with_unanchored(normalized.unanchored)
        }
    }
}

/// Reconcile pre-computed adapter output for one fixture without running the
/// adapter.
pub fn compare_offline(
    corpus: &Corpus,
    fixture_id: &str,
    raw: Vec<RawFinding>,
    mapping: &ClassMapping,
    options: MatchOptions,
) -> Option<FixtureReport> {
    let entry = corpus.get(fixture_id)?;
    let request = ScanRequest::for_fixture(corpus.root(), &entry.fixture);
    Some(evaluate(entry, &request, Ok(raw), mapping, options))
}
