//! Temporary corpora and a scripted scanner adapter.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use vibe_oracle::adapter::{AdapterFailure, RawFinding, ScanRequest, ScannerAdapter};
use vibe_oracle::corpus::hash::content_hash;
use vibe_oracle::oracle::{Oracle, OracleDocument};
use vibe_oracle::{FindingInstance, Language};

pub struct TempCorpus {
    dir: TempDir,
}

impl TempCorpus {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Oracle for files already on disk, with the correct content hash.
    pub fn oracle(&self, id: &str, language: Option<Language>, files: &[&str], findings: Vec<FindingInstance>) -> Oracle {
        let contents: Vec<(PathBuf, Vec<u8>)> = files
            .iter()
            .map(|f| (PathBuf::from(f), std::fs::read(self.root().join(f)).unwrap()))
            .collect();
        Oracle {
            fixture_id: id.into(),
            language,
            files: files.iter().map(PathBuf::from).collect(),
            content_hash: content_hash(&contents),
            findings,
        }
    }

    pub fn save_oracle(&self, name: &str, oracle: Oracle) {
        OracleDocument::Single(oracle)
            .save(&self.root().join(name))
            .unwrap();
    }

    /// Write `file`, then an oracle next to the corpus root naming it.
    pub fn add_fixture(&self, id: &str, file: &str, contents: &str, findings: Vec<FindingInstance>) {
        self.write(file, contents);
        let oracle = self.oracle(id, None, &[file], findings);
        self.save_oracle(&format!("{id}.oracle.json"), oracle);
    }
}

/// Source with a shell-out on line 3.
pub const JS_CMD: &str = "const { exec } = require('child_process');\nfunction run(cmd) {\n    exec(cmd);\n}\n";
pub const TS_CMD: &str = "import { execSync } from 'child_process';\nexport function run(name: string) {\n  execSync(`ls ${name}`);\n}\n";
pub const RB_CMD: &str = "class SystemController\n  def execute\n    `#{params[:command]}`\n  end\nend\n";

#[derive(Clone)]
pub enum Behavior {
    Findings(Vec<RawFinding>),
    Fail(AdapterFailure),
    Hang,
    Panic,
    Slow(Duration, Vec<RawFinding>),
}

/// Adapter whose answer per fixture id is fixed up front. Fixtures without a
/// script report nothing.
pub struct StubAdapter {
    script: HashMap<String, Behavior>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl StubAdapter {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, fixture_id: &str, behavior: Behavior) -> Self {
        self.script.insert(fixture_id.into(), behavior);
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScannerAdapter for StubAdapter {
    fn name(&self) -> &str {
        "stub"
    }

    async fn scan(&self, request: &ScanRequest) -> Result<Vec<RawFinding>, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = match self.script.get(&request.fixture_id).cloned() {
            None => Ok(Vec::new()),
            Some(Behavior::Findings(findings)) => Ok(findings),
            Some(Behavior::Fail(failure)) => Err(failure),
            Some(Behavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Some(Behavior::Panic) => panic!("scanner crashed on {}", request.fixture_id),
            Some(Behavior::Slow(delay, findings)) => {
                tokio::time::sleep(delay).await;
                Ok(findings)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
