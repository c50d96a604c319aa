pub mod command;
pub mod formats;
pub mod mapping;

use crate::corpus::{Fixture, normalize_relative};
use crate::oracle::{Anchor, ColumnRange};
use crate::taxonomy::{Language, Severity, VulnerabilityClass};
use async_trait::async_trait;
use mapping::{ClassMapping, UnknownClassWarning};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What the harness hands an adapter for one fixture.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub fixture_id: String,
    pub language: Language,
    pub corpus_root: PathBuf,
    /// Relative to `corpus_root`.
    pub files: Vec<PathBuf>,
    pub lint_profile: Option<PathBuf>,
}

impl ScanRequest {
    pub fn for_fixture(corpus_root: &Path, fixture: &Fixture) -> Self {
        let corpus_root =
            std::path::absolute(corpus_root).unwrap_or_else(|_| corpus_root.to_path_buf());
        Self {
            fixture_id: fixture.id.clone(),
            language: fixture.language,
            corpus_root,
            files: fixture.files.clone(),
            lint_profile: fixture.lint_profile.clone(),
        }
    }

    /// First listed file; `None` only for a hand-built request with no files.
    pub fn primary_file(&self) -> Option<&Path> {
        self.files.first().map(PathBuf::as_path)
    }

    pub fn absolute(&self, rel: &Path) -> PathBuf {
        self.corpus_root.join(rel)
    }

    /// Map an adapter-reported path onto one of the fixture's files.
    ///
    /// Absolute paths under the corpus root are made relative; otherwise the
    /// fixture file sharing the reported path's trailing components wins.
    /// An empty path means the primary file.
    pub fn resolve_file(&self, reported: &Path) -> PathBuf {
        if reported.as_os_str().is_empty() {
            if let Some(primary) = self.primary_file() {
                return primary.to_path_buf();
            }
        }
        let stripped = reported
            .strip_prefix(&self.corpus_root)
            .unwrap_or(reported);
        let candidate = normalize_relative(stripped).unwrap_or_else(|| stripped.to_path_buf());
        if self.files.contains(&candidate) {
            return candidate;
        }
        self.files
            .iter()
            .find(|f| candidate.ends_with(f) || f.ends_with(&candidate))
            .cloned()
            .unwrap_or(candidate)
    }
}

/// One finding as the adapter emitted it, before class mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub class: String,
    #[serde(default)]
    pub file: PathBuf,
    /// Required by every format except Brakeman, which has controller-wide
    /// warnings with no line.
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RawFinding {
    pub fn new(class: impl Into<String>, file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            id: None,
            class: class.into(),
            file: file.into(),
            line: Some(line),
            column: None,
            end_column: None,
            symbol: None,
            severity: None,
            message: None,
        }
    }

    #[allow(clippy::type_complexity)]
    fn content_key(
        &self,
    ) -> (
        &Path,
        Option<u32>,
        Option<u32>,
        Option<u32>,
        &str,
        Option<&str>,
        Option<&str>,
        Option<&str>,
        Option<&str>,
    ) {
        (
            &self.file,
            self.line,
            self.column,
            self.end_column,
            &self.class,
            self.symbol.as_deref(),
            self.severity.as_deref(),
            self.message.as_deref(),
            self.id.as_deref(),
        )
    }
}

/// A finding after mapping onto the taxonomy. Produced fresh per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedFinding {
    pub scanner_id: String,
    pub class: VulnerabilityClass,
    #[serde(flatten)]
    pub anchor: Anchor,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// The class-string the adapter used.
    pub raw_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AdapterFailure {
    #[error("adapter timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("adapter exited with {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("failed to launch adapter: {message}")]
    Spawn { message: String },

    #[error("malformed adapter output: {message}")]
    MalformedOutput { message: String },

    #[error("adapter task crashed: {message}")]
    Crashed { message: String },
}

impl AdapterFailure {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            message: message.into(),
        }
    }
}

/// The external scanner. One call per fixture; may be slow or flaky, so the
/// harness bounds every call with a timeout.
#[async_trait]
pub trait ScannerAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn scan(&self, request: &ScanRequest) -> Result<Vec<RawFinding>, AdapterFailure>;
}

/// A finding the adapter could not place on a line. Listed in the report,
/// never matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnanchoredFinding {
    pub fixture_id: String,
    pub scanner_id: String,
    pub raw_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<VulnerabilityClass>,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub reported: Vec<ReportedFinding>,
    pub unknown: Vec<UnknownClassWarning>,
    pub unanchored: Vec<UnanchoredFinding>,
}

/// Resolve paths and map class-strings. Unmapped class-strings become
/// warnings, findings without a line are set aside, and neither takes part
/// in matching.
///
/// Findings are put into content order first, so the ids handed to findings
/// the adapter left unnamed do not depend on emission order.
pub fn normalize(request: &ScanRequest, mut raw: Vec<RawFinding>, mapping: &ClassMapping) -> Normalized {
    raw.sort_by(|a, b| a.content_key().cmp(&b.content_key()));
    let mut out = Normalized::default();
    for (idx, finding) in raw.into_iter().enumerate() {
        let scanner_id = finding
            .id
            .clone()
            .unwrap_or_else(|| format!("{}#{}", request.fixture_id, idx + 1));
        let file = request.resolve_file(&finding.file);

        let Some(line) = finding.line else {
            out.unanchored.push(UnanchoredFinding {
                fixture_id: request.fixture_id.clone(),
                scanner_id,
                class: mapping.resolve(&finding.class),
                raw_class: finding.class,
                file,
                message: finding.message.unwrap_or_default(),
            });
            continue;
        };

        let Some(class) = mapping.resolve(&finding.class) else {
            out.unknown.push(UnknownClassWarning {
                fixture_id: request.fixture_id.clone(),
                scanner_id,
                raw_class: finding.class,
                file,
                line,
            });
            continue;
        };

        let columns = finding.column.map(|start| ColumnRange {
            start,
            end: finding.end_column.unwrap_or(start).max(start),
        });
        out.reported.push(ReportedFinding {
            scanner_id,
            class,
            anchor: Anchor {
                file,
                line,
                columns,
                symbol: finding.symbol.filter(|s| !s.is_empty()),
            },
            severity: finding
                .severity
                .as_deref()
                .and_then(Severity::from_label)
                .unwrap_or_default(),
            message: finding.message.unwrap_or_default(),
            raw_class: finding.class,
        });
    }
    out
}
