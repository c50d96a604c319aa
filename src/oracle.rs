//! Ground-truth records: what a fixture contains, where, and how bad it is.
//!
//! Oracle files are JSON. A document holds a single oracle object or an
//! `{"oracles": [...]}` envelope; both forms survive a load/save cycle
//! unchanged.

use crate::error::{Error, Result};
use crate::taxonomy::{Language, Severity, VulnerabilityClass};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 1-based, inclusive column span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRange {
    pub start: u32,
    pub end: u32,
}

/// Where a finding lives inside a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub file: PathBuf,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnRange>,
    /// Enclosing function/method/class name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Anchor {
    pub fn at(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            columns: None,
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_columns(mut self, start: u32, end: u32) -> Self {
        self.columns = Some(ColumnRange { start, end });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingInstance {
    pub class: VulnerabilityClass,
    #[serde(flatten)]
    pub anchor: Anchor,
    #[serde(default)]
    pub severity: Severity,
    /// Human-facing note; never consulted by the comparator.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rationale: String,
}

impl FindingInstance {
    pub fn new(class: VulnerabilityClass, anchor: Anchor, severity: Severity) -> Self {
        Self {
            class,
            anchor,
            severity,
            rationale: String::new(),
        }
    }
}

/// Expected findings for exactly one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    pub fixture_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    pub files: Vec<PathBuf>,
    pub content_hash: String,
    #[serde(default)]
    pub findings: Vec<FindingInstance>,
}

impl Oracle {
    /// Collapse findings sharing the same (class, anchor), keeping the first.
    /// Returns the number of entries removed.
    pub fn dedup_findings(&mut self) -> usize {
        let before = self.findings.len();
        let mut seen: HashSet<(VulnerabilityClass, Anchor)> = HashSet::new();
        self.findings
            .retain(|f| seen.insert((f.class, f.anchor.clone())));
        let removed = before - self.findings.len();
        if removed > 0 {
            debug!(
                fixture = %self.fixture_id,
                removed,
                "collapsed duplicate oracle findings"
            );
        }
        removed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OracleDocument {
    Many { oracles: Vec<Oracle> },
    Single(Oracle),
}

impl OracleDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::parse(format!("invalid JSON: {e}")))?;

        let mut doc = if value.get("oracles").is_some() {
            #[derive(Deserialize)]
            struct Envelope {
                oracles: Vec<Oracle>,
            }
            let env: Envelope = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("invalid oracle list: {e}")))?;
            Self::Many {
                oracles: env.oracles,
            }
        } else {
            let oracle: Oracle = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("invalid oracle: {e}")))?;
            Self::Single(oracle)
        };

        for oracle in doc.oracles_mut() {
            oracle.dedup_findings();
        }
        Ok(doc)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| Error::parse(format!("failed to serialize oracle: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn oracles(&self) -> &[Oracle] {
        match self {
            Self::Many { oracles } => oracles,
            Self::Single(o) => std::slice::from_ref(o),
        }
    }

    pub fn oracles_mut(&mut self) -> &mut [Oracle] {
        match self {
            Self::Many { oracles } => oracles,
            Self::Single(o) => std::slice::from_mut(o),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"{
        "fixture_id": "js-index",
        "language": "javascript",
        "files": ["js-test-app/index.js"],
        "content_hash": "sha256:00",
        "findings": [
            {"class": "sql-injection", "file": "js-test-app/index.js", "line": 50,
             "columns": {"start": 5, "end": 60}, "symbol": "queryDatabase",
             "severity": "critical", "rationale": "concatenated SQL"},
            {"class": "xss", "file": "js-test-app/index.js", "line": 56}
        ]
    }"#;

    #[test]
    fn parses_single_document() {
        let doc = OracleDocument::from_json(SINGLE).unwrap();
        let oracles = doc.oracles();
        assert_eq!(oracles.len(), 1);
        let o = &oracles[0];
        assert_eq!(o.language, Some(Language::JavaScript));
        assert_eq!(o.findings.len(), 2);
        assert_eq!(o.findings[0].anchor.symbol.as_deref(), Some("queryDatabase"));
        assert_eq!(
            o.findings[0].anchor.columns,
            Some(ColumnRange { start: 5, end: 60 })
        );
        // severity defaults to warning when omitted
        assert_eq!(o.findings[1].severity, Severity::Warning);
    }

    #[test]
    fn reserialized_document_reloads_identically() {
        let doc = OracleDocument::from_json(SINGLE).unwrap();
        let text = doc.to_json_pretty().unwrap();
        let again = OracleDocument::from_json(&text).unwrap();
        assert_eq!(doc, again);
        assert!(matches!(again, OracleDocument::Single(_)));
    }

    #[test]
    fn envelope_form_is_preserved() {
        let text = format!(r#"{{"oracles": [{SINGLE}]}}"#);
        let doc = OracleDocument::from_json(&text).unwrap();
        assert!(matches!(doc, OracleDocument::Many { .. }));
        let again = OracleDocument::from_json(&doc.to_json_pretty().unwrap()).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn duplicate_class_and_anchor_collapse() {
        let text = r#"{
            "fixture_id": "dup",
            "files": ["a.rb"],
            "content_hash": "sha256:00",
            "findings": [
                {"class": "sql-injection", "file": "a.rb", "line": 3, "rationale": "first"},
                {"class": "sql-injection", "file": "a.rb", "line": 3, "rationale": "second"},
                {"class": "xss", "file": "a.rb", "line": 3}
            ]
        }"#;
        let doc = OracleDocument::from_json(text).unwrap();
        let findings = &doc.oracles()[0].findings;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].rationale, "first");
    }

    #[test]
    fn unknown_class_is_a_parse_error() {
        let text = r#"{"fixture_id": "x", "files": ["a.js"], "content_hash": "h",
            "findings": [{"class": "sqli", "file": "a.js", "line": 1}]}"#;
        let err = OracleDocument::from_json(text).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
