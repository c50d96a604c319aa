pub mod adapter;
pub mod compare;
pub mod config;
pub mod corpus;
pub mod error;
pub mod oracle;
pub mod report;
pub mod runner;
pub mod taxonomy;

pub use adapter::{AdapterFailure, ReportedFinding, ScanRequest, ScannerAdapter};
pub use compare::{MatchOptions, Verdict, VerdictKind, compare};
pub use corpus::{Corpus, Fixture, load_corpus};
pub use error::{CorpusIntegrityError, Error, IntegrityViolation, Result};
pub use oracle::{Anchor, FindingInstance, Oracle};
pub use report::CorpusReport;
pub use runner::{RunOptions, run_corpus};
pub use taxonomy::{Language, Severity, VulnerabilityClass};
