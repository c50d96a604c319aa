use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Integrity(#[from] CorpusIntegrityError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Every violation found while loading a corpus. Loading is all-or-nothing:
/// one violation fails the whole corpus.
#[derive(Debug, Clone, Error, Serialize)]
#[error("corpus integrity check failed with {} violation(s)", violations.len())]
pub struct CorpusIntegrityError {
    pub violations: Vec<IntegrityViolation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IntegrityViolation {
    #[error("{oracle}: malformed oracle document: {message}")]
    MalformedOracle { oracle: PathBuf, message: String },

    #[error("cannot search {path} for oracles: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("fixture '{fixture_id}' references missing file {path}")]
    MissingFixture { fixture_id: String, path: PathBuf },

    #[error("fixture '{fixture_id}' path {path} escapes the corpus root")]
    PathEscapesRoot { fixture_id: String, path: PathBuf },

    #[error("fixture '{fixture_id}' lists no files")]
    EmptyFixture { fixture_id: String },

    #[error("fixture '{fixture_id}' has no language tag and none can be inferred from {path}")]
    UnknownLanguage { fixture_id: String, path: PathBuf },

    #[error("fixture '{fixture_id}' finding references {file}, which is not one of its files")]
    FileNotInFixture { fixture_id: String, file: PathBuf },

    #[error("fixture '{fixture_id}' anchor {file}:{line} is invalid: {reason}")]
    AnchorOutOfRange {
        fixture_id: String,
        file: PathBuf,
        line: u32,
        reason: String,
    },

    #[error("fixture '{fixture_id}' is stale: oracle records {recorded}, content hashes to {actual}")]
    StaleHash {
        fixture_id: String,
        recorded: String,
        actual: String,
    },

    #[error("fixture id '{fixture_id}' is claimed by both {first} and {second}")]
    DuplicateFixtureId {
        fixture_id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("file {path} is claimed by fixtures '{first_id}' and '{second_id}'")]
    DuplicateFixturePath {
        path: PathBuf,
        first_id: String,
        second_id: String,
    },
}
