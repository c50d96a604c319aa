pub mod hash;
pub mod lint;

use crate::error::{CorpusIntegrityError, Error, IntegrityViolation, Result};
use crate::oracle::{Oracle, OracleDocument};
use crate::taxonomy::Language;
use hash::LineIndex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const ORACLE_SUFFIX: &str = ".oracle.json";

/// Directories never searched for oracle files.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", "vendor"];

/// A validated fixture: its files exist, hash to the oracle's recorded value
/// and every oracle anchor resolves inside them.
#[derive(Debug, Clone, Serialize)]
pub struct Fixture {
    pub id: String,
    pub language: Language,
    /// Relative to the corpus root.
    pub files: Vec<PathBuf>,
    pub content_hash: String,
    pub lint_profile: Option<PathBuf>,
    pub oracle_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub fixture: Fixture,
    pub oracle: Oracle,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries in fixture id order.
    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn get(&self, fixture_id: &str) -> Option<&CorpusEntry> {
        self.entries.iter().find(|e| e.fixture.id == fixture_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn with_language(&self, language: Option<Language>) -> Vec<&CorpusEntry> {
        self.entries
            .iter()
            .filter(|e| language.is_none_or(|l| e.fixture.language == l))
            .collect()
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.entries.iter().map(|e| e.fixture.language).collect();
        langs.sort();
        langs.dedup();
        langs
    }
}

/// Load and validate every oracle under `root`.
///
/// All violations are collected before failing so one run reports the full
/// list, but any violation fails the whole corpus.
pub fn load_corpus(root: &Path) -> Result<Corpus> {
    let root = check_root(root)?;
    info!(root = %root.display(), "loading corpus");

    let (documents, mut violations) = read_oracle_documents(&root);
    let claimed: Vec<(&Path, &Oracle)> = documents
        .iter()
        .flat_map(|(path, doc)| doc.oracles().iter().map(move |o| (path.as_path(), o)))
        .collect();
    violations.extend(check_claims(&claimed));

    let mut entries = Vec::new();
    for &(oracle_path, oracle) in &claimed {
        let checked = inspect_fixture(&root, oracle, oracle_path);
        violations.extend(checked.violations);
        match checked.actual_hash {
            Some(actual) if actual != oracle.content_hash => {
                violations.push(IntegrityViolation::StaleHash {
                    fixture_id: oracle.fixture_id.clone(),
                    recorded: oracle.content_hash.clone(),
                    actual,
                });
            }
            _ => {}
        }
        if let Some(fixture) = checked.fixture {
            entries.push(CorpusEntry {
                fixture,
                oracle: oracle.clone(),
            });
        }
    }

    if !violations.is_empty() {
        for v in &violations {
            warn!(violation = %v, "corpus integrity");
        }
        return Err(CorpusIntegrityError { violations }.into());
    }

    if entries.is_empty() {
        warn!(root = %root.display(), "corpus contains no oracles");
    }
    entries.sort_by(|a, b| a.fixture.id.cmp(&b.fixture.id));
    info!(fixtures = entries.len(), "corpus loaded");
    Ok(Corpus { root, entries })
}

#[derive(Debug, Clone, Serialize)]
pub struct RehashedFixture {
    pub fixture_id: String,
    pub oracle_path: PathBuf,
    pub previous: String,
    pub current: String,
}

/// Recompute content hashes and rewrite oracle files whose recorded hash
/// changed. Every other integrity check still applies and still aborts.
pub fn rehash_corpus(root: &Path) -> Result<Vec<RehashedFixture>> {
    let root = check_root(root)?;
    let (mut documents, mut violations) = read_oracle_documents(&root);

    {
        let claimed: Vec<(&Path, &Oracle)> = documents
            .iter()
            .flat_map(|(path, doc)| doc.oracles().iter().map(move |o| (path.as_path(), o)))
            .collect();
        violations.extend(check_claims(&claimed));
    }

    let mut changed = Vec::new();
    for (oracle_path, doc) in documents.iter_mut() {
        let mut dirty = false;
        for oracle in doc.oracles_mut() {
            let checked = inspect_fixture(&root, oracle, oracle_path);
            violations.extend(checked.violations);
            match checked.actual_hash {
                Some(actual) if actual != oracle.content_hash => {
                    changed.push(RehashedFixture {
                        fixture_id: oracle.fixture_id.clone(),
                        oracle_path: oracle_path.clone(),
                        previous: std::mem::replace(&mut oracle.content_hash, actual.clone()),
                        current: actual,
                    });
                    dirty = true;
                }
                _ => {}
            }
        }
        if dirty {
            debug!(oracle = %oracle_path.display(), "oracle hash updated");
        }
    }

    if !violations.is_empty() {
        return Err(CorpusIntegrityError { violations }.into());
    }

    for (oracle_path, doc) in &documents {
        if changed.iter().any(|c| &c.oracle_path == oracle_path) {
            doc.save(oracle_path)?;
        }
    }
    info!(updated = changed.len(), "rehash complete");
    Ok(changed)
}

fn check_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(Error::config(format!(
            "corpus root {} is not a directory",
            root.display()
        )));
    }
    Ok(root.to_path_buf())
}

fn read_oracle_documents(root: &Path) -> (Vec<(PathBuf, OracleDocument)>, Vec<IntegrityViolation>) {
    let mut documents = Vec::new();
    let mut violations = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && SKIPPED_DIRS.iter().any(|d| e.file_name() == *d))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                violations.push(IntegrityViolation::Unreadable {
                    path: e.path().unwrap_or(root).to_path_buf(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();
        let named_oracle = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(ORACLE_SUFFIX));
        if !named_oracle {
            continue;
        }
        // symlinked oracles are read through the link
        if entry.path_is_symlink() {
            if !path.is_file() {
                violations.push(IntegrityViolation::Unreadable {
                    path: path.to_path_buf(),
                    message: "oracle symlink does not resolve to a file".into(),
                });
                continue;
            }
        } else if !entry.file_type().is_file() {
            continue;
        }
        match OracleDocument::load(path) {
            Ok(doc) => {
                debug!(oracle = %path.display(), count = doc.oracles().len(), "oracle document read");
                documents.push((path.to_path_buf(), doc));
            }
            Err(e) => violations.push(IntegrityViolation::MalformedOracle {
                oracle: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }
    (documents, violations)
}

/// Two oracles may not claim the same fixture id or the same file.
fn check_claims(claimed: &[(&Path, &Oracle)]) -> Vec<IntegrityViolation> {
    let mut violations = Vec::new();
    let mut ids: HashMap<&str, &Path> = HashMap::new();
    let mut files: HashMap<PathBuf, &str> = HashMap::new();

    for &(oracle_path, oracle) in claimed {
        if let Some(first) = ids.insert(oracle.fixture_id.as_str(), oracle_path) {
            violations.push(IntegrityViolation::DuplicateFixtureId {
                fixture_id: oracle.fixture_id.clone(),
                first: first.to_path_buf(),
                second: oracle_path.to_path_buf(),
            });
            continue;
        }
        for file in &oracle.files {
            let Some(norm) = normalize_relative(file) else {
                continue;
            };
            if let Some(first_id) = files.insert(norm.clone(), oracle.fixture_id.as_str()) {
                violations.push(IntegrityViolation::DuplicateFixturePath {
                    path: norm,
                    first_id: first_id.to_string(),
                    second_id: oracle.fixture_id.clone(),
                });
            }
        }
    }
    violations
}

struct Inspection {
    fixture: Option<Fixture>,
    actual_hash: Option<String>,
    violations: Vec<IntegrityViolation>,
}

/// Everything except the hash comparison, which callers do differently.
fn inspect_fixture(root: &Path, oracle: &Oracle, oracle_path: &Path) -> Inspection {
    let id = &oracle.fixture_id;
    let mut violations = Vec::new();

    if oracle.files.is_empty() {
        violations.push(IntegrityViolation::EmptyFixture {
            fixture_id: id.clone(),
        });
        return Inspection {
            fixture: None,
            actual_hash: None,
            violations,
        };
    }

    let mut files: Vec<PathBuf> = Vec::new();
    let mut contents: Vec<(PathBuf, Vec<u8>)> = Vec::new();
    let mut indexes: HashMap<PathBuf, LineIndex> = HashMap::new();

    for file in &oracle.files {
        let Some(rel) = normalize_relative(file) else {
            violations.push(IntegrityViolation::PathEscapesRoot {
                fixture_id: id.clone(),
                path: file.clone(),
            });
            continue;
        };
        match std::fs::read(root.join(&rel)) {
            Ok(bytes) => {
                indexes.insert(rel.clone(), LineIndex::new(&bytes));
                contents.push((rel.clone(), bytes));
            }
            Err(_) => violations.push(IntegrityViolation::MissingFixture {
                fixture_id: id.clone(),
                path: rel.clone(),
            }),
        }
        files.push(rel);
    }

    // explicit tag, then extension, then project markers beside the file
    let language = oracle
        .language
        .or_else(|| files.first().and_then(|f| Language::from_extension(f)))
        .or_else(|| {
            files
                .first()
                .and_then(|f| f.parent())
                .and_then(|dir| Language::detect_project(&root.join(dir)))
        });
    if language.is_none() {
        violations.push(IntegrityViolation::UnknownLanguage {
            fixture_id: id.clone(),
            path: oracle.files[0].clone(),
        });
    }

    for finding in &oracle.findings {
        let anchor = &finding.anchor;
        let Some(file) = normalize_relative(&anchor.file).filter(|f| files.contains(f)) else {
            violations.push(IntegrityViolation::FileNotInFixture {
                fixture_id: id.clone(),
                file: anchor.file.clone(),
            });
            continue;
        };
        // Missing files were already reported.
        let Some(index) = indexes.get(&file) else {
            continue;
        };
        if let Err(reason) = check_anchor(index, anchor.line, anchor.columns) {
            violations.push(IntegrityViolation::AnchorOutOfRange {
                fixture_id: id.clone(),
                file,
                line: anchor.line,
                reason,
            });
        }
    }

    let all_read = contents.len() == oracle.files.len();
    let actual_hash = all_read.then(|| hash::content_hash(&contents));

    let fixture = match (language, violations.is_empty()) {
        (Some(language), true) => Some(Fixture {
            id: id.clone(),
            language,
            lint_profile: lint::discover(root, &files[0]),
            files,
            content_hash: oracle.content_hash.clone(),
            oracle_path: oracle_path.to_path_buf(),
        }),
        _ => None,
    };

    Inspection {
        fixture,
        actual_hash,
        violations,
    }
}

fn check_anchor(
    index: &LineIndex,
    line: u32,
    columns: Option<crate::oracle::ColumnRange>,
) -> std::result::Result<(), String> {
    let Some(len) = index.line_len(line) else {
        return Err(format!(
            "line {line} outside 1..={}",
            index.line_count()
        ));
    };
    if let Some(cols) = columns {
        if cols.start == 0 || cols.end < cols.start {
            return Err(format!("column range {}..{} is empty or not 1-based", cols.start, cols.end));
        }
        let max_start = len.max(1);
        if cols.start as usize > max_start {
            return Err(format!(
                "column {} past end of line ({len} bytes)",
                cols.start
            ));
        }
    }
    Ok(())
}

/// Strip `.` components; reject absolute paths and `..`.
pub(crate) fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}
