use crate::config::MappingConfig;
use crate::error::{Error, Result};
use crate::taxonomy::VulnerabilityClass;
use fancy_regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use VulnerabilityClass::*;

/// Rule ids from the scanners the fixtures were written against
/// (ESLint + eslint-plugin-security, Brakeman, Bandit, gosec).
const BUILTIN_TABLE: &[(&str, VulnerabilityClass)] = &[
    // eslint
    ("no-eval", CodeInjection),
    ("no-implied-eval", CodeInjection),
    ("no-new-func", CodeInjection),
    ("no-proto", PrototypePollution),
    ("security/detect-eval-with-expression", CodeInjection),
    ("security/detect-child-process", CommandInjection),
    ("security/detect-non-literal-fs-filename", PathTraversal),
    ("security/detect-object-injection", PrototypePollution),
    ("security/detect-possible-timing-attacks", TimingAttack),
    ("security/detect-pseudorandombytes", InsecureRandomness),
    ("security/detect-no-csrf-before-method-override", Csrf),
    ("no-unsanitized/property", Xss),
    ("no-unsanitized/method", Xss),
    // brakeman
    ("command injection", CommandInjection),
    ("sql injection", SqlInjection),
    ("file access", PathTraversal),
    ("cross-site scripting", Xss),
    ("cross-site request forgery", Csrf),
    ("remote code execution", InsecureDeserialization),
    ("deserialize", InsecureDeserialization),
    ("mass assignment", MassAssignment),
    ("attribute restriction", MassAssignment),
    ("redirect", OpenRedirect),
    ("dangerous eval", CodeInjection),
    ("weak hash", WeakHash),
    ("xml", Xxe),
    // rubocop
    ("security/eval", CodeInjection),
    ("security/open", CommandInjection),
    ("security/iomethods", CommandInjection),
    ("security/marshalload", InsecureDeserialization),
    ("security/yamlload", InsecureDeserialization),
    ("security/jsonload", InsecureDeserialization),
    // bandit
    ("b105", HardcodedCredential),
    ("b106", HardcodedCredential),
    ("b107", HardcodedCredential),
    ("b103", InsecureFilePermission),
    ("b301", InsecureDeserialization),
    ("b302", InsecureDeserialization),
    ("b506", InsecureDeserialization),
    ("b303", WeakHash),
    ("b324", WeakHash),
    ("b307", CodeInjection),
    ("b311", InsecureRandomness),
    ("b608", SqlInjection),
    // gosec
    ("g101", HardcodedCredential),
    ("g201", SqlInjection),
    ("g202", SqlInjection),
    ("g204", CommandInjection),
    ("g302", InsecureFilePermission),
    ("g306", InsecureFilePermission),
    ("g304", PathTraversal),
    ("g401", WeakHash),
    ("g501", WeakHash),
    ("g404", InsecureRandomness),
];

const BUILTIN_PATTERNS: &[(&str, VulnerabilityClass)] = &[
    // bandit subprocess/shell family
    (r"(?i)^b60[2-7]$", CommandInjection),
    // bandit xml parsers
    (r"(?i)^b3(1[3-9]|20)$", Xxe),
];

/// A string the adapter reported that no mapping entry recognises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownClassWarning {
    pub fixture_id: String,
    pub scanner_id: String,
    pub raw_class: String,
    pub file: PathBuf,
    pub line: u32,
}

/// Adapter class-string → taxonomy. Exact keys (case-insensitive) are tried
/// before patterns; patterns are tried in order, user patterns first.
#[derive(Debug, Clone)]
pub struct ClassMapping {
    exact: BTreeMap<String, VulnerabilityClass>,
    patterns: Vec<(Regex, VulnerabilityClass)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingTable {
    pub exact: BTreeMap<String, VulnerabilityClass>,
    pub patterns: Vec<(String, VulnerabilityClass)>,
}

impl ClassMapping {
    pub fn builtin() -> Self {
        let mut exact: BTreeMap<String, VulnerabilityClass> = VulnerabilityClass::ALL
            .iter()
            .map(|c| (c.id().to_string(), *c))
            .collect();
        for (key, class) in BUILTIN_TABLE {
            exact.insert(key.to_ascii_lowercase(), *class);
        }
        let patterns = BUILTIN_PATTERNS
            .iter()
            .filter_map(|(p, c)| Regex::new(p).ok().map(|r| (r, *c)))
            .collect();
        Self { exact, patterns }
    }

    /// Built-in table overlaid with the configured entries.
    pub fn from_config(config: &MappingConfig) -> Result<Self> {
        let mut mapping = Self::builtin();
        for (key, class) in &config.classes {
            mapping.exact.insert(key.trim().to_ascii_lowercase(), *class);
        }
        let mut user = Vec::with_capacity(config.patterns.len());
        for rule in &config.patterns {
            let regex = Regex::new(&rule.pattern).map_err(|e| {
                Error::config(format!("invalid mapping pattern '{}': {e}", rule.pattern))
            })?;
            user.push((regex, rule.class));
        }
        user.append(&mut mapping.patterns);
        mapping.patterns = user;
        Ok(mapping)
    }

    pub fn resolve(&self, raw: &str) -> Option<VulnerabilityClass> {
        let key = raw.trim().to_ascii_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(class) = self.exact.get(&key) {
            return Some(*class);
        }
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(raw.trim()).unwrap_or(false))
            .map(|(_, class)| *class)
    }

    /// The full table, for auditing.
    pub fn table(&self) -> MappingTable {
        MappingTable {
            exact: self.exact.clone(),
            patterns: self
                .patterns
                .iter()
                .map(|(re, class)| (re.as_str().to_string(), *class))
                .collect(),
        }
    }
}
