use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Language-agnostic vulnerability tag. The kebab-case id is the stable
/// identifier used in oracle files, mapping tables and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VulnerabilityClass {
    CommandInjection,
    CodeInjection,
    SqlInjection,
    PathTraversal,
    Xss,
    InsecureDeserialization,
    WeakHash,
    HardcodedCredential,
    Csrf,
    OpenRedirect,
    TimingAttack,
    PrototypePollution,
    InsecureRandomness,
    MassAssignment,
    Xxe,
    InsecureFilePermission,
}

impl VulnerabilityClass {
    pub const ALL: &'static [VulnerabilityClass] = &[
        Self::CommandInjection,
        Self::CodeInjection,
        Self::SqlInjection,
        Self::PathTraversal,
        Self::Xss,
        Self::InsecureDeserialization,
        Self::WeakHash,
        Self::HardcodedCredential,
        Self::Csrf,
        Self::OpenRedirect,
        Self::TimingAttack,
        Self::PrototypePollution,
        Self::InsecureRandomness,
        Self::MassAssignment,
        Self::Xxe,
        Self::InsecureFilePermission,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::CommandInjection => "command-injection",
            Self::CodeInjection => "code-injection",
            Self::SqlInjection => "sql-injection",
            Self::PathTraversal => "path-traversal",
            Self::Xss => "xss",
            Self::InsecureDeserialization => "insecure-deserialization",
            Self::WeakHash => "weak-hash",
            Self::HardcodedCredential => "hardcoded-credential",
            Self::Csrf => "csrf",
            Self::OpenRedirect => "open-redirect",
            Self::TimingAttack => "timing-attack",
            Self::PrototypePollution => "prototype-pollution",
            Self::InsecureRandomness => "insecure-randomness",
            Self::MassAssignment => "mass-assignment",
            Self::Xxe => "xxe",
            Self::InsecureFilePermission => "insecure-file-permission",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.id().eq_ignore_ascii_case(id))
    }
}

impl std::fmt::Display for VulnerabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for VulnerabilityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| format!("unknown vulnerability class '{s}'"))
    }
}

/// Ordered `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl Severity {
    /// Lenient parse of the severity vocabularies scanners emit
    /// ("error", "high", "LOW", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "info" | "low" | "note" | "hint" => Some(Self::Info),
            "warning" | "warn" | "medium" | "moderate" => Some(Self::Warning),
            "critical" | "error" | "high" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Ruby,
    Python,
    Go,
}

/// Project marker files, strongest indicator first.
const PROJECT_MARKERS: &[(&str, Language)] = &[
    ("tsconfig.json", Language::TypeScript),
    ("package.json", Language::JavaScript),
    ("requirements.txt", Language::Python),
    ("go.mod", Language::Go),
    ("Gemfile", Language::Ruby),
];

impl Language {
    pub const ALL: &'static [Language] = &[
        Self::JavaScript,
        Self::TypeScript,
        Self::Ruby,
        Self::Python,
        Self::Go,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Ruby => "ruby",
            Self::Python => "python",
            Self::Go => "go",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "ruby" | "rb" => Some(Self::Ruby),
            "python" | "py" => Some(Self::Python),
            "go" | "golang" => Some(Self::Go),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "rb" | "erb" | "rake" => Some(Self::Ruby),
            "py" => Some(Self::Python),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Detect a project's language from marker files in `dir`, falling back
    /// to the first recognised source file extension (TypeScript wins over
    /// JavaScript when both are present).
    pub fn detect_project(dir: &Path) -> Option<Self> {
        if let Some((_, lang)) = PROJECT_MARKERS
            .iter()
            .find(|(marker, _)| dir.join(marker).is_file())
        {
            return Some(*lang);
        }

        let mut names: Vec<_> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        names.sort();

        let found: Vec<Language> = names.iter().filter_map(|p| Self::from_extension(p)).collect();
        if found.contains(&Self::TypeScript) {
            return Some(Self::TypeScript);
        }
        found.first().copied()
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| {
            let supported: Vec<&str> = Self::ALL.iter().map(|l| l.tag()).collect();
            format!(
                "unsupported language '{s}' (supported: {})",
                supported.join(", ")
            )
        })
    }
}
