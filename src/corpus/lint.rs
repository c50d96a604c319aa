use std::path::{Path, PathBuf};

/// Lint configuration files a fixture may assume. They identify a
/// rule-set/language mode and are handed to the adapter untouched.
const LINT_CONFIG_NAMES: &[&str] = &[
    "eslint.config.js",
    "eslint.config.mjs",
    ".eslintrc.js",
    ".eslintrc.cjs",
    ".eslintrc.json",
    ".eslintrc",
    ".rubocop.yml",
    "tsconfig.json",
];

/// Nearest lint configuration between the directory holding `file` and the
/// corpus root (inclusive). `file` is relative to `root`; so is the result.
pub fn discover(root: &Path, file: &Path) -> Option<PathBuf> {
    let mut dir = file.parent();
    loop {
        let rel = dir.unwrap_or(Path::new(""));
        for name in LINT_CONFIG_NAMES {
            let candidate = rel.join(name);
            if root.join(&candidate).is_file() {
                return Some(candidate);
            }
        }
        if rel.as_os_str().is_empty() {
            return None;
        }
        dir = rel.parent();
    }
}
