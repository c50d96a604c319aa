use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const HASH_PREFIX: &str = "sha256:";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content hash of a fixture.
///
/// A single file hashes to its own digest. Multiple files hash to the digest
/// of a manifest of `"<path>\t<digest>\n"` lines sorted by path, so the hash
/// does not depend on the order files are listed in.
pub fn content_hash(files: &[(PathBuf, Vec<u8>)]) -> String {
    if let [(_, bytes)] = files {
        return format!("{HASH_PREFIX}{}", sha256_hex(bytes));
    }

    let mut entries: Vec<(String, String)> = files
        .iter()
        .map(|(path, bytes)| (slash_path(path), sha256_hex(bytes)))
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (path, digest) in &entries {
        hasher.update(path.as_bytes());
        hasher.update(b"\t");
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    format!("{HASH_PREFIX}{:x}", hasher.finalize())
}

pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Byte length of every line in a fixture file. A trailing newline does not
/// start a new line; `\r` before `\n` is not counted.
#[derive(Debug, Clone)]
pub struct LineIndex {
    lengths: Vec<usize>,
}

impl LineIndex {
    pub fn new(bytes: &[u8]) -> Self {
        let mut lengths: Vec<usize> = bytes
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line).len())
            .collect();
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            lengths.pop();
        }
        Self { lengths }
    }

    pub fn line_count(&self) -> usize {
        self.lengths.len()
    }

    /// Byte length of a 1-based line.
    pub fn line_len(&self, line: u32) -> Option<usize> {
        let idx = usize::try_from(line).ok()?.checked_sub(1)?;
        self.lengths.get(idx).copied()
    }
}
