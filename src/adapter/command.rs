use super::formats::{self, OutputFormat};
use super::{AdapterFailure, RawFinding, ScanRequest, ScannerAdapter};
use crate::config::{AdapterConfig, WorkingDir};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const STDERR_LIMIT: usize = 2000;

/// Runs an external scanner process per fixture and parses its stdout.
///
/// Argument placeholders: `{path}` (primary file, relative to the working
/// directory), `{abs_path}`, `{files}` (expands to one argument per file),
/// `{language}`, `{lint_config}` (argument dropped when the fixture has no
/// lint profile) and `{fixture_id}`.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
    command: String,
    args: Vec<String>,
    format: OutputFormat,
    success_exit_codes: Vec<i32>,
    working_dir: WorkingDir,
}

impl CommandAdapter {
    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        let command = config
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::config("adapter.command is not set"))?;
        Ok(Self {
            command: command.to_string(),
            args: config.args.clone(),
            format: config.format,
            success_exit_codes: config.success_exit_codes.clone(),
            working_dir: config.working_dir,
        })
    }

    fn cwd(&self, request: &ScanRequest, primary: &Path) -> PathBuf {
        match self.working_dir {
            WorkingDir::Corpus => request.corpus_root.clone(),
            WorkingDir::Fixture => request
                .absolute(primary)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| request.corpus_root.clone()),
        }
    }

    fn relative_path(&self, request: &ScanRequest, primary: &Path, rel: &Path) -> String {
        match self.working_dir {
            WorkingDir::Corpus => rel.display().to_string(),
            WorkingDir::Fixture => {
                let primary_dir = primary.parent().unwrap_or(Path::new(""));
                rel.strip_prefix(primary_dir)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| request.absolute(rel).display().to_string())
            }
        }
    }

    /// Expand placeholders into the final argument vector.
    pub fn expand_args(&self, request: &ScanRequest) -> std::result::Result<Vec<String>, AdapterFailure> {
        let primary = primary_file(request)?;
        let lint = request
            .lint_profile
            .as_ref()
            .map(|p| request.absolute(p).display().to_string());

        let mut out = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            if arg == "{files}" {
                out.extend(request.files.iter().map(|f| self.relative_path(request, primary, f)));
                continue;
            }
            if arg.contains("{lint_config}") && lint.is_none() {
                continue;
            }
            let expanded = arg
                .replace("{path}", &self.relative_path(request, primary, primary))
                .replace("{abs_path}", &request.absolute(primary).display().to_string())
                .replace("{language}", request.language.tag())
                .replace("{lint_config}", lint.as_deref().unwrap_or(""))
                .replace("{fixture_id}", &request.fixture_id);
            out.push(expanded);
        }
        Ok(out)
    }
}

fn primary_file(request: &ScanRequest) -> std::result::Result<&Path, AdapterFailure> {
    request.primary_file().ok_or_else(|| AdapterFailure::Spawn {
        message: format!("fixture '{}' lists no files", request.fixture_id),
    })
}

#[async_trait]
impl ScannerAdapter for CommandAdapter {
    fn name(&self) -> &str {
        &self.command
    }

    async fn scan(&self, request: &ScanRequest) -> std::result::Result<Vec<RawFinding>, AdapterFailure> {
        let args = self.expand_args(request)?;
        let cwd = self.cwd(request, primary_file(request)?);
        debug!(fixture = %request.fixture_id, command = %self.command, ?args, "running adapter");

        // Dropping the future (harness timeout) kills the process.
        let child = Command::new(&self.command)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdapterFailure::Spawn {
                message: format!("{}: {e}", self.command),
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AdapterFailure::Spawn {
                message: format!("waiting for {}: {e}", self.command),
            })?;

        let code = output.status.code();
        if !code.is_some_and(|c| self.success_exit_codes.contains(&c)) {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(STDERR_LIMIT)
                .collect();
            return Err(AdapterFailure::NonZeroExit {
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let findings = formats::parse(self.format, &stdout)?;
        debug!(fixture = %request.fixture_id, count = findings.len(), "adapter finished");
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::Language;

    fn request() -> ScanRequest {
        ScanRequest {
            fixture_id: "js-api".into(),
            language: Language::JavaScript,
            corpus_root: PathBuf::from("/corpus"),
            files: vec![PathBuf::from("js-test-app/api.js")],
            lint_profile: Some(PathBuf::from("js-test-app/.eslintrc.js")),
        }
    }

    fn adapter(args: &[&str], working_dir: WorkingDir) -> CommandAdapter {
        CommandAdapter::from_config(&AdapterConfig {
            command: Some("vibe-scan".into()),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir,
            ..AdapterConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn expands_placeholders_relative_to_corpus() {
        let a = adapter(
            &["--lang", "{language}", "--config", "{lint_config}", "{path}", "--id={fixture_id}"],
            WorkingDir::Corpus,
        );
        assert_eq!(
            a.expand_args(&request()).unwrap(),
            vec![
                "--lang",
                "javascript",
                "--config",
                "/corpus/js-test-app/.eslintrc.js",
                "js-test-app/api.js",
                "--id=js-api",
            ]
        );
    }

    #[test]
    fn fixture_working_dir_uses_file_names() {
        let a = adapter(&["{path}", "{abs_path}"], WorkingDir::Fixture);
        assert_eq!(
            a.expand_args(&request()).unwrap(),
            vec!["api.js", "/corpus/js-test-app/api.js"]
        );
        assert_eq!(
            a.cwd(&request(), Path::new("js-test-app/api.js")),
            PathBuf::from("/corpus/js-test-app")
        );
    }

    #[test]
    fn lint_arg_dropped_without_profile() {
        let mut req = request();
        req.lint_profile = None;
        let a = adapter(&["--config={lint_config}", "{files}"], WorkingDir::Corpus);
        assert_eq!(a.expand_args(&req).unwrap(), vec!["js-test-app/api.js"]);
    }

    #[tokio::test]
    async fn request_without_files_fails_before_spawning() {
        let a = adapter(&["{path}"], WorkingDir::Corpus);
        let mut req = request();
        req.files.clear();
        assert!(matches!(a.expand_args(&req), Err(AdapterFailure::Spawn { .. })));
        assert!(matches!(a.scan(&req).await, Err(AdapterFailure::Spawn { .. })));
    }

    #[test]
    fn missing_command_is_config_error() {
        let err = CommandAdapter::from_config(&AdapterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let a = CommandAdapter::from_config(&AdapterConfig {
            command: Some("sh".into()),
            args: vec!["-c".into(), "echo boom >&2; exit 3".into()],
            ..AdapterConfig::default()
        })
        .unwrap();
        let mut req = request();
        req.corpus_root = std::env::temp_dir();
        let err = a.scan(&req).await.unwrap_err();
        assert_eq!(
            err,
            AdapterFailure::NonZeroExit {
                code: Some(3),
                stderr: "boom".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn parses_stdout_of_successful_run() {
        let a = CommandAdapter::from_config(&AdapterConfig {
            command: Some("sh".into()),
            args: vec![
                "-c".into(),
                r#"echo '[{"class": "command-injection", "file": "js-test-app/api.js", "line": 8}]'; exit 1"#
                    .into(),
            ],
            success_exit_codes: vec![0, 1],
            ..AdapterConfig::default()
        })
        .unwrap();
        let mut req = request();
        req.corpus_root = std::env::temp_dir();
        let findings = a.scan(&req).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(8));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_failure() {
        let a = adapter(&[], WorkingDir::Corpus);
        let a = CommandAdapter {
            command: "definitely-not-a-real-binary-4821".into(),
            ..a
        };
        let mut req = request();
        req.corpus_root = std::env::temp_dir();
        let err = a.scan(&req).await.unwrap_err();
        assert!(matches!(err, AdapterFailure::Spawn { .. }));
    }
}
