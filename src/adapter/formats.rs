//! Parsers for the output formats an adapter command may emit.
//!
//! Every format is a JSON document, so empty stdout is malformed rather than
//! "no findings". A finding without a class-string is malformed too. Line
//! numbers are required except for Brakeman, which reports some
//! controller-wide warnings without one; those come back with `line: None`.

use super::{AdapterFailure, RawFinding};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[RawFinding]` or `{"findings": [RawFinding]}`.
    #[default]
    Native,
    Eslint,
    Brakeman,
    Bandit,
    Rubocop,
    Gosec,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "eslint" => Ok(Self::Eslint),
            "brakeman" => Ok(Self::Brakeman),
            "bandit" => Ok(Self::Bandit),
            "rubocop" => Ok(Self::Rubocop),
            "gosec" => Ok(Self::Gosec),
            other => Err(format!(
                "unknown output format '{other}' (expected native, eslint, brakeman, bandit, rubocop or gosec)"
            )),
        }
    }
}

pub fn parse(format: OutputFormat, output: &str) -> Result<Vec<RawFinding>, AdapterFailure> {
    if output.trim().is_empty() {
        return Err(AdapterFailure::malformed(format!(
            "adapter printed nothing; {format:?} output is a JSON document even when clean"
        )));
    }
    match format {
        OutputFormat::Native => parse_native(output),
        OutputFormat::Eslint => parse_eslint(output),
        OutputFormat::Brakeman => parse_brakeman(output),
        OutputFormat::Bandit => parse_bandit(output),
        OutputFormat::Rubocop => parse_rubocop(output),
        OutputFormat::Gosec => parse_gosec(output),
    }
}

fn parse_native(output: &str) -> Result<Vec<RawFinding>, AdapterFailure> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Native {
        List(Vec<RawFinding>),
        Wrapped { findings: Vec<RawFinding> },
    }
    let findings = match serde_json::from_str::<Native>(output) {
        Ok(Native::List(findings)) | Ok(Native::Wrapped { findings }) => findings,
        Err(e) => {
            return Err(AdapterFailure::malformed(format!(
                "expected a finding list: {e}; output starts with: {}",
                preview(output)
            )));
        }
    };
    for (idx, f) in findings.iter().enumerate() {
        if f.class.trim().is_empty() {
            return Err(AdapterFailure::malformed(format!("finding {} has an empty class", idx + 1)));
        }
        if matches!(f.line, None | Some(0)) {
            return Err(AdapterFailure::malformed(format!(
                "finding {} ({}) has no line",
                idx + 1,
                f.class
            )));
        }
    }
    Ok(findings)
}

fn parse_eslint(output: &str) -> Result<Vec<RawFinding>, AdapterFailure> {
    // eslint can print warnings ahead of the report; fall back to the
    // outermost JSON array.
    let data: Value = match serde_json::from_str(output) {
        Ok(v) => v,
        Err(_) => {
            let start = output.find('[');
            let end = output.rfind(']');
            match (start, end) {
                (Some(s), Some(e)) if s < e => serde_json::from_str(&output[s..=e])
                    .map_err(|e| AdapterFailure::malformed(format!("eslint output: {e}")))?,
                _ => {
                    return Err(AdapterFailure::malformed(format!(
                        "eslint output is not JSON: {}",
                        preview(output)
                    )));
                }
            }
        }
    };

    let files = match &data {
        Value::Array(files) => files.as_slice(),
        Value::Object(obj) => obj
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .ok_or_else(|| AdapterFailure::malformed("eslint object without 'results'"))?,
        _ => return Err(AdapterFailure::malformed("eslint output is not a list")),
    };

    let mut findings = Vec::new();
    for file in files {
        let path = file.get("filePath").and_then(Value::as_str).unwrap_or("");
        let messages = file
            .get("messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for msg in messages {
            // Parse errors carry no ruleId; they are not findings.
            let Some(rule) = msg.get("ruleId").and_then(Value::as_str) else {
                continue;
            };
            let severity = match msg.get("severity").and_then(Value::as_u64) {
                Some(2) => "critical",
                Some(1) => "warning",
                _ => "info",
            };
            findings.push(RawFinding {
                id: None,
                class: required_class("eslint", Some(rule))?,
                file: PathBuf::from(path),
                line: Some(required_line("eslint", rule, msg.get("line"))?),
                column: msg.get("column").and_then(Value::as_u64).map(clamp_u32),
                end_column: msg.get("endColumn").and_then(Value::as_u64).map(clamp_u32),
                symbol: None,
                severity: Some(severity.into()),
                message: msg.get("message").and_then(Value::as_str).map(String::from),
            });
        }
    }
    Ok(findings)
}

fn parse_brakeman(output: &str) -> Result<Vec<RawFinding>, AdapterFailure> {
    let data: Value = serde_json::from_str(output)
        .map_err(|e| AdapterFailure::malformed(format!("brakeman output: {e}")))?;
    let warnings = data
        .get("warnings")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterFailure::malformed("brakeman output without 'warnings'"))?;

    warnings
        .iter()
        .map(|w| -> Result<RawFinding, AdapterFailure> {
            let class = required_class("brakeman", w.get("warning_type").and_then(Value::as_str))?;
            // controller-wide warnings (CSRF, mass assignment settings) carry
            // "line": null
            let line = match w.get("line") {
                None | Some(Value::Null) => None,
                Some(v) => Some(required_line("brakeman", &class, Some(v))?),
            };
            Ok(RawFinding {
                id: w
                    .get("fingerprint")
                    .and_then(Value::as_str)
                    .map(String::from),
                class,
                file: PathBuf::from(w.get("file").and_then(Value::as_str).unwrap_or("")),
                line,
                column: None,
                end_column: None,
                symbol: w
                    .get("location")
                    .and_then(|l| l.get("method"))
                    .and_then(Value::as_str)
                    .map(String::from),
                // brakeman only reports security issues
                severity: Some("critical".into()),
                message: w.get("message").and_then(Value::as_str).map(String::from),
            })
        })
        .collect()
}

fn parse_bandit(output: &str) -> Result<Vec<RawFinding>, AdapterFailure> {
    let data: Value = serde_json::from_str(output)
        .map_err(|e| AdapterFailure::malformed(format!("bandit output: {e}")))?;
    let results = data
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterFailure::malformed("bandit output without 'results'"))?;

    results
        .iter()
        .map(|r| -> Result<RawFinding, AdapterFailure> {
            let class = required_class("bandit", r.get("test_id").and_then(Value::as_str))?;
            Ok(RawFinding {
                id: None,
                line: Some(required_line("bandit", &class, r.get("line_number"))?),
                class,
                file: PathBuf::from(r.get("filename").and_then(Value::as_str).unwrap_or("")),
                // bandit columns are 0-based
                column: r
                    .get("col_offset")
                    .and_then(Value::as_u64)
                    .map(|c| clamp_u32(c + 1)),
                end_column: None,
                symbol: None,
                severity: r
                    .get("issue_severity")
                    .and_then(Value::as_str)
                    .map(str::to_ascii_lowercase),
                message: r.get("issue_text").and_then(Value::as_str).map(String::from),
            })
        })
        .collect()
}

fn parse_rubocop(output: &str) -> Result<Vec<RawFinding>, AdapterFailure> {
    let data: Value = serde_json::from_str(output)
        .map_err(|e| AdapterFailure::malformed(format!("rubocop output: {e}")))?;
    let files = data
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterFailure::malformed("rubocop output without 'files'"))?;

    let mut findings = Vec::new();
    for file in files {
        let path = file.get("path").and_then(Value::as_str).unwrap_or("");
        let offenses = file
            .get("offenses")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for offense in offenses {
            let class = required_class("rubocop", offense.get("cop_name").and_then(Value::as_str))?;
            let location = offense.get("location");
            let line = location.and_then(|l| l.get("start_line").or_else(|| l.get("line")));
            let severity = match offense.get("severity").and_then(Value::as_str) {
                Some("fatal" | "error") => "critical",
                Some("warning") => "warning",
                _ => "info",
            };
            findings.push(RawFinding {
                id: None,
                line: Some(required_line("rubocop", &class, line)?),
                class,
                file: PathBuf::from(path),
                column: location
                    .and_then(|l| l.get("start_column").or_else(|| l.get("column")))
                    .and_then(Value::as_u64)
                    .map(clamp_u32),
                end_column: location
                    .and_then(|l| l.get("last_column"))
                    .and_then(Value::as_u64)
                    .map(clamp_u32),
                symbol: None,
                severity: Some(severity.into()),
                message: offense.get("message").and_then(Value::as_str).map(String::from),
            });
        }
    }
    Ok(findings)
}

fn parse_gosec(output: &str) -> Result<Vec<RawFinding>, AdapterFailure> {
    let data: Value = serde_json::from_str(output)
        .map_err(|e| AdapterFailure::malformed(format!("gosec output: {e}")))?;
    let issues = data
        .get("Issues")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterFailure::malformed("gosec output without 'Issues'"))?;

    issues
        .iter()
        .map(|i| -> Result<RawFinding, AdapterFailure> {
            let class = required_class("gosec", i.get("rule_id").and_then(Value::as_str))?;
            Ok(RawFinding {
                id: None,
                line: Some(required_line("gosec", &class, i.get("line"))?),
                column: i.get("column").and_then(leading_number),
                class,
                file: PathBuf::from(i.get("file").and_then(Value::as_str).unwrap_or("")),
                end_column: None,
                symbol: None,
                severity: i
                    .get("severity")
                    .and_then(Value::as_str)
                    .map(str::to_ascii_lowercase),
                message: i.get("details").and_then(Value::as_str).map(String::from),
            })
        })
        .collect()
}

fn required_class(tool: &str, class: Option<&str>) -> Result<String, AdapterFailure> {
    match class.map(str::trim) {
        Some(c) if !c.is_empty() => Ok(c.to_string()),
        _ => Err(AdapterFailure::malformed(format!("{tool} finding without a rule id"))),
    }
}

fn required_line(tool: &str, class: &str, value: Option<&Value>) -> Result<u32, AdapterFailure> {
    value
        .and_then(leading_number)
        .filter(|line| *line > 0)
        .ok_or_else(|| {
            AdapterFailure::malformed(format!(
                "{tool} finding {class} has no usable line: {}",
                value.map_or_else(|| "missing".to_string(), Value::to_string)
            ))
        })
}

/// A JSON number, or a string starting with one. gosec reports lines as
/// strings and multi-line spans as `"12-14"`.
fn leading_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(clamp_u32),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok().map(clamp_u32)
        }
        _ => None,
    }
}

fn clamp_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn preview(output: &str) -> String {
    output.chars().take(200).collect()
}
