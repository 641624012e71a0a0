//! Semgrep scanner.
//!
//! Runs `semgrep scan` against one artifact, keeping the JSON, text and
//! SARIF reports next to each other under the raw-output directory. The
//! JSON report is the one parsed into findings.

use std::path::{Component, Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{RawFinding, ScanError, ScanResult, ScanTarget, Scanner};
use crate::core::ScannerConfig;

/// Semgrep JSON report.
#[derive(Debug, Deserialize)]
struct SemgrepReport {
    #[serde(default)]
    results: Vec<SemgrepResult>,

    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SemgrepResult {
    check_id: String,
    path: String,
    start: SemgrepPosition,
    end: SemgrepPosition,
    #[serde(default)]
    extra: SemgrepExtra,
}

#[derive(Debug, Deserialize)]
struct SemgrepPosition {
    line: u32,
}

#[derive(Debug, Default, Deserialize)]
struct SemgrepExtra {
    #[serde(default)]
    lines: String,

    #[serde(default)]
    message: String,
}

/// Scanner backed by the `semgrep` CLI.
#[derive(Debug, Clone)]
pub struct SemgrepScanner {
    /// Executable to run
    program: String,

    /// Extra arguments placed before the target
    extra_args: Vec<String>,
}

impl SemgrepScanner {
    /// Create a scanner from configuration.
    pub fn new(config: &ScannerConfig) -> Self {
        Self { program: config.program.clone(), extra_args: config.extra_args.clone() }
    }

    /// Build the command line for a target.
    fn command(&self, target: &ScanTarget<'_>, ruleset: &str) -> Command {
        let report = |ext: &str| with_extension(target.output_base, ext);

        let mut command = Command::new(&self.program);
        command
            .arg("scan")
            .arg("--config")
            .arg(ruleset)
            .arg("--json-output")
            .arg(report("json"))
            .arg("--text-output")
            .arg(report("txt"))
            .arg("--sarif-output")
            .arg(report("sarif"))
            .arg("--no-git-ignore")
            .arg("--quiet")
            .args(&self.extra_args)
            .arg(target.path);
        command
    }
}

impl Scanner for SemgrepScanner {
    fn name(&self) -> &str {
        "semgrep"
    }

    fn scan(&self, target: &ScanTarget<'_>, ruleset: &str) -> ScanResult<Vec<RawFinding>> {
        if !target.path.is_dir() {
            return Err(ScanError::Target(format!("{} is not a directory", target.path.display())));
        }

        if let Some(parent) = target.output_base.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let output = self
            .command(target, ruleset)
            .output()
            .map_err(|source| ScanError::Spawn { program: self.program.clone(), source })?;

        if !output.status.success() {
            return Err(ScanError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let json = std::fs::read_to_string(with_extension(target.output_base, "json"))?;
        let findings = parse_report(&json, target.path)?;

        debug!(
            slug = target.slug,
            version = target.version,
            findings = findings.len(),
            "Semgrep analysis completed"
        );

        Ok(findings)
    }
}

/// Parse a semgrep JSON report.
///
/// Paths are made relative to `root` when semgrep reports them under it.
pub fn parse_report(json: &str, root: &Path) -> ScanResult<Vec<RawFinding>> {
    let report: SemgrepReport = serde_json::from_str(json)?;

    if !report.errors.is_empty() {
        warn!(errors = report.errors.len(), root = %root.display(), "Semgrep reported errors");
    }

    Ok(report
        .results
        .into_iter()
        .map(|result| RawFinding {
            path: relative_path(&result.path, root),
            check_id: result.check_id,
            start_line: result.start.line,
            end_line: result.end.line,
            lines: result.extra.lines,
            message: result.extra.message,
        })
        .collect())
}

/// Make a reported path relative to the artifact root.
///
/// Semgrep echoes the target the way it was spelled on the command line,
/// minus any leading `./`, so both sides are compared without `.`
/// components and then, if that fails, in canonical form.
fn relative_path(path: &str, root: &Path) -> String {
    let reported = Path::new(path);

    let stripped = normalize(reported)
        .strip_prefix(normalize(root))
        .map(Path::to_path_buf)
        .ok()
        .or_else(|| {
            let reported = reported.canonicalize().ok()?;
            let root = root.canonicalize().ok()?;
            reported.strip_prefix(root).map(Path::to_path_buf).ok()
        });

    match stripped {
        Some(relative) => relative.to_string_lossy().into_owned(),
        None => path.to_string(),
    }
}

/// Drop `.` components so `./plugins/x` and `plugins/x` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}

/// Append an extension without replacing dots already in the file name.
fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
