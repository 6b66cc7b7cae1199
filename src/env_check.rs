//! Environment Check
//!
//! Verifies that the tools needed to build and train are installed and
//! recent enough, printing one line per requirement:
//!
//! ```text
//! [OK] rustc 1.79.0
//! [FAIL] cargo 1.60.0, please upgrade to >= 1.74
//! [FAIL] cargo not found. Please install cargo >= 1.74
//! ```
//!
//! Requirements use `requirements.txt` syntax: one `name >= version` per
//! line, `#` starts a comment, blank lines are ignored.
//!
//! Installed versions are discovered through a [`VersionProbe`]. The default
//! [`CommandProbe`] runs `<tool> --version`; tests substitute a fixed table.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use tracing::debug;

/// Toolchain requirements checked by [`main`]
pub const REQUIREMENTS: &str = "\
# Toolchain needed to build and train
rustc >= 1.74
cargo >= 1.74
";

/// A dotted numeric version; missing trailing components compare as zero
#[derive(Clone, Debug, Eq)]
pub struct Version(Vec<u64>);

impl Version {
    /// Parse `1.74` or `1.79.0`; pre-release and build suffixes
    /// (`-nightly`, `+build`) are ignored
    pub fn parse(text: &str) -> Option<Self> {
        let core = text.split(['-', '+']).next()?;
        if core.is_empty() {
            return None;
        }
        core.split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()
            .map(Version)
    }

    fn component(&self, i: usize) -> u64 {
        self.0.get(i).copied().unwrap_or(0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// First whitespace-separated token that parses as a version
///
/// `rustc 1.79.0 (129f3b996 2024-06-10)` → `1.79.0`
pub fn extract_version(text: &str) -> Option<Version> {
    text.split_whitespace()
        .filter(|token| token.contains('.'))
        .find_map(Version::parse)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Requirement {
    pub name: String,
    pub min_version: Version,
}

/// Parse `requirements.txt`-style text
///
/// A line that is neither blank, a comment, nor `name >= version` is a
/// configuration error.
pub fn parse_requirements(text: &str) -> Result<Vec<Requirement>> {
    let mut requirements = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let malformed = || Error::config(format!("requirement line {}: {:?}", lineno + 1, raw));
        let (name, version) = line.split_once(">=").ok_or_else(malformed)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(malformed());
        }
        let min_version = Version::parse(version.trim()).ok_or_else(malformed)?;

        requirements.push(Requirement {
            name: name.to_string(),
            min_version,
        });
    }
    Ok(requirements)
}

/// Looks up the installed version of a tool
pub trait VersionProbe {
    /// `None` when the tool is not installed or its version is unreadable
    fn installed_version(&self, name: &str) -> Option<Version>;
}

/// Runs `<tool> --version`
///
/// The program can be overridden through an environment variable named
/// after the tool in upper case (`RUSTC`, `CARGO`), the same variables
/// cargo itself honours.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandProbe;

impl VersionProbe for CommandProbe {
    fn installed_version(&self, name: &str) -> Option<Version> {
        let program = std::env::var(name.to_uppercase()).unwrap_or_else(|_| name.to_string());
        let output = match Command::new(&program).arg("--version").output() {
            Ok(output) => output,
            Err(e) => {
                debug!(program = %program, error = %e, "version probe failed");
                return None;
            }
        };
        if !output.status.success() {
            debug!(program = %program, status = %output.status, "version probe exited with error");
            return None;
        }
        extract_version(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Fixed name → version table
impl VersionProbe for HashMap<String, Version> {
    fn installed_version(&self, name: &str) -> Option<Version> {
        self.get(name).cloned()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CheckStatus {
    Ok(Version),
    Outdated(Version),
    Missing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckResult {
    pub requirement: Requirement,
    pub status: CheckStatus,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        matches!(self.status, CheckStatus::Ok(_))
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.requirement.name;
        let min = &self.requirement.min_version;
        match &self.status {
            CheckStatus::Ok(version) => write!(f, "[OK] {} {}", name, version),
            CheckStatus::Outdated(version) => {
                write!(f, "[FAIL] {} {}, please upgrade to >= {}", name, version, min)
            }
            CheckStatus::Missing => {
                write!(f, "[FAIL] {} not found. Please install {} >= {}", name, name, min)
            }
        }
    }
}

/// Results of checking a list of requirements
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    pub results: Vec<CheckResult>,
}

impl Report {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(CheckResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{}", result)?;
        }
        Ok(())
    }
}

pub fn check_requirements<P: VersionProbe + ?Sized>(
    requirements: &[Requirement],
    probe: &P,
) -> Report {
    let results = requirements
        .iter()
        .map(|req| {
            let status = match probe.installed_version(&req.name) {
                Some(version) if version >= req.min_version => CheckStatus::Ok(version),
                Some(version) => CheckStatus::Outdated(version),
                None => CheckStatus::Missing,
            };
            CheckResult {
                requirement: req.clone(),
                status,
            }
        })
        .collect();
    Report { results }
}

/// Check the bundled requirements against the installed toolchain and
/// print the report to stdout; returns whether every check passed
///
/// A failure to write the report is returned as an error rather than
/// folded into the pass/fail result.
pub fn main() -> std::io::Result<bool> {
    run_with(REQUIREMENTS, &CommandProbe, &mut std::io::stdout().lock())
}

/// [`main`] with explicit requirements, probe and output
pub fn run_with<P: VersionProbe + ?Sized, W: std::io::Write>(
    requirements: &str,
    probe: &P,
    out: &mut W,
) -> std::io::Result<bool> {
    let (report, text) = match parse_requirements(requirements) {
        Ok(reqs) => {
            let report = check_requirements(&reqs, probe);
            let text = report.to_string();
            (Some(report), text)
        }
        Err(e) => (None, format!("[FAIL] requirements: {}\n", e)),
    };

    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(report.is_some_and(|r| r.all_passed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_version_ordering_pads_with_zeros() {
        assert_eq!(v("1.74"), v("1.74.0"));
        assert!(v("1.79.0") > v("1.74"));
        assert!(v("1.9") < v("1.10"));
        assert_eq!(v("1.80.0-nightly"), v("1.80"));
        assert!(Version::parse("abc").is_none());
    }

    #[test]
    fn test_extract_version_from_tool_output() {
        let out = "rustc 1.79.0 (129f3b996 2024-06-10)\n";
        assert_eq!(extract_version(out), Some(v("1.79.0")));
        assert_eq!(
            extract_version("cargo 1.80.0-nightly (abc 2024-05-01)"),
            Some(v("1.80.0"))
        );
        assert_eq!(extract_version("no version here"), None);
    }

    #[test]
    fn test_parse_requirements_skips_comments() {
        let reqs = parse_requirements("# header\n\nrustc >= 1.74  # inline\ncargo>=1.70\n").unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].name, "rustc");
        assert_eq!(reqs[1].min_version, v("1.70"));

        assert!(parse_requirements("rustc 1.74").unwrap_err().is_config());
        assert!(parse_requirements(">= 1.74").is_err());
    }

    #[test]
    fn test_bundled_requirements_parse() {
        let reqs = parse_requirements(REQUIREMENTS).unwrap();
        let names: Vec<&str> = reqs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["rustc", "cargo"]);
    }

    #[test]
    fn test_line_formats() {
        let req = Requirement {
            name: "cargo".to_string(),
            min_version: v("1.74"),
        };
        let line = |status| {
            CheckResult {
                requirement: req.clone(),
                status,
            }
            .to_string()
        };
        assert_eq!(line(CheckStatus::Ok(v("1.79.0"))), "[OK] cargo 1.79.0");
        assert_eq!(
            line(CheckStatus::Outdated(v("1.60.0"))),
            "[FAIL] cargo 1.60.0, please upgrade to >= 1.74"
        );
        assert_eq!(
            line(CheckStatus::Missing),
            "[FAIL] cargo not found. Please install cargo >= 1.74"
        );
    }
}
