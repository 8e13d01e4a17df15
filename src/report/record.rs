//! Raw CI result records as produced by the build farm.
//!
//! Field names mirror the PascalCase JSON written by the CI jobs, one record
//! per file. Everything optional in the wild is optional here; a record with
//! missing pieces must still group, classify, and render.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grouping key used when a record carries no project name.
pub const NO_PROJECT: &str = "NoProject";

/// Git metadata for the commit a run was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitInfo {
    pub time_stamp: DateTime<Utc>,
    pub sha: String,
    pub message: String,
    pub author: String,
}

/// Compilation outcome shared by the main build and per-platform builds.
///
/// The farm writes these fields on every record, so the top-level build is
/// always present once a record parses; only per-platform entries can be
/// absent entirely. `BuildWarnings` is optional on the wire and stays
/// optional here: no warning count and zero warnings render differently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildOutcome {
    #[serde(default)]
    pub build_success: bool,
    #[serde(default)]
    pub build_warnings: Option<u32>,
    #[serde(default)]
    pub build_log: Option<String>,
}

/// A platform-tagged build outcome (iOS, Android, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlatformBuildOutcome {
    pub platform: String,
    #[serde(flatten)]
    pub build: BuildOutcome,
}

/// One named test and whether it passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestCase {
    #[serde(rename = "Test")]
    pub name: String,
    #[serde(rename = "Result")]
    pub passed: bool,
}

/// Outcome of the test suite for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestOutcome {
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub critical_errors: bool,
    #[serde(default)]
    pub tests_timed_out: bool,
    #[serde(default)]
    pub results: Vec<TestCase>,
}

/// One nightly CI execution: build, per-platform builds, packaging, tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunRecord {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commit_info: Option<CommitInfo>,
    #[serde(flatten)]
    pub build: BuildOutcome,
    /// Tri-state: succeeded, failed, or not attempted.
    #[serde(default)]
    pub package_success: Option<bool>,
    #[serde(default)]
    pub test_results: Option<TestOutcome>,
    // Older farm revisions wrote this as MobileTestResults.
    #[serde(default, alias = "MobileTestResults")]
    pub cross_platform_build_results: Vec<PlatformBuildOutcome>,
}

/// Per-preset result inside a weekly build sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlatformBuildResult {
    pub preset: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub download_link: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

/// One weekly build sweep across release presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeeklyBuildRecord {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commit_info: Option<CommitInfo>,
    #[serde(default)]
    pub results: Vec<PlatformBuildResult>,
}

impl RunRecord {
    pub fn project_key(&self) -> &str {
        match self.project.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => NO_PROJECT,
        }
    }
}

impl WeeklyBuildRecord {
    pub fn project_key(&self) -> &str {
        match self.project.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => NO_PROJECT,
        }
    }
}
