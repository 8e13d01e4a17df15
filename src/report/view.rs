//! Aggregate view builder -- turns raw records into the rows a dashboard
//! renders. Pure derivation: nothing here touches storage or mutates input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{CommitInfo, RunRecord, WeeklyBuildRecord};
use super::status::{
    classify_build, classify_packaging, classify_platform_build, classify_tests, Status,
};

/// One named cell of a dashboard row: status, result text, drill-down refs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub title: String,
    pub status: Status,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
}

impl Slot {
    fn new(title: impl Into<String>, status: Status, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status,
            text: text.into(),
            log: None,
            download: None,
        }
    }

    fn with_log(mut self, log: Option<&String>) -> Self {
        self.log = log.cloned();
        self
    }
}

/// Display row for one nightly run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NightlyRow {
    pub project: String,
    pub time_stamp: Option<DateTime<Utc>>,
    pub commit_info: Option<CommitInfo>,
    pub compilation: Slot,
    pub platform_builds: Vec<Slot>,
    pub packaging: Slot,
    pub tests: Slot,
}

/// Display row for one weekly build sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRow {
    pub project: String,
    pub time_stamp: Option<DateTime<Utc>>,
    pub commit_info: Option<CommitInfo>,
    pub platforms: Vec<Slot>,
}

/// Per-project dashboard summary: latest row of each kind plus the totals a
/// paginated drill-down needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub project: String,
    pub nightly_count: u64,
    pub weekly_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_nightly: Option<NightlyRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_weekly: Option<WeeklyRow>,
}

/// Build the display row for one nightly run record.
pub fn nightly_row(record: &RunRecord) -> NightlyRow {
    let compilation = {
        let c = classify_build(Some(&record.build));
        Slot::new("Compilation", c.status, c.text).with_log(record.build.build_log.as_ref())
    };

    let platform_builds = record
        .cross_platform_build_results
        .iter()
        .map(|p| {
            let c = classify_build(Some(&p.build));
            Slot::new(p.platform.clone(), c.status, c.text).with_log(p.build.build_log.as_ref())
        })
        .collect();

    let packaging = {
        let c = classify_packaging(record.package_success);
        Slot::new("Packaging", c.status, c.text)
    };

    let tests = {
        let c = classify_tests(record.test_results.as_ref());
        Slot::new("Tests", c.status, c.text)
            .with_log(record.test_results.as_ref().and_then(|t| t.log.as_ref()))
    };

    NightlyRow {
        project: record.project_key().to_string(),
        time_stamp: record.time_stamp,
        commit_info: record.commit_info.clone(),
        compilation,
        platform_builds,
        packaging,
        tests,
    }
}

/// Build the display row for one weekly build sweep. A download affordance is
/// only attached when the preset built successfully.
pub fn weekly_row(record: &WeeklyBuildRecord) -> WeeklyRow {
    let platforms = record
        .results
        .iter()
        .map(|r| {
            let c = classify_platform_build(Some(r));
            let mut slot = Slot::new(r.preset.clone(), c.status, c.text).with_log(r.log.as_ref());
            if r.success {
                slot.download = r.download_link.clone();
            }
            slot
        })
        .collect();

    WeeklyRow {
        project: record.project_key().to_string(),
        time_stamp: record.time_stamp,
        commit_info: record.commit_info.clone(),
        platforms,
    }
}
