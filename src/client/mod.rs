//! Typed HTTP client for the dashboard API, used by watch mode and remote
//! tooling.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::heartbeat::TrackedService;
use crate::queue::{ProjectPresets, QueueBuildRequest, ScheduledBuild};
use crate::report::view::{DashboardReport, NightlyRow, WeeklyRow};

pub struct DashboardClient {
    base: String,
    client: Client,
}

impl DashboardClient {
    pub fn new(base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base: format!("{}/api/v1", base.trim_end_matches('/')),
            client,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let resp = self.client.post(&url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn dashboard(&self) -> Result<Vec<DashboardReport>> {
        self.get_json("/dashboard").await
    }

    pub async fn nightly(&self, project: &str, page: u32) -> Result<Vec<NightlyRow>> {
        self.get_json(&format!("/reports/nightly?project={}&page={}", project, page))
            .await
    }

    pub async fn weekly(&self, project: &str, page: u32) -> Result<Vec<WeeklyRow>> {
        self.get_json(&format!("/reports/weekly?project={}&page={}", project, page))
            .await
    }

    pub async fn builds(&self) -> Result<Vec<ScheduledBuild>> {
        self.get_json("/builds").await
    }

    pub async fn queue_build(&self, project: &str, preset: &str) -> Result<ScheduledBuild> {
        let url = format!("{}/builds", self.base);
        let resp = self
            .client
            .post(&url)
            .json(&QueueBuildRequest {
                project: project.to_string(),
                preset: preset.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<ScheduledBuild> {
        self.post_json(&format!("/builds/{}/cancel", id)).await
    }

    pub async fn archive(&self, id: Uuid) -> Result<ScheduledBuild> {
        self.post_json(&format!("/builds/{}/archive", id)).await
    }

    pub async fn presets(&self) -> Result<Vec<ProjectPresets>> {
        self.get_json("/presets").await
    }

    pub async fn tracked_services(&self) -> Result<Vec<TrackedService>> {
        self.get_json("/services").await
    }

    pub async fn system_log(&self) -> Result<Vec<String>> {
        self.get_json("/system/log").await
    }

    /// Raw log text for a stored log reference.
    pub async fn log(&self, id: &str) -> Result<String> {
        let url = format!("{}/logs/{}", self.base, id);
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let c = DashboardClient::new("http://localhost:8080/").unwrap();
        assert_eq!(c.base, "http://localhost:8080/api/v1");
    }
}
