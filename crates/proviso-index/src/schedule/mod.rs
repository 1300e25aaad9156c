//! Python release schedule
//!
//! Looks up which Python release cycles are currently supported, using the
//! endoflife.date API. The active cycles are the default target
//! environments when none are configured.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use proviso_core::{ProvisoError, Version};

use crate::client::{build_http_client, with_retry, RetryConfig};
use crate::IndexResult;

/// endoflife.date product feed for CPython
pub const DEFAULT_SCHEDULE_URL: &str = "https://endoflife.date/api/python.json";

/// One release cycle from the schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseCycle {
    /// Cycle label, e.g. `3.12`
    pub cycle: String,
    /// First release of the cycle
    pub release_date: NaiveDate,
    /// End of life: a date, or a flag when the date is not yet known
    pub eol: EndOfLife,
    /// Latest patch release
    #[serde(default)]
    pub latest: Option<String>,
}

/// End-of-life field, which endoflife.date serves as a date or a boolean
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EndOfLife {
    Date(NaiveDate),
    Flag(bool),
}

impl ReleaseCycle {
    /// Check if the cycle is released and still supported on `today`
    pub fn is_active(&self, today: NaiveDate) -> bool {
        let supported = match self.eol {
            EndOfLife::Date(eol) => eol > today,
            EndOfLife::Flag(ended) => !ended,
        };
        self.release_date <= today && supported
    }
}

/// Client for the release schedule feed
#[derive(Debug, Clone)]
pub struct ReleaseSchedule {
    client: Client,
    url: String,
    retry_config: RetryConfig,
}

impl ReleaseSchedule {
    /// Create a client for the public endoflife.date feed
    pub fn new() -> IndexResult<Self> {
        Self::with_url(DEFAULT_SCHEDULE_URL)
    }

    /// Create a client for another feed URL
    pub fn with_url(url: impl Into<String>) -> IndexResult<Self> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(30))?,
            url: url.into(),
            retry_config: RetryConfig::default(),
        })
    }

    /// Fetch every release cycle
    pub async fn fetch_cycles(&self) -> IndexResult<Vec<ReleaseCycle>> {
        with_retry(&self.retry_config, || async {
            tracing::debug!("GET {}", self.url);
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| ProvisoError::unavailable(format!("Failed to fetch {}", self.url), e))?;

            match response.status() {
                StatusCode::OK => response.json::<Vec<ReleaseCycle>>().await.map_err(|e| {
                    ProvisoError::unavailable("Failed to parse release schedule".to_string(), e)
                }),
                status => Err(ProvisoError::SupplyUnavailable {
                    message: format!("Release schedule returned status {}", status),
                    source: None,
                }),
            }
        })
        .await
    }

    /// Active cycle labels on `today`, oldest first
    pub async fn active_versions(&self, today: NaiveDate) -> IndexResult<Vec<String>> {
        let cycles = self.fetch_cycles().await?;
        Ok(active_cycles(&cycles, today))
    }
}

/// Labels of the cycles active on `today`, sorted by version ascending
pub fn active_cycles(cycles: &[ReleaseCycle], today: NaiveDate) -> Vec<String> {
    let mut active: Vec<(Version, String)> = cycles
        .iter()
        .filter(|cycle| cycle.is_active(today))
        .filter_map(|cycle| {
            let version = cycle.cycle.parse::<Version>().ok()?;
            Some((version, cycle.cycle.clone()))
        })
        .collect();
    active.sort();
    active.into_iter().map(|(_, label)| label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed() -> serde_json::Value {
        serde_json::json!([
            {"cycle": "3.14", "releaseDate": "2025-10-07", "eol": "2030-10-31", "latest": "3.14.0"},
            {"cycle": "3.13", "releaseDate": "2024-10-07", "eol": "2029-10-31", "latest": "3.13.2"},
            {"cycle": "3.10", "releaseDate": "2021-10-04", "eol": "2026-10-31", "latest": "3.10.16"},
            {"cycle": "3.9", "releaseDate": "2020-10-05", "eol": "2025-10-31", "latest": "3.9.21"},
            {"cycle": "3.15", "releaseDate": "2026-10-01", "eol": false}
        ])
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_active_cycles_sorted_by_version() {
        let cycles: Vec<ReleaseCycle> = serde_json::from_value(feed()).unwrap();
        assert_eq!(
            active_cycles(&cycles, date("2025-01-01")),
            vec!["3.9", "3.10", "3.13"]
        );
        assert_eq!(
            active_cycles(&cycles, date("2026-10-15")),
            vec!["3.10", "3.13", "3.14", "3.15"]
        );
    }

    #[test]
    fn test_boolean_eol() {
        let cycle: ReleaseCycle = serde_json::from_value(serde_json::json!(
            {"cycle": "2.7", "releaseDate": "2010-07-03", "eol": true}
        ))
        .unwrap();
        assert!(!cycle.is_active(date("2015-01-01")));
    }

    #[tokio::test]
    async fn test_fetch_active_versions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/python.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
            .mount(&server)
            .await;

        let schedule = ReleaseSchedule::with_url(format!("{}/api/python.json", server.uri())).unwrap();
        let versions = schedule.active_versions(date("2025-01-01")).await.unwrap();
        assert_eq!(versions, vec!["3.9", "3.10", "3.13"]);
    }
}
