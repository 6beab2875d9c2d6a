//! Typed client for the prediction backend.
//!
//! Every call goes through the [`Interceptor`], so the dashboard's own data
//! requests are routed exactly like the page's.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{OfflineError, OfflineResult};
use crate::fetch::Fetcher;
use crate::interceptor::Interceptor;
use crate::store::CacheStore;
use crate::types::Request;

/// Response of `GET /competitions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Competitions {
    #[serde(default)]
    pub competitions: Vec<String>,
}

/// Query parameters shared by `/predict` and `/save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionQuery {
    pub max_matches: u32,
    pub ttl_seconds: u64,
}

impl Default for PredictionQuery {
    fn default() -> Self {
        Self {
            max_matches: 10,
            ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendCache {
    #[serde(default)]
    pub hit: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub home_win: Option<f64>,
    pub draw: Option<f64>,
    pub away_win: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGoals {
    pub home: Option<f64>,
    pub away: Option<f64>,
}

/// Likely final score with its probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scoreline {
    pub home: u32,
    pub away: u32,
    pub p: f64,
}

/// One fixture with its model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPrediction {
    #[serde(rename = "utcDate", default)]
    pub utc_date: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub away: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub probabilities_1x2: Option<Probabilities>,
    #[serde(default)]
    pub expected_goals: Option<ExpectedGoals>,
    #[serde(default)]
    pub top_scorelines: Vec<Scoreline>,
}

/// Response of `GET /predict/{code}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    #[serde(default)]
    pub competition: Option<String>,
    #[serde(default)]
    pub matches_fetched: Option<u32>,
    #[serde(default)]
    pub returned: Option<u32>,
    #[serde(default)]
    pub cache: Option<BackendCache>,
    #[serde(default)]
    pub predictions: Vec<MatchPrediction>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Response of `POST /save/{code}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveReport {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub competition: Option<String>,
    #[serde(default)]
    pub saved: Option<u32>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Client for the backend API, routed through the interceptor.
pub struct DashboardClient<S, F> {
    interceptor: Arc<Interceptor<S, F>>,
    origin: Url,
}

impl<S, F> DashboardClient<S, F>
where
    S: CacheStore,
    F: Fetcher,
{
    pub fn new(interceptor: Arc<Interceptor<S, F>>, origin: Url) -> Self {
        Self {
            interceptor,
            origin,
        }
    }

    /// Competition codes the backend knows about.
    pub async fn competitions(&self) -> OfflineResult<Competitions> {
        let url = self.endpoint(&["competitions"])?;
        self.get_json(url).await
    }

    /// Predictions for one competition. The backend may answer from its own cache.
    pub async fn predict(
        &self,
        code: &str,
        query: PredictionQuery,
    ) -> OfflineResult<PredictionReport> {
        let mut url = self.endpoint(&["predict", code])?;
        url.query_pairs_mut()
            .append_pair("max_matches", &query.max_matches.to_string())
            .append_pair("ttl_seconds", &query.ttl_seconds.to_string())
            .append_pair("use_cache", "true");

        let report: PredictionReport = self.get_json(url.clone()).await?;
        if let Some(error) = &report.error {
            return Err(api_error(&url, error));
        }
        Ok(report)
    }

    /// Ask the backend to persist predictions for one competition.
    pub async fn save(&self, code: &str, query: PredictionQuery) -> OfflineResult<SaveReport> {
        let mut url = self.endpoint(&["save", code])?;
        url.query_pairs_mut()
            .append_pair("max_matches", &query.max_matches.to_string())
            .append_pair("ttl_seconds", &query.ttl_seconds.to_string());

        let request = Request::new(reqwest::Method::POST, url.clone());
        let report: SaveReport = self.send_json(request).await?;
        if let Some(error) = &report.error {
            return Err(api_error(&url, error));
        }
        Ok(report)
    }

    /// Match-level historical rows from `/data/extra-stats.json`.
    ///
    /// Accepts a bare array or an object wrapping it in `rows` or `data`;
    /// any other shape yields no rows.
    pub async fn extra_stats(&self) -> OfflineResult<Vec<serde_json::Value>> {
        let mut url = self.endpoint(&["data", "extra-stats.json"])?;
        url.query_pairs_mut()
            .append_pair("v", &Utc::now().timestamp_millis().to_string());

        let body: serde_json::Value = self.get_json(url).await?;
        Ok(extract_rows(body))
    }

    fn endpoint(&self, segments: &[&str]) -> OfflineResult<Url> {
        let mut url = self.origin.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| OfflineError::InvalidRequest {
                message: format!("origin {} cannot carry a path", self.origin),
            })?
            .clear()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> OfflineResult<T> {
        self.send_json(Request::new(reqwest::Method::GET, url)).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: Request) -> OfflineResult<T> {
        let request = request.with_header("accept", "application/json");
        let served = self.interceptor.handle(&request).await?;
        debug!(
            url = %request.url,
            status = served.response.status,
            source = %served.source,
            "backend response"
        );

        if !served.response.is_success() {
            return Err(OfflineError::UnexpectedStatus {
                url: request.url.to_string(),
                status: served.response.status,
            });
        }
        served.response.json()
    }
}

fn extract_rows(body: serde_json::Value) -> Vec<serde_json::Value> {
    match body {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut map) => ["rows", "data"]
            .iter()
            .find_map(|field| match map.remove(*field) {
                Some(serde_json::Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn api_error(url: &Url, error: &serde_json::Value) -> OfflineError {
    OfflineError::InvalidResponse {
        message: format!("backend reported an error for {}: {}", url.path(), error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_rows_accepts_known_shapes() {
        assert_eq!(extract_rows(json!([{"Div": "E0"}])).len(), 1);
        assert_eq!(extract_rows(json!({"rows": [1, 2]})).len(), 2);
        assert_eq!(extract_rows(json!({"data": [1, 2, 3]})).len(), 3);
        assert!(extract_rows(json!({"rows": "nope"})).is_empty());
        assert!(extract_rows(json!(42)).is_empty());
    }

    #[test]
    fn test_prediction_report_tolerates_missing_fields() {
        let report: PredictionReport = serde_json::from_value(json!({
            "competition": "PL",
            "cache": {"hit": true},
            "predictions": [{
                "utcDate": "2025-12-21T15:00:00Z",
                "home": "Arsenal",
                "away": "Chelsea",
                "probabilities_1x2": {"home_win": 0.52, "draw": 0.26, "away_win": 0.22},
                "top_scorelines": [{"home": 1, "away": 0, "p": 0.12}]
            }]
        }))
        .unwrap();

        assert_eq!(report.competition.as_deref(), Some("PL"));
        assert!(report.cache.unwrap().hit);
        let first = &report.predictions[0];
        assert_eq!(first.utc_date.as_deref(), Some("2025-12-21T15:00:00Z"));
        assert_eq!(first.probabilities_1x2.unwrap().home_win, Some(0.52));
        assert!(first.expected_goals.is_none());
        assert_eq!(first.top_scorelines[0].home, 1);
    }
}
