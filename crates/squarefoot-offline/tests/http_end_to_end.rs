//! Disk store + HTTP fetcher against a mock backend.
//!
//! Uses wiremock for the origin and tempfile for the store root.

use squarefoot_offline::{
    GenerationState, OfflineConfig, OfflineError, OfflineRuntime, PredictionQuery, Request,
    ResponseSource,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_assets(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>square foot</html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("loadCompetitions();"))
        .mount(mock_server)
        .await;
}

fn config(mock_server: &MockServer, dir: &TempDir) -> OfflineConfig {
    OfflineConfig::default()
        .with_origin(mock_server.uri())
        .with_core_assets(["/", "/app.js"])
        .with_cache_dir(dir.path())
        .with_max_retries(0)
}

#[tokio::test]
async fn test_deploy_survives_restart_and_outage() {
    let mock_server = MockServer::start().await;
    mount_assets(&mock_server).await;
    let dir = TempDir::new().unwrap();
    let origin = mock_server.uri();

    let runtime =
        OfflineRuntime::from_config(config(&mock_server, &dir).with_skip_waiting(true)).unwrap();
    let report = runtime.lifecycle().deploy().await.unwrap();
    assert_eq!(report.install.assets, 2);
    assert!(report.activation.is_some());
    drop(runtime);

    // Origin goes away; a fresh runtime over the same directory still serves.
    drop(mock_server);
    let config = OfflineConfig::default()
        .with_origin(origin.as_str())
        .with_core_assets(["/", "/app.js"])
        .with_cache_dir(dir.path())
        .with_max_retries(0);
    let runtime = OfflineRuntime::from_config(config).unwrap();
    assert_eq!(runtime.lifecycle().state().await.unwrap(), GenerationState::Active);

    let interceptor = runtime.interceptor();
    let shell = interceptor
        .handle(&Request::navigate(&format!("{origin}/")).unwrap())
        .await
        .unwrap();
    assert!(matches!(shell.source, ResponseSource::Fallback { .. }));
    assert_eq!(shell.response.text(), "<html>square foot</html>");
    assert_eq!(shell.response.header("content-type"), Some("text/html"));

    let script = interceptor
        .handle(&Request::get(&format!("{origin}/app.js")).unwrap())
        .await
        .unwrap();
    assert!(matches!(script.source, ResponseSource::Cache { .. }));

    let data = interceptor
        .handle(&Request::get(&format!("{origin}/competitions")).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(data, OfflineError::NetworkFailure { .. }));
}

#[tokio::test]
async fn test_version_bump_retires_previous_directory() {
    let mock_server = MockServer::start().await;
    mount_assets(&mock_server).await;
    let dir = TempDir::new().unwrap();

    for version in ["v6", "v7"] {
        let runtime = OfflineRuntime::from_config(
            config(&mock_server, &dir)
                .with_version(version)
                .with_skip_waiting(true),
        )
        .unwrap();
        runtime.lifecycle().deploy().await.unwrap();
    }

    assert!(dir.path().join("square-foot-v7").is_dir());
    assert!(!dir.path().join("square-foot-v6").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("CURRENT")).unwrap().trim(),
        "square-foot-v7"
    );
}

#[tokio::test]
async fn test_dashboard_client_round_trip() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/competitions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"competitions":["PL","PD","BL1"]}"#),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/predict/PL"))
        .and(query_param("max_matches", "5"))
        .and(query_param("ttl_seconds", "120"))
        .and(query_param("use_cache", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "competition": "PL",
                "matches_fetched": 12,
                "returned": 1,
                "cache": {"hit": false},
                "predictions": [{
                    "utcDate": "2025-12-21T15:00:00Z",
                    "home": "Arsenal",
                    "away": "Chelsea",
                    "status": "TIMED",
                    "probabilities_1x2": {"home_win": 0.5, "draw": 0.3, "away_win": 0.2},
                    "expected_goals": {"home": 1.6, "away": 1.1}
                }]
            }"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/save/PL"))
        .and(query_param("max_matches", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"path":"data/preds_live/PL.json","competition":"PL","saved":1}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/extra-stats.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"rows":[{"Div":"E0","HomeTeam":"Arsenal","HS":14}]}"#),
        )
        .mount(&mock_server)
        .await;

    let runtime = OfflineRuntime::from_config(config(&mock_server, &dir)).unwrap();
    let dashboard = runtime.dashboard().unwrap();
    let query = PredictionQuery {
        max_matches: 5,
        ttl_seconds: 120,
    };

    // Data endpoints are never cached: both calls reach the backend.
    for _ in 0..2 {
        let competitions = dashboard.competitions().await.unwrap();
        assert_eq!(competitions.competitions, vec!["PL", "PD", "BL1"]);
    }

    let report = dashboard.predict("PL", query).await.unwrap();
    assert_eq!(report.competition.as_deref(), Some("PL"));
    assert_eq!(report.matches_fetched, Some(12));
    assert_eq!(report.predictions.len(), 1);
    assert_eq!(report.predictions[0].home.as_deref(), Some("Arsenal"));

    let saved = dashboard.save("PL", query).await.unwrap();
    assert_eq!(saved.saved, Some(1));
    assert_eq!(saved.path.as_deref(), Some("data/preds_live/PL.json"));

    let rows = dashboard.extra_stats().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["HomeTeam"], "Arsenal");
}

#[tokio::test]
async fn test_dashboard_client_error_mapping() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/competitions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/predict/XX"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"error":"unknown competition XX"}"#),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/extra-stats.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let runtime = OfflineRuntime::from_config(config(&mock_server, &dir)).unwrap();
    let dashboard = runtime.dashboard().unwrap();

    let err = dashboard.competitions().await.unwrap_err();
    assert!(matches!(err, OfflineError::UnexpectedStatus { status: 503, .. }));

    let err = dashboard
        .predict("XX", PredictionQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::InvalidResponse { .. }));
    assert!(err.to_string().contains("unknown competition XX"));

    let err = dashboard.extra_stats().await.unwrap_err();
    assert!(matches!(err, OfflineError::InvalidResponse { .. }));
}
