use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use mobility_sync::api::{AppState, router};
use mobility_sync::cities::CityStore;
use mobility_sync::config::Config;
use mobility_sync::credentials::{
    BrokerSettings, CredentialBroker, CredentialError, CredentialLease, RoleAssumer,
};
use mobility_sync::mirror::{CopyError, CopyJob, CopyOutcome, ObjectCopier, StorageMirror};
use mobility_sync::progress::{MemoryProgressStore, ProgressStore};
use mobility_sync::sync::SyncOrchestrator;
use mobility_sync::vendor::{
    self, JobRequest, JobState, JobStatusReport, PollPolicy, S3Location, SubmittedJob, VendorApi,
};

struct InstantVendor {
    submitted: AtomicUsize,
}

#[async_trait]
impl VendorApi for InstantVendor {
    async fn submit(&self, _endpoint: &str, _request: &JobRequest) -> vendor::Result<SubmittedJob> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubmittedJob {
            request_id: None,
            job_id: format!("job-{n}"),
        })
    }

    async fn job_status(&self, job_id: &str) -> vendor::Result<JobStatusReport> {
        Ok(JobStatusReport {
            status: JobState::Success,
            s3_location: Some(S3Location::Folder {
                folder_path: format!("/exports/{job_id}/"),
            }),
            error_message: None,
        })
    }
}

struct HourLeases;

#[async_trait]
impl RoleAssumer for HourLeases {
    async fn assume_role(&self, _duration: Duration) -> Result<CredentialLease, CredentialError> {
        Ok(CredentialLease {
            access_key_id: "AKIATEST".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

struct ThreeFiles;

#[async_trait]
impl ObjectCopier for ThreeFiles {
    async fn copy_prefix(&self, _lease: &CredentialLease, _job: &CopyJob) -> Result<CopyOutcome, CopyError> {
        Ok(CopyOutcome { copied: 3, skipped: 0 })
    }
}

/// Minimal config parsed the same way the TOML file would be
fn create_test_config(temp_dir: &TempDir) -> Config {
    let config_toml = r#"
[vendor]
api_key = "test-key"

[credentials]
role_arn = "arn:aws:iam::123456789012:role/VendorRead"

[storage]
default_bucket = "mobility-pings"

[sync]
max_days_per_request = 31
max_single_city_chunks = 2
    "#;

    let mut config: Config = toml::from_str(config_toml).expect("Failed to parse test config");
    config.server.log_file = temp_dir.path().join("app.log");
    config.server.cities_path = temp_dir.path().join("cities.json");
    config
}

/// Builds a test app with isolated dependencies
fn build_test_app() -> (Router, Arc<dyn ProgressStore>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&temp_dir);

    let broker = Arc::new(CredentialBroker::new(Arc::new(HourLeases), BrokerSettings::default()));
    let mirror = Arc::new(StorageMirror::new(broker, Arc::new(ThreeFiles), config.mirror_settings()));

    let mut settings = config.batch_settings();
    settings.pair_pause = Duration::ZERO;
    settings.poll = PollPolicy {
        interval: Duration::ZERO,
        max_attempts: 3,
    };
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(InstantVendor {
            submitted: AtomicUsize::new(0),
        }),
        mirror,
        settings,
        config.storage.default_bucket.clone(),
    ));

    let cities = Arc::new(CityStore::open(&config.server.cities_path));
    let progress: Arc<dyn ProgressStore> = Arc::new(MemoryProgressStore::new());

    let state = AppState::new(config, cities, orchestrator, progress.clone());
    (router(state), progress, temp_dir)
}

fn toronto() -> Value {
    json!({
        "country": "Canada",
        "state_province": "Ontario",
        "city": "Toronto",
        "latitude": "43.6532",
        "longitude": -79.3832,
        "radius_meters": 50000
    })
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn create_city(app: &Router) -> String {
    let (status, body) = send(app, json_request("POST", "/cities", toronto())).await;
    assert_eq!(status, StatusCode::CREATED);
    body["city_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _progress, _temp_dir) = build_test_app();

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["metrics"]["syncs_started"], 0);
}

#[tokio::test]
async fn test_city_crud() {
    let (app, _progress, _temp_dir) = build_test_app();

    let city_id = create_city(&app).await;

    let (status, list) = send(&app, get("/cities")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["latitude"], 43.6532);

    let mut edited = toronto();
    edited["radius_meters"] = json!(25000);
    let (status, city) = send(&app, json_request("PUT", &format!("/cities/{city_id}"), edited)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(city["city_id"], city_id.as_str());
    assert_eq!(city["radius_meters"], 25000.0);

    let (status, city) = send(&app, get(&format!("/cities/{city_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(city["radius_meters"], 25000.0);

    let request = Request::builder()
        .uri(format!("/cities/{city_id}"))
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/cities/{city_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_city_rejects_invalid_payloads() {
    let (app, _progress, _temp_dir) = build_test_app();

    let mut no_aoi = toronto();
    no_aoi.as_object_mut().unwrap().remove("radius_meters");
    let (status, body) = send(&app, json_request("POST", "/cities", no_aoi)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");

    let request = Request::builder()
        .uri("/cities")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");

    let (_, list) = send(&app, get("/cities")).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_runs_in_background() {
    let (app, progress, _temp_dir) = build_test_app();
    let city_id = create_city(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/cities/{city_id}/sync"),
            json!({"from_date": "2025-01-01", "to_date": "2025-01-31"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let sync_id = body["sync_id"].as_str().unwrap().to_string();

    let mut finished = None;
    for _ in 0..100 {
        if let Some(entry) = progress.get(&sync_id).unwrap() {
            if entry.done {
                finished = Some(entry);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let entry = finished.expect("sync did not finish");
    assert_eq!(entry.files_copied, 3);
    assert_eq!(entry.label, "Toronto, Ontario, Canada");

    let (status, body) = send(&app, get(&format!("/syncs/{sync_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, list) = send(&app, get("/syncs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sync_validation() {
    let (app, progress, _temp_dir) = build_test_app();
    let city_id = create_city(&app).await;
    let uri = format!("/cities/{city_id}/sync");

    // 3 chunks of 31 days exceeds the configured single-city limit of 2
    let (status, body) = send(
        &app,
        json_request("POST", &uri, json!({"from_date": "2025-01-01", "to_date": "2025-03-31"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("at most 2"));

    let (status, _) = send(
        &app,
        json_request("POST", &uri, json!({"from_date": "2025-02-01", "to_date": "2025-01-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &uri,
            json!({"from_date": "2025-01-01", "to_date": "2025-01-01", "target": "visits"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/cities/unknown/sync",
            json!({"from_date": "2025-01-01", "to_date": "2025-01-01"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(progress.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_sync_is_not_found() {
    let (app, _progress, _temp_dir) = build_test_app();

    let (status, body) = send(&app, get("/syncs/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_logs_tail() {
    let (app, _progress, temp_dir) = build_test_app();

    let (status, body) = send(&app, get("/logs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let lines: Vec<String> = (1..=5).map(|n| format!("line {n}")).collect();
    std::fs::write(temp_dir.path().join("app.log"), lines.join("\n")).unwrap();

    let response = app.clone().oneshot(get("/logs?lines=2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "line 4\nline 5\n");
}
