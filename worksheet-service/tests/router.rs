use std::time::Duration;

use aws_sdk_s3::config::{
    BehaviorVersion, Builder, Credentials, Region, retry::RetryConfig,
};
use mongodb::options::ClientOptions;
use serde_json::Value;
use worksheet_service::{
    config::{AppState, EnvVars, Environment},
    convert::Converter,
    routes,
    s3::Storage,
};

/// Nothing listens on the discard port, so every backend call fails fast.
const UNREACHABLE: &str = "127.0.0.1:9";

fn env_vars() -> EnvVars {
    EnvVars {
        conversion_retries: 0,
        conversion_timeout: Duration::from_secs(1),
        db_name: "ai".to_string(),
        environment: Environment::Development,
        legacy_db_name: "ien".to_string(),
        legacy_mongodb_uri: format!("mongodb://{UNREACHABLE}"),
        libreoffice_paths: vec![],
        mongodb_uri: format!("mongodb://{UNREACHABLE}"),
        port: 0,
        request_body_size_limit: 1024,
        request_timeout_in_ms: 5_000,
        s3_access_key_id: "id".to_string(),
        s3_bucket_name: "worksheets".to_string(),
        s3_endpoint: format!("http://{UNREACHABLE}"),
        s3_public_url: Some("https://files.example.com".to_string()),
        s3_region: "auto".to_string(),
        s3_secret_access_key: "secret".to_string(),
        sentry_dsn: None,
        unoconv_path: "/nonexistent/unoconv".to_string(),
        work_dir: None,
    }
}

async fn offline_state() -> AppState {
    let env_vars = env_vars();

    let mut options = ClientOptions::parse(&env_vars.mongodb_uri).await.unwrap();
    options.server_selection_timeout = Some(Duration::from_millis(200));
    let client = mongodb::Client::with_options(options).unwrap();

    let s3_config = Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("auto"))
        .credentials_provider(Credentials::new("id", "secret", None, None, "test"))
        .endpoint_url(&env_vars.s3_endpoint)
        .force_path_style(true)
        .retry_config(RetryConfig::disabled())
        .build();
    let storage = Storage::new(
        aws_sdk_s3::Client::from_conf(s3_config),
        &env_vars.s3_bucket_name,
        &env_vars.s3_endpoint,
        "https://files.example.com",
    );

    AppState {
        legacy_client: client.clone(),
        client,
        storage,
        converter: Converter::from_env(&env_vars),
        env_vars,
    }
}

/// Serves the router on an ephemeral port and returns its base URL.
async fn spawn_app() -> String {
    let app = routes::router().with_state(offline_state().await);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn ping_responds() {
    let base = spawn_app().await;
    let res = reqwest::get(format!("{base}/status/ping")).await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn api_info_lists_endpoint_groups() {
    let base = spawn_app().await;
    let body: Value = reqwest::get(format!("{base}/api/v2/info"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["api_version"], "2.0");
    let groups = body["endpoint_groups"].as_object().unwrap();
    assert!(groups.contains_key("worksheets_and_questions"));
    assert!(groups.contains_key("file_management"));
}

#[tokio::test]
async fn unknown_output_is_a_bad_request() {
    let base = spawn_app().await;
    let res = reqwest::get(format!(
        "{base}/generate-worksheet/?document_uuid=abc&output=poster"
    ))
    .await
    .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("poster"));
}

#[tokio::test]
async fn missing_document_uuid_is_rejected() {
    let base = spawn_app().await;
    let res = reqwest::get(format!("{base}/api/v2/worksheets/generate"))
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn create_all_validates_the_uuid() {
    let base = spawn_app().await;
    let res = reqwest::Client::new()
        .post(format!("{base}/api/v2/create-all?document_uuid=not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["api_version"], "2.0");
    assert_eq!(body["endpoint"], "create-all");
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid document UUID format");
}

#[tokio::test]
async fn pdf_status_without_tools_recommends_installing_them() {
    let base = spawn_app().await;
    let body: Value = reqwest::get(format!("{base}/api/v2/status/pdf"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["endpoint"], "status/pdf");
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["pdf_conversion_available"], false);
    assert_eq!(body["data"]["recommendations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn health_is_degraded_when_backends_are_down() {
    let base = spawn_app().await;
    let body: Value = reqwest::get(format!("{base}/api/v2/status/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["overall_status"], "degraded");
    assert_eq!(body["data"]["services"]["mongodb"]["status"], "unhealthy");
    assert_eq!(body["data"]["services"]["s3_storage"]["accessible"], false);
    assert_eq!(
        body["data"]["services"]["s3_storage"]["configuration"]["bucket"],
        "worksheets"
    );
}

/// Needs `MONGODB_URI` pointing at a database with generated documents
#[tokio::test]
#[ignore]
async fn document_search_against_live_database() {
    dotenvy::dotenv().ok();
    let mongo_uri = std::env::var("MONGODB_URI").unwrap();
    let client = schema::db::client(&mongo_uri).await.unwrap();
    let db = schema::db::database(&client, "ai");
    let results = worksheet_service::db::search_documents(&db, "a", 5)
        .await
        .unwrap();
    assert!(results.total_results <= 10);
}
