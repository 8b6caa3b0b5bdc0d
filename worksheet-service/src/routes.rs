use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use worksheet_utils::build::OutputKind;

use crate::{
    config::AppState,
    db::{self, DocumentHit, LessonSearch, MindmapHit, SearchResults},
    error::Error,
    generate::{self, CreateAllOutcome, CreateAllRequest, GenerateRequest, GenerationResult},
    s3::FileListing,
    status::{self, PdfStatus, S3Status, SystemHealth},
};

pub const API_VERSION: &str = "2.0";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status/ping", get(get_status_ping))
        // v1
        .route("/generate-worksheet/", get(get_generate_worksheet))
        .route("/generate-worksheet-legacy/", get(get_generate_worksheet_legacy))
        .route("/search-documents/", get(get_search_documents))
        .route("/document-details/{document_uuid}", get(get_document_details))
        .route("/search-mindmaps/", get(get_search_mindmaps))
        .route("/mindmap-details/{document_uuid}", get(get_mindmap_details))
        .route("/search-lessons/", get(get_search_lessons))
        .route("/lesson-details/{lesson_identifier}", get(get_lesson_details))
        .route("/pdf-status/", get(get_pdf_status))
        .route("/s3-status/", get(get_s3_status))
        .route("/list-files/", get(get_list_files))
        .route("/download/{*file_key}", get(get_download))
        // v2
        .route("/api/v2/info", get(get_api_info_v2))
        .route("/api/v2/worksheets/generate", get(get_generate_worksheet_v2))
        .route("/api/v2/questions/generate", get(get_generate_questions_v2))
        .route("/api/v2/create-all", post(post_create_all_v2))
        .route("/api/v2/documents/search", get(get_search_documents_v2))
        .route("/api/v2/documents/{document_uuid}", get(get_document_details_v2))
        .route("/api/v2/mindmaps/search", get(get_search_mindmaps_v2))
        .route("/api/v2/mindmaps/{document_uuid}", get(get_mindmap_details_v2))
        .route("/api/v2/lessons/search", get(get_search_lessons_v2))
        .route("/api/v2/lessons/{lesson_identifier}", get(get_lesson_details_v2))
        .route("/api/v2/status/pdf", get(get_pdf_status_v2))
        .route("/api/v2/status/s3", get(get_s3_status_v2))
        .route("/api/v2/status/health", get(get_health_v2))
        .route("/api/v2/files/list", get(get_list_files_v2))
        .route("/api/v2/files/download/{*file_key}", get(get_download))
}

/// Envelope of every `/api/v2` response.
#[derive(Debug, Serialize)]
pub struct V2Response<T> {
    pub api_version: &'static str,
    pub endpoint: &'static str,
    pub success: bool,
    pub data: T,
}

fn v2<T: Serialize>(endpoint: &'static str, success: bool, data: T) -> Json<V2Response<T>> {
    Json(V2Response {
        api_version: API_VERSION,
        endpoint,
        success,
        data,
    })
}

/// An error reported inside the v2 envelope, keeping the error's status.
#[derive(Debug)]
pub struct V2Error {
    endpoint: &'static str,
    error: Error,
}

impl V2Error {
    fn at(endpoint: &'static str) -> impl Fn(Error) -> V2Error {
        move |error| V2Error { endpoint, error }
    }
}

impl IntoResponse for V2Error {
    fn into_response(self) -> Response {
        let msg = self.error.to_string();
        let status: StatusCode = self.error.into();
        if status.is_server_error() {
            tracing::error!(endpoint = self.endpoint, %status, "{msg}");
        }
        let body = json!({
            "api_version": API_VERSION,
            "endpoint": self.endpoint,
            "success": false,
            "error": msg,
        });
        (status, Json(body)).into_response()
    }
}

type V2Result<T> = Result<Json<V2Response<T>>, V2Error>;

fn ten() -> i64 {
    10
}

fn fifty() -> i32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "ten")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct MindmapDetailsQuery {
    #[serde(default)]
    pub include_full_data: bool,
}

#[derive(Debug, Deserialize)]
pub struct LegacyQuery {
    pub lesson_id: String,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default)]
    pub num_questions: i64,
    #[serde(default)]
    pub html_parsing: bool,
}

fn default_output() -> String {
    OutputKind::Worksheet.as_str().to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "fifty")]
    pub limit: i32,
}

pub async fn get_status_ping() -> impl IntoResponse {
    info!("Status");
    StatusCode::OK
}

pub async fn get_generate_worksheet(
    State(state): State<AppState>,
    Query(request): Query<GenerateRequest>,
) -> Result<Json<GenerationResult>, Error> {
    let result = generate::generate_documents(&state, &request).await?;
    Ok(Json(result))
}

pub async fn get_generate_worksheet_v2(
    State(state): State<AppState>,
    Query(request): Query<GenerateRequest>,
) -> V2Result<GenerationResult> {
    let endpoint = "worksheets/generate";
    let result = generate::generate_documents(&state, &request)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, result))
}

/// Question banks only, without the legacy overall count.
pub async fn get_generate_questions_v2(
    State(state): State<AppState>,
    Query(mut request): Query<GenerateRequest>,
) -> V2Result<GenerationResult> {
    let endpoint = "questions/generate";
    request.output = OutputKind::QuestionBank.as_str().to_string();
    request.num_questions = 0;
    let result = generate::generate_documents(&state, &request)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, result))
}

pub async fn get_generate_worksheet_legacy(
    State(state): State<AppState>,
    Query(query): Query<LegacyQuery>,
) -> Result<Json<Value>, Error> {
    let kind: OutputKind = query.output.parse()?;
    let data = generate::legacy_from_lesson(
        &state,
        &query.lesson_id,
        kind,
        query.num_questions,
        query.html_parsing,
    )
    .await?;

    Ok(Json(json!({
        "status": "success",
        "data": data,
        "lesson_id": query.lesson_id,
        "output": kind.as_str(),
        "message": "Legacy worksheet generated successfully",
    })))
}

pub async fn post_create_all_v2(
    State(state): State<AppState>,
    Query(request): Query<CreateAllRequest>,
) -> V2Result<CreateAllOutcome> {
    let endpoint = "create-all";
    let outcome = generate::create_all(&state, &request)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, outcome.success(), outcome))
}

pub async fn get_search_documents(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults<DocumentHit>>, Error> {
    let results = db::search_documents(&state.ai_db(), &query.query, query.limit).await?;
    Ok(Json(results))
}

pub async fn get_search_documents_v2(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> V2Result<SearchResults<DocumentHit>> {
    let endpoint = "documents/search";
    let results = db::search_documents(&state.ai_db(), &query.query, query.limit)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, results))
}

pub async fn get_document_details(
    State(state): State<AppState>,
    Path(document_uuid): Path<String>,
) -> Result<Json<Value>, Error> {
    Ok(Json(db::document_details(&state.ai_db(), &document_uuid).await?))
}

pub async fn get_document_details_v2(
    State(state): State<AppState>,
    Path(document_uuid): Path<String>,
) -> V2Result<Value> {
    let endpoint = "documents/details";
    let details = db::document_details(&state.ai_db(), &document_uuid)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, details))
}

pub async fn get_search_mindmaps(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults<MindmapHit>>, Error> {
    let results = db::search_mindmaps(&state.ai_db(), &query.query, query.limit).await?;
    Ok(Json(results))
}

pub async fn get_search_mindmaps_v2(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> V2Result<SearchResults<MindmapHit>> {
    let endpoint = "mindmaps/search";
    let results = db::search_mindmaps(&state.ai_db(), &query.query, query.limit)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, results))
}

pub async fn get_mindmap_details(
    State(state): State<AppState>,
    Path(document_uuid): Path<String>,
    Query(query): Query<MindmapDetailsQuery>,
) -> Result<Json<Value>, Error> {
    let details =
        db::mindmap_details(&state.ai_db(), &document_uuid, query.include_full_data).await?;
    Ok(Json(details))
}

pub async fn get_mindmap_details_v2(
    State(state): State<AppState>,
    Path(document_uuid): Path<String>,
    Query(query): Query<MindmapDetailsQuery>,
) -> V2Result<Value> {
    let endpoint = "mindmaps/details";
    let details = db::mindmap_details(&state.ai_db(), &document_uuid, query.include_full_data)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, details))
}

pub async fn get_search_lessons(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<LessonSearch>, Error> {
    let results = db::search_lessons(&state.legacy_db(), &query.query, query.limit).await?;
    Ok(Json(results))
}

pub async fn get_search_lessons_v2(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> V2Result<LessonSearch> {
    let endpoint = "lessons/search";
    let results = db::search_lessons(&state.legacy_db(), &query.query, query.limit)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, results))
}

pub async fn get_lesson_details(
    State(state): State<AppState>,
    Path(lesson_identifier): Path<String>,
) -> Result<Json<Value>, Error> {
    Ok(Json(
        db::lesson_details(&state.legacy_db(), &lesson_identifier).await?,
    ))
}

pub async fn get_lesson_details_v2(
    State(state): State<AppState>,
    Path(lesson_identifier): Path<String>,
) -> V2Result<Value> {
    let endpoint = "lessons/details";
    let details = db::lesson_details(&state.legacy_db(), &lesson_identifier)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, details))
}

pub async fn get_pdf_status(State(state): State<AppState>) -> Json<PdfStatus> {
    Json(status::pdf_status(&state.converter).await)
}

pub async fn get_pdf_status_v2(State(state): State<AppState>) -> Json<V2Response<PdfStatus>> {
    let status = status::pdf_status(&state.converter).await;
    v2("status/pdf", status.pdf_conversion_available, status)
}

pub async fn get_s3_status(State(state): State<AppState>) -> Json<S3Status> {
    Json(status::s3_status(&state).await)
}

pub async fn get_s3_status_v2(State(state): State<AppState>) -> Json<V2Response<S3Status>> {
    let status = status::s3_status(&state).await;
    v2("status/s3", status.is_healthy(), status)
}

pub async fn get_health_v2(State(state): State<AppState>) -> Json<V2Response<SystemHealth>> {
    let health = status::system_health(&state).await;
    v2("status/health", health.is_healthy(), health)
}

pub async fn get_list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FileListing>, Error> {
    let listing = state.storage.list_files(&query.prefix, query.limit).await?;
    Ok(Json(listing))
}

pub async fn get_list_files_v2(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> V2Result<FileListing> {
    let endpoint = "files/list";
    let listing = state
        .storage
        .list_files(&query.prefix, query.limit)
        .await
        .map_err(V2Error::at(endpoint))?;
    Ok(v2(endpoint, true, listing))
}

/// Redirects to the public URL of a stored file.
pub async fn get_download(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
) -> Response {
    match state.storage.file_info(&file_key).await {
        Ok(_) => Redirect::temporary(&state.storage.public_url(&file_key)).into_response(),
        Err(e) => {
            let msg = e.to_string();
            let status: StatusCode = e.into();
            (status, Json(json!({ "error": msg, "file_key": file_key }))).into_response()
        }
    }
}

pub async fn get_api_info_v2() -> Json<Value> {
    Json(json!({
        "api_version": API_VERSION,
        "title": "Worksheet Generator API",
        "description": "Generate Arabic worksheets and question banks as JSON, DOCX and PDF",
        "endpoint_groups": {
            "worksheets_and_questions": {
                "description": "Generate worksheets and question banks",
                "endpoints": [
                    "/api/v2/worksheets/generate",
                    "/api/v2/questions/generate"
                ]
            },
            "mindmaps": {
                "description": "Search and inspect mind map documents",
                "endpoints": [
                    "/api/v2/mindmaps/search",
                    "/api/v2/mindmaps/{document_uuid}"
                ]
            },
            "status_and_health": {
                "description": "System status and health checks",
                "endpoints": [
                    "/api/v2/status/pdf",
                    "/api/v2/status/s3",
                    "/api/v2/status/health"
                ]
            },
            "lessons_and_documents": {
                "description": "Search and inspect documents and lessons",
                "endpoints": [
                    "/api/v2/documents/search",
                    "/api/v2/documents/{document_uuid}",
                    "/api/v2/lessons/search",
                    "/api/v2/lessons/{lesson_identifier}"
                ]
            },
            "unified": {
                "description": "Create all document types at once",
                "endpoints": ["/api/v2/create-all"]
            },
            "file_management": {
                "description": "File storage and retrieval",
                "endpoints": [
                    "/api/v2/files/list",
                    "/api/v2/files/download/{file_key}"
                ]
            }
        },
        "features": {
            "uuid_based_document_management": true,
            "override_existing_documents": true,
            "s3_file_storage": true,
            "pdf_generation": true,
            "arabic_language_support": true,
            "mindmap_image_generation": false
        }
    }))
}
