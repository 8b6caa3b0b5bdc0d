use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{info, instrument, warn};

use worksheet_utils::{
    build::{AiSource, Generated, OutputKind, build_from_ai_documents, build_from_lesson},
    docx::{RenderOptions, render_docx},
    limit::{TypeLimits, apply_legacy_limit, apply_type_limits},
    text::sanitize_file_stem,
};

use crate::{
    config::AppState,
    convert::ConversionError,
    db,
    error::Error,
    s3::{BundleUpload, UploadStatus, content_type_for},
};

fn all() -> i64 {
    -1
}

fn yes() -> bool {
    true
}

fn worksheet() -> String {
    OutputKind::Worksheet.as_str().to_string()
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub document_uuid: String,
    #[serde(default = "worksheet")]
    pub output: String,
    /// Applied to every list after the per type counts. Zero keeps all.
    #[serde(default)]
    pub num_questions: i64,
    #[serde(default = "all")]
    pub multiple_choice_count: i64,
    #[serde(default = "all")]
    pub true_false_count: i64,
    #[serde(default = "all")]
    pub short_answer_count: i64,
    #[serde(default = "all")]
    pub complete_count: i64,
    #[serde(default = "yes")]
    pub generate_pdf: bool,
    #[serde(default)]
    pub html_parsing: bool,
}

impl GenerateRequest {
    pub fn output_kind(&self) -> Result<OutputKind, Error> {
        Ok(OutputKind::from_str(&self.output)?)
    }

    pub fn limits(&self) -> TypeLimits {
        TypeLimits {
            multiple_choice: self.multiple_choice_count,
            true_false: self.true_false_count,
            short_answer: self.short_answer_count,
            complete: self.complete_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerationResult {
    pub document_title: String,
    pub base_filename: String,
    pub generate_pdf: bool,
    /// Public URL per produced file, plus `<file>_error` and `pdf_skipped` notes
    pub files: BTreeMap<String, String>,
    pub s3_uploads: BundleUpload,
}

/// Files written for one document, in upload order, and what went wrong.
#[derive(Debug, Default)]
struct Produced {
    outputs: Vec<(String, PathBuf)>,
    notes: BTreeMap<String, String>,
}

const VARIANTS: [&str; 2] = ["no_solutions", "with_solutions"];

pub fn work_dir(state: &AppState) -> Result<TempDir, Error> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("worksheet-");
    let dir = match &state.env_vars.work_dir {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    };
    Ok(dir.context("creating work directory")?)
}

async fn write_json(generated: &Generated, path: &Path) -> Result<(), Error> {
    let bytes = serde_json::to_vec_pretty(generated)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

async fn write_docx(generated: &Generated, path: &Path) -> Result<(), Error> {
    let bytes = render_docx(generated, &RenderOptions::default())?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// JSON and DOCX for both variants, then PDF for every DOCX written.
async fn produce_files(
    state: &AppState,
    variants: [&Generated; 2],
    base_filename: &str,
    dir: &Path,
    generate_pdf: bool,
) -> Produced {
    let mut produced = Produced::default();

    for (variant, generated) in VARIANTS.iter().zip(variants) {
        let label = format!("json_{variant}");
        let path = dir.join(format!("{base_filename}_{variant}.json"));
        match write_json(generated, &path).await {
            Ok(()) => produced.outputs.push((label, path)),
            Err(e) => {
                produced.notes.insert(format!("{label}_error"), e.to_string());
            }
        }
    }

    let mut docx_paths = vec![];
    for (variant, generated) in VARIANTS.iter().zip(variants) {
        let label = format!("docx_{variant}");
        let path = dir.join(format!("{base_filename}_{variant}.docx"));
        match write_docx(generated, &path).await {
            Ok(()) => {
                docx_paths.push((*variant, path.clone()));
                produced.outputs.push((label, path));
            }
            Err(e) => {
                warn!(label, "docx rendering failed: {e}");
                produced.notes.insert(format!("{label}_error"), e.to_string());
            }
        }
    }

    if !generate_pdf {
        produced.notes.insert(
            "pdf_skipped".to_string(),
            "PDF generation disabled by user".to_string(),
        );
        return produced;
    }

    for (variant, docx_path) in docx_paths {
        let label = format!("pdf_{variant}");
        let pdf_path = docx_path.with_extension("pdf");
        match state.converter.convert(&docx_path, &pdf_path).await {
            Ok(_) => produced.outputs.push((label, pdf_path)),
            Err(e) => {
                produced.notes.insert(format!("{label}_error"), e.to_string());
            }
        }
    }
    produced
}

fn build_limited(
    source: AiSource,
    keep_html: bool,
    kind: OutputKind,
    limits: &TypeLimits,
    num_questions: i64,
) -> Generated {
    let mut generated = build_from_ai_documents(source, keep_html, kind);
    apply_type_limits(&mut generated, limits);
    apply_legacy_limit(&mut generated, num_questions);
    generated
}

/// Builds the requested document, writes it with and without answers as
/// JSON, DOCX and optionally PDF, and uploads everything to one folder.
#[instrument(skip(state, request), fields(document_uuid = %request.document_uuid), err(Debug))]
pub async fn generate_documents(
    state: &AppState,
    request: &GenerateRequest,
) -> Result<GenerationResult, Error> {
    let kind = request.output_kind()?;
    let source = db::load_ai_source(&state.ai_db(), &request.document_uuid).await?;
    let generated = build_limited(
        source,
        request.html_parsing,
        kind,
        &request.limits(),
        request.num_questions,
    );
    publish(state, generated, kind, request.generate_pdf).await
}

/// Writes `generated` with and without answers and uploads the bundle. The
/// work directory is removed before this returns.
async fn publish(
    state: &AppState,
    generated: Generated,
    kind: OutputKind,
    generate_pdf: bool,
) -> Result<GenerationResult, Error> {
    let document_title = generated.title().to_string();
    let title_stem = sanitize_file_stem(&document_title);
    let base_filename = format!("{title_stem}{}", kind.file_suffix());
    let stripped = generated.without_answers();

    let dir = work_dir(state)?;
    let produced = produce_files(
        state,
        [&stripped, &generated],
        &base_filename,
        dir.path(),
        generate_pdf,
    )
    .await;

    let s3_uploads = state
        .storage
        .upload_bundle(&produced.outputs, &format!("worksheets/{title_stem}"))
        .await;

    let mut files = produced.notes;
    for (label, uploaded) in &s3_uploads.files {
        files.insert(label.clone(), uploaded.public_url.clone());
    }

    info!(
        files = produced.outputs.len(),
        status = ?s3_uploads.status,
        "generated documents"
    );

    Ok(GenerationResult {
        document_title,
        base_filename,
        generate_pdf,
        files,
        s3_uploads,
    })
}

#[derive(Debug)]
pub struct SingleFile {
    pub path: PathBuf,
    pub format: &'static str,
    pub pdf_conversion_failed: bool,
}

/// One DOCX, converted to PDF when asked. A failed conversion hands back the
/// DOCX instead.
#[allow(clippy::too_many_arguments)]
pub async fn generate_single(
    state: &AppState,
    source: AiSource,
    kind: OutputKind,
    limits: &TypeLimits,
    include_solutions: bool,
    generate_pdf: bool,
    keep_html: bool,
    path: &Path,
) -> Result<SingleFile, Error> {
    let mut generated = build_limited(source, keep_html, kind, limits, 0);
    if !include_solutions {
        generated = generated.without_answers();
    }

    let docx_path = path.with_extension("docx");
    write_docx(&generated, &docx_path).await?;
    if !generate_pdf {
        return Ok(SingleFile {
            path: docx_path,
            format: "docx",
            pdf_conversion_failed: false,
        });
    }

    let pdf_path = path.with_extension("pdf");
    match state.converter.convert(&docx_path, &pdf_path).await {
        Ok(_) => Ok(SingleFile {
            path: pdf_path,
            format: "pdf",
            pdf_conversion_failed: false,
        }),
        Err(ConversionError::MissingInput(p)) => Err(Error::Server(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("docx disappeared before conversion: {}", p.display()),
        )),
        Err(e) => {
            warn!("falling back to docx: {e}");
            Ok(SingleFile {
                path: docx_path,
                format: "docx",
                pdf_conversion_failed: true,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAllRequest {
    pub document_uuid: String,
    #[serde(default, rename = "override")]
    pub override_existing: bool,
    #[serde(default = "all")]
    pub worksheet_multiple_choice_count: i64,
    #[serde(default = "all")]
    pub worksheet_true_false_count: i64,
    #[serde(default = "all")]
    pub worksheet_short_answer_count: i64,
    #[serde(default = "all")]
    pub worksheet_complete_count: i64,
    #[serde(default = "all")]
    pub question_bank_multiple_choice_count: i64,
    #[serde(default = "all")]
    pub question_bank_true_false_count: i64,
    #[serde(default = "all")]
    pub question_bank_short_answer_count: i64,
    #[serde(default = "all")]
    pub question_bank_complete_count: i64,
    #[serde(default)]
    pub generate_pdf: bool,
    #[serde(default)]
    pub html_parsing: bool,
}

impl CreateAllRequest {
    pub fn worksheet_limits(&self) -> TypeLimits {
        TypeLimits {
            multiple_choice: self.worksheet_multiple_choice_count,
            true_false: self.worksheet_true_false_count,
            short_answer: self.worksheet_short_answer_count,
            complete: self.worksheet_complete_count,
        }
    }

    pub fn question_bank_limits(&self) -> TypeLimits {
        TypeLimits {
            multiple_choice: self.question_bank_multiple_choice_count,
            true_false: self.question_bank_true_false_count,
            short_answer: self.question_bank_short_answer_count,
            complete: self.question_bank_complete_count,
        }
    }
}

/// The four documents `create_all` produces, by their standard name.
pub const STANDARD_DOCUMENTS: [(OutputKind, bool); 4] = [
    (OutputKind::Worksheet, true),
    (OutputKind::Worksheet, false),
    (OutputKind::QuestionBank, true),
    (OutputKind::QuestionBank, false),
];

pub fn standard_name(kind: OutputKind, solutions: bool) -> String {
    let variant = if solutions { "with_solutions" } else { "no_solutions" };
    format!("{}_{variant}", kind.as_str())
}

/// Standard name of a stored object, if it is one of the four documents.
fn standard_name_of(key: &str) -> Option<String> {
    let file_name = key.rsplit('/').next()?;
    let (stem, _ext) = file_name.split_once('.')?;
    STANDARD_DOCUMENTS
        .iter()
        .map(|(kind, solutions)| standard_name(*kind, *solutions))
        .find(|name| name == stem)
}

#[derive(Debug, Serialize)]
pub struct CreatedFile {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub format: &'static str,
    pub solutions: bool,
    pub s3_key: String,
    pub public_url: String,
    pub standard_name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pdf_conversion_failed: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateSummary {
    pub total_requested: usize,
    pub successfully_created: usize,
    pub failed: usize,
    pub success_rate: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionCounts {
    pub worksheet: TypeLimits,
    pub question_bank: TypeLimits,
}

#[derive(Debug, Serialize)]
pub struct ExistingDocuments {
    pub document_uuid: String,
    pub folder_path: String,
    pub exists: bool,
    pub override_required: bool,
    pub existing_files: BTreeMap<String, String>,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CreatedDocuments {
    pub document_uuid: String,
    pub folder_path: String,
    pub status: UploadStatus,
    pub created_files: BTreeMap<String, CreatedFile>,
    pub errors: BTreeMap<String, String>,
    pub summary: CreateSummary,
    pub question_counts: QuestionCounts,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreateAllOutcome {
    Existing(ExistingDocuments),
    Created(CreatedDocuments),
}

impl CreateAllOutcome {
    pub fn success(&self) -> bool {
        match self {
            CreateAllOutcome::Existing(_) => true,
            CreateAllOutcome::Created(created) => created.status.stored_anything(),
        }
    }
}

async fn existing_documents(state: &AppState, folder_path: &str) -> BTreeMap<String, String> {
    match state.storage.list_files(&format!("{folder_path}/"), 1000).await {
        Ok(listing) => listing
            .files
            .into_iter()
            .filter_map(|file| Some((standard_name_of(&file.key)?, file.public_url)))
            .collect(),
        Err(e) => {
            warn!("could not check existing files: {e}");
            BTreeMap::new()
        }
    }
}

/// Worksheet and question bank, each with and without answers, stored under
/// `all_data/<document_uuid>/<standard name>.<docx|pdf>`.
///
/// Existing documents are returned untouched unless `override` is set.
#[instrument(skip(state, request), fields(document_uuid = %request.document_uuid), err(Debug))]
pub async fn create_all(
    state: &AppState,
    request: &CreateAllRequest,
) -> Result<CreateAllOutcome, Error> {
    if uuid::Uuid::parse_str(&request.document_uuid).is_err() {
        return Err(Error::BadRequest("Invalid document UUID format".to_string()));
    }
    let folder_path = format!("all_data/{}", request.document_uuid);

    let existing_files = existing_documents(state, &folder_path).await;
    if !existing_files.is_empty() && !request.override_existing {
        return Ok(CreateAllOutcome::Existing(ExistingDocuments {
            document_uuid: request.document_uuid.clone(),
            folder_path,
            exists: true,
            override_required: true,
            existing_files,
            message: "Documents already exist. Use override=true to regenerate.",
        }));
    }

    let source = db::load_ai_source(&state.ai_db(), &request.document_uuid).await?;
    let dir = work_dir(state)?;

    let mut created_files = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for (kind, solutions) in STANDARD_DOCUMENTS {
        let name = standard_name(kind, solutions);
        let limits = match kind {
            OutputKind::Worksheet => request.worksheet_limits(),
            OutputKind::QuestionBank => request.question_bank_limits(),
        };

        let file = match generate_single(
            state,
            source.clone(),
            kind,
            &limits,
            solutions,
            request.generate_pdf,
            request.html_parsing,
            &dir.path().join(&name),
        )
        .await
        {
            Ok(file) => file,
            Err(e) => {
                warn!(name, "generation failed: {e}");
                errors.insert(name, e.to_string());
                continue;
            }
        };

        let s3_key = format!("{folder_path}/{name}.{}", file.format);
        match state
            .storage
            .upload_file(&file.path, &s3_key, Some(content_type_for(&file.path)))
            .await
        {
            Ok(uploaded) => {
                created_files.insert(
                    name.clone(),
                    CreatedFile {
                        kind: kind.as_str(),
                        format: file.format,
                        solutions,
                        s3_key,
                        public_url: uploaded.public_url,
                        standard_name: name,
                        pdf_conversion_failed: file.pdf_conversion_failed,
                    },
                );
            }
            Err(e) => {
                errors.insert(name, e.to_string());
            }
        }
    }

    let total = STANDARD_DOCUMENTS.len();
    let summary = CreateSummary {
        total_requested: total,
        successfully_created: created_files.len(),
        failed: errors.len(),
        success_rate: format!("{}/{total}", created_files.len()),
    };

    Ok(CreateAllOutcome::Created(CreatedDocuments {
        document_uuid: request.document_uuid.clone(),
        folder_path,
        status: UploadStatus::from_counts(created_files.len(), errors.len()),
        created_files,
        errors,
        summary,
        question_counts: QuestionCounts {
            worksheet: request.worksheet_limits(),
            question_bank: request.question_bank_limits(),
        },
        created_at: Utc::now().to_rfc3339(),
    }))
}

/// Worksheet or question bank JSON from the legacy lesson database.
#[instrument(skip(state), err(Debug))]
pub async fn legacy_from_lesson(
    state: &AppState,
    lesson_id: &str,
    kind: OutputKind,
    num_questions: i64,
    keep_html: bool,
) -> Result<Generated, Error> {
    let bundle = db::load_lesson_bundle(&state.legacy_db(), lesson_id).await?;
    let mut generated = build_from_lesson(bundle, keep_html, kind);
    apply_legacy_limit(&mut generated, num_questions);
    Ok(generated)
}


#[cfg(all(test, unix))]
mod pipeline_tests {
    use std::time::Duration;

    use axum::http::header;
    use bson::{doc, oid::ObjectId};
    use mongodb::options::ClientOptions;

    use super::*;
    use crate::{
        config::{EnvVars, Environment},
        convert::{
            ConversionMethod, Converter,
            tests::{broken, fake_unoconv},
        },
        s3::{
            Storage,
            tests::{offline_storage, storage_at},
        },
    };

    const DOCUMENT_UUID: &str = "2f1c7a52-3b1e-4d6a-9a53-0c8e6f9d1b20";
    const PUBLIC_BASE: &str = "https://files.example.com";

    fn env_vars(work_dir: &Path) -> EnvVars {
        EnvVars {
            conversion_retries: 0,
            conversion_timeout: Duration::from_secs(10),
            db_name: "ai".to_string(),
            environment: Environment::Development,
            legacy_db_name: "ien".to_string(),
            legacy_mongodb_uri: "mongodb://127.0.0.1:9".to_string(),
            libreoffice_paths: vec![],
            mongodb_uri: "mongodb://127.0.0.1:9".to_string(),
            port: 0,
            request_body_size_limit: 1024,
            request_timeout_in_ms: 5_000,
            s3_access_key_id: "id".to_string(),
            s3_bucket_name: "worksheets".to_string(),
            s3_endpoint: "http://127.0.0.1:9".to_string(),
            s3_public_url: Some(PUBLIC_BASE.to_string()),
            s3_region: "auto".to_string(),
            s3_secret_access_key: "secret".to_string(),
            sentry_dsn: None,
            unoconv_path: "/nonexistent/unoconv".to_string(),
            work_dir: Some(work_dir.to_path_buf()),
        }
    }

    /// Nothing listens on the discard port, so database calls fail fast.
    async fn state(tool: ConversionMethod, storage: Storage, work_dir: &Path) -> AppState {
        let env_vars = env_vars(work_dir);
        let mut options = ClientOptions::parse(&env_vars.mongodb_uri).await.unwrap();
        options.server_selection_timeout = Some(Duration::from_millis(200));
        let client = mongodb::Client::with_options(options).unwrap();
        AppState {
            legacy_client: client.clone(),
            client,
            storage,
            converter: Converter::new(vec![tool], Duration::from_secs(10), 0),
            env_vars,
        }
    }

    fn source() -> AiSource {
        let questions_raw = doc! {
            "_id": ObjectId::new(),
            "document_uuid": DOCUMENT_UUID,
            "filename": "الكسور",
            "questions": {
                "multiple_choice": [
                    { "question": "نصف العدد 4؟", "choices": ["1", "2", "3", "4"], "answer_key": 1 }
                ],
                "short_answer": [
                    { "question": "عرّف الكسر", "answer": "جزء من كل" }
                ]
            }
        };
        let worksheet_raw = doc! {
            "_id": ObjectId::new(),
            "document_uuid": DOCUMENT_UUID,
            "filename": "الكسور",
            "worksheet": {
                "goals": ["يتعرف الكسر"],
                "vocabulary": [{ "term": "البسط", "definition": "العدد العلوي" }]
            }
        };
        AiSource {
            questions: bson::from_document(questions_raw.clone()).unwrap(),
            worksheet: bson::from_document(worksheet_raw.clone()).unwrap(),
            questions_raw,
            worksheet_raw,
        }
    }

    fn generated() -> Generated {
        build_from_ai_documents(source(), false, OutputKind::Worksheet)
    }

    fn labels(produced: &Produced) -> Vec<&str> {
        produced.outputs.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// Answers every request with a bucket listing holding `keys`.
    async fn listing_server(keys: &[String]) -> String {
        let contents: String = keys
            .iter()
            .map(|key| format!("<Contents><Key>{key}</Key><Size>10</Size></Contents>"))
            .collect();
        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>worksheets</Name><KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys><IsTruncated>false</IsTruncated>{contents}</ListBucketResult>"#,
            keys.len()
        );
        let app = axum::Router::new().fallback(move || async move {
            ([(header::CONTENT_TYPE, "application/xml")], body)
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn create_all_request(override_existing: bool) -> CreateAllRequest {
        serde_json::from_value(serde_json::json!({
            "document_uuid": DOCUMENT_UUID,
            "override": override_existing,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn disabled_pdf_is_noted() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let state = state(
            ConversionMethod::Unoconv(fake_unoconv(tools.path())),
            offline_storage(PUBLIC_BASE),
            work.path(),
        )
        .await;

        let generated = generated();
        let stripped = generated.without_answers();
        let produced =
            produce_files(&state, [&stripped, &generated], "bank", work.path(), false).await;

        assert_eq!(
            labels(&produced),
            ["json_no_solutions", "json_with_solutions", "docx_no_solutions", "docx_with_solutions"]
        );
        assert_eq!(produced.notes.len(), 1);
        assert_eq!(produced.notes["pdf_skipped"], "PDF generation disabled by user");
        assert!(!work.path().join("bank_no_solutions.pdf").exists());
    }

    #[tokio::test]
    async fn every_docx_gets_a_pdf() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let state = state(
            ConversionMethod::Unoconv(fake_unoconv(tools.path())),
            offline_storage(PUBLIC_BASE),
            work.path(),
        )
        .await;

        let generated = generated();
        let stripped = generated.without_answers();
        let produced =
            produce_files(&state, [&stripped, &generated], "bank", work.path(), true).await;

        assert!(produced.notes.is_empty(), "{:?}", produced.notes);
        assert_eq!(&labels(&produced)[4..], ["pdf_no_solutions", "pdf_with_solutions"]);
        assert!(work.path().join("bank_with_solutions.pdf").exists());
    }

    #[tokio::test]
    async fn failed_conversion_is_noted_per_variant() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let state = state(
            ConversionMethod::Unoconv(broken(tools.path(), "unoconv")),
            offline_storage(PUBLIC_BASE),
            work.path(),
        )
        .await;

        let generated = generated();
        let stripped = generated.without_answers();
        let produced =
            produce_files(&state, [&stripped, &generated], "bank", work.path(), true).await;

        assert_eq!(labels(&produced).len(), 4);
        for variant in VARIANTS {
            assert_eq!(
                produced.notes[&format!("pdf_{variant}_error")],
                "DOCX to PDF conversion failed - check server PDF conversion tools (LibreOffice/unoconv)"
            );
            assert!(work.path().join(format!("bank_{variant}_fallback.docx")).exists());
        }
    }

    #[tokio::test]
    async fn work_directory_is_removed_after_upload() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let state = state(
            ConversionMethod::Unoconv(fake_unoconv(tools.path())),
            offline_storage(PUBLIC_BASE),
            work.path(),
        )
        .await;

        let result = publish(&state, generated(), OutputKind::Worksheet, false)
            .await
            .unwrap();

        assert!(result.document_title.contains("الكسور"));
        assert!(result.base_filename.ends_with(OutputKind::Worksheet.file_suffix()));
        assert_eq!(result.s3_uploads.status, UploadStatus::Error);
        assert_eq!(result.s3_uploads.errors.len(), 4);
        assert_eq!(result.files.keys().map(String::as_str).collect::<Vec<_>>(), ["pdf_skipped"]);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn single_file_falls_back_to_docx() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let state = state(
            ConversionMethod::Unoconv(broken(tools.path(), "unoconv")),
            offline_storage(PUBLIC_BASE),
            work.path(),
        )
        .await;

        let file = generate_single(
            &state,
            source(),
            OutputKind::QuestionBank,
            &TypeLimits::default(),
            false,
            true,
            false,
            &work.path().join("question_bank_no_solutions"),
        )
        .await
        .unwrap();

        assert_eq!(file.format, "docx");
        assert!(file.pdf_conversion_failed);
        assert_eq!(file.path, work.path().join("question_bank_no_solutions.docx"));
        assert!(file.path.exists());
    }

    #[tokio::test]
    async fn single_file_converts_when_a_tool_works() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let state = state(
            ConversionMethod::Unoconv(fake_unoconv(tools.path())),
            offline_storage(PUBLIC_BASE),
            work.path(),
        )
        .await;

        let file = generate_single(
            &state,
            source(),
            OutputKind::Worksheet,
            &TypeLimits::default(),
            true,
            true,
            false,
            &work.path().join("worksheet_with_solutions"),
        )
        .await
        .unwrap();

        assert_eq!(file.format, "pdf");
        assert!(!file.pdf_conversion_failed);
        assert_eq!(file.path, work.path().join("worksheet_with_solutions.pdf"));
    }

    #[tokio::test]
    async fn existing_documents_are_returned_without_override() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let endpoint = listing_server(&[
            format!("all_data/{DOCUMENT_UUID}/worksheet_with_solutions.pdf"),
            format!("all_data/{DOCUMENT_UUID}/mindmap.png"),
        ])
        .await;
        let state = state(
            ConversionMethod::Unoconv(fake_unoconv(tools.path())),
            storage_at(&endpoint, PUBLIC_BASE),
            work.path(),
        )
        .await;

        let outcome = create_all(&state, &create_all_request(false)).await.unwrap();

        assert!(outcome.success());
        let CreateAllOutcome::Existing(existing) = outcome else {
            panic!("expected the stored documents to be reused");
        };
        assert!(existing.override_required);
        assert_eq!(existing.folder_path, format!("all_data/{DOCUMENT_UUID}"));
        assert_eq!(existing.existing_files.len(), 1);
        assert_eq!(
            existing.existing_files["worksheet_with_solutions"],
            format!("{PUBLIC_BASE}/all_data/{DOCUMENT_UUID}/worksheet_with_solutions.pdf")
        );
    }

    #[tokio::test]
    async fn override_regenerates_existing_documents() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let endpoint =
            listing_server(&[format!("all_data/{DOCUMENT_UUID}/worksheet_no_solutions.docx")]).await;
        let state = state(
            ConversionMethod::Unoconv(fake_unoconv(tools.path())),
            storage_at(&endpoint, PUBLIC_BASE),
            work.path(),
        )
        .await;

        // Regenerating reads the source documents, which the offline database refuses.
        let result = create_all(&state, &create_all_request(true)).await;
        assert!(matches!(result, Err(Error::Mongo(_))), "{result:?}");
    }
}
