use std::collections::HashSet;

use bson::{Bson, Document, doc, oid::ObjectId};
use futures_util::TryStreamExt;
use mongodb::Database;
use serde::Serialize;
use serde_json::{Value, json};

use schema::{
    LESSON_ACTIVITIES_COLLECTION, LESSON_GOALS_COLLECTION, LESSONS_COLLECTION, LEVELS_COLLECTION,
    Lesson, LessonActivity, LessonGoal, LegacyQuestion, MINDMAPS_COLLECTION, MindmapDocument,
    QUESTIONS_COLLECTION, QuestionsDocument, SEMESTERS_COLLECTION, STAGES_COLLECTION,
    SUBJECTS_COLLECTION, Titled, WORKSHEETS_COLLECTION, WorksheetDocument,
    db::{contains_filter, get_collection, get_raw_collection},
    json::{document_to_plain_json, to_plain_json},
};
use worksheet_utils::build::{AiSource, LessonBundle};

use crate::error::Error;

const MINDMAP_PREVIEW_NODES: usize = 5;

#[derive(Debug, Serialize)]
pub struct SearchResults<T> {
    pub query: String,
    pub total_results: usize,
    pub results: Vec<T>,
}

impl<T> SearchResults<T> {
    fn new(query: &str, results: Vec<T>) -> Self {
        SearchResults {
            query: query.to_string(),
            total_results: results.len(),
            results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentHit {
    #[serde(rename = "_id")]
    pub id: String,
    pub document_uuid: String,
    pub filename: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions_count: Option<usize>,
    pub generated_at: Value,
}

#[derive(Debug, Serialize)]
pub struct MindmapHit {
    #[serde(rename = "_id")]
    pub id: String,
    pub document_uuid: String,
    pub filename: Option<String>,
    pub node_count: usize,
    pub has_mindmap_data: bool,
    pub generated_at: Value,
}

#[derive(Debug, Serialize)]
pub struct LessonHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "lessonId")]
    pub lesson_id: Value,
    pub title: String,
    pub semester: Option<String>,
    pub level: Option<String>,
    pub subject: Option<String>,
    pub stage: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LessonSearch {
    pub query: String,
    pub total_found: usize,
    pub lessons: Vec<LessonHit>,
}

fn uuid_or_filename(query: &str) -> Document {
    doc! {
        "$or": [
            { "document_uuid": query },
            contains_filter("filename", query),
        ]
    }
}

fn optional_json(value: Option<Bson>) -> Value {
    value.map(to_plain_json).unwrap_or(Value::Null)
}

/// Worksheets first, then question documents whose uuid has not been seen.
#[tracing::instrument(skip(db), err(Debug))]
pub async fn search_documents(
    db: &Database,
    query: &str,
    limit: i64,
) -> Result<SearchResults<DocumentHit>, Error> {
    let worksheets: Vec<WorksheetDocument> =
        get_collection::<WorksheetDocument>(db, WORKSHEETS_COLLECTION)
            .find(uuid_or_filename(query))
            .limit(limit)
            .await?
            .try_collect()
            .await?;
    let questions: Vec<QuestionsDocument> =
        get_collection::<QuestionsDocument>(db, QUESTIONS_COLLECTION)
            .find(uuid_or_filename(query))
            .limit(limit)
            .await?
            .try_collect()
            .await?;

    let mut seen = HashSet::new();
    let mut results = vec![];
    for worksheet in worksheets {
        seen.insert(worksheet.document_uuid.clone());
        results.push(DocumentHit {
            id: worksheet.id.to_hex(),
            goals_count: Some(worksheet.worksheet.goals.len()),
            questions_count: None,
            kind: "worksheet",
            document_uuid: worksheet.document_uuid,
            filename: worksheet.filename,
            generated_at: optional_json(worksheet.generated_at),
        });
    }
    for question_doc in questions {
        if seen.contains(&question_doc.document_uuid) {
            continue;
        }
        results.push(DocumentHit {
            id: question_doc.id.to_hex(),
            goals_count: None,
            questions_count: Some(question_doc.total_questions()),
            kind: "questions",
            document_uuid: question_doc.document_uuid,
            filename: question_doc.filename,
            generated_at: optional_json(question_doc.generated_at),
        });
    }

    Ok(SearchResults::new(query, results))
}

/// Raw `worksheets` and `questions` documents sharing `document_uuid`.
#[tracing::instrument(skip(db), err(Debug))]
pub async fn document_details(db: &Database, document_uuid: &str) -> Result<Value, Error> {
    let filter = doc! { "document_uuid": document_uuid };
    let worksheet = get_raw_collection(db, WORKSHEETS_COLLECTION)
        .find_one(filter.clone())
        .await?;
    let questions = get_raw_collection(db, QUESTIONS_COLLECTION)
        .find_one(filter)
        .await?;

    if worksheet.is_none() && questions.is_none() {
        return Err(Error::NotFound(format!(
            "Document not found: {document_uuid}"
        )));
    }

    Ok(json!({
        "document_uuid": document_uuid,
        "worksheet_data": worksheet.map(document_to_plain_json),
        "questions_data": questions.map(document_to_plain_json),
    }))
}

/// Both generated documents are needed to build a worksheet.
#[tracing::instrument(skip(db), err(Debug))]
pub async fn load_ai_source(db: &Database, document_uuid: &str) -> Result<AiSource, Error> {
    let filter = doc! { "document_uuid": document_uuid };
    let Some(questions_raw) = get_raw_collection(db, QUESTIONS_COLLECTION)
        .find_one(filter.clone())
        .await?
    else {
        return Err(Error::NotFound(format!(
            "No questions found for document_uuid={document_uuid}"
        )));
    };
    let Some(worksheet_raw) = get_raw_collection(db, WORKSHEETS_COLLECTION)
        .find_one(filter)
        .await?
    else {
        return Err(Error::NotFound(format!(
            "No worksheet found for document_uuid={document_uuid}"
        )));
    };

    Ok(AiSource {
        questions: bson::from_document(questions_raw.clone())?,
        worksheet: bson::from_document(worksheet_raw.clone())?,
        questions_raw,
        worksheet_raw,
    })
}

#[tracing::instrument(skip(db), err(Debug))]
pub async fn search_mindmaps(
    db: &Database,
    query: &str,
    limit: i64,
) -> Result<SearchResults<MindmapHit>, Error> {
    let mindmaps: Vec<MindmapDocument> =
        get_collection::<MindmapDocument>(db, MINDMAPS_COLLECTION)
            .find(uuid_or_filename(query))
            .limit(limit)
            .await?
            .try_collect()
            .await?;

    let results = mindmaps
        .into_iter()
        .map(|mindmap| MindmapHit {
            id: mindmap.id.to_hex(),
            node_count: mindmap.nodes().len(),
            has_mindmap_data: !mindmap.mindmap.is_empty(),
            document_uuid: mindmap.document_uuid,
            filename: mindmap.filename,
            generated_at: optional_json(mindmap.generated_at),
        })
        .collect();

    Ok(SearchResults::new(query, results))
}

/// Mind map metadata with either the full node data or the first few nodes.
#[tracing::instrument(skip(db), err(Debug))]
pub async fn mindmap_details(
    db: &Database,
    document_uuid: &str,
    include_full_data: bool,
) -> Result<Value, Error> {
    let Some(mindmap) = get_collection::<MindmapDocument>(db, MINDMAPS_COLLECTION)
        .find_one(doc! { "document_uuid": document_uuid })
        .await?
    else {
        return Err(Error::NotFound(format!(
            "Mindmap document with UUID={document_uuid} not found"
        )));
    };

    let filename = mindmap.filename.clone().unwrap_or_default();
    let node_count = mindmap.nodes().len();
    let mut details = json!({
        "document_uuid": document_uuid,
        "title": worksheet_utils::text::clean_text(&filename, false),
        "node_count": node_count,
        "filename": filename,
        "meta": {
            "filename": filename,
            "node_count": node_count,
            "document_uuid": document_uuid,
            "generated_at": optional_json(mindmap.generated_at.clone()),
        },
    });

    if include_full_data {
        details["mindmap_data"] = document_to_plain_json(mindmap.mindmap);
    } else if !mindmap.nodes().is_empty() {
        let sample: Vec<Value> = mindmap
            .nodes()
            .iter()
            .take(MINDMAP_PREVIEW_NODES)
            .cloned()
            .map(to_plain_json)
            .collect();
        details["sample_nodes"] = Value::Array(sample);
        details["total_nodes"] = node_count.into();
    }

    Ok(details)
}

fn bson_label(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn present(value: &Option<Bson>) -> Option<&Bson> {
    value.as_ref().filter(|v| !matches!(v, Bson::Null))
}

/// Lessons are addressed by object id or by `lessonId`, stored either as a
/// number or a string.
pub fn lesson_filter(identifier: &str) -> Document {
    if let Ok(oid) = ObjectId::parse_str(identifier) {
        return doc! { "_id": oid };
    }
    if let Ok(n) = identifier.trim().parse::<i64>() {
        return doc! {
            "$or": [
                { "lessonId": n },
                { "lessonId": identifier },
            ]
        };
    }
    doc! { "lessonId": identifier }
}

/// The identifier lookup of [`lesson_filter`], or a title containing `query`.
fn lesson_search_filter(query: &str) -> Document {
    doc! {
        "$or": [
            lesson_filter(query),
            contains_filter("title", query),
        ]
    }
}

#[tracing::instrument(skip(db), err(Debug))]
pub async fn search_lessons(db: &Database, query: &str, limit: i64) -> Result<LessonSearch, Error> {
    let lessons: Vec<Lesson> = get_collection::<Lesson>(db, LESSONS_COLLECTION)
        .find(lesson_search_filter(query))
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let label = |value: &Option<Bson>| present(value).map(bson_label);
    let hits: Vec<LessonHit> = lessons
        .iter()
        .map(|lesson| LessonHit {
            id: lesson.id.to_hex(),
            lesson_id: optional_json(lesson.lesson_id.clone()),
            title: lesson.title.clone().unwrap_or_else(|| "No title".to_string()),
            semester: label(&lesson.semester),
            level: label(&lesson.level),
            subject: label(&lesson.subject),
            stage: label(&lesson.stage),
        })
        .collect();

    Ok(LessonSearch {
        query: query.to_string(),
        total_found: hits.len(),
        lessons: hits,
    })
}

async fn find_lesson(db: &Database, identifier: &str) -> Result<(Document, Lesson), Error> {
    let Some(raw) = get_raw_collection(db, LESSONS_COLLECTION)
        .find_one(lesson_filter(identifier))
        .await?
    else {
        return Err(Error::NotFound(format!("Lesson not found: {identifier}")));
    };
    let lesson = bson::from_document(raw.clone())?;
    Ok((raw, lesson))
}

async fn find_by_reference(
    db: &Database,
    collection: &str,
    reference: &Option<Bson>,
) -> Result<Option<Document>, Error> {
    let Some(id) = present(reference) else {
        return Ok(None);
    };
    Ok(get_raw_collection(db, collection)
        .find_one(doc! { "_id": id.clone() })
        .await?)
}

async fn find_all(db: &Database, collection: &str, filter: Document) -> Result<Vec<Document>, Error> {
    Ok(get_raw_collection(db, collection)
        .find(filter)
        .await?
        .try_collect()
        .await?)
}

fn plain_list(docs: Vec<Document>) -> Value {
    Value::Array(docs.into_iter().map(document_to_plain_json).collect())
}

/// A lesson together with every document that references it.
#[tracing::instrument(skip(db), err(Debug))]
pub async fn lesson_details(db: &Database, identifier: &str) -> Result<Value, Error> {
    let (raw, lesson) = find_lesson(db, identifier).await?;

    let mut related = serde_json::Map::new();
    for (name, collection, reference) in [
        ("semester", SEMESTERS_COLLECTION, &lesson.semester),
        ("level", LEVELS_COLLECTION, &lesson.level),
        ("subject", SUBJECTS_COLLECTION, &lesson.subject),
        ("stage", STAGES_COLLECTION, &lesson.stage),
    ] {
        if present(reference).is_some() {
            let found = find_by_reference(db, collection, reference).await?;
            related.insert(name.to_string(), found.map(document_to_plain_json).into());
        }
    }

    let goal_ids = lesson.goal_ids();
    if !goal_ids.is_empty() {
        let goals = find_all(db, LESSON_GOALS_COLLECTION, doc! { "_id": { "$in": goal_ids } }).await?;
        related.insert("goals".to_string(), plain_list(goals));
    }
    let activities = find_all(db, LESSON_ACTIVITIES_COLLECTION, doc! { "lesson": lesson.id }).await?;
    related.insert("activities".to_string(), plain_list(activities));
    let questions = find_all(db, QUESTIONS_COLLECTION, doc! { "lesson": lesson.id }).await?;
    related.insert("questions".to_string(), plain_list(questions));

    Ok(json!({
        "lesson": document_to_plain_json(raw),
        "related_documents": related,
    }))
}

async fn related_title(
    db: &Database,
    collection: &str,
    reference: &Option<Bson>,
) -> Result<Option<String>, Error> {
    let Some(raw) = find_by_reference(db, collection, reference).await? else {
        return Ok(None);
    };
    let titled: Titled = bson::from_document(raw)?;
    Ok(titled.title)
}

/// Collects what the legacy generator needs about one lesson.
///
/// Goals come from the lesson's goal references, or from goals pointing back
/// at the lesson when it has none. Questions are matched by lesson, by any
/// goal (including goals named by the lesson plan's activities) and by lesson
/// plan.
#[tracing::instrument(skip(db), err(Debug))]
pub async fn load_lesson_bundle(db: &Database, identifier: &str) -> Result<LessonBundle, Error> {
    let (raw, lesson) = find_lesson(db, identifier).await?;

    let goal_ids = lesson.goal_ids();
    let mut goal_docs = if goal_ids.is_empty() {
        vec![]
    } else {
        find_all(db, LESSON_GOALS_COLLECTION, doc! { "_id": { "$in": goal_ids } }).await?
    };
    if goal_docs.is_empty() {
        goal_docs = find_all(db, LESSON_GOALS_COLLECTION, doc! { "lesson": lesson.id }).await?;
    }
    let goals: Vec<LessonGoal> = goal_docs
        .iter()
        .map(|d| bson::from_document(d.clone()))
        .collect::<Result<_, _>>()?;

    let mut activity_docs = find_all(db, LESSON_ACTIVITIES_COLLECTION, doc! { "lesson": lesson.id }).await?;
    if activity_docs.is_empty() {
        if let Some(plan) = present(&lesson.lesson_plan) {
            activity_docs = find_all(
                db,
                LESSON_ACTIVITIES_COLLECTION,
                doc! { "lessonPlan": plan.clone() },
            )
            .await?;
        }
    }
    let activities: Vec<LessonActivity> = activity_docs
        .iter()
        .map(|d| bson::from_document(d.clone()))
        .collect::<Result<_, _>>()?;

    let mut seen = HashSet::new();
    let all_goal_ids: Vec<ObjectId> = goals
        .iter()
        .map(|g| g.id)
        .chain(activities.iter().flat_map(LessonActivity::goal_ids))
        .filter(|id| seen.insert(*id))
        .collect();

    let mut question_filters = vec![doc! { "lesson": lesson.id }];
    if !all_goal_ids.is_empty() {
        question_filters.push(doc! { "goal": { "$in": all_goal_ids } });
    }
    if let Some(plan) = present(&lesson.lesson_plan) {
        question_filters.push(doc! { "lessonPlan": plan.clone() });
    }
    let questions: Vec<LegacyQuestion> = get_collection::<LegacyQuestion>(db, QUESTIONS_COLLECTION)
        .find(doc! { "$or": question_filters })
        .await?
        .try_collect()
        .await?;

    Ok(LessonBundle {
        title: lesson.title.clone(),
        goals: goals.iter().filter_map(|g| g.title.clone()).collect(),
        questions,
        subject: related_title(db, SUBJECTS_COLLECTION, &lesson.subject).await?,
        semester: related_title(db, SEMESTERS_COLLECTION, &lesson.semester).await?,
        level: related_title(db, LEVELS_COLLECTION, &lesson.level).await?,
        meta: json!({
            "lesson": document_to_plain_json(raw),
            "goals": plain_list(goal_docs),
            "activities": plain_list(activity_docs),
        }),
    })
}
