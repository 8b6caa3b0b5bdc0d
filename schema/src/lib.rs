//! Document types stored in the `ai` and legacy `ien` databases.
//!
//! Generated content is written by an upstream pipeline, so most fields are
//! optional and defaulted when absent.
use mongodb::bson::{Bson, Document, oid::ObjectId};
use serde::{Deserialize, Deserializer, Serialize};

pub mod db;
pub mod json;

pub const QUESTIONS_COLLECTION: &str = "questions";
pub const WORKSHEETS_COLLECTION: &str = "worksheets";
pub const MINDMAPS_COLLECTION: &str = "mindmaps";

pub const LESSONS_COLLECTION: &str = "lessons";
pub const LESSON_GOALS_COLLECTION: &str = "lessonmappinggoals";
pub const LESSON_ACTIVITIES_COLLECTION: &str = "lessonplanactivities";
pub const SEMESTERS_COLLECTION: &str = "semesters";
pub const LEVELS_COLLECTION: &str = "levels";
pub const SUBJECTS_COLLECTION: &str = "subjects";
pub const STAGES_COLLECTION: &str = "stages";

/// A stored `null` reads the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionsDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub document_uuid: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: QuestionSets,
    #[serde(default)]
    pub generated_at: Option<Bson>,
}

impl QuestionsDocument {
    pub fn total_questions(&self) -> usize {
        let sets = &self.questions;
        sets.multiple_choice.len()
            + sets.true_false.len()
            + sets.short_answer.len()
            + sets.complete.len()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestionSets {
    #[serde(default, deserialize_with = "null_as_default")]
    pub multiple_choice: Vec<RawChoiceQuestion>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub true_false: Vec<RawTrueFalseQuestion>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub short_answer: Vec<RawWrittenQuestion>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub complete: Vec<RawWrittenQuestion>,
}

/// `answer_key` has been stored as an index, a boolean and a string over time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawChoiceQuestion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<String>,
    #[serde(default)]
    pub answer_key: Option<Bson>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawTrueFalseQuestion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default)]
    pub answer_key: Option<Bson>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawWrittenQuestion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorksheetDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub document_uuid: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub worksheet: WorksheetContent,
    #[serde(default)]
    pub generated_at: Option<Bson>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorksheetContent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub goals: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub applications: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vocabulary: Vec<VocabularyItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub teacher_guidelines: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VocabularyItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub term: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub definition: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MindmapDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub document_uuid: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mindmap: Document,
    #[serde(default)]
    pub generated_at: Option<Bson>,
}

impl MindmapDocument {
    pub fn nodes(&self) -> &[Bson] {
        match self.mindmap.get_array("nodeDataArray") {
            Ok(nodes) => nodes.as_slice(),
            Err(_) => &[],
        }
    }
}

// Legacy `ien` database

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default)]
    pub lesson_id: Option<Bson>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lesson_map_goals: Vec<Bson>,
    #[serde(default)]
    pub lesson_plan: Option<Bson>,
    #[serde(default)]
    pub semester: Option<Bson>,
    #[serde(default)]
    pub level: Option<Bson>,
    #[serde(default)]
    pub subject: Option<Bson>,
    #[serde(default)]
    pub stage: Option<Bson>,
}

impl Lesson {
    /// Goal references that parse as object ids. Anything else is skipped.
    pub fn goal_ids(&self) -> Vec<ObjectId> {
        self.lesson_map_goals
            .iter()
            .filter_map(|goal| match goal {
                Bson::ObjectId(oid) => Some(*oid),
                Bson::String(s) => ObjectId::parse_str(s).ok(),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LessonGoal {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LessonActivity {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Comma separated goal object ids
    #[serde(default)]
    pub goals: Option<Bson>,
}

impl LessonActivity {
    pub fn goal_ids(&self) -> Vec<ObjectId> {
        let raw = match &self.goals {
            Some(Bson::String(s)) => s.clone(),
            Some(Bson::Null) | None => return vec![],
            Some(other) => other.to_string(),
        };
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| ObjectId::parse_str(part).ok())
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyQuestion {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub question_type_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question_answers: Vec<LegacyAnswer>,
    #[serde(default)]
    pub hint: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAnswer {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_true: Option<bool>,
}

/// Semester, level, subject and stage records only matter for their title.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Titled {
    #[serde(default)]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, doc};

    #[test]
    fn questions_document_tolerates_missing_sets() {
        let raw = doc! {
            "_id": ObjectId::new(),
            "document_uuid": "0b7c6a6e-5d43-4a3c-9a0e-2d0f0e3a9c11",
            "questions": {
                "multiple_choice": [
                    { "question": "ما عاصمة مصر؟", "choices": ["القاهرة", "دبي"], "answer_key": 0 }
                ]
            }
        };
        let parsed: QuestionsDocument = bson::from_document(raw).unwrap();
        assert_eq!(parsed.questions.multiple_choice.len(), 1);
        assert!(parsed.questions.true_false.is_empty());
        assert_eq!(parsed.total_questions(), 1);
        assert_eq!(parsed.filename, None);
    }

    #[test]
    fn null_lists_read_as_empty() {
        let question: LegacyQuestion = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "title": "اختر الإجابة",
            "questionAnswers": null,
        })
        .unwrap();
        assert!(question.question_answers.is_empty());

        let lesson: Lesson = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "lessonMapGoals": null,
        })
        .unwrap();
        assert!(lesson.goal_ids().is_empty());

        let worksheet: WorksheetDocument = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "document_uuid": "x",
            "worksheet": { "goals": null, "vocabulary": null },
        })
        .unwrap();
        assert!(worksheet.worksheet.goals.is_empty());
        assert!(worksheet.worksheet.vocabulary.is_empty());

        let questions: QuestionsDocument = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "document_uuid": "x",
            "questions": null,
        })
        .unwrap();
        assert_eq!(questions.total_questions(), 0);
    }

    #[test]
    fn lesson_goal_ids_skip_invalid_entries() {
        let goal = ObjectId::new();
        let lesson = Lesson {
            id: ObjectId::new(),
            lesson_id: None,
            title: None,
            lesson_map_goals: vec![
                Bson::ObjectId(goal),
                Bson::String("not-an-id".into()),
                Bson::String(goal.to_hex()),
            ],
            lesson_plan: None,
            semester: None,
            level: None,
            subject: None,
            stage: None,
        };
        assert_eq!(lesson.goal_ids(), vec![goal, goal]);
    }

    #[test]
    fn activity_goals_are_comma_separated() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let activity = LessonActivity {
            id: ObjectId::new(),
            goals: Some(Bson::String(format!("{a}, ,{b},junk"))),
        };
        assert_eq!(activity.goal_ids(), vec![a, b]);
    }

    #[test]
    fn mindmap_nodes_default_to_empty() {
        let mindmap: MindmapDocument = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "document_uuid": "x",
        })
        .unwrap();
        assert!(mindmap.nodes().is_empty());
    }
}
