use std::str::FromStr;

use mongodb::bson::Document;
use schema::{LegacyQuestion, QuestionsDocument, WorksheetDocument, json::document_to_plain_json};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    error::Error,
    question::{ChoiceQuestion, Question, QuestionKind, WrittenQuestion, normalize_answer_key},
    text::{clean_optional, clean_text},
};

pub const MULTIPLE_CHOICE_HEADER: &str = ": اختر الإجابة الصحيحة";
pub const ESSAY_HEADER: &str = ": أجب عن الأسئلة التالية";
pub const WORKSHEET_TITLE_PREFIX: &str = "ورقة عمل - ";
pub const WORKSHEET_NUMBER: &str = "ورقة عمل 1";
pub const QUESTION_BANK_NUMBER: &str = "بنك أسئلة 1";
pub const NAME_LABEL: &str = " :الاسم";
pub const CLASS_LABEL: &str = " :الصف";
pub const MASTERY_LEVELS: [&str; 3] = ["ممتاز", "متوسط", "ضعيف"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Worksheet,
    QuestionBank,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Worksheet => "worksheet",
            OutputKind::QuestionBank => "question_bank",
        }
    }

    /// Suffix appended to the document title to form output file names.
    pub fn file_suffix(self) -> &'static str {
        match self {
            OutputKind::Worksheet => "_ورقة_عمل",
            OutputKind::QuestionBank => "_بنك_أسئله",
        }
    }
}

impl FromStr for OutputKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worksheet" => Ok(OutputKind::Worksheet),
            "question_bank" => Ok(OutputKind::QuestionBank),
            other => Err(Error::Validation(format!(
                "output must be 'worksheet' or 'question_bank', got '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub header: String,
    pub questions: Vec<Question>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeaderConfig {
    pub subject_memo: String,
    pub worksheet_number: String,
    pub name_label: String,
    pub class_label: String,
    pub semester: String,
    pub grade: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        HeaderConfig {
            subject_memo: String::new(),
            worksheet_number: WORKSHEET_NUMBER.to_string(),
            name_label: NAME_LABEL.to_string(),
            class_label: CLASS_LABEL.to_string(),
            semester: String::new(),
            grade: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sidebar {
    pub before_lesson: String,
    pub goal: Vec<String>,
    pub application: Vec<String>,
    pub level: Vec<String>,
    pub notice: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub term: String,
    pub definition: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub title: String,
    pub multiple_choice: Section,
    pub essay: Section,
    pub header_config: HeaderConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidebar: Option<Sidebar>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyEntry>,
    #[serde(default)]
    pub teacher_guidelines: Vec<String>,
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub meta: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionBank {
    pub title: String,
    pub questions: Vec<Question>,
    pub header_config: HeaderConfig,
    #[serde(default)]
    pub meta: Value,
}

/// A generated document, serialized exactly as clients receive it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Generated {
    Worksheet(Worksheet),
    QuestionBank(QuestionBank),
}

impl Generated {
    pub fn kind(&self) -> OutputKind {
        match self {
            Generated::Worksheet(_) => OutputKind::Worksheet,
            Generated::QuestionBank(_) => OutputKind::QuestionBank,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Generated::Worksheet(w) => &w.title,
            Generated::QuestionBank(b) => &b.title,
        }
    }

    pub fn header_config(&self) -> &HeaderConfig {
        match self {
            Generated::Worksheet(w) => &w.header_config,
            Generated::QuestionBank(b) => &b.header_config,
        }
    }

    pub fn question_count(&self) -> usize {
        match self {
            Generated::Worksheet(w) => {
                w.multiple_choice.questions.len() + w.essay.questions.len()
            }
            Generated::QuestionBank(b) => b.questions.len(),
        }
    }

    pub fn questions(&self) -> Box<dyn Iterator<Item = &Question> + '_> {
        match self {
            Generated::Worksheet(w) => Box::new(
                w.multiple_choice
                    .questions
                    .iter()
                    .chain(w.essay.questions.iter()),
            ),
            Generated::QuestionBank(b) => Box::new(b.questions.iter()),
        }
    }

    fn questions_mut(&mut self) -> Box<dyn Iterator<Item = &mut Question> + '_> {
        match self {
            Generated::Worksheet(w) => Box::new(
                w.multiple_choice
                    .questions
                    .iter_mut()
                    .chain(w.essay.questions.iter_mut()),
            ),
            Generated::QuestionBank(b) => Box::new(b.questions.iter_mut()),
        }
    }

    /// Copy of the document with every answer key and model answer removed.
    pub fn without_answers(&self) -> Generated {
        let mut copy = self.clone();
        copy.questions_mut().for_each(Question::strip_answer);
        copy
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

fn choice_question(raw: &schema::RawChoiceQuestion, keep_html: bool) -> Question {
    Question::Choice(ChoiceQuestion {
        question: clean_text(&raw.question, keep_html),
        choices: raw
            .choices
            .iter()
            .map(|choice| clean_text(choice, keep_html))
            .collect(),
        answer_key: raw.answer_key.as_ref().and_then(normalize_answer_key),
        kind: QuestionKind::MultipleChoice,
    })
}

fn written_question(
    raw: &schema::RawWrittenQuestion,
    kind: QuestionKind,
    keep_html: bool,
) -> Question {
    Question::Written(WrittenQuestion {
        question: clean_text(&raw.question, keep_html),
        answer: non_empty(clean_optional(raw.answer.as_deref(), keep_html)),
        kind,
    })
}

/// Raw documents as stored, echoed back in `meta`.
#[derive(Clone, Debug)]
pub struct AiSource {
    pub questions: QuestionsDocument,
    pub worksheet: WorksheetDocument,
    pub questions_raw: Document,
    pub worksheet_raw: Document,
}

/// Builds a worksheet or question bank from the `questions` and `worksheets`
/// documents sharing one `document_uuid`.
pub fn build_from_ai_documents(source: AiSource, keep_html: bool, kind: OutputKind) -> Generated {
    let sets = &source.questions.questions;

    let mut choice: Vec<Question> = sets
        .multiple_choice
        .iter()
        .map(|q| choice_question(q, keep_html))
        .collect();
    choice.extend(sets.true_false.iter().map(|q| {
        Question::true_false(
            clean_text(&q.question, keep_html),
            q.answer_key.as_ref().and_then(normalize_answer_key),
        )
    }));

    let mut essay: Vec<Question> = sets
        .short_answer
        .iter()
        .map(|q| written_question(q, QuestionKind::ShortAnswer, keep_html))
        .collect();
    essay.extend(
        sets.complete
            .iter()
            .map(|q| written_question(q, QuestionKind::Complete, keep_html)),
    );

    let content = &source.worksheet.worksheet;
    let filename = clean_optional(source.worksheet.filename.as_deref(), keep_html);
    let clean_all =
        |items: &[String]| -> Vec<String> { items.iter().map(|i| clean_text(i, keep_html)).collect() };

    let meta = json!({
        "questions_doc": document_to_plain_json(source.questions_raw),
        "worksheet_doc": document_to_plain_json(source.worksheet_raw),
        "total_questions": choice.len() + essay.len(),
        "goals": content.goals,
        "applications": content.applications,
        "vocabulary": content
            .vocabulary
            .iter()
            .map(|v| json!({ "term": v.term, "definition": v.definition }))
            .collect::<Vec<_>>(),
        "teacher_guidelines": content.teacher_guidelines,
    });

    match kind {
        OutputKind::Worksheet => Generated::Worksheet(Worksheet {
            title: format!("{WORKSHEET_TITLE_PREFIX}{filename}"),
            multiple_choice: Section {
                header: MULTIPLE_CHOICE_HEADER.to_string(),
                questions: choice,
            },
            essay: Section {
                header: ESSAY_HEADER.to_string(),
                questions: essay,
            },
            header_config: HeaderConfig::default(),
            sidebar: Some(Sidebar {
                before_lesson: filename,
                goal: clean_all(&content.goals),
                application: clean_all(&content.applications),
                level: MASTERY_LEVELS.iter().map(|l| l.to_string()).collect(),
                notice: String::new(),
            }),
            vocabulary: content
                .vocabulary
                .iter()
                .map(|v| VocabularyEntry {
                    term: clean_text(&v.term, keep_html),
                    definition: clean_text(&v.definition, keep_html),
                })
                .collect(),
            teacher_guidelines: clean_all(&content.teacher_guidelines),
            applications: clean_all(&content.applications),
            meta,
        }),
        OutputKind::QuestionBank => Generated::QuestionBank(QuestionBank {
            title: filename,
            questions: choice.into_iter().chain(essay).collect(),
            header_config: HeaderConfig::default(),
            meta,
        }),
    }
}

/// Everything the legacy lesson database holds about one lesson.
#[derive(Debug, Default)]
pub struct LessonBundle {
    pub title: Option<String>,
    pub goals: Vec<String>,
    pub questions: Vec<LegacyQuestion>,
    pub subject: Option<String>,
    pub semester: Option<String>,
    pub level: Option<String>,
    /// Lesson, goals and activities as plain JSON
    pub meta: Value,
}

fn is_true_false_type(type_name: &str) -> bool {
    type_name.contains("صواب") || type_name.to_lowercase().contains("true")
}

fn legacy_question(raw: &LegacyQuestion, keep_html: bool) -> Question {
    let title = clean_optional(raw.title.as_deref(), keep_html);
    let type_name = raw.question_type_name.as_deref().unwrap_or_default();

    if is_true_false_type(type_name) || !raw.question_answers.is_empty() {
        let choices = raw
            .question_answers
            .iter()
            .map(|a| clean_optional(a.title.as_deref(), keep_html))
            .collect();
        let correct = |a: &schema::LegacyAnswer| a.is_true.unwrap_or(false);
        // True/false questions historically mark the last true answer
        let answer_key = if is_true_false_type(type_name) {
            raw.question_answers.iter().rposition(correct)
        } else {
            raw.question_answers.iter().position(correct)
        };
        Question::Choice(ChoiceQuestion {
            question: title,
            choices,
            answer_key,
            kind: QuestionKind::Legacy,
        })
    } else {
        Question::Written(WrittenQuestion {
            question: title,
            answer: non_empty(clean_optional(raw.hint.as_deref(), keep_html)),
            kind: QuestionKind::Legacy,
        })
    }
}

/// Builds a worksheet or question bank from a lesson in the legacy database.
pub fn build_from_lesson(bundle: LessonBundle, keep_html: bool, kind: OutputKind) -> Generated {
    let (choice, essay): (Vec<Question>, Vec<Question>) = bundle
        .questions
        .iter()
        .map(|q| legacy_question(q, keep_html))
        .partition(Question::is_choice);

    let title = clean_optional(bundle.title.as_deref(), keep_html);
    let clean = |value: &Option<String>| clean_optional(value.as_deref(), keep_html);

    let mut header_config = HeaderConfig {
        subject_memo: clean(&bundle.subject),
        worksheet_number: QUESTION_BANK_NUMBER.to_string(),
        semester: clean(&bundle.semester),
        grade: clean(&bundle.level),
        ..HeaderConfig::default()
    };

    let mut meta = bundle.meta;
    if let Value::Object(map) = &mut meta {
        map.insert("raw_question_count".into(), bundle.questions.len().into());
    }

    match kind {
        OutputKind::Worksheet => {
            header_config.worksheet_number = WORKSHEET_NUMBER.to_string();
            let level = if bundle.level.is_some() {
                MASTERY_LEVELS.iter().map(|l| l.to_string()).collect()
            } else {
                vec![]
            };
            Generated::Worksheet(Worksheet {
                title: format!("{WORKSHEET_TITLE_PREFIX}{title}"),
                multiple_choice: Section {
                    header: MULTIPLE_CHOICE_HEADER.to_string(),
                    questions: choice,
                },
                essay: Section {
                    header: ESSAY_HEADER.to_string(),
                    questions: essay,
                },
                header_config,
                sidebar: Some(Sidebar {
                    before_lesson: title,
                    goal: bundle
                        .goals
                        .iter()
                        .map(|g| clean_text(g, keep_html))
                        .collect(),
                    application: vec![],
                    level,
                    notice: String::new(),
                }),
                vocabulary: vec![],
                teacher_guidelines: vec![],
                applications: vec![],
                meta,
            })
        }
        OutputKind::QuestionBank => Generated::QuestionBank(QuestionBank {
            title,
            questions: choice.into_iter().chain(essay).collect(),
            header_config,
            meta,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, doc, oid::ObjectId};
    use schema::LegacyAnswer;

    fn ai_source() -> AiSource {
        let questions_raw = doc! {
            "_id": ObjectId::new(),
            "document_uuid": "u-1",
            "filename": "الكسور",
            "questions": {
                "multiple_choice": [
                    { "question": "<b>نصف</b> العدد 4؟", "choices": ["1", "2", "3", "4"], "answer_key": 1 }
                ],
                "true_false": [
                    { "question": "الصفر عدد زوجي", "answer_key": true }
                ],
                "short_answer": [
                    { "question": "عرّف الكسر", "answer": "جزء من كل" }
                ],
                "complete": [
                    { "question": "ربع 8 يساوي ...", "answer": "" }
                ]
            }
        };
        let worksheet_raw = doc! {
            "_id": ObjectId::new(),
            "document_uuid": "u-1",
            "filename": "الكسور &amp; النسب",
            "worksheet": {
                "goals": ["يتعرف الكسر"],
                "applications": ["تقسيم البيتزا"],
                "vocabulary": [{ "term": "البسط", "definition": "العدد العلوي" }],
                "teacher_guidelines": ["استخدم الرسوم"]
            }
        };
        AiSource {
            questions: bson::from_document(questions_raw.clone()).unwrap(),
            worksheet: bson::from_document(worksheet_raw.clone()).unwrap(),
            questions_raw,
            worksheet_raw,
        }
    }

    #[test]
    fn output_kind_parses() {
        assert_eq!("worksheet".parse::<OutputKind>().unwrap(), OutputKind::Worksheet);
        assert_eq!(
            "question_bank".parse::<OutputKind>().unwrap(),
            OutputKind::QuestionBank
        );
        assert!(matches!(
            "poster".parse::<OutputKind>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn worksheet_from_ai_documents() {
        let generated = build_from_ai_documents(ai_source(), false, OutputKind::Worksheet);
        let Generated::Worksheet(ws) = &generated else {
            panic!("expected worksheet");
        };
        assert_eq!(ws.title, "ورقة عمل - الكسور & النسب");
        assert_eq!(ws.multiple_choice.header, MULTIPLE_CHOICE_HEADER);
        assert_eq!(ws.multiple_choice.questions.len(), 2);
        assert_eq!(ws.multiple_choice.questions[0].text(), "نصف العدد 4؟");
        assert_eq!(
            ws.multiple_choice.questions[1],
            Question::true_false("الصفر عدد زوجي".into(), Some(0))
        );
        assert_eq!(ws.essay.questions.len(), 2);
        assert!(ws.essay.questions[0].has_answer());
        assert!(!ws.essay.questions[1].has_answer());
        assert_eq!(ws.header_config.worksheet_number, WORKSHEET_NUMBER);

        let sidebar = ws.sidebar.as_ref().unwrap();
        assert_eq!(sidebar.before_lesson, "الكسور & النسب");
        assert_eq!(sidebar.level, vec!["ممتاز", "متوسط", "ضعيف"]);
        assert_eq!(ws.vocabulary[0].term, "البسط");
        assert_eq!(ws.meta["total_questions"], 4);
        assert_eq!(ws.meta["questions_doc"]["document_uuid"], "u-1");
        assert!(ws.meta["worksheet_doc"]["_id"].is_string());
    }

    #[test]
    fn question_bank_is_flat_and_untitled() {
        let generated = build_from_ai_documents(ai_source(), true, OutputKind::QuestionBank);
        assert_eq!(generated.kind(), OutputKind::QuestionBank);
        assert_eq!(generated.title(), "الكسور & النسب");
        assert_eq!(generated.question_count(), 4);
        let kinds: Vec<_> = generated.questions().map(Question::kind).collect();
        assert_eq!(
            kinds,
            vec![
                QuestionKind::MultipleChoice,
                QuestionKind::TrueFalse,
                QuestionKind::ShortAnswer,
                QuestionKind::Complete
            ]
        );
        let value = serde_json::to_value(&generated).unwrap();
        assert!(value.get("sidebar").is_none());
        assert!(value["questions"].is_array());
    }

    #[test]
    fn answers_are_stripped_from_a_copy() {
        let generated = build_from_ai_documents(ai_source(), false, OutputKind::Worksheet);
        let stripped = generated.without_answers();
        assert!(stripped.questions().all(|q| !q.has_answer()));
        assert!(generated.questions().any(Question::has_answer));
        assert_eq!(stripped.question_count(), generated.question_count());
    }

    fn legacy(title: &str, type_name: &str, answers: &[(&str, bool)], hint: Option<&str>) -> LegacyQuestion {
        LegacyQuestion {
            id: ObjectId::new(),
            title: Some(title.into()),
            question_type_name: Some(type_name.into()),
            question_answers: answers
                .iter()
                .map(|(t, ok)| LegacyAnswer {
                    title: Some(t.to_string()),
                    is_true: Some(*ok),
                })
                .collect(),
            hint: hint.map(String::from),
        }
    }

    #[test]
    fn lesson_questions_are_split_by_shape() {
        let bundle = LessonBundle {
            title: Some("الجمع".into()),
            goals: vec!["يجمع عددين".into()],
            questions: vec![
                legacy("2+2=4", "صواب وخطأ", &[("صواب", true), ("خطأ", false)], None),
                legacy("3+1؟", "اختيار من متعدد", &[("3", false), ("4", true), ("4", true)], None),
                legacy("اشرح الجمع", "مقالي", &[], Some("ضم عددين")),
            ],
            subject: Some("رياضيات".into()),
            semester: None,
            level: None,
            meta: json!({ "lesson": { "title": "الجمع" } }),
        };
        let generated = build_from_lesson(bundle, false, OutputKind::Worksheet);
        let Generated::Worksheet(ws) = generated else {
            panic!("expected worksheet");
        };
        assert_eq!(ws.title, "ورقة عمل - الجمع");
        assert_eq!(ws.header_config.worksheet_number, WORKSHEET_NUMBER);
        assert_eq!(ws.header_config.subject_memo, "رياضيات");
        assert_eq!(ws.multiple_choice.questions.len(), 2);
        let Question::Choice(second) = &ws.multiple_choice.questions[1] else {
            panic!("expected choice question");
        };
        assert_eq!(second.answer_key, Some(1));
        let Question::Written(essay) = &ws.essay.questions[0] else {
            panic!("expected written question");
        };
        assert_eq!(essay.answer.as_deref(), Some("ضم عددين"));
        assert!(ws.sidebar.unwrap().level.is_empty());
        assert_eq!(ws.meta["raw_question_count"], 3);
    }

    #[test]
    fn lesson_question_bank_uses_bank_number() {
        let bundle = LessonBundle {
            title: Some("الطرح".into()),
            level: Some("الصف الثالث".into()),
            questions: vec![legacy("5-2؟", "اختيار", &[("3", true)], None)],
            ..LessonBundle::default()
        };
        let generated = build_from_lesson(bundle, false, OutputKind::QuestionBank);
        assert_eq!(generated.title(), "الطرح");
        assert_eq!(generated.header_config().worksheet_number, QUESTION_BANK_NUMBER);
        assert_eq!(generated.header_config().grade, "الصف الثالث");
        assert!(matches!(
            generated.questions().next(),
            Some(Question::Choice(ChoiceQuestion { answer_key: Some(0), .. }))
        ));
    }

    #[test]
    fn generated_documents_read_back_from_json() {
        let generated = build_from_ai_documents(ai_source(), false, OutputKind::Worksheet);
        let text = serde_json::to_string(&generated).unwrap();
        let parsed: Generated = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.kind(), OutputKind::Worksheet);
        assert_eq!(parsed.question_count(), 4);
    }
}
