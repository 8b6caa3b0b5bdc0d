use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

pub const TRUE_LABEL: &str = "صحيح";
pub const FALSE_LABEL: &str = "خطأ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Complete,
    /// Questions from the lesson database carry no type of their own
    Legacy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Question {
    Choice(ChoiceQuestion),
    Written(WrittenQuestion),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceQuestion {
    pub question: String,
    pub choices: Vec<String>,
    pub answer_key: Option<usize>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WrittenQuestion {
    pub question: String,
    pub answer: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        match self {
            Question::Choice(q) => q.kind,
            Question::Written(q) => q.kind,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Question::Choice(q) => &q.question,
            Question::Written(q) => &q.question,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, Question::Choice(_))
    }

    pub fn has_answer(&self) -> bool {
        match self {
            Question::Choice(q) => q.answer_key.is_some(),
            Question::Written(q) => q.answer.is_some(),
        }
    }

    pub fn strip_answer(&mut self) {
        match self {
            Question::Choice(q) => q.answer_key = None,
            Question::Written(q) => q.answer = None,
        }
    }

    pub fn true_false(question: String, answer_key: Option<usize>) -> Self {
        Question::Choice(ChoiceQuestion {
            question,
            choices: vec![TRUE_LABEL.to_string(), FALSE_LABEL.to_string()],
            answer_key,
            kind: QuestionKind::TrueFalse,
        })
    }
}

/// Stored answer keys are indexes, booleans (true/false questions) or strings
/// holding either of those.
pub fn normalize_answer_key(raw: &Bson) -> Option<usize> {
    match raw {
        Bson::Int32(i) => usize::try_from(*i).ok(),
        Bson::Int64(i) => usize::try_from(*i).ok(),
        Bson::Double(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as usize),
        Bson::Boolean(true) => Some(0),
        Bson::Boolean(false) => Some(1),
        Bson::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<usize>() {
                return Some(i);
            }
            match s.to_lowercase().as_str() {
                TRUE_LABEL | "true" | "صواب" => Some(0),
                FALSE_LABEL | "false" => Some(1),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_keys_are_normalized() {
        assert_eq!(normalize_answer_key(&Bson::Int32(2)), Some(2));
        assert_eq!(normalize_answer_key(&Bson::Int64(-1)), None);
        assert_eq!(normalize_answer_key(&Bson::Double(3.0)), Some(3));
        assert_eq!(normalize_answer_key(&Bson::Boolean(false)), Some(1));
        assert_eq!(normalize_answer_key(&Bson::String(" 1 ".into())), Some(1));
        assert_eq!(normalize_answer_key(&Bson::String("صحيح".into())), Some(0));
        assert_eq!(normalize_answer_key(&Bson::String("False".into())), Some(1));
        assert_eq!(normalize_answer_key(&Bson::String("ربما".into())), None);
        assert_eq!(normalize_answer_key(&Bson::Null), None);
    }

    #[test]
    fn stripped_answers_serialize_as_null() {
        let mut question = Question::true_false("الشمس نجم".into(), Some(0));
        question.strip_answer();
        assert_eq!(
            serde_json::to_value(&question).unwrap(),
            json!({
                "question": "الشمس نجم",
                "choices": ["صحيح", "خطأ"],
                "answer_key": null,
                "type": "true_false"
            })
        );
    }

    #[test]
    fn written_questions_deserialize_without_choices() {
        let question: Question = serde_json::from_value(json!({
            "question": "عرّف الخلية",
            "answer": "وحدة بناء الكائن الحي",
            "type": "short_answer"
        }))
        .unwrap();
        assert!(!question.is_choice());
        assert_eq!(question.kind(), QuestionKind::ShortAnswer);
        assert!(question.has_answer());
    }
}
