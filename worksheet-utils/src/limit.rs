use serde::{Deserialize, Serialize};

use crate::{
    build::Generated,
    question::{Question, QuestionKind},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionLimit {
    All,
    Exactly(usize),
}

impl From<i64> for QuestionLimit {
    /// Negative counts mean "all", zero means "none".
    fn from(count: i64) -> Self {
        match usize::try_from(count) {
            Ok(n) => QuestionLimit::Exactly(n),
            Err(_) => QuestionLimit::All,
        }
    }
}

impl QuestionLimit {
    fn apply(self, mut questions: Vec<Question>) -> Vec<Question> {
        if let QuestionLimit::Exactly(n) = self {
            questions.truncate(n);
        }
        questions
    }
}

/// Requested number of questions per type, as sent by clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLimits {
    #[serde(default = "all")]
    pub multiple_choice: i64,
    #[serde(default = "all")]
    pub true_false: i64,
    #[serde(default = "all")]
    pub short_answer: i64,
    #[serde(default = "all")]
    pub complete: i64,
}

fn all() -> i64 {
    -1
}

impl Default for TypeLimits {
    fn default() -> Self {
        TypeLimits {
            multiple_choice: all(),
            true_false: all(),
            short_answer: all(),
            complete: all(),
        }
    }
}

impl TypeLimits {
    pub fn limit_for(&self, kind: QuestionKind) -> QuestionLimit {
        match kind {
            QuestionKind::MultipleChoice => self.multiple_choice.into(),
            QuestionKind::TrueFalse => self.true_false.into(),
            QuestionKind::ShortAnswer => self.short_answer.into(),
            QuestionKind::Complete => self.complete.into(),
            QuestionKind::Legacy => QuestionLimit::All,
        }
    }
}

/// Keeps up to the requested number of questions of each type.
///
/// Choice questions keep multiple choice before true/false, written questions
/// keep short answer before complete. Questions of any other type are kept
/// after the limited ones.
pub fn apply_type_limits(generated: &mut Generated, limits: &TypeLimits) {
    match generated {
        Generated::Worksheet(worksheet) => {
            let choice = std::mem::take(&mut worksheet.multiple_choice.questions);
            worksheet.multiple_choice.questions = limit_choice(choice, limits);
            let written = std::mem::take(&mut worksheet.essay.questions);
            worksheet.essay.questions = limit_written(written, limits);
        }
        Generated::QuestionBank(bank) => {
            let (choice, written): (Vec<_>, Vec<_>) = std::mem::take(&mut bank.questions)
                .into_iter()
                .partition(Question::is_choice);
            let mut questions = limit_choice(choice, limits);
            questions.extend(limit_written(written, limits));
            bank.questions = questions;
        }
    }
}

fn limit_choice(questions: Vec<Question>, limits: &TypeLimits) -> Vec<Question> {
    limit_pair(
        questions,
        QuestionKind::MultipleChoice,
        QuestionKind::TrueFalse,
        limits,
    )
}

fn limit_written(questions: Vec<Question>, limits: &TypeLimits) -> Vec<Question> {
    limit_pair(
        questions,
        QuestionKind::ShortAnswer,
        QuestionKind::Complete,
        limits,
    )
}

fn limit_pair(
    questions: Vec<Question>,
    first: QuestionKind,
    second: QuestionKind,
    limits: &TypeLimits,
) -> Vec<Question> {
    let mut firsts = vec![];
    let mut seconds = vec![];
    let mut others = vec![];
    for question in questions {
        match question.kind() {
            k if k == first => firsts.push(question),
            k if k == second => seconds.push(question),
            _ => others.push(question),
        }
    }

    let mut kept = limits.limit_for(first).apply(firsts);
    kept.extend(limits.limit_for(second).apply(seconds));
    kept.extend(others);
    kept
}

/// Older clients send a single count applied to every list. Zero keeps all.
pub fn apply_legacy_limit(generated: &mut Generated, num_questions: i64) {
    let Ok(n) = usize::try_from(num_questions) else {
        return;
    };
    if n == 0 {
        return;
    }
    match generated {
        Generated::Worksheet(worksheet) => {
            worksheet.multiple_choice.questions.truncate(n);
            worksheet.essay.questions.truncate(n);
        }
        Generated::QuestionBank(bank) => bank.questions.truncate(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{HeaderConfig, QuestionBank, Section, Worksheet};
    use crate::question::{ChoiceQuestion, WrittenQuestion};

    fn choice(kind: QuestionKind, n: usize) -> Question {
        Question::Choice(ChoiceQuestion {
            question: format!("{kind:?} {n}"),
            choices: vec!["a".into(), "b".into()],
            answer_key: Some(0),
            kind,
        })
    }

    fn written(kind: QuestionKind, n: usize) -> Question {
        Question::Written(WrittenQuestion {
            question: format!("{kind:?} {n}"),
            answer: Some("x".into()),
            kind,
        })
    }

    fn worksheet() -> Generated {
        let mut mc: Vec<Question> = (0..3).map(|n| choice(QuestionKind::MultipleChoice, n)).collect();
        mc.extend((0..3).map(|n| choice(QuestionKind::TrueFalse, n)));
        let mut essay: Vec<Question> = (0..3).map(|n| written(QuestionKind::ShortAnswer, n)).collect();
        essay.extend((0..3).map(|n| written(QuestionKind::Complete, n)));
        Generated::Worksheet(Worksheet {
            title: "t".into(),
            multiple_choice: Section { header: "mc".into(), questions: mc },
            essay: Section { header: "essay".into(), questions: essay },
            header_config: HeaderConfig::default(),
            sidebar: None,
            vocabulary: vec![],
            teacher_guidelines: vec![],
            applications: vec![],
            meta: serde_json::Value::Null,
        })
    }

    fn kinds(questions: &[Question]) -> Vec<QuestionKind> {
        questions.iter().map(Question::kind).collect()
    }

    #[test]
    fn counts_map_to_limits() {
        assert_eq!(QuestionLimit::from(-1), QuestionLimit::All);
        assert_eq!(QuestionLimit::from(-7), QuestionLimit::All);
        assert_eq!(QuestionLimit::from(0), QuestionLimit::Exactly(0));
        assert_eq!(QuestionLimit::from(4), QuestionLimit::Exactly(4));
    }

    #[test]
    fn default_limits_keep_everything() {
        let mut generated = worksheet();
        apply_type_limits(&mut generated, &TypeLimits::default());
        assert_eq!(generated.question_count(), 12);
    }

    #[test]
    fn worksheet_sections_are_limited_per_type() {
        let mut generated = worksheet();
        let limits = TypeLimits {
            multiple_choice: 1,
            true_false: 0,
            short_answer: -1,
            complete: 2,
        };
        apply_type_limits(&mut generated, &limits);
        let Generated::Worksheet(ws) = generated else {
            panic!("expected worksheet");
        };
        assert_eq!(kinds(&ws.multiple_choice.questions), vec![QuestionKind::MultipleChoice]);
        assert_eq!(
            kinds(&ws.essay.questions),
            vec![
                QuestionKind::ShortAnswer,
                QuestionKind::ShortAnswer,
                QuestionKind::ShortAnswer,
                QuestionKind::Complete,
                QuestionKind::Complete,
            ]
        );
    }

    #[test]
    fn unclassified_questions_survive_limits() {
        let mut generated = Generated::QuestionBank(QuestionBank {
            title: "bank".into(),
            questions: vec![
                written(QuestionKind::Legacy, 0),
                choice(QuestionKind::TrueFalse, 0),
                choice(QuestionKind::Legacy, 1),
                choice(QuestionKind::MultipleChoice, 0),
                written(QuestionKind::Complete, 0),
            ],
            header_config: HeaderConfig::default(),
            meta: serde_json::Value::Null,
        });
        let limits = TypeLimits {
            multiple_choice: 0,
            true_false: 0,
            short_answer: 0,
            complete: 0,
        };
        apply_type_limits(&mut generated, &limits);
        let Generated::QuestionBank(bank) = generated else {
            panic!("expected question bank");
        };
        assert_eq!(
            kinds(&bank.questions),
            vec![QuestionKind::Legacy, QuestionKind::Legacy]
        );
        assert!(bank.questions[0].is_choice());
    }

    #[test]
    fn legacy_limit_truncates_every_list() {
        let mut generated = worksheet();
        apply_legacy_limit(&mut generated, 2);
        assert_eq!(generated.question_count(), 4);

        let mut untouched = worksheet();
        apply_legacy_limit(&mut untouched, 0);
        apply_legacy_limit(&mut untouched, -3);
        assert_eq!(untouched.question_count(), 12);
    }
}
