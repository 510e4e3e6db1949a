// src/models/quiz.rs

use std::collections::BTreeSet;

use serde::Serialize;

/// A quiz together with its answer key.
/// Loaded from the `quizzes` and `questions` tables; never sent to clients as-is.
#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: i64,

    /// Club that owns the quiz. `None` for quizzes not tied to a club,
    /// which only count towards the global leaderboard.
    pub club_id: Option<i64>,

    pub title: String,

    /// Questions sorted by `order`.
    pub questions: Vec<Question>,

    pub time_limit_minutes: Option<i32>,
    pub total_marks: i32,
    pub passing_marks: Option<i32>,
    pub is_active: bool,
}

/// A single question with its correct answer set.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub text: String,

    /// Display options. Option identifiers are the stringified indices into this list.
    pub options: Vec<String>,

    /// Identifiers of the correct options. More than one means multi-select.
    pub correct_answers: BTreeSet<String>,

    pub marks: i32,
    pub order: i32,
}

impl Question {
    pub fn is_multi_select(&self) -> bool {
        self.correct_answers.len() > 1
    }
}

/// DTO for sending a quiz to the client (excludes answer keys).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: i64,
    pub club_id: Option<i64>,
    pub title: String,
    pub time_limit_minutes: Option<i32>,
    pub total_marks: i32,
    pub passing_marks: Option<i32>,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub marks: i32,
    pub multi_select: bool,
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        let mut questions: Vec<&Question> = quiz.questions.iter().collect();
        questions.sort_by_key(|q| (q.order, q.id));

        PublicQuiz {
            id: quiz.id,
            club_id: quiz.club_id,
            title: quiz.title.clone(),
            time_limit_minutes: quiz.time_limit_minutes,
            total_marks: quiz.total_marks,
            passing_marks: quiz.passing_marks,
            questions: questions
                .into_iter()
                .map(|q| PublicQuestion {
                    id: q.id,
                    text: q.text.clone(),
                    options: q.options.clone(),
                    marks: q.marks,
                    multi_select: q.is_multi_select(),
                })
                .collect(),
        }
    }
}
