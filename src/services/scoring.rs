// src/services/scoring.rs

use std::collections::BTreeSet;

use crate::models::{
    attempt::{Answers, ScoreResult, SubmittedAnswer},
    quiz::{Question, Quiz},
};

/// Grades a submission against the quiz answer key.
///
/// Pure function: unanswered questions score 0, answers for unknown
/// questions are ignored, and a quiz with zero total marks yields 0%.
pub fn score(quiz: &Quiz, answers: &Answers) -> ScoreResult {
    let mut score = 0;
    let mut correct_count = 0;

    for question in &quiz.questions {
        if is_correct(question, answers.get(&question.id)) {
            score += question.marks;
            correct_count += 1;
        }
    }

    let passing_marks = quiz.passing_marks.unwrap_or(0);

    ScoreResult {
        score,
        total_marks: quiz.total_marks,
        percentage: percentage(score, quiz.total_marks),
        is_passed: score >= passing_marks,
        correct_count,
        total_questions: quiz.questions.len(),
    }
}

/// A single option is correct when it belongs to the correct set.
/// A list of several options must match the correct set exactly.
pub fn is_correct(question: &Question, answer: Option<&SubmittedAnswer>) -> bool {
    match answer {
        None => false,
        Some(SubmittedAnswer::One(value)) => question.correct_answers.contains(&value.as_key()),
        Some(SubmittedAnswer::Many(values)) => {
            let chosen: BTreeSet<String> = values.iter().map(|v| v.as_key()).collect();
            match chosen.len() {
                0 => false,
                1 => chosen.iter().all(|k| question.correct_answers.contains(k)),
                _ => chosen == question.correct_answers,
            }
        }
    }
}

pub fn percentage(score: i32, total_marks: i32) -> f64 {
    if total_marks <= 0 {
        return 0.0;
    }
    f64::from(score) / f64::from(total_marks) * 100.0
}
