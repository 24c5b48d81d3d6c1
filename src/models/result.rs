// src/models/result.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::evaluation::QuestionType;

/// Detailed outcome of a completed attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempt_id: i64,
    pub evaluation_title: String,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: Option<i32>,
    pub score: i32,
    pub max_score: i32,
    pub percentage: Decimal,
    pub passed: bool,
    pub certified: bool,
    pub certificate_code: Option<String>,

    /// Number of answered questions.
    pub total_questions: usize,
    pub correct_answers: usize,
    pub incorrect_answers: usize,
    pub question_results: Vec<QuestionResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub points: i32,
    pub is_correct: bool,
    pub points_earned: i32,
    pub user_answer: Option<String>,

    /// Text of the correct option, empty when none applies.
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub options: Vec<OptionResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub option_id: i64,
    pub option_text: String,
    pub is_correct: bool,
    pub was_selected: bool,
}
