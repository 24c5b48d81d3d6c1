// src/models/attempt.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "attempt_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
    Expired,
}

impl AttemptStatus {
    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "certificate_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

/// Represents the 'evaluation_attempts' table.
/// Relations are held by id only.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub evaluation_id: i64,

    /// 1-based, gap-free per (user, evaluation).
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: Option<i32>,
    pub score: i32,

    /// Sum of question points when the attempt was started.
    pub max_score: i32,
    pub percentage: Decimal,
    pub passed: bool,
    pub certified: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Represents the 'user_answers' table. One row per (attempt, question).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnswer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub text_answer: Option<String>,
    pub is_correct: bool,
    pub points_earned: i32,
    pub time_spent_seconds: Option<i32>,
    pub flagged: bool,
    pub answered_at: DateTime<Utc>,
}

/// Represents the 'certificates' table. At most one per attempt.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: i64,
    pub attempt_id: i64,
    pub user_id: i64,
    pub evaluation_id: i64,
    pub certificate_code: String,
    pub issued_at: DateTime<Utc>,
    pub status: CertificateStatus,
}

/// DTO for starting an attempt. Client metadata comes from request headers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttemptRequest {
    pub evaluation_id: i64,
}

/// DTO for answering one question of a running attempt.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    #[validate(length(max = 10000))]
    pub text_answer: Option<String>,
    #[validate(range(min = 0))]
    pub time_spent_seconds: Option<i32>,
    pub flagged: Option<bool>,
}

/// DTO for owner-side updates of a running attempt.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAttemptRequest {
    pub status: Option<AttemptStatus>,
    #[validate(range(min = 0))]
    pub time_spent_minutes: Option<i32>,
    #[validate(length(max = 45))]
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Attempt summary returned by start/get/update/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub evaluation_id: i64,
    pub evaluation_title: String,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: Option<i32>,
    pub score: i32,
    pub max_score: i32,
    pub percentage: Decimal,
    pub passed: bool,
    pub certified: bool,
    pub ip_address: Option<String>,
    pub duration_minutes: i32,
    pub total_questions: i64,
    pub answered_questions: i64,
}
