// src/store/mod.rs

//! Persistence seam.
//!
//! Every engine operation opens one [`StoreTx`], works against it and commits.
//! Dropping a transaction without calling [`StoreTx::commit`] discards its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptStatus, Certificate, UserAnswer},
        evaluation::{Evaluation, EvaluationStatus, Question, QuestionOption, QuestionType},
        user::{Role, User},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub passing_score: i32,
    pub max_attempts: i32,
    pub time_limit_enabled: bool,
    pub status: EvaluationStatus,
    pub prerequisite_evaluation_id: Option<i64>,
    pub show_results_immediately: bool,
}

#[derive(Debug, Clone)]
pub struct NewOption {
    pub option_text: String,
    pub is_correct: bool,
    pub order_index: i32,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub evaluation_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub points: i32,
    pub explanation: Option<String>,
    pub options: Vec<NewOption>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub evaluation_id: i64,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub max_score: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Values written by an answer upsert keyed on (attempt, question).
#[derive(Debug, Clone)]
pub struct AnswerUpsert {
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

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub attempt_id: i64,
    pub user_id: i64,
    pub evaluation_id: i64,
    pub certificate_code: String,
    pub issued_at: DateTime<Utc>,
}

/// Mutable attempt columns written back by the engine.
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub status: AttemptStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: Option<i32>,
    pub score: i32,
    pub percentage: Decimal,
    pub passed: bool,
    pub certified: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl From<&Attempt> for AttemptUpdate {
    fn from(attempt: &Attempt) -> Self {
        Self {
            status: attempt.status,
            completed_at: attempt.completed_at,
            time_spent_minutes: attempt.time_spent_minutes,
            score: attempt.score,
            percentage: attempt.percentage,
            passed: attempt.passed,
            certified: attempt.certified,
            ip_address: attempt.ip_address.clone(),
            user_agent: attempt.user_agent.clone(),
        }
    }
}

/// Opens transactions against the backing store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

/// One transaction. Reads see this transaction's own writes.
#[async_trait]
pub trait StoreTx: Send {
    // users
    async fn create_user(&mut self, user: NewUser) -> Result<User, AppError>;
    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, AppError>;

    /// Loads the user row and holds it until commit, serialising attempt starts per user.
    async fn lock_user(&mut self, id: i64) -> Result<Option<User>, AppError>;

    // catalog
    async fn create_evaluation(&mut self, evaluation: NewEvaluation) -> Result<Evaluation, AppError>;
    async fn find_evaluation(&mut self, id: i64) -> Result<Option<Evaluation>, AppError>;
    async fn create_question(
        &mut self,
        question: NewQuestion,
    ) -> Result<(Question, Vec<QuestionOption>), AppError>;
    async fn find_question(&mut self, id: i64) -> Result<Option<Question>, AppError>;
    async fn list_questions(&mut self, evaluation_id: i64) -> Result<Vec<Question>, AppError>;
    async fn find_option(&mut self, id: i64) -> Result<Option<QuestionOption>, AppError>;

    /// Options of a question ordered by `order_index`.
    async fn list_options(&mut self, question_id: i64) -> Result<Vec<QuestionOption>, AppError>;

    // attempts
    async fn insert_attempt(&mut self, attempt: NewAttempt) -> Result<Attempt, AppError>;
    async fn find_attempt(&mut self, id: i64) -> Result<Option<Attempt>, AppError>;

    /// Loads the attempt and holds it until commit.
    async fn lock_attempt(&mut self, id: i64) -> Result<Option<Attempt>, AppError>;
    async fn find_in_progress_attempt(
        &mut self,
        user_id: i64,
        evaluation_id: i64,
    ) -> Result<Option<Attempt>, AppError>;
    async fn count_attempts(&mut self, user_id: i64, evaluation_id: i64) -> Result<i64, AppError>;

    /// Highest attempt number used so far, 0 when there is none.
    async fn max_attempt_number(&mut self, user_id: i64, evaluation_id: i64)
    -> Result<i32, AppError>;
    async fn has_passed_attempt(&mut self, user_id: i64, evaluation_id: i64)
    -> Result<bool, AppError>;
    async fn update_attempt(&mut self, id: i64, update: AttemptUpdate) -> Result<Attempt, AppError>;

    /// Newest first.
    async fn list_attempts_by_user(&mut self, user_id: i64) -> Result<Vec<Attempt>, AppError>;

    /// Newest first.
    async fn list_attempts_by_evaluation(
        &mut self,
        evaluation_id: i64,
    ) -> Result<Vec<Attempt>, AppError>;

    /// Removes the attempt with its answers and certificate.
    async fn delete_attempt(&mut self, id: i64) -> Result<bool, AppError>;

    // answers
    async fn upsert_answer(&mut self, answer: AnswerUpsert) -> Result<UserAnswer, AppError>;

    /// Answers of an attempt ordered by question id.
    async fn list_answers(&mut self, attempt_id: i64) -> Result<Vec<UserAnswer>, AppError>;
    async fn count_answers(&mut self, attempt_id: i64) -> Result<i64, AppError>;
    async fn sum_points(&mut self, attempt_id: i64) -> Result<i64, AppError>;

    // certificates

    /// Inserts unless the attempt already has a certificate; returns the stored one.
    async fn insert_certificate(
        &mut self,
        certificate: NewCertificate,
    ) -> Result<Certificate, AppError>;
    async fn find_certificate_by_attempt(
        &mut self,
        attempt_id: i64,
    ) -> Result<Option<Certificate>, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
