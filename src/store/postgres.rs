// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{
    AnswerUpsert, AttemptUpdate, NewAttempt, NewCertificate, NewEvaluation, NewQuestion, NewUser,
    Store, StoreTx,
};
use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptStatus, Certificate, CertificateStatus, UserAnswer},
        evaluation::{Evaluation, Question, QuestionOption},
        user::User,
    },
};

const USER_COLUMNS: &str = "id, username, name, password, role, created_at";

const EVALUATION_COLUMNS: &str = "\
    id, title, description, duration_minutes, passing_score, max_attempts, \
    time_limit_enabled, status, prerequisite_evaluation_id, show_results_immediately, created_at";

const QUESTION_COLUMNS: &str =
    "id, evaluation_id, question_text, question_type, points, explanation";

const OPTION_COLUMNS: &str = "id, question_id, option_text, is_correct, order_index";

const ATTEMPT_COLUMNS: &str = "\
    id, user_id, evaluation_id, attempt_number, status, started_at, completed_at, \
    time_spent_minutes, score, max_score, percentage, passed, certified, ip_address, user_agent";

const ANSWER_COLUMNS: &str = "\
    id, attempt_id, question_id, selected_option_id, text_answer, is_correct, \
    points_earned, time_spent_seconds, flagged, answered_at";

const CERTIFICATE_COLUMNS: &str =
    "id, attempt_id, user_id, evaluation_id, certificate_code, issued_at, status";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("Failed to open transaction: {:?}", e);
            AppError::from(e)
        })?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn create_user(&mut self, user: NewUser) -> Result<User, AppError> {
        let username = user.username.clone();
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, name, password, role) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.username)
        .bind(user.name)
        .bind(user.password_hash)
        .bind(user.role)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Username '{}' already exists", username))
            }
            other => other,
        })
    }

    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn lock_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn create_evaluation(&mut self, evaluation: NewEvaluation) -> Result<Evaluation, AppError> {
        let created = sqlx::query_as::<_, Evaluation>(&format!(
            "INSERT INTO evaluations (
                title, description, duration_minutes, passing_score, max_attempts,
                time_limit_enabled, status, prerequisite_evaluation_id, show_results_immediately
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {EVALUATION_COLUMNS}"
        ))
        .bind(evaluation.title)
        .bind(evaluation.description)
        .bind(evaluation.duration_minutes)
        .bind(evaluation.passing_score)
        .bind(evaluation.max_attempts)
        .bind(evaluation.time_limit_enabled)
        .bind(evaluation.status)
        .bind(evaluation.prerequisite_evaluation_id)
        .bind(evaluation.show_results_immediately)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn find_evaluation(&mut self, id: i64) -> Result<Option<Evaluation>, AppError> {
        let evaluation = sqlx::query_as::<_, Evaluation>(&format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(evaluation)
    }

    async fn create_question(
        &mut self,
        question: NewQuestion,
    ) -> Result<(Question, Vec<QuestionOption>), AppError> {
        let created = sqlx::query_as::<_, Question>(&format!(
            "INSERT INTO questions (evaluation_id, question_text, question_type, points, explanation)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {QUESTION_COLUMNS}"
        ))
        .bind(question.evaluation_id)
        .bind(question.question_text)
        .bind(question.question_type)
        .bind(question.points)
        .bind(question.explanation)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut options = Vec::with_capacity(question.options.len());
        for option in question.options {
            let option = sqlx::query_as::<_, QuestionOption>(&format!(
                "INSERT INTO question_options (question_id, option_text, is_correct, order_index)
                VALUES ($1, $2, $3, $4)
                RETURNING {OPTION_COLUMNS}"
            ))
            .bind(created.id)
            .bind(option.option_text)
            .bind(option.is_correct)
            .bind(option.order_index)
            .fetch_one(&mut *self.tx)
            .await?;
            options.push(option);
        }
        options.sort_by_key(|o| (o.order_index, o.id));

        Ok((created, options))
    }

    async fn find_question(&mut self, id: i64) -> Result<Option<Question>, AppError> {
        let question = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(question)
    }

    async fn list_questions(&mut self, evaluation_id: i64) -> Result<Vec<Question>, AppError> {
        let questions = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE evaluation_id = $1 ORDER BY id"
        ))
        .bind(evaluation_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(questions)
    }

    async fn find_option(&mut self, id: i64) -> Result<Option<QuestionOption>, AppError> {
        let option = sqlx::query_as::<_, QuestionOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM question_options WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(option)
    }

    async fn list_options(&mut self, question_id: i64) -> Result<Vec<QuestionOption>, AppError> {
        let options = sqlx::query_as::<_, QuestionOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM question_options \
             WHERE question_id = $1 ORDER BY order_index, id"
        ))
        .bind(question_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(options)
    }

    async fn insert_attempt(&mut self, attempt: NewAttempt) -> Result<Attempt, AppError> {
        let attempt_number = attempt.attempt_number;
        sqlx::query_as::<_, Attempt>(&format!(
            "INSERT INTO evaluation_attempts (
                user_id, evaluation_id, attempt_number, status, started_at,
                score, max_score, percentage, passed, certified, ip_address, user_agent
            ) VALUES ($1, $2, $3, $4, $5, 0, $6, 0, FALSE, FALSE, $7, $8)
            RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt.user_id)
        .bind(attempt.evaluation_id)
        .bind(attempt.attempt_number)
        .bind(AttemptStatus::InProgress)
        .bind(attempt.started_at)
        .bind(attempt.max_score)
        .bind(attempt.ip_address)
        .bind(attempt.user_agent)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            let constraint = e
                .as_database_error()
                .and_then(|db| db.constraint())
                .map(str::to_owned);
            match (AppError::from(e), constraint.as_deref()) {
                (AppError::Conflict(_), Some("uq_attempts_in_progress")) => AppError::Conflict(
                    "An attempt is already in progress for this evaluation".to_string(),
                ),
                (AppError::Conflict(_), Some("uq_attempts_number")) => AppError::Conflict(
                    format!("Attempt number {} is already taken", attempt_number),
                ),
                (other, _) => other,
            }
        })
    }

    async fn find_attempt(&mut self, id: i64) -> Result<Option<Attempt>, AppError> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM evaluation_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(attempt)
    }

    async fn lock_attempt(&mut self, id: i64) -> Result<Option<Attempt>, AppError> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM evaluation_attempts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(attempt)
    }

    async fn find_in_progress_attempt(
        &mut self,
        user_id: i64,
        evaluation_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM evaluation_attempts \
             WHERE user_id = $1 AND evaluation_id = $2 AND status = $3"
        ))
        .bind(user_id)
        .bind(evaluation_id)
        .bind(AttemptStatus::InProgress)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(attempt)
    }

    async fn count_attempts(&mut self, user_id: i64, evaluation_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM evaluation_attempts WHERE user_id = $1 AND evaluation_id = $2",
        )
        .bind(user_id)
        .bind(evaluation_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn max_attempt_number(
        &mut self,
        user_id: i64,
        evaluation_id: i64,
    ) -> Result<i32, AppError> {
        let max: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(attempt_number), 0) FROM evaluation_attempts \
             WHERE user_id = $1 AND evaluation_id = $2",
        )
        .bind(user_id)
        .bind(evaluation_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(max)
    }

    async fn has_passed_attempt(
        &mut self,
        user_id: i64,
        evaluation_id: i64,
    ) -> Result<bool, AppError> {
        let passed: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM evaluation_attempts
                WHERE user_id = $1 AND evaluation_id = $2 AND passed
            )",
        )
        .bind(user_id)
        .bind(evaluation_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(passed)
    }

    async fn update_attempt(&mut self, id: i64, update: AttemptUpdate) -> Result<Attempt, AppError> {
        sqlx::query_as::<_, Attempt>(&format!(
            "UPDATE evaluation_attempts SET
                status = $1, completed_at = $2, time_spent_minutes = $3, score = $4,
                percentage = $5, passed = $6, certified = $7, ip_address = $8, user_agent = $9
            WHERE id = $10
            RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(update.status)
        .bind(update.completed_at)
        .bind(update.time_spent_minutes)
        .bind(update.score)
        .bind(update.percentage)
        .bind(update.passed)
        .bind(update.certified)
        .bind(update.ip_address)
        .bind(update.user_agent)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", id)))
    }

    async fn list_attempts_by_user(&mut self, user_id: i64) -> Result<Vec<Attempt>, AppError> {
        let attempts = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM evaluation_attempts \
             WHERE user_id = $1 ORDER BY started_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(attempts)
    }

    async fn list_attempts_by_evaluation(
        &mut self,
        evaluation_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let attempts = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM evaluation_attempts \
             WHERE evaluation_id = $1 ORDER BY started_at DESC, id DESC"
        ))
        .bind(evaluation_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(attempts)
    }

    async fn delete_attempt(&mut self, id: i64) -> Result<bool, AppError> {
        // Answers and certificate go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM evaluation_attempts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_answer(&mut self, answer: AnswerUpsert) -> Result<UserAnswer, AppError> {
        let stored = sqlx::query_as::<_, UserAnswer>(&format!(
            "INSERT INTO user_answers (
                attempt_id, question_id, selected_option_id, text_answer, is_correct,
                points_earned, time_spent_seconds, flagged, answered_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                selected_option_id = EXCLUDED.selected_option_id,
                text_answer = EXCLUDED.text_answer,
                is_correct = EXCLUDED.is_correct,
                points_earned = EXCLUDED.points_earned,
                time_spent_seconds = EXCLUDED.time_spent_seconds,
                flagged = EXCLUDED.flagged,
                answered_at = EXCLUDED.answered_at
            RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(answer.selected_option_id)
        .bind(answer.text_answer)
        .bind(answer.is_correct)
        .bind(answer.points_earned)
        .bind(answer.time_spent_seconds)
        .bind(answer.flagged)
        .bind(answer.answered_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(stored)
    }

    async fn list_answers(&mut self, attempt_id: i64) -> Result<Vec<UserAnswer>, AppError> {
        let answers = sqlx::query_as::<_, UserAnswer>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM user_answers WHERE attempt_id = $1 ORDER BY question_id"
        ))
        .bind(attempt_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(answers)
    }

    async fn count_answers(&mut self, attempt_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_answers WHERE attempt_id = $1")
            .bind(attempt_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn sum_points(&mut self, attempt_id: i64) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points_earned), 0)::BIGINT FROM user_answers WHERE attempt_id = $1",
        )
        .bind(attempt_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(total)
    }

    async fn insert_certificate(
        &mut self,
        certificate: NewCertificate,
    ) -> Result<Certificate, AppError> {
        let inserted = sqlx::query_as::<_, Certificate>(&format!(
            "INSERT INTO certificates (
                attempt_id, user_id, evaluation_id, certificate_code, issued_at, status
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (attempt_id) DO NOTHING
            RETURNING {CERTIFICATE_COLUMNS}"
        ))
        .bind(certificate.attempt_id)
        .bind(certificate.user_id)
        .bind(certificate.evaluation_id)
        .bind(&certificate.certificate_code)
        .bind(certificate.issued_at)
        .bind(CertificateStatus::Active)
        .fetch_optional(&mut *self.tx)
        .await?;

        match inserted {
            Some(created) => Ok(created),
            None => self
                .find_certificate_by_attempt(certificate.attempt_id)
                .await?
                .ok_or_else(|| AppError::InternalServerError("Certificate missing".to_string())),
        }
    }

    async fn find_certificate_by_attempt(
        &mut self,
        attempt_id: i64,
    ) -> Result<Option<Certificate>, AppError> {
        let certificate = sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE attempt_id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(certificate)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
