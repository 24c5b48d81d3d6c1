// src/store/memory.rs

//! In-process store.
//!
//! A transaction takes the single state lock for its whole lifetime and works on a
//! copy, so transactions are serialisable and an uncommitted one leaves no trace.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

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

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<i64, User>,
    evaluations: BTreeMap<i64, Evaluation>,
    questions: BTreeMap<i64, Question>,
    options: BTreeMap<i64, QuestionOption>,
    attempts: BTreeMap<i64, Attempt>,
    answers: BTreeMap<i64, UserAnswer>,
    certificates: BTreeMap<i64, Certificate>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn newest_first(mut attempts: Vec<Attempt>) -> Vec<Attempt> {
    attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
    attempts
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn create_user(&mut self, user: NewUser) -> Result<User, AppError> {
        if self.working.users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }
        let id = self.working.allocate_id();
        let user = User {
            id,
            username: user.username,
            name: user.name,
            password: user.password_hash,
            role: user.role,
            created_at: chrono::Utc::now(),
        };
        self.working.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.working.users.values().find(|u| u.username == username).cloned())
    }

    async fn lock_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        // The whole state is already held by this transaction.
        self.find_user(id).await
    }

    async fn create_evaluation(&mut self, evaluation: NewEvaluation) -> Result<Evaluation, AppError> {
        let id = self.working.allocate_id();
        let evaluation = Evaluation {
            id,
            title: evaluation.title,
            description: evaluation.description,
            duration_minutes: evaluation.duration_minutes,
            passing_score: evaluation.passing_score,
            max_attempts: evaluation.max_attempts,
            time_limit_enabled: evaluation.time_limit_enabled,
            status: evaluation.status,
            prerequisite_evaluation_id: evaluation.prerequisite_evaluation_id,
            show_results_immediately: evaluation.show_results_immediately,
            created_at: chrono::Utc::now(),
        };
        self.working.evaluations.insert(id, evaluation.clone());
        Ok(evaluation)
    }

    async fn find_evaluation(&mut self, id: i64) -> Result<Option<Evaluation>, AppError> {
        Ok(self.working.evaluations.get(&id).cloned())
    }

    async fn create_question(
        &mut self,
        question: NewQuestion,
    ) -> Result<(Question, Vec<QuestionOption>), AppError> {
        let id = self.working.allocate_id();
        let created = Question {
            id,
            evaluation_id: question.evaluation_id,
            question_text: question.question_text,
            question_type: question.question_type,
            points: question.points,
            explanation: question.explanation,
        };
        self.working.questions.insert(id, created.clone());

        let mut options = Vec::with_capacity(question.options.len());
        for option in question.options {
            let option_id = self.working.allocate_id();
            let option = QuestionOption {
                id: option_id,
                question_id: id,
                option_text: option.option_text,
                is_correct: option.is_correct,
                order_index: option.order_index,
            };
            self.working.options.insert(option_id, option.clone());
            options.push(option);
        }
        options.sort_by_key(|o| (o.order_index, o.id));
        Ok((created, options))
    }

    async fn find_question(&mut self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.working.questions.get(&id).cloned())
    }

    async fn list_questions(&mut self, evaluation_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self
            .working
            .questions
            .values()
            .filter(|q| q.evaluation_id == evaluation_id)
            .cloned()
            .collect())
    }

    async fn find_option(&mut self, id: i64) -> Result<Option<QuestionOption>, AppError> {
        Ok(self.working.options.get(&id).cloned())
    }

    async fn list_options(&mut self, question_id: i64) -> Result<Vec<QuestionOption>, AppError> {
        let mut options: Vec<QuestionOption> = self
            .working
            .options
            .values()
            .filter(|o| o.question_id == question_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| (o.order_index, o.id));
        Ok(options)
    }

    async fn insert_attempt(&mut self, attempt: NewAttempt) -> Result<Attempt, AppError> {
        let siblings: Vec<&Attempt> = self
            .working
            .attempts
            .values()
            .filter(|a| a.user_id == attempt.user_id && a.evaluation_id == attempt.evaluation_id)
            .collect();
        if siblings.iter().any(|a| a.status == AttemptStatus::InProgress) {
            return Err(AppError::Conflict(
                "An attempt is already in progress for this evaluation".to_string(),
            ));
        }
        if siblings.iter().any(|a| a.attempt_number == attempt.attempt_number) {
            return Err(AppError::Conflict(format!(
                "Attempt number {} is already taken",
                attempt.attempt_number
            )));
        }

        let id = self.working.allocate_id();
        let created = Attempt {
            id,
            user_id: attempt.user_id,
            evaluation_id: attempt.evaluation_id,
            attempt_number: attempt.attempt_number,
            status: AttemptStatus::InProgress,
            started_at: attempt.started_at,
            completed_at: None,
            time_spent_minutes: None,
            score: 0,
            max_score: attempt.max_score,
            percentage: Decimal::ZERO,
            passed: false,
            certified: false,
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent,
        };
        self.working.attempts.insert(id, created.clone());
        Ok(created)
    }

    async fn find_attempt(&mut self, id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.working.attempts.get(&id).cloned())
    }

    async fn lock_attempt(&mut self, id: i64) -> Result<Option<Attempt>, AppError> {
        self.find_attempt(id).await
    }

    async fn find_in_progress_attempt(
        &mut self,
        user_id: i64,
        evaluation_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        Ok(self
            .working
            .attempts
            .values()
            .find(|a| {
                a.user_id == user_id
                    && a.evaluation_id == evaluation_id
                    && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn count_attempts(&mut self, user_id: i64, evaluation_id: i64) -> Result<i64, AppError> {
        Ok(self
            .working
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.evaluation_id == evaluation_id)
            .count() as i64)
    }

    async fn max_attempt_number(
        &mut self,
        user_id: i64,
        evaluation_id: i64,
    ) -> Result<i32, AppError> {
        Ok(self
            .working
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.evaluation_id == evaluation_id)
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0))
    }

    async fn has_passed_attempt(
        &mut self,
        user_id: i64,
        evaluation_id: i64,
    ) -> Result<bool, AppError> {
        Ok(self
            .working
            .attempts
            .values()
            .any(|a| a.user_id == user_id && a.evaluation_id == evaluation_id && a.passed))
    }

    async fn update_attempt(&mut self, id: i64, update: AttemptUpdate) -> Result<Attempt, AppError> {
        let attempt = self
            .working
            .attempts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", id)))?;

        attempt.status = update.status;
        attempt.completed_at = update.completed_at;
        attempt.time_spent_minutes = update.time_spent_minutes;
        attempt.score = update.score;
        attempt.percentage = update.percentage;
        attempt.passed = update.passed;
        attempt.certified = update.certified;
        attempt.ip_address = update.ip_address;
        attempt.user_agent = update.user_agent;
        Ok(attempt.clone())
    }

    async fn list_attempts_by_user(&mut self, user_id: i64) -> Result<Vec<Attempt>, AppError> {
        Ok(newest_first(
            self.working
                .attempts
                .values()
                .filter(|a| a.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_attempts_by_evaluation(
        &mut self,
        evaluation_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        Ok(newest_first(
            self.working
                .attempts
                .values()
                .filter(|a| a.evaluation_id == evaluation_id)
                .cloned()
                .collect(),
        ))
    }

    async fn delete_attempt(&mut self, id: i64) -> Result<bool, AppError> {
        if self.working.attempts.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.answers.retain(|_, a| a.attempt_id != id);
        self.working.certificates.retain(|_, c| c.attempt_id != id);
        Ok(true)
    }

    async fn upsert_answer(&mut self, answer: AnswerUpsert) -> Result<UserAnswer, AppError> {
        let existing = self
            .working
            .answers
            .values()
            .find(|a| a.attempt_id == answer.attempt_id && a.question_id == answer.question_id)
            .map(|a| a.id);
        let id = match existing {
            Some(id) => id,
            None => self.working.allocate_id(),
        };

        let stored = UserAnswer {
            id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            selected_option_id: answer.selected_option_id,
            text_answer: answer.text_answer,
            is_correct: answer.is_correct,
            points_earned: answer.points_earned,
            time_spent_seconds: answer.time_spent_seconds,
            flagged: answer.flagged,
            answered_at: answer.answered_at,
        };
        self.working.answers.insert(id, stored.clone());
        Ok(stored)
    }

    async fn list_answers(&mut self, attempt_id: i64) -> Result<Vec<UserAnswer>, AppError> {
        let mut answers: Vec<UserAnswer> = self
            .working
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.question_id);
        Ok(answers)
    }

    async fn count_answers(&mut self, attempt_id: i64) -> Result<i64, AppError> {
        Ok(self
            .working
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .count() as i64)
    }

    async fn sum_points(&mut self, attempt_id: i64) -> Result<i64, AppError> {
        Ok(self
            .working
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .map(|a| a.points_earned as i64)
            .sum())
    }

    async fn insert_certificate(
        &mut self,
        certificate: NewCertificate,
    ) -> Result<Certificate, AppError> {
        if let Some(existing) = self.find_certificate_by_attempt(certificate.attempt_id).await? {
            return Ok(existing);
        }
        if self
            .working
            .certificates
            .values()
            .any(|c| c.certificate_code == certificate.certificate_code)
        {
            return Err(AppError::Conflict("Certificate code already issued".to_string()));
        }

        let id = self.working.allocate_id();
        let created = Certificate {
            id,
            attempt_id: certificate.attempt_id,
            user_id: certificate.user_id,
            evaluation_id: certificate.evaluation_id,
            certificate_code: certificate.certificate_code,
            issued_at: certificate.issued_at,
            status: CertificateStatus::Active,
        };
        self.working.certificates.insert(id, created.clone());
        Ok(created)
    }

    async fn find_certificate_by_attempt(
        &mut self,
        attempt_id: i64,
    ) -> Result<Option<Certificate>, AppError> {
        Ok(self
            .working
            .certificates
            .values()
            .find(|c| c.attempt_id == attempt_id)
            .cloned())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            name: username.to_string(),
            password_hash: "hash".to_string(),
            role: Role::Normal,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.create_user(new_user("ghost")).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_user_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_writes_are_visible() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let user = tx.create_user(new_user("alice")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find_user(user.id).await.unwrap().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_user(new_user("bob")).await.unwrap();
        let err = tx.create_user(new_user("bob")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    fn new_attempt(user_id: i64, attempt_number: i32) -> NewAttempt {
        NewAttempt {
            user_id,
            evaluation_id: 1,
            attempt_number,
            started_at: chrono::Utc::now(),
            max_score: 10,
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_attempt_clashes_are_reported_separately() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.create_user(new_user("carol")).await.unwrap();

        let mut first = tx.insert_attempt(new_attempt(user.id, 1)).await.unwrap();
        match tx.insert_attempt(new_attempt(user.id, 2)).await.unwrap_err() {
            AppError::Conflict(msg) => assert!(msg.contains("in progress")),
            other => panic!("unexpected error: {:?}", other),
        }

        first.status = AttemptStatus::Completed;
        tx.update_attempt(first.id, AttemptUpdate::from(&first))
            .await
            .unwrap();
        match tx.insert_attempt(new_attempt(user.id, 1)).await.unwrap_err() {
            AppError::Conflict(msg) => assert!(msg.contains("already taken")),
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(tx.max_attempt_number(user.id, 1).await.unwrap(), 1);
        tx.insert_attempt(new_attempt(user.id, 2)).await.unwrap();
        assert_eq!(tx.max_attempt_number(user.id, 1).await.unwrap(), 2);
    }
}
