// src/engine/mod.rs

//! Attempt lifecycle: start, answer, submit, expire, and read results.
//!
//! Each public operation is one store transaction. State-changing operations lock the
//! attempt row and run the deadline guard before doing anything else.

pub mod access;
pub mod certificate;
pub mod clock;
pub mod expiry;
pub mod results;
pub mod scoring;

use std::{collections::HashMap, sync::Arc};

use crate::{
    error::AppError,
    models::{
        attempt::{
            Attempt, AttemptStatus, AttemptView, SubmitAnswerRequest, UpdateAttemptRequest,
            UserAnswer,
        },
        evaluation::{Evaluation, EvaluationStatus},
        result::AttemptResult,
        user::User,
    },
    store::{AnswerUpsert, AttemptUpdate, NewAttempt, NewCertificate, Store, StoreTx},
};

use self::{
    access::Principal,
    certificate::{CertificateIssuer, CodeGenerator},
    clock::{Clock, SystemClock},
    expiry::{Deadline, check_and_expire, clamp_minutes},
};

/// Input for starting an attempt.
#[derive(Debug, Clone)]
pub struct StartAttempt {
    pub evaluation_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AttemptEngine {
    store: Arc<dyn Store>,
    issuer: Arc<dyn CertificateIssuer>,
    clock: Arc<dyn Clock>,
}

impl AttemptEngine {
    pub fn new(
        store: Arc<dyn Store>,
        issuer: Arc<dyn CertificateIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            issuer,
            clock,
        }
    }

    /// System clock and the default certificate code generator.
    pub fn with_defaults(store: Arc<dyn Store>) -> Self {
        Self::new(store, Arc::new(CodeGenerator), Arc::new(SystemClock))
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// Opens a new attempt for `user_id`.
    ///
    /// Checks, in order: user exists, evaluation exists and is active, no attempt in
    /// progress, attempt cap not reached, prerequisite passed.
    pub async fn start_attempt(
        &self,
        user_id: i64,
        request: StartAttempt,
    ) -> Result<AttemptView, AppError> {
        let mut tx = self.store.begin().await?;

        let user = tx
            .lock_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let evaluation = tx
            .find_evaluation(request.evaluation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Evaluation {} not found", request.evaluation_id))
            })?;

        if evaluation.status != EvaluationStatus::Active {
            return Err(AppError::BusinessRule(
                "The evaluation is not available".to_string(),
            ));
        }

        if tx
            .find_in_progress_attempt(user.id, evaluation.id)
            .await?
            .is_some()
        {
            tracing::warn!(user_id, evaluation_id = evaluation.id, "Attempt already in progress");
            return Err(AppError::Conflict(
                "You already have an attempt in progress for this evaluation".to_string(),
            ));
        }

        let prior_attempts = tx.count_attempts(user.id, evaluation.id).await?;
        if prior_attempts >= evaluation.max_attempts as i64 {
            tracing::warn!(user_id, evaluation_id = evaluation.id, prior_attempts, "Attempt limit reached");
            return Err(AppError::BusinessRule(
                "You have reached the maximum number of attempts for this evaluation".to_string(),
            ));
        }

        if let Some(prerequisite_id) = evaluation.prerequisite_evaluation_id {
            if !tx.has_passed_attempt(user.id, prerequisite_id).await? {
                return Err(AppError::BusinessRule(
                    "You must pass the prerequisite evaluation before starting this one"
                        .to_string(),
                ));
            }
        }

        let questions = tx.list_questions(evaluation.id).await?;
        let max_score: i64 = questions.iter().map(|q| q.points as i64).sum();
        let max_score = i32::try_from(max_score).map_err(|_| {
            AppError::BusinessRule(
                "The evaluation's total points exceed the supported range".to_string(),
            )
        })?;

        // Numbers freed by deleted attempts are never reused.
        let attempt_number = tx
            .max_attempt_number(user.id, evaluation.id)
            .await?
            .checked_add(1)
            .ok_or_else(|| {
                AppError::InternalServerError("Attempt number out of range".to_string())
            })?;

        let attempt = tx
            .insert_attempt(NewAttempt {
                user_id: user.id,
                evaluation_id: evaluation.id,
                attempt_number,
                started_at: self.clock.now(),
                max_score,
                ip_address: request.ip_address,
                user_agent: request.user_agent,
            })
            .await?;

        tx.commit().await?;

        tracing::info!(
            attempt_id = attempt.id,
            user_id = user.id,
            evaluation_id = evaluation.id,
            attempt_number = attempt.attempt_number,
            max_score = attempt.max_score,
            "Attempt started"
        );

        Ok(attempt_view(&attempt, &user, &evaluation, questions.len() as i64, 0))
    }

    /// Attempt summary for its owner or an admin.
    pub async fn get_attempt(
        &self,
        principal: &Principal,
        attempt_id: i64,
    ) -> Result<AttemptView, AppError> {
        let mut tx = self.store.begin().await?;
        let attempt = find_attempt(tx.as_mut(), attempt_id).await?;
        principal.require_inspect(&attempt)?;

        let view = load_view(tx.as_mut(), &attempt, &mut ViewCache::default()).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Owner updates to a running attempt. `ABANDONED` is the only status an owner may set.
    pub async fn update_attempt(
        &self,
        principal: &Principal,
        attempt_id: i64,
        request: UpdateAttemptRequest,
    ) -> Result<AttemptView, AppError> {
        let mut tx = self.store.begin().await?;
        let attempt = lock_attempt(tx.as_mut(), attempt_id).await?;
        principal.require_owner(&attempt, "update")?;
        ensure_in_progress(&attempt, "Only an attempt in progress can be updated")?;

        let evaluation = find_evaluation(tx.as_mut(), attempt.evaluation_id).await?;
        let mut attempt = match check_and_expire(attempt, &evaluation, self.clock.now()) {
            Deadline::Open { attempt, .. } => attempt,
            Deadline::Passed(expired) => return Err(commit_expiry(tx, &expired).await?),
        };

        match request.status {
            None | Some(AttemptStatus::InProgress) => {}
            Some(AttemptStatus::Abandoned) => attempt.status = AttemptStatus::Abandoned,
            Some(_) => {
                return Err(AppError::BusinessRule(
                    "An attempt can only be abandoned by its owner".to_string(),
                ));
            }
        }
        if let Some(minutes) = request.time_spent_minutes {
            attempt.time_spent_minutes = Some(minutes);
        }
        if let Some(ip_address) = request.ip_address {
            attempt.ip_address = Some(ip_address);
        }
        if let Some(user_agent) = request.user_agent {
            attempt.user_agent = Some(user_agent);
        }

        let attempt = tx
            .update_attempt(attempt.id, AttemptUpdate::from(&attempt))
            .await?;
        let view = load_view(tx.as_mut(), &attempt, &mut ViewCache::default()).await?;
        tx.commit().await?;

        if attempt.status == AttemptStatus::Abandoned {
            tracing::info!(attempt_id = attempt.id, user_id = attempt.user_id, "Attempt abandoned");
        }
        Ok(view)
    }

    /// Records (or replaces) the answer to one question of a running attempt.
    pub async fn submit_answer(
        &self,
        principal: &Principal,
        attempt_id: i64,
        request: SubmitAnswerRequest,
    ) -> Result<UserAnswer, AppError> {
        let mut tx = self.store.begin().await?;
        let attempt = lock_attempt(tx.as_mut(), attempt_id).await?;
        principal.require_owner(&attempt, "answer in")?;
        ensure_in_progress(
            &attempt,
            "You cannot answer in an attempt that is not in progress",
        )?;

        let evaluation = find_evaluation(tx.as_mut(), attempt.evaluation_id).await?;
        let now = self.clock.now();
        let attempt = match check_and_expire(attempt, &evaluation, now) {
            Deadline::Open { attempt, .. } => attempt,
            Deadline::Passed(expired) => return Err(commit_expiry(tx, &expired).await?),
        };

        let question = tx
            .find_question(request.question_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Question {} not found", request.question_id))
            })?;
        if question.evaluation_id != attempt.evaluation_id {
            return Err(AppError::BusinessRule(
                "The question does not belong to this evaluation".to_string(),
            ));
        }

        let selected = match (question.question_type.is_choice(), request.selected_option_id) {
            (true, Some(option_id)) => {
                let option = tx.find_option(option_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Option {} not found", option_id))
                })?;
                if option.question_id != question.id {
                    return Err(AppError::BusinessRule(
                        "The option does not belong to this question".to_string(),
                    ));
                }
                Some(option)
            }
            _ => None,
        };

        let text_answer = if question.question_type.is_choice() {
            None
        } else {
            request.text_answer.clone()
        };

        let grade = scoring::grade(&question, selected.as_ref());
        let answer = tx
            .upsert_answer(AnswerUpsert {
                attempt_id: attempt.id,
                question_id: question.id,
                selected_option_id: selected.as_ref().map(|o| o.id),
                text_answer,
                is_correct: grade.is_correct,
                points_earned: grade.points_earned,
                time_spent_seconds: request.time_spent_seconds,
                flagged: request.flagged.unwrap_or(false),
                answered_at: now,
            })
            .await?;

        tx.commit().await?;

        tracing::debug!(
            attempt_id = attempt.id,
            question_id = question.id,
            is_correct = answer.is_correct,
            "Answer saved"
        );
        Ok(answer)
    }

    /// Closes a running attempt, scores it and issues a certificate when it passes.
    pub async fn submit_evaluation(
        &self,
        principal: &Principal,
        attempt_id: i64,
    ) -> Result<AttemptResult, AppError> {
        let mut tx = self.store.begin().await?;
        let attempt = lock_attempt(tx.as_mut(), attempt_id).await?;
        principal.require_owner(&attempt, "submit")?;
        ensure_in_progress(
            &attempt,
            "This attempt was already submitted or is not in progress",
        )?;

        let evaluation = find_evaluation(tx.as_mut(), attempt.evaluation_id).await?;
        let now = self.clock.now();
        let (mut attempt, elapsed_minutes) = match check_and_expire(attempt, &evaluation, now) {
            Deadline::Open {
                attempt,
                elapsed_minutes,
            } => (attempt, elapsed_minutes),
            Deadline::Passed(expired) => return Err(commit_expiry(tx, &expired).await?),
        };

        let score = tx.sum_points(attempt.id).await?;
        let percentage = scoring::percentage(score, attempt.max_score as i64);
        let passed = scoring::is_passing(percentage, evaluation.passing_score);

        attempt.score = i32::try_from(score).map_err(|_| {
            AppError::InternalServerError("Attempt score out of range".to_string())
        })?;
        attempt.percentage = percentage;
        attempt.passed = passed;
        attempt.certified = passed;
        attempt.time_spent_minutes = Some(clamp_minutes(elapsed_minutes));
        attempt.completed_at = Some(now);
        attempt.status = AttemptStatus::Completed;

        let attempt = tx
            .update_attempt(attempt.id, AttemptUpdate::from(&attempt))
            .await?;

        if passed {
            let certificate = tx
                .insert_certificate(NewCertificate {
                    attempt_id: attempt.id,
                    user_id: attempt.user_id,
                    evaluation_id: attempt.evaluation_id,
                    certificate_code: self.issuer.issue_code(&attempt, now),
                    issued_at: now,
                })
                .await?;
            tracing::info!(
                attempt_id = attempt.id,
                certificate_code = %certificate.certificate_code,
                "Certificate issued"
            );
        }

        let result = results::build_attempt_result(tx.as_mut(), &attempt).await?;
        tx.commit().await?;

        tracing::info!(
            attempt_id = attempt.id,
            user_id = attempt.user_id,
            score = attempt.score,
            max_score = attempt.max_score,
            percentage = %attempt.percentage,
            passed = attempt.passed,
            "Attempt completed"
        );
        Ok(result)
    }

    /// Breakdown of a completed attempt.
    ///
    /// Owners see it only when the evaluation shows results immediately; admins always do.
    pub async fn get_results(
        &self,
        principal: &Principal,
        attempt_id: i64,
    ) -> Result<AttemptResult, AppError> {
        let mut tx = self.store.begin().await?;
        let attempt = find_attempt(tx.as_mut(), attempt_id).await?;
        principal.require_inspect(&attempt)?;

        if attempt.status != AttemptStatus::Completed {
            return Err(AppError::BusinessRule(
                "The attempt has not been completed".to_string(),
            ));
        }

        let evaluation = find_evaluation(tx.as_mut(), attempt.evaluation_id).await?;
        if !evaluation.show_results_immediately && !principal.is_admin {
            return Err(AppError::BusinessRule(
                "Results for this evaluation are not available yet".to_string(),
            ));
        }

        let result = results::build_attempt_result(tx.as_mut(), &attempt).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// All attempts of a user, newest first.
    pub async fn list_user_attempts(
        &self,
        principal: &Principal,
        user_id: i64,
    ) -> Result<Vec<AttemptView>, AppError> {
        principal.require_self_or_admin(user_id)?;

        let mut tx = self.store.begin().await?;
        let attempts = tx.list_attempts_by_user(user_id).await?;
        let views = load_views(tx.as_mut(), &attempts).await?;
        tx.commit().await?;
        Ok(views)
    }

    /// All attempts at an evaluation, newest first. Admin only.
    pub async fn list_evaluation_attempts(
        &self,
        principal: &Principal,
        evaluation_id: i64,
    ) -> Result<Vec<AttemptView>, AppError> {
        principal.require_admin()?;

        let mut tx = self.store.begin().await?;
        find_evaluation(tx.as_mut(), evaluation_id).await?;
        let attempts = tx.list_attempts_by_evaluation(evaluation_id).await?;
        let views = load_views(tx.as_mut(), &attempts).await?;
        tx.commit().await?;
        Ok(views)
    }

    /// Removes an attempt with its answers and certificate. Admin only.
    pub async fn delete_attempt(&self, principal: &Principal, attempt_id: i64) -> Result<(), AppError> {
        principal.require_admin()?;

        let mut tx = self.store.begin().await?;
        if !tx.delete_attempt(attempt_id).await? {
            return Err(AppError::NotFound(format!("Attempt {} not found", attempt_id)));
        }
        tx.commit().await?;

        tracing::info!(attempt_id, deleted_by = principal.user_id, "Attempt deleted");
        Ok(())
    }
}

fn ensure_in_progress(attempt: &Attempt, message: &str) -> Result<(), AppError> {
    if attempt.status.is_terminal() {
        Err(AppError::BusinessRule(message.to_string()))
    } else {
        Ok(())
    }
}

/// Persists the EXPIRED transition, then hands back the rejection for the caller to return.
async fn commit_expiry(mut tx: Box<dyn StoreTx>, expired: &Attempt) -> Result<AppError, AppError> {
    tx.update_attempt(expired.id, AttemptUpdate::from(expired))
        .await?;
    tx.commit().await?;

    tracing::info!(
        attempt_id = expired.id,
        user_id = expired.user_id,
        time_spent_minutes = ?expired.time_spent_minutes,
        "Attempt expired"
    );
    Ok(AppError::Expired(
        "The time limit for this evaluation has expired".to_string(),
    ))
}

async fn find_attempt(tx: &mut dyn StoreTx, attempt_id: i64) -> Result<Attempt, AppError> {
    tx.find_attempt(attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))
}

async fn lock_attempt(tx: &mut dyn StoreTx, attempt_id: i64) -> Result<Attempt, AppError> {
    tx.lock_attempt(attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))
}

async fn find_evaluation(tx: &mut dyn StoreTx, evaluation_id: i64) -> Result<Evaluation, AppError> {
    tx.find_evaluation(evaluation_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Evaluation {} not found", evaluation_id)))
}

/// Users and evaluations already loaded while building a list of views.
#[derive(Default)]
struct ViewCache {
    users: HashMap<i64, User>,
    evaluations: HashMap<i64, (Evaluation, i64)>,
}

async fn load_view(
    tx: &mut dyn StoreTx,
    attempt: &Attempt,
    cache: &mut ViewCache,
) -> Result<AttemptView, AppError> {
    if !cache.users.contains_key(&attempt.user_id) {
        let user = tx
            .find_user(attempt.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", attempt.user_id)))?;
        cache.users.insert(user.id, user);
    }
    if !cache.evaluations.contains_key(&attempt.evaluation_id) {
        let evaluation = find_evaluation(tx, attempt.evaluation_id).await?;
        let total_questions = tx.list_questions(evaluation.id).await?.len() as i64;
        cache
            .evaluations
            .insert(evaluation.id, (evaluation, total_questions));
    }

    let answered_questions = tx.count_answers(attempt.id).await?;
    let user = &cache.users[&attempt.user_id];
    let (evaluation, total_questions) = &cache.evaluations[&attempt.evaluation_id];

    Ok(attempt_view(
        attempt,
        user,
        evaluation,
        *total_questions,
        answered_questions,
    ))
}

async fn load_views(tx: &mut dyn StoreTx, attempts: &[Attempt]) -> Result<Vec<AttemptView>, AppError> {
    let mut cache = ViewCache::default();
    let mut views = Vec::with_capacity(attempts.len());
    for attempt in attempts {
        views.push(load_view(tx, attempt, &mut cache).await?);
    }
    Ok(views)
}

fn attempt_view(
    attempt: &Attempt,
    user: &User,
    evaluation: &Evaluation,
    total_questions: i64,
    answered_questions: i64,
) -> AttemptView {
    AttemptView {
        id: attempt.id,
        user_id: attempt.user_id,
        user_name: user.name.clone(),
        evaluation_id: attempt.evaluation_id,
        evaluation_title: evaluation.title.clone(),
        attempt_number: attempt.attempt_number,
        status: attempt.status,
        started_at: attempt.started_at,
        completed_at: attempt.completed_at,
        time_spent_minutes: attempt.time_spent_minutes,
        score: attempt.score,
        max_score: attempt.max_score,
        percentage: attempt.percentage,
        passed: attempt.passed,
        certified: attempt.certified,
        ip_address: attempt.ip_address.clone(),
        duration_minutes: evaluation.duration_minutes,
        total_questions,
        answered_questions,
    }
}
