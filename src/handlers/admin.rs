// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::AttemptEngine,
    error::AppError,
    models::{
        evaluation::{
            CreateEvaluationRequest, CreateQuestionRequest, EvaluationDetail, EvaluationStatus,
            QuestionDetail,
        },
        response::ApiResponse,
    },
    store::{NewEvaluation, NewOption, NewQuestion, Store},
    utils::{html::clean_html, jwt::Claims},
};

/// Creates an evaluation.
/// Admin only.
pub async fn create_evaluation(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<CreateEvaluationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = store.begin().await?;

    if let Some(prerequisite_id) = payload.prerequisite_evaluation_id {
        if tx.find_evaluation(prerequisite_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Prerequisite evaluation {} not found",
                prerequisite_id
            )));
        }
    }

    let evaluation = tx
        .create_evaluation(NewEvaluation {
            title: clean_html(&payload.title),
            description: payload.description.as_deref().map(clean_html),
            duration_minutes: payload.duration_minutes,
            passing_score: payload.passing_score,
            max_attempts: payload.max_attempts,
            time_limit_enabled: payload.time_limit_enabled,
            status: payload.status.unwrap_or(EvaluationStatus::Active),
            prerequisite_evaluation_id: payload.prerequisite_evaluation_id,
            show_results_immediately: payload.show_results_immediately,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(evaluation_id = evaluation.id, title = %evaluation.title, "Evaluation created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Evaluation created successfully", evaluation)),
    ))
}

/// Evaluation with its questions and options, correct flags included.
/// Admin only.
pub async fn get_evaluation(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = store.begin().await?;

    let evaluation = tx
        .find_evaluation(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Evaluation {} not found", id)))?;

    let mut questions = Vec::new();
    for question in tx.list_questions(id).await? {
        let options = tx.list_options(question.id).await?;
        questions.push(QuestionDetail { question, options });
    }
    tx.commit().await?;

    Ok(Json(ApiResponse::ok(
        "Evaluation retrieved successfully",
        EvaluationDetail {
            evaluation,
            questions,
        },
    )))
}

/// Adds a question (with its options) to an evaluation.
/// Admin only.
pub async fn add_question(
    State(store): State<Arc<dyn Store>>,
    Path(evaluation_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    payload.check_options().map_err(AppError::BadRequest)?;

    let mut tx = store.begin().await?;
    if tx.find_evaluation(evaluation_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Evaluation {} not found",
            evaluation_id
        )));
    }

    let options = payload
        .options
        .iter()
        .enumerate()
        .map(|(i, o)| NewOption {
            option_text: clean_html(&o.option_text),
            is_correct: o.is_correct,
            order_index: o.order_index.unwrap_or(i as i32),
        })
        .collect();

    let (question, options) = tx
        .create_question(NewQuestion {
            evaluation_id,
            question_text: clean_html(&payload.question_text),
            question_type: payload.question_type,
            points: payload.points,
            explanation: payload.explanation.as_deref().map(clean_html),
            options,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(
        evaluation_id,
        question_id = question.id,
        question_type = question.question_type.as_str(),
        "Question added"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Question created successfully",
            QuestionDetail { question, options },
        )),
    ))
}

/// All attempts at an evaluation, newest first.
/// Admin only.
pub async fn list_evaluation_attempts(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(evaluation_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = engine
        .list_evaluation_attempts(&claims.principal()?, evaluation_id)
        .await?;
    Ok(Json(ApiResponse::ok("Attempts retrieved successfully", attempts)))
}

/// Deletes an attempt with its answers and certificate.
/// Admin only.
pub async fn delete_attempt(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    engine.delete_attempt(&claims.principal()?, id).await?;
    Ok(Json(ApiResponse::empty("Attempt deleted successfully")))
}
