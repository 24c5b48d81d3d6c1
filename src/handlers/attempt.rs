// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::{AttemptEngine, StartAttempt},
    error::AppError,
    models::{
        attempt::{CreateAttemptRequest, SubmitAnswerRequest, UpdateAttemptRequest},
        response::ApiResponse,
    },
    utils::{client::ClientMeta, jwt::Claims},
};

/// Starts an attempt for the caller. Returns 201 with the attempt summary.
pub async fn start_attempt(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    client: ClientMeta,
    Json(payload): Json<CreateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let principal = claims.principal()?;

    let view = engine
        .start_attempt(
            principal.user_id,
            StartAttempt {
                evaluation_id: payload.evaluation_id,
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Attempt started successfully", view)),
    ))
}

pub async fn get_attempt(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = engine.get_attempt(&claims.principal()?, id).await?;
    Ok(Json(ApiResponse::ok("Attempt retrieved successfully", view)))
}

/// Owner-side update; used to abandon an attempt.
pub async fn update_attempt(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let view = engine
        .update_attempt(&claims.principal()?, id, payload)
        .await?;
    Ok(Json(ApiResponse::ok("Attempt updated successfully", view)))
}

pub async fn submit_answer(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let answer = engine
        .submit_answer(&claims.principal()?, id, payload)
        .await?;
    Ok(Json(ApiResponse::ok("Answer submitted successfully", answer)))
}

/// Finishes the attempt and returns the scored breakdown.
pub async fn submit_evaluation(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine.submit_evaluation(&claims.principal()?, id).await?;
    Ok(Json(ApiResponse::ok("Evaluation submitted successfully", result)))
}

pub async fn get_results(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine.get_results(&claims.principal()?, id).await?;
    Ok(Json(ApiResponse::ok("Results retrieved successfully", result)))
}

pub async fn list_my_attempts(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let principal = claims.principal()?;
    let attempts = engine
        .list_user_attempts(&principal, principal.user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Attempts retrieved successfully", attempts)))
}

pub async fn list_user_attempts(
    State(engine): State<Arc<AttemptEngine>>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = engine
        .list_user_attempts(&claims.principal()?, user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Attempts retrieved successfully", attempts)))
}
