// src/handlers/auth.rs

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        response::ApiResponse,
        user::{AuthResponse, LoginRequest, RegisterRequest, Role},
    },
    store::{NewUser, Store},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user with the NORMAL role.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let password_hash = hash_password(&payload.password)?;
    let name = payload.name.unwrap_or_else(|| payload.username.clone());

    let mut tx = store.begin().await?;
    let user = tx
        .create_user(NewUser {
            username: payload.username,
            name,
            password_hash,
            role: Role::Normal,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User registered successfully", user)),
    ))
}

/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = store.begin().await?;
    let user = tx.find_user_by_username(&payload.username).await?;
    tx.commit().await?;

    let invalid = || AppError::AuthError("Invalid username or password".to_string());
    let user = user.ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(invalid());
    }

    let token = sign_jwt(
        user.id,
        user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(ApiResponse::ok(
        "Login successful",
        AuthResponse {
            token,
            token_type: "Bearer",
            user_id: user.id,
            role: user.role,
        },
    )))
}
