use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest,
            ResetPasswordRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        services::{self, is_valid_username, AuthError},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn auth_error(e: AuthError) -> (StatusCode, String) {
    let status = match e {
        AuthError::UsernameTaken => StatusCode::CONFLICT,
        AuthError::UnknownUser => StatusCode::NOT_FOUND,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::Store(_) | AuthError::Internal(_) => {
            error!(error = %e, "auth operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

fn issue_tokens(state: &AppState, username: &str) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let sign = |r: anyhow::Result<String>| {
        r.map_err(|e| {
            error!(error = %e, "jwt sign failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
    };
    Ok(AuthResponse {
        access_token: sign(keys.sign_access(username))?,
        refresh_token: sign(keys.sign_refresh(username))?,
        user: PublicUser {
            username: username.to_string(),
        },
    })
}

fn validate_input(username: &str, password: &str) -> Result<(), (StatusCode, String)> {
    if !is_valid_username(username) {
        warn!(%username, "invalid username");
        return Err((StatusCode::BAD_REQUEST, "Invalid username".into()));
    }
    if password.is_empty() {
        warn!("empty password");
        return Err((StatusCode::BAD_REQUEST, "Password required".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.username = payload.username.trim().to_string();
    validate_input(&payload.username, &payload.password)?;

    let user = services::register(&state.users, &payload.username, &payload.password)
        .await
        .map_err(auth_error)?;
    if let Err(e) = state.users.set_current_user(Some(&user)).await {
        warn!(error = %e, "could not record current user");
    }

    info!(username = %user.username, "user registered");
    Ok(Json(issue_tokens(&state, &user.username)?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.username = payload.username.trim().to_string();
    validate_input(&payload.username, &payload.password)?;

    let user = match services::authenticate(&state.users, &payload.username, &payload.password).await
    {
        Ok(u) => u,
        Err(e) => {
            warn!(username = %payload.username, "login failed");
            return Err(auth_error(e));
        }
    };
    if let Err(e) = state.users.set_current_user(Some(&user)).await {
        warn!(error = %e, "could not record current user");
    }

    info!(username = %user.username, "user logged in");
    Ok(Json(issue_tokens(&state, &user.username)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    match state.users.find(&claims.sub).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err((StatusCode::UNAUTHORIZED, "User not found".into())),
        Err(e) => {
            error!(error = %e, "find user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    }
    Ok(Json(issue_tokens(&state, &claims.sub)?))
}

/// Only the signed-in owner of an account may reset its password.
#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(mut payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    payload.username = payload.username.trim().to_string();
    validate_input(&payload.username, &payload.new_password)?;
    if payload.username != caller {
        warn!(%caller, requested = %payload.username, "password reset for another account refused");
        return Err((StatusCode::FORBIDDEN, "Cannot reset another user's password".into()));
    }

    services::reset_password(&state.users, &payload.username, &payload.new_password)
        .await
        .map_err(auth_error)?;

    info!(username = %payload.username, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<StatusCode, (StatusCode, String)> {
    state.users.clear_current_user_if(&username).await.map_err(|e| {
        error!(error = %e, "clear current user failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    info!(%username, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    match state.users.find(&username).await {
        Ok(Some(user)) => Ok(Json(PublicUser {
            username: user.username,
        })),
        Ok(None) => {
            error!(%username, "user not found");
            Err((StatusCode::UNAUTHORIZED, "User not found".into()))
        }
        Err(e) => {
            error!(error = %e, %username, "find user failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
