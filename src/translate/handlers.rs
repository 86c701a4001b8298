use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/translate", post(translate))
}

#[instrument(skip(state, payload))]
pub async fn translate(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, (StatusCode, String)> {
    if payload.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Text is empty".into()));
    }
    let text = state.translator.translate(&payload.text).await;
    info!(%username, chars = payload.text.chars().count(), "text translated");
    Ok(Json(TranslateResponse { text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_state_translates_with_fallback() {
        let state = AppState::fake();
        let Json(res) = translate(
            State(state),
            AuthUser("alice".into()),
            Json(TranslateRequest {
                text: "登录".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(res.text, "登录");
    }

    #[tokio::test]
    async fn blank_text_rejected() {
        let (status, _) = translate(
            State(AppState::fake()),
            AuthUser("alice".into()),
            Json(TranslateRequest { text: " ".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
