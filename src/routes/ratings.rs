//! # 자극 평가(Rating) 라우트 핸들러
//!
//! - `POST /api/ratings/submit` → Unity 클라이언트가 이미지 자극마다 보내는 평가
//!
//! 의사 인증 없이 세션 토큰 소지만으로 제출합니다.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    db::{self, ratings as db_ratings},
    error::AppError,
    models::SubmitRatingRequest,
    routes::{AppJson, AppState},
};

fn required<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().map(str::trim).filter(|text| !text.is_empty())
}

pub async fn submit_rating(
    State(state): State<AppState>,
    AppJson(req): AppJson<SubmitRatingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (Some(session_token), Some(user_id), Some(scene_id), Some(image_id), Some(rate)) = (
        required(&req.session_token),
        required(&req.user_id),
        required(&req.scene_id),
        required(&req.image_id),
        req.rate.filter(|rate| rate.is_finite()),
    ) else {
        return Err(AppError::ValidationFailed(
            "sessionToken, userId, sceneId, imageId and rate are required".to_string(),
        ));
    };

    if db::find_session_by_token(&state.pool, session_token)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Invalid session token".to_string()));
    }

    let rating = db_ratings::create_rating(
        &state.pool,
        &db_ratings::NewRating {
            session_token,
            user_id,
            scene_id,
            image_id,
            rate,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Rating submitted",
            "id": rating.id
        })),
    ))
}
