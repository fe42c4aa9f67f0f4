use serde::{Deserialize, Serialize};

/// Unity 클라이언트가 자극(이미지)마다 보내는 평가 한 건
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: String,
    pub session_token: String,
    pub user_id: String,
    pub scene_id: String,
    pub image_id: String,
    pub rate: f64,
    pub submitted_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingRequest {
    pub session_token: Option<String>,
    pub user_id: Option<String>,
    pub scene_id: Option<String>,
    pub image_id: Option<String>,
    pub rate: Option<f64>,
}
