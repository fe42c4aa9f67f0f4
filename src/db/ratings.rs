use crate::error::AppError;
use crate::models::Rating;
use sqlx::SqlitePool;

pub struct NewRating<'a> {
    pub session_token: &'a str,
    pub user_id: &'a str,
    pub scene_id: &'a str,
    pub image_id: &'a str,
    pub rate: f64,
}

pub async fn create_rating(pool: &SqlitePool, rating: &NewRating<'_>) -> Result<Rating, AppError> {
    let id = uuid::Uuid::now_v7().to_string();

    sqlx::query(
        r#"
        INSERT INTO ratings (id, session_token, user_id, scene_id, image_id, rate)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(rating.session_token)
    .bind(rating.user_id)
    .bind(rating.scene_id)
    .bind(rating.image_id)
    .bind(rating.rate)
    .execute(pool)
    .await?;

    let created = sqlx::query_as::<_, Rating>(
        r#"
        SELECT id, session_token, user_id, scene_id, image_id, rate, submitted_at
        FROM ratings
        WHERE id = ?
        "#,
    )
    .bind(&id)
    .fetch_optional(pool)
    .await?;

    created.ok_or(AppError::Internal("Failed to retrieve created rating".to_string()))
}
