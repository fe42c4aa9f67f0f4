use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{db::doctors as db_doctors, models::Doctor, routes::AppState};

const TOKEN_LIFETIME_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // doctor id
    pub exp: i64,
    pub iat: i64,
}

/// 인증된 의사: 토큰 검증 후 DB에서 다시 읽은 활성 계정
#[derive(Debug, Clone)]
pub struct AuthDoctor {
    pub doctor: Doctor,
}

impl AuthDoctor {
    pub fn id(&self) -> &str {
        &self.doctor.id
    }
}

impl FromRequestParts<AppState> for AuthDoctor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;

        let claims = verify_access_token(token, &state.jwt_secret)?;

        let doctor = db_doctors::find_by_id(&state.pool, &claims.sub)
            .await
            .map_err(|e| {
                tracing::error!("Doctor lookup failed during auth: {}", e);
                AuthError::Unavailable
            })?
            .ok_or(AuthError::UnknownDoctor)?;

        if !doctor.is_active {
            return Err(AuthError::InactiveAccount);
        }

        Ok(AuthDoctor { doctor })
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    ExpiredToken,
    UnknownDoctor,
    InactiveAccount,
    Unavailable,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "missing_token",
                "Authorization token is required",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid authorization token",
            ),
            AuthError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "expired_token",
                "Authorization token has expired",
            ),
            AuthError::UnknownDoctor => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Doctor account not found",
            ),
            AuthError::InactiveAccount => (
                StatusCode::UNAUTHORIZED,
                "inactive_account",
                "Doctor account is deactivated",
            ),
            AuthError::Unavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred",
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

pub fn create_access_token(
    doctor_id: &str,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: doctor_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let token = create_access_token("doc-1", "secret").unwrap();
        let claims = verify_access_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "doc-1");
        assert!(claims.exp - claims.iat >= 30 * 24 * 60 * 60);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_access_token("doc-1", "secret").unwrap();
        assert!(matches!(
            verify_access_token(&token, "other"),
            Err(AuthError::InvalidToken)
        ));
    }
}
