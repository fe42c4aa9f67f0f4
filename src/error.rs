//! # 에러 처리 모듈
//!
//! 애플리케이션에서 발생할 수 있는 모든 에러 타입을 정의합니다.
//!
//! 이 모듈의 핵심:
//! - `AppError` 열거형(enum): 모든 에러 종류를 하나의 타입으로 통합
//! - `IntoResponse` 구현: 에러를 HTTP 응답으로 자동 변환
//!
//! 모든 에러 응답은 같은 모양입니다:
//! `{ "error": { "code": "invalid_transition", "message": "..." } }`
//! `code`는 클라이언트가 분기할 수 있는 고정 문자열이고,
//! `message`는 사람이 읽는 설명입니다.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::SessionStatus;

/// 애플리케이션에서 발생할 수 있는 모든 에러 종류
///
/// 핸들러에서 `Result<T, AppError>`를 반환하면,
/// Axum이 자동으로 `IntoResponse`를 호출하여 HTTP 응답으로 변환합니다.
#[derive(Debug, Error)]
pub enum AppError {
    /// 엔티티나 토큰을 찾을 수 없음 (HTTP 404)
    #[error("{0}")]
    NotFound(String),

    /// 다른 의사의 리소스에 접근 (HTTP 403)
    #[error("{0}")]
    Forbidden(String),

    /// 상태 전이 규칙 위반 (HTTP 400)
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// 종료 상태의 세션을 수정하려 함 (HTTP 400)
    #[error("{0}")]
    Immutable(String),

    /// 같은 세션에 텔레메트리를 두 번 제출 (HTTP 409)
    #[error("VR session data already exists for this session")]
    AlreadySubmitted,

    /// 필수 필드 누락 또는 잘못된 값 (HTTP 400)
    #[error("{0}")]
    ValidationFailed(String),

    /// 종료된(완료/취소) 세션에 대한 VR 핸드셰이크 (HTTP 400)
    #[error("Session is no longer active")]
    SessionInactive,

    /// VR 런타임 실행 실패 (HTTP 500): 외부 시스템의 문제
    #[error("Failed to launch VR application: {0}")]
    LaunchFailed(String),

    /// 인증 실패 (HTTP 401)
    #[error("{0}")]
    Unauthorized(String),

    /// 리소스 충돌 (HTTP 409)
    #[error("{0}")]
    Conflict(String),

    /// 서버 내부 오류 (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// 데이터베이스 오류 (HTTP 500)
    /// #[from]: sqlx::Error → AppError::Database 자동 변환 (`?` 연산자에서 사용)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 파일/프로세스 입출력 오류 (HTTP 500)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// 클라이언트가 분기에 사용하는 고정 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Immutable(_) => "immutable",
            AppError::AlreadySubmitted => "already_submitted",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::SessionInactive => "session_inactive",
            AppError::LaunchFailed(_) => "launch_failed",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Database(_) => "database_error",
            AppError::Io(_) => "io_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition { .. }
            | AppError::Immutable(_)
            | AppError::ValidationFailed(_)
            | AppError::SessionInactive => StatusCode::BAD_REQUEST,
            AppError::AlreadySubmitted | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::LaunchFailed(_)
            | AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 요청 본문 JSON 파싱 실패를 `ValidationFailed`로 바꿉니다.
///
/// Axum 기본 `Json` 추출기는 실패 시 일반 텍스트 응답을 보내므로,
/// `routes::AppJson`이 이 변환을 통해 같은 에러 형식을 유지합니다.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationFailed(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    /// AppError를 HTTP 응답으로 변환합니다.
    ///
    /// 내부 에러(LaunchFailed, Database, IO, Internal)는 실제 에러 내용을 로그에만
    /// 기록하고, 클라이언트에는 일반적인 메시지만 반환합니다.
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::LaunchFailed(detail) => {
                tracing::error!("VR launch failed: {}", detail);
                "Failed to launch VR application".to_string()
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "An internal error occurred".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "A database error occurred".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "An IO error occurred".to_string()
            }
            other => other.to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let err = AppError::InvalidTransition {
            from: SessionStatus::Scheduled,
            to: SessionStatus::Completed,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(err.to_string(), "Cannot transition from Scheduled to Completed");
    }

    #[test]
    fn launch_failure_is_a_server_error() {
        let err = AppError::LaunchFailed("spawn failed".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "launch_failed");
    }

    #[test]
    fn duplicate_submission_is_a_conflict() {
        assert_eq!(AppError::AlreadySubmitted.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::AlreadySubmitted.code(), "already_submitted");
    }
}
