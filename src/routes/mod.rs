//! # 라우트 핸들러 모듈
//!
//! HTTP 요청을 처리하는 핸들러 함수들을 모아둔 모듈입니다.
//! Axum에서 핸들러는 HTTP 요청을 받아 응답을 반환하는 async 함수입니다.
//!
//! 각 하위 모듈:
//! - `doctors`: 회원가입, 로그인, 프로필 조회/수정, 대시보드, 환자 요약
//! - `health`: 서버 상태 확인 (헬스체크)
//! - `patients`: 환자 등록, 필터 목록, 상세(통계/진행 추이)
//! - `ratings`: Unity 자극 평가 제출 (토큰 전용)
//! - `sessions`: 치료 세션 CRUD, 상태 전이, VR 실행/설정 조회
//! - `vr_data`: VR 결과 제출(토큰 전용), 조회, 정정, 분석
//!
//! ## 인증 방식은 두 가지
//! - 의사: `Authorization: Bearer <JWT>` → `AuthDoctor` 추출기
//! - VR 런타임: 세션 토큰을 경로나 본문에 담아 보냄 (의사 인증 없음)

pub mod doctors;
pub mod health;
pub mod patients;
pub mod ratings;
pub mod sessions;
pub mod vr_data;

use std::sync::Arc;

use axum::{
    extract::FromRequest,
    routing::{get, post, put},
    Router,
};
use sqlx::SqlitePool;

use crate::{db, error::AppError, models::*, services::runner::ScenarioRunner};

/// 애플리케이션 공유 상태
///
/// 모든 요청 핸들러가 `State(state): State<AppState>`로 접근합니다.
/// `runner`는 트레이트 객체라서 테스트에서 가짜 실행기로 바꿔 끼울 수 있습니다.
#[derive(Clone)]
pub struct AppState {
    /// SQLite 연결 풀 (내부적으로 Arc로 공유)
    pub pool: SqlitePool,
    /// JWT 토큰 서명용 비밀키
    pub jwt_secret: String,
    /// VR 시나리오 실행기
    pub runner: Arc<dyn ScenarioRunner>,
}

/// JSON 요청 본문 추출기
///
/// 본문 파싱에 실패하면 axum 기본 텍스트 응답 대신
/// `AppError::ValidationFailed`의 JSON 에러 형식으로 응답합니다.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// 세션을 찾고 요청한 의사의 소유인지 확인합니다.
///
/// 없으면 404, 다른 의사의 세션이면 403입니다.
pub async fn owned_session(
    pool: &SqlitePool,
    doctor_id: &str,
    session_id: &str,
) -> Result<TherapySession, AppError> {
    let session = db::get_session(pool, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if session.doctor_id != doctor_id {
        return Err(AppError::Forbidden(
            "Not authorized to access this session".to_string(),
        ));
    }
    Ok(session)
}

pub async fn owned_patient(
    pool: &SqlitePool,
    doctor_id: &str,
    patient_id: &str,
) -> Result<Patient, AppError> {
    let patient = db::get_patient(pool, patient_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Patient not found".to_string()))?;

    if patient.doctor_id != doctor_id {
        return Err(AppError::Forbidden(
            "Not authorized to access this patient".to_string(),
        ));
    }
    Ok(patient)
}

/// `/api` 아래에 붙일 전체 API 라우터
pub fn api_router(state: AppState) -> Router {
    // 의사 계정
    let doctor_routes = Router::new()
        .route("/doctors/register", post(doctors::register))
        .route("/doctors/login", post(doctors::login))
        .route(
            "/doctors/profile",
            get(doctors::profile).put(doctors::update_profile),
        )
        .route("/doctors/dashboard", get(doctors::dashboard))
        .route("/doctors/patients-summary", get(doctors::patients_summary));

    // 치료 세션: 정적 세그먼트(/upcoming, /vr-config)가 {id}보다 우선 매칭됩니다.
    let session_routes = Router::new()
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/sessions/upcoming", get(sessions::upcoming_sessions))
        .route(
            "/sessions/vr-config/{session_token}",
            get(sessions::vr_config),
        )
        .route(
            "/sessions/{id}",
            get(sessions::get_session).put(sessions::update_session),
        )
        .route("/sessions/{id}/status", put(sessions::update_status))
        .route("/sessions/{id}/start", post(sessions::start_session))
        .route("/sessions/{id}/complete", put(sessions::complete_session))
        .route("/sessions/{id}/cancel", put(sessions::cancel_session));

    let vr_data_routes = Router::new()
        .route("/vr-data/submit", post(vr_data::submit_vr_data))
        .route("/vr-data/analytics", get(vr_data::analytics))
        .route(
            "/vr-data/session/{session_id}",
            get(vr_data::get_session_vr_data),
        )
        .route(
            "/vr-data/patient/{patient_id}",
            get(vr_data::patient_history),
        )
        .route("/vr-data/{id}", put(vr_data::update_vr_data));

    Router::new()
        .merge(doctor_routes)
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route("/patients/{id}", get(patients::get_patient))
        .merge(session_routes)
        .merge(vr_data_routes)
        .route("/ratings/submit", post(ratings::submit_rating))
        .route("/health", get(health::health_check))
        .with_state(state)
}
