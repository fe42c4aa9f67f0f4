//! # 치료 세션 라우트 핸들러
//!
//! ## 엔드포인트 (의사 인증)
//! - `GET  /api/sessions`               → 세션 목록 (status, patientId, phobiaType 필터)
//! - `POST /api/sessions`               → 세션 예약 (Scheduled, 토큰 발급)
//! - `GET  /api/sessions/upcoming`      → 다가오는 Scheduled 세션
//! - `GET  /api/sessions/{id}`          → 세션 + VR 결과 데이터
//! - `PUT  /api/sessions/{id}`          → 편집 가능한 필드 수정
//! - `PUT  /api/sessions/{id}/status`   → 상태 전이
//! - `POST /api/sessions/{id}/start`    → VR 시나리오 실행
//! - `PUT  /api/sessions/{id}/complete` → 수동 완료
//! - `PUT  /api/sessions/{id}/cancel`   → 취소
//!
//! ## 엔드포인트 (세션 토큰)
//! - `GET /api/sessions/vr-config/{session_token}` → VR 런타임용 설정 스냅샷
//!
//! 상태를 바꾸는 핸들러는 모두 `services::lifecycle`을 거칩니다.
//! 라우트에서 `session_status`를 직접 쓰는 곳은 없습니다.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    db,
    error::AppError,
    middleware::auth::AuthDoctor,
    models::*,
    routes::{owned_patient, owned_session, AppJson, AppState},
    services::{handshake, lifecycle},
};

const DEFAULT_UPCOMING_LIMIT: i64 = 5;

pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Query(filter): Query<SessionListQuery>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = db::list_sessions(&state.pool, auth.id(), &filter).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

/// `GET /sessions/upcoming?limit=5`: 지금 이후로 예약된 세션 (가까운 순)
pub async fn upcoming_sessions(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let limit = query
        .limit
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_UPCOMING_LIMIT);
    let sessions =
        db::list_upcoming_sessions(&state.pool, auth.id(), &now_timestamp(), limit).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

/// `POST /sessions`: 내 환자에 대한 세션을 예약합니다.
///
/// 환자가 없으면 404, 다른 의사의 환자면 403입니다.
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthDoctor,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    req.validate()?;
    owned_patient(&state.pool, auth.id(), &req.patient_id).await?;

    let session = db::create_session(&state.pool, auth.id(), &req).await?;
    tracing::info!(session_id = %session.id, patient_id = %session.patient_id, "session scheduled");

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// `GET /sessions/{id}`: 세션과 VR 결과 데이터(없으면 null)
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = owned_session(&state.pool, auth.id(), &id).await?;
    let vr_data = db::find_vr_data_by_session(&state.pool, &session.id).await?;

    Ok(Json(json!({
        "session": SessionResponse::from(session),
        "vrData": vr_data
    })))
}

/// `PUT /sessions/{id}`: 편집 가능한 필드만 부분 수정합니다.
///
/// 종료된(Completed/Cancelled) 세션은 `Immutable`입니다.
/// 확인 직후 다른 요청이 세션을 종료시켰다면 UPDATE가 0행이 되어 같은 에러가 납니다.
pub async fn update_session(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = owned_session(&state.pool, auth.id(), &id).await?;
    ensure_editable(&session)?;
    req.validate()?;

    if !db::update_session(&state.pool, &session.id, &req).await? {
        return Err(AppError::Immutable(
            "Session was closed while being edited".to_string(),
        ));
    }

    let updated = db::get_session(&state.pool, &session.id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve updated session".to_string()))?;
    Ok(Json(updated.into()))
}

fn ensure_editable(session: &TherapySession) -> Result<(), AppError> {
    match session.session_status {
        SessionStatus::Completed => Err(AppError::Immutable(
            "Cannot modify a completed session".to_string(),
        )),
        SessionStatus::Cancelled => Err(AppError::Immutable(
            "Cannot modify a cancelled session".to_string(),
        )),
        _ => Ok(()),
    }
}

/// `PUT /sessions/{id}/status`: 전이 규칙에 따라 상태를 바꿉니다.
///
/// Scheduled → In Progress는 VR 실행이 함께 일어나야 하므로
/// 여기서는 거부하고 `/start`를 쓰게 합니다. Interrupted 세션의 재개는 허용합니다.
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
    AppJson(req): AppJson<StatusUpdateRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = owned_session(&state.pool, auth.id(), &id).await?;

    if session.session_status == SessionStatus::Scheduled
        && req.status == SessionStatus::InProgress
    {
        return Err(AppError::InvalidTransition {
            from: session.session_status,
            to: req.status,
        });
    }

    let updated = lifecycle::transition(&state.pool, &session, req.status).await?;
    Ok(Json(updated.into()))
}

/// `POST /sessions/{id}/start`: VR 시나리오를 실행합니다.
///
/// 프로세스 시작만 확인하고 응답합니다. 실행 실패 시 세션은 Interrupted로 남습니다.
pub async fn start_session(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = owned_session(&state.pool, auth.id(), &id).await?;
    let handshake::Launched { snapshot, monitor } =
        handshake::launch(&state.pool, state.runner.as_ref(), &session).await?;
    // 핸들만 버립니다. 작업은 분리된 채로 프로세스 종료를 계속 지켜봅니다.
    drop(monitor);

    Ok(Json(json!({
        "message": "VR session started",
        "session": snapshot
    })))
}

/// `PUT /sessions/{id}/complete`: In Progress 세션을 수동으로 완료합니다.
pub async fn complete_session(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = owned_session(&state.pool, auth.id(), &id).await?;
    let completed = lifecycle::transition(&state.pool, &session, SessionStatus::Completed).await?;
    Ok(Json(completed.into()))
}

/// `PUT /sessions/{id}/cancel`: 본문 `{ "cancellationReason": "..." }`는 선택입니다.
///
/// 본문이 비어 있으면 사유 없이 취소합니다.
pub async fn cancel_session(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SessionResponse>, AppError> {
    let req: CancelSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CancelSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::ValidationFailed(e.to_string()))?
    };

    let session = owned_session(&state.pool, auth.id(), &id).await?;
    let cancelled = lifecycle::cancel(&state.pool, &session, req.cancellation_reason).await?;
    tracing::info!(session_id = %cancelled.id, "session cancelled");
    Ok(Json(cancelled.into()))
}

/// `GET /sessions/vr-config/{session_token}`: 토큰 소지만으로 접근합니다.
pub async fn vr_config(
    State(state): State<AppState>,
    Path(session_token): Path<String>,
) -> Result<Json<VrConfig>, AppError> {
    let config = handshake::get_config(&state.pool, &session_token).await?;
    Ok(Json(config))
}
