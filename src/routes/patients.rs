//! # 환자 라우트 핸들러
//!
//! - `GET  /api/patients`      → 내 활성 환자 목록 (최근 등록 순, `search`/`phobiaType` 필터, 세션 집계 포함)
//! - `POST /api/patients`      → 환자 등록 (환자 코드 자동 발급)
//! - `GET  /api/patients/{id}` → 환자 상세: 세션 집계, 최근 세션 5개, 진행 추이 (다른 의사의 환자면 403)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    db,
    error::AppError,
    middleware::auth::AuthDoctor,
    models::*,
    routes::{owned_patient, AppJson, AppState},
};

const RECENT_SESSIONS: i64 = 5;

pub async fn list_patients(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Query(filter): Query<PatientListQuery>,
) -> Result<Json<Vec<PatientListItem>>, AppError> {
    let patients = db::list_patients(&state.pool, auth.id(), &filter).await?;
    let mut stats = db::patient_session_stats(&state.pool, auth.id()).await?;

    let items = patients
        .into_iter()
        .map(|patient| PatientListItem {
            stats: stats.remove(&patient.id).unwrap_or_default(),
            patient,
        })
        .collect();
    Ok(Json(items))
}

pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthDoctor,
    AppJson(req): AppJson<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    req.validate()?;
    let patient = db::create_patient(&state.pool, auth.id(), &req).await?;
    tracing::info!(patient_id = %patient.id, doctor_id = %auth.id(), "patient registered");
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
) -> Result<Json<PatientDetail>, AppError> {
    let patient = owned_patient(&state.pool, auth.id(), &id).await?;
    let now = format_timestamp(Utc::now());

    let stats = db::patient_detail_stats(&state.pool, &patient.id, &now).await?;
    let recent_sessions =
        db::list_recent_patient_sessions(&state.pool, &patient.id, RECENT_SESSIONS)
            .await?
            .into_iter()
            .map(SessionResponse::from)
            .collect();
    let progress_data = db::list_patient_progress(&state.pool, &patient.id).await?;

    Ok(Json(PatientDetail {
        patient,
        stats,
        recent_sessions,
        progress_data,
    }))
}
