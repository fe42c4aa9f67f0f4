//! # VR 결과 데이터 라우트 핸들러
//!
//! - `POST /api/vr-data/submit`                  → VR 런타임의 결과 제출 (세션 토큰)
//! - `GET  /api/vr-data/analytics`               → 기간별 치료 효과 분석
//! - `GET  /api/vr-data/session/{session_id}`    → 세션의 결과 데이터
//! - `GET  /api/vr-data/patient/{patient_id}`    → 환자의 VR 이력 (최신 순)
//! - `PUT  /api/vr-data/{id}`                    → 의사의 결과 정정
//!
//! 제출 외에는 모두 의사 인증과 소유권 확인을 거칩니다.

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
    routes::{owned_patient, owned_session, AppJson, AppState},
    services::{analytics, handshake, outcome},
};

/// `POST /vr-data/submit`: 성공하면 세션이 Completed로 바뀝니다.
pub async fn submit_vr_data(
    State(state): State<AppState>,
    AppJson(req): AppJson<SubmitTelemetryRequest>,
) -> Result<(StatusCode, Json<VrSessionData>), AppError> {
    let data = handshake::submit_telemetry(&state.pool, req).await?;
    Ok((StatusCode::CREATED, Json(data)))
}

/// `GET /vr-data/analytics?timeframe=3months&patientId=...`
///
/// 매 요청마다 원본 레코드에서 다시 계산합니다.
pub async fn analytics(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Analytics>, AppError> {
    let timeframe = Timeframe::from_query(query.timeframe.as_deref());
    let since = format_timestamp(timeframe.window_start(Utc::now()));

    let records = db::list_analytics_records(
        &state.pool,
        auth.id(),
        &since,
        query.patient_id.as_deref(),
    )
    .await?;

    Ok(Json(analytics::aggregate(auth.id(), &records)))
}

pub async fn get_session_vr_data(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(session_id): Path<String>,
) -> Result<Json<VrSessionData>, AppError> {
    let session = owned_session(&state.pool, auth.id(), &session_id).await?;
    let data = db::find_vr_data_by_session(&state.pool, &session.id)
        .await?
        .ok_or_else(|| AppError::NotFound("VR session data not found".to_string()))?;
    Ok(Json(data))
}

pub async fn patient_history(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(patient_id): Path<String>,
    Query(query): Query<PatientHistoryQuery>,
) -> Result<Json<Vec<VrSessionData>>, AppError> {
    let patient = owned_patient(&state.pool, auth.id(), &patient_id).await?;
    let history =
        db::list_patient_history(&state.pool, auth.id(), &patient.id, query.phobia_type).await?;
    Ok(Json(history))
}

/// `PUT /vr-data/{id}`: 공포 점수/생체 신호를 고치면 파생 지표도 다시 계산됩니다.
pub async fn update_vr_data(
    State(state): State<AppState>,
    auth: AuthDoctor,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateVrDataRequest>,
) -> Result<Json<VrSessionData>, AppError> {
    let mut data = db::get_vr_data(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("VR session data not found".to_string()))?;
    owned_session(&state.pool, auth.id(), &data.session_id).await?;

    outcome::apply_correction(&mut data, req)?;
    db::save_vr_data(&state.pool, &data).await?;
    tracing::info!(vr_data_id = %data.id, "VR session data corrected");

    let updated = db::get_vr_data(&state.pool, &data.id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve updated VR data".to_string()))?;
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Method;
    use serde_json::json;

    use crate::{db, models::SessionStatus, services::lifecycle, test_support::*};

    /// In Progress 세션 하나와 그 세션의 의사 토큰
    async fn running_session(pool: &sqlx::SqlitePool) -> (crate::models::TherapySession, String) {
        let session = seed_scheduled_session(pool).await;
        let session = lifecycle::transition(pool, &session, SessionStatus::InProgress)
            .await
            .unwrap();
        let token = bearer(&session.doctor_id);
        (session, token)
    }

    #[tokio::test]
    async fn second_submission_is_a_conflict() {
        let pool = test_pool().await;
        let (session, _) = running_session(&pool).await;
        let app = test_app(&pool, Arc::new(StubRunner::new(StubBehavior::ExitOk)));
        let payload = json!({
            "sessionToken": session.session_token,
            "sessionStartTime": "2026-03-01T09:00:00Z",
            "sessionEndTime": "2026-03-01T09:25:00Z",
            "totalDuration": 25,
            "fearScores": { "initial": 6, "final": 2 }
        });

        let (status, _) =
            send(&app, Method::POST, "/vr-data/submit", None, Some(payload.clone())).await;
        assert_eq!(status, 201);

        let (status, body) =
            send(&app, Method::POST, "/vr-data/submit", None, Some(payload)).await;
        assert_eq!(status, 409);
        assert_eq!(body["error"]["code"], "already_submitted");
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let pool = test_pool().await;
        let app = test_app(&pool, Arc::new(StubRunner::new(StubBehavior::ExitOk)));

        let (status, body) = send(
            &app,
            Method::POST,
            "/vr-data/submit",
            None,
            Some(json!({
                "sessionToken": "VR0NOPE",
                "sessionStartTime": "2026-03-01T09:00:00Z",
                "sessionEndTime": "2026-03-01T09:25:00Z",
                "totalDuration": 25,
                "fearScores": { "initial": 6, "final": 2 }
            })),
        )
        .await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn correction_recomputes_scores() {
        let pool = test_pool().await;
        let (session, token) = running_session(&pool).await;
        let data = crate::services::handshake::submit_telemetry(
            &pool,
            telemetry_request(&session.session_token, 8.0, 4.0),
        )
        .await
        .unwrap();
        let app = test_app(&pool, Arc::new(StubRunner::new(StubBehavior::ExitOk)));

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/vr-data/{}", data.id),
            Some(&token),
            Some(json!({
                "fearScores": { "initial": 8, "final": 2 },
                "biometricData": {},
                "sessionNotes": { "therapist": "steady progress" }
            })),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["improvementPercentage"], 75.0);
        assert_eq!(body["effectivenessScore"], 75.0);
        assert_eq!(body["sessionNotes"]["therapist"], "steady progress");
    }

    #[tokio::test]
    async fn correction_from_a_stale_read_is_a_conflict() {
        let pool = test_pool().await;
        let (session, _) = running_session(&pool).await;
        let data = crate::services::handshake::submit_telemetry(
            &pool,
            telemetry_request(&session.session_token, 8.0, 4.0),
        )
        .await
        .unwrap();
        assert_eq!(data.revision, 0);

        // 두 의사가 같은 레코드를 읽고 각자 정정
        let mut first = data.clone();
        first.session_notes = json!({ "therapist": "notes fix" });
        let mut second = data;
        second.fear_scores.final_score = 2.0;

        db::save_vr_data(&pool, &first).await.unwrap();
        let err = db::save_vr_data(&pool, &second).await.unwrap_err();
        assert!(matches!(err, crate::error::AppError::Conflict(_)));

        let stored = db::get_vr_data(&pool, &first.id).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.session_notes["therapist"], "notes fix");
        assert_eq!(stored.fear_scores.final_score, 4.0);
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_owning_doctor() {
        let pool = test_pool().await;
        let (session, token) = running_session(&pool).await;
        crate::services::handshake::submit_telemetry(
            &pool,
            telemetry_request(&session.session_token, 8.0, 4.0),
        )
        .await
        .unwrap();
        let stranger = seed_doctor(&pool, "stranger@clinic.test").await;
        let app = test_app(&pool, Arc::new(StubRunner::new(StubBehavior::ExitOk)));
        let uri = format!("/vr-data/patient/{}", session.patient_id);

        let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, 200);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("{uri}?phobiaType=Aerophobia"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, 200);
        assert!(body.as_array().unwrap().is_empty());

        let stranger_token = bearer(&stranger.id);
        let (status, _) = send(&app, Method::GET, &uri, Some(&stranger_token), None).await;
        assert_eq!(status, 403);

        let stored = db::find_vr_data_by_session(&pool, &session.id).await.unwrap();
        assert!(stored.is_some());
    }
}
