//! # VR 핸드셰이크
//!
//! 클리닉 서버와 외부 VR 런타임 사이의 약속입니다. VR 런타임은 의사 인증 정보가
//! 없고, 세션 토큰 하나만 가지고 있습니다.
//!
//! ```text
//! 의사: launch ──▶ Scheduled → In Progress ──▶ runner.start(token, scenario, patient code)
//!                                         │
//! VR:   get_config(token) ◀───────────────┘
//! VR:   submit_telemetry(token, payload) ──▶ 결과 저장 + In Progress → Completed
//! ```
//!
//! - 실행 실패(즉시 또는 나중에 프로세스 종료 코드로)는 세션을 Interrupted로 돌립니다.
//! - 제출은 세션당 한 번만 성공합니다. 결과 삽입과 완료 전이는 같은 트랜잭션입니다.

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::db;
use crate::error::AppError;
use crate::models::*;
use crate::services::lifecycle;
use crate::services::outcome;
use crate::services::runner::ScenarioRunner;

/// 세션에 연결된 환자: VR 쪽에 넘길 스냅샷의 재료
async fn session_patient(pool: &SqlitePool, session: &TherapySession) -> Result<Patient, AppError> {
    db::get_patient(pool, &session.patient_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Patient not found".to_string()))
}

fn patient_snapshot(patient: Patient) -> PatientSnapshot {
    PatientSnapshot {
        name: patient.name,
        patient_code: patient.patient_code,
        phobias: patient.phobias.0,
    }
}

/// VR 런타임이 토큰으로 세션 설정을 가져갑니다.
pub async fn get_config(pool: &SqlitePool, session_token: &str) -> Result<VrConfig, AppError> {
    let session = db::find_session_by_token(pool, session_token)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session token".to_string()))?;

    if session.session_status.is_terminal() {
        return Err(AppError::SessionInactive);
    }

    let patient = session_patient(pool, &session).await?;
    let doctor = db::doctors::find_by_id(pool, &session.doctor_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))?;

    Ok(VrConfig {
        session_id: session.id,
        patient: patient_snapshot(patient),
        doctor: DoctorSnapshot {
            name: doctor.name,
            specialization: doctor.specialization,
        },
        session_type: session.session_type,
        phobia_type: session.phobia_type,
        vr_scenario: session.vr_scenario,
        session_config: session.session_config,
        pre_session_data: session.pre_session_data,
    })
}

/// 실행 결과: `monitor`는 VR 프로세스 종료를 지켜보는 백그라운드 작업입니다.
pub struct Launched {
    pub snapshot: LaunchSnapshot,
    pub monitor: JoinHandle<()>,
}

/// Scheduled 세션을 In Progress로 전이한 뒤 VR 런타임을 시작합니다.
///
/// 시작에 실패하면 세션을 Interrupted로 돌리고 `LaunchFailed`를 반환합니다.
/// 프로세스 시작만 확인하고 돌아오며, 시나리오가 끝날 때까지 기다리지 않습니다.
pub async fn launch(
    pool: &SqlitePool,
    runner: &dyn ScenarioRunner,
    session: &TherapySession,
) -> Result<Launched, AppError> {
    if session.session_status != SessionStatus::Scheduled {
        return Err(AppError::InvalidTransition {
            from: session.session_status,
            to: SessionStatus::InProgress,
        });
    }

    let patient = session_patient(pool, session).await?;
    let started = lifecycle::transition(pool, session, SessionStatus::InProgress).await?;

    let handle = match runner.start(
        &started.session_token,
        &started.vr_scenario.name,
        &patient.patient_code,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(session_id = %started.id, error = %e, "VR launch failed");
            if let Err(mark_err) = interrupt_if_running(pool, &started.id).await {
                tracing::error!(session_id = %started.id, error = %mark_err, "could not mark session Interrupted");
            }
            return Err(AppError::LaunchFailed(e.to_string()));
        }
    };
    tracing::info!(session_id = %started.id, pid = ?handle.pid, "VR session launched");

    let monitor = {
        let pool = pool.clone();
        let session_id = started.id.clone();
        let exit = handle.exit;
        tokio::spawn(async move {
            match exit.await {
                Ok(Ok(())) => tracing::info!(session_id = %session_id, "VR process exited"),
                Ok(Err(e)) => {
                    tracing::warn!(session_id = %session_id, error = %e, "VR process reported failure");
                    if let Err(mark_err) = interrupt_if_running(&pool, &session_id).await {
                        tracing::error!(session_id = %session_id, error = %mark_err, "could not mark session Interrupted");
                    }
                }
                Err(_) => tracing::debug!(session_id = %session_id, "runner dropped exit channel"),
            }
        })
    };

    let snapshot = LaunchSnapshot {
        id: started.id,
        session_token: started.session_token,
        status: started.session_status,
        start_time: started.actual_start_time,
        patient: patient_snapshot(patient),
        vr_scenario: started.vr_scenario,
        session_config: started.session_config,
        pre_session_data: started.pre_session_data,
    };

    Ok(Launched { snapshot, monitor })
}

/// 세션이 아직 In Progress면 Interrupted로 바꿉니다.
///
/// 그 사이에 텔레메트리가 먼저 도착해 Completed가 됐다면 아무것도 하지 않습니다.
async fn interrupt_if_running(pool: &SqlitePool, session_id: &str) -> Result<(), AppError> {
    let Some(current) = db::get_session(pool, session_id).await? else {
        return Ok(());
    };
    if current.session_status != SessionStatus::InProgress {
        return Ok(());
    }
    match lifecycle::transition(pool, &current, SessionStatus::Interrupted).await {
        Ok(_) | Err(AppError::InvalidTransition { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// VR 런타임이 시나리오 결과를 제출합니다. 세션당 한 번만 성공합니다.
///
/// 검증 순서: 토큰 → 세션 존재 → 페이로드 → 중복 제출 → 세션 상태.
/// 검증에 실패하면 아무것도 쓰지 않습니다.
pub async fn submit_telemetry(
    pool: &SqlitePool,
    mut req: SubmitTelemetryRequest,
) -> Result<VrSessionData, AppError> {
    let token = req
        .session_token
        .take()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AppError::ValidationFailed("sessionToken is required".to_string()))?;

    let session = db::find_session_by_token(pool, &token)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session token".to_string()))?;

    let telemetry = req.into_telemetry()?;

    if db::find_vr_data_by_session(pool, &session.id).await?.is_some() {
        return Err(AppError::AlreadySubmitted);
    }

    match session.session_status {
        SessionStatus::InProgress => {}
        SessionStatus::Completed | SessionStatus::Cancelled => {
            return Err(AppError::SessionInactive)
        }
        SessionStatus::Scheduled | SessionStatus::Interrupted => {
            return Err(AppError::InvalidTransition {
                from: session.session_status,
                to: SessionStatus::Completed,
            })
        }
    }

    let outcome = outcome::compute(&telemetry.fear_scores, &telemetry.biometric_data);
    let change = lifecycle::plan(&session, SessionStatus::Completed, Utc::now())?;
    let id = uuid::Uuid::now_v7().to_string();

    // 결과 삽입과 완료 전이는 함께 성공하거나 함께 취소됩니다
    let mut tx = pool.begin().await?;
    db::insert_vr_data(&mut *tx, &id, &session, &telemetry, &outcome).await?;
    if !db::apply_status_change(&mut *tx, &session.id, &change).await? {
        tx.rollback().await?;
        return Err(lifecycle::lost_race(pool, &session.id, SessionStatus::Completed).await);
    }
    tx.commit().await?;

    tracing::info!(
        session_id = %session.id,
        improvement = outcome.improvement_percentage,
        effectiveness = outcome.effectiveness_score,
        "telemetry recorded, session completed"
    );

    db::get_vr_data(pool, &id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve VR session data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn config_snapshot_hides_token_and_uses_patient_code() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;

        let config = get_config(&pool, &session.session_token).await.unwrap();
        assert_eq!(config.session_id, session.id);
        assert!(config.patient.patient_code.starts_with("PT"));
        assert_eq!(config.doctor.name, "Dr. Test");

        let body = serde_json::to_value(&config).unwrap();
        assert!(body.get("sessionToken").is_none());
        assert!(!body.to_string().contains(&session.session_token));
    }

    #[tokio::test]
    async fn config_for_unknown_or_cancelled_session_fails() {
        let pool = test_pool().await;
        let err = get_config(&pool, "VR0NOPE").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let session = seed_scheduled_session(&pool).await;
        lifecycle::transition(&pool, &session, SessionStatus::Cancelled)
            .await
            .unwrap();
        let err = get_config(&pool, &session.session_token).await.unwrap_err();
        assert!(matches!(err, AppError::SessionInactive));
    }

    #[tokio::test]
    async fn launch_starts_runner_with_token_scenario_and_patient_code() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let patient = db::get_patient(&pool, &session.patient_id).await.unwrap().unwrap();
        let runner = StubRunner::new(StubBehavior::ExitOk);

        let launched = launch(&pool, &runner, &session).await.unwrap();
        launched.monitor.await.unwrap();

        assert_eq!(launched.snapshot.status, SessionStatus::InProgress);
        assert!(launched.snapshot.start_time.is_some());
        assert_eq!(
            runner.calls(),
            vec![LaunchCall {
                token: session.session_token.clone(),
                scenario_name: "Spider Room".to_string(),
                patient_identifier: patient.patient_code,
            }]
        );

        let stored = db::get_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn launch_failure_interrupts_session() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let runner = StubRunner::new(StubBehavior::RefuseToStart);

        let err = launch(&pool, &runner, &session).await.err().unwrap();
        assert!(matches!(err, AppError::LaunchFailed(_)));

        let stored = db::get_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status, SessionStatus::Interrupted);
        assert!(stored.actual_end_time.is_some());
    }

    #[tokio::test]
    async fn asynchronous_exit_failure_interrupts_session() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let runner = StubRunner::new(StubBehavior::ExitWithError);

        let launched = launch(&pool, &runner, &session).await.unwrap();
        launched.monitor.await.unwrap();

        let stored = db::get_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status, SessionStatus::Interrupted);
    }

    #[tokio::test]
    async fn launch_requires_scheduled_session() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let runner = StubRunner::new(StubBehavior::ExitOk);
        let started = lifecycle::transition(&pool, &session, SessionStatus::InProgress)
            .await
            .unwrap();

        let err = launch(&pool, &runner, &started).await.err().unwrap();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn launch_then_submit_completes_session() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let runner = StubRunner::new(StubBehavior::ExitOk);
        launch(&pool, &runner, &session).await.unwrap().monitor.await.unwrap();

        let data = submit_telemetry(&pool, telemetry_request(&session.session_token, 8.0, 3.0))
            .await
            .unwrap();
        assert_eq!(data.improvement_percentage, 62.5);
        assert_eq!(data.session_id, session.id);
        assert_eq!(data.vr_interaction_data.interactions.len(), 1);

        let stored = db::get_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status, SessionStatus::Completed);
        assert!(stored.actual_duration().is_some());
    }

    #[tokio::test]
    async fn second_submission_is_rejected() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        lifecycle::transition(&pool, &session, SessionStatus::InProgress)
            .await
            .unwrap();

        submit_telemetry(&pool, telemetry_request(&session.session_token, 8.0, 3.0))
            .await
            .unwrap();
        let err = submit_telemetry(&pool, telemetry_request(&session.session_token, 8.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadySubmitted));

        let stored = db::find_vr_data_by_session(&pool, &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fear_scores.final_score, 3.0);
    }

    #[tokio::test]
    async fn concurrent_submissions_have_exactly_one_winner() {
        let (pool, path) = file_pool(4).await;
        let session = seed_scheduled_session(&pool).await;
        lifecycle::transition(&pool, &session, SessionStatus::InProgress)
            .await
            .unwrap();

        // 서로 다른 연결에서 두 제출이 동시에 진행됨
        let first = tokio::spawn({
            let pool = pool.clone();
            let request = telemetry_request(&session.session_token, 8.0, 3.0);
            async move { submit_telemetry(&pool, request).await }
        });
        let second = tokio::spawn({
            let pool = pool.clone();
            let request = telemetry_request(&session.session_token, 8.0, 4.0);
            async move { submit_telemetry(&pool, request).await }
        });
        let (first, second) = (first.await.unwrap(), second.await.unwrap());
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::AlreadySubmitted))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vr_session_data WHERE session_id = ?")
            .bind(&session.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let stored = db::get_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status, SessionStatus::Completed);
        remove_file_pool(pool, path).await;
    }

    #[tokio::test]
    async fn submission_requires_running_session() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;

        let err = submit_telemetry(&pool, telemetry_request(&session.session_token, 8.0, 3.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: SessionStatus::Scheduled,
                ..
            }
        ));

        let cancelled = lifecycle::transition(&pool, &session, SessionStatus::Cancelled)
            .await
            .unwrap();
        let err = submit_telemetry(&pool, telemetry_request(&cancelled.session_token, 8.0, 3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionInactive));
    }

    #[tokio::test]
    async fn invalid_payload_writes_nothing() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        lifecycle::transition(&pool, &session, SessionStatus::InProgress)
            .await
            .unwrap();

        let mut req = telemetry_request(&session.session_token, 8.0, 3.0);
        req.fear_scores = None;
        let err = submit_telemetry(&pool, req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        assert!(db::find_vr_data_by_session(&pool, &session.id)
            .await
            .unwrap()
            .is_none());
        let stored = db::get_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn unknown_or_missing_token_is_rejected() {
        let pool = test_pool().await;
        let err = submit_telemetry(&pool, telemetry_request("VR0NOPE", 8.0, 3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let mut req = telemetry_request("VR0NOPE", 8.0, 3.0);
        req.session_token = None;
        let err = submit_telemetry(&pool, req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }
}
