//! # 치료 세션 데이터베이스 쿼리 모듈
//!
//! `therapy_sessions` 테이블에 대한 쿼리 함수들입니다.
//!
//! ## 상태 변경은 조건부 UPDATE로만
//! `session_status` 컬럼을 바꾸는 SQL은 `apply_status_change` 하나뿐이며,
//! 항상 `WHERE id = ? AND session_status = ?` 조건을 겁니다.
//! 두 요청이 같은 상태에서 동시에 전이를 시도하면 먼저 쓴 쪽만 1행을 바꾸고,
//! 나머지는 0행 결과를 받아 실패로 처리됩니다 (compare-and-swap).

use crate::error::AppError;
use crate::models::*;
use crate::services::token;
use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

/// 모든 세션 조회에서 공유하는 SELECT 절
const SELECT_SESSION: &str = r#"
    SELECT id, session_token, patient_id, doctor_id, session_type, phobia_type,
           scenario_name, scenario_description, scenario_difficulty, scenario_environment,
           config_duration, config_exposure_level, config_biofeedback, config_voice_guidance,
           pre_fear_score, pre_anxiety_level, pre_notes,
           session_status, scheduled_date_time, actual_start_time, actual_end_time,
           notes, created_at, updated_at
    FROM therapy_sessions
"#;

/// 세션 토큰이 우연히 겹칠 때 다시 시도하는 횟수
const TOKEN_ATTEMPTS: usize = 3;

/// 새 치료 세션을 Scheduled 상태로 생성합니다.
///
/// 세션 토큰은 여기서 발급합니다. `session_token` UNIQUE 제약에 걸리면
/// 새 토큰으로 다시 시도하며, 기존 세션의 토큰을 덮어쓰는 일은 없습니다.
pub async fn create_session(
    pool: &SqlitePool,
    doctor_id: &str,
    req: &CreateSessionRequest,
) -> Result<TherapySession, AppError> {
    let id = uuid::Uuid::now_v7().to_string();
    let scheduled = format_timestamp(req.scheduled_date_time);

    for attempt in 1..=TOKEN_ATTEMPTS {
        let session_token = token::issue_token();
        let result = sqlx::query(
            r#"
            INSERT INTO therapy_sessions (
                id, session_token, patient_id, doctor_id, session_type, phobia_type,
                scenario_name, scenario_description, scenario_difficulty, scenario_environment,
                config_duration, config_exposure_level, config_biofeedback, config_voice_guidance,
                pre_fear_score, pre_anxiety_level, pre_notes,
                session_status, scheduled_date_time, notes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&session_token)
        .bind(&req.patient_id)
        .bind(doctor_id)
        .bind(req.session_type)
        .bind(req.phobia_type)
        .bind(req.vr_scenario.name.trim())
        .bind(req.vr_scenario.description.as_deref())
        .bind(req.vr_scenario.difficulty)
        .bind(req.vr_scenario.environment)
        .bind(req.session_config.duration)
        .bind(req.session_config.exposure_level)
        .bind(req.session_config.biofeedback_enabled)
        .bind(req.session_config.voice_guidance_enabled)
        .bind(req.pre_session_data.fear_score)
        .bind(req.pre_session_data.anxiety_level)
        .bind(req.pre_session_data.notes.as_deref())
        .bind(SessionStatus::Scheduled)
        .bind(&scheduled)
        .bind(req.notes.as_deref())
        .execute(pool)
        .await;

        match result {
            Ok(_) => {
                return get_session(pool, &id)
                    .await?
                    .ok_or(AppError::Internal("Failed to retrieve created session".to_string()));
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::warn!(attempt, "session token collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(
        "Could not allocate a unique session token".to_string(),
    ))
}

pub async fn get_session(pool: &SqlitePool, id: &str) -> Result<Option<TherapySession>, AppError> {
    let session = sqlx::query_as::<_, TherapySession>(&format!("{SELECT_SESSION} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(session)
}

/// VR 런타임이 가진 유일한 식별자인 토큰으로 세션을 찾습니다.
pub async fn find_session_by_token(
    pool: &SqlitePool,
    session_token: &str,
) -> Result<Option<TherapySession>, AppError> {
    let session = sqlx::query_as::<_, TherapySession>(&format!(
        "{SELECT_SESSION} WHERE session_token = ?"
    ))
    .bind(session_token)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// 의사의 세션 목록: 필터가 주어진 항목만 WHERE 절에 추가합니다.
pub async fn list_sessions(
    pool: &SqlitePool,
    doctor_id: &str,
    filter: &SessionListQuery,
) -> Result<Vec<TherapySession>, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(SELECT_SESSION);
    query.push(" WHERE doctor_id = ").push_bind(doctor_id);

    if let Some(status) = filter.status {
        query.push(" AND session_status = ").push_bind(status);
    }
    if let Some(patient_id) = &filter.patient_id {
        query.push(" AND patient_id = ").push_bind(patient_id);
    }
    if let Some(phobia_type) = filter.phobia_type {
        query.push(" AND phobia_type = ").push_bind(phobia_type);
    }
    query.push(" ORDER BY scheduled_date_time ASC");

    let sessions = query
        .build_query_as::<TherapySession>()
        .fetch_all(pool)
        .await?;

    Ok(sessions)
}

/// 앞으로 예정된 Scheduled 세션 (가까운 순)
pub async fn list_upcoming_sessions(
    pool: &SqlitePool,
    doctor_id: &str,
    now: &str,
    limit: i64,
) -> Result<Vec<TherapySession>, AppError> {
    let sessions = sqlx::query_as::<_, TherapySession>(&format!(
        r#"{SELECT_SESSION}
        WHERE doctor_id = ? AND session_status = ? AND scheduled_date_time >= ?
        ORDER BY scheduled_date_time ASC
        LIMIT ?"#
    ))
    .bind(doctor_id)
    .bind(SessionStatus::Scheduled)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

/// 상태 전이를 compare-and-swap으로 적용합니다.
///
/// 현재 상태가 `change.from`일 때만 쓰고, 실제로 바뀌었으면 `true`를 반환합니다.
/// `change`에서 `Some`인 컬럼만 SET에 들어갑니다.
/// 트랜잭션 안에서도 쓸 수 있도록 연결(`&mut *tx`)을 직접 받습니다.
pub async fn apply_status_change(
    conn: &mut SqliteConnection,
    id: &str,
    change: &StatusChange,
) -> Result<bool, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new("UPDATE therapy_sessions SET session_status = ");
    query
        .push_bind(change.to)
        .push(", updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')");

    if let Some(start) = &change.actual_start_time {
        query
            .push(", actual_start_time = ")
            .push_bind(start.clone())
            .push(", actual_end_time = NULL");
    }
    if let Some(end) = &change.actual_end_time {
        query.push(", actual_end_time = ").push_bind(end.clone());
    }
    if let Some(notes) = &change.notes {
        query.push(", notes = ").push_bind(notes.clone());
    }

    query
        .push(" WHERE id = ")
        .push_bind(id)
        .push(" AND session_status = ")
        .push_bind(change.from);

    let result = query.build().execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

/// 편집 가능한 필드를 부분 수정합니다. 상태는 건드리지 않습니다.
///
/// 종료 상태(Completed/Cancelled)인 세션에는 쓰지 않고 `false`를 반환합니다.
/// 조회와 수정 사이에 세션이 종료되어도 이 조건이 막아줍니다.
pub async fn update_session(
    pool: &SqlitePool,
    id: &str,
    req: &UpdateSessionRequest,
) -> Result<bool, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "UPDATE therapy_sessions SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
    );

    if let Some(session_type) = req.session_type {
        query.push(", session_type = ").push_bind(session_type);
    }
    if let Some(phobia_type) = req.phobia_type {
        query.push(", phobia_type = ").push_bind(phobia_type);
    }
    if let Some(scenario) = &req.vr_scenario {
        query
            .push(", scenario_name = ")
            .push_bind(scenario.name.trim().to_string())
            .push(", scenario_description = ")
            .push_bind(scenario.description.clone())
            .push(", scenario_difficulty = ")
            .push_bind(scenario.difficulty)
            .push(", scenario_environment = ")
            .push_bind(scenario.environment);
    }
    if let Some(config) = &req.session_config {
        query
            .push(", config_duration = ")
            .push_bind(config.duration)
            .push(", config_exposure_level = ")
            .push_bind(config.exposure_level)
            .push(", config_biofeedback = ")
            .push_bind(config.biofeedback_enabled)
            .push(", config_voice_guidance = ")
            .push_bind(config.voice_guidance_enabled);
    }
    if let Some(pre) = &req.pre_session_data {
        query
            .push(", pre_fear_score = ")
            .push_bind(pre.fear_score)
            .push(", pre_anxiety_level = ")
            .push_bind(pre.anxiety_level)
            .push(", pre_notes = ")
            .push_bind(pre.notes.clone());
    }
    if let Some(scheduled) = req.scheduled_date_time {
        query
            .push(", scheduled_date_time = ")
            .push_bind(format_timestamp(scheduled));
    }
    if let Some(notes) = &req.notes {
        query.push(", notes = ").push_bind(notes.clone());
    }

    query
        .push(" WHERE id = ")
        .push_bind(id)
        .push(" AND session_status NOT IN (")
        .push_bind(SessionStatus::Completed)
        .push(", ")
        .push_bind(SessionStatus::Cancelled)
        .push(")");

    let result = query.build().execute(pool).await?;
    Ok(result.rows_affected() == 1)
}

/// `started_before`보다 먼저 시작되어 아직 "In Progress"인 세션들
pub async fn list_stale_in_progress(
    pool: &SqlitePool,
    started_before: &str,
) -> Result<Vec<TherapySession>, AppError> {
    let sessions = sqlx::query_as::<_, TherapySession>(&format!(
        r#"{SELECT_SESSION}
        WHERE session_status = ? AND actual_start_time IS NOT NULL AND actual_start_time < ?
        ORDER BY actual_start_time ASC"#
    ))
    .bind(SessionStatus::InProgress)
    .bind(started_before)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

/// 의사의 세션 수: `since`가 있으면 그 이후 생성된 세션만 셉니다.
pub async fn count_sessions(
    pool: &SqlitePool,
    doctor_id: &str,
    since: Option<&str>,
) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM therapy_sessions
        WHERE doctor_id = ? AND (? IS NULL OR created_at >= ?)
        "#,
    )
    .bind(doctor_id)
    .bind(since)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// 의사의 환자별 세션 집계: 세션이 없는 환자는 결과에 없습니다.
pub async fn patient_session_stats(
    pool: &SqlitePool,
    doctor_id: &str,
) -> Result<HashMap<String, PatientSessionStats>, AppError> {
    let rows = sqlx::query_as::<_, PatientSessionStats>(
        r#"
        SELECT patient_id,
               COUNT(*) AS total_sessions,
               COALESCE(SUM(session_status = ?), 0) AS completed_sessions,
               MAX(created_at) AS last_session_date
        FROM therapy_sessions
        WHERE doctor_id = ?
        GROUP BY patient_id
        "#,
    )
    .bind(SessionStatus::Completed)
    .bind(doctor_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|stats| (stats.patient_id.clone(), stats))
        .collect())
}

/// 환자 상세 화면의 세션 수: 전체, 완료, `now` 이후 예정
pub async fn patient_detail_stats(
    pool: &SqlitePool,
    patient_id: &str,
    now: &str,
) -> Result<PatientDetailStats, AppError> {
    let stats = sqlx::query_as::<_, PatientDetailStats>(
        r#"
        SELECT COUNT(*) AS total_sessions,
               COALESCE(SUM(session_status = ?), 0) AS completed_sessions,
               COALESCE(SUM(session_status = ? AND scheduled_date_time >= ?), 0) AS upcoming_sessions
        FROM therapy_sessions
        WHERE patient_id = ?
        "#,
    )
    .bind(SessionStatus::Completed)
    .bind(SessionStatus::Scheduled)
    .bind(now)
    .bind(patient_id)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}

/// 환자의 최근 생성 세션 (최신 순)
pub async fn list_recent_patient_sessions(
    pool: &SqlitePool,
    patient_id: &str,
    limit: i64,
) -> Result<Vec<TherapySession>, AppError> {
    let sessions = sqlx::query_as::<_, TherapySession>(&format!(
        r#"{SELECT_SESSION}
        WHERE patient_id = ?
        ORDER BY created_at DESC
        LIMIT ?"#
    ))
    .bind(patient_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}
