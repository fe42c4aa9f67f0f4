//! # VR 결과 데이터 데이터베이스 쿼리 모듈
//!
//! `vr_session_data`는 세션당 최대 한 행입니다 (`session_id` UNIQUE).
//! 생체 신호 쌍은 `*_initial`/`*_final` 컬럼으로, 상호작용 목록과
//! 자유 형식 섹션(노출 지표, 메모, 평가)은 JSON 텍스트로 저장합니다.
//!
//! 의사 범위가 필요한 조회는 모두 `therapy_sessions`와 JOIN하여
//! 세션의 `doctor_id`로 거릅니다.

use crate::error::AppError;
use crate::models::*;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

const VR_DATA_COLUMNS: &str = r#"
    v.id, v.session_id, v.patient_id, v.session_start_time, v.session_end_time,
    v.total_duration, v.fear_initial, v.fear_final,
    v.heart_rate_initial, v.heart_rate_final,
    v.skin_conductance_initial, v.skin_conductance_final,
    v.interactions, v.exposure_metrics, v.session_notes, v.session_rating,
    v.data_completeness, v.data_accuracy,
    v.improvement_percentage, v.effectiveness_score, v.revision, v.created_at, v.updated_at
"#;

/// DB 한 행 그대로의 모양: API 응답용 `VrSessionData`로 변환해서 내보냅니다.
#[derive(Debug, sqlx::FromRow)]
struct VrDataRow {
    id: String,
    session_id: String,
    patient_id: String,
    session_start_time: String,
    session_end_time: String,
    total_duration: f64,
    fear_initial: f64,
    fear_final: f64,
    heart_rate_initial: Option<f64>,
    heart_rate_final: Option<f64>,
    skin_conductance_initial: Option<f64>,
    skin_conductance_final: Option<f64>,
    interactions: Json<Vec<Interaction>>,
    exposure_metrics: Json<Value>,
    session_notes: Json<Value>,
    session_rating: Json<Value>,
    data_completeness: f64,
    data_accuracy: f64,
    improvement_percentage: f64,
    effectiveness_score: f64,
    revision: i64,
    created_at: String,
    updated_at: String,
}

fn pair(initial: Option<f64>, final_value: Option<f64>) -> Option<BiometricPair> {
    Some(BiometricPair {
        initial: initial?,
        final_value: final_value?,
    })
}

impl From<VrDataRow> for VrSessionData {
    fn from(row: VrDataRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            patient_id: row.patient_id,
            session_start_time: row.session_start_time,
            session_end_time: row.session_end_time,
            total_duration: row.total_duration,
            fear_scores: FearScores {
                initial: row.fear_initial,
                final_score: row.fear_final,
            },
            biometric_data: BiometricData {
                heart_rate: pair(row.heart_rate_initial, row.heart_rate_final),
                skin_conductance: pair(row.skin_conductance_initial, row.skin_conductance_final),
            },
            vr_interaction_data: VrInteractionData {
                interactions: row.interactions.0,
            },
            exposure_metrics: row.exposure_metrics.0,
            session_notes: row.session_notes.0,
            session_rating: row.session_rating.0,
            data_quality: DataQuality {
                completeness: row.data_completeness,
                accuracy: row.data_accuracy,
            },
            improvement_percentage: row.improvement_percentage,
            effectiveness_score: row.effectiveness_score,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 분석용 행: 결과 데이터 + 연결된 세션의 분류 정보
#[derive(Debug, sqlx::FromRow)]
struct AnalyticsRow {
    #[sqlx(flatten)]
    data: VrDataRow,
    doctor_id: String,
    phobia_type: PhobiaType,
    session_type: SessionType,
}

/// 텔레메트리 레코드를 삽입합니다.
///
/// 같은 세션에 이미 레코드가 있으면 UNIQUE 제약 위반이 `AlreadySubmitted`가 됩니다.
/// 세션 완료 전이와 같은 트랜잭션에서 호출되도록 연결을 직접 받습니다.
pub async fn insert_vr_data(
    conn: &mut SqliteConnection,
    id: &str,
    session: &TherapySession,
    telemetry: &Telemetry,
    outcome: &Outcome,
) -> Result<(), AppError> {
    let heart_rate = telemetry.biometric_data.heart_rate;
    let skin_conductance = telemetry.biometric_data.skin_conductance;

    let result = sqlx::query(
        r#"
        INSERT INTO vr_session_data (
            id, session_id, patient_id, session_start_time, session_end_time, total_duration,
            fear_initial, fear_final,
            heart_rate_initial, heart_rate_final, skin_conductance_initial, skin_conductance_final,
            interactions, exposure_metrics, session_notes, session_rating,
            data_completeness, data_accuracy, improvement_percentage, effectiveness_score
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&session.id)
    .bind(&session.patient_id)
    .bind(format_timestamp(telemetry.session_start_time))
    .bind(format_timestamp(telemetry.session_end_time))
    .bind(telemetry.total_duration)
    .bind(telemetry.fear_scores.initial)
    .bind(telemetry.fear_scores.final_score)
    .bind(heart_rate.map(|p| p.initial))
    .bind(heart_rate.map(|p| p.final_value))
    .bind(skin_conductance.map(|p| p.initial))
    .bind(skin_conductance.map(|p| p.final_value))
    .bind(Json(&telemetry.vr_interaction_data.interactions))
    .bind(Json(&telemetry.exposure_metrics))
    .bind(Json(&telemetry.session_notes))
    .bind(Json(&telemetry.session_rating))
    .bind(telemetry.data_quality.completeness)
    .bind(telemetry.data_quality.accuracy)
    .bind(outcome.improvement_percentage)
    .bind(outcome.effectiveness_score)
    .execute(conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::AlreadySubmitted),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_vr_data(pool: &SqlitePool, id: &str) -> Result<Option<VrSessionData>, AppError> {
    let row = sqlx::query_as::<_, VrDataRow>(&format!(
        "SELECT {VR_DATA_COLUMNS} FROM vr_session_data v WHERE v.id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

pub async fn find_vr_data_by_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Option<VrSessionData>, AppError> {
    let row = sqlx::query_as::<_, VrDataRow>(&format!(
        "SELECT {VR_DATA_COLUMNS} FROM vr_session_data v WHERE v.session_id = ?"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// 정정된 레코드 전체를 다시 씁니다 (파생 지표 포함).
///
/// `data.revision`이 저장된 값과 같을 때만 쓰고 revision을 1 올립니다.
/// 그 사이에 다른 정정이 저장됐다면 `Conflict`입니다.
pub async fn save_vr_data(pool: &SqlitePool, data: &VrSessionData) -> Result<(), AppError> {
    let heart_rate = data.biometric_data.heart_rate;
    let skin_conductance = data.biometric_data.skin_conductance;

    let result = sqlx::query(
        r#"
        UPDATE vr_session_data
        SET fear_initial = ?, fear_final = ?,
            heart_rate_initial = ?, heart_rate_final = ?,
            skin_conductance_initial = ?, skin_conductance_final = ?,
            exposure_metrics = ?, session_notes = ?, session_rating = ?,
            data_completeness = ?, data_accuracy = ?,
            improvement_percentage = ?, effectiveness_score = ?,
            revision = revision + 1,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND revision = ?
        "#,
    )
    .bind(data.fear_scores.initial)
    .bind(data.fear_scores.final_score)
    .bind(heart_rate.map(|p| p.initial))
    .bind(heart_rate.map(|p| p.final_value))
    .bind(skin_conductance.map(|p| p.initial))
    .bind(skin_conductance.map(|p| p.final_value))
    .bind(Json(&data.exposure_metrics))
    .bind(Json(&data.session_notes))
    .bind(Json(&data.session_rating))
    .bind(data.data_quality.completeness)
    .bind(data.data_quality.accuracy)
    .bind(data.improvement_percentage)
    .bind(data.effectiveness_score)
    .bind(&data.id)
    .bind(data.revision)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "VR session data was modified concurrently, reload and retry".to_string(),
        ));
    }

    Ok(())
}

/// 의사가 담당한 세션에 한해 환자의 VR 이력을 최신순으로 조회합니다.
pub async fn list_patient_history(
    pool: &SqlitePool,
    doctor_id: &str,
    patient_id: &str,
    phobia_type: Option<PhobiaType>,
) -> Result<Vec<VrSessionData>, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {VR_DATA_COLUMNS} FROM vr_session_data v \
         JOIN therapy_sessions s ON s.id = v.session_id"
    ));
    query
        .push(" WHERE s.doctor_id = ")
        .push_bind(doctor_id)
        .push(" AND v.patient_id = ")
        .push_bind(patient_id);
    if let Some(phobia_type) = phobia_type {
        query.push(" AND s.phobia_type = ").push_bind(phobia_type);
    }
    query.push(" ORDER BY v.session_start_time DESC");

    let rows = query.build_query_as::<VrDataRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    session_id: String,
    session_type: SessionType,
    scheduled_date_time: String,
    session_start_time: String,
    fear_initial: f64,
    fear_final: f64,
    improvement_percentage: f64,
    effectiveness_score: f64,
}

/// 환자의 진행 추이: 결과가 기록된 순서 (오래된 것부터)
pub async fn list_patient_progress(
    pool: &SqlitePool,
    patient_id: &str,
) -> Result<Vec<ProgressPoint>, AppError> {
    let rows = sqlx::query_as::<_, ProgressRow>(
        r#"
        SELECT v.session_id, s.session_type, s.scheduled_date_time, v.session_start_time,
               v.fear_initial, v.fear_final, v.improvement_percentage, v.effectiveness_score
        FROM vr_session_data v
        JOIN therapy_sessions s ON s.id = v.session_id
        WHERE v.patient_id = ?
        ORDER BY v.created_at ASC
        "#,
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ProgressPoint {
            session_id: row.session_id,
            session_type: row.session_type,
            scheduled_date_time: row.scheduled_date_time,
            session_start_time: row.session_start_time,
            fear_scores: FearScores {
                initial: row.fear_initial,
                final_score: row.fear_final,
            },
            improvement_percentage: row.improvement_percentage,
            effectiveness_score: row.effectiveness_score,
        })
        .collect())
}

/// 의사의 최근 결과 데이터 (대시보드용)
pub async fn list_recent_vr_data(
    pool: &SqlitePool,
    doctor_id: &str,
    limit: i64,
) -> Result<Vec<VrSessionData>, AppError> {
    let rows = sqlx::query_as::<_, VrDataRow>(&format!(
        r#"SELECT {VR_DATA_COLUMNS} FROM vr_session_data v
        JOIN therapy_sessions s ON s.id = v.session_id
        WHERE s.doctor_id = ?
        ORDER BY v.created_at DESC
        LIMIT ?"#
    ))
    .bind(doctor_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// 분석 대상 레코드: 의사의 세션 중 `since` 이후 생성된 것만
pub async fn list_analytics_records(
    pool: &SqlitePool,
    doctor_id: &str,
    since: &str,
    patient_id: Option<&str>,
) -> Result<Vec<AnalyticsRecord>, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {VR_DATA_COLUMNS}, s.doctor_id, s.phobia_type, s.session_type \
         FROM vr_session_data v JOIN therapy_sessions s ON s.id = v.session_id"
    ));
    query
        .push(" WHERE s.doctor_id = ")
        .push_bind(doctor_id)
        .push(" AND s.created_at >= ")
        .push_bind(since);
    if let Some(patient_id) = patient_id {
        query.push(" AND s.patient_id = ").push_bind(patient_id);
    }

    let rows = query.build_query_as::<AnalyticsRow>().fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| AnalyticsRecord {
            doctor_id: row.doctor_id,
            phobia_type: row.phobia_type,
            session_type: row.session_type,
            data: row.data.into(),
        })
        .collect())
}

/// 의사의 완료된 세션에 대한 평균 개선율: 없으면 0
pub async fn average_completed_improvement(
    pool: &SqlitePool,
    doctor_id: &str,
) -> Result<f64, AppError> {
    let average: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT AVG(v.improvement_percentage)
        FROM vr_session_data v
        JOIN therapy_sessions s ON s.id = v.session_id
        WHERE s.doctor_id = ? AND s.session_status = ?
        "#,
    )
    .bind(doctor_id)
    .bind(SessionStatus::Completed)
    .fetch_one(pool)
    .await?;

    Ok(average.unwrap_or(0.0))
}
