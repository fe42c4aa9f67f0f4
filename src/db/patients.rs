//! # 환자 데이터베이스 쿼리 모듈
//!
//! 환자 레코드의 생성과 조회입니다. 모든 목록 조회는 담당 의사로 범위가
//! 제한됩니다. 단건 조회(`get_patient`)는 소유권 확인을 호출 측에 맡깁니다.

use crate::error::AppError;
use crate::models::*;
use crate::services::token;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const SELECT_PATIENT: &str = r#"
    SELECT id, patient_code, doctor_id, name, date_of_birth, gender, email, phone,
           emergency_contact_name, emergency_contact_relation, emergency_contact_phone,
           phobias, is_active, notes, created_at, updated_at
    FROM patients
"#;

/// 환자 코드가 우연히 겹칠 때 다시 시도하는 횟수
const CODE_ATTEMPTS: usize = 3;

/// 새 환자를 등록합니다.
///
/// `patient_code`는 여기서 발급합니다. UNIQUE 제약에 걸리면
/// 새 코드로 다시 시도하고, 기존 레코드를 덮어쓰지 않습니다.
pub async fn create_patient(
    pool: &SqlitePool,
    doctor_id: &str,
    req: &CreatePatientRequest,
) -> Result<Patient, AppError> {
    let id = uuid::Uuid::now_v7().to_string();
    let date_of_birth = req.date_of_birth.format("%Y-%m-%d").to_string();

    for attempt in 1..=CODE_ATTEMPTS {
        let code = token::patient_code();
        let result = sqlx::query(
            r#"
            INSERT INTO patients (
                id, patient_code, doctor_id, name, date_of_birth, gender, email, phone,
                emergency_contact_name, emergency_contact_relation, emergency_contact_phone,
                phobias, notes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&code)
        .bind(doctor_id)
        .bind(req.name.trim())
        .bind(&date_of_birth)
        .bind(req.gender)
        .bind(req.email.as_deref())
        .bind(req.phone.trim())
        .bind(&req.emergency_contact.name)
        .bind(&req.emergency_contact.relationship)
        .bind(&req.emergency_contact.phone)
        .bind(Json(&req.phobias))
        .bind(req.notes.as_deref())
        .execute(pool)
        .await;

        match result {
            Ok(_) => {
                return get_patient(pool, &id)
                    .await?
                    .ok_or(AppError::Internal("Failed to retrieve created patient".to_string()));
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::warn!(attempt, "patient code collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(
        "Could not allocate a unique patient code".to_string(),
    ))
}

pub async fn get_patient(pool: &SqlitePool, id: &str) -> Result<Option<Patient>, AppError> {
    let patient = sqlx::query_as::<_, Patient>(&format!("{SELECT_PATIENT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(patient)
}

/// LIKE 패턴의 와일드카드 문자를 글자 그대로 취급하도록 이스케이프합니다.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// 의사의 활성 환자 목록 (최근 등록 순)
///
/// - `search`: 이름, 이메일, 환자 코드 부분 일치
/// - `phobia_type`: 해당 공포증을 하나라도 가진 환자 (`phobias` JSON 배열 검사)
pub async fn list_patients(
    pool: &SqlitePool,
    doctor_id: &str,
    filter: &PatientListQuery,
) -> Result<Vec<Patient>, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(SELECT_PATIENT);
    query
        .push(" WHERE doctor_id = ")
        .push_bind(doctor_id)
        .push(" AND is_active = 1");

    if let Some(term) = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
    {
        let pattern = like_pattern(term);
        query
            .push(" AND (name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR email LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR patient_code LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(phobia_type) = filter.phobia_type {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM json_each(patients.phobias) \
                 WHERE json_extract(json_each.value, '$.type') = ",
            )
            .push_bind(phobia_type)
            .push(")");
    }
    query.push(" ORDER BY created_at DESC");

    let patients = query.build_query_as::<Patient>().fetch_all(pool).await?;
    Ok(patients)
}

pub async fn count_active_patients(pool: &SqlitePool, doctor_id: &str) -> Result<i64, AppError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM patients WHERE doctor_id = ? AND is_active = 1")
            .bind(doctor_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}
