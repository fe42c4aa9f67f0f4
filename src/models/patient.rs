//! # 환자(Patient) 모델 정의
//!
//! 환자 레코드는 치료 세션의 대상이며, 담당 의사 한 명에게 속합니다.
//! `patient_code`는 사람이 읽는 환자 식별자로, VR 런타임을 실행할 때
//! 인자로 전달됩니다 (내부 `id`는 외부에 넘기지 않습니다).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use super::{FearScores, PhobiaType, SessionResponse, SessionType};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Gender {
    Male,
    Female,
    Other,
    #[serde(rename = "Prefer not to say")]
    #[sqlx(rename = "Prefer not to say")]
    PreferNotToSay,
}

/// 비상 연락처: DB에서는 `emergency_contact_*` 컬럼으로 펼쳐 저장됩니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    #[sqlx(rename = "emergency_contact_name")]
    pub name: String,
    #[sqlx(rename = "emergency_contact_relation")]
    pub relationship: String,
    #[sqlx(rename = "emergency_contact_phone")]
    pub phone: String,
}

/// 환자가 가진 공포증 하나
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPhobia {
    /// JSON 키는 `type`: Rust 예약어라서 필드 이름을 바꿔 둡니다
    #[serde(rename = "type")]
    pub phobia_type: PhobiaType,
    /// 심각도 1~10
    pub severity: i64,
    pub description: Option<String>,
}

/// 환자 엔티티: DB의 `patients` 테이블 한 행
///
/// `phobias`는 JSON 텍스트 컬럼입니다. `sqlx::types::Json<T>`이
/// 읽을 때는 역직렬화를, 쓸 때는 직렬화를 대신 해줍니다.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub patient_code: String,
    pub doctor_id: String,
    pub name: String,
    pub date_of_birth: String,
    pub gender: Gender,
    pub email: Option<String>,
    pub phone: String,
    #[sqlx(flatten)]
    pub emergency_contact: EmergencyContact,
    pub phobias: Json<Vec<PatientPhobia>>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 환자 등록 요청: `POST /api/patients`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub email: Option<String>,
    pub phone: String,
    pub emergency_contact: EmergencyContact,
    pub phobias: Vec<PatientPhobia>,
    pub notes: Option<String>,
}

impl CreatePatientRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            (self.name.as_str(), "Patient name"),
            (self.phone.as_str(), "Phone number"),
            (self.emergency_contact.name.as_str(), "Emergency contact name"),
            (self.emergency_contact.relationship.as_str(), "Emergency contact relationship"),
            (self.emergency_contact.phone.as_str(), "Emergency contact phone"),
        ];
        for (value, label) in required {
            if value.trim().is_empty() {
                return Err(AppError::ValidationFailed(format!("{label} is required")));
            }
        }
        if self.phobias.is_empty() {
            return Err(AppError::ValidationFailed(
                "At least one phobia is required".to_string(),
            ));
        }
        if self.phobias.iter().any(|p| !(1..=10).contains(&p.severity)) {
            return Err(AppError::ValidationFailed(
                "Phobia severity must be between 1 and 10".to_string(),
            ));
        }
        Ok(())
    }
}

/// 환자 목록 필터: `GET /api/patients?search=...&phobiaType=...`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientListQuery {
    /// 이름, 이메일, 환자 코드에 대한 부분 일치 (대소문자 무시)
    pub search: Option<String>,
    pub phobia_type: Option<PhobiaType>,
}

/// 환자 한 명의 세션 집계: 목록과 의사별 요약에 붙습니다.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PatientSessionStats {
    #[serde(skip)]
    pub patient_id: String,
    pub total_sessions: i64,
    pub completed_sessions: i64,
    /// 가장 최근에 만들어진 세션의 생성 시각
    pub last_session_date: Option<String>,
}

/// `GET /api/patients` 한 행: 환자 필드 + `stats`
#[derive(Debug, Serialize)]
pub struct PatientListItem {
    #[serde(flatten)]
    pub patient: Patient,
    pub stats: PatientSessionStats,
}

/// `GET /api/doctors/patients-summary` 한 행
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: String,
    pub patient_code: String,
    pub name: String,
    pub phobias: Json<Vec<PatientPhobia>>,
    pub created_at: String,
    pub session_count: i64,
    pub last_session_date: Option<String>,
}

impl PatientSummary {
    pub fn new(patient: Patient, stats: Option<&PatientSessionStats>) -> Self {
        Self {
            id: patient.id,
            patient_code: patient.patient_code,
            name: patient.name,
            phobias: patient.phobias,
            created_at: patient.created_at,
            session_count: stats.map_or(0, |s| s.total_sessions),
            last_session_date: stats.and_then(|s| s.last_session_date.clone()),
        }
    }
}

#[derive(Debug, Default, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetailStats {
    pub total_sessions: i64,
    pub completed_sessions: i64,
    /// 앞으로 예정된 Scheduled 세션 수
    pub upcoming_sessions: i64,
}

/// 환자 진행 추이의 한 점: 결과 데이터 생성 순으로 나열됩니다.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPoint {
    pub session_id: String,
    pub session_type: SessionType,
    pub scheduled_date_time: String,
    pub session_start_time: String,
    pub fear_scores: FearScores,
    pub improvement_percentage: f64,
    pub effectiveness_score: f64,
}

/// 환자 상세: `GET /api/patients/{id}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetail {
    pub patient: Patient,
    pub stats: PatientDetailStats,
    /// 최근 생성된 세션 5개
    pub recent_sessions: Vec<SessionResponse>,
    pub progress_data: Vec<ProgressPoint>,
}
