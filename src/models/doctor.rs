use serde::{Deserialize, Serialize};

use super::{PhobiaType, SessionResponse, VrSessionData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Specialization {
    #[serde(rename = "Clinical Psychology")]
    #[sqlx(rename = "Clinical Psychology")]
    ClinicalPsychology,
    Psychiatry,
    #[serde(rename = "Behavioral Therapy")]
    #[sqlx(rename = "Behavioral Therapy")]
    BehavioralTherapy,
    #[serde(rename = "Cognitive Behavioral Therapy")]
    #[sqlx(rename = "Cognitive Behavioral Therapy")]
    CognitiveBehavioralTherapy,
    #[serde(rename = "Exposure Therapy")]
    #[sqlx(rename = "Exposure Therapy")]
    ExposureTherapy,
    #[serde(rename = "PTSD Specialist")]
    #[sqlx(rename = "PTSD Specialist")]
    PtsdSpecialist,
    #[serde(rename = "Anxiety Disorders")]
    #[sqlx(rename = "Anxiety Disorders")]
    AnxietyDisorders,
    #[serde(rename = "Phobia Treatment")]
    #[sqlx(rename = "Phobia Treatment")]
    PhobiaTreatment,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub specialization: Specialization,
    pub license_number: String,
    pub phone: String,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub specialization: Specialization,
    pub license_number: String,
    pub phone: String,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<Doctor> for DoctorResponse {
    fn from(doctor: Doctor) -> Self {
        Self {
            id: doctor.id,
            name: doctor.name,
            email: doctor.email,
            specialization: doctor.specialization,
            license_number: doctor.license_number,
            phone: doctor.phone,
            last_login: doctor.last_login,
            created_at: doctor.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub specialization: Specialization,
    pub license_number: String,
    pub phone: String,
}

/// 프로필 수정 요청: `PUT /api/doctors/profile`
///
/// 비어 있거나 빠진 필드는 바꾸지 않습니다. 면허 번호는 바꿀 수 없습니다.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub specialization: Option<Specialization>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub doctor: DoctorResponse,
    pub token: String,
}

/// 대시보드 요약: `GET /api/doctors/dashboard`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_patients: i64,
    pub total_sessions: i64,
    pub sessions_this_week: i64,
    pub average_improvement: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhobiaCount {
    pub phobia_type: PhobiaType,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub upcoming_sessions: Vec<SessionResponse>,
    pub recent_session_data: Vec<VrSessionData>,
    /// 활성 환자들의 공포증 분포: 많은 순
    pub phobia_distribution: Vec<PhobiaCount>,
}
