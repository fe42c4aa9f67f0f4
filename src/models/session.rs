//! # 치료 세션(TherapySession) 모델 정의
//!
//! VR 노출치료 한 회차를 나타내는 엔티티와, 세션에 딸린 값 객체
//! (시나리오, 세션 설정, 사전 측정값) 및 요청/응답 구조체를 정의합니다.
//!
//! ## 세션 상태 흐름
//! ```text
//! Scheduled ──▶ In Progress ──▶ Completed
//!     │             │
//!     │             ▼
//!     │         Interrupted ──▶ In Progress (재개)
//!     ▼             │
//! Cancelled ◀───────┘
//! ```
//! 전이 규칙 자체는 `SessionStatus::allowed_targets()`에 있고,
//! 실제 상태 변경은 `services::lifecycle`을 통해서만 일어납니다.
//!
//! 닫힌 목록(공포증 종류, 환경, 난이도 등)은 모두 열거형(enum)으로 표현합니다.
//! 새 공포증 종류를 추가하면 `match`를 쓰는 모든 곳에서 컴파일 에러가 나므로
//! 빠뜨린 처리 지점을 컴파일러가 알려줍니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::minutes_between;
use crate::error::AppError;

/// 세션 진행 상태
///
/// JSON과 DB에는 사람이 읽는 이름("In Progress" 등)으로 저장됩니다.
/// `#[sqlx(rename = ...)]`와 `#[serde(rename = ...)]`를 같은 값으로 맞춰야 합니다.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
pub enum SessionStatus {
    Scheduled,
    #[serde(rename = "In Progress")]
    #[sqlx(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
    Interrupted,
}

impl SessionStatus {
    /// 현재 상태에서 이동할 수 있는 상태 목록
    ///
    /// | 현재 | 이동 가능 |
    /// |------|-----------|
    /// | Scheduled | In Progress, Cancelled |
    /// | In Progress | Completed, Interrupted |
    /// | Interrupted | In Progress, Cancelled |
    /// | Completed | (없음) |
    /// | Cancelled | (없음) |
    pub fn allowed_targets(self) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match self {
            Scheduled => &[InProgress, Cancelled],
            InProgress => &[Completed, Interrupted],
            Interrupted => &[InProgress, Cancelled],
            Completed => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: SessionStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// 더 이상 어떤 전이도 불가능한 종료 상태인지 여부
    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "Scheduled",
            SessionStatus::InProgress => "In Progress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Cancelled => "Cancelled",
            SessionStatus::Interrupted => "Interrupted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 세션 종류
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
pub enum SessionType {
    #[serde(rename = "Initial Assessment")]
    #[sqlx(rename = "Initial Assessment")]
    InitialAssessment,
    #[serde(rename = "Exposure Therapy")]
    #[sqlx(rename = "Exposure Therapy")]
    ExposureTherapy,
    #[serde(rename = "Progress Check")]
    #[sqlx(rename = "Progress Check")]
    ProgressCheck,
    #[serde(rename = "Final Assessment")]
    #[sqlx(rename = "Final Assessment")]
    FinalAssessment,
}

/// 치료 대상 공포증 종류 (닫힌 목록)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
pub enum PhobiaType {
    /// 거미 공포증
    Arachnophobia,
    /// 폐소 공포증
    Claustrophobia,
    /// 비행 공포증
    Aerophobia,
    /// 개 공포증
    Cynophobia,
}

/// VR 시나리오가 재현하는 환경
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Environment {
    Elevator,
    #[serde(rename = "Small Room")]
    #[sqlx(rename = "Small Room")]
    SmallRoom,
    #[serde(rename = "MRI")]
    #[sqlx(rename = "MRI")]
    Mri,
    #[serde(rename = "Dog Park")]
    #[sqlx(rename = "Dog Park")]
    DogPark,
    Airplane,
    #[serde(rename = "Spider Room")]
    #[sqlx(rename = "Spider Room")]
    SpiderRoom,
}

/// 시나리오 난이도: 지정하지 않으면 Beginner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// VR 시나리오 정보
///
/// DB에서는 `scenario_*` 컬럼들로 펼쳐져 저장되고,
/// `#[sqlx(flatten)]`으로 `TherapySession` 안에 다시 조립됩니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VrScenario {
    #[sqlx(rename = "scenario_name")]
    pub name: String,
    #[sqlx(rename = "scenario_description")]
    pub description: Option<String>,
    #[sqlx(rename = "scenario_difficulty")]
    #[serde(default)]
    pub difficulty: Difficulty,
    #[sqlx(rename = "scenario_environment")]
    pub environment: Environment,
}

/// 세션 설정: VR 런타임이 시나리오를 어떻게 실행할지 결정합니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// 계획된 세션 길이 (분)
    #[sqlx(rename = "config_duration")]
    #[serde(default = "default_duration")]
    pub duration: i64,
    /// 노출 강도 1~10
    #[sqlx(rename = "config_exposure_level")]
    #[serde(default = "default_exposure_level")]
    pub exposure_level: i64,
    #[sqlx(rename = "config_biofeedback")]
    #[serde(default)]
    pub biofeedback_enabled: bool,
    #[sqlx(rename = "config_voice_guidance")]
    #[serde(default = "default_true")]
    pub voice_guidance_enabled: bool,
}

fn default_duration() -> i64 {
    30
}

fn default_exposure_level() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            exposure_level: default_exposure_level(),
            biofeedback_enabled: false,
            voice_guidance_enabled: true,
        }
    }
}

/// 세션 시작 전 측정값
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PreSessionData {
    /// 주관적 공포 점수 0~10 (필수)
    #[sqlx(rename = "pre_fear_score")]
    pub fear_score: f64,
    /// 불안 수준 0~10
    #[sqlx(rename = "pre_anxiety_level")]
    pub anxiety_level: Option<f64>,
    #[sqlx(rename = "pre_notes")]
    pub notes: Option<String>,
}

/// 치료 세션 엔티티: DB의 `therapy_sessions` 테이블 한 행에 대응합니다.
///
/// `session_status`는 상태 전이 함수만 변경할 수 있습니다.
/// `session_token`은 생성 시 한 번 발급되고 이후 바뀌지 않습니다.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TherapySession {
    /// 세션 고유 식별자 (UUIDv7)
    pub id: String,
    /// VR 런타임과 공유하는 불투명 토큰
    pub session_token: String,
    pub patient_id: String,
    /// 세션 소유 의사: 모든 권한 확인의 기준
    pub doctor_id: String,
    pub session_type: SessionType,
    pub phobia_type: PhobiaType,
    #[sqlx(flatten)]
    pub vr_scenario: VrScenario,
    #[sqlx(flatten)]
    pub session_config: SessionConfig,
    #[sqlx(flatten)]
    pub pre_session_data: PreSessionData,
    pub session_status: SessionStatus,
    pub scheduled_date_time: String,
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TherapySession {
    /// 실제 진행 시간(분): 시작/종료 시각이 모두 있을 때만 계산됩니다.
    pub fn actual_duration(&self) -> Option<i64> {
        minutes_between(
            self.actual_start_time.as_deref(),
            self.actual_end_time.as_deref(),
        )
    }

    pub fn is_active(&self) -> bool {
        self.session_status == SessionStatus::InProgress
    }
}

/// 세션 응답: 저장하지 않는 파생 필드(`actualDuration`, `isActive`)를 덧붙입니다.
///
/// `#[serde(flatten)]`: 내부 구조체의 필드를 같은 JSON 객체 레벨로 펼칩니다.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: TherapySession,
    pub actual_duration: Option<i64>,
    pub is_active: bool,
}

impl From<TherapySession> for SessionResponse {
    fn from(session: TherapySession) -> Self {
        Self {
            actual_duration: session.actual_duration(),
            is_active: session.is_active(),
            session,
        }
    }
}

/// 상태 전이 한 건: 전이가 실제로 바꾸는 컬럼만 담습니다.
///
/// `services::lifecycle::plan`이 만들고 `db::apply_status_change`가
/// `session_status = from`일 때만 씁니다 (compare-and-swap).
/// `None`인 필드는 UPDATE에 들어가지 않으므로, 스냅샷을 읽은 뒤 다른 요청이
/// 고친 메모나 시각이 그대로 남습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub from: SessionStatus,
    pub to: SessionStatus,
    /// In Progress 진입 시각. 이때 종료 시각은 비워집니다.
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    /// 취소 사유로 메모를 대체할 때만 `Some`
    pub notes: Option<String>,
}

/// 세션 생성 요청: `POST /api/sessions`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub patient_id: String,
    pub session_type: SessionType,
    pub phobia_type: PhobiaType,
    pub vr_scenario: VrScenario,
    /// 없으면 기본 설정(30분, 노출 강도 1)을 사용합니다
    #[serde(default)]
    pub session_config: SessionConfig,
    pub pre_session_data: PreSessionData,
    pub scheduled_date_time: DateTime<Utc>,
    pub notes: Option<String>,
}

/// 세션 수정 요청: `PUT /api/sessions/{id}`
///
/// 상태(`sessionStatus`)는 여기서 바꿀 수 없습니다. 상태 변경은
/// `PUT /api/sessions/{id}/status`의 전이 규칙을 거쳐야 합니다.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub session_type: Option<SessionType>,
    pub phobia_type: Option<PhobiaType>,
    pub vr_scenario: Option<VrScenario>,
    pub session_config: Option<SessionConfig>,
    pub pre_session_data: Option<PreSessionData>,
    pub scheduled_date_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// 상태 변경 요청: `PUT /api/sessions/{id}/status`
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: SessionStatus,
}

/// 세션 취소 요청: `PUT /api/sessions/{id}/cancel`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSessionRequest {
    /// 취소 사유: 있으면 세션 메모를 대체합니다
    pub cancellation_reason: Option<String>,
}

/// 세션 목록 필터: `GET /api/sessions?status=...&patientId=...&phobiaType=...`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListQuery {
    pub status: Option<SessionStatus>,
    pub patient_id: Option<String>,
    pub phobia_type: Option<PhobiaType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    pub limit: Option<i64>,
}

/// 세션 메모 최대 길이 (문자 수)
const MAX_NOTES_LEN: usize = 2000;

fn invalid(message: &str) -> AppError {
    AppError::ValidationFailed(message.to_string())
}

fn in_range(value: f64, min: f64, max: f64) -> bool {
    value.is_finite() && (min..=max).contains(&value)
}

impl VrScenario {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(invalid("Scenario name is required"));
        }
        Ok(())
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), AppError> {
        if self.duration <= 0 {
            return Err(invalid("Session duration must be positive"));
        }
        if !(1..=10).contains(&self.exposure_level) {
            return Err(invalid("Exposure level must be between 1 and 10"));
        }
        Ok(())
    }
}

impl PreSessionData {
    fn validate(&self) -> Result<(), AppError> {
        if !in_range(self.fear_score, 0.0, 10.0) {
            return Err(invalid("Pre-session fear score must be between 0 and 10"));
        }
        if let Some(anxiety) = self.anxiety_level {
            if !in_range(anxiety, 0.0, 10.0) {
                return Err(invalid("Anxiety level must be between 0 and 10"));
            }
        }
        Ok(())
    }
}

fn validate_notes(notes: Option<&str>) -> Result<(), AppError> {
    match notes {
        Some(text) if text.chars().count() > MAX_NOTES_LEN => {
            Err(invalid("Notes cannot exceed 2000 characters"))
        }
        _ => Ok(()),
    }
}

impl CreateSessionRequest {
    /// 환자 소유권은 DB 조회가 필요하므로 라우트에서 따로 확인합니다.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.patient_id.trim().is_empty() {
            return Err(invalid("Patient is required"));
        }
        self.vr_scenario.validate()?;
        self.session_config.validate()?;
        self.pre_session_data.validate()?;
        validate_notes(self.notes.as_deref())
    }
}

impl UpdateSessionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(scenario) = &self.vr_scenario {
            scenario.validate()?;
        }
        if let Some(config) = &self.session_config {
            config.validate()?;
        }
        if let Some(pre) = &self.pre_session_data {
            pre.validate()?;
        }
        validate_notes(self.notes.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    const ALL: [SessionStatus; 5] = [Scheduled, InProgress, Completed, Cancelled, Interrupted];

    #[test]
    fn transition_table_matches_lifecycle() {
        let allowed = [
            (Scheduled, InProgress),
            (Scheduled, Cancelled),
            (InProgress, Completed),
            (InProgress, Interrupted),
            (Interrupted, InProgress),
            (Interrupted, Cancelled),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        let terminal: Vec<_> = ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Completed, Cancelled]);
    }

    #[test]
    fn status_uses_display_names_on_the_wire() {
        assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"In Progress\"");
        let parsed: SessionStatus = serde_json::from_str("\"Interrupted\"").unwrap();
        assert_eq!(parsed, Interrupted);
        let env: Environment = serde_json::from_str("\"Spider Room\"").unwrap();
        assert_eq!(env, Environment::SpiderRoom);
    }

    #[test]
    fn session_config_defaults_apply_to_missing_fields() {
        let config: SessionConfig = serde_json::from_str(r#"{"exposureLevel": 4}"#).unwrap();
        assert_eq!(config.duration, 30);
        assert_eq!(config.exposure_level, 4);
        assert!(!config.biofeedback_enabled);
        assert!(config.voice_guidance_enabled);
    }

    fn create_request() -> CreateSessionRequest {
        serde_json::from_value(serde_json::json!({
            "patientId": "p1",
            "sessionType": "Exposure Therapy",
            "phobiaType": "Claustrophobia",
            "vrScenario": { "name": "MRI Scan", "environment": "MRI" },
            "preSessionData": { "fearScore": 7 },
            "scheduledDateTime": "2026-04-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn minimal_create_request_is_valid() {
        let req = create_request();
        assert!(req.validate().is_ok());
        assert_eq!(req.vr_scenario.difficulty, Difficulty::Beginner);
        assert_eq!(req.session_config.duration, 30);
    }

    #[test]
    fn create_request_rejects_out_of_range_values() {
        let mut req = create_request();
        req.pre_session_data.fear_score = 11.0;
        assert!(matches!(req.validate(), Err(AppError::ValidationFailed(_))));

        let mut req = create_request();
        req.session_config.exposure_level = 0;
        assert!(req.validate().is_err());

        let mut req = create_request();
        req.vr_scenario.name = "  ".to_string();
        assert!(req.validate().is_err());

        let mut req = create_request();
        req.notes = Some("x".repeat(2001));
        assert!(req.validate().is_err());
    }
}
