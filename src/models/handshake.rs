//! # VR 핸드셰이크 응답 모델
//!
//! VR 런타임(외부 프로세스)에 넘겨주는 읽기 전용 스냅샷입니다.
//! 세션 토큰 자체나 다른 세션의 정보는 절대 포함하지 않습니다.

use serde::Serialize;

use super::{
    PatientPhobia, PhobiaType, PreSessionData, SessionConfig, SessionStatus, SessionType,
    Specialization, VrScenario,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSnapshot {
    pub name: String,
    /// 사람이 읽는 환자 코드 (내부 id가 아님)
    pub patient_code: String,
    pub phobias: Vec<PatientPhobia>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSnapshot {
    pub name: String,
    pub specialization: Specialization,
}

/// `GET /api/sessions/vr-config/{session_token}` 응답
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VrConfig {
    pub session_id: String,
    pub patient: PatientSnapshot,
    pub doctor: DoctorSnapshot,
    pub session_type: SessionType,
    pub phobia_type: PhobiaType,
    pub vr_scenario: VrScenario,
    pub session_config: SessionConfig,
    pub pre_session_data: PreSessionData,
}

/// `POST /api/sessions/{id}/start` 응답의 세션 요약
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSnapshot {
    pub id: String,
    pub session_token: String,
    pub status: SessionStatus,
    pub start_time: Option<String>,
    pub patient: PatientSnapshot,
    pub vr_scenario: VrScenario,
    pub session_config: SessionConfig,
    pub pre_session_data: PreSessionData,
}
