//! # VR 세션 결과 데이터 모델
//!
//! VR 런타임이 시나리오를 마친 뒤 보내는 텔레메트리(공포 점수, 생체 신호,
//! 상호작용 기록)와 서버가 계산한 파생 지표(개선율, 효과 점수)를 담습니다.
//!
//! ## 제출 페이로드 검증
//! `SubmitTelemetryRequest`의 필드는 전부 `Option`입니다. 역직렬화 단계에서
//! 실패시키지 않고 `into_telemetry()`에서 한 번에 검증해서, 누락된 필드마다
//! 읽을 수 있는 `ValidationFailed` 메시지를 돌려주기 위함입니다.
//! 검증은 DB에 아무것도 쓰기 전에 끝나므로 부분 레코드가 생기지 않습니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// 세션 전/후 주관적 공포 점수 (0~10)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FearScores {
    pub initial: f64,
    /// `final`은 Rust 예약어라 필드 이름을 바꿉니다
    #[serde(rename = "final")]
    pub final_score: f64,
}

/// 생체 신호 한 종류의 시작/종료 측정값
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiometricPair {
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricData {
    pub heart_rate: Option<BiometricPair>,
    pub skin_conductance: Option<BiometricPair>,
}

/// VR 공간 안에서의 상호작용 기록 한 건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub timestamp: String,
    pub object_id: String,
    pub interaction_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VrInteractionData {
    /// 발생 순서대로 정렬된 상호작용 목록
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub completeness: f64,
    pub accuracy: f64,
}

impl Default for DataQuality {
    fn default() -> Self {
        Self {
            completeness: 100.0,
            accuracy: 100.0,
        }
    }
}

/// VR 세션 결과 레코드: 치료 세션당 최대 한 건
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VrSessionData {
    pub id: String,
    pub session_id: String,
    pub patient_id: String,
    pub session_start_time: String,
    pub session_end_time: String,
    pub total_duration: f64,
    pub fear_scores: FearScores,
    pub biometric_data: BiometricData,
    pub vr_interaction_data: VrInteractionData,
    pub exposure_metrics: Value,
    pub session_notes: Value,
    pub session_rating: Value,
    pub data_quality: DataQuality,
    /// (initial - final) / initial × 100, initial이 0이면 0
    pub improvement_percentage: f64,
    /// 0~100 복합 효과 점수 (계산식은 `services::outcome` 참고)
    pub effectiveness_score: f64,
    /// 정정될 때마다 1씩 올라갑니다. 정정 저장은 읽은 값과 같을 때만 성공합니다.
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// 텔레메트리에서 계산된 파생 지표 (`services::outcome::compute`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub improvement_percentage: f64,
    pub effectiveness_score: f64,
}

/// 검증을 통과한 텔레메트리: DB에 쓸 준비가 된 값
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub session_start_time: DateTime<Utc>,
    pub session_end_time: DateTime<Utc>,
    pub total_duration: f64,
    pub fear_scores: FearScores,
    pub biometric_data: BiometricData,
    pub vr_interaction_data: VrInteractionData,
    pub exposure_metrics: Value,
    pub session_notes: Value,
    pub session_rating: Value,
    pub data_quality: DataQuality,
}

#[derive(Debug, Default, Deserialize)]
pub struct FearScoresInput {
    pub initial: Option<f64>,
    #[serde(rename = "final")]
    pub final_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BiometricPairInput {
    pub initial: Option<f64>,
    #[serde(rename = "final")]
    pub final_value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricDataInput {
    pub heart_rate: Option<BiometricPairInput>,
    pub skin_conductance: Option<BiometricPairInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionInput {
    pub timestamp: Option<String>,
    pub object_id: Option<String>,
    pub interaction_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VrInteractionDataInput {
    pub interactions: Option<Vec<InteractionInput>>,
}

/// 텔레메트리 제출 요청: `POST /api/vr-data/submit` (VR 런타임 전용)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTelemetryRequest {
    pub session_token: Option<String>,
    pub session_start_time: Option<DateTime<Utc>>,
    pub session_end_time: Option<DateTime<Utc>>,
    pub total_duration: Option<f64>,
    pub fear_scores: Option<FearScoresInput>,
    pub biometric_data: Option<BiometricDataInput>,
    pub vr_interaction_data: Option<VrInteractionDataInput>,
    pub exposure_metrics: Option<Value>,
    pub session_notes: Option<Value>,
    pub session_rating: Option<Value>,
    pub data_quality: Option<DataQuality>,
}

fn invalid(message: &str) -> AppError {
    AppError::ValidationFailed(message.to_string())
}

/// 공포 점수 한 개가 0~10 범위의 유한한 숫자인지 확인합니다.
fn fear_score(value: Option<f64>, label: &str) -> Result<f64, AppError> {
    let value = value
        .ok_or_else(|| AppError::ValidationFailed(format!("{label} fear score is required")))?;
    if !value.is_finite() || !(0.0..=10.0).contains(&value) {
        return Err(AppError::ValidationFailed(format!(
            "{label} fear score must be between 0 and 10"
        )));
    }
    Ok(value)
}

pub fn validate_fear_scores(scores: &FearScores) -> Result<(), AppError> {
    fear_score(Some(scores.initial), "Initial")?;
    fear_score(Some(scores.final_score), "Final")?;
    Ok(())
}

/// 생체 신호 쌍 검증: 값은 둘 다 0보다 큰 유한한 숫자여야 합니다.
fn check_pair(initial: f64, final_value: f64, label: &str) -> Result<BiometricPair, AppError> {
    if initial.is_finite() && final_value.is_finite() && initial > 0.0 && final_value > 0.0 {
        Ok(BiometricPair {
            initial,
            final_value,
        })
    } else {
        Err(AppError::ValidationFailed(format!(
            "{label} data must include positive initial and final values"
        )))
    }
}

/// 제출된 생체 신호 쌍: 한쪽 값만 있으면 거부합니다.
fn biometric_pair(
    input: Option<BiometricPairInput>,
    label: &str,
) -> Result<Option<BiometricPair>, AppError> {
    let Some(pair) = input else {
        return Ok(None);
    };
    match (pair.initial, pair.final_value) {
        (Some(initial), Some(final_value)) => check_pair(initial, final_value, label).map(Some),
        _ => Err(AppError::ValidationFailed(format!(
            "{label} data must include initial and final values"
        ))),
    }
}

pub fn validate_biometrics(data: &BiometricData) -> Result<(), AppError> {
    if let Some(pair) = data.heart_rate {
        check_pair(pair.initial, pair.final_value, "Heart rate")?;
    }
    if let Some(pair) = data.skin_conductance {
        check_pair(pair.initial, pair.final_value, "Skin conductance")?;
    }
    Ok(())
}

fn required_text(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

impl SubmitTelemetryRequest {
    /// 필수 필드와 하위 필드를 모두 검증해 `Telemetry`로 변환합니다.
    ///
    /// 토큰은 호출 측에서 먼저 꺼내 세션을 찾으므로 여기서는 보지 않습니다.
    pub fn into_telemetry(self) -> Result<Telemetry, AppError> {
        let session_start_time = self
            .session_start_time
            .ok_or_else(|| invalid("sessionStartTime is required"))?;
        let session_end_time = self
            .session_end_time
            .ok_or_else(|| invalid("sessionEndTime is required"))?;
        if session_end_time < session_start_time {
            return Err(invalid("sessionEndTime must not be before sessionStartTime"));
        }

        let total_duration = self
            .total_duration
            .filter(|duration| duration.is_finite() && *duration > 0.0)
            .ok_or_else(|| invalid("totalDuration is required and must be positive"))?;

        let fear_input = self
            .fear_scores
            .ok_or_else(|| invalid("fearScores are required"))?;
        let fear_scores = FearScores {
            initial: fear_score(fear_input.initial, "Initial")?,
            final_score: fear_score(fear_input.final_score, "Final")?,
        };

        let biometric_input = self.biometric_data.unwrap_or_default();
        let biometric_data = BiometricData {
            heart_rate: biometric_pair(biometric_input.heart_rate, "Heart rate")?,
            skin_conductance: biometric_pair(biometric_input.skin_conductance, "Skin conductance")?,
        };

        let mut interactions = Vec::new();
        for input in self
            .vr_interaction_data
            .and_then(|data| data.interactions)
            .unwrap_or_default()
        {
            match (
                required_text(input.timestamp),
                required_text(input.object_id),
                required_text(input.interaction_type),
            ) {
                (Some(timestamp), Some(object_id), Some(interaction_type)) => {
                    interactions.push(Interaction {
                        timestamp,
                        object_id,
                        interaction_type,
                    })
                }
                _ => {
                    return Err(invalid(
                        "Each interaction must include timestamp, objectId, and interactionType",
                    ))
                }
            }
        }

        Ok(Telemetry {
            session_start_time,
            session_end_time,
            total_duration,
            fear_scores,
            biometric_data,
            vr_interaction_data: VrInteractionData { interactions },
            exposure_metrics: self.exposure_metrics.unwrap_or_else(empty_object),
            session_notes: self.session_notes.unwrap_or_else(empty_object),
            session_rating: self.session_rating.unwrap_or_else(empty_object),
            data_quality: self.data_quality.unwrap_or_default(),
        })
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// 의사의 결과 데이터 정정 요청: `PUT /api/vr-data/{id}`
///
/// 공포 점수나 생체 신호를 고치면 파생 지표도 다시 계산됩니다.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVrDataRequest {
    pub fear_scores: Option<FearScores>,
    pub biometric_data: Option<BiometricData>,
    pub exposure_metrics: Option<Value>,
    pub session_notes: Option<Value>,
    pub session_rating: Option<Value>,
    pub data_quality: Option<DataQuality>,
}

/// 환자별 VR 이력 필터: `GET /api/vr-data/patient/{patient_id}?phobiaType=...`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientHistoryQuery {
    pub phobia_type: Option<super::PhobiaType>,
}
