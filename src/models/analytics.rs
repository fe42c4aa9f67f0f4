//! # 분석(Analytics) 모델 정의
//!
//! `GET /api/vr-data/analytics`의 쿼리 파라미터와 응답 구조체입니다.
//! 응답은 요청 시점마다 원본 레코드에서 다시 계산되며 저장되지 않습니다.

use std::collections::BTreeMap;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use super::{PhobiaType, SessionType, VrSessionData};

/// 분석 기간: 알 수 없는 값이면 기본값(3개월)을 사용합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Timeframe {
    #[serde(rename = "1month")]
    OneMonth,
    #[default]
    #[serde(rename = "3months")]
    ThreeMonths,
    #[serde(rename = "6months")]
    SixMonths,
    #[serde(rename = "1year")]
    OneYear,
}

impl Timeframe {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("1month") => Timeframe::OneMonth,
            Some("6months") => Timeframe::SixMonths,
            Some("1year") => Timeframe::OneYear,
            _ => Timeframe::ThreeMonths,
        }
    }

    /// `now`에서 기간만큼 거슬러 올라간 시작 시각
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            Timeframe::OneMonth => 1,
            Timeframe::ThreeMonths => 3,
            Timeframe::SixMonths => 6,
            Timeframe::OneYear => 12,
        };
        now.checked_sub_months(Months::new(months)).unwrap_or(now)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub timeframe: Option<String>,
    pub patient_id: Option<String>,
}

/// 집계 입력 한 건: 결과 데이터와 연결된 세션의 분류 정보
#[derive(Debug, Clone)]
pub struct AnalyticsRecord {
    pub doctor_id: String,
    pub phobia_type: PhobiaType,
    pub session_type: SessionType,
    pub data: VrSessionData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhobiaBreakdown {
    pub session_count: usize,
    pub average_improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: String,
    pub improvement: f64,
    pub fear_score_reduction: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricInsights {
    pub average_heart_rate_reduction: f64,
    pub stress_reduction_sessions: usize,
}

/// 분석 결과: 빈 범위에서도 0과 빈 컬렉션으로 채워집니다 (NaN 없음).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_sessions: usize,
    pub average_improvement: f64,
    pub average_effectiveness: f64,
    pub phobia_breakdown: BTreeMap<PhobiaType, PhobiaBreakdown>,
    pub session_type_breakdown: BTreeMap<SessionType, usize>,
    pub improvement_trend: Vec<TrendPoint>,
    pub biometric_insights: BiometricInsights,
}
