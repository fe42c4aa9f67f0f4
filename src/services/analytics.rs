//! # 분석 집계기
//!
//! 한 의사의 VR 결과 레코드를 대시보드용 요약으로 접습니다.
//! DB 조회(`db::list_analytics_records`)가 이미 의사/기간/환자로 걸러오지만,
//! 집계 자체도 `doctor_id`를 다시 확인합니다. 다른 의사의 레코드가 섞여
//! 들어와도 결과에는 절대 반영되지 않습니다.

use std::collections::BTreeMap;

use crate::models::{Analytics, AnalyticsRecord, BiometricInsights, PhobiaBreakdown, TrendPoint};

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn aggregate(doctor_id: &str, records: &[AnalyticsRecord]) -> Analytics {
    let scoped: Vec<&AnalyticsRecord> = records
        .iter()
        .filter(|record| record.doctor_id == doctor_id)
        .collect();

    let total = scoped.len();
    let improvement_sum: f64 = scoped
        .iter()
        .map(|r| r.data.improvement_percentage)
        .sum();
    let effectiveness_sum: f64 = scoped.iter().map(|r| r.data.effectiveness_score).sum();

    // 공포증별 (개수, 개선율 합)
    let mut phobia_totals = BTreeMap::new();
    let mut session_type_breakdown = BTreeMap::new();
    for record in &scoped {
        let entry = phobia_totals.entry(record.phobia_type).or_insert((0usize, 0.0f64));
        entry.0 += 1;
        entry.1 += record.data.improvement_percentage;
        *session_type_breakdown.entry(record.session_type).or_insert(0usize) += 1;
    }
    let phobia_breakdown = phobia_totals
        .into_iter()
        .map(|(phobia, (count, sum))| {
            (
                phobia,
                PhobiaBreakdown {
                    session_count: count,
                    average_improvement: mean(sum, count),
                },
            )
        })
        .collect();

    let mut improvement_trend: Vec<TrendPoint> = scoped
        .iter()
        .map(|r| TrendPoint {
            date: r.data.session_start_time.clone(),
            improvement: r.data.improvement_percentage,
            fear_score_reduction: r.data.fear_scores.initial - r.data.fear_scores.final_score,
        })
        .collect();
    // 저장 형식이 고정 길이 UTC 문자열이므로 문자열 정렬이 곧 시간순
    improvement_trend.sort_by(|a, b| a.date.cmp(&b.date));

    let heart_rate_reductions: Vec<f64> = scoped
        .iter()
        .filter_map(|r| r.data.biometric_data.heart_rate)
        .map(|pair| pair.initial - pair.final_value)
        .collect();
    let biometric_insights = BiometricInsights {
        average_heart_rate_reduction: mean(
            heart_rate_reductions.iter().sum(),
            heart_rate_reductions.len(),
        ),
        stress_reduction_sessions: heart_rate_reductions.iter().filter(|r| **r > 0.0).count(),
    };

    Analytics {
        total_sessions: total,
        average_improvement: mean(improvement_sum, total),
        average_effectiveness: mean(effectiveness_sum, total),
        phobia_breakdown,
        session_type_breakdown,
        improvement_trend,
        biometric_insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use serde_json::json;

    fn record(
        doctor_id: &str,
        phobia_type: PhobiaType,
        start: &str,
        fear: (f64, f64),
        heart_rate: Option<(f64, f64)>,
    ) -> AnalyticsRecord {
        let fear_scores = FearScores {
            initial: fear.0,
            final_score: fear.1,
        };
        let biometric_data = BiometricData {
            heart_rate: heart_rate.map(|(initial, final_value)| BiometricPair {
                initial,
                final_value,
            }),
            skin_conductance: None,
        };
        let outcome = crate::services::outcome::compute(&fear_scores, &biometric_data);
        AnalyticsRecord {
            doctor_id: doctor_id.to_string(),
            phobia_type,
            session_type: SessionType::ExposureTherapy,
            data: VrSessionData {
                id: format!("vr-{start}"),
                session_id: format!("s-{start}"),
                patient_id: "p1".to_string(),
                session_start_time: start.to_string(),
                session_end_time: start.to_string(),
                total_duration: 20.0,
                fear_scores,
                biometric_data,
                vr_interaction_data: VrInteractionData::default(),
                exposure_metrics: json!({}),
                session_notes: json!({}),
                session_rating: json!({}),
                data_quality: DataQuality::default(),
                improvement_percentage: outcome.improvement_percentage,
                effectiveness_score: outcome.effectiveness_score,
                revision: 0,
                created_at: start.to_string(),
                updated_at: start.to_string(),
            },
        }
    }

    #[test]
    fn empty_scope_yields_zeros() {
        let analytics = aggregate("doc-a", &[]);
        assert_eq!(analytics, Analytics::default());
        assert_eq!(analytics.average_improvement, 0.0);
        assert!(analytics.improvement_trend.is_empty());
    }

    #[test]
    fn other_doctors_records_are_ignored() {
        let records = vec![
            record("doc-a", PhobiaType::Arachnophobia, "2026-03-02T10:00:00.000Z", (8.0, 3.0), None),
            record("doc-b", PhobiaType::Aerophobia, "2026-03-01T10:00:00.000Z", (10.0, 0.0), None),
        ];
        let analytics = aggregate("doc-a", &records);
        assert_eq!(analytics.total_sessions, 1);
        assert_eq!(analytics.average_improvement, 62.5);
        assert!(!analytics.phobia_breakdown.contains_key(&PhobiaType::Aerophobia));
    }

    #[test]
    fn breakdowns_and_trend_are_grouped_and_sorted() {
        let records = vec![
            record("doc-a", PhobiaType::Cynophobia, "2026-03-05T10:00:00.000Z", (10.0, 5.0), Some((100.0, 90.0))),
            record("doc-a", PhobiaType::Cynophobia, "2026-03-01T10:00:00.000Z", (8.0, 6.0), Some((90.0, 95.0))),
            record("doc-a", PhobiaType::Claustrophobia, "2026-03-03T10:00:00.000Z", (4.0, 1.0), None),
        ];
        let analytics = aggregate("doc-a", &records);

        assert_eq!(analytics.total_sessions, 3);
        let dogs = &analytics.phobia_breakdown[&PhobiaType::Cynophobia];
        assert_eq!(dogs.session_count, 2);
        assert_eq!(dogs.average_improvement, (50.0 + 25.0) / 2.0);
        assert_eq!(analytics.session_type_breakdown[&SessionType::ExposureTherapy], 3);

        let dates: Vec<_> = analytics.improvement_trend.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(
            dates,
            ["2026-03-01T10:00:00.000Z", "2026-03-03T10:00:00.000Z", "2026-03-05T10:00:00.000Z"]
        );
        assert_eq!(analytics.improvement_trend[0].fear_score_reduction, 2.0);

        assert_eq!(analytics.biometric_insights.average_heart_rate_reduction, 2.5);
        assert_eq!(analytics.biometric_insights.stress_reduction_sessions, 1);
    }
}
