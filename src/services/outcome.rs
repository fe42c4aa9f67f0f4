//! # 결과 계산 엔진
//!
//! 텔레메트리 제출 시점에 두 파생 지표를 계산합니다.
//!
//! - **개선율** `(initial - final) / initial × 100`. `initial`이 0이면 0입니다.
//!   공포가 늘어난 경우 음수가 될 수 있으며 그대로 저장합니다.
//! - **효과 점수** (0~100):
//!   ```text
//!   fear      = clamp(개선율, 0, 100)
//!   reduction = clamp((initial - final) / initial × 100, 0, 100)   // 생체 신호마다
//!   score     = 0.7 × fear + 0.3 × mean(reduction)   // 생체 신호가 있을 때
//!             = fear                                 // 없을 때
//!   ```

use crate::error::AppError;
use crate::models::{
    validate_biometrics, validate_fear_scores, BiometricData, BiometricPair, FearScores, Outcome,
    UpdateVrDataRequest, VrSessionData,
};

const FEAR_WEIGHT: f64 = 0.7;
const BIOMETRIC_WEIGHT: f64 = 0.3;

pub fn improvement_percentage(scores: &FearScores) -> f64 {
    if scores.initial == 0.0 {
        return 0.0;
    }
    (scores.initial - scores.final_score) / scores.initial * 100.0
}

/// 생체 신호 한 쌍의 감소율(%): 0~100으로 제한
fn reduction_percentage(pair: &BiometricPair) -> f64 {
    if pair.initial <= 0.0 {
        return 0.0;
    }
    ((pair.initial - pair.final_value) / pair.initial * 100.0).clamp(0.0, 100.0)
}

pub fn effectiveness_score(scores: &FearScores, biometrics: &BiometricData) -> f64 {
    let fear = improvement_percentage(scores).clamp(0.0, 100.0);

    let reductions: Vec<f64> = [biometrics.heart_rate, biometrics.skin_conductance]
        .iter()
        .flatten()
        .map(reduction_percentage)
        .collect();

    let score = if reductions.is_empty() {
        fear
    } else {
        let mean = reductions.iter().sum::<f64>() / reductions.len() as f64;
        FEAR_WEIGHT * fear + BIOMETRIC_WEIGHT * mean
    };

    score.clamp(0.0, 100.0)
}

pub fn compute(scores: &FearScores, biometrics: &BiometricData) -> Outcome {
    Outcome {
        improvement_percentage: improvement_percentage(scores),
        effectiveness_score: effectiveness_score(scores, biometrics),
    }
}

/// 의사의 정정 요청을 레코드에 반영합니다.
///
/// 공포 점수나 생체 신호가 바뀌면 두 파생 지표를 다시 계산합니다.
/// 메모, 평가, 노출 지표, 데이터 품질만 바꾸면 파생 지표는 그대로입니다.
pub fn apply_correction(
    data: &mut VrSessionData,
    req: UpdateVrDataRequest,
) -> Result<(), AppError> {
    let mut rescore = false;

    if let Some(scores) = req.fear_scores {
        validate_fear_scores(&scores)?;
        data.fear_scores = scores;
        rescore = true;
    }
    if let Some(biometrics) = req.biometric_data {
        validate_biometrics(&biometrics)?;
        data.biometric_data = biometrics;
        rescore = true;
    }
    if let Some(metrics) = req.exposure_metrics {
        data.exposure_metrics = metrics;
    }
    if let Some(notes) = req.session_notes {
        data.session_notes = notes;
    }
    if let Some(rating) = req.session_rating {
        data.session_rating = rating;
    }
    if let Some(quality) = req.data_quality {
        data.data_quality = quality;
    }

    if rescore {
        let outcome = compute(&data.fear_scores, &data.biometric_data);
        data.improvement_percentage = outcome.improvement_percentage;
        data.effectiveness_score = outcome.effectiveness_score;
    }

    Ok(())
}
