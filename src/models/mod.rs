//! # 데이터 모델 모듈
//!
//! 애플리케이션에서 사용하는 데이터 구조체(struct)와 열거형(enum)을 정의합니다.
//! - `analytics`: 분석 기간, 집계 결과 구조체
//! - `doctor`: 의사 계정과 인증 요청/응답
//! - `handshake`: VR 런타임에 넘기는 설정 스냅샷
//! - `patient`: 환자 레코드
//! - `rating`: Unity 자극 평가
//! - `session`: 치료 세션 엔티티, 상태 열거형, 요청 구조체
//! - `timestamp`: 저장용 UTC 타임스탬프 유틸리티
//! - `vr_data`: VR 세션 결과 데이터와 텔레메트리 검증
//!
//! `pub use X::*;`로 재공개하여 `crate::models::TherapySession`처럼 짧게 접근합니다.

pub mod analytics;
pub mod doctor;
pub mod handshake;
pub mod patient;
pub mod rating;
pub mod session;
pub mod timestamp;
pub mod vr_data;

pub use analytics::*;
pub use doctor::*;
pub use handshake::*;
pub use patient::*;
pub use rating::*;
pub use session::*;
pub use timestamp::*;
pub use vr_data::*;
