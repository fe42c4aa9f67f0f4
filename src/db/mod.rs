//! # 데이터베이스 접근 계층 (Data Access Layer)
//!
//! 데이터베이스와 직접 상호작용하는 함수들을 모아둔 모듈입니다.
//! 서비스(services/)와 라우트 핸들러(routes/)가 이 모듈의 함수를 호출합니다.
//!
//! 각 하위 모듈:
//! - `doctors`: 의사 계정 쿼리
//! - `patients`: 환자 레코드 쿼리 (환자 코드 발급 포함)
//! - `ratings`: Unity 자극 평가 저장
//! - `sessions`: 치료 세션 쿼리 (토큰 발급, 조건부 상태 변경)
//! - `vr_data`: VR 결과 데이터와 분석용 조회

pub mod doctors;
pub mod patients;
pub mod ratings;
pub mod sessions;
pub mod vr_data;

// 세션/환자/결과 데이터 함수는 `crate::db::get_session`처럼 바로 접근합니다.
// 의사/평가 함수는 이름이 겹치지 않도록 `db::doctors::find_by_id`처럼 씁니다.
pub use patients::*;
pub use sessions::*;
pub use vr_data::*;
