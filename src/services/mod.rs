//! # 비즈니스 로직 모듈
//!
//! HTTP와 무관한 핵심 로직입니다. 라우트 핸들러는 요청을 해석하고 권한을
//! 확인한 뒤 이 모듈의 함수를 호출합니다.
//!
//! - `analytics`: 결과 레코드 집계 (순수 함수)
//! - `handshake`: VR 런타임과의 설정 조회/실행/결과 제출
//! - `lifecycle`: 세션 상태 전이 (compare-and-swap)
//! - `outcome`: 개선율, 효과 점수 계산 (순수 함수)
//! - `runner`: VR 시나리오 실행기 트레이트와 프로세스 구현
//! - `sweep`: 방치된 "In Progress" 세션 정리
//! - `token`: 세션 토큰, 환자 코드 발급

pub mod analytics;
pub mod handshake;
pub mod lifecycle;
pub mod outcome;
pub mod runner;
pub mod sweep;
pub mod token;
