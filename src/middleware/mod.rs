//! # 미들웨어 모듈
//!
//! - `auth`: JWT Bearer 토큰으로 의사를 인증하는 `AuthDoctor` 추출기

pub mod auth;
