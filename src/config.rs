//! # 애플리케이션 설정(Configuration) 모듈
//!
//! 환경변수에서 서버 설정값을 읽어오는 모듈입니다.
//! `.env` 파일이나 시스템 환경변수에서 값을 가져옵니다.
//!
//! 설정 항목:
//! - `DATABASE_URL`: SQLite 데이터베이스 경로 (필수)
//! - `JWT_SECRET`: JWT 토큰 서명에 사용할 비밀키 (필수)
//! - `HOST`, `PORT`: 서버 바인딩 주소와 포트
//! - `FRONTEND_DIST`: 빌드된 프론트엔드 정적 파일 디렉토리
//! - `VR_EXECUTABLE`, `VR_WORKING_DIR`: VR 시나리오 실행 파일과 작업 디렉토리
//! - `SESSION_TIMEOUT_MINUTES`: 방치된 "In Progress" 세션 정리 기준 (없으면 비활성)
//! - `SWEEP_INTERVAL_SECS`: 정리 작업 주기

use std::env;
use std::time::Duration;

/// 애플리케이션 전체 설정을 담는 구조체
///
/// 서버 시작 시 환경변수에서 한 번 읽어온 후,
/// 애플리케이션 전체에서 공유됩니다.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 데이터베이스 파일 경로 (예: "sqlite:data/vrtherapy.db")
    pub database_url: String,
    /// JWT 토큰 서명/검증에 사용하는 비밀키
    pub jwt_secret: String,
    /// 서버가 바인딩할 호스트 주소 (기본값: "0.0.0.0")
    pub host: String,
    /// 서버 포트 번호 (기본값: 5000)
    pub port: u16,
    /// 프론트엔드 빌드 결과 디렉토리 (기본값: "../frontend/dist")
    pub frontend_dist: String,
    /// VR 시나리오 실행 파일 경로: 없으면 모든 실행 요청이 LaunchFailed
    pub vr_executable: Option<String>,
    /// 실행 파일의 작업 디렉토리
    pub vr_working_dir: Option<String>,
    /// 이 시간(분)보다 오래 "In Progress"인 세션을 Interrupted로 정리
    pub session_timeout_minutes: Option<i64>,
    /// 정리 작업 주기 (기본값: 60초)
    pub sweep_interval: Duration,
}

impl Config {
    /// 환경변수에서 설정값을 읽어 Config 인스턴스를 생성합니다.
    ///
    /// # 에러
    /// `DATABASE_URL`과 `JWT_SECRET`은 필수이며, 없으면 에러가 발생합니다.
    /// 나머지 설정은 기본값이 있고, 숫자 파싱에 실패해도 기본값을 사용합니다.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            frontend_dist: env::var("FRONTEND_DIST")
                .unwrap_or_else(|_| "../frontend/dist".to_string()),
            // 빈 문자열은 설정하지 않은 것으로 취급합니다
            vr_executable: non_empty(env::var("VR_EXECUTABLE").ok()),
            vr_working_dir: non_empty(env::var("VR_WORKING_DIR").ok()),
            session_timeout_minutes: env::var("SESSION_TIMEOUT_MINUTES")
                .ok()
                .and_then(|value| value.parse::<i64>().ok())
                .filter(|minutes| *minutes > 0),
            sweep_interval: Duration::from_secs(
                env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|value| value.parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(60),
            ),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
