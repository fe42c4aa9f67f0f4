//! # VR 노출치료 클리닉 서버 진입점
//!
//! 이 파일이 수행하는 작업:
//! 1. 환경변수(.env) 로딩
//! 2. 로깅(tracing) 초기화
//! 3. SQLite 데이터베이스 연결 풀 생성과 마이그레이션
//! 4. VR 시나리오 실행기 준비
//! 5. 방치된 세션 정리 작업 시작 (설정된 경우)
//! 6. API 라우터와 프론트엔드 정적 파일 서빙 설정
//! 7. HTTP 서버 시작

mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use std::{path::Path, str::FromStr, sync::Arc};

use anyhow::Result;
use axum::Router;
use config::Config;
use routes::{api_router, AppState};
use services::{runner::ProcessScenarioRunner, sweep};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1단계: 환경변수 로딩 ──
    // .env 파일이 없어도 시스템 환경변수만으로 동작합니다.
    dotenvy::dotenv().ok();

    // ── 2단계: 로깅 초기화 ──
    // RUST_LOG가 없으면 서버, tower_http, axum 모듈을 debug 레벨로 출력합니다.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vrtherapy=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 3단계: 설정 로딩 ──
    let config = Config::from_env()?;
    tracing::info!("Starting VR therapy server on {}:{}", config.host, config.port);

    // ── 4단계: SQLite 연결 풀 ──
    // create_if_missing: DB 파일이 없으면 새로 만듭니다.
    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    // ── 5단계: VR 실행기 ──
    if config.vr_executable.is_none() {
        tracing::warn!("VR_EXECUTABLE is not set, session launches will fail");
    }
    let runner = ProcessScenarioRunner::new(
        config.vr_executable.clone(),
        config.vr_working_dir.clone(),
    );

    let state = AppState {
        pool: pool.clone(),
        jwt_secret: config.jwt_secret.clone(),
        runner: Arc::new(runner),
    };

    // ── 6단계: 방치된 "In Progress" 세션 정리 ──
    // 타임아웃이 설정되지 않으면 세션은 운영자가 직접 확인합니다.
    if let Some(minutes) = config.session_timeout_minutes {
        tracing::info!(
            "Abandoned-session sweep enabled: timeout {} min, every {:?}",
            minutes,
            config.sweep_interval
        );
        sweep::spawn_sweeper(pool.clone(), minutes, config.sweep_interval);
    }

    // ── 7단계: CORS 설정 ──
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 8단계: 라우터 구성 ──
    // 의사용 대시보드 프론트엔드가 빌드되어 있으면 같은 서버에서 서빙합니다.
    let frontend_dist = Path::new(&config.frontend_dist);
    let app = if frontend_dist.exists() {
        tracing::info!("Serving frontend static files from {}", config.frontend_dist);

        // SPA이므로 찾을 수 없는 경로는 index.html로 돌려보냅니다
        let serve_dir = ServeDir::new(frontend_dist)
            .not_found_service(ServeFile::new(frontend_dist.join("index.html")));

        Router::new()
            .nest("/api", api_router(state))
            .fallback_service(serve_dir)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    } else {
        tracing::warn!("Frontend dist directory not found, serving API only");

        Router::new()
            .nest("/api", api_router(state))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    };

    // ── 9단계: 서버 시작 ──
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
