//! # 헬스체크(Health Check) 핸들러
//!
//! ## 엔드포인트
//! - `GET /api/health` → `{ "status": "ok", "message": ..., "timestamp": ... }`
//!
//! 인증이 필요 없고 DB에도 접근하지 않습니다.

use axum::Json;
use serde_json::{json, Value};

use crate::models::now_timestamp;

/// `GET /health`: 서버 상태를 확인합니다.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "VR therapy server is running",
        "timestamp": now_timestamp()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_ok_with_timestamp() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_str().is_some());
    }
}
