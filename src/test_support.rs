//! 테스트 공용 도우미: 인메모리 DB, 시드 데이터, 가짜 VR 실행기

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::oneshot;
use tower::ServiceExt;

use crate::db;
use crate::middleware::auth::create_access_token;
use crate::models::*;
use crate::routes::{api_router, AppState};
use crate::services::runner::{LaunchError, LaunchHandle, ScenarioRunner};

pub const TEST_SECRET: &str = "test-secret";

/// 마이그레이션이 적용된 인메모리 SQLite 풀
///
/// 연결이 닫히면 인메모리 DB도 사라지므로 연결 하나를 계속 유지합니다.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

/// 여러 연결이 동시에 쓰는 경우를 위한 파일 기반 풀 (WAL, busy timeout)
///
/// 운영 풀처럼 트랜잭션들이 실제로 겹칩니다. 끝나면 `remove_file_pool`로 정리합니다.
pub async fn file_pool(max_connections: u32) -> (SqlitePool, PathBuf) {
    let path = std::env::temp_dir().join(format!("vrtherapy-test-{}.db", uuid::Uuid::now_v7()));
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .expect("file database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    (pool, path)
}

pub async fn remove_file_pool(pool: SqlitePool, path: PathBuf) {
    pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.clone().into_os_string();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

pub async fn seed_doctor(pool: &SqlitePool, email: &str) -> Doctor {
    let id = uuid::Uuid::now_v7().to_string();
    let license = format!("LIC-{id}");
    db::doctors::create_doctor(
        pool,
        &id,
        &db::doctors::NewDoctor {
            name: "Dr. Test",
            email,
            password_hash: "not-a-real-hash",
            specialization: Specialization::PhobiaTreatment,
            license_number: &license,
            phone: "555-0100",
        },
    )
    .await
    .expect("seed doctor")
}

pub fn patient_request() -> CreatePatientRequest {
    CreatePatientRequest {
        name: "Alex Kim".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12).expect("valid date"),
        gender: Gender::Other,
        email: None,
        phone: "555-0101".to_string(),
        emergency_contact: EmergencyContact {
            name: "Sam Kim".to_string(),
            relationship: "Sibling".to_string(),
            phone: "555-0102".to_string(),
        },
        phobias: vec![PatientPhobia {
            phobia_type: PhobiaType::Arachnophobia,
            severity: 7,
            description: None,
        }],
        notes: None,
    }
}

pub async fn seed_patient(pool: &SqlitePool, doctor_id: &str) -> Patient {
    db::create_patient(pool, doctor_id, &patient_request())
        .await
        .expect("seed patient")
}

/// 공포 점수 8로 시작하는 거미 공포증 노출 세션 요청
pub fn session_request(patient_id: &str) -> CreateSessionRequest {
    CreateSessionRequest {
        patient_id: patient_id.to_string(),
        session_type: SessionType::ExposureTherapy,
        phobia_type: PhobiaType::Arachnophobia,
        vr_scenario: VrScenario {
            name: "Spider Room".to_string(),
            description: None,
            difficulty: Difficulty::Beginner,
            environment: Environment::SpiderRoom,
        },
        session_config: SessionConfig::default(),
        pre_session_data: PreSessionData {
            fear_score: 8.0,
            anxiety_level: Some(6.0),
            notes: None,
        },
        scheduled_date_time: Utc::now() + Duration::days(1),
        notes: None,
    }
}

pub async fn seed_session(pool: &SqlitePool, doctor_id: &str, patient_id: &str) -> TherapySession {
    db::create_session(pool, doctor_id, &session_request(patient_id))
        .await
        .expect("seed session")
}

/// 새 의사와 환자를 만들고 그 환자의 Scheduled 세션을 반환합니다.
pub async fn seed_scheduled_session(pool: &SqlitePool) -> TherapySession {
    let email = format!("{}@clinic.test", uuid::Uuid::now_v7());
    let doctor = seed_doctor(pool, &email).await;
    let patient = seed_patient(pool, &doctor.id).await;
    seed_session(pool, &doctor.id, &patient.id).await
}

pub fn telemetry_request(token: &str, initial: f64, final_score: f64) -> SubmitTelemetryRequest {
    serde_json::from_value(json!({
        "sessionToken": token,
        "sessionStartTime": "2026-03-01T09:00:00Z",
        "sessionEndTime": "2026-03-01T09:25:00Z",
        "totalDuration": 25,
        "fearScores": { "initial": initial, "final": final_score },
        "biometricData": {
            "heartRate": { "initial": 110, "final": 88 }
        },
        "vrInteractionData": {
            "interactions": [
                { "timestamp": "00:03:10", "objectId": "spider-1", "interactionType": "approach" }
            ]
        }
    }))
    .expect("telemetry payload")
}

#[derive(Debug, Clone, Copy)]
pub enum StubBehavior {
    /// `start` 자체가 실패
    RefuseToStart,
    /// 시작 후 정상 종료
    ExitOk,
    /// 시작 후 비정상 종료를 보고
    ExitWithError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchCall {
    pub token: String,
    pub scenario_name: String,
    pub patient_identifier: String,
}

/// 프로세스를 띄우지 않고 호출만 기록하는 실행기
pub struct StubRunner {
    behavior: StubBehavior,
    calls: Mutex<Vec<LaunchCall>>,
}

impl StubRunner {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<LaunchCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl ScenarioRunner for StubRunner {
    fn start(
        &self,
        token: &str,
        scenario_name: &str,
        patient_identifier: &str,
    ) -> Result<LaunchHandle, LaunchError> {
        self.calls.lock().expect("calls lock").push(LaunchCall {
            token: token.to_string(),
            scenario_name: scenario_name.to_string(),
            patient_identifier: patient_identifier.to_string(),
        });

        let (tx, rx) = oneshot::channel();
        match self.behavior {
            StubBehavior::RefuseToStart => return Err(LaunchError::NotConfigured),
            StubBehavior::ExitOk => {
                let _ = tx.send(Ok(()));
            }
            StubBehavior::ExitWithError => {
                let _ = tx.send(Err(LaunchError::ExitStatus("exit status: 1".to_string())));
            }
        }

        Ok(LaunchHandle {
            pid: None,
            exit: rx,
        })
    }
}

/// 테스트 DB와 가짜 실행기로 만든 API 라우터
pub fn test_app(pool: &SqlitePool, runner: Arc<StubRunner>) -> Router {
    api_router(AppState {
        pool: pool.clone(),
        jwt_secret: TEST_SECRET.to_string(),
        runner,
    })
}

pub fn bearer(doctor_id: &str) -> String {
    create_access_token(doctor_id, TEST_SECRET).expect("test token")
}

/// 라우터에 요청 한 건을 보내고 (상태 코드, JSON 본문)을 돌려줍니다.
///
/// 본문이 비어 있으면 `Value::Null`입니다.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    send_request(app, request).await
}

pub async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}
