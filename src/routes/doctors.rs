//! # 의사 계정 라우트 핸들러
//!
//! ## 엔드포인트
//! - `POST /api/doctors/register`  → 회원가입 (201 + 토큰)
//! - `POST /api/doctors/login`     → 로그인 (토큰 발급, 마지막 로그인 시각 갱신)
//! - `GET  /api/doctors/profile`   → 내 프로필
//! - `PUT  /api/doctors/profile`   → 프로필 수정 (새 토큰 발급)
//! - `GET  /api/doctors/dashboard` → 대시보드 요약
//! - `GET  /api/doctors/patients-summary` → 활성 환자별 세션 수와 마지막 세션
//!
//! 비밀번호는 Argon2id로 해시하며, 응답에는 절대 포함되지 않습니다
//! (`DoctorResponse`에 해당 필드가 없음).

use std::collections::BTreeMap;

use crate::{
    db::{self, doctors as db_doctors},
    error::AppError,
    middleware::auth::{create_access_token, AuthDoctor},
    models::*,
    routes::{AppJson, AppState},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};

const MIN_PASSWORD_LEN: usize = 6;
const DASHBOARD_UPCOMING: i64 = 5;
const DASHBOARD_RECENT: i64 = 5;

/// Argon2id 해시 (랜덤 솔트)
fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();
    Ok(hash)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|text| !text.is_empty())
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    // Validate input
    let email = req.email.trim().to_lowercase();
    if req.name.trim().is_empty() || req.license_number.trim().is_empty() || req.phone.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "Name, license number and phone are required".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(AppError::ValidationFailed("Invalid email address".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::ValidationFailed(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    // Check for an existing account
    if db_doctors::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::Conflict("Doctor with this email already exists".to_string()));
    }
    if db_doctors::find_by_license(&state.pool, req.license_number.trim())
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Doctor with this license number already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;

    let doctor_id = uuid::Uuid::now_v7().to_string();
    let doctor = db_doctors::create_doctor(
        &state.pool,
        &doctor_id,
        &db_doctors::NewDoctor {
            name: req.name.trim(),
            email: &email,
            password_hash: &password_hash,
            specialization: req.specialization,
            license_number: req.license_number.trim(),
            phone: req.phone.trim(),
        },
    )
    .await?;

    let token = create_access_token(&doctor.id, &state.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    tracing::info!(doctor_id = %doctor.id, "doctor registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            doctor: doctor.into(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = req.email.trim().to_lowercase();
    let doctor = db_doctors::find_by_email(&state.pool, &email)
        .await?
        .ok_or(AppError::Unauthorized("Invalid email or password".to_string()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&doctor.password_hash)
        .map_err(|e| AppError::Internal(format!("Password hash parse error: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !doctor.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".to_string()));
    }

    db_doctors::touch_last_login(&state.pool, &doctor.id).await?;
    let doctor = db_doctors::find_by_id(&state.pool, &doctor.id)
        .await?
        .ok_or(AppError::Internal("Doctor disappeared during login".to_string()))?;

    let token = create_access_token(&doctor.id, &state.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    Ok(Json(AuthResponse {
        doctor: doctor.into(),
        token,
    }))
}

pub async fn profile(auth: AuthDoctor) -> Json<DoctorResponse> {
    Json(auth.doctor.into())
}

/// `PUT /doctors/profile`: 보낸 필드만 바꾸고 새 토큰과 함께 돌려줍니다.
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthDoctor,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = non_blank(&req.email).map(str::to_lowercase);
    if let Some(email) = &email {
        if !email.contains('@') {
            return Err(AppError::ValidationFailed("Invalid email address".to_string()));
        }
        if let Some(existing) = db_doctors::find_by_email(&state.pool, email).await? {
            if existing.id != auth.id() {
                return Err(AppError::Conflict(
                    "Doctor with this email already exists".to_string(),
                ));
            }
        }
    }

    let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) if password.len() < MIN_PASSWORD_LEN => {
            return Err(AppError::ValidationFailed(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let doctor = db_doctors::update_doctor(
        &state.pool,
        auth.id(),
        &db_doctors::DoctorChanges {
            name: non_blank(&req.name),
            email: email.as_deref(),
            specialization: req.specialization,
            phone: non_blank(&req.phone),
            password_hash: password_hash.as_deref(),
        },
    )
    .await?;

    let token = create_access_token(&doctor.id, &state.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    tracing::info!(
        doctor_id = %doctor.id,
        password_changed = password_hash.is_some(),
        "doctor profile updated"
    );

    Ok(Json(AuthResponse {
        doctor: doctor.into(),
        token,
    }))
}

pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthDoctor,
) -> Result<Json<Dashboard>, AppError> {
    let doctor_id = auth.id();
    let now = Utc::now();
    let week_ago = format_timestamp(now - Duration::days(7));

    let average = db::average_completed_improvement(&state.pool, doctor_id).await?;
    let stats = DashboardStats {
        total_patients: db::count_active_patients(&state.pool, doctor_id).await?,
        total_sessions: db::count_sessions(&state.pool, doctor_id, None).await?,
        sessions_this_week: db::count_sessions(&state.pool, doctor_id, Some(&week_ago)).await?,
        average_improvement: (average * 100.0).round() / 100.0,
    };

    let upcoming_sessions = db::list_upcoming_sessions(
        &state.pool,
        doctor_id,
        &format_timestamp(now),
        DASHBOARD_UPCOMING,
    )
    .await?
    .into_iter()
    .map(SessionResponse::from)
    .collect();

    let recent_session_data =
        db::list_recent_vr_data(&state.pool, doctor_id, DASHBOARD_RECENT).await?;

    // 활성 환자의 공포증 분포
    let mut counts: BTreeMap<PhobiaType, usize> = BTreeMap::new();
    let patients = db::list_patients(&state.pool, doctor_id, &PatientListQuery::default()).await?;
    for patient in patients {
        for phobia in patient.phobias.iter() {
            *counts.entry(phobia.phobia_type).or_insert(0) += 1;
        }
    }
    let mut phobia_distribution: Vec<PhobiaCount> = counts
        .into_iter()
        .map(|(phobia_type, count)| PhobiaCount { phobia_type, count })
        .collect();
    phobia_distribution.sort_by(|a, b| b.count.cmp(&a.count));

    Ok(Json(Dashboard {
        stats,
        upcoming_sessions,
        recent_session_data,
        phobia_distribution,
    }))
}

/// `GET /doctors/patients-summary`: 활성 환자마다 세션 수와 마지막 세션 생성 시각
pub async fn patients_summary(
    State(state): State<AppState>,
    auth: AuthDoctor,
) -> Result<Json<Vec<PatientSummary>>, AppError> {
    let patients =
        db::list_patients(&state.pool, auth.id(), &PatientListQuery::default()).await?;
    let stats = db::patient_session_stats(&state.pool, auth.id()).await?;

    let summary = patients
        .into_iter()
        .map(|patient| {
            let patient_stats = stats.get(&patient.id);
            PatientSummary::new(patient, patient_stats)
        })
        .collect();
    Ok(Json(summary))
}
