use crate::error::AppError;
use crate::models::{Doctor, Specialization};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

pub struct NewDoctor<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub specialization: Specialization,
    pub license_number: &'a str,
    pub phone: &'a str,
}

/// 프로필 수정분: `None`인 필드는 그대로 둡니다.
#[derive(Default)]
pub struct DoctorChanges<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub specialization: Option<Specialization>,
    pub phone: Option<&'a str>,
    pub password_hash: Option<&'a str>,
}

pub async fn create_doctor(
    pool: &SqlitePool,
    id: &str,
    doctor: &NewDoctor<'_>,
) -> Result<Doctor, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO doctors (id, name, email, password_hash, specialization, license_number, phone)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(doctor.name)
    .bind(doctor.email)
    .bind(doctor.password_hash)
    .bind(doctor.specialization)
    .bind(doctor.license_number)
    .bind(doctor.phone)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict(
                "Doctor with this email or license number already exists".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    find_by_id(pool, id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created doctor".to_string()))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Doctor>, AppError> {
    let doctor = sqlx::query_as::<_, Doctor>(
        r#"
        SELECT id, name, email, password_hash, specialization, license_number, phone,
               is_active, last_login, created_at, updated_at
        FROM doctors
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(doctor)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Doctor>, AppError> {
    let doctor = sqlx::query_as::<_, Doctor>(
        r#"
        SELECT id, name, email, password_hash, specialization, license_number, phone,
               is_active, last_login, created_at, updated_at
        FROM doctors
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(doctor)
}

pub async fn find_by_license(
    pool: &SqlitePool,
    license_number: &str,
) -> Result<Option<Doctor>, AppError> {
    let doctor = sqlx::query_as::<_, Doctor>(
        r#"
        SELECT id, name, email, password_hash, specialization, license_number, phone,
               is_active, last_login, created_at, updated_at
        FROM doctors
        WHERE license_number = ?
        "#,
    )
    .bind(license_number)
    .fetch_optional(pool)
    .await?;

    Ok(doctor)
}

pub async fn touch_last_login(pool: &SqlitePool, id: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE doctors
        SET last_login = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// 프로필을 부분 수정하고 갱신된 계정을 반환합니다.
///
/// 이메일이 다른 계정과 겹치면 `Conflict`입니다.
pub async fn update_doctor(
    pool: &SqlitePool,
    id: &str,
    changes: &DoctorChanges<'_>,
) -> Result<Doctor, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "UPDATE doctors SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
    );
    if let Some(name) = changes.name {
        query.push(", name = ").push_bind(name);
    }
    if let Some(email) = changes.email {
        query.push(", email = ").push_bind(email);
    }
    if let Some(specialization) = changes.specialization {
        query.push(", specialization = ").push_bind(specialization);
    }
    if let Some(phone) = changes.phone {
        query.push(", phone = ").push_bind(phone);
    }
    if let Some(password_hash) = changes.password_hash {
        query.push(", password_hash = ").push_bind(password_hash);
    }
    query.push(" WHERE id = ").push_bind(id);

    match query.build().execute(pool).await {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict(
                "Doctor with this email already exists".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))
}
