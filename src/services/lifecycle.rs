//! # 세션 상태 전이
//!
//! 모든 상태 변경은 이 모듈을 거칩니다.
//!
//! 1. `plan`: 전이 규칙(`SessionStatus::allowed_targets`)을 확인하고,
//!    전이가 바꾸는 값(상태, 시작/종료 시각)만 계산합니다. DB를 보지 않습니다.
//! 2. `commit`: 계산된 변경을 조건부 UPDATE로 씁니다. 그 사이에 다른 요청이
//!    상태를 바꿨다면 0행이 바뀌고, 현재 상태 기준의 `InvalidTransition`을 돌려줍니다.
//!
//! | 목표 상태 | 시각 처리 |
//! |-----------|-----------|
//! | In Progress | 시작 = 지금, 종료 = 비움 |
//! | Completed, Interrupted | 종료 = 지금 |
//! | Cancelled | 그대로 (사유가 있으면 메모만 대체) |
//!
//! 표에 없는 컬럼은 쓰지 않습니다. 스냅샷 이후의 메모 수정 같은 동시 편집이 보존됩니다.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db;
use crate::error::AppError;
use crate::models::*;

pub fn plan(
    session: &TherapySession,
    to: SessionStatus,
    now: DateTime<Utc>,
) -> Result<StatusChange, AppError> {
    let from = session.session_status;
    if !from.can_transition_to(to) {
        return Err(AppError::InvalidTransition { from, to });
    }

    let now = format_timestamp(now);
    let mut change = StatusChange {
        from,
        to,
        actual_start_time: None,
        actual_end_time: None,
        notes: None,
    };
    match to {
        SessionStatus::InProgress => change.actual_start_time = Some(now),
        SessionStatus::Completed | SessionStatus::Interrupted => {
            change.actual_end_time = Some(now);
        }
        SessionStatus::Scheduled | SessionStatus::Cancelled => {}
    }

    Ok(change)
}

/// 전이 규칙에 따라 세션 상태를 바꾸고 갱신된 세션을 반환합니다.
pub async fn transition(
    pool: &SqlitePool,
    session: &TherapySession,
    to: SessionStatus,
) -> Result<TherapySession, AppError> {
    let change = plan(session, to, Utc::now())?;
    commit(pool, &session.id, &change).await
}

/// 세션을 취소합니다. 사유가 있으면 세션 메모를 대체합니다.
///
/// 완료된 세션은 `Immutable`, 그 밖의 불가능한 전이는 `InvalidTransition`입니다.
pub async fn cancel(
    pool: &SqlitePool,
    session: &TherapySession,
    reason: Option<String>,
) -> Result<TherapySession, AppError> {
    if session.session_status == SessionStatus::Completed {
        return Err(AppError::Immutable(
            "Cannot cancel a completed session".to_string(),
        ));
    }

    let mut change = plan(session, SessionStatus::Cancelled, Utc::now())?;
    if let Some(reason) = reason.filter(|text| !text.trim().is_empty()) {
        change.notes = Some(reason);
    }
    commit(pool, &session.id, &change).await
}

pub async fn commit(
    pool: &SqlitePool,
    session_id: &str,
    change: &StatusChange,
) -> Result<TherapySession, AppError> {
    let mut conn = pool.acquire().await?;
    let applied = db::apply_status_change(&mut *conn, session_id, change).await?;
    // 단일 연결 풀에서도 아래 재조회가 막히지 않도록 먼저 반납
    drop(conn);

    if !applied {
        return Err(lost_race(pool, session_id, change.to).await);
    }

    let session = db::get_session(pool, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    tracing::info!(
        session_id,
        from = %change.from,
        to = %change.to,
        "session status changed"
    );
    if change.to == SessionStatus::Completed {
        match session.actual_duration() {
            Some(minutes) => tracing::info!(session_id, minutes, "session duration recorded"),
            None => tracing::warn!(session_id, "session completed without a start time"),
        }
    }

    Ok(session)
}

/// 조건부 UPDATE가 0행을 바꿨을 때의 에러: 지금 상태를 다시 읽어서 만듭니다.
pub async fn lost_race(pool: &SqlitePool, session_id: &str, to: SessionStatus) -> AppError {
    match db::get_session(pool, session_id).await {
        Ok(Some(current)) => AppError::InvalidTransition {
            from: current.session_status,
            to,
        },
        Ok(None) => AppError::NotFound("Session not found".to_string()),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::TimeZone;
    use SessionStatus::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn plan_follows_transition_table_for_every_pair() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;

        for from in [Scheduled, InProgress, Completed, Cancelled, Interrupted] {
            for to in [Scheduled, InProgress, Completed, Cancelled, Interrupted] {
                let mut current = session.clone();
                current.session_status = from;
                let result = plan(&current, to, at(9, 0));
                assert_eq!(result.is_ok(), from.can_transition_to(to), "{from} -> {to}");
                if let Err(err) = result {
                    assert!(matches!(err, AppError::InvalidTransition { .. }));
                }
            }
        }
    }

    #[tokio::test]
    async fn plan_sets_status_specific_timestamps() {
        let pool = test_pool().await;
        let mut session = seed_scheduled_session(&pool).await;

        let start = plan(&session, InProgress, at(9, 0)).unwrap();
        assert_eq!(start.actual_start_time.as_deref(), Some("2026-03-01T09:00:00.000Z"));
        assert_eq!(start.actual_end_time, None);

        session.session_status = InProgress;
        session.actual_start_time = start.actual_start_time.clone();
        session.notes = Some("keep me".to_string());
        let done = plan(&session, Completed, at(9, 25)).unwrap();
        assert_eq!(done.actual_start_time, None);
        assert_eq!(done.actual_end_time.as_deref(), Some("2026-03-01T09:25:00.000Z"));
        assert_eq!(done.notes, None);
    }

    #[tokio::test]
    async fn completion_keeps_notes_edited_after_the_snapshot() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let started = transition(&pool, &session, InProgress).await.unwrap();

        // 스냅샷(started)을 읽은 뒤 의사가 메모를 고침
        let edit = UpdateSessionRequest {
            notes: Some("doctor edit".to_string()),
            ..Default::default()
        };
        assert!(db::update_session(&pool, &started.id, &edit).await.unwrap());

        let completed = transition(&pool, &started, Completed).await.unwrap();
        assert_eq!(completed.session_status, Completed);
        assert_eq!(completed.notes.as_deref(), Some("doctor edit"));
        assert_eq!(completed.actual_start_time, started.actual_start_time);
        assert!(completed.actual_end_time.is_some());
    }

    #[tokio::test]
    async fn resuming_an_interrupted_session_clears_the_end_time() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let started = transition(&pool, &session, InProgress).await.unwrap();
        let interrupted = transition(&pool, &started, Interrupted).await.unwrap();
        assert!(interrupted.actual_end_time.is_some());

        let resumed = transition(&pool, &interrupted, InProgress).await.unwrap();
        assert_eq!(resumed.session_status, InProgress);
        assert!(resumed.actual_start_time.is_some());
        assert_eq!(resumed.actual_end_time, None);
    }

    #[tokio::test]
    async fn transition_persists_and_computes_duration() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;

        let started = transition(&pool, &session, InProgress).await.unwrap();
        assert_eq!(started.session_status, InProgress);
        assert!(started.actual_start_time.is_some());

        let completed = transition(&pool, &started, Completed).await.unwrap();
        assert_eq!(completed.session_status, Completed);
        assert_eq!(completed.actual_duration(), Some(0));
    }

    #[tokio::test]
    async fn terminal_sessions_reject_every_transition() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let cancelled = transition(&pool, &session, Cancelled).await.unwrap();

        for to in [Scheduled, InProgress, Completed, Cancelled, Interrupted] {
            let err = transition(&pool, &cancelled, to).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition { from: Cancelled, .. }));
        }
    }

    #[tokio::test]
    async fn stale_read_loses_the_compare_and_swap() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;

        // 같은 Scheduled 스냅샷으로 두 번 전이: 두 번째는 실제 상태 기준으로 실패
        transition(&pool, &session, InProgress).await.unwrap();
        let err = transition(&pool, &session, Cancelled).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: InProgress,
                to: Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn cancel_replaces_notes_and_refuses_completed() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;

        let cancelled = cancel(&pool, &session, Some("Patient unwell".to_string()))
            .await
            .unwrap();
        assert_eq!(cancelled.session_status, Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("Patient unwell"));

        let other = seed_scheduled_session(&pool).await;
        let started = transition(&pool, &other, InProgress).await.unwrap();
        let completed = transition(&pool, &started, Completed).await.unwrap();
        let err = cancel(&pool, &completed, None).await.unwrap_err();
        assert!(matches!(err, AppError::Immutable(_)));
    }

    #[tokio::test]
    async fn cancel_in_progress_is_an_invalid_transition() {
        let pool = test_pool().await;
        let session = seed_scheduled_session(&pool).await;
        let started = transition(&pool, &session, InProgress).await.unwrap();

        let err = cancel(&pool, &started, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }
}
