//! # 방치된 세션 정리
//!
//! VR 런타임이 결과를 보내지 않고 사라지면 세션은 "In Progress"에 머뭅니다.
//! `SESSION_TIMEOUT_MINUTES`가 설정되어 있으면 주기적으로 그런 세션을
//! Interrupted로 바꿉니다. 전이는 다른 상태 변경과 같은 compare-and-swap을
//! 쓰므로, 정리 직전에 텔레메트리가 도착한 세션은 건드리지 않습니다.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db;
use crate::error::AppError;
use crate::models::*;
use crate::services::lifecycle;

/// `now - timeout`보다 먼저 시작된 "In Progress" 세션을 Interrupted로 바꾸고
/// 바꾼 개수를 반환합니다.
pub async fn sweep_abandoned(
    pool: &SqlitePool,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let cutoff = format_timestamp(now - timeout);
    let stale = db::list_stale_in_progress(pool, &cutoff).await?;

    let mut interrupted = 0;
    for session in stale {
        match lifecycle::transition(pool, &session, SessionStatus::Interrupted).await {
            Ok(_) => {
                interrupted += 1;
                tracing::warn!(
                    session_id = %session.id,
                    started = ?session.actual_start_time,
                    "abandoned session marked Interrupted"
                );
            }
            Err(AppError::InvalidTransition { from, .. }) => {
                tracing::debug!(session_id = %session.id, %from, "session changed before sweep");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(interrupted)
}

/// 정리 작업을 백그라운드 태스크로 띄웁니다.
pub fn spawn_sweeper(
    pool: SqlitePool,
    timeout_minutes: i64,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let timeout = Duration::minutes(timeout_minutes);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match sweep_abandoned(&pool, timeout, Utc::now()).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "session sweep finished"),
                Err(e) => tracing::error!(error = %e, "session sweep failed"),
            }
        }
    })
}
