//! # 타임스탬프 유틸리티
//!
//! DB에는 모든 시각을 UTC 문자열(`2026-02-16T12:00:00.000Z`)로 저장합니다.
//! SQLite의 `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`와 같은 형식이므로
//! 문자열 비교만으로 시간순 정렬과 기간 필터링이 가능합니다.

use chrono::{DateTime, Utc};

/// 저장용 타임스탬프 포맷 (밀리초 3자리, UTC 'Z' 접미사)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// `DateTime<Utc>`를 저장용 문자열로 변환합니다.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// 현재 시각을 저장용 문자열로 반환합니다.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// 저장된 문자열을 다시 `DateTime<Utc>`로 파싱합니다.
///
/// RFC 3339 형식이면 어떤 오프셋이든 받아서 UTC로 맞춥니다.
/// 파싱할 수 없으면 `None`을 반환합니다.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// 두 타임스탬프 사이의 시간을 분 단위로 반올림해 반환합니다.
///
/// 둘 중 하나라도 없거나 파싱에 실패하면 `None`입니다.
pub fn minutes_between(start: Option<&str>, end: Option<&str>) -> Option<i64> {
    let start = parse_timestamp(start?)?;
    let end = parse_timestamp(end?)?;
    let millis = (end - start).num_milliseconds();
    Some((millis as f64 / 60_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatted_timestamp_parses_back() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let text = format_timestamp(at);
        assert_eq!(text, "2026-03-01T09:30:00.000Z");
        assert_eq!(parse_timestamp(&text), Some(at));
    }

    #[test]
    fn minutes_between_rounds_to_nearest_minute() {
        let minutes = minutes_between(
            Some("2026-03-01T09:00:00.000Z"),
            Some("2026-03-01T09:24:31.000Z"),
        );
        assert_eq!(minutes, Some(25));
    }

    #[test]
    fn minutes_between_requires_both_ends() {
        assert_eq!(minutes_between(Some("2026-03-01T09:00:00.000Z"), None), None);
        assert_eq!(minutes_between(None, None), None);
    }
}
