//! 相对日期解析
//!
//! 工具参数中的 "today" / "yesterday" / "last 3 days" / "2 days ago" / "recent"
//! 等相对表达与 "YYYY-MM-DD" 绝对日期，统一解析为 UTC 时间点。

use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

// 正则只编译一次；模式非法时退化为「不匹配」
fn span_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*(day|week|month)s?").ok())
        .as_ref()
}

fn ampm_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})\s*(am|pm)").ok())
        .as_ref()
}

fn clock_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2}):\d{2}").ok()).as_ref()
}

/// 将 date_after 类参数解析为下界时刻；无法解析时返回 None
pub fn parse_after(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if lower.contains("today") {
        return start_of_day(now);
    }
    if lower.contains("yesterday") {
        return start_of_day(now - Duration::days(1));
    }
    // "last 3 days" / "3 days ago" / "in the last 2 weeks"
    if let Some(caps) = span_re().and_then(|re| re.captures(&lower)) {
        let n: i64 = caps.get(1)?.as_str().parse().ok()?;
        let days = match caps.get(2)?.as_str() {
            "week" => n * 7,
            "month" => n * 30,
            _ => n,
        };
        return Some(now - Duration::days(days));
    }
    // "recent" 默认最近 7 天
    if lower.contains("recent") {
        return Some(now - Duration::days(7));
    }
    // 绝对日期 YYYY-MM-DD
    if let Ok(date) = NaiveDate::parse_from_str(lower.trim(), "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// 将事件/任务的开始时间解析为具体时刻
///
/// 支持 "tomorrow"、"tomorrow 10am"、"today 15:00"、RFC3339、"YYYY-MM-DD HH:MM"、
/// "YYYY-MM-DD"；完全无法解析时回退为明天 09:00（与原助手行为一致）。
pub fn parse_datetime(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let lower = text.trim().to_lowercase();

    let base = if lower.contains("tomorrow") {
        Some(now + Duration::days(1))
    } else if lower.contains("today") {
        Some(now)
    } else {
        None
    };
    if let Some(base) = base {
        let hour = extract_hour(&lower).unwrap_or(9);
        return at_hour(base, hour).unwrap_or(base);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text.trim()) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M") {
        return Utc.from_utc_datetime(&dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(9, 0, 0) {
            return Utc.from_utc_datetime(&dt);
        }
    }

    at_hour(now + Duration::days(1), 9).unwrap_or(now)
}

/// 提取 "10am" / "3 pm" / "15:00" 风格的小时数
fn extract_hour(lower: &str) -> Option<u32> {
    if let Some(caps) = ampm_re().and_then(|re| re.captures(lower)) {
        let mut h: u32 = caps.get(1)?.as_str().parse().ok()?;
        if caps.get(2)?.as_str() == "pm" && h < 12 {
            h += 12;
        }
        return Some(h.min(23));
    }
    if let Some(caps) = clock_re().and_then(|re| re.captures(lower)) {
        let h: u32 = caps.get(1)?.as_str().parse().ok()?;
        return Some(h.min(23));
    }
    None
}

fn start_of_day(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&dt.date_naive().and_hms_opt(0, 0, 0)?))
}

fn at_hour(dt: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&dt.date_naive().and_hms_opt(hour, 0, 0)?))
}
