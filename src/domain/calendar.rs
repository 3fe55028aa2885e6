//! Vietnam trading-calendar data source for gap detection (§4.6, §9 Open
//! Questions: "gap detector's expected_bars depends on this").
//!
//! Resolved as a static, versioned holiday table covering HOSE/HNX/UPCOM.
//! This is a simplification recorded in DESIGN.md: a fully authoritative
//! calendar feed is out of scope for this system and the table below
//! requires periodic manual refresh as new holidays are gazetted.

use chrono::{Datelike, NaiveDate, Weekday};

/// Vietnam public holidays observed by HOSE/HNX/UPCOM, 2023-2026. Extend
/// this table as new years are gazetted.
pub const VN_HOLIDAYS: &[(i32, u32, u32)] = &[
    // 2024
    (2024, 1, 1),
    (2024, 2, 8),
    (2024, 2, 9),
    (2024, 2, 12),
    (2024, 2, 13),
    (2024, 2, 14),
    (2024, 4, 18),
    (2024, 4, 30),
    (2024, 5, 1),
    (2024, 9, 2),
    (2024, 9, 3),
    // 2025
    (2025, 1, 1),
    (2025, 1, 27),
    (2025, 1, 28),
    (2025, 1, 29),
    (2025, 1, 30),
    (2025, 1, 31),
    (2025, 2, 3),
    (2025, 4, 7),
    (2025, 4, 30),
    (2025, 5, 1),
    (2025, 9, 1),
    (2025, 9, 2),
    // 2026
    (2026, 1, 1),
    (2026, 2, 16),
    (2026, 2, 17),
    (2026, 2, 18),
    (2026, 2, 19),
    (2026, 2, 20),
    (2026, 4, 25),
    (2026, 4, 30),
    (2026, 5, 1),
    (2026, 9, 2),
];

/// Intraday session window (Asia/Ho_Chi_Minh local time), lunch break
/// excluded, expressed as minute-of-day offsets from local midnight.
pub const MORNING_OPEN_MIN: i64 = 9 * 60; // 09:00
pub const MORNING_CLOSE_MIN: i64 = 11 * 60 + 30; // 11:30
pub const AFTERNOON_OPEN_MIN: i64 = 13 * 60; // 13:00
pub const AFTERNOON_CLOSE_MIN: i64 = 15 * 60; // 15:00

pub fn is_holiday(date: NaiveDate) -> bool {
    VN_HOLIDAYS
        .iter()
        .any(|&(y, m, d)| y == date.year() && m == date.month() && d == date.day())
}

/// A trading day is Mon-Fri and not in the static holiday table.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
}

/// Session minute ranges (local-time minute-of-day, end exclusive) that are
/// valid for intraday (15m/1h) bars on a trading day.
pub fn intraday_session_ranges() -> [(i64, i64); 2] {
    [
        (MORNING_OPEN_MIN, MORNING_CLOSE_MIN),
        (AFTERNOON_OPEN_MIN, AFTERNOON_CLOSE_MIN),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekend_is_not_a_trading_day() {
        // 2025-09-06 is a Saturday
        let d = NaiveDate::from_ymd_opt(2025, 9, 6).unwrap();
        assert!(!is_trading_day(d));
    }

    #[test]
    fn gazetted_holiday_is_not_a_trading_day() {
        let d = NaiveDate::from_ymd_opt(2025, 4, 30).unwrap();
        assert!(!is_trading_day(d));
    }

    #[test]
    fn ordinary_weekday_is_a_trading_day() {
        let d = NaiveDate::from_ymd_opt(2025, 9, 4).unwrap();
        assert!(is_trading_day(d));
    }

    #[test]
    fn session_ranges_exclude_lunch_break() {
        let ranges = intraday_session_ranges();
        assert_eq!(ranges[0], (540, 690));
        assert_eq!(ranges[1], (780, 900));
    }
}
