use std::fmt::{Display, Formatter};

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Weekday,
};

const WEEKDAY_LABELS: [&str; 7] = ["月", "火", "水", "木", "金", "土", "日"];

/// Local midnight of the calendar day `instant` falls on, in the instant's own timezone.
pub fn start_of_date<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    local_clock_on_date(&instant.timezone(), instant.date_naive(), 0)
}

/// `hour`:00 local time on `day`. Nonexistent local times resolve to the next
/// existing minute, ambiguous ones to the earlier instant.
pub fn local_clock_on_date<Tz: TimeZone>(tz: &Tz, day: NaiveDate, hour: u32) -> DateTime<Tz> {
    let naive = day.and_time(NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN));
    local_naive_resolved(tz, naive)
}

fn local_naive<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(datetime) => Some(datetime),
        LocalResult::Ambiguous(first, second) => Some(first.min(second)),
        LocalResult::None => None,
    }
}

fn local_naive_resolved<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    if let Some(datetime) = local_naive(tz, naive) {
        return datetime;
    }

    let mut cursor = naive + Duration::minutes(1);
    for _ in 0..120 {
        if let Some(datetime) = local_naive(tz, cursor) {
            return datetime;
        }
        cursor += Duration::minutes(1);
    }

    tz.from_utc_datetime(&naive)
}

/// Renders whole seconds as `H時間MM分SS秒`, dropping leading zero components.
pub fn format_duration(total_seconds: u64) -> String {
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;
    if hours > 0 {
        format!("{hours}時間{minutes:02}分{seconds:02}秒")
    } else if minutes > 0 {
        format!("{minutes:02}分{seconds:02}秒")
    } else {
        format!("{seconds:02}秒")
    }
}

pub fn iso_date_only<Tz: TimeZone>(date: &DateTime<Tz>) -> String {
    date.date_naive().format("%Y-%m-%d").to_string()
}

pub fn parse_iso_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}

pub fn format_local_date(day: NaiveDate) -> String {
    format!("{}({})", day.format("%Y/%m/%d"), weekday_label(day.weekday()))
}

pub fn format_clock<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    instant.naive_local().format("%H:%M:%S").to_string()
}

pub fn weekday_label(weekday: Weekday) -> &'static str {
    WEEKDAY_LABELS[weekday.num_days_from_monday() as usize]
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Percentage {
    /// `part / whole` as a percentage; an empty whole yields 0%.
    pub fn of(part: u64, whole: u64) -> Self {
        if whole == 0 {
            return Percentage(0.0);
        }
        Percentage(part as f64 / whole as f64 * 100.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Display for Percentage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Timelike};

    use super::*;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn formats_durations_by_largest_unit() {
        assert_eq!(format_duration(0), "00秒");
        assert_eq!(format_duration(5), "05秒");
        assert_eq!(format_duration(59), "59秒");
        assert_eq!(format_duration(60), "01分00秒");
        assert_eq!(format_duration(65), "01分05秒");
        assert_eq!(format_duration(3599), "59分59秒");
        assert_eq!(format_duration(3600), "1時間00分00秒");
        assert_eq!(format_duration(3601), "1時間00分01秒");
        assert_eq!(format_duration(3661), "1時間01分01秒");
        assert_eq!(format_duration(36_000 + 62), "10時間01分02秒");
    }

    #[test]
    fn start_of_date_zeroes_local_clock() {
        let instant = jst().with_ymd_and_hms(2026, 3, 4, 23, 59, 58).unwrap();
        let midnight = start_of_date(&instant);
        assert_eq!(midnight, jst().with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap());
        assert_eq!((midnight.hour(), midnight.minute(), midnight.second()), (0, 0, 0));
        assert_eq!(midnight.nanosecond(), 0);
        assert_eq!(start_of_date(&midnight), midnight);
    }

    #[test]
    fn start_of_date_uses_the_instant_timezone() {
        // 2026-03-04 20:00 UTC is already 2026-03-05 in JST.
        let utc = chrono::Utc.with_ymd_and_hms(2026, 3, 4, 20, 0, 0).unwrap();
        let local = utc.with_timezone(&jst());
        assert_eq!(iso_date_only(&start_of_date(&local)), "2026-03-05");
    }

    #[test]
    fn parses_and_renders_iso_dates() {
        let day = parse_iso_date("2026-10-19").expect("valid date");
        assert_eq!(format_local_date(day), "2026/10/19(月)");
        assert_eq!(parse_iso_date("2026-13-01"), None);
        assert_eq!(parse_iso_date(""), None);
    }

    #[test]
    fn percentage_renders_two_decimals() {
        assert_eq!(Percentage::of(1, 3).to_string(), "33.33%");
        assert_eq!(Percentage::of(200, 300).to_string(), "66.67%");
        assert_eq!(Percentage::of(5, 0).to_string(), "0.00%");
        assert_eq!(Percentage::of(1, 4).value(), 25.0);
    }
}
