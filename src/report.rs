use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::config::TrackerConfig;
use crate::domain::{ActivityRecord, TodoItem};
use crate::timefmt::Percentage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Share {
    Percent(Percentage),
    NotCounted,
}

#[derive(Debug, Clone)]
pub struct TypeTotal<'a> {
    pub type_name: &'a str,
    pub seconds: u64,
    pub share: Share,
    pub records: Vec<&'a ActivityRecord>,
}

impl<'a> TypeTotal<'a> {
    /// Records for the drill-down list. Untitled, memo-less records are left
    /// out unless `include_bare` is set.
    pub fn detail_records(
        &self,
        include_bare: bool,
    ) -> impl Iterator<Item = &'a ActivityRecord> + '_ {
        self.records
            .iter()
            .copied()
            .filter(move |record| include_bare || record.has_title_or_memo())
    }
}

#[derive(Debug, Clone)]
pub struct DailySummary<'a> {
    pub rows: Vec<TypeTotal<'a>>,
    /// Seconds across every type that is not off-duty.
    pub counted_seconds: u64,
}

/// Per-type totals for the day starting at `day_start`, largest first.
pub fn daily_summary<'a, Tz: TimeZone>(
    records: &'a [ActivityRecord],
    day_start: &DateTime<Tz>,
    now: &DateTime<Tz>,
    config: &TrackerConfig,
) -> DailySummary<'a> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&'a str, u64, Vec<&'a ActivityRecord>)> = Vec::new();

    for record in records.iter().filter(|record| record.belongs_to_day(day_start)) {
        let seconds = record.elapsed_seconds(now);
        let position = *positions.entry(record.type_name()).or_insert_with(|| {
            groups.push((record.type_name(), 0, Vec::new()));
            groups.len() - 1
        });
        let group = &mut groups[position];
        group.1 += seconds;
        group.2.push(record);
    }

    let counted_seconds = groups
        .iter()
        .filter(|(type_name, _, _)| !config.is_off_duty(type_name))
        .map(|(_, seconds, _)| *seconds)
        .sum();

    let mut rows = groups
        .into_iter()
        .map(|(type_name, seconds, records)| TypeTotal {
            type_name,
            seconds,
            share: if config.is_off_duty(type_name) {
                Share::NotCounted
            } else {
                Share::Percent(Percentage::of(seconds, counted_seconds))
            },
            records,
        })
        .collect::<Vec<_>>();
    rows.sort_by(|left, right| right.seconds.cmp(&left.seconds));

    DailySummary {
        rows,
        counted_seconds,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoSubtotal {
    pub total_seconds: u64,
    pub by_day: BTreeMap<NaiveDate, u64>,
}

/// Lifetime and per-day time spent on each todo, aligned with `todos`.
pub fn todo_subtotals<Tz: TimeZone>(
    todos: &[TodoItem],
    records: &[ActivityRecord],
    now: &DateTime<Tz>,
) -> Vec<TodoSubtotal> {
    let tz = now.timezone();
    todos
        .iter()
        .map(|todo| {
            let mut subtotal = TodoSubtotal::default();
            for record in records.iter().filter(|record| todo.matches(record)) {
                let seconds = record.elapsed_seconds(now);
                let day = record.start().with_timezone(&tz).date_naive();
                subtotal.total_seconds += seconds;
                *subtotal.by_day.entry(day).or_insert(0) += seconds;
            }
            subtotal
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TodoBucket<'a> {
    /// `None` is the implicit ungrouped bucket.
    pub group: Option<&'a str>,
    pub todos: Vec<(usize, &'a TodoItem)>,
}

/// Buckets todos by group in stored group order, ungrouped last. Todos naming
/// a group that no longer exists land in the ungrouped bucket.
pub fn group_todos<'a>(todos: &'a [TodoItem], groups: &'a [String]) -> Vec<TodoBucket<'a>> {
    let mut buckets = groups
        .iter()
        .map(|group| TodoBucket {
            group: Some(group.as_str()),
            todos: Vec::new(),
        })
        .collect::<Vec<_>>();
    let mut ungrouped = TodoBucket {
        group: None,
        todos: Vec::new(),
    };

    for (index, todo) in todos.iter().enumerate() {
        let bucket = todo
            .group
            .as_deref()
            .and_then(|name| groups.iter().position(|group| group == name));
        match bucket {
            Some(position) => buckets[position].todos.push((index, todo)),
            None => ungrouped.todos.push((index, todo)),
        }
    }

    buckets.push(ungrouped);
    buckets
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};

    use super::*;
    use crate::domain::RecordSeed;
    use crate::timefmt::start_of_date;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<FixedOffset> {
        jst().with_ymd_and_hms(2026, 6, day, hour, minute, second).unwrap()
    }

    fn closed(
        type_name: &str,
        title: Option<&str>,
        memo: Option<&str>,
        start: DateTime<FixedOffset>,
        seconds: i64,
    ) -> ActivityRecord {
        let seed = RecordSeed {
            type_name: type_name.to_string(),
            title: title.map(str::to_string),
            memo: memo.map(str::to_string),
        };
        let start = start.with_timezone(&Utc);
        ActivityRecord::closed(seed, start, start + chrono::Duration::seconds(seconds))
    }

    #[test]
    fn off_duty_types_are_listed_but_not_counted() {
        let config = TrackerConfig::default();
        let records = vec![
            closed("A", None, None, at(1, 9, 0, 0), 100),
            closed("昼休憩", None, None, at(1, 12, 0, 0), 50),
            closed("B", None, None, at(1, 13, 0, 0), 200),
        ];
        let now = at(1, 18, 0, 0);
        let summary = daily_summary(&records, &start_of_date(&now), &now, &config);

        assert_eq!(summary.counted_seconds, 300);
        let order = summary.rows.iter().map(|row| row.type_name).collect::<Vec<_>>();
        assert_eq!(order, vec!["B", "A", "昼休憩"]);
        assert_eq!(summary.rows[0].share, Share::Percent(Percentage::of(200, 300)));
        assert_eq!(summary.rows[2].share, Share::NotCounted);

        let percent_sum = summary
            .rows
            .iter()
            .filter_map(|row| match row.share {
                Share::Percent(percent) => Some(percent.value()),
                Share::NotCounted => None,
            })
            .sum::<f64>();
        assert!((percent_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_first_seen_order_and_other_days_are_skipped() {
        let config = TrackerConfig::default();
        let records = vec![
            closed("old", None, None, at(1, 9, 0, 0), 500),
            closed("x", None, None, at(2, 9, 0, 0), 60),
            closed("y", None, None, at(2, 10, 0, 0), 30),
            closed("z", None, None, at(2, 11, 0, 0), 60),
            closed("y", None, None, at(2, 12, 0, 0), 30),
        ];
        let now = at(2, 18, 0, 0);
        let summary = daily_summary(&records, &start_of_date(&now), &now, &config);
        let order = summary.rows.iter().map(|row| row.type_name).collect::<Vec<_>>();
        assert_eq!(order, vec!["x", "y", "z"]);
        assert_eq!(summary.rows[1].records.len(), 2);
    }

    #[test]
    fn empty_counted_total_shows_zero_percent() {
        let config = TrackerConfig::default();
        let records = vec![closed("中断", None, None, at(3, 9, 0, 0), 10)];
        let now = at(3, 10, 0, 0);
        let summary = daily_summary(&records, &start_of_date(&now), &now, &config);
        assert_eq!(summary.counted_seconds, 0);
        assert_eq!(summary.rows[0].share, Share::NotCounted);

        let config = TrackerConfig {
            off_duty_types: Vec::new(),
            ..TrackerConfig::default()
        };
        let zero = vec![closed("dev", None, None, at(3, 9, 0, 0), 0)];
        let summary = daily_summary(&zero, &start_of_date(&now), &now, &config);
        assert_eq!(summary.rows[0].share, Share::Percent(Percentage::of(0, 0)));
    }

    #[test]
    fn open_record_counts_up_to_now() {
        let config = TrackerConfig::default();
        let start = at(4, 9, 0, 0).with_timezone(&Utc);
        let records = vec![ActivityRecord::open(RecordSeed::from_type("dev"), start)];
        let now = at(4, 9, 10, 0);
        let summary = daily_summary(&records, &start_of_date(&now), &now, &config);
        assert_eq!(summary.rows[0].seconds, 600);
    }

    #[test]
    fn detail_records_can_hide_bare_records() {
        let config = TrackerConfig::default();
        let records = vec![
            closed("dev", Some("review"), None, at(5, 9, 0, 0), 10),
            closed("dev", None, None, at(5, 10, 0, 0), 10),
            closed("dev", None, Some("memo"), at(5, 11, 0, 0), 10),
        ];
        let now = at(5, 12, 0, 0);
        let summary = daily_summary(&records, &start_of_date(&now), &now, &config);
        assert_eq!(summary.rows[0].detail_records(false).count(), 2);
        assert_eq!(summary.rows[0].detail_records(true).count(), 3);
    }

    #[test]
    fn todo_subtotals_ignore_memo_and_bucket_by_day() {
        let todos = vec![
            TodoItem::new("dev", "review", Some("https://example.com/pr/1".to_string())),
            TodoItem::new("dev", "deploy", None),
        ];
        let records = vec![
            closed("dev", Some("review"), Some("first pass"), at(6, 9, 0, 0), 120),
            closed("dev", Some("review"), Some("second pass"), at(6, 14, 0, 0), 60),
            closed("dev", Some("review"), None, at(7, 9, 0, 0), 30),
            closed("ops", Some("review"), None, at(7, 10, 0, 0), 999),
        ];
        let now = at(8, 9, 0, 0);
        let subtotals = todo_subtotals(&todos, &records, &now);

        assert_eq!(subtotals.len(), 2);
        assert_eq!(subtotals[0].total_seconds, 210);
        let day6 = at(6, 0, 0, 0).date_naive();
        let day7 = at(7, 0, 0, 0).date_naive();
        assert_eq!(subtotals[0].by_day.get(&day6), Some(&180));
        assert_eq!(subtotals[0].by_day.get(&day7), Some(&30));
        assert_eq!(subtotals[1], TodoSubtotal::default());
    }

    #[test]
    fn groups_todos_in_group_order_with_ungrouped_last() {
        let mut a = TodoItem::new("dev", "a", None);
        a.group = Some("home".to_string());
        let b = TodoItem::new("dev", "b", None);
        let mut c = TodoItem::new("dev", "c", None);
        c.group = Some("work".to_string());
        let mut d = TodoItem::new("dev", "d", None);
        d.group = Some("deleted".to_string());
        let todos = vec![a, b, c, d];
        let groups = vec!["work".to_string(), "home".to_string(), "empty".to_string()];

        let buckets = group_todos(&todos, &groups);
        let shape = buckets
            .iter()
            .map(|bucket| {
                let indices = bucket.todos.iter().map(|(index, _)| *index).collect::<Vec<_>>();
                (bucket.group, indices)
            })
            .collect::<Vec<_>>();
        assert_eq!(
            shape,
            vec![
                (Some("work"), vec![2]),
                (Some("home"), vec![0]),
                (Some("empty"), vec![]),
                (None, vec![1, 3]),
            ]
        );
    }
}
