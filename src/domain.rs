use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::timefmt::{local_clock_on_date, start_of_date};

/// Local hour treated as the end of a record left open past its own day.
pub const FORGOTTEN_RECORD_END_HOUR: u32 = 22;

/// Fields copied into a freshly started record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSeed {
    pub type_name: String,
    pub title: Option<String>,
    pub memo: Option<String>,
}

impl RecordSeed {
    pub fn from_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            title: None,
            memo: None,
        }
    }

    pub fn from_todo(todo: &TodoItem) -> Self {
        Self {
            type_name: todo.type_name.clone(),
            title: non_empty(Some(todo.title.clone())),
            memo: non_empty(todo.memo.clone()),
        }
    }

    pub fn from_record(record: &ActivityRecord) -> Self {
        Self {
            type_name: record.type_name.clone(),
            title: non_empty(record.title.clone()),
            memo: non_empty(record.memo.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    start: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    end: Option<DateTime<Utc>>,
    #[serde(rename = "type", default)]
    type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
}

impl ActivityRecord {
    pub fn open(seed: RecordSeed, start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            type_name: seed.type_name,
            title: non_empty(seed.title),
            memo: non_empty(seed.memo),
        }
    }

    #[cfg(test)]
    pub fn closed(seed: RecordSeed, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut record = Self::open(seed, start);
        record.finish(end);
        record
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Closes the record at `now`. Returns `false` if it was already closed.
    pub fn finish(&mut self, now: DateTime<Utc>) -> bool {
        if self.end.is_some() {
            return false;
        }
        self.end = Some(now);
        true
    }

    pub fn set_type(&mut self, value: impl Into<String>) {
        self.type_name = value.into();
    }

    pub fn set_title(&mut self, value: Option<String>) {
        self.title = value;
    }

    pub fn set_memo(&mut self, value: Option<String>) {
        self.memo = value;
    }

    pub fn has_title_or_memo(&self) -> bool {
        non_empty(self.title.clone()).is_some() || non_empty(self.memo.clone()).is_some()
    }

    /// Whole seconds spent on this record as seen at `now`.
    ///
    /// An open record started before today's local midnight is capped at
    /// 22:00 local time on its start date rather than growing forever.
    pub fn elapsed_seconds<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> u64 {
        let end = match self.end {
            Some(end) => end,
            None => {
                let today = start_of_date(now).with_timezone(&Utc);
                if self.start > today {
                    now.with_timezone(&Utc)
                } else {
                    let tz = now.timezone();
                    let start_day = self.start.with_timezone(&tz).date_naive();
                    local_clock_on_date(&tz, start_day, FORGOTTEN_RECORD_END_HOUR)
                        .with_timezone(&Utc)
                }
            }
        };

        let millis = (end - self.start).num_milliseconds().max(0);
        (millis / 1000) as u64
    }

    /// Whether the record counts toward the day starting at `day_start`.
    pub fn belongs_to_day<Tz: TimeZone>(&self, day_start: &DateTime<Tz>) -> bool {
        self.start > day_start.with_timezone(&Utc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    Overdue,
    Today,
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<DateTime<Utc>>,
}

impl TodoItem {
    pub fn new(
        type_name: impl Into<String>,
        title: impl Into<String>,
        memo: Option<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            title: title.into(),
            memo: non_empty(memo),
            group: None,
            deadline: None,
        }
    }

    /// Records match on type and title; the memo is deliberately ignored.
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        record.type_name == self.type_name && record.title.as_deref().unwrap_or("") == self.title
    }

    pub fn has_url_memo(&self) -> bool {
        self.memo.as_deref().is_some_and(is_url)
    }

    pub fn deadline_status<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DeadlineStatus> {
        let deadline = self.deadline?.with_timezone(&now.timezone()).date_naive();
        let today = now.date_naive();
        Some(if deadline < today {
            DeadlineStatus::Overdue
        } else if deadline == today {
            DeadlineStatus::Today
        } else {
            DeadlineStatus::Upcoming
        })
    }

    /// Moves the deadline onto local midnight of its own day.
    pub fn truncate_deadline<Tz: TimeZone>(&mut self, tz: &Tz) {
        if let Some(deadline) = self.deadline {
            self.deadline = Some(start_of_date(&deadline.with_timezone(tz)).with_timezone(&Utc));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityType {
    pub name: String,
    #[serde(rename = "accessKey", default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
}

impl ActivityType {
    pub fn new(name: impl Into<String>, access_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            access_key,
        }
    }

    pub fn has_access_key(&self, key: &str) -> bool {
        self.access_key
            .as_deref()
            .is_some_and(|own| own.to_lowercase() == key.to_lowercase())
    }
}

/// `http...` with no spaces, the shape of a pasted link.
pub fn is_url(value: &str) -> bool {
    value.starts_with("http") && value.len() > 4 && !value.contains(' ')
}

pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
