use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{debug, info};

use crate::clipboard::PastedTodo;
use crate::config::TrackerConfig;
use crate::domain::{ActivityRecord, ActivityType, RecordSeed, TodoItem, non_empty};
use crate::report::{
    DailySummary, TodoBucket, TodoSubtotal, daily_summary, group_todos, todo_subtotals,
};
use crate::storage::{
    KeyValueStore, ListStore, RECORD_KEY, SettingKey, Settings, StorageError, TODO_GROUP_KEY,
    TODO_KEY, TYPE_KEY,
};
use crate::timefmt::{Percentage, local_clock_on_date};

pub const UNKNOWN_TYPE_LABEL: &str = "(unknown type)";

#[derive(Debug)]
pub enum TrackerError {
    Storage(StorageError),
    EmptyName(&'static str),
    InvalidAccessKey(String),
    DuplicateAccessKey { key: String, owner: String },
    UnknownType(String),
    UnknownAccessKey(String),
    NoSuchItem { kind: &'static str, index: usize },
    NothingRunning,
    SettingDisabled(SettingKey),
}

impl Display for TrackerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::Storage(err) => write!(f, "storage error: {err}"),
            TrackerError::EmptyName(field) => write!(f, "{field} is required"),
            TrackerError::InvalidAccessKey(key) => {
                write!(f, "access key must be a single character, got '{key}'")
            }
            TrackerError::DuplicateAccessKey { key, owner } => {
                write!(f, "access key '{key}' is already used by type '{owner}'")
            }
            TrackerError::UnknownType(name) => write!(f, "type not found: {name}"),
            TrackerError::UnknownAccessKey(key) => write!(f, "no type bound to access key '{key}'"),
            TrackerError::NoSuchItem { kind, index } => {
                write!(f, "{kind} #{} does not exist", index + 1)
            }
            TrackerError::NothingRunning => write!(f, "no record is running"),
            TrackerError::SettingDisabled(key) => {
                write!(f, "setting '{}' is turned off", key.name())
            }
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<StorageError> for TrackerError {
    fn from(err: StorageError) -> Self {
        TrackerError::Storage(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Field replacements for a todo; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub type_name: Option<String>,
    pub title: Option<String>,
    pub memo: Option<Option<String>>,
    pub group: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    pub bytes_in_use: usize,
    pub quota_bytes: usize,
}

impl StorageUsage {
    pub fn percentage(&self) -> Percentage {
        Percentage::of(self.bytes_in_use as u64, self.quota_bytes as u64)
    }
}

/// Owns the persisted lists and applies every user command to them.
pub struct Tracker<S: KeyValueStore> {
    store: S,
    config: TrackerConfig,
    records: ListStore<ActivityRecord>,
    todos: ListStore<TodoItem>,
    types: ListStore<ActivityType>,
    groups: ListStore<String>,
    settings: Settings,
}

impl<S: KeyValueStore> Tracker<S> {
    pub fn open<Tz: TimeZone>(store: S, config: TrackerConfig, tz: &Tz) -> Self {
        let records = ListStore::load(&store, RECORD_KEY, Vec::new());
        let todos = ListStore::load_with(&store, TODO_KEY, Vec::new(), |mut todo: TodoItem| {
            todo.truncate_deadline(tz);
            todo
        });
        let types = ListStore::load(&store, TYPE_KEY, Vec::new());
        let groups = ListStore::load(&store, TODO_GROUP_KEY, Vec::new());
        let settings = Settings::load(&store);

        debug!(
            records = records.items().len(),
            todos = todos.items().len(),
            types = types.items().len(),
            groups = groups.items().len(),
            "loaded tracker state"
        );

        Self {
            store,
            config,
            records,
            todos,
            types,
            groups,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn records(&self) -> &[ActivityRecord] {
        self.records.items()
    }

    pub fn todos(&self) -> &[TodoItem] {
        self.todos.items()
    }

    pub fn types(&self) -> &[ActivityType] {
        self.types.items()
    }

    pub fn groups(&self) -> &[String] {
        self.groups.items()
    }

    pub fn setting(&self, key: SettingKey) -> bool {
        self.settings.get(key)
    }

    pub fn set_setting(&mut self, key: SettingKey, value: bool) -> Result<(), TrackerError> {
        self.settings.set(&mut self.store, key, value)?;
        info!(setting = key.name(), value, "updated setting");
        Ok(())
    }

    pub fn usage(&self) -> StorageUsage {
        StorageUsage {
            bytes_in_use: self.store.bytes_in_use(),
            quota_bytes: self.store.quota_bytes(),
        }
    }

    // Types

    pub fn type_by_name(&self, name: &str) -> Option<&ActivityType> {
        self.types().iter().find(|kind| kind.name == name)
    }

    /// The type name, marked when no such type exists any more.
    pub fn type_label(&self, name: &str) -> String {
        if name.is_empty() {
            UNKNOWN_TYPE_LABEL.to_string()
        } else if self.type_by_name(name).is_some() {
            name.to_string()
        } else {
            format!("{name} {UNKNOWN_TYPE_LABEL}")
        }
    }

    /// Known type names, with `current` prepended when it is not among them.
    pub fn type_choices(&self, current: &str) -> Vec<String> {
        let mut names = self.types().iter().map(|kind| kind.name.clone()).collect::<Vec<_>>();
        if !names.iter().any(|name| name == current) {
            names.insert(0, current.to_string());
        }
        names
    }

    pub fn type_for_access_key(&self, key: &str) -> Option<&ActivityType> {
        self.types().iter().find(|kind| kind.has_access_key(key))
    }

    pub fn add_type(&mut self, name: &str, access_key: Option<&str>) -> Result<(), TrackerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::EmptyName("type name"));
        }
        let access_key = self.validate_access_key(access_key, None)?;
        self.types
            .append(&mut self.store, ActivityType::new(name, access_key))?;
        info!(name, "added type");
        Ok(())
    }

    pub fn set_type_access_key(
        &mut self,
        index: usize,
        access_key: Option<&str>,
    ) -> Result<(), TrackerError> {
        self.ensure_index("type", index, self.types().len())?;
        let access_key = self.validate_access_key(access_key, Some(index))?;
        let mut types = self.types().to_vec();
        types[index].access_key = access_key;
        self.types.replace(&mut self.store, types)?;
        Ok(())
    }

    pub fn delete_type(&mut self, index: usize) -> Result<ActivityType, TrackerError> {
        self.ensure_index("type", index, self.types().len())?;
        let mut types = self.types().to_vec();
        let removed = types.remove(index);
        self.types.replace(&mut self.store, types)?;
        info!(name = %removed.name, "deleted type");
        Ok(removed)
    }

    fn validate_access_key(
        &self,
        key: Option<&str>,
        except: Option<usize>,
    ) -> Result<Option<String>, TrackerError> {
        let Some(key) = key.map(str::trim).filter(|key| !key.is_empty()) else {
            return Ok(None);
        };
        if key.chars().count() != 1 {
            return Err(TrackerError::InvalidAccessKey(key.to_string()));
        }

        let owner = self
            .types()
            .iter()
            .enumerate()
            .find(|(index, kind)| Some(*index) != except && kind.has_access_key(key));
        if let Some((_, owner)) = owner {
            return Err(TrackerError::DuplicateAccessKey {
                key: key.to_string(),
                owner: owner.name.clone(),
            });
        }

        Ok(Some(key.to_string()))
    }

    // Records

    /// The running record, if any.
    pub fn current_record(&self) -> Option<(usize, &ActivityRecord)> {
        self.records()
            .iter()
            .enumerate()
            .rev()
            .find(|(_, record)| record.is_open())
    }

    pub fn records_of_day<Tz: TimeZone>(
        &self,
        day_start: &DateTime<Tz>,
    ) -> Vec<(usize, &ActivityRecord)> {
        self.records()
            .iter()
            .enumerate()
            .filter(|(_, record)| record.belongs_to_day(day_start))
            .collect()
    }

    /// Closes whatever is running and opens a new record from `seed`.
    ///
    /// Every open record is closed, not only the latest, so at most one record
    /// is ever open afterwards.
    pub fn finish_and_add_record<Tz: TimeZone>(
        &mut self,
        seed: RecordSeed,
        now: &DateTime<Tz>,
    ) -> Result<&ActivityRecord, TrackerError> {
        let now = now.with_timezone(&Utc);
        let record = ActivityRecord::open(seed, now);
        info!(type_name = record.type_name(), title = record.title(), "starting record");

        if self.records().iter().any(ActivityRecord::is_open) {
            let mut records = self.records().to_vec();
            for open in records.iter_mut().filter(|record| record.is_open()) {
                open.finish(now);
            }
            records.push(record);
            self.records.replace(&mut self.store, records)?;
        } else {
            self.records.append(&mut self.store, record)?;
        }

        self.records()
            .last()
            .ok_or(TrackerError::NothingRunning)
    }

    pub fn start_type<Tz: TimeZone>(
        &mut self,
        name: &str,
        now: &DateTime<Tz>,
    ) -> Result<&ActivityRecord, TrackerError> {
        if self.type_by_name(name).is_none() {
            return Err(TrackerError::UnknownType(name.to_string()));
        }
        self.finish_and_add_record(RecordSeed::from_type(name), now)
    }

    pub fn start_access_key<Tz: TimeZone>(
        &mut self,
        key: &str,
        now: &DateTime<Tz>,
    ) -> Result<&ActivityRecord, TrackerError> {
        let name = self
            .type_for_access_key(key)
            .map(|kind| kind.name.clone())
            .ok_or_else(|| TrackerError::UnknownAccessKey(key.to_string()))?;
        self.finish_and_add_record(RecordSeed::from_type(name), now)
    }

    pub fn start_todo<Tz: TimeZone>(
        &mut self,
        index: usize,
        now: &DateTime<Tz>,
    ) -> Result<&ActivityRecord, TrackerError> {
        let todo = self
            .todos()
            .get(index)
            .ok_or(TrackerError::NoSuchItem { kind: "todo", index })?;
        let seed = RecordSeed::from_todo(todo);
        self.finish_and_add_record(seed, now)
    }

    /// Starts a new record with the same type, title and memo as record `index`.
    pub fn resume_record<Tz: TimeZone>(
        &mut self,
        index: usize,
        now: &DateTime<Tz>,
    ) -> Result<&ActivityRecord, TrackerError> {
        let record = self
            .records()
            .get(index)
            .ok_or(TrackerError::NoSuchItem { kind: "record", index })?;
        let seed = RecordSeed::from_record(record);
        self.finish_and_add_record(seed, now)
    }

    pub fn finish_current<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<(), TrackerError> {
        let (index, _) = self.current_record().ok_or(TrackerError::NothingRunning)?;
        self.edit_record(index, |record| {
            record.finish(now.with_timezone(&Utc));
        })?;
        info!(index, "finished record");
        Ok(())
    }

    pub fn set_record_type(&mut self, index: usize, type_name: &str) -> Result<(), TrackerError> {
        self.edit_record(index, |record| record.set_type(type_name))
    }

    pub fn set_record_title(
        &mut self,
        index: usize,
        title: Option<String>,
    ) -> Result<(), TrackerError> {
        self.edit_record(index, |record| record.set_title(non_empty(title)))
    }

    pub fn set_record_memo(
        &mut self,
        index: usize,
        memo: Option<String>,
    ) -> Result<(), TrackerError> {
        self.edit_record(index, |record| record.set_memo(non_empty(memo)))
    }

    fn edit_record(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut ActivityRecord),
    ) -> Result<(), TrackerError> {
        self.ensure_index("record", index, self.records().len())?;
        let mut records = self.records().to_vec();
        edit(&mut records[index]);
        self.records.replace(&mut self.store, records)?;
        Ok(())
    }

    // Todos

    pub fn add_todo(&mut self, todo: TodoItem) -> Result<(), TrackerError> {
        info!(type_name = %todo.type_name, title = %todo.title, "added todo");
        self.todos.append(&mut self.store, todo)?;
        Ok(())
    }

    /// Adds a pasted link or text as a todo of `type_name`.
    pub fn add_todo_from_paste(
        &mut self,
        paste: PastedTodo,
        type_name: &str,
    ) -> Result<(), TrackerError> {
        if !self.setting(SettingKey::ClipboardToTodo) {
            return Err(TrackerError::SettingDisabled(SettingKey::ClipboardToTodo));
        }
        if paste.text.is_empty() {
            return Err(TrackerError::EmptyName("pasted text"));
        }
        self.add_todo(TodoItem::new(type_name, paste.text, paste.url))
    }

    pub fn update_todo(&mut self, index: usize, patch: TodoPatch) -> Result<(), TrackerError> {
        self.edit_todo(index, |todo| {
            if let Some(type_name) = patch.type_name {
                todo.type_name = type_name;
            }
            if let Some(title) = patch.title {
                todo.title = title;
            }
            if let Some(memo) = patch.memo {
                todo.memo = non_empty(memo);
            }
            if let Some(group) = patch.group {
                todo.group = non_empty(group);
            }
        })
    }

    pub fn set_todo_deadline<Tz: TimeZone>(
        &mut self,
        index: usize,
        deadline: Option<NaiveDate>,
        tz: &Tz,
    ) -> Result<(), TrackerError> {
        let deadline = deadline.map(|day| local_clock_on_date(tz, day, 0).with_timezone(&Utc));
        self.edit_todo(index, |todo| todo.deadline = deadline)
    }

    pub fn delete_todo(&mut self, index: usize) -> Result<TodoItem, TrackerError> {
        self.ensure_index("todo", index, self.todos().len())?;
        let mut todos = self.todos().to_vec();
        let removed = todos.remove(index);
        self.todos.replace(&mut self.store, todos)?;
        info!(title = %removed.title, "deleted todo");
        Ok(removed)
    }

    fn edit_todo(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut TodoItem),
    ) -> Result<(), TrackerError> {
        self.ensure_index("todo", index, self.todos().len())?;
        let mut todos = self.todos().to_vec();
        edit(&mut todos[index]);
        self.todos.replace(&mut self.store, todos)?;
        Ok(())
    }

    /// Whether todo `index` describes the running record.
    pub fn is_current_todo(&self, index: usize) -> bool {
        match (self.todos().get(index), self.current_record()) {
            (Some(todo), Some((_, record))) => todo.matches(record),
            _ => false,
        }
    }

    // Groups

    pub fn add_group(&mut self, name: &str) -> Result<(), TrackerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::EmptyName("group name"));
        }
        self.groups.append(&mut self.store, name.to_string())?;
        Ok(())
    }

    pub fn delete_group(&mut self, index: usize) -> Result<String, TrackerError> {
        self.ensure_index("group", index, self.groups().len())?;
        let mut groups = self.groups().to_vec();
        let removed = groups.remove(index);
        self.groups.replace(&mut self.store, groups)?;
        info!(group = %removed, "deleted group");
        Ok(removed)
    }

    /// Swaps group `index` with its neighbour. Returns the new index.
    pub fn move_group(
        &mut self,
        index: usize,
        direction: MoveDirection,
    ) -> Result<usize, TrackerError> {
        self.ensure_index("group", index, self.groups().len())?;
        let target = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|target| *target < self.groups().len()),
        };
        let Some(target) = target else {
            return Ok(index);
        };

        let mut groups = self.groups().to_vec();
        groups.swap(index, target);
        self.groups.replace(&mut self.store, groups)?;
        Ok(target)
    }

    // Reports

    pub fn daily_summary<Tz: TimeZone>(
        &self,
        day_start: &DateTime<Tz>,
        now: &DateTime<Tz>,
    ) -> DailySummary<'_> {
        daily_summary(self.records(), day_start, now, &self.config)
    }

    pub fn todo_subtotals<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<TodoSubtotal> {
        todo_subtotals(self.todos(), self.records(), now)
    }

    pub fn grouped_todos(&self) -> Vec<TodoBucket<'_>> {
        group_todos(self.todos(), self.groups())
    }

    fn ensure_index(
        &self,
        kind: &'static str,
        index: usize,
        len: usize,
    ) -> Result<(), TrackerError> {
        if index < len {
            Ok(())
        } else {
            Err(TrackerError::NoSuchItem { kind, index })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::logging::TEST_LOGGING;
    use crate::storage::MemoryStore;
    use crate::timefmt::start_of_date;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        jst().with_ymd_and_hms(2026, 7, day, hour, minute, 0).unwrap()
    }

    fn tracker() -> Tracker<MemoryStore> {
        LazyLock::force(&TEST_LOGGING);
        let mut tracker = Tracker::open(MemoryStore::default(), TrackerConfig::default(), &jst());
        tracker.add_type("dev", Some("d")).expect("add dev");
        tracker.add_type("昼休憩", None).expect("add lunch");
        tracker
    }

    #[test]
    fn starting_closes_the_running_record() {
        let mut tracker = tracker();
        tracker.start_type("dev", &at(1, 9, 0)).expect("start dev");
        tracker.start_type("昼休憩", &at(1, 12, 0)).expect("start lunch");

        let records = tracker.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].end(), Some(at(1, 12, 0).with_timezone(&Utc)));
        assert!(records[1].is_open());
        assert_eq!(tracker.current_record().map(|(index, _)| index), Some(1));
    }

    #[test]
    fn starting_closes_every_stray_open_record() {
        let mut store = MemoryStore::default();
        let open = |hour| {
            ActivityRecord::open(RecordSeed::from_type("dev"), at(1, hour, 0).with_timezone(&Utc))
        };
        store
            .set(RECORD_KEY, serde_json::to_value(vec![open(8), open(9)]).unwrap())
            .unwrap();
        store.set(TYPE_KEY, json!([{"name": "dev"}])).unwrap();

        let mut tracker = Tracker::open(store, TrackerConfig::default(), &jst());
        tracker.start_type("dev", &at(1, 10, 0)).expect("start");
        let open_count = tracker.records().iter().filter(|record| record.is_open()).count();
        assert_eq!(open_count, 1);
    }

    #[test]
    fn malformed_record_does_not_erase_history() {
        let mut store = MemoryStore::default();
        let closed = |hour| {
            let start = at(1, hour, 0).with_timezone(&Utc);
            let end = start + chrono::Duration::hours(1);
            let record = ActivityRecord::closed(RecordSeed::from_type("dev"), start, end);
            serde_json::to_value(record).unwrap()
        };
        let stored = json!([closed(8), closed(10), {"type": "dev", "title": "missing start"}]);
        store.set(RECORD_KEY, stored).unwrap();
        store.set(TYPE_KEY, json!([{"name": "dev"}])).unwrap();

        let mut tracker = Tracker::open(store, TrackerConfig::default(), &jst());
        assert_eq!(tracker.records().len(), 2);
        tracker.start_type("dev", &at(1, 12, 0)).unwrap();

        let Tracker { store, .. } = tracker;
        let reopened = Tracker::open(store, TrackerConfig::default(), &jst());
        assert_eq!(reopened.records().len(), 3);
        assert_eq!(reopened.records()[0].start(), at(1, 8, 0).with_timezone(&Utc));
        assert!(reopened.records()[2].is_open());
    }

    #[test]
    fn start_todo_copies_title_and_memo() {
        let mut tracker = tracker();
        tracker
            .add_todo(TodoItem::new("dev", "review", Some("https://example.com/pr/7".to_string())))
            .unwrap();
        let record = tracker.start_todo(0, &at(2, 9, 0)).expect("start todo");
        assert_eq!(record.type_name(), "dev");
        assert_eq!(record.title(), Some("review"));
        assert_eq!(record.memo(), Some("https://example.com/pr/7"));
        assert!(tracker.is_current_todo(0));

        assert!(matches!(
            tracker.start_todo(5, &at(2, 9, 5)),
            Err(TrackerError::NoSuchItem { kind: "todo", index: 5 })
        ));
    }

    #[test]
    fn finish_current_is_an_error_when_idle() {
        let mut tracker = tracker();
        assert!(matches!(tracker.finish_current(&at(3, 9, 0)), Err(TrackerError::NothingRunning)));

        tracker.start_type("dev", &at(3, 9, 0)).unwrap();
        tracker.finish_current(&at(3, 9, 30)).unwrap();
        assert!(tracker.current_record().is_none());
        assert_eq!(tracker.records()[0].elapsed_seconds(&at(4, 0, 0)), 1800);
    }

    #[test]
    fn resume_starts_a_copy() {
        let mut tracker = tracker();
        tracker.start_type("dev", &at(5, 9, 0)).unwrap();
        tracker.set_record_title(0, Some("design".to_string())).unwrap();
        tracker.finish_current(&at(5, 10, 0)).unwrap();
        tracker.resume_record(0, &at(5, 11, 0)).unwrap();

        let records = tracker.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title(), Some("design"));
        assert_eq!(records[0].end(), Some(at(5, 10, 0).with_timezone(&Utc)));
    }

    #[test]
    fn duplicate_access_keys_are_rejected() {
        let mut tracker = tracker();
        assert!(matches!(
            tracker.add_type("docs", Some("D")),
            Err(TrackerError::DuplicateAccessKey { ref owner, .. }) if owner == "dev"
        ));
        assert!(matches!(
            tracker.add_type("docs", Some("do")),
            Err(TrackerError::InvalidAccessKey(_))
        ));
        assert_eq!(tracker.types().len(), 2);

        tracker.set_type_access_key(0, Some("D")).expect("re-binding own key is allowed");
        tracker.add_type("docs", Some("o")).unwrap();
        assert!(tracker.set_type_access_key(2, Some("d")).is_err());
        assert_eq!(tracker.types()[2].access_key.as_deref(), Some("o"));
    }

    #[test]
    fn access_key_starts_its_type() {
        let mut tracker = tracker();
        let record = tracker.start_access_key("D", &at(6, 9, 0)).unwrap();
        assert_eq!(record.type_name(), "dev");
        assert!(matches!(
            tracker.start_access_key("z", &at(6, 9, 1)),
            Err(TrackerError::UnknownAccessKey(_))
        ));
    }

    #[test]
    fn deleting_a_type_leaves_history_readable() {
        let mut tracker = tracker();
        tracker.start_type("dev", &at(7, 9, 0)).unwrap();
        tracker.delete_type(0).unwrap();
        assert!(matches!(
            tracker.start_type("dev", &at(7, 10, 0)),
            Err(TrackerError::UnknownType(_))
        ));
        assert_eq!(tracker.type_label("dev"), format!("dev {UNKNOWN_TYPE_LABEL}"));
        assert_eq!(tracker.type_label("昼休憩"), "昼休憩");
        assert_eq!(tracker.type_choices("dev"), vec!["dev".to_string(), "昼休憩".to_string()]);

        let now = at(7, 11, 0);
        let summary = tracker.daily_summary(&start_of_date(&now), &now);
        assert_eq!(summary.rows[0].type_name, "dev");
    }

    #[test]
    fn groups_reorder_by_adjacent_swap() {
        let mut tracker = tracker();
        for name in ["a", "b", "c"] {
            tracker.add_group(name).unwrap();
        }
        assert_eq!(tracker.move_group(0, MoveDirection::Up).unwrap(), 0);
        assert_eq!(tracker.move_group(0, MoveDirection::Down).unwrap(), 1);
        assert_eq!(tracker.groups(), ["b".to_string(), "a".to_string(), "c".to_string()]);
        assert_eq!(tracker.move_group(2, MoveDirection::Down).unwrap(), 2);
        assert_eq!(tracker.delete_group(0).unwrap(), "b");
        assert_eq!(tracker.store().get(TODO_GROUP_KEY), Some(json!(["a", "c"])));
    }

    #[test]
    fn todo_edits_persist() {
        let mut tracker = tracker();
        tracker.add_todo(TodoItem::new("dev", "draft", None)).unwrap();
        tracker
            .update_todo(
                0,
                TodoPatch {
                    title: Some("final".to_string()),
                    memo: Some(Some(String::new())),
                    group: Some(Some("work".to_string())),
                    ..TodoPatch::default()
                },
            )
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        tracker.set_todo_deadline(0, Some(day), &jst()).unwrap();

        let todo = &tracker.todos()[0];
        assert_eq!(todo.title, "final");
        assert_eq!(todo.memo, None);
        assert_eq!(todo.group.as_deref(), Some("work"));
        let midnight = jst().with_ymd_and_hms(2026, 7, 20, 0, 0, 0).unwrap();
        assert_eq!(todo.deadline, Some(midnight.with_timezone(&Utc)));

        let stored = tracker.store().get(TODO_KEY).expect("persisted");
        assert_eq!(stored[0]["title"], "final");
        assert_eq!(stored[0]["group"], "work");

        let removed = tracker.delete_todo(0).unwrap();
        assert_eq!(removed.title, "final");
        assert!(tracker.todos().is_empty());
    }

    #[test]
    fn paste_requires_the_setting() {
        let mut tracker = tracker();
        let paste = PastedTodo {
            text: "Fix bug".to_string(),
            url: Some("https://example.com/1".to_string()),
        };
        assert!(matches!(
            tracker.add_todo_from_paste(paste.clone(), "dev"),
            Err(TrackerError::SettingDisabled(SettingKey::ClipboardToTodo))
        ));

        tracker.set_setting(SettingKey::ClipboardToTodo, true).unwrap();
        tracker.add_todo_from_paste(paste, "dev").unwrap();
        assert_eq!(tracker.todos()[0].memo.as_deref(), Some("https://example.com/1"));
        assert_eq!(tracker.store().get("setting.clipboard-to-todo"), Some(json!(true)));
    }

    #[test]
    fn state_survives_reopen() {
        let mut tracker = tracker();
        tracker.start_type("dev", &at(8, 9, 0)).unwrap();
        let Tracker { store, .. } = tracker;

        let reopened = Tracker::open(store, TrackerConfig::default(), &jst());
        assert_eq!(reopened.types().len(), 2);
        assert_eq!(reopened.records().len(), 1);
        assert!(reopened.records()[0].is_open());
        assert_eq!(reopened.records_of_day(&at(8, 0, 0)).len(), 1);
    }

    #[test]
    fn usage_reports_against_quota() {
        let tracker = tracker();
        let usage = tracker.usage();
        assert!(usage.bytes_in_use > 0);
        assert_eq!(usage.quota_bytes, crate::storage::QUOTA_BYTES);
        assert!(usage.percentage().value() < 1.0);
    }
}
