use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Matches the local-storage quota browsers grant an extension.
pub const QUOTA_BYTES: usize = 10_485_760;

pub const RECORD_KEY: &str = "record";
pub const TODO_KEY: &str = "todo";
pub const TYPE_KEY: &str = "type";
pub const TODO_GROUP_KEY: &str = "todo-group";

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    JsonEncode(serde_json::Error),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::JsonEncode(err) => write!(f, "failed to encode store value: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Flat key/value persistence, the shape of a browser extension's local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError>;

    fn bytes_in_use(&self) -> usize;

    fn quota_bytes(&self) -> usize {
        QUOTA_BYTES
    }
}

/// All keys live in one JSON object that is rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Map<String, Value>,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let raw = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let data = if raw.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => set_aside(path, "not a JSON object")?,
                Err(err) => set_aside(path, &err.to_string())?,
            }
        };

        debug!(path = %path.display(), keys = data.len(), "opened store");
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current map to disk through a sibling temp file.
    pub fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StorageError::Io)?;
            }
        }

        let encoded = serde_json::to_string_pretty(&self.data).map_err(StorageError::JsonEncode)?;
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).map_err(StorageError::Io)?;
        file.write_all(encoded.as_bytes()).map_err(StorageError::Io)?;
        file.write_all(b"\n").map_err(StorageError::Io)?;
        file.sync_all().map_err(StorageError::Io)?;
        fs::rename(&temp_path, &self.path).map_err(StorageError::Io)?;
        Ok(())
    }
}

/// Renames an unreadable store file out of the way so the next write does
/// not clobber it, and starts from an empty map.
fn set_aside(path: &Path, reason: &str) -> Result<Map<String, Value>, StorageError> {
    let backup = path.with_extension("json.broken");
    fs::rename(path, &backup).map_err(StorageError::Io)?;
    warn!(
        path = %path.display(),
        backup = %backup.display(),
        reason,
        "store file unreadable, moved aside"
    );
    Ok(Map::new())
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value);
        self.flush()
    }

    fn bytes_in_use(&self) -> usize {
        entries_size(self.data.iter())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: HashMap<String, Value>,
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn bytes_in_use(&self) -> usize {
        entries_size(self.data.iter())
    }
}

fn entries_size<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> usize {
    entries
        .map(|(key, value)| key.len() + value.to_string().len())
        .sum()
}

/// An ordered list mirrored into a single store slot.
///
/// The in-memory items are authoritative between loads; every write pushes
/// the whole list back under `key`.
#[derive(Debug, Clone)]
pub struct ListStore<T> {
    key: &'static str,
    items: Vec<T>,
}

impl<T> ListStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn load(store: &impl KeyValueStore, key: &'static str, defaults: Vec<T>) -> Self {
        Self::load_with(store, key, defaults, |item| item)
    }

    /// Loads the slot, falling back to `defaults` when it is absent or not a
    /// list, then runs `transform` over every item. Items that do not decode
    /// as `T` are skipped.
    pub fn load_with(
        store: &impl KeyValueStore,
        key: &'static str,
        defaults: Vec<T>,
        transform: impl Fn(T) -> T,
    ) -> Self {
        let items = match store.get(key) {
            Some(Value::Array(raw)) => raw
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| match serde_json::from_value::<T>(item) {
                    Ok(item) => Some(item),
                    Err(err) => {
                        warn!(key, index, error = %err, "skipping malformed item in store");
                        None
                    }
                })
                .collect(),
            None | Some(Value::Null) => defaults,
            Some(_) => {
                warn!(key, "ignoring non-list value in store");
                defaults
            }
        };

        Self {
            key,
            items: items.into_iter().map(transform).collect(),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn append(&mut self, store: &mut impl KeyValueStore, item: T) -> Result<(), StorageError> {
        self.items.push(item);
        self.persist_current(store)
    }

    /// Swaps in a new snapshot of the list and persists it.
    pub fn replace(
        &mut self,
        store: &mut impl KeyValueStore,
        items: Vec<T>,
    ) -> Result<(), StorageError> {
        self.items = items;
        self.persist_current(store)
    }

    /// Writes the in-memory list to its slot as it stands.
    pub fn persist_current(&self, store: &mut impl KeyValueStore) -> Result<(), StorageError> {
        let value = serde_json::to_value(&self.items).map_err(StorageError::JsonEncode)?;
        store.set(self.key, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ClipboardToTodo,
    UseTodoGroup,
    UseTodoDeadline,
    DetailVisible,
    NoTitleOrMemo,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::ClipboardToTodo,
        SettingKey::UseTodoGroup,
        SettingKey::UseTodoDeadline,
        SettingKey::DetailVisible,
        SettingKey::NoTitleOrMemo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingKey::ClipboardToTodo => "clipboard-to-todo",
            SettingKey::UseTodoGroup => "use-todo-group",
            SettingKey::UseTodoDeadline => "use-todo-deadline",
            SettingKey::DetailVisible => "detail-visible",
            SettingKey::NoTitleOrMemo => "no-title_or_memo",
        }
    }

    pub fn storage_key(self) -> String {
        format!("setting.{}", self.name())
    }

    pub fn label(self) -> &'static str {
        match self {
            SettingKey::ClipboardToTodo => "Paste into todo list",
            SettingKey::UseTodoGroup => "Group todos",
            SettingKey::UseTodoDeadline => "Todo deadlines",
            SettingKey::DetailVisible => "Show summary details",
            SettingKey::NoTitleOrMemo => "Include records without title or memo in details",
        }
    }
}

impl FromStr for SettingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| {
                let known = SettingKey::ALL.map(SettingKey::name).join(", ");
                format!("unknown setting '{s}' (expected one of: {known})")
            })
    }
}

/// Reads `key`, using `default` when it is missing or holds a different type.
pub fn load_setting<T: DeserializeOwned>(store: &impl KeyValueStore, key: &str, default: T) -> T {
    match store.get(key) {
        Some(raw) => serde_json::from_value(raw).unwrap_or_else(|err| {
            warn!(key, error = %err, "ignoring malformed setting");
            default
        }),
        None => default,
    }
}

pub fn save_setting<T: Serialize>(
    store: &mut impl KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value).map_err(StorageError::JsonEncode)?;
    store.set(key, value)
}

/// The boolean toggles the tracker knows about.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<SettingKey, bool>,
}

impl Settings {
    pub fn load(store: &impl KeyValueStore) -> Self {
        let values = SettingKey::ALL
            .into_iter()
            .map(|key| (key, load_setting(store, &key.storage_key(), false)))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: SettingKey) -> bool {
        self.values.get(&key).copied().unwrap_or(false)
    }

    pub fn set(
        &mut self,
        store: &mut impl KeyValueStore,
        key: SettingKey,
        value: bool,
    ) -> Result<(), StorageError> {
        self.values.insert(key, value);
        save_setting(store, &key.storage_key(), &value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn append_survives_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("store.json");

        let mut store = JsonFileStore::open(&path).expect("open empty store");
        let mut list = ListStore::<String>::load(&store, TODO_GROUP_KEY, Vec::new());
        list.append(&mut store, "work".to_string()).expect("append");
        list.append(&mut store, "home".to_string()).expect("append");
        assert_eq!(list.items().last().map(String::as_str), Some("home"));

        let reopened = JsonFileStore::open(&path).expect("reopen store");
        let reloaded = ListStore::<String>::load(&reopened, TODO_GROUP_KEY, Vec::new());
        assert_eq!(reloaded.items(), ["work".to_string(), "home".to_string()]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn malformed_slot_falls_back_to_defaults() {
        let mut store = MemoryStore::default();
        store.set(TODO_GROUP_KEY, json!({"not": "a list"})).unwrap();
        let list = ListStore::<String>::load(&store, TODO_GROUP_KEY, vec!["fallback".to_string()]);
        assert_eq!(list.items(), ["fallback".to_string()]);

        let absent = ListStore::<String>::load(&store, TYPE_KEY, Vec::new());
        assert!(absent.items().is_empty());
    }

    #[test]
    fn load_applies_transform_to_each_item() {
        let mut store = MemoryStore::default();
        store.set(TODO_GROUP_KEY, json!(["a", "b"])).unwrap();
        let list = ListStore::<String>::load_with(&store, TODO_GROUP_KEY, Vec::new(), |item| {
            item.to_uppercase()
        });
        assert_eq!(list.items(), ["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn replace_writes_the_new_snapshot() {
        let mut store = MemoryStore::default();
        let mut list = ListStore::load(&store, TODO_GROUP_KEY, vec!["a".to_string()]);
        list.replace(&mut store, vec!["b".to_string(), "c".to_string()]).unwrap();
        assert_eq!(store.get(TODO_GROUP_KEY), Some(json!(["b", "c"])));
    }

    #[test]
    fn settings_use_defaults_until_stored() {
        let mut store = MemoryStore::default();
        store.set("setting.detail-visible", json!("yes")).unwrap();
        let mut settings = Settings::load(&store);
        assert!(!settings.get(SettingKey::DetailVisible));

        settings.set(&mut store, SettingKey::UseTodoGroup, true).unwrap();
        assert_eq!(store.get("setting.use-todo-group"), Some(json!(true)));
        assert!(Settings::load(&store).get(SettingKey::UseTodoGroup));
        assert_eq!(load_setting(&store, "setting.missing", "fallback".to_string()), "fallback");
    }

    #[test]
    fn parses_setting_names() {
        assert_eq!("no-title_or_memo".parse::<SettingKey>(), Ok(SettingKey::NoTitleOrMemo));
        assert!("nope".parse::<SettingKey>().is_err());
    }

    #[test]
    fn unreadable_store_files_are_moved_aside() {
        let dir = tempfile::tempdir().expect("temp dir");
        for raw in ["[1, 2]", "{\"record\": [ broken"] {
            let path = dir.path().join("store.json");
            fs::write(&path, raw).unwrap();

            let mut store = JsonFileStore::open(&path).expect("open tolerates bad file");
            assert_eq!(store.get(RECORD_KEY), None);
            let backup = path.with_extension("json.broken");
            assert_eq!(fs::read_to_string(&backup).unwrap(), raw);

            store.set(TODO_GROUP_KEY, json!(["work"])).unwrap();
            assert_eq!(fs::read_to_string(&backup).unwrap(), raw);
            fs::remove_file(&backup).unwrap();
        }
    }

    #[test]
    fn malformed_items_are_skipped_not_the_whole_list() {
        let mut store = MemoryStore::default();
        store
            .set(TODO_GROUP_KEY, json!(["work", 42, "home", {"name": "x"}]))
            .unwrap();
        let defaults = vec!["fallback".to_string()];
        let mut list = ListStore::<String>::load(&store, TODO_GROUP_KEY, defaults);
        assert_eq!(list.items(), ["work".to_string(), "home".to_string()]);

        list.append(&mut store, "errands".to_string()).unwrap();
        let reloaded = ListStore::<String>::load(&store, TODO_GROUP_KEY, Vec::new());
        assert_eq!(
            reloaded.items(),
            ["work".to_string(), "home".to_string(), "errands".to_string()]
        );
    }

    #[test]
    fn persist_current_mirrors_loaded_defaults() {
        let mut store = MemoryStore::default();
        let list = ListStore::load(&store, TODO_GROUP_KEY, vec!["default".to_string()]);
        assert_eq!(store.get(TODO_GROUP_KEY), None);
        list.persist_current(&mut store).unwrap();
        assert_eq!(store.get(TODO_GROUP_KEY), Some(json!(["default"])));
    }

    #[test]
    fn reports_usage_against_quota() {
        let mut store = MemoryStore::default();
        store.set("k", json!([1])).unwrap();
        assert_eq!(store.bytes_in_use(), "k".len() + "[1]".len());
        assert_eq!(store.quota_bytes(), QUOTA_BYTES);
    }
}
