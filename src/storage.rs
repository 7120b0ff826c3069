//! Durable key/value storage for the persisted stores.
//!
//! Each key maps to one JSON document at `<dir>/<key>.json`.

use crate::error::StorageError;
use crate::store::Store;
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const USER_PREFERENCES_KEY: &str = "app_user_preferences";
pub const USER_CHOICES_KEY: &str = "lk-user-choices";

#[derive(Debug)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Using local storage at {}", dir.display());
        Ok(LocalStorage { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_of(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Write then rename so a crash never leaves a truncated record.
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path_of(key))?;
        Ok(())
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set_item(key, &raw)
    }

    /// Reads the record for `key` merged over `T::default()`.
    ///
    /// Fields missing from the stored record keep their default. A missing
    /// record yields the default silently; an unreadable or malformed one is
    /// logged and also yields the default.
    pub fn load_or_default<T>(&self, key: &str) -> T
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let raw = match self.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!("Failed to read stored {}: {}", key, e);
                return T::default();
            }
        };

        match merge_over_default::<T>(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring malformed stored {}: {}", key, e);
                T::default()
            }
        }
    }
}

fn merge_over_default<T>(raw: &str) -> Result<T, serde_json::Error>
where
    T: Serialize + DeserializeOwned + Default,
{
    let stored: Value = serde_json::from_str(raw)?;
    let mut merged = serde_json::to_value(T::default())?;

    match (&mut merged, stored) {
        (Value::Object(defaults), Value::Object(stored)) => {
            for (field, value) in stored {
                defaults.insert(field, value);
            }
        }
        (_, stored) => merged = stored,
    }

    serde_json::from_value(merged)
}

/// Store initialised from `storage[key]` that rewrites the record on every
/// mutation.
pub fn persisted_store<T>(storage: Arc<LocalStorage>, key: &'static str) -> Store<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static,
{
    let initial = storage.load_or_default::<T>(key);

    Store::with_hook(key, initial, move |state: &T| {
        if let Err(e) = storage.save(key, state) {
            error!("Failed to persist {}: {}", key, e);
        }
    })
}
