use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Collection {
    Plans,
    Exercises,
    Workouts,
    Sets,
}

impl Collection {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Plans => "workout_plans",
            Self::Exercises => "workout_exercises",
            Self::Workouts => "workouts",
            Self::Sets => "workout_sets",
        }
    }
}

/// One slot per collection: the whole collection is a single textual blob.
pub trait Storage: Send + Sync {
    fn read(&self, collection: Collection) -> io::Result<Option<String>>;
    fn write(&self, collection: Collection, blob: &str) -> io::Result<()>;
}

#[derive(Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<&'static str, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, collection: Collection) -> io::Result<Option<String>> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(slots.get(collection.as_key()).cloned())
    }

    fn write(&self, collection: Collection, blob: &str) -> io::Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.insert(collection.as_key(), blob.to_string());
        Ok(())
    }
}

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn slot_path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.as_key()))
    }
}

impl Storage for FileStorage {
    fn read(&self, collection: Collection) -> io::Result<Option<String>> {
        match fs::read_to_string(self.slot_path(collection)) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, collection: Collection, blob: &str) -> io::Result<()> {
        // Temp file + rename so a crash mid-write never truncates a slot.
        let target = self.slot_path(collection);
        let temp = target.with_extension("json.tmp");
        fs::write(&temp, blob)?;
        fs::rename(&temp, target)
    }
}

/// Advisory single-writer lock for a [`FileStorage`] directory. The caller
/// holds the write guard for the lifetime of the session.
pub fn open_lock(dir: &Path) -> io::Result<fd_lock::RwLock<File>> {
    let lock_path = dir.join("store.lock");
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}
