//! Storage layout for taskorder
//!
//! # Directory Structure
//!
//! ```text
//! <root>/
//!   .taskorder.toml             # Optional configuration
//!   .taskorder/                 # Data directory
//!     items.json                # Snapshot of every item (kept and tombstoned)
//!     items.lock                # fs2 lock guarding snapshot rewrites
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::item::OrderedItem;

/// Name of the data directory under the root
pub const DATA_DIR: &str = ".taskorder";

const ITEMS_FILE: &str = "items.json";
const ITEMS_LOCK: &str = "items.lock";
const ITEMS_SCHEMA_VERSION: &str = "taskorder.items.v1";

/// Storage manager for taskorder state
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the `.taskorder/` data directory
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Path to the item snapshot
    pub fn items_file(&self) -> PathBuf {
        self.data_dir().join(ITEMS_FILE)
    }

    /// Path to the lock file guarding the item snapshot
    pub fn items_lock_file(&self) -> PathBuf {
        self.data_dir().join(ITEMS_LOCK)
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Create the data directory and an empty snapshot if missing
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir())?;

        let items_file = self.items_file();
        if !items_file.exists() {
            self.write_json(&items_file, &ItemSnapshot::empty())?;
        }

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.items_file().exists()
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized(self.root.clone()))
        }
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Write JSON data atomically (write to temp, then rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        self.write_atomic(path, json.as_bytes())
    }

    /// Read JSON data from a file
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    /// Write data atomically using temp file + rename
    ///
    /// Readers see either the previous file or the complete new one.
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;

        fs::rename(&temp_path, path)?;

        Ok(())
    }

    // =========================================================================
    // Item snapshot
    // =========================================================================

    pub fn read_items(&self) -> Result<ItemSnapshot> {
        self.ensure_initialized()?;
        self.read_json(&self.items_file())
    }

    /// Caller must hold the items lock
    pub fn write_items(&self, snapshot: &mut ItemSnapshot) -> Result<()> {
        snapshot.items.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| a.position.cmp(&b.position))
                .then_with(|| a.id.cmp(&b.id))
        });
        snapshot.generated_at = Utc::now();
        self.write_json(&self.items_file(), snapshot)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<OrderedItem>,
}

impl ItemSnapshot {
    pub fn empty() -> Self {
        Self {
            schema_version: ITEMS_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{PlacementIntention, Scope};
    use tempfile::TempDir;

    #[test]
    fn test_storage_paths() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let storage = Storage::new(root.clone());

        assert_eq!(storage.data_dir(), root.join(".taskorder"));
        assert_eq!(storage.items_file(), root.join(".taskorder/items.json"));
        assert_eq!(storage.items_lock_file(), root.join(".taskorder/items.lock"));
    }

    #[test]
    fn test_init_creates_empty_snapshot() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path().to_path_buf());
        assert!(!storage.is_initialized());
        assert!(matches!(
            storage.read_items(),
            Err(Error::NotInitialized(_))
        ));

        storage.init().unwrap();
        assert!(storage.is_initialized());
        let snapshot = storage.read_items().unwrap();
        assert_eq!(snapshot.schema_version, ITEMS_SCHEMA_VERSION);
        assert!(snapshot.items.is_empty());
    }

    #[test]
    fn test_write_items_orders_by_scope_then_position() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path().to_path_buf());
        storage.init().unwrap();

        let mut late = OrderedItem::new("late", Scope::root("job"), PlacementIntention::None);
        late.position = 300;
        let mut early = OrderedItem::new("early", Scope::root("job"), PlacementIntention::None);
        early.position = 100;

        let mut snapshot = ItemSnapshot::empty();
        snapshot.items = vec![late, early];
        storage.write_items(&mut snapshot).unwrap();

        let read_back = storage.read_items().unwrap();
        let titles: Vec<&str> = read_back.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["early", "late"]);
        assert!(!storage.items_file().with_extension("tmp").exists());
    }
}
