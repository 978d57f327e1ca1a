#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::Command;
use chrono::Utc;
use taskorder::config::Config;
use taskorder::item::{OrderedItem, PlacementIntention, Scope};
use taskorder::rebalance::{RebalanceDispatcher, RebalanceQueue};
use taskorder::space::Position;
use taskorder::storage::Storage;
use taskorder::store::{FileStore, MemoryStore, OrderedListStore};
use taskorder::Orderer;
use tempfile::TempDir;

pub struct TestRoot {
    dir: TempDir,
}

impl TestRoot {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    /// A root with `.taskorder/` already initialized
    pub fn init() -> Self {
        let root = Self::new();
        root.storage().init().expect("init storage");
        root
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.dir.path().to_path_buf())
    }

    pub fn file_store(&self) -> FileStore {
        FileStore::new(self.storage())
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(".taskorder.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = taskorder_cmd();
        cmd.current_dir(self.path());
        cmd
    }
}

pub fn taskorder_cmd() -> Command {
    let mut cmd = Command::cargo_bin("taskorder").expect("binary");
    cmd.env_remove("TASKORDER_ROOT");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Insert a finalized item at a fixed position, bypassing allocation
pub fn seed_item(
    store: &dyn OrderedListStore,
    scope: &Scope,
    id: &str,
    position: Position,
) -> OrderedItem {
    let mut item = OrderedItem::new(id, scope.clone(), PlacementIntention::None);
    item.id = id.to_string();
    item.finalize(position, Utc::now());
    store.insert(&item).expect("seed item");
    item
}

pub fn positions(store: &dyn OrderedListStore, scope: &Scope) -> Vec<Position> {
    store
        .kept_siblings(scope, None)
        .expect("siblings")
        .into_iter()
        .map(|item| item.position)
        .collect()
}

pub fn ids(store: &dyn OrderedListStore, scope: &Scope) -> Vec<String> {
    store
        .kept_siblings(scope, None)
        .expect("siblings")
        .into_iter()
        .map(|item| item.id)
        .collect()
}

/// Orderer over a memory store whose rebalance requests land in a queue
pub fn memory_orderer() -> (Orderer<MemoryStore>, Arc<RebalanceQueue>) {
    let queue = Arc::new(RebalanceQueue::new());
    let orderer = Orderer::new(
        Arc::new(MemoryStore::new()),
        &Config::default(),
        Arc::clone(&queue) as Arc<dyn RebalanceDispatcher>,
    );
    (orderer, queue)
}
