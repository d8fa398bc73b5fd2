//!
//! # 持久化模块
//! 用于将下载信息持久化到硬盘，用于断点恢复
//!

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::download::task::TaskState;

/// What survives a process restart: enough for the same config to pick
/// up where the stream stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub offset: u64,
    pub state: TaskState,
    pub total: Option<u64>,
}

impl TaskRecord {
    /// A record written mid-stream comes back as paused; the bytes on
    /// disk up to `offset` are still valid.
    pub fn normalized(mut self) -> Self {
        if self.state == TaskState::Downloading {
            self.state = TaskState::Paused;
        }
        self
    }
}

/// Key-value contract for task records, keyed by resolved save path.
pub trait ProgressStore: Send + Sync + 'static {
    fn save(&self, save_path: &Path, record: &TaskRecord) -> Result<()>;
    fn load(&self, save_path: &Path) -> Result<Option<TaskRecord>>;
    fn remove(&self, save_path: &Path) -> Result<()>;
}

/// One JSON file holding a map of save path to record.
pub struct JsonFileStore {
    file_path: PathBuf,
    records: parking_lot::Mutex<HashMap<PathBuf, TaskRecord>>,
}

impl JsonFileStore {
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = file_path.into();
        let records = if file_path.exists() {
            let data = fs::read_to_string(&file_path)
                .with_context(|| format!("read store file {:?}", file_path))?;
            serde_json::from_str(&data)
                .with_context(|| format!("parse store file {:?}", file_path))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            file_path,
            records: parking_lot::Mutex::new(records),
        })
    }

    fn persist(&self, records: &HashMap<PathBuf, TaskRecord>) -> Result<()> {
        let data = serde_json::to_string_pretty(records)?;
        fs::write(&self.file_path, data)
            .with_context(|| format!("write store file {:?}", self.file_path))?;
        Ok(())
    }
}

impl ProgressStore for JsonFileStore {
    fn save(&self, save_path: &Path, record: &TaskRecord) -> Result<()> {
        let mut records = self.records.lock();
        records.insert(save_path.to_path_buf(), record.clone());
        self.persist(&records)
    }

    fn load(&self, save_path: &Path) -> Result<Option<TaskRecord>> {
        Ok(self.records.lock().get(save_path).cloned())
    }

    fn remove(&self, save_path: &Path) -> Result<()> {
        let mut records = self.records.lock();
        records.remove(save_path);
        self.persist(&records)
    }
}

/// In-memory store for tests and throwaway tasks.
#[derive(Default)]
pub struct MemoryStore {
    records: parking_lot::Mutex<HashMap<PathBuf, TaskRecord>>,
}

impl ProgressStore for MemoryStore {
    fn save(&self, save_path: &Path, record: &TaskRecord) -> Result<()> {
        self.records.lock().insert(save_path.to_path_buf(), record.clone());
        Ok(())
    }

    fn load(&self, save_path: &Path) -> Result<Option<TaskRecord>> {
        Ok(self.records.lock().get(save_path).cloned())
    }

    fn remove(&self, save_path: &Path) -> Result<()> {
        self.records.lock().remove(save_path);
        Ok(())
    }
}
