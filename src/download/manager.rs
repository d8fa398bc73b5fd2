use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use crate::delivery::DeliveryContext;
use crate::download::config::DownloadConfig;
use crate::download::persistence::{ProgressStore, TaskRecord};
use crate::download::progress::DownloadProgress;
use crate::download::task::{DownloadListener, DownloadTask, TaskState};
use crate::download::transport::Transport;

/// Registry of download tasks keyed by resolved save path. Constructed
/// and injected explicitly; equal configs always resolve to the same
/// live task. Creating a task loads its persisted record, so a fresh
/// process picks up interrupted downloads where they stopped.
pub struct DownloadTaskManager {
    transport: Arc<dyn Transport>,
    store: Arc<dyn ProgressStore>,
    delivery: DeliveryContext,
    tasks: Mutex<HashMap<PathBuf, Arc<DownloadTask>>>,
}

impl DownloadTaskManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn ProgressStore>,
        delivery: DeliveryContext,
    ) -> Self {
        Self {
            transport,
            store,
            delivery,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, config: &DownloadConfig) -> Option<Arc<DownloadTask>> {
        self.tasks.lock().get(&config.save_path()).cloned()
    }

    fn load_record(&self, save_path: &Path) -> Option<TaskRecord> {
        self.store
            .load(save_path)
            .unwrap_or_else(|err| {
                warn!("loading record for {:?} failed: {:#}", save_path, err);
                None
            })
            .map(TaskRecord::normalized)
    }

    fn task_of(&self, config: &DownloadConfig) -> Arc<DownloadTask> {
        let save_path = config.save_path();
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.get(&save_path) {
            return task.clone();
        }

        let record = self.load_record(&save_path);
        let task = DownloadTask::new(
            config.clone(),
            self.transport.clone(),
            self.store.clone(),
            self.delivery.clone(),
            record,
        );
        tasks.insert(save_path, task.clone());
        task
    }

    pub fn bind_listener(&self, config: &DownloadConfig, listener: Arc<dyn DownloadListener>) {
        self.task_of(config).bind_listener(listener);
    }

    pub fn unbind_listener(&self, config: &DownloadConfig) {
        if let Some(task) = self.tasks.lock().get(&config.save_path()) {
            task.unbind_listener();
        }
    }

    /// Start or resume the task for this config.
    pub fn down(&self, config: &DownloadConfig) {
        self.task_of(config).start();
    }

    pub fn pause(&self, config: &DownloadConfig) {
        if let Some(task) = self.tasks.lock().get(&config.save_path()) {
            task.pause();
        }
    }

    /// Delete the task, its file and its persisted record, and evict it
    /// from the registry so the same config starts over from scratch.
    pub fn delete(&self, config: &DownloadConfig) {
        let task = self.task_of(config);
        task.delete();
        self.tasks.lock().remove(&config.save_path());
    }

    /// Pure query: a live task answers directly, otherwise the
    /// persisted record does. Never registers a task.
    pub fn get_progress(&self, config: &DownloadConfig) -> DownloadProgress {
        if let Some(task) = self.lookup(config) {
            return task.progress();
        }
        match self.load_record(&config.save_path()) {
            Some(record) => DownloadProgress::new(record.offset, record.total),
            None => DownloadProgress::default(),
        }
    }

    pub fn state(&self, config: &DownloadConfig) -> TaskState {
        if let Some(task) = self.lookup(config) {
            return task.state();
        }
        match self.load_record(&config.save_path()) {
            Some(record) => record.state,
            None => TaskState::Idle,
        }
    }

    pub fn is_downloading(&self, config: &DownloadConfig) -> bool {
        self.state(config) == TaskState::Downloading
    }

    pub fn is_paused(&self, config: &DownloadConfig) -> bool {
        self.state(config) == TaskState::Paused
    }

    pub fn is_completed(&self, config: &DownloadConfig) -> bool {
        self.state(config) == TaskState::Completed
    }

    pub fn is_error(&self, config: &DownloadConfig) -> bool {
        self.state(config) == TaskState::Error
    }
}
