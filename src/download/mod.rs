//!
//! # 下载任务模块
//!
//! Resumable, pausable downloads: per-task state machine, throttled
//! progress notifications and persisted offsets for crash recovery.

pub mod config;
pub mod manager;
pub mod persistence;
pub mod progress;
pub mod task;
pub mod transport;

pub use config::{DownloadConfig, ProgressStep};
pub use manager::DownloadTaskManager;
pub use persistence::{JsonFileStore, MemoryStore, ProgressStore, TaskRecord};
pub use progress::DownloadProgress;
pub use task::{DownloadListener, DownloadTask, TaskState};
pub use transport::{ByteStream, HttpTransport, Transport};
