//! Client-side request orchestration.
//!
//! Single and batched HTTP requests with per-request retry policy,
//! result conversion and cancellation, plus long-running resumable
//! downloads with pause/delete, throttled progress callbacks and
//! offsets persisted for crash recovery.
//!
//! All listener callbacks are delivered on one [`DeliveryContext`] so
//! caller-owned state never races the workers.

pub mod delivery;
pub mod download;
pub mod http;
pub mod logger;

pub use delivery::DeliveryContext;
pub use download::{
    DownloadConfig, DownloadListener, DownloadProgress, DownloadTask, DownloadTaskManager,
    HttpTransport, JsonFileStore, ProgressStep, ProgressStore, TaskState, Transport,
};
pub use http::{
    AggregateListener, AggregateResult, AggregateStatus, CancelHandle, ErrorKind, HttpError,
    HttpListener, Outcome, RequestAggregator, RequestDescriptor, RequestExecutor, ResultConverter,
    RetryPolicy,
};
