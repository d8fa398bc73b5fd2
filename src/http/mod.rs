//!
//! # 请求管理模块
//!
//! Single and batched request execution: retry policy, result
//! conversion, cancellation and keyed aggregation.

pub mod aggregator;
pub mod converter;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod listener;
pub mod retry;

pub use aggregator::{AggregateResult, AggregateStatus, RequestAggregator};
pub use converter::{EnvelopeConverter, PassThrough, ResultConverter};
pub use descriptor::{RequestDescriptor, RequestFuture};
pub use error::{ErrorKind, HttpError, Outcome};
pub use executor::{CancelHandle, RequestExecutor};
pub use listener::{AggregateListener, HttpListener};
pub use retry::{Backoff, RetryDecision, RetryPolicy};
