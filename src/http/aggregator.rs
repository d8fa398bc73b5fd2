use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::delivery::DeliveryContext;
use crate::http::descriptor::RequestDescriptor;
use crate::http::error::Outcome;
use crate::http::executor::{run_attempts, CancelHandle};
use crate::http::listener::AggregateListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    AllSucceeded,
    PartialFailure,
    FatalAbort,
}

/// Keyed results of one batch, frozen before it reaches the listener.
/// Successful entries hold whatever `on_single_outcome` produced.
pub struct AggregateResult {
    entries: HashMap<Uuid, Outcome<Box<dyn Any + Send>>>,
    status: AggregateStatus,
}

impl AggregateResult {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            status: AggregateStatus::AllSucceeded,
        }
    }

    pub fn status(&self) -> AggregateStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, descriptor: &RequestDescriptor) -> Option<&Outcome<Box<dyn Any + Send>>> {
        self.entries.get(&descriptor.id())
    }

    /// Successful entry for `descriptor`, downcast to the type
    /// `on_single_outcome` stored.
    pub fn success_of<T: 'static>(&self, descriptor: &RequestDescriptor) -> Option<&T> {
        self.get(descriptor)?.success()?.downcast_ref::<T>()
    }
}

struct Collector {
    result: AggregateResult,
    listener: Arc<dyn AggregateListener>,
    aborted: bool,
}

impl Collector {
    fn new(listener: Arc<dyn AggregateListener>) -> Self {
        Self {
            result: AggregateResult::new(),
            listener,
            aborted: false,
        }
    }

    fn record(&mut self, descriptor: &RequestDescriptor, outcome: Outcome<bytes::Bytes>) {
        match outcome {
            Outcome::Success(payload) => {
                let value = self.listener.on_single_outcome(descriptor, payload);
                self.result.entries.insert(descriptor.id(), Outcome::Success(value));
            }
            Outcome::Failure(err) => {
                warn!("aggregate member {} failed: {}", descriptor.id(), err);
                if self.listener.on_single_error(descriptor, &err) {
                    self.aborted = true;
                }
                self.result.entries.insert(descriptor.id(), Outcome::Failure(err));
            }
        }
    }

    fn freeze(mut self) -> AggregateResult {
        self.result.status = if self.aborted {
            AggregateStatus::FatalAbort
        } else if self.result.entries.values().any(|entry| !entry.is_success()) {
            AggregateStatus::PartialFailure
        } else {
            AggregateStatus::AllSucceeded
        };
        self.result
    }
}

/// Fans out a batch of request descriptors, sequentially or
/// concurrently, and delivers one frozen AggregateResult when every
/// member is terminal. Member failures are isolated into the result
/// unless the listener signals abort.
pub struct RequestAggregator {
    delivery: DeliveryContext,
}

impl RequestAggregator {
    pub fn new(delivery: DeliveryContext) -> Self {
        Self { delivery }
    }

    pub fn run(
        &self,
        descriptors: Vec<Arc<RequestDescriptor>>,
        ordered: bool,
        listener: Arc<dyn AggregateListener>,
    ) -> CancelHandle {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let delivery = self.delivery.clone();

        let handle = tokio::spawn(async move {
            let collector = Collector::new(listener.clone());
            let collector = if ordered {
                run_ordered(descriptors, collector, &worker_token).await
            } else {
                run_unordered(descriptors, collector, &worker_token).await
            };

            if worker_token.is_cancelled() {
                debug!("aggregate cancelled, completion suppressed");
                return;
            }

            let result = collector.freeze();
            info!(
                "aggregate finished: {} entries, status {:?}",
                result.len(),
                result.status()
            );
            delivery.dispatch(move || {
                if worker_token.is_cancelled() {
                    return;
                }
                listener.on_complete(result);
            });
        });

        CancelHandle::new(token, handle)
    }
}

/// Strictly one at a time, next member starts only after the previous
/// recorded its terminal outcome.
async fn run_ordered(
    descriptors: Vec<Arc<RequestDescriptor>>,
    mut collector: Collector,
    token: &CancellationToken,
) -> Collector {
    for descriptor in descriptors {
        if token.is_cancelled() || collector.aborted {
            break;
        }
        let outcome = run_attempts(&descriptor, token).await;
        if token.is_cancelled() {
            break;
        }
        collector.record(&descriptor, outcome);
    }
    collector
}

/// All members in flight at once; completion order is whatever the
/// operations yield.
async fn run_unordered(
    descriptors: Vec<Arc<RequestDescriptor>>,
    mut collector: Collector,
    token: &CancellationToken,
) -> Collector {
    // Child token so an abort stops the members without suppressing the
    // aggregate completion itself
    let member_token = token.child_token();

    let mut members = JoinSet::new();
    for descriptor in descriptors {
        let member_token = member_token.clone();
        members.spawn(async move {
            let outcome = run_attempts(&descriptor, &member_token).await;
            (descriptor, outcome)
        });
    }

    while let Some(joined) = members.join_next().await {
        if token.is_cancelled() {
            break;
        }
        let Ok((descriptor, outcome)) = joined else {
            continue;
        };
        collector.record(&descriptor, outcome);
        if collector.aborted {
            // Stop in-flight siblings, already-terminal entries stay
            member_token.cancel();
            members.abort_all();
            break;
        }
    }
    collector
}
