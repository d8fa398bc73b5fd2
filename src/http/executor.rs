use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::delivery::DeliveryContext;
use crate::http::descriptor::RequestDescriptor;
use crate::http::error::{HttpError, Outcome};
use crate::http::listener::HttpListener;

/// Handle returned from `execute`/`run`. Cancelling before terminal
/// delivery suppresses every listener callback; after delivery it is a
/// no-op.
pub struct CancelHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CancelHandle {
    pub(crate) fn new(token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the worker to finish, cancelled or not. Mostly useful in
    /// tests together with `DeliveryContext::flush`.
    pub async fn wait(&mut self) {
        let _ = (&mut self.handle).await;
    }
}

/// Drives one attempt sequence to its terminal outcome. Transport errors
/// go through the descriptor's retry policy, conversion failures are
/// terminal unless the policy explicitly accepts application errors, and
/// cancellation wins at every await point.
pub(crate) async fn run_attempts(
    descriptor: &RequestDescriptor,
    token: &CancellationToken,
) -> Outcome<Bytes> {
    let mut attempt = 0usize;
    loop {
        attempt += 1;

        let raw = tokio::select! {
            _ = token.cancelled() => return Outcome::Failure(HttpError::cancelled()),
            raw = descriptor.operation() => raw,
        };

        let error = match raw {
            Ok(payload) => match descriptor.converter().convert(payload) {
                Ok(value) => return Outcome::Success(value),
                Err(err) => err,
            },
            Err(err) => err,
        };

        let decision = descriptor.retry().should_retry(&error, attempt);
        if !decision.retry {
            info!(
                "request {} failed after {} attempt(s): {}",
                descriptor.id(),
                attempt,
                error
            );
            return Outcome::Failure(error);
        }

        debug!(
            "request {} attempt {}/{} failed, retrying in {:?}: {}",
            descriptor.id(),
            attempt,
            descriptor.retry().max_attempts(),
            decision.delay,
            error
        );

        tokio::select! {
            _ = token.cancelled() => return Outcome::Failure(HttpError::cancelled()),
            _ = tokio::time::sleep(decision.delay) => {}
        }
    }
}

/// Executes single request descriptors and delivers exactly one terminal
/// outcome per execution on the delivery context.
pub struct RequestExecutor {
    delivery: DeliveryContext,
}

impl RequestExecutor {
    pub fn new(delivery: DeliveryContext) -> Self {
        Self { delivery }
    }

    pub fn execute(
        &self,
        descriptor: Arc<RequestDescriptor>,
        listener: Arc<dyn HttpListener>,
    ) -> CancelHandle {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let delivery = self.delivery.clone();

        let handle = tokio::spawn(async move {
            let outcome = run_attempts(&descriptor, &worker_token).await;
            if worker_token.is_cancelled() {
                return;
            }

            delivery.dispatch(move || {
                // Cancel may land between dispatch and run; suppress then too
                if worker_token.is_cancelled() {
                    return;
                }
                match outcome {
                    Outcome::Success(payload) => listener.on_success(payload),
                    Outcome::Failure(err) => listener.on_error(err),
                }
            });
        });

        CancelHandle::new(token, handle)
    }
}
