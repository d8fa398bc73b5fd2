use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::{Client, Request};
use url::Url;
use uuid::Uuid;

use crate::http::converter::{PassThrough, ResultConverter};
use crate::http::error::HttpError;
use crate::http::retry::RetryPolicy;

pub type RequestFuture = BoxFuture<'static, Result<Bytes, HttpError>>;

/// Identity plus behavior for one issuable request: a retry policy, a
/// result converter and a factory producing the underlying operation.
/// The factory is called once per attempt so every retry gets a fresh
/// future. Identity is the id, not value equality.
pub struct RequestDescriptor {
    id: Uuid,
    retry: RetryPolicy,
    converter: Arc<dyn ResultConverter>,
    operation: Arc<dyn Fn() -> RequestFuture + Send + Sync>,
}

impl RequestDescriptor {
    pub fn new<F>(operation: F) -> Self
    where
        F: Fn() -> RequestFuture + Send + Sync + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            retry: RetryPolicy::default(),
            converter: Arc::new(PassThrough),
            operation: Arc::new(operation),
        }
    }

    /// One plain GET. Each attempt re-issues a fresh request since a
    /// reqwest Request is consumed by execute.
    pub fn get(client: Client, url: Url) -> Self {
        Self::new(move || {
            let client = client.clone();
            let request = Request::new(reqwest::Method::GET, url.clone());
            Box::pin(async move {
                let response = client.execute(request).await?;
                if !response.status().is_success() {
                    return Err(HttpError::transient(format!(
                        "HTTP {} from {}",
                        response.status(),
                        response.url()
                    )));
                }
                Ok(response.bytes().await?)
            })
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_converter(mut self, converter: impl ResultConverter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn converter(&self) -> &dyn ResultConverter {
        self.converter.as_ref()
    }

    pub(crate) fn operation(&self) -> RequestFuture {
        (self.operation)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_per_descriptor() {
        let a = RequestDescriptor::new(|| Box::pin(async { Ok(Bytes::new()) }));
        let b = RequestDescriptor::new(|| Box::pin(async { Ok(Bytes::new()) }));
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn factory_builds_a_fresh_operation_per_call() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let descriptor = RequestDescriptor::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Bytes::from_static(b"ok")) })
        });

        descriptor.operation().await.unwrap();
        descriptor.operation().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
