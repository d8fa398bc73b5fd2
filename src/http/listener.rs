use std::any::Any;

use bytes::Bytes;

use crate::http::aggregator::AggregateResult;
use crate::http::descriptor::RequestDescriptor;
use crate::http::error::HttpError;

/// Terminal callbacks for one request. Exactly one of the two fires per
/// execution, on the delivery context, unless the request is cancelled
/// first.
pub trait HttpListener: Send + Sync {
    fn on_success(&self, payload: Bytes);
    fn on_error(&self, error: HttpError);
}

/// Callbacks for a batch of requests. Only `on_complete` is required;
/// the per-member hooks default to pass-through / keep-going so callers
/// supply just what they need.
pub trait AggregateListener: Send + Sync {
    /// Post-process one member's payload before it is stored into the
    /// aggregate result, typically domain-object parsing.
    fn on_single_outcome(
        &self,
        _descriptor: &RequestDescriptor,
        payload: Bytes,
    ) -> Box<dyn Any + Send> {
        Box::new(payload)
    }

    /// One member failed. Return true to abort the whole aggregate.
    fn on_single_error(&self, _descriptor: &RequestDescriptor, _error: &HttpError) -> bool {
        false
    }

    fn on_complete(&self, result: AggregateResult);
}
