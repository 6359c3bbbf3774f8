use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("codeagent.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("codeagent.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("codeagent.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("codeagent.client.request_duration_seconds");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("codeagent.client.retry_backoff_seconds");

pub(crate) static STREAM_OPENS: Counter = Counter::new("codeagent.stream.opens");
pub(crate) static STREAM_UNAVAILABLE: Counter = Counter::new("codeagent.stream.unavailable");
pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("codeagent.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("codeagent.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("codeagent.stream.bytes");
pub(crate) static STREAM_CANCELLED: Counter = Counter::new("codeagent.stream.cancelled");

pub(crate) static STORE_MUTATIONS: Counter = Counter::new("codeagent.store.mutations");

pub(crate) static PERSISTENCE_WRITES: Counter = Counter::new("codeagent.persistence.writes");
pub(crate) static PERSISTENCE_FAILURES: Counter =
    Counter::new("codeagent.persistence.failures");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&STREAM_OPENS);
    collector.register_counter(&STREAM_UNAVAILABLE);
    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_CANCELLED);

    collector.register_counter(&STORE_MUTATIONS);

    collector.register_counter(&PERSISTENCE_WRITES);
    collector.register_counter(&PERSISTENCE_FAILURES);
}
