//! Process-wide tracing setup shared by the binaries.

/// Install the JSON tracing subscriber.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Calling this more than
/// once is harmless: later calls leave the first subscriber in place.
pub fn init() {
    tracing::init(tracing::DEFAULT_FILTER);
}

/// Subscriber construction.
pub mod tracing;
