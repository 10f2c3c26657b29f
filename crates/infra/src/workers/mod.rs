//! Long-running background workers.

pub mod retry_consumer;

pub use retry_consumer::{
    ConsumerStats, ReorderReplayer, ReplayOutcome, RetryConsumer, RetryConsumerConfig, RetryConsumerHandle,
};
