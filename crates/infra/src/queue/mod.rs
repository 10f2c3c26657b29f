//! Infrastructure-backed message queues.
//!
//! The queue contract lives in `playsort-events`; this module provides
//! broker implementations.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsConfig, RedisStreamsError, RedisStreamsQueue};
