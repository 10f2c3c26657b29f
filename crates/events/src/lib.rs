//! Integration messages and the queue abstraction that carries them.
//!
//! - `instruction`: the deferred-retry message published on quota exhaustion
//! - `queue`: transport-agnostic publish/receive/ack/nack contract
//! - `in_memory_queue`: bounded in-process implementation for tests/dev

pub mod in_memory_queue;
pub mod instruction;
pub mod queue;

pub use in_memory_queue::InMemoryMessageQueue;
pub use instruction::RetryInstruction;
pub use queue::{Delivery, MessageQueue, QueueError};
