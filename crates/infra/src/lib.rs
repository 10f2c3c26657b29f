//! Infrastructure layer: remote gateway, snapshot cache, credentials,
//! retry queue, the playlist use cases and the retry consumer.

pub mod cache;
pub mod classifier;
pub mod credentials;
pub mod gateway;
pub mod orchestrator;
pub mod queue;
pub mod settings;
pub mod workers;

#[cfg(test)]
mod integration_tests;
