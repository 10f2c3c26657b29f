//! `playsort-core` — playlist domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the `Video`/`Playlist` records, and the sort orders a playlist
//! can be reordered by.

pub mod criterion;
pub mod duration;
pub mod error;
pub mod id;
pub mod playlist;
pub mod video;

pub use criterion::SortCriterion;
pub use duration::parse_iso8601_duration;
pub use error::{DomainError, DomainResult};
pub use id::{PlaylistId, UserId, VideoId};
pub use playlist::Playlist;
pub use video::Video;
