//! Scheduling
//!
//! Watchers never run directly from a write. An invalidated watcher is
//! pushed onto the [`batcher`], which runs it at most once on the next
//! [`tick`]. The batcher itself is internal; the tick boundary is public so
//! hosts can drive it.

pub(crate) mod batcher;
pub mod tick;

pub use batcher::{Job, Lane};
