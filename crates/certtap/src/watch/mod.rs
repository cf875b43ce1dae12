//! Change-driven re-extraction.
//!
//! ```text
//! ┌──────────────────┐      ┌───────────────┐      ┌─────────────────┐
//! │  StateWatcher    │─────▶│   Debouncer   │─────▶│ extraction pass │
//! │  (notify crate)  │ poke │ (coalescing)  │ job  │   (blocking)    │
//! └──────────────────┘      └───────────────┘      └─────────────────┘
//! ```
//!
//! The watcher turns raw filesystem notifications into relevant change
//! events; the debouncer coalesces bursts (editors and atomic renames
//! fire several events per logical change) into single extraction passes
//! and guarantees passes never overlap.

mod debouncer;
mod watcher;

pub use debouncer::Debouncer;
pub use watcher::{is_relevant, ChangeEvent, StateWatcher, WatchError};
