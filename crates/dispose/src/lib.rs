//! # Nebula Dispose
//!
//! Orchestrates *when* resources are released, for handles that must be
//! closed explicitly rather than whenever their owner happens to be dropped.
//!
//! Two strategies share one entry point:
//! - **Stack tracking**: entries are tracked in the context bound by the
//!   innermost [`with_scope`] and disposed, exactly once, before that scope
//!   returns. Entries can be released or ignored early.
//! - **GC tracking**: a weak registration with a [`FinalizationHost`] runs the
//!   dispose action after the item becomes unreachable and a collection pass
//!   notices. [`chain`] builds on it to keep a parent alive while a derived
//!   resource is reachable.
//!
//! [`track`] picks stack tracking inside an open scope and GC tracking
//! otherwise.
//!
//! ```rust
//! use std::sync::Arc;
//! use nebula_dispose::{DisposeAction, TrackOptions, track, with_scope};
//!
//! with_scope(|| {
//!     let buffer = Arc::new(vec![0u8; 1024]);
//!     track(
//!         Arc::clone(&buffer),
//!         TrackOptions::new().dispose_action(DisposeAction::from_fn(|| {
//!             // release the native side here
//!         })),
//!     )
//!     .unwrap();
//! }); // disposed here
//! ```

pub mod action;
pub mod binding;
pub mod chain;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod gc;
pub mod scope;
pub mod stack;
pub mod track;

pub use action::{Dispose, DisposeAction};
pub use binding::{current_context, is_scope_open};
pub use chain::{chain, chain_with};
pub use config::{DisposeConfig, debug_double_free, set_debug_double_free};
pub use context::ResourceContext;
pub use entry::{Entry, ItemId};
pub use error::{BoxError, Error, Result};
pub use gc::{
    CollectReport, Collector, FinalizationHost, Registration, RegistrationId, gc_track,
    gc_track_and_stack_track, gc_track_and_stack_track_with, gc_track_with,
};
#[cfg(feature = "async")]
pub use scope::with_scope_async;
pub use scope::{Captured, with_scope, with_scope_capturing, with_scope_report};
pub use stack::{
    release_all, release_all_matching, stack_ignore, stack_ignore_matching, stack_release,
    stack_track, stack_track_disposable,
};
pub use track::{TrackOptions, TrackType, track, track_disposable};
