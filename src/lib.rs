//! # Keepsake
//!
//! An in-memory keyed store with optional per-entry time-to-live.
//!
//! Values are moved into the store and owned by it exclusively: every value
//! is dropped exactly once, whether it leaves by explicit removal, by its
//! expiry timer firing, or by a bulk [`TimedStore::clear`]. Expiry is driven
//! by a [`Timer`] service rather than a periodic sweep, so an entry is
//! evicted as soon as its deadline passes.
//!
//! ## Features
//!
//! - Per-entry one-shot expiry, re-armable at any time via
//!   [`TimedStore::set_ttl`]
//! - [`EntryId`] handles that go permanently stale once their entry is gone,
//!   instead of ever pointing at a newer value under the same key
//! - Safe under races between explicit removal and timer firing: exactly one
//!   of the two paths destroys the value
//! - A [`Timer`] can be shared by several stores; each store cancels only
//!   its own registrations
//!
//! ## Example
//!
//! ```rust,no_run
//! use keepsake::TimedStore;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = TimedStore::new();
//!
//!     // Kept until explicitly removed.
//!     store.insert("config", "production".to_string(), None);
//!
//!     // Evicted automatically after five minutes.
//!     store.insert(
//!         "session:42",
//!         "alice".to_string(),
//!         Some(Duration::from_secs(300)),
//!     );
//!
//!     // Push the deadline back while the session is in use.
//!     store
//!         .set_ttl(&"session:42", Some(Duration::from_secs(300)))
//!         .unwrap();
//!
//!     if let Some(user) = store.get(&"session:42") {
//!         println!("session belongs to {user}");
//!     }
//! }
//! ```

mod entry;
mod store;
mod timed;
mod timer;

pub use entry::EntryId;
pub use store::Store;
pub use timed::{TimedStore, TtlError};
pub use timer::{OwnerId, Timer, Token};
