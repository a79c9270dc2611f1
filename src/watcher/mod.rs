//! Filesystem change notification built on watch sources.
//!
//! A [`Notifier`] owns one [`WatchSource`], a [`PathRegistry`] mapping
//! source handles back to paths, and a table of observers keyed by
//! [`Event`] kind.
//!
//! # Architecture
//!
//! ```text
//! Notifier
//!   - WatchSource (inotify, or in-memory for tests)
//!   - PathRegistry (handles <-> interned paths, ignore sets)
//!   - Observers per Event kind + unexpected-event fallback
//!         |
//!    run_once: pull RawEvent -> resolve path -> ignore check -> observer
//! ```

mod error;
mod event;
mod notifier;
mod path_registry;
pub mod source;

pub use error::{NotifierError, NotifierResult};
pub use event::{Event, EventMask, Notification};
pub use notifier::{EventObserver, Notifier, NotifierState, build_notifier};
pub use path_registry::{IgnoreVerdict, PathRegistry, WatchedPath};
pub use source::{
    DEFAULT_EVENT_BUFFER_SIZE, InotifySource, MIN_EVENT_BUFFER_SIZE, MemoryInjector,
    MemorySource, RawEvent, StopHandle, Wake, WatchSource,
};
