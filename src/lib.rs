//! Builder-style filesystem change notification for Linux.
//!
//! ```no_run
//! use inotify_notifier::{Event, build_notifier};
//!
//! # fn main() -> inotify_notifier::NotifierResult<()> {
//! let mut notifier = build_notifier()?
//!     .watch_path_recursively("src")?
//!     .ignore_file("src/generated.rs")
//!     .on_event(Event::Modify, |n| println!("modified {}", n.path.display()))
//!     .on_unexpected_event(|n| println!("{} {}", n.event, n.path.display()));
//!
//! notifier.run()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod paths;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatchConfig};
pub use watcher::{
    Event, EventMask, EventObserver, Notification, Notifier, NotifierError, NotifierResult,
    NotifierState, StopHandle, build_notifier,
};
