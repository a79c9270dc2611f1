//! Watch sources: the facilities that produce raw events.
//!
//! A [`WatchSource`] installs low-level watches, hands out opaque handles for
//! them and yields raw events through a blocking pull that can be interrupted
//! from another thread via its [`StopHandle`].

mod inotify;
mod memory;

use std::ffi::OsString;
use std::fmt;
use std::hash::Hash;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::NotifierResult;
use super::event::EventMask;

pub use self::inotify::{DEFAULT_EVENT_BUFFER_SIZE, InotifySource, MIN_EVENT_BUFFER_SIZE};
pub use self::memory::{MemoryInjector, MemorySource};

/// A raw, unresolved event as reported by a watch source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent<H> {
    /// Watch the event belongs to. `None` for queue overflows.
    pub handle: Option<H>,
    pub mask: EventMask,
    /// Correlates `moved_from` with `moved_to`; zero otherwise.
    pub cookie: u32,
    /// Child entry name for events reported on a watched directory.
    pub name: Option<OsString>,
}

/// Producer of raw filesystem events.
pub trait WatchSource {
    /// Opaque identifier of an installed watch.
    type Handle: Clone + Eq + Hash + fmt::Debug;

    /// Install (or update) a watch on `path` for the kinds in `mask`.
    ///
    /// Watching a path that is already watched returns the same handle.
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> NotifierResult<Self::Handle>;

    /// Remove a watch. Removing a watch the source already retired is not an error.
    fn remove_watch(&mut self, handle: &Self::Handle) -> NotifierResult<()>;

    /// Block until a raw event is available, or return `None` once stopped.
    fn next_raw_event(&mut self) -> NotifierResult<Option<RawEvent<Self::Handle>>>;

    /// Handle used to stop this source from any thread.
    fn stop_handle(&self) -> StopHandle;

    fn has_stopped(&self) -> bool {
        self.stop_handle().is_stopped()
    }
}

/// Wakes a thread blocked inside [`WatchSource::next_raw_event`].
pub trait Wake: Send + Sync {
    fn wake(&self) -> io::Result<()>;
}

impl Wake for mio::Waker {
    fn wake(&self) -> io::Result<()> {
        mio::Waker::wake(self)
    }
}

/// Thread-safe stop signal shared between a source and its controllers.
///
/// Stopping is sticky until [`StopHandle::reset`] is called.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    waker: Arc<dyn Wake>,
}

impl StopHandle {
    pub fn new(waker: Arc<dyn Wake>) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    /// Mark the source stopped and wake any blocked pull.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        crate::debug_event!("source", "stop requested");
        if let Err(e) = self.waker.wake() {
            tracing::warn!("[source] failed to wake blocked pull: {e}");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Clear the stop flag so the source can be pulled again.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
