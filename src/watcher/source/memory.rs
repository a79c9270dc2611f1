//! In-process watch source fed by a [`MemoryInjector`].
//!
//! Nothing touches the kernel: events are whatever the injector emits for
//! paths currently watched. Useful for driving a notifier deterministically.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use super::{RawEvent, StopHandle, Wake, WatchSource};
use crate::watcher::error::{NotifierError, NotifierResult};
use crate::watcher::event::EventMask;

enum Signal {
    Event(RawEvent<u32>),
    Wake,
}

struct ChannelWaker(Sender<Signal>);

impl Wake for ChannelWaker {
    fn wake(&self) -> io::Result<()> {
        self.0
            .send(Signal::Wake)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "memory source dropped"))
    }
}

#[derive(Debug, Clone, Copy)]
struct MemoryWatch {
    id: u32,
    mask: EventMask,
}

type WatchTable = Arc<Mutex<HashMap<PathBuf, MemoryWatch>>>;
type FailureTable = Arc<Mutex<HashMap<PathBuf, io::ErrorKind>>>;

/// Watch source whose events are injected by the caller.
pub struct MemorySource {
    next_id: u32,
    watches: WatchTable,
    failures: FailureTable,
    sender: Sender<Signal>,
    receiver: Receiver<Signal>,
    stop: StopHandle,
}

impl MemorySource {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        let stop = StopHandle::new(Arc::new(ChannelWaker(sender.clone())));
        Self {
            next_id: 1,
            watches: Arc::default(),
            failures: Arc::default(),
            sender,
            receiver,
            stop,
        }
    }

    /// Handle for emitting events into this source from any thread.
    pub fn injector(&self) -> MemoryInjector {
        MemoryInjector {
            sender: self.sender.clone(),
            watches: self.watches.clone(),
            failures: self.failures.clone(),
        }
    }

    /// Number of installed watches.
    pub fn watch_count(&self) -> usize {
        self.watches.lock().len()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchSource for MemorySource {
    type Handle = u32;

    fn add_watch(&mut self, path: &Path, mask: EventMask) -> NotifierResult<u32> {
        if let Some(kind) = self.failures.lock().get(path).copied() {
            let error = io::Error::from(kind);
            return Err(match kind {
                io::ErrorKind::NotFound => NotifierError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                },
                _ => NotifierError::source_failure("add_watch", error),
            });
        }

        let mut watches = self.watches.lock();
        if let Some(existing) = watches.get_mut(path) {
            existing.mask = mask;
            return Ok(existing.id);
        }

        let id = self.next_id;
        self.next_id += 1;
        watches.insert(path.to_path_buf(), MemoryWatch { id, mask });
        Ok(id)
    }

    fn remove_watch(&mut self, handle: &u32) -> NotifierResult<()> {
        self.watches.lock().retain(|_, watch| watch.id != *handle);
        Ok(())
    }

    fn next_raw_event(&mut self) -> NotifierResult<Option<RawEvent<u32>>> {
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            match self.receiver.recv() {
                Ok(Signal::Event(event)) => return Ok(Some(event)),
                Ok(Signal::Wake) => continue,
                Err(_) => return Err(NotifierError::ChannelClosed),
            }
        }
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

/// Cloneable producer side of a [`MemorySource`].
#[derive(Clone)]
pub struct MemoryInjector {
    sender: Sender<Signal>,
    watches: WatchTable,
    failures: FailureTable,
}

impl MemoryInjector {
    /// Emit an event for a watched path itself.
    ///
    /// Returns false when the path is not watched or its mask excludes the event.
    pub fn emit(&self, path: &Path, mask: EventMask) -> bool {
        self.emit_named(path, None, mask)
    }

    /// Emit an event for entry `name` inside the watched directory `dir`.
    pub fn emit_child(&self, dir: &Path, name: &str, mask: EventMask) -> bool {
        self.emit_named(dir, Some(OsString::from(name)), mask)
    }

    /// Emit a queue overflow, which belongs to no watch.
    pub fn overflow(&self) {
        self.emit_raw(RawEvent {
            handle: None,
            mask: EventMask::Q_OVERFLOW,
            cookie: 0,
            name: None,
        });
    }

    /// Emit an arbitrary raw event, bypassing watch and mask checks.
    pub fn emit_raw(&self, event: RawEvent<u32>) {
        let _ = self.sender.send(Signal::Event(event));
    }

    /// Make every later `add_watch` for `path` fail with `kind`.
    ///
    /// `NotFound` surfaces as an invalid path, anything else as a source failure.
    pub fn fail_watch(&self, path: &Path, kind: io::ErrorKind) {
        self.failures.lock().insert(path.to_path_buf(), kind);
    }

    /// Handle currently assigned to `path`, if watched.
    pub fn handle_of(&self, path: &Path) -> Option<u32> {
        self.watches.lock().get(path).map(|watch| watch.id)
    }

    fn emit_named(&self, path: &Path, name: Option<OsString>, mask: EventMask) -> bool {
        let Some(watch) = self.watches.lock().get(path).copied() else {
            return false;
        };
        let kinds = mask.difference(EventMask::ISDIR);
        if !watch.mask.intersects(kinds) {
            return false;
        }

        self.emit_raw(RawEvent {
            handle: Some(watch.id),
            mask,
            cookie: 0,
            name,
        });
        true
    }
}
