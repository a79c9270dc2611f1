//! Linux inotify watch source.
//!
//! The inotify descriptor and a [`mio::Waker`] are registered in one
//! [`mio::Poll`], so a pull blocked waiting for kernel events also wakes when
//! the source is stopped.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Arc;

use ::inotify::{Inotify, WatchDescriptor, WatchMask};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};

use super::{RawEvent, StopHandle, WatchSource};
use crate::watcher::error::{NotifierError, NotifierResult};
use crate::watcher::event::EventMask;

const INOTIFY: Token = Token(0);
const WAKE: Token = Token(1);

/// Default size of the buffer raw inotify records are read into.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 16 * 1024;

/// One record header plus the longest possible file name.
pub const MIN_EVENT_BUFFER_SIZE: usize = 16 + 256;

/// Watch source backed by an inotify instance.
pub struct InotifySource {
    inotify: Inotify,
    poll: Poll,
    events: Events,
    buffer: Vec<u8>,
    pending: VecDeque<RawEvent<WatchDescriptor>>,
    stop: StopHandle,
}

impl InotifySource {
    pub fn new() -> NotifierResult<Self> {
        Self::with_buffer_size(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Create a source reading kernel records through a buffer of `size` bytes.
    pub fn with_buffer_size(size: usize) -> NotifierResult<Self> {
        if size < MIN_EVENT_BUFFER_SIZE {
            return Err(NotifierError::InitFailed {
                reason: format!(
                    "event buffer of {size} bytes is smaller than one record ({MIN_EVENT_BUFFER_SIZE})"
                ),
            });
        }

        let inotify = Inotify::init().map_err(|e| NotifierError::InitFailed {
            reason: e.to_string(),
        })?;
        let poll = Poll::new().map_err(|e| NotifierError::source_failure("poll_create", e))?;
        let waker = Waker::new(poll.registry(), WAKE)
            .map_err(|e| NotifierError::source_failure("waker_create", e))?;

        let fd = inotify.as_raw_fd();
        poll.registry()
            .register(&mut SourceFd(&fd), INOTIFY, Interest::READABLE)
            .map_err(|e| NotifierError::source_failure("poll_register", e))?;

        crate::debug_event!("inotify", "initialized", "fd {fd}, buffer {size} bytes");

        Ok(Self {
            inotify,
            poll,
            events: Events::with_capacity(8),
            buffer: vec![0; size],
            pending: VecDeque::new(),
            stop: StopHandle::new(Arc::new(waker)),
        })
    }

    /// Number of decoded events waiting to be pulled.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drain every record the kernel has queued.
    ///
    /// The descriptor is registered edge-triggered, so reading must continue
    /// until the kernel reports nothing left.
    fn drain_kernel_queue(&mut self) -> NotifierResult<()> {
        loop {
            let records = self
                .inotify
                .read_events(&mut self.buffer)
                .map_err(|e| NotifierError::source_failure("read", e))?;

            let before = self.pending.len();
            for record in records {
                let mask = EventMask::from_bits_retain(record.mask.bits());
                let handle = if mask.contains(EventMask::Q_OVERFLOW) {
                    None
                } else {
                    Some(record.wd)
                };
                self.pending.push_back(RawEvent {
                    handle,
                    mask,
                    cookie: record.cookie,
                    name: record.name.map(|name| name.to_os_string()),
                });
            }

            if self.pending.len() == before {
                return Ok(());
            }
        }
    }
}

impl WatchSource for InotifySource {
    type Handle = WatchDescriptor;

    fn add_watch(&mut self, path: &Path, mask: EventMask) -> NotifierResult<WatchDescriptor> {
        let watch_mask = WatchMask::from_bits_truncate(mask.bits());
        self.inotify
            .watches()
            .add(path, watch_mask)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => NotifierError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                },
                _ => NotifierError::source_failure("add_watch", e),
            })
    }

    fn remove_watch(&mut self, handle: &WatchDescriptor) -> NotifierResult<()> {
        match self.inotify.watches().remove(handle.clone()) {
            Ok(()) => Ok(()),
            // EINVAL: the kernel already dropped the watch (deleted path).
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                crate::debug_event!("inotify", "watch already gone", "{handle:?}");
                Ok(())
            }
            Err(e) => Err(NotifierError::source_failure("rm_watch", e)),
        }
    }

    fn next_raw_event(&mut self) -> NotifierResult<Option<RawEvent<WatchDescriptor>>> {
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            match self.poll.poll(&mut self.events, None) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NotifierError::source_failure("poll", e)),
            }

            if self.events.iter().any(|event| event.token() == INOTIFY) {
                self.drain_kernel_queue()?;
            }
        }
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn has_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}
