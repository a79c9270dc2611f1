//! Event kinds, kind masks and the notification handed to observers.
//!
//! Bit values follow the inotify layout so raw kernel masks convert without
//! a lookup table.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::NotifierError;

bitflags! {
    /// Bit-union of event kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;
        const UNMOUNT = 0x0000_2000;
        const Q_OVERFLOW = 0x0000_4000;
        const IGNORED = 0x0000_8000;
        const ISDIR = 0x4000_0000;

        /// Every kind a watch can subscribe to.
        const ALL_EVENTS = Self::ACCESS.bits()
            | Self::MODIFY.bits()
            | Self::ATTRIB.bits()
            | Self::CLOSE_WRITE.bits()
            | Self::CLOSE_NOWRITE.bits()
            | Self::OPEN.bits()
            | Self::MOVED_FROM.bits()
            | Self::MOVED_TO.bits()
            | Self::CREATE.bits()
            | Self::DELETE.bits()
            | Self::DELETE_SELF.bits()
            | Self::MOVE_SELF.bits();
    }
}

/// Kind of a filesystem event.
///
/// Open enumeration: masks that do not map onto a single known kind become
/// [`Event::Other`] and are routed like any other kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Event {
    Access,
    Attrib,
    CloseWrite,
    #[serde(rename = "close_nowrite")]
    CloseNoWrite,
    Create,
    Delete,
    DeleteSelf,
    Modify,
    MoveSelf,
    MovedFrom,
    MovedTo,
    Open,
    Unmount,
    QueueOverflow,
    Ignored,
    Other(u32),
}

const KINDS: [(Event, EventMask, &str); 15] = [
    (Event::Access, EventMask::ACCESS, "access"),
    (Event::Attrib, EventMask::ATTRIB, "attrib"),
    (Event::CloseWrite, EventMask::CLOSE_WRITE, "close_write"),
    (Event::CloseNoWrite, EventMask::CLOSE_NOWRITE, "close_nowrite"),
    (Event::Create, EventMask::CREATE, "create"),
    (Event::Delete, EventMask::DELETE, "delete"),
    (Event::DeleteSelf, EventMask::DELETE_SELF, "delete_self"),
    (Event::Modify, EventMask::MODIFY, "modify"),
    (Event::MoveSelf, EventMask::MOVE_SELF, "move_self"),
    (Event::MovedFrom, EventMask::MOVED_FROM, "moved_from"),
    (Event::MovedTo, EventMask::MOVED_TO, "moved_to"),
    (Event::Open, EventMask::OPEN, "open"),
    (Event::Unmount, EventMask::UNMOUNT, "unmount"),
    (Event::QueueOverflow, EventMask::Q_OVERFLOW, "queue_overflow"),
    (Event::Ignored, EventMask::IGNORED, "ignored"),
];

impl Event {
    /// The twelve kinds a watch can subscribe to.
    pub const WATCHABLE: [Event; 12] = [
        Event::Access,
        Event::Attrib,
        Event::CloseWrite,
        Event::CloseNoWrite,
        Event::Create,
        Event::Delete,
        Event::DeleteSelf,
        Event::Modify,
        Event::MoveSelf,
        Event::MovedFrom,
        Event::MovedTo,
        Event::Open,
    ];

    /// Map a raw mask onto a kind. The directory bit is ignored.
    pub fn from_mask(mask: EventMask) -> Self {
        let kind = mask.difference(EventMask::ISDIR);
        KINDS
            .iter()
            .find(|(_, bits, _)| *bits == kind)
            .map(|(event, _, _)| *event)
            .unwrap_or(Event::Other(kind.bits()))
    }

    pub fn mask(self) -> EventMask {
        match self {
            Event::Other(bits) => EventMask::from_bits_retain(bits),
            known => KINDS
                .iter()
                .find(|(event, _, _)| *event == known)
                .map(|(_, bits, _)| *bits)
                .unwrap_or_default(),
        }
    }

    /// Snake-case name, `None` for [`Event::Other`].
    pub fn name(self) -> Option<&'static str> {
        KINDS
            .iter()
            .find(|(event, _, _)| *event == self)
            .map(|(_, _, name)| *name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name(), self) {
            (Some(name), _) => f.write_str(name),
            (None, Event::Other(bits)) => write!(f, "other({bits:#x})"),
            (None, _) => f.write_str("unknown"),
        }
    }
}

impl FromStr for Event {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        KINDS
            .iter()
            .find(|(_, _, name)| *name == wanted)
            .map(|(event, _, _)| *event)
            .ok_or_else(|| NotifierError::UnknownEvent(s.to_string()))
    }
}

/// A resolved event delivered to an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: Event,
    /// Absolute path of the affected entry. Empty for queue overflows.
    pub path: PathBuf,
    pub is_dir: bool,
    pub time: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: Event, path: PathBuf, is_dir: bool) -> Self {
        Self {
            event,
            path,
            is_dir,
            time: Utc::now(),
        }
    }
}
