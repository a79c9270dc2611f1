//! Builder-configured notifier that pulls raw events and dispatches them.
//!
//! # Lifecycle
//!
//! ```text
//!            run_once / run
//!   Idle ─────────────────────▶ Pulling ──event──▶ Dispatching ──▶ Idle
//!     ▲                           │
//!     │ resume                    │ stop
//!     └──────────── Stopped ◀─────┘
//! ```
//!
//! Observers run synchronously on the pulling thread. Configuration takes
//! the notifier by value, so it always happens before the pull loop starts;
//! only [`StopHandle`] crosses threads.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::NotifierResult;
use super::event::{Event, EventMask, Notification};
use super::path_registry::{IgnoreVerdict, PathRegistry};
use super::source::{InotifySource, RawEvent, StopHandle, WatchSource};
use crate::config::{Settings, WatchConfig};

/// Callback invoked with each dispatched notification.
pub type EventObserver = Arc<dyn Fn(Notification) + Send + Sync>;

/// State of the pull/dispatch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierState {
    Idle,
    Pulling,
    Dispatching,
    Stopped,
}

/// Create an inotify-backed notifier with default settings.
pub fn build_notifier() -> NotifierResult<Notifier> {
    Notifier::new()
}

/// Watch registry plus observer table driving one watch source.
pub struct Notifier<S: WatchSource = InotifySource> {
    source: S,
    registry: PathRegistry<S::Handle>,
    /// One observer per kind, last registration wins.
    observers: HashMap<Event, EventObserver>,
    unexpected: Option<EventObserver>,
    /// Kinds with a registered observer. Only grows.
    subscribed: EventMask,
    state: NotifierState,
}

impl Notifier<InotifySource> {
    pub fn new() -> NotifierResult<Self> {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> NotifierResult<Self> {
        let source = InotifySource::with_buffer_size(settings.watch.event_buffer_size)?;
        Ok(Self::with_source_config(source, &settings.watch))
    }
}

impl<S: WatchSource> Notifier<S> {
    /// Drive an explicit watch source with default watch settings.
    pub fn with_source(source: S) -> Self {
        Self::with_source_config(source, &WatchConfig::default())
    }

    pub fn with_source_config(source: S, config: &WatchConfig) -> Self {
        let mut registry = PathRegistry::new(config.event_mask());
        registry.set_follow_symlinks(config.follow_symlinks);

        Self {
            source,
            registry,
            observers: HashMap::new(),
            unexpected: None,
            subscribed: EventMask::empty(),
            state: NotifierState::Idle,
        }
    }

    /// Watch a single file or directory.
    pub fn watch_file(mut self, path: impl AsRef<Path>) -> NotifierResult<Self> {
        self.registry.watch_file(&mut self.source, path.as_ref())?;
        Ok(self)
    }

    /// Watch a directory and all directories beneath it, including ones created later.
    pub fn watch_path_recursively(mut self, path: impl AsRef<Path>) -> NotifierResult<Self> {
        self.registry
            .watch_directory_recursively(&mut self.source, path.as_ref())?;
        Ok(self)
    }

    /// Stop watching exactly this path.
    pub fn unwatch_file(mut self, path: impl AsRef<Path>) -> NotifierResult<Self> {
        self.registry.unwatch_file(&mut self.source, path.as_ref())?;
        Ok(self)
    }

    /// Swallow the next event reported for `path`.
    pub fn ignore_file_once(mut self, path: impl AsRef<Path>) -> Self {
        self.registry.ignore_file_once(path.as_ref());
        self
    }

    /// Swallow every event reported for `path`.
    pub fn ignore_file(mut self, path: impl AsRef<Path>) -> Self {
        self.registry.ignore_file(path.as_ref());
        self
    }

    pub fn unignore_file(mut self, path: impl AsRef<Path>) -> Self {
        self.registry.unignore_file(path.as_ref());
        self
    }

    /// Register the observer for `event`, replacing any previous one.
    pub fn on_event<F>(mut self, event: Event, observer: F) -> Self
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(observer));
        self
    }

    /// Register one observer shared by several kinds.
    pub fn on_events<F>(mut self, events: impl IntoIterator<Item = Event>, observer: F) -> Self
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        let observer: EventObserver = Arc::new(observer);
        for event in events {
            self.subscribe(event, observer.clone());
        }
        self
    }

    /// Register the fallback for kinds without an observer.
    pub fn on_unexpected_event<F>(mut self, observer: F) -> Self
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.unexpected = Some(Arc::new(observer));
        self
    }

    /// Pull and dispatch exactly one event.
    ///
    /// Returns without dispatching when the notifier is stopped before an
    /// event arrives. Source failures are returned; stale handles, ignored
    /// paths and unmatched kinds are not errors.
    pub fn run_once(&mut self) -> NotifierResult<()> {
        self.sync_watch_mask()?;

        self.state = NotifierState::Pulling;
        let raw = match self.source.next_raw_event() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.state = NotifierState::Stopped;
                return Ok(());
            }
            Err(e) => {
                self.state = NotifierState::Idle;
                return Err(e);
            }
        };

        let result = self.dispatch(raw);
        self.state = if self.source.has_stopped() {
            NotifierState::Stopped
        } else {
            NotifierState::Idle
        };
        result
    }

    /// Pull and dispatch until stopped.
    pub fn run(&mut self) -> NotifierResult<()> {
        crate::log_event!("notifier", "running", "{} watches", self.registry.len());

        while !self.source.has_stopped() {
            self.run_once()?;
        }

        self.state = NotifierState::Stopped;
        crate::log_event!("notifier", "stopped");
        Ok(())
    }

    /// Stop the notifier so the next pull returns without dispatching.
    ///
    /// A pull in progress holds `&mut self`; stop it from another thread or
    /// from an observer through [`Self::stop_handle`].
    pub fn stop(&self) {
        self.source.stop_handle().stop();
    }

    /// Cloneable handle for stopping from other threads or from observers.
    pub fn stop_handle(&self) -> StopHandle {
        self.source.stop_handle()
    }

    /// Clear a previous stop so the notifier can be pulled again.
    pub fn resume(&mut self) {
        self.source.stop_handle().reset();
        self.state = NotifierState::Idle;
    }

    pub fn has_stopped(&self) -> bool {
        self.source.has_stopped()
    }

    pub fn state(&self) -> NotifierState {
        self.state
    }

    /// Kinds with a registered observer.
    pub fn subscribed(&self) -> EventMask {
        self.subscribed
    }

    pub fn registry(&self) -> &PathRegistry<S::Handle> {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn subscribe(&mut self, event: Event, observer: EventObserver) {
        self.subscribed |= event.mask();
        if self.observers.insert(event, observer).is_some() {
            crate::debug_event!("notifier", "observer replaced", "{event}");
        }
    }

    /// Make sure installed watches report every subscribed kind.
    fn sync_watch_mask(&mut self) -> NotifierResult<()> {
        self.registry
            .widen_mask(&mut self.source, self.subscribed)
            .map(|_| ())
    }

    fn dispatch(&mut self, raw: RawEvent<S::Handle>) -> NotifierResult<()> {
        let is_dir = raw.mask.contains(EventMask::ISDIR);
        let event = Event::from_mask(raw.mask);

        let path = match &raw.handle {
            Some(handle) => match self.registry.resolve(handle, raw.name.as_deref()) {
                Ok(path) => path,
                Err(e) => {
                    crate::debug_event!("notifier", "dropped", "{event}: {e}");
                    return Ok(());
                }
            },
            None => PathBuf::new(),
        };

        if let Some(handle) = &raw.handle {
            match event {
                Event::Create | Event::MovedTo if is_dir => {
                    self.follow_new_directory(handle, &path)?;
                }
                Event::MovedFrom if is_dir => self.release_moved_directory(handle, &path),
                _ => {}
            }
        }

        let verdict = self.registry.check_ignored(&path);
        if verdict == IgnoreVerdict::Pass {
            self.state = NotifierState::Dispatching;
            self.notify(Notification::new(event, path, is_dir));
        } else {
            crate::debug_event!("notifier", "ignored", "{event} {} ({verdict:?})", path.display());
        }

        if let Some(handle) = &raw.handle {
            if matches!(event, Event::DeleteSelf | Event::Ignored) {
                self.registry.forget(handle);
            }
        }
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        if let Some(observer) = self.observers.get(&notification.event) {
            observer(notification);
        } else if let Some(fallback) = &self.unexpected {
            fallback(notification);
        } else {
            crate::debug_event!(
                "notifier",
                "unobserved",
                "{} {}",
                notification.event,
                notification.path.display()
            );
        }
    }

    /// Extend a recursive registration to a directory created or moved inside it.
    fn follow_new_directory(&mut self, parent: &S::Handle, dir: &Path) -> NotifierResult<()> {
        let Some(root) = self
            .registry
            .lookup(parent)
            .and_then(|watched| watched.recursive_root())
            .map(Arc::<Path>::from)
        else {
            return Ok(());
        };

        let handles = self.registry.watch_subtree(&mut self.source, dir, root)?;
        crate::debug_event!(
            "notifier",
            "followed new directory",
            "{} ({} watches)",
            dir.display(),
            handles.len()
        );
        Ok(())
    }

    /// Drop the watches of a directory moved out from under a recursive registration.
    fn release_moved_directory(&mut self, parent: &S::Handle, dir: &Path) {
        let Some(root) = self
            .registry
            .lookup(parent)
            .and_then(|watched| watched.recursive_root())
            .map(Arc::<Path>::from)
        else {
            return;
        };

        let released = self.registry.unwatch_subtree(&mut self.source, dir, &root);
        crate::debug_event!(
            "notifier",
            "released moved directory",
            "{} ({released} watches)",
            dir.display()
        );
    }
}

impl<S: WatchSource> fmt::Debug for Notifier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.observers.keys().map(Event::to_string).collect();
        kinds.sort();

        f.debug_struct("Notifier")
            .field("registry", &self.registry)
            .field("observers", &kinds)
            .field("unexpected", &self.unexpected.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::source::{MemoryInjector, MemorySource};
    use crossbeam_channel::{Receiver, unbounded};
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        file: PathBuf,
        injector: MemoryInjector,
        notifier: Notifier<MemorySource>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.txt");
        fs::write(&file, "").unwrap();

        let source = MemorySource::new();
        let injector = source.injector();
        Fixture {
            dir,
            file,
            injector,
            notifier: Notifier::with_source(source),
        }
    }

    fn recorder() -> (
        impl Fn(Notification) + Send + Sync + 'static,
        Receiver<Notification>,
    ) {
        let (tx, rx) = unbounded();
        (move |n: Notification| tx.send(n).unwrap(), rx)
    }

    #[test]
    fn test_dispatches_to_observer_for_kind() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier.watch_file(&file).unwrap().on_event(Event::Open, observer);

        assert!(injector.emit(&file, EventMask::OPEN));
        notifier.run_once().unwrap();

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.event, Event::Open);
        assert_eq!(notification.path, file);
        assert!(!notification.is_dir);
        assert!(rx.try_recv().is_err());
        assert_eq!(notifier.state(), NotifierState::Idle);
    }

    #[test]
    fn test_shared_observer_receives_each_kind() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .on_events([Event::Open, Event::CloseNoWrite], observer);

        injector.emit(&file, EventMask::OPEN);
        injector.emit(&file, EventMask::CLOSE_NOWRITE);
        notifier.run_once().unwrap();
        notifier.run_once().unwrap();

        let kinds: Vec<Event> = rx.try_iter().map(|n| n.event).collect();
        assert_eq!(kinds, vec![Event::Open, Event::CloseNoWrite]);
        assert_eq!(notifier.subscribed(), EventMask::OPEN | EventMask::CLOSE_NOWRITE);
    }

    #[test]
    fn test_last_registration_wins() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (first, first_rx) = recorder();
        let (second, second_rx) = recorder();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .on_event(Event::Modify, first)
            .on_event(Event::Modify, second);

        injector.emit(&file, EventMask::MODIFY);
        notifier.run_once().unwrap();

        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().unwrap().event, Event::Modify);
    }

    #[test]
    fn test_unmatched_kind_goes_to_fallback_only() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let (fallback, fallback_rx) = recorder();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .on_event(Event::Open, observer)
            .on_unexpected_event(fallback);

        injector.emit(&file, EventMask::ATTRIB);
        notifier.run_once().unwrap();

        assert_eq!(fallback_rx.try_recv().unwrap().event, Event::Attrib);
        assert!(fallback_rx.try_recv().is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unmatched_kind_without_fallback_is_dropped() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let mut notifier = notifier.watch_file(&file).unwrap();

        injector.emit(&file, EventMask::ATTRIB);
        assert!(notifier.run_once().is_ok());
    }

    #[test]
    fn test_ignore_once_suppresses_exactly_one_event() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .ignore_file_once(&file)
            .on_event(Event::Open, observer);

        injector.emit(&file, EventMask::OPEN);
        injector.emit(&file, EventMask::OPEN);
        notifier.run_once().unwrap();
        assert!(rx.try_recv().is_err());

        notifier.run_once().unwrap();
        assert_eq!(rx.try_recv().unwrap().path, file);
    }

    #[test]
    fn test_permanent_ignore_until_unignored() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .ignore_file(&file)
            .on_event(Event::Open, observer);

        for _ in 0..2 {
            injector.emit(&file, EventMask::OPEN);
            notifier.run_once().unwrap();
        }
        assert!(rx.try_recv().is_err());

        let mut notifier = notifier.unignore_file(&file);
        injector.emit(&file, EventMask::OPEN);
        notifier.run_once().unwrap();
        assert_eq!(rx.try_recv().unwrap().event, Event::Open);
    }

    #[test]
    fn test_ignore_survives_rewatch() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .ignore_file(&file)
            .unwatch_file(&file)
            .unwrap()
            .watch_file(&file)
            .unwrap()
            .on_event(Event::Open, observer);

        injector.emit(&file, EventMask::OPEN);
        notifier.run_once().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_handle_is_dropped() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (fallback, rx) = recorder();
        let notifier = notifier.watch_file(&file).unwrap();
        let handle = injector.handle_of(&file).unwrap();
        let mut notifier = notifier
            .unwatch_file(&file)
            .unwrap()
            .on_unexpected_event(fallback);

        injector.emit_raw(RawEvent {
            handle: Some(handle),
            mask: EventMask::IGNORED,
            cookie: 0,
            name: None,
        });
        notifier.run_once().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_queue_overflow_reaches_fallback_with_empty_path() {
        let Fixture { dir: _dir, injector, notifier, .. } = fixture();
        let (fallback, rx) = recorder();
        let mut notifier = notifier.on_unexpected_event(fallback);

        injector.overflow();
        notifier.run_once().unwrap();

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.event, Event::QueueOverflow);
        assert_eq!(notification.path, PathBuf::new());
    }

    #[test]
    fn test_delete_self_retires_watch() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .on_event(Event::DeleteSelf, observer);

        injector.emit(&file, EventMask::DELETE_SELF);
        notifier.run_once().unwrap();

        assert_eq!(rx.try_recv().unwrap().path, file);
        assert!(!notifier.registry().contains(&file));
    }

    #[test]
    fn test_directory_events_route_by_kind() {
        let Fixture { dir, injector, notifier, .. } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier
            .watch_file(dir.path())
            .unwrap()
            .on_event(Event::Open, observer);

        injector.emit(dir.path(), EventMask::OPEN | EventMask::ISDIR);
        notifier.run_once().unwrap();

        let notification = rx.try_recv().unwrap();
        assert!(notification.is_dir);
        assert_eq!(notification.path, dir.path());
    }

    #[test]
    fn test_new_directory_under_recursive_root_is_watched_before_dispatch() {
        let Fixture { dir, injector, notifier, .. } = fixture();
        let (tx, rx) = unbounded();
        let probe = injector.clone();
        let sub = dir.path().join("sub");
        let observed_sub = sub.clone();
        let mut notifier = notifier
            .watch_path_recursively(dir.path())
            .unwrap()
            .on_event(Event::Create, move |n| {
                // The new directory must already be watched when observers run.
                tx.send((n, probe.handle_of(&observed_sub).is_some())).unwrap();
            });

        fs::create_dir(&sub).unwrap();
        injector.emit_child(dir.path(), "sub", EventMask::CREATE | EventMask::ISDIR);
        notifier.run_once().unwrap();

        let (notification, watched_before_dispatch) = rx.try_recv().unwrap();
        assert_eq!(notification.path, sub);
        assert!(watched_before_dispatch);

        let handle = notifier.registry().handle_of(&sub).unwrap();
        let watched = notifier.registry().lookup(handle).unwrap();
        assert_eq!(watched.recursive_root(), Some(dir.path()));
    }

    #[test]
    fn test_new_directory_under_plain_watch_is_not_followed() {
        let Fixture { dir, injector, notifier, .. } = fixture();
        let sub = dir.path().join("plain");
        let mut notifier = notifier.watch_file(dir.path()).unwrap();

        fs::create_dir(&sub).unwrap();
        injector.emit_child(dir.path(), "plain", EventMask::CREATE | EventMask::ISDIR);
        notifier.run_once().unwrap();

        assert!(!notifier.registry().contains(&sub));
    }

    #[test]
    fn test_observer_subscription_widens_installed_mask() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("narrow.txt");
        fs::write(&file, "").unwrap();

        let source = MemorySource::new();
        let injector = source.injector();
        let config = WatchConfig {
            mask: vec![Event::Open],
            ..WatchConfig::default()
        };
        let (observer, rx) = recorder();
        let mut notifier = Notifier::with_source_config(source, &config)
            .watch_file(&file)
            .unwrap()
            .on_event(Event::Modify, observer);

        // Subscriptions reach installed watches at the next pull.
        assert!(!injector.emit(&file, EventMask::MODIFY));
        assert!(injector.emit(&file, EventMask::OPEN));
        notifier.run_once().unwrap();
        assert!(notifier.registry().watch_mask().contains(EventMask::MODIFY));

        assert!(injector.emit(&file, EventMask::MODIFY));
        notifier.run_once().unwrap();
        assert_eq!(rx.try_recv().unwrap().event, Event::Modify);
    }

    #[test]
    fn test_stop_before_pull_returns_immediately() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier.watch_file(&file).unwrap().on_event(Event::Open, observer);

        notifier.stop();
        notifier.stop();
        injector.emit(&file, EventMask::OPEN);

        notifier.run_once().unwrap();
        notifier.run().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(notifier.state(), NotifierState::Stopped);

        notifier.resume();
        notifier.run_once().unwrap();
        assert_eq!(rx.try_recv().unwrap().event, Event::Open);
    }

    #[test]
    fn test_stop_from_another_thread_ends_run() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let (observer, rx) = recorder();
        let mut notifier = notifier.watch_file(&file).unwrap().on_event(Event::Open, observer);
        let stop = notifier.stop_handle();

        let runner = thread::spawn(move || {
            let result = notifier.run();
            (result, notifier.state())
        });

        injector.emit(&file, EventMask::OPEN);
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

        stop.stop();
        let (result, state) = runner.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(state, NotifierState::Stopped);
    }

    #[test]
    fn test_observer_can_stop_the_loop() {
        let Fixture { dir: _dir, file, injector, notifier } = fixture();
        let source_stop = notifier.stop_handle();
        let mut notifier = notifier
            .watch_file(&file)
            .unwrap()
            .on_event(Event::Open, move |_| source_stop.stop());

        injector.emit(&file, EventMask::OPEN);
        notifier.run().unwrap();
        assert!(notifier.has_stopped());
    }

    #[test]
    fn test_mask_widening_drops_vanished_watch_without_error() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("a.txt");
        let kept = dir.path().join("b.txt");
        fs::write(&gone, "").unwrap();
        fs::write(&kept, "").unwrap();

        let source = MemorySource::new();
        let injector = source.injector();
        let config = WatchConfig {
            mask: vec![Event::Open],
            ..WatchConfig::default()
        };
        let (observer, rx) = recorder();
        let mut notifier = Notifier::with_source_config(source, &config)
            .watch_file(&gone)
            .unwrap()
            .watch_file(&kept)
            .unwrap()
            .on_event(Event::Modify, observer);

        fs::remove_file(&gone).unwrap();
        injector.fail_watch(&gone, std::io::ErrorKind::NotFound);
        injector.emit(&kept, EventMask::OPEN);

        notifier.run_once().unwrap();
        assert!(!notifier.registry().contains(&gone));
        assert!(notifier.registry().watch_mask().contains(EventMask::MODIFY));

        assert!(injector.emit(&kept, EventMask::MODIFY));
        notifier.run_once().unwrap();
        assert_eq!(rx.try_recv().unwrap().path, kept);
    }

    #[test]
    fn test_unreadable_new_directory_is_dispatched_and_skipped() {
        let Fixture { dir, injector, notifier, .. } = fixture();
        let (observer, rx) = recorder();
        let locked = dir.path().join("locked");
        let mut notifier = notifier
            .watch_path_recursively(dir.path())
            .unwrap()
            .on_event(Event::Create, observer);

        fs::create_dir(&locked).unwrap();
        injector.fail_watch(&locked, std::io::ErrorKind::PermissionDenied);
        injector.emit_child(dir.path(), "locked", EventMask::CREATE | EventMask::ISDIR);

        notifier.run_once().unwrap();
        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.path, locked);
        assert!(notification.is_dir);
        assert!(!notifier.registry().contains(&locked));
        assert!(!notifier.has_stopped());
    }

    #[test]
    fn test_directory_moved_in_and_out_of_recursive_root() {
        let Fixture { dir, injector, notifier, .. } = fixture();
        let moved = dir.path().join("moved");
        let nested = moved.join("nested");
        let mut notifier = notifier.watch_path_recursively(dir.path()).unwrap();

        fs::create_dir_all(&nested).unwrap();
        injector.emit_child(dir.path(), "moved", EventMask::MOVED_TO | EventMask::ISDIR);
        notifier.run_once().unwrap();

        assert!(notifier.registry().contains(&moved));
        assert!(notifier.registry().contains(&nested));

        injector.emit_child(dir.path(), "moved", EventMask::MOVED_FROM | EventMask::ISDIR);
        notifier.run_once().unwrap();

        assert!(!notifier.registry().contains(&moved));
        assert!(!notifier.registry().contains(&nested));
        assert!(injector.handle_of(&moved).is_none());
        assert!(notifier.registry().contains(dir.path()));
    }
}
