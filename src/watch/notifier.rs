//! Change notifier: one OS watcher fanned out to many subscriber signals.

use super::types::{Operations, Signal};
use super::ChangeSource;
use crate::error::{Result, StoreError};
use crossbeam_channel::{unbounded, Receiver};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, error, trace};

static GLOBAL: OnceLock<ChangeNotifier> = OnceLock::new();

/// Subscribers of one path.
struct WatchEntry {
    /// What the OS is actually watching: the path itself or its nearest
    /// existing ancestor.
    watching: PathBuf,
    /// Signals per single-bit operation, in subscription order.
    subscribers: HashMap<Operations, Vec<Signal>>,
}

type Registry = Arc<Mutex<HashMap<PathBuf, WatchEntry>>>;

/// Watches paths and raises subscriber signals when they change.
///
/// Raw OS events are consumed by one dispatch thread in delivery order. Each
/// matching signal is raised with a non-blocking send, so a slow subscriber
/// only loses its own notifications and never stalls the others.
///
/// Entries are never removed: every path and signal registered lives as long
/// as the notifier. Use [`ChangeNotifier::global`] for the process-wide
/// instance, or [`ChangeNotifier::new`] for an isolated one.
pub struct ChangeNotifier {
    registry: Registry,
    /// Dropping the watcher closes the event channel and stops dispatch.
    watcher: Mutex<RecommendedWatcher>,
}

impl ChangeNotifier {
    /// Create an independent notifier with its own OS watcher and dispatch thread.
    pub fn new() -> Result<Self> {
        let (sender, events) = unbounded();
        let watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let _ = sender.send(event);
        })?;

        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let dispatch_registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("change-notifier".to_string())
            .spawn(move || dispatch(events, dispatch_registry))?;

        Ok(Self {
            registry,
            watcher: Mutex::new(watcher),
        })
    }

    /// The process-wide notifier, created on first use.
    pub fn global() -> Result<&'static ChangeNotifier> {
        if let Some(notifier) = GLOBAL.get() {
            return Ok(notifier);
        }
        let notifier = ChangeNotifier::new()?;
        Ok(GLOBAL.get_or_init(|| notifier))
    }

    /// Subscribe to `operations` on `path`.
    ///
    /// If `path` does not exist yet, its nearest existing ancestor directory is
    /// watched instead (which may be noisy for busy directories). Fails with
    /// [`StoreError::Unwatchable`] when nothing up to the root can be watched;
    /// the caller must not rely on reloads in that case.
    pub fn subscribe(&self, path: impl AsRef<Path>, operations: Operations) -> Result<Signal> {
        let key = normalize(path.as_ref());
        let mut registry = self.registry.lock();

        if !registry.contains_key(&key) {
            let watching = self.watch_nearest(&key)?;
            registry.insert(
                key.clone(),
                WatchEntry {
                    watching,
                    subscribers: HashMap::new(),
                },
            );
        }

        let signal = Signal::new();
        if let Some(entry) = registry.get_mut(&key) {
            for operation in operations.iter() {
                entry
                    .subscribers
                    .entry(operation)
                    .or_default()
                    .push(signal.clone());
            }
            debug!(
                path = %key.display(),
                watching = %entry.watching.display(),
                ?operations,
                "subscribed"
            );
        }
        Ok(signal)
    }

    /// Paths with at least one subscription.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.registry.lock().keys().cloned().collect()
    }

    /// Number of signals registered for `operation` on `path`.
    pub fn subscriber_count(&self, path: impl AsRef<Path>, operation: Operations) -> usize {
        let key = normalize(path.as_ref());
        self.registry
            .lock()
            .get(&key)
            .map(|entry| {
                operation
                    .iter()
                    .map(|op| entry.subscribers.get(&op).map_or(0, Vec::len))
                    .sum()
            })
            .unwrap_or(0)
    }

    fn watch_nearest(&self, path: &Path) -> Result<PathBuf> {
        let mut watcher = self.watcher.lock();
        let mut candidate = path;
        loop {
            match watcher.watch(candidate, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    debug!(path = %candidate.display(), "watching");
                    return Ok(candidate.to_path_buf());
                }
                Err(e) => {
                    debug!(path = %candidate.display(), error = %e, "cannot watch");
                    match candidate.parent() {
                        Some(parent) => candidate = parent,
                        None => {
                            return Err(StoreError::Unwatchable {
                                path: path.to_path_buf(),
                                source: e,
                            })
                        }
                    }
                }
            }
        }
    }
}

impl ChangeSource for ChangeNotifier {
    fn subscribe(&self, path: &Path, operations: Operations) -> Result<Signal> {
        ChangeNotifier::subscribe(self, path, operations)
    }
}

fn dispatch(events: Receiver<notify::Result<Event>>, registry: Registry) {
    for event in events.iter() {
        match event {
            Ok(event) => dispatch_event(&registry, &event),
            Err(e) => error!(error = %e, "change notifier error"),
        }
    }
    debug!("change notifier stopped");
}

fn dispatch_event(registry: &Registry, event: &Event) {
    let Some(operation) = operation_of(&event.kind) else {
        trace!(kind = ?event.kind, "ignoring event");
        return;
    };

    let registry = registry.lock();
    for path in &event.paths {
        let Some(signals) = registry
            .get(path)
            .and_then(|entry| entry.subscribers.get(&operation))
        else {
            continue;
        };
        for signal in signals {
            if signal.notify() {
                trace!(path = %path.display(), ?operation, "notified");
            } else {
                trace!(path = %path.display(), ?operation, "subscriber busy, dropped");
            }
        }
    }
}

/// Map a raw event kind onto the subscribable operations.
fn operation_of(kind: &EventKind) -> Option<Operations> {
    match kind {
        EventKind::Create(_) => Some(Operations::CREATE),
        EventKind::Remove(_) => Some(Operations::REMOVE),
        EventKind::Modify(ModifyKind::Name(_)) => Some(Operations::RENAME),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(Operations::CHMOD),
        EventKind::Modify(_) => Some(Operations::WRITE),
        _ => None,
    }
}

/// Absolute, symlink-resolved form of `path`, matching what the OS reports.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(resolved) = parent.canonicalize() {
            return resolved.join(name);
        }
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
