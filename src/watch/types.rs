//! Operation flags and the single-slot signal handed to subscribers.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::time::Duration;

bitflags::bitflags! {
    /// Kinds of filesystem change a subscriber can ask for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Operations: u32 {
        const CREATE = 1;
        const WRITE = 1 << 1;
        const REMOVE = 1 << 2;
        const RENAME = 1 << 3;
        const CHMOD = 1 << 4;
    }
}

/// Wake-up flag with room for exactly one pending notification.
///
/// `notify` never blocks: when a notification is already pending the new one
/// is dropped. A received signal means "something changed, re-check", never
/// "one change happened". Clones share the same slot, so only one waiter
/// consumes each notification.
#[derive(Clone, Debug)]
pub struct Signal {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl Signal {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// Raise the signal. Returns false if one was already pending.
    pub fn notify(&self) -> bool {
        self.sender.try_send(()).is_ok()
    }

    /// Block until the signal is raised, then clear it.
    pub fn wait(&self) {
        // Cannot disconnect: this handle owns a sender.
        let _ = self.receiver.recv();
    }

    /// Wait up to `timeout`. Returns true if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.receiver.recv_timeout(timeout).is_ok()
    }

    /// Clear a pending signal without blocking. Returns true if one was pending.
    pub fn try_wait(&self) -> bool {
        self.receiver.try_recv().is_ok()
    }

    /// Whether a notification is pending.
    pub fn is_pending(&self) -> bool {
        !self.receiver.is_empty()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
