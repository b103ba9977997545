//! Update notifications for scene graph mutations.
//!
//! Every scene node owns an [`UpdateSignal`]: a monotonically versioned
//! channel that observers (renderers, caches) connect to in order to learn
//! when a subtree changed and what kind of change it was. Mutating operations
//! emit exactly one notification after the edit is complete, never during it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

bitflags::bitflags! {
    /// Nature of a scene graph change, combined bitwise.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UpdateFlags: u32 {
        /// A node was added somewhere below the notifying node.
        const ADDED = 1 << 0;
        /// A node was removed somewhere below the notifying node.
        const REMOVED = 1 << 1;
        /// Content (geometry, appearance, transform) changed in place.
        const MODIFIED = 1 << 2;
    }
}

/// A change notification delivered to graph observers.
///
/// Observers decide what to invalidate from the flags: a renderer holding
/// per-subtree GPU caches drops buffers on `ADDED | REMOVED` and refreshes
/// uploaded data on `MODIFIED`.
#[derive(Debug, Clone, Copy)]
pub struct Update {
    flags: UpdateFlags,
}

impl Update {
    pub fn new(flags: UpdateFlags) -> Self {
        Self { flags }
    }

    /// An in-place content change.
    pub fn modified() -> Self {
        Self::new(UpdateFlags::MODIFIED)
    }

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    pub fn contains(&self, flags: UpdateFlags) -> bool {
        self.flags.contains(flags)
    }
}

type Slot = Arc<dyn Fn(&Update) + Send + Sync>;

struct SignalState {
    version: AtomicU64,
    next_slot_id: AtomicU64,
    slots: Mutex<Vec<(u64, Slot)>>,
}

/// Monotonically versioned update channel.
///
/// Emitting bumps the version counter and invokes every connected observer
/// with the update. The version allows cheap "did anything change since I
/// last looked" checks without connecting a callback.
pub struct UpdateSignal {
    state: Arc<SignalState>,
}

impl UpdateSignal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState {
                version: AtomicU64::new(0),
                next_slot_id: AtomicU64::new(0),
                slots: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Number of emissions so far.
    pub fn version(&self) -> u64 {
        self.state.version.load(Ordering::Acquire)
    }

    /// Connects an observer. The returned [`Connection`] disconnects the
    /// observer when dropped.
    pub fn connect(&self, f: impl Fn(&Update) + Send + Sync + 'static) -> Connection {
        let id = self.state.next_slot_id.fetch_add(1, Ordering::Relaxed);
        self.state.slots.lock().push((id, Arc::new(f)));
        Connection {
            state: Arc::downgrade(&self.state),
            id,
        }
    }

    /// Bumps the version and invokes every connected observer.
    ///
    /// Observers must not mutate the emitting node from inside the callback;
    /// they record what to invalidate and act afterwards.
    pub fn emit(&self, update: &Update) {
        self.state.version.fetch_add(1, Ordering::AcqRel);
        let slots: Vec<Slot> = self
            .state
            .slots
            .lock()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for slot in slots {
            slot(update);
        }
    }

    /// True if any observer is currently connected.
    pub fn has_observers(&self) -> bool {
        !self.state.slots.lock().is_empty()
    }
}

impl Default for UpdateSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped connection to an [`UpdateSignal`].
///
/// Dropping the connection removes the observer, so a subscription lives
/// exactly as long as its holder.
pub struct Connection {
    state: Weak<SignalState>,
    id: u64,
}

impl Connection {
    /// Removes the observer now instead of at drop time.
    pub fn disconnect(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.slots.lock().retain(|(id, _)| *id != self.id);
        }
        self.state = Weak::new();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
