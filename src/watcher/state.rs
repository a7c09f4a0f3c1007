use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of a watcher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    InitializingCursors,
    Polling,
    Stopped,
}

impl WatcherState {
    fn as_u8(self) -> u8 {
        match self {
            WatcherState::Starting => 0,
            WatcherState::InitializingCursors => 1,
            WatcherState::Polling => 2,
            WatcherState::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WatcherState::Starting,
            1 => WatcherState::InitializingCursors,
            2 => WatcherState::Polling,
            _ => WatcherState::Stopped,
        }
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WatcherState::Starting => "starting",
            WatcherState::InitializingCursors => "initializing_cursors",
            WatcherState::Polling => "polling",
            WatcherState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Shares the current [`WatcherState`] between the loop and observers.
#[derive(Debug)]
pub struct StateTracker {
    current: AtomicU8,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: AtomicU8::new(WatcherState::Starting.as_u8()),
        }
    }

    pub fn current(&self) -> WatcherState {
        WatcherState::from_u8(self.current.load(Ordering::SeqCst))
    }

    pub(crate) fn transition(&self, next: WatcherState) {
        let previous = WatcherState::from_u8(self.current.swap(next.as_u8(), Ordering::SeqCst));
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "watcher state changed");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.current() == WatcherState::Polling
    }

    pub fn is_stopped(&self) -> bool {
        self.current() == WatcherState::Stopped
    }
}
