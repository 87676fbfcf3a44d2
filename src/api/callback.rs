//! Callback registry feeding the presentation layer
//!
//! The stream connection pushes positions, lifecycle events and snapshots
//! through a [`TrackingFeed`]; renderers register closures and keep the
//! returned handle to unregister later.

use crate::api::types::{ConnectionEvent, TrackingSnapshot};
use crate::core::Position;
use std::collections::BTreeMap;

/// Callback invoked with every accepted position
pub type PositionCallback = Box<dyn Fn(&Position) + Send>;

/// Callback invoked with every connection event
pub type EventCallback = Box<dyn Fn(&ConnectionEvent) + Send>;

/// Callback invoked whenever the observable snapshot changes
pub type SnapshotCallback = Box<dyn Fn(&TrackingSnapshot) + Send>;

/// Callback registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackHandle(u32);

impl CallbackHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("unknown callback handle {0}")]
    UnknownHandle(u32),
}

/// Registered presentation callbacks, invoked in registration order
#[derive(Default)]
pub struct TrackingFeed {
    callback_counter: u32,
    position_callbacks: BTreeMap<CallbackHandle, PositionCallback>,
    event_callbacks: BTreeMap<CallbackHandle, EventCallback>,
    snapshot_callbacks: BTreeMap<CallbackHandle, SnapshotCallback>,
}

impl TrackingFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handle(&mut self) -> CallbackHandle {
        self.callback_counter += 1;
        CallbackHandle(self.callback_counter)
    }

    pub fn register_position_callback(&mut self, callback: PositionCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.position_callbacks.insert(handle, callback);
        handle
    }

    pub fn register_event_callback(&mut self, callback: EventCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.event_callbacks.insert(handle, callback);
        handle
    }

    pub fn register_snapshot_callback(&mut self, callback: SnapshotCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.snapshot_callbacks.insert(handle, callback);
        handle
    }

    pub fn unregister_callback(&mut self, handle: CallbackHandle) -> Result<(), FeedError> {
        let removed = self.position_callbacks.remove(&handle).is_some()
            || self.event_callbacks.remove(&handle).is_some()
            || self.snapshot_callbacks.remove(&handle).is_some();

        if removed {
            Ok(())
        } else {
            Err(FeedError::UnknownHandle(handle.0))
        }
    }

    /// Number of registered (position, event, snapshot) callbacks
    pub fn callback_count(&self) -> (usize, usize, usize) {
        (
            self.position_callbacks.len(),
            self.event_callbacks.len(),
            self.snapshot_callbacks.len(),
        )
    }

    pub(crate) fn emit_position(&self, position: &Position) {
        for callback in self.position_callbacks.values() {
            callback(position);
        }
    }

    pub(crate) fn emit_event(&self, event: &ConnectionEvent) {
        for callback in self.event_callbacks.values() {
            callback(event);
        }
    }

    pub(crate) fn emit_snapshot(&self, snapshot: &TrackingSnapshot) {
        for callback in self.snapshot_callbacks.values() {
            callback(snapshot);
        }
    }

    pub fn clear(&mut self) {
        self.position_callbacks.clear();
        self.event_callbacks.clear();
        self.snapshot_callbacks.clear();
    }
}

impl std::fmt::Debug for TrackingFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingFeed")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_register_and_emit() {
        let mut feed = TrackingFeed::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let handle = feed.register_position_callback(Box::new(move |p| {
            sink.lock().unwrap().push(p.coordinates());
        }));

        feed.emit_position(&Position::new(12.9, 77.6));
        assert_eq!(*seen.lock().unwrap(), vec![(12.9, 77.6)]);

        feed.unregister_callback(handle).unwrap();
        feed.emit_position(&Position::new(1.0, 2.0));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_handle() {
        let mut feed = TrackingFeed::new();
        let handle = feed.register_event_callback(Box::new(|_| {}));
        feed.unregister_callback(handle).unwrap();
        assert_eq!(
            feed.unregister_callback(handle),
            Err(FeedError::UnknownHandle(handle.id()))
        );
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let mut feed = TrackingFeed::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            feed.register_snapshot_callback(Box::new(move |_| order.lock().unwrap().push(tag)));
        }

        feed.emit_snapshot(&TrackingSnapshot::idle(3));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(feed.callback_count(), (0, 0, 3));

        feed.clear();
        assert_eq!(feed.callback_count(), (0, 0, 0));
    }
}
