//! Visibility and focus activation gate
//!
//! The gate decides *whether* a subscription should exist: it is active only
//! while the tracking panel is both on screen and the page has focus. Every
//! flip of that derived flag is forwarded to the connection exactly once.

use crate::api::connection::StreamConnection;
use crate::core::{SubscriptionKey, DEFAULT_VISIBILITY_THRESHOLD};
use crate::transport::{RetryScheduler, TelemetryTransport};

/// Control surface the gate drives
pub trait ConnectionControl {
    fn activate(&mut self, key: &SubscriptionKey);
    fn deactivate(&mut self);
    /// Manual retry; returns whether a reconnect was started
    fn retry(&mut self) -> bool;
}

impl<T: TelemetryTransport, S: RetryScheduler> ConnectionControl for StreamConnection<T, S> {
    fn activate(&mut self, key: &SubscriptionKey) {
        self.activate_key(key.clone());
    }

    fn deactivate(&mut self) {
        StreamConnection::deactivate(self);
    }

    fn retry(&mut self) -> bool {
        StreamConnection::retry(self)
    }
}

/// Change of the derived active flag caused by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Activated,
    Deactivated,
}

/// Derives `is_active = visible && focused` and drives a [`ConnectionControl`]
///
/// Signals that have never been reported count as "no", so nothing is opened
/// before both have been observed.
pub struct ActivationGate<C: ConnectionControl> {
    connection: C,
    key: SubscriptionKey,
    visible: Option<bool>,
    focused: Option<bool>,
    active: bool,
    visibility_threshold: f64,
    disposed: bool,
}

impl<C: ConnectionControl> ActivationGate<C> {
    pub fn new(connection: C, key: SubscriptionKey) -> Self {
        Self {
            connection,
            key,
            visible: None,
            focused: None,
            active: false,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            disposed: false,
        }
    }

    /// Construct with both signals already known, activating immediately if
    /// they allow it
    pub fn with_initial(connection: C, key: SubscriptionKey, visible: bool, focused: bool) -> Self {
        let mut gate = Self::new(connection, key);
        gate.visible = Some(visible);
        gate.focused = Some(focused);
        gate.reconcile();
        gate
    }

    /// Fraction of the panel that must intersect the viewport to count as visible
    pub fn with_visibility_threshold(mut self, threshold: f64) -> Self {
        self.visibility_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn on_visibility_changed(&mut self, visible: bool) -> Option<GateTransition> {
        if self.disposed {
            return None;
        }
        self.visible = Some(visible);
        self.reconcile()
    }

    pub fn on_focus_changed(&mut self, focused: bool) -> Option<GateTransition> {
        if self.disposed {
            return None;
        }
        self.focused = Some(focused);
        self.reconcile()
    }

    /// Viewport intersection report in `[0, 1]`
    pub fn on_intersection_ratio(&mut self, ratio: f64) -> Option<GateTransition> {
        self.on_visibility_changed(ratio >= self.visibility_threshold)
    }

    /// Page visibility report; a hidden page counts as unfocused
    pub fn on_page_hidden(&mut self, hidden: bool) -> Option<GateTransition> {
        self.on_focus_changed(!hidden)
    }

    /// Point the gate at another entity. While active the connection switches
    /// immediately; otherwise the key is used on the next activation.
    pub fn set_key(&mut self, key: SubscriptionKey) {
        if self.disposed || key == self.key {
            return;
        }
        tracing::debug!(old = %self.key, new = %key, "tracking key changed");
        self.key = key;
        if self.active {
            self.connection.activate(&self.key);
        }
    }

    /// Manual retry; only meaningful while the gate is active
    pub fn retry(&mut self) -> bool {
        if self.disposed || !self.active {
            return false;
        }
        self.connection.retry()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_visible(&self) -> Option<bool> {
        self.visible
    }

    pub fn is_focused(&self) -> Option<bool> {
        self.focused
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Deactivate and stop reacting to signals. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.active = false;
        self.connection.deactivate();
    }

    fn reconcile(&mut self) -> Option<GateTransition> {
        let should_be_active = self.visible == Some(true) && self.focused == Some(true);
        if should_be_active == self.active {
            return None;
        }

        self.active = should_be_active;
        if should_be_active {
            tracing::debug!(key = %self.key, "tracking panel active");
            self.connection.activate(&self.key);
            Some(GateTransition::Activated)
        } else {
            tracing::debug!(key = %self.key, "tracking panel inactive");
            self.connection.deactivate();
            Some(GateTransition::Deactivated)
        }
    }
}

impl<C: ConnectionControl> Drop for ActivationGate<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}
