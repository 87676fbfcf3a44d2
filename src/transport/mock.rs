//! Recording transport and scheduler for tests and offline development

use crate::core::{Generation, SubscriptionKey};
use crate::transport::{RetryScheduler, TelemetryTransport, TransportError, TransportResult};
use std::time::Duration;

/// Transport that records every open/close instead of touching the network
#[derive(Debug, Default)]
pub struct MockTransport {
    current: Option<(SubscriptionKey, Generation)>,
    opened: Vec<(SubscriptionKey, Generation)>,
    close_count: u32,
    /// Highest number of simultaneously open connections ever observed
    max_concurrent: u32,
    reject_next_open: Option<TransportError>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` call fail synchronously with `error`
    pub fn reject_next_open(&mut self, error: TransportError) {
        self.reject_next_open = Some(error);
    }

    /// Key and generation of the open connection
    pub fn current(&self) -> Option<&(SubscriptionKey, Generation)> {
        self.current.as_ref()
    }

    pub fn current_generation(&self) -> Option<Generation> {
        self.current.as_ref().map(|(_, generation)| *generation)
    }

    /// Every successful open, oldest first
    pub fn opened(&self) -> &[(SubscriptionKey, Generation)] {
        &self.opened
    }

    pub fn open_count(&self) -> usize {
        self.opened.len()
    }

    pub fn close_count(&self) -> u32 {
        self.close_count
    }

    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }
}

impl TelemetryTransport for MockTransport {
    fn open(&mut self, key: &SubscriptionKey, generation: Generation) -> TransportResult<()> {
        if let Some(error) = self.reject_next_open.take() {
            return Err(error);
        }

        let concurrent = if self.current.is_some() { 2 } else { 1 };
        self.max_concurrent = self.max_concurrent.max(concurrent);

        self.current = Some((key.clone(), generation));
        self.opened.push((key.clone(), generation));
        Ok(())
    }

    fn close(&mut self) {
        if self.current.take().is_some() {
            self.close_count += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

/// Scheduler that records timers; tests fire them by hand
#[derive(Debug, Default)]
pub struct MockScheduler {
    pending: Option<(Generation, Duration)>,
    history: Vec<(Generation, Duration)>,
    cancel_count: u32,
    /// Times `schedule` was called while another timer was still pending
    overlaps: u32,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<(Generation, Duration)> {
        self.pending
    }

    /// Every scheduled delay, oldest first
    pub fn delays(&self) -> Vec<Duration> {
        self.history.iter().map(|(_, delay)| *delay).collect()
    }

    pub fn history(&self) -> &[(Generation, Duration)] {
        &self.history
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancel_count
    }

    pub fn overlaps(&self) -> u32 {
        self.overlaps
    }

    /// Remove and return the pending timer, as if it elapsed
    pub fn take_due(&mut self) -> Option<Generation> {
        self.pending.take().map(|(generation, _)| generation)
    }
}

impl RetryScheduler for MockScheduler {
    fn schedule(&mut self, generation: Generation, delay: Duration) {
        if self.pending.is_some() {
            self.overlaps += 1;
        }
        self.pending = Some((generation, delay));
        self.history.push((generation, delay));
    }

    fn cancel(&mut self) {
        if self.pending.take().is_some() {
            self.cancel_count += 1;
        }
    }

    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> SubscriptionKey {
        SubscriptionKey::new(raw).unwrap()
    }

    #[test]
    fn test_mock_transport_records_lifecycle() {
        let mut transport = MockTransport::new();
        assert!(!transport.is_open());

        transport.open(&key("trip-1"), Generation::new(1)).unwrap();
        assert!(transport.is_open());
        assert_eq!(transport.current_generation(), Some(Generation::new(1)));

        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert_eq!(transport.close_count(), 1);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.max_concurrent(), 1);
    }

    #[test]
    fn test_mock_transport_detects_overlap() {
        let mut transport = MockTransport::new();
        transport.open(&key("a"), Generation::new(1)).unwrap();
        transport.open(&key("b"), Generation::new(2)).unwrap();
        assert_eq!(transport.max_concurrent(), 2);
    }

    #[test]
    fn test_mock_transport_rejection() {
        let mut transport = MockTransport::new();
        transport.reject_next_open(TransportError::OpenRejected("offline".into()));
        assert!(transport.open(&key("a"), Generation::new(1)).is_err());
        assert!(!transport.is_open());
        assert!(transport.open(&key("a"), Generation::new(2)).is_ok());
    }

    #[test]
    fn test_mock_scheduler() {
        let mut scheduler = MockScheduler::new();
        scheduler.schedule(Generation::new(3), Duration::from_secs(3));
        assert!(scheduler.is_pending());
        assert_eq!(scheduler.take_due(), Some(Generation::new(3)));
        assert!(!scheduler.is_pending());

        scheduler.schedule(Generation::new(4), Duration::from_secs(6));
        scheduler.cancel();
        scheduler.cancel();
        assert_eq!(scheduler.cancel_count(), 1);
        assert_eq!(scheduler.overlaps(), 0);
        assert_eq!(
            scheduler.delays(),
            vec![Duration::from_secs(3), Duration::from_secs(6)]
        );
    }
}
