//! Tokio runtime for the tracking connection
//!
//! One task owns the [`ActivationGate`] and its [`StreamConnection`]; every
//! input (presentation signals, stream events, elapsed timers) reaches it as a
//! [`Command`] on a single channel, so state is only ever mutated from that
//! task. Observers read the latest [`TrackingSnapshot`] from a watch channel.

use crate::api::connection::StreamConnection;
use crate::api::gate::ActivationGate;
use crate::api::types::TrackingSnapshot;
use crate::core::{Generation, SubscriptionKey};
use crate::processing::SseDecoder;
use crate::transport::{
    EventStreamSource, RetryScheduler, TelemetryTransport, TransportError, TransportResult,
};
use crate::utils::TrackingConfig;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Inputs processed by the runtime task
#[derive(Debug)]
enum Command {
    Visibility(bool),
    Focus(bool),
    IntersectionRatio(f64),
    PageHidden(bool),
    SetKey(SubscriptionKey),
    Retry,
    Opened(Generation),
    Message(Generation, String),
    Failed(Generation, TransportError),
    RetryDue(Generation),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("tracking runtime has shut down")]
    Closed,
}

/// Transport that runs each subscription as a pump task feeding the runtime
struct ChannelTransport {
    source: Arc<dyn EventStreamSource>,
    commands: mpsc::UnboundedSender<Command>,
    pump: Option<JoinHandle<()>>,
}

impl ChannelTransport {
    fn new(source: Arc<dyn EventStreamSource>, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            source,
            commands,
            pump: None,
        }
    }
}

impl TelemetryTransport for ChannelTransport {
    fn open(&mut self, key: &SubscriptionKey, generation: Generation) -> TransportResult<()> {
        self.close();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::OpenRejected(e.to_string()))?;
        let pump = runtime.spawn(pump_events(
            Arc::clone(&self.source),
            key.clone(),
            generation,
            self.commands.clone(),
        ));
        self.pump = Some(pump);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn is_open(&self) -> bool {
        self.pump.is_some()
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect, then forward decoded messages until the stream ends or fails
async fn pump_events(
    source: Arc<dyn EventStreamSource>,
    key: SubscriptionKey,
    generation: Generation,
    commands: mpsc::UnboundedSender<Command>,
) {
    let mut stream = match source.connect(&key).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(%key, %generation, error = %e, "tracking stream connect failed");
            let _ = commands.send(Command::Failed(generation, e));
            return;
        }
    };

    if commands.send(Command::Opened(generation)).is_err() {
        return;
    }

    let mut decoder = SseDecoder::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for event in decoder.feed(&bytes) {
                    if !event.is_message() {
                        continue;
                    }
                    if commands
                        .send(Command::Message(generation, event.data))
                        .is_err()
                    {
                        return;
                    }
                }
                if decoder.dropped_lines() > 0 {
                    let _ = commands.send(Command::Failed(
                        generation,
                        TransportError::StreamError("event-stream line too long".into()),
                    ));
                    return;
                }
            }
            Err(e) => {
                let _ = commands.send(Command::Failed(generation, e));
                return;
            }
        }
    }

    let _ = commands.send(Command::Failed(
        generation,
        TransportError::closed("server ended the stream"),
    ));
}

/// Reconnect timer backed by `tokio::time::sleep`
struct TokioRetryScheduler {
    commands: mpsc::UnboundedSender<Command>,
    timer: Option<JoinHandle<()>>,
}

impl TokioRetryScheduler {
    fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            timer: None,
        }
    }
}

impl RetryScheduler for TokioRetryScheduler {
    fn schedule(&mut self, generation: Generation, delay: Duration) {
        self.cancel();
        let commands = self.commands.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::RetryDue(generation));
        }));
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn is_pending(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for TokioRetryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

type TrackerConnection = StreamConnection<ChannelTransport, TokioRetryScheduler>;

/// Handle to a running tracker; dropping it shuts the tracker down
#[derive(Debug)]
pub struct TrackingHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<TrackingSnapshot>,
    task: Option<JoinHandle<()>>,
}

/// Start a tracker for `key` on the current tokio runtime.
///
/// The tracker stays inactive until both visibility and focus have been
/// reported as true.
pub fn spawn_tracker(
    source: Arc<dyn EventStreamSource>,
    key: SubscriptionKey,
    config: &TrackingConfig,
) -> TrackingHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let transport = ChannelTransport::new(source, commands_tx.clone());
    let scheduler = TokioRetryScheduler::new(commands_tx.clone());
    let mut connection: TrackerConnection =
        StreamConnection::with_config(transport, scheduler, config);

    let (snapshot_tx, snapshot_rx) = watch::channel(connection.snapshot());
    connection
        .feed_mut()
        .register_snapshot_callback(Box::new(move |snapshot| {
            snapshot_tx.send_replace(snapshot.clone());
        }));

    let gate = ActivationGate::new(connection, key)
        .with_visibility_threshold(config.visibility_threshold);
    let task = tokio::spawn(run(gate, commands_rx));

    TrackingHandle {
        commands: commands_tx,
        snapshot: snapshot_rx,
        task: Some(task),
    }
}

async fn run(
    mut gate: ActivationGate<TrackerConnection>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    tracing::debug!(key = %gate.key(), "tracking runtime started");

    while let Some(command) = commands.recv().await {
        match command {
            Command::Visibility(visible) => {
                gate.on_visibility_changed(visible);
            }
            Command::Focus(focused) => {
                gate.on_focus_changed(focused);
            }
            Command::IntersectionRatio(ratio) => {
                gate.on_intersection_ratio(ratio);
            }
            Command::PageHidden(hidden) => {
                gate.on_page_hidden(hidden);
            }
            Command::SetKey(key) => gate.set_key(key),
            Command::Retry => {
                gate.retry();
            }
            Command::Opened(generation) => gate.connection_mut().on_open(generation),
            Command::Message(generation, payload) => {
                gate.connection_mut().on_message(generation, &payload)
            }
            Command::Failed(generation, error) => {
                gate.connection_mut().on_failure(generation, error)
            }
            Command::RetryDue(generation) => gate.connection_mut().on_retry_due(generation),
            Command::Shutdown => break,
        }
    }

    gate.dispose();
    tracing::debug!("tracking runtime stopped");
}

impl TrackingHandle {
    fn send(&self, command: Command) -> Result<(), TrackerError> {
        self.commands.send(command).map_err(|_| TrackerError::Closed)
    }

    pub fn set_visible(&self, visible: bool) -> Result<(), TrackerError> {
        self.send(Command::Visibility(visible))
    }

    pub fn set_focused(&self, focused: bool) -> Result<(), TrackerError> {
        self.send(Command::Focus(focused))
    }

    pub fn set_intersection_ratio(&self, ratio: f64) -> Result<(), TrackerError> {
        self.send(Command::IntersectionRatio(ratio))
    }

    pub fn set_page_hidden(&self, hidden: bool) -> Result<(), TrackerError> {
        self.send(Command::PageHidden(hidden))
    }

    pub fn set_key(&self, key: SubscriptionKey) -> Result<(), TrackerError> {
        self.send(Command::SetKey(key))
    }

    /// Manual retry after the automatic budget is spent
    pub fn retry(&self) -> Result<(), TrackerError> {
        self.send(Command::Retry)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshot.clone()
    }

    /// Tear down the connection and wait for the runtime task to finish
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "tracking runtime did not stop cleanly");
            }
        }
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConnectionState;
    use crate::transport::EventStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Script {
        Refuse,
        /// Send the chunks and keep the stream open
        Serve(Vec<&'static str>),
        /// Send the chunks and end the stream
        ServeAndClose(Vec<&'static str>),
        /// Send one raw chunk and keep the stream open
        Raw(Bytes),
    }

    /// Source replaying one script per connect; refuses once scripts run out
    #[derive(Default)]
    struct ScriptedSource {
        scripts: Mutex<VecDeque<Script>>,
        keys: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                keys: Mutex::default(),
            })
        }

        fn keys(&self) -> Vec<String> {
            self.keys.lock().unwrap().clone()
        }
    }

    fn chunks(chunks: Vec<&'static str>) -> impl futures_util::Stream<Item = TransportResult<Bytes>> {
        stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes()))),
        )
    }

    #[async_trait]
    impl EventStreamSource for ScriptedSource {
        async fn connect(&self, key: &SubscriptionKey) -> TransportResult<EventStream> {
            self.keys.lock().unwrap().push(key.as_str().to_string());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Refuse);

            match script {
                Script::Refuse => Err(TransportError::ConnectionFailed(
                    "connection refused".into(),
                )),
                Script::Serve(data) => Ok(Box::pin(chunks(data).chain(stream::pending()))),
                Script::ServeAndClose(data) => Ok(Box::pin(chunks(data))),
                Script::Raw(bytes) => Ok(Box::pin(
                    stream::iter([Ok::<_, TransportError>(bytes)]).chain(stream::pending()),
                )),
            }
        }
    }

    fn key(raw: &str) -> SubscriptionKey {
        SubscriptionKey::new(raw).unwrap()
    }

    fn activate(handle: &TrackingHandle) {
        handle.set_visible(true).unwrap();
        handle.set_focused(true).unwrap();
    }

    const SAMPLE: &str = "data: {\"lat\": 12.9, \"lng\": 77.6, \"speed\": 40}\n\n";

    #[tokio::test(start_paused = true)]
    async fn test_refused_connections_exhaust_budget() {
        let source = ScriptedSource::new(Vec::new());
        let start = Instant::now();
        let handle = spawn_tracker(source.clone(), key("trip-42"), &TrackingConfig::default());
        activate(&handle);

        let mut rx = handle.subscribe();
        let snapshot = rx.wait_for(|s| s.retry_exhausted()).await.unwrap().clone();

        assert_eq!(source.keys().len(), 4);
        assert!(start.elapsed() >= Duration::from_secs(18));
        assert_eq!(snapshot.consecutive_failures, 4);
        assert_eq!(snapshot.attempts_used, 3);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("connection failed: connection refused")
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_retry_reconnects() {
        let source = ScriptedSource::new(vec![
            Script::Refuse,
            Script::Refuse,
            Script::Refuse,
            Script::Refuse,
            Script::Serve(vec![SAMPLE]),
        ]);
        let handle = spawn_tracker(source.clone(), key("trip-42"), &TrackingConfig::default());
        activate(&handle);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.retry_exhausted()).await.unwrap();

        handle.retry().unwrap();
        let snapshot = rx
            .wait_for(|s| s.position.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(source.keys().len(), 5);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_flow_and_focus_loss() {
        let source = ScriptedSource::new(vec![Script::Serve(vec![
            ": keep-alive\n\n",
            "data: {\"lat\": 0, \"lng\": 0}\n\n",
            SAMPLE,
        ])]);
        let handle = spawn_tracker(source.clone(), key("trip-42"), &TrackingConfig::default());
        activate(&handle);

        let mut rx = handle.subscribe();
        let snapshot = rx
            .wait_for(|s| s.position.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(
            snapshot.position.map(|p| p.coordinates()),
            Some((12.9, 77.6))
        );

        handle.set_page_hidden(true).unwrap();
        let snapshot = rx
            .wait_for(|s| s.state == ConnectionState::Disconnected)
            .await
            .unwrap()
            .clone();
        assert!(snapshot.position.is_some());
        assert!(!snapshot.retry_pending);
        assert_eq!(source.keys(), vec!["trip-42".to_string()]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_reconnects_after_base_delay() {
        let source = ScriptedSource::new(vec![
            Script::ServeAndClose(vec![SAMPLE]),
            Script::Serve(Vec::new()),
        ]);
        let start = Instant::now();
        let handle = spawn_tracker(source.clone(), key("trip-42"), &TrackingConfig::default());
        activate(&handle);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.state == ConnectionState::Error)
            .await
            .unwrap();
        let snapshot = rx
            .wait_for(|s| s.state == ConnectionState::Connected)
            .await
            .unwrap()
            .clone();

        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(snapshot.attempts_used, 0);
        assert_eq!(source.keys().len(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_key_switches_subscription() {
        let source = ScriptedSource::new(vec![
            Script::Serve(vec![SAMPLE]),
            Script::Serve(Vec::new()),
        ]);
        let handle = spawn_tracker(source.clone(), key("trip-1"), &TrackingConfig::default());
        activate(&handle);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.position.is_some()).await.unwrap();

        handle.set_key(key("trip-2")).unwrap();
        let snapshot = rx
            .wait_for(|s| {
                s.state == ConnectionState::Connected
                    && s.key.as_ref().map(|k| k.as_str()) == Some("trip-2")
            })
            .await
            .unwrap()
            .clone();

        assert!(snapshot.position.is_none());
        assert_eq!(source.keys(), vec!["trip-1".to_string(), "trip-2".to_string()]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_until_both_signals() {
        let source = ScriptedSource::new(vec![Script::Serve(Vec::new())]);
        let handle = spawn_tracker(source.clone(), key("trip-42"), &TrackingConfig::default());

        handle.set_intersection_ratio(0.5).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.snapshot().state, ConnectionState::Idle);
        assert!(source.keys().is_empty());

        handle.set_page_hidden(false).unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.state == ConnectionState::Connected)
            .await
            .unwrap();

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disconnects() {
        let source = ScriptedSource::new(vec![Script::Serve(Vec::new())]);
        let handle = spawn_tracker(source, key("trip-42"), &TrackingConfig::default());
        activate(&handle);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.state == ConnectionState::Connected)
            .await
            .unwrap();

        let probe = handle.commands.clone();
        handle.shutdown().await;

        assert_eq!(rx.borrow().state, ConnectionState::Disconnected);
        assert!(probe.send(Command::Retry).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unterminated_line_fails_stream() {
        let flood = Bytes::from(format!("data: {}", "x".repeat(crate::core::MAX_SSE_LINE_BYTES)));
        let source = ScriptedSource::new(vec![Script::Raw(flood), Script::Serve(vec![SAMPLE])]);
        let handle = spawn_tracker(source.clone(), key("trip-42"), &TrackingConfig::default());
        activate(&handle);

        let mut rx = handle.subscribe();
        let failed = rx
            .wait_for(|s| s.state == ConnectionState::Error)
            .await
            .unwrap()
            .clone();
        assert_eq!(
            failed.last_error.as_deref(),
            Some("stream error: event-stream line too long")
        );
        assert!(failed.retry_pending);

        let snapshot = rx
            .wait_for(|s| s.position.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(source.keys().len(), 2);

        handle.shutdown().await;
    }
}
