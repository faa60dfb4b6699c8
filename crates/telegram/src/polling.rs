use std::future::Future;
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::api::{envelope_from_update, BotApiClient};
use crate::events::{default_dispatcher, EventContext, EventDispatcher, TelegramEnvelope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// Backoff between reconnects. Polling never gives up; the delay only grows
/// while consecutive round trips keep failing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 250, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of inbound updates. `poll` performs one round trip and may return
/// an empty batch; `None` means the stream is closed for good.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn poll(&self) -> Result<Option<Vec<TelegramEnvelope>>, TransportError>;
    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopUpdateTransport;

#[async_trait]
impl UpdateTransport for NoopUpdateTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn poll(&self) -> Result<Option<Vec<TelegramEnvelope>>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _update_id: i64) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Long-polls `getUpdates`. Acknowledging an update advances the offset so
/// Telegram drops it on the next poll.
pub struct BotApiTransport {
    client: BotApiClient,
    poll_timeout_secs: u64,
    offset: Mutex<Option<i64>>,
}

impl BotApiTransport {
    pub fn new(client: BotApiClient, poll_timeout_secs: u64) -> Self {
        Self { client, poll_timeout_secs, offset: Mutex::new(None) }
    }
}

#[async_trait]
impl UpdateTransport for BotApiTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let me = self
            .client
            .get_me()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        info!(
            bot_id = me.id,
            bot_username = me.username.as_deref().unwrap_or("unknown"),
            "telegram bot identity verified"
        );
        Ok(())
    }

    async fn poll(&self) -> Result<Option<Vec<TelegramEnvelope>>, TransportError> {
        let offset = *self.offset.lock().await;
        let updates = self
            .client
            .get_updates(offset, self.poll_timeout_secs)
            .await
            .map_err(|error| TransportError::Receive(error.to_string()))?;
        debug!(count = updates.len(), offset, "telegram poll returned");

        Ok(Some(updates.into_iter().map(envelope_from_update).collect()))
    }

    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
        let mut offset = self.offset.lock().await;
        let next = update_id + 1;
        if offset.map_or(true, |current| next > current) {
            *offset = Some(next);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Why [`LongPollRunner::run_until`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollExit {
    ShutdownRequested,
    StreamClosed,
}

/// Pulls updates and dispatches each on its own task so a slow quote run
/// never blocks other chats.
pub struct LongPollRunner {
    transport: Arc<dyn UpdateTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl Default for LongPollRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopUpdateTransport),
            dispatcher: Arc::new(default_dispatcher()),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl LongPollRunner {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), reconnect_policy }
    }

    /// Polls until `shutdown` resolves or the transport closes its stream.
    /// Transport failures are retried indefinitely. On exit, in-flight turns
    /// get `grace` to finish before they are aborted.
    pub async fn run_until<F>(&self, shutdown: F, grace: Duration) -> PollExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut in_flight = JoinSet::new();
        let mut attempt = 0_u32;

        let exit = loop {
            let pumped = tokio::select! {
                result = self.connect_and_pump(&mut attempt, &mut in_flight) => Some(result),
                _ = &mut shutdown => None,
            };

            let transport_error = match pumped {
                None => break PollExit::ShutdownRequested,
                Some(Ok(())) => break PollExit::StreamClosed,
                Some(Err(error)) => error,
            };

            let delay = self.reconnect_policy.backoff(attempt);
            warn!(
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %transport_error,
                "telegram polling transport failed"
            );
            attempt = attempt.saturating_add(1);

            let interrupted = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = &mut shutdown => true,
            };
            if interrupted {
                break PollExit::ShutdownRequested;
            }
        };

        info!(exit = ?exit, in_flight = in_flight.len(), "telegram polling stopped");
        drain(&mut in_flight, grace).await;
        exit
    }

    async fn connect_and_pump(
        &self,
        attempt: &mut u32,
        in_flight: &mut JoinSet<()>,
    ) -> Result<(), TransportError> {
        info!(attempt = *attempt, "opening telegram polling transport");
        self.transport.connect().await?;
        info!(attempt = *attempt, "telegram polling transport connected");

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join_failure(joined);
            }

            let Some(batch) = self.transport.poll().await? else {
                info!("telegram update stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            if *attempt > 0 {
                info!(failed_attempts = *attempt, "telegram polling recovered");
                *attempt = 0;
            }

            for envelope in batch {
                self.dispatch(envelope, in_flight).await;
            }
        }
    }

    async fn dispatch(&self, envelope: TelegramEnvelope, in_flight: &mut JoinSet<()>) {
        let correlation_id = envelope.correlation_id();
        info!(
            event_name = "ingress.telegram.update_received",
            update_id = envelope.update_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %correlation_id,
            chat_id = envelope.chat_id().unwrap_or_default(),
            "received telegram update"
        );

        if let Err(error) = self.transport.acknowledge(envelope.update_id).await {
            warn!(
                event_name = "ingress.telegram.ack_failed",
                update_id = envelope.update_id,
                correlation_id = %correlation_id,
                error = %error,
                "failed to acknowledge telegram update"
            );
        }

        let dispatcher = self.dispatcher.clone();
        in_flight.spawn(async move {
            let context = EventContext { correlation_id };
            if let Err(error) = dispatcher.dispatch(&envelope, &context).await {
                warn!(
                    update_id = envelope.update_id,
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "event dispatch failed; continuing polling loop"
                );
            }
        });
    }
}

async fn drain(in_flight: &mut JoinSet<()>, grace: Duration) {
    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = in_flight.join_next().await {
            log_join_failure(joined);
        }
    })
    .await;

    if finished.is_err() {
        warn!(
            remaining = in_flight.len(),
            grace_secs = grace.as_secs(),
            "shutdown grace period elapsed; aborting in-flight telegram updates"
        );
        in_flight.shutdown().await;
    }
}

fn log_join_failure(joined: Result<(), tokio::task::JoinError>) {
    if let Err(error) = joined {
        warn!(error = %error, "telegram update task did not complete");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::pending;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{LongPollRunner, PollExit, ReconnectPolicy, TransportError, UpdateTransport};
    use crate::events::{
        EventContext, EventDispatcher, EventHandlerError, TelegramEnvelope, TelegramEvent,
        TextMessageEvent, TextMessageHandler, TextMessageService,
    };
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    type Batch = Result<Option<Vec<TelegramEnvelope>>, TransportError>;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
        hang_when_exhausted: bool,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        batches: VecDeque<Batch>,
        connect_attempts: usize,
        acknowledgements: Vec<i64>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            batches: Vec<Batch>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    batches: batches.into(),
                    ..ScriptedState::default()
                }),
                hang_when_exhausted: false,
            }
        }

        fn hanging(batches: Vec<Batch>) -> Self {
            Self { hang_when_exhausted: true, ..Self::with_script(Vec::new(), batches) }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<i64> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl UpdateTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn poll(&self) -> Batch {
            let next = self.state.lock().await.batches.pop_front();
            match next {
                Some(batch) => batch,
                None if self.hang_when_exhausted => pending().await,
                None => Ok(None),
            }
        }

        async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(update_id);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingService {
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextMessageService for CountingService {
        async fn handle_text_message(
            &self,
            event: &TextMessageEvent,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen.lock().await.push(event.text.clone());
            Ok(())
        }
    }

    fn text(update_id: i64, text: &str) -> TelegramEnvelope {
        TelegramEnvelope {
            update_id,
            event: TelegramEvent::TextMessage(TextMessageEvent {
                chat_id: 77,
                message_id: update_id,
                from_user_id: None,
                text: text.to_owned(),
            }),
        }
    }

    fn receive_error() -> Batch {
        Err(TransportError::Receive("connection reset".to_owned()))
    }

    fn no_delay() -> ReconnectPolicy {
        ReconnectPolicy { base_delay_ms: 0, max_delay_ms: 0 }
    }

    fn dispatcher_for(service: Arc<CountingService>) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(TextMessageHandler::new(service));
        dispatcher
    }

    const GRACE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(vec![TelegramEnvelope {
                    update_id: 1,
                    event: TelegramEvent::Unsupported { event_type: "test".to_owned() },
                }])),
                Ok(None),
            ],
        ));

        let runner = LongPollRunner::new(transport.clone(), EventDispatcher::default(), no_delay());

        let exit = runner.run_until(pending(), GRACE).await;

        assert_eq!(exit, PollExit::StreamClosed);
        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec![1]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn idle_bot_keeps_polling_through_scattered_errors() {
        let mut batches: Vec<Batch> = (0..6).map(|_| receive_error()).collect();
        batches.push(Ok(Some(vec![text(1, "after outage")])));
        batches.push(Ok(None));
        let transport = Arc::new(ScriptedTransport::with_script(Vec::new(), batches));
        let service = Arc::new(CountingService::default());

        let runner =
            LongPollRunner::new(transport.clone(), dispatcher_for(service.clone()), no_delay());
        let exit = runner.run_until(pending(), GRACE).await;

        assert_eq!(exit, PollExit::StreamClosed);
        assert_eq!(transport.connect_attempts().await, 7);
        assert_eq!(*service.seen.lock().await, vec!["after outage"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_poll_resets_backoff() {
        let transport = Arc::new(ScriptedTransport::with_script(
            Vec::new(),
            vec![
                receive_error(),
                Ok(Some(Vec::new())),
                receive_error(),
                Ok(Some(Vec::new())),
                receive_error(),
                Ok(None),
            ],
        ));
        let policy = ReconnectPolicy { base_delay_ms: 100, max_delay_ms: 10_000 };
        let runner = LongPollRunner::new(transport.clone(), EventDispatcher::default(), policy);

        let started = Instant::now();
        runner.run_until(pending(), GRACE).await;
        let waited = started.elapsed();

        // Three first-attempt delays; without the reset it would be 100 + 200 + 400.
        assert!(waited >= Duration::from_millis(300), "waited {waited:?}");
        assert!(waited < Duration::from_millis(400), "waited {waited:?}");
    }

    #[tokio::test]
    async fn progress_is_dispatched_across_reconnects() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("fail-1".to_owned())), Ok(()), Ok(())],
            vec![
                Ok(Some(vec![text(1, "first")])),
                receive_error(),
                Ok(Some(vec![text(2, "second"), text(3, "third")])),
                Ok(None),
            ],
        ));
        let service = Arc::new(CountingService::default());

        let runner =
            LongPollRunner::new(transport.clone(), dispatcher_for(service.clone()), no_delay());
        runner.run_until(pending(), GRACE).await;

        assert_eq!(transport.connect_attempts().await, 3);
        assert_eq!(transport.acknowledgements().await, vec![1, 2, 3]);
        let mut seen = service.seen.lock().await.clone();
        seen.sort();
        assert_eq!(seen, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_turns() {
        let transport =
            Arc::new(ScriptedTransport::hanging(vec![Ok(Some(vec![text(1, "slow")]))]));
        let service =
            Arc::new(CountingService { delay: Duration::from_secs(2), ..Default::default() });

        let runner =
            LongPollRunner::new(transport.clone(), dispatcher_for(service.clone()), no_delay());
        let exit =
            runner.run_until(tokio::time::sleep(Duration::from_millis(50)), GRACE).await;

        assert_eq!(exit, PollExit::ShutdownRequested);
        assert_eq!(*service.seen.lock().await, vec!["slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_turns_that_outlive_the_grace_period() {
        let transport =
            Arc::new(ScriptedTransport::hanging(vec![Ok(Some(vec![text(1, "stuck")]))]));
        let service =
            Arc::new(CountingService { delay: Duration::from_secs(600), ..Default::default() });

        let runner =
            LongPollRunner::new(transport.clone(), dispatcher_for(service.clone()), no_delay());
        let started = Instant::now();
        let exit = runner
            .run_until(tokio::time::sleep(Duration::from_millis(50)), Duration::from_secs(1))
            .await;

        assert_eq!(exit, PollExit::ShutdownRequested);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(service.seen.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("down".to_owned()))],
            Vec::new(),
        ));
        let policy = ReconnectPolicy { base_delay_ms: 60_000, max_delay_ms: 60_000 };
        let runner = LongPollRunner::new(transport.clone(), EventDispatcher::default(), policy);

        let started = Instant::now();
        let exit =
            runner.run_until(tokio::time::sleep(Duration::from_millis(10)), GRACE).await;

        assert_eq!(exit, PollExit::ShutdownRequested);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.connect_attempts().await, 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy { base_delay_ms: 250, max_delay_ms: 5_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(10).as_millis(), 5_000);
        assert_eq!(policy.backoff(u32::MAX).as_millis(), 5_000);
    }
}
