//! Rate-limited in-memory queue for a single notification channel.
//!
//! Each queue owns a timer task that fires once per tick interval
//! (`ceil(window_ms / rate_limit)`). On every tick, if nothing is in flight,
//! the head message is handed to the registered handler together with an
//! [`Ack`]. The message stays at the head until the ack is settled, so at most
//! one delivery attempt per queue is ever outstanding.
//!
//! Retries are the handler's business: [`Ack::requeue`] appends a copy to the
//! tail and releases the head, which moves the retried message behind
//! everything already pending.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use relay_common::config::QueueSettings;
use relay_common::types::{Channel, NotificationMessage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Invalid queue config: {0}")]
    InvalidQueueConfig(String),
}

/// Throughput cap for a queue: at most `rate_limit` attempts per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    rate_limit: u32,
    window_ms: u64,
}

impl RateLimit {
    pub fn new(rate_limit: u32, window_ms: u64) -> Result<Self, QueueError> {
        if rate_limit == 0 {
            return Err(QueueError::InvalidQueueConfig(
                "Rate limit must be a positive number".to_string(),
            ));
        }
        if window_ms == 0 {
            return Err(QueueError::InvalidQueueConfig(
                "Window size must be a positive number".to_string(),
            ));
        }
        Ok(Self {
            rate_limit,
            window_ms,
        })
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Time between two delivery attempts.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.window_ms.div_ceil(u64::from(self.rate_limit)))
    }
}

impl TryFrom<QueueSettings> for RateLimit {
    type Error = QueueError;

    fn try_from(settings: QueueSettings) -> Result<Self, Self::Error> {
        Self::new(settings.rate_limit, settings.window_ms)
    }
}

/// Receives the head message of a queue on each tick.
///
/// The handler must eventually settle the [`Ack`]; until then the queue treats
/// the delivery as in flight and starts no other attempt.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: NotificationMessage, ack: Ack);
}

struct QueueState {
    pending: VecDeque<NotificationMessage>,
    handler: Option<Arc<dyn MessageHandler>>,
    in_flight: bool,
}

impl QueueState {
    /// Claim the head message for delivery, if a tick may start one now.
    fn begin_delivery(&mut self) -> Option<(NotificationMessage, Arc<dyn MessageHandler>)> {
        if self.in_flight {
            return None;
        }
        let handler = self.handler.clone()?;
        let message = self.pending.front()?.clone();
        self.in_flight = true;
        Some((message, handler))
    }
}

/// Settles the in-flight delivery of a queue's head message.
///
/// Dropping an `Ack` without settling it releases the in-flight slot but keeps
/// the message at the head, so the next tick delivers it again.
pub struct Ack {
    state: Arc<Mutex<QueueState>>,
    channel: Channel,
    settled: bool,
}

impl Ack {
    /// Remove the head message and free the queue for the next tick.
    pub fn ack(mut self) {
        self.settle(None);
    }

    /// Append `message` to the tail, then remove the head message.
    pub fn requeue(mut self, message: NotificationMessage) {
        self.settle(Some(message));
    }

    fn settle(&mut self, retry: Option<NotificationMessage>) {
        let mut state = self.state.lock();
        if let Some(message) = retry {
            state.pending.push_back(message);
        }
        state.pending.pop_front();
        state.in_flight = false;
        self.settled = true;
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.state.lock().in_flight = false;
        tracing::warn!(
            channel = %self.channel,
            "Delivery released without acknowledgment, message kept at head"
        );
    }
}

struct Shared {
    channel: Channel,
    limit: RateLimit,
    state: Arc<Mutex<QueueState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

/// Pending messages for one channel plus the timer that drains them.
///
/// Cloning is cheap and yields another handle to the same queue. The timer is
/// cancelled by [`ChannelQueue::stop`] or when the last handle is dropped.
#[derive(Clone)]
pub struct ChannelQueue {
    shared: Arc<Shared>,
}

impl ChannelQueue {
    /// Create a queue and start its timer. Must be called inside a tokio runtime.
    pub fn new(channel: Channel, rate_limit: u32, window_ms: u64) -> Result<Self, QueueError> {
        Ok(Self::with_limit(channel, RateLimit::new(rate_limit, window_ms)?))
    }

    /// Create a queue from an already validated limit.
    pub fn with_limit(channel: Channel, limit: RateLimit) -> Self {
        let state = Arc::new(Mutex::new(QueueState {
            pending: VecDeque::new(),
            handler: None,
            in_flight: false,
        }));

        let timer = spawn_timer(Arc::clone(&state), channel, limit.tick_interval());

        tracing::info!(
            channel = %channel,
            rate_limit = limit.rate_limit(),
            window_ms = limit.window_ms(),
            tick_ms = limit.tick_interval().as_millis() as u64,
            "Channel queue started"
        );

        Self {
            shared: Arc::new(Shared {
                channel,
                limit,
                state,
                timer: Mutex::new(Some(timer)),
            }),
        }
    }

    /// Append a message to the tail of the queue.
    pub fn enqueue(&self, message: NotificationMessage) {
        let user_id = message.user_id;
        let message_id = message.id;
        let depth = {
            let mut state = self.shared.state.lock();
            state.pending.push_back(message);
            state.pending.len()
        };

        tracing::info!(
            channel = %self.shared.channel,
            user_id,
            message_id = %message_id,
            depth,
            "Message queued"
        );
    }

    /// Install the delivery handler. The latest registration wins.
    pub fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.shared.state.lock().handler = Some(handler);
    }

    /// Cancel the timer. Pending messages are kept but no longer drained.
    pub fn stop(&self) {
        if let Some(timer) = self.shared.timer.lock().take() {
            timer.abort();
            tracing::info!(
                channel = %self.shared.channel,
                pending = self.len(),
                "Channel queue stopped"
            );
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.timer.lock().is_none()
    }

    pub fn channel(&self) -> Channel {
        self.shared.channel
    }

    pub fn tick_interval(&self) -> Duration {
        self.shared.limit.tick_interval()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.state.lock().in_flight
    }

    /// Snapshot of the pending messages, head first.
    pub fn pending(&self) -> Vec<NotificationMessage> {
        self.shared.state.lock().pending.iter().cloned().collect()
    }
}

fn spawn_timer(state: Arc<Mutex<QueueState>>, channel: Channel, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let claimed = state.lock().begin_delivery();
            let Some((message, handler)) = claimed else {
                continue;
            };

            tracing::debug!(
                channel = %channel,
                message_id = %message.id,
                attempts = message.attempts,
                "Delivering head message"
            );

            let ack = Ack {
                state: Arc::clone(&state),
                channel,
                settled: false,
            };
            tokio::spawn(async move {
                handler.handle(message, ack).await;
            });
        }
    })
}
