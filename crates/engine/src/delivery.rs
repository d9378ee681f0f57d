//! Retry policy applied to every delivery attempt.
//!
//! A failed message goes back to the tail of its queue with its attempt
//! counter bumped, until the counter reaches [`MAX_DELIVERY_ATTEMPTS`]; then
//! it is dropped and the loss is logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use relay_common::types::NotificationMessage;
use relay_notifier::{Ack, DeliveryError, DeliveryProvider, MessageHandler};

/// Total delivery attempts per message, first try included.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// What to do with a message whose delivery just failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put this copy at the tail of the queue.
    Requeue(NotificationMessage),
    /// Give up on the message.
    Drop,
}

impl RetryDecision {
    pub fn after_failure(message: &NotificationMessage) -> Self {
        let next = message.next_attempt();
        if next.attempts >= MAX_DELIVERY_ATTEMPTS {
            RetryDecision::Drop
        } else {
            RetryDecision::Requeue(next)
        }
    }
}

/// Queue handler that delivers through a provider and applies the retry policy.
pub struct RetryingHandler {
    provider: Arc<dyn DeliveryProvider>,
    timeout: Option<Duration>,
}

impl RetryingHandler {
    pub fn new(provider: Arc<dyn DeliveryProvider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Bound each provider call; a timeout counts as a failed attempt.
    /// A zero duration leaves calls unbounded.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|limit| !limit.is_zero());
        self
    }

    async fn attempt(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let delivery = self
            .provider
            .deliver(message.channel, &message.recipient, &message.body);

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, delivery)
                .await
                .map_err(|_| DeliveryError::Timeout(limit))?,
            None => delivery.await,
        }
    }
}

#[async_trait]
impl MessageHandler for RetryingHandler {
    async fn handle(&self, message: NotificationMessage, ack: Ack) {
        let error = match self.attempt(&message).await {
            Ok(()) => {
                tracing::info!(
                    message_id = %message.id,
                    user_id = message.user_id,
                    channel = %message.channel,
                    attempts = message.attempts,
                    provider = self.provider.name(),
                    "Notification delivered"
                );
                ack.ack();
                return;
            }
            Err(e) => e,
        };

        match RetryDecision::after_failure(&message) {
            RetryDecision::Requeue(retry) => {
                tracing::warn!(
                    message_id = %message.id,
                    user_id = message.user_id,
                    channel = %message.channel,
                    attempts = retry.attempts,
                    error = %error,
                    "Delivery failed, requeueing"
                );
                ack.requeue(retry);
            }
            RetryDecision::Drop => {
                tracing::error!(
                    message_id = %message.id,
                    user_id = message.user_id,
                    channel = %message.channel,
                    attempts = message.attempts + 1,
                    error = %error,
                    "Notification dropped after max delivery attempts"
                );
                ack.ack();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use relay_common::types::Channel;
    use relay_notifier::ChannelQueue;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyProvider {
        failures: usize,
        calls: Mutex<Vec<(Channel, String, String)>>,
    }

    impl FlakyProvider {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl DeliveryProvider for FlakyProvider {
        async fn deliver(
            &self,
            channel: Channel,
            recipient: &str,
            body: &str,
        ) -> Result<(), DeliveryError> {
            let mut calls = self.calls.lock();
            calls.push((channel, recipient.to_string(), body.to_string()));
            if calls.len() <= self.failures {
                return Err(DeliveryError::Rejected("503 Service Unavailable".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    /// Never answers.
    struct HungProvider;

    #[async_trait]
    impl DeliveryProvider for HungProvider {
        async fn deliver(&self, _: Channel, _: &str, _: &str) -> Result<(), DeliveryError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hung"
        }
    }

    /// Yields to the scheduler once before succeeding.
    #[derive(Default)]
    struct YieldingProvider {
        completed: Mutex<usize>,
    }

    #[async_trait]
    impl DeliveryProvider for YieldingProvider {
        async fn deliver(&self, _: Channel, _: &str, _: &str) -> Result<(), DeliveryError> {
            tokio::task::yield_now().await;
            *self.completed.lock() += 1;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "yielding"
        }
    }

    fn msg(body: &str) -> NotificationMessage {
        NotificationMessage::new(Channel::Email, "a@x.com", body, 1)
    }

    #[test]
    fn test_after_failure_requeues_then_drops() {
        let first = msg("hi");
        let RetryDecision::Requeue(second) = RetryDecision::after_failure(&first) else {
            panic!("first failure should requeue");
        };
        assert_eq!(second.attempts, 1);

        let RetryDecision::Requeue(third) = RetryDecision::after_failure(&second) else {
            panic!("second failure should requeue");
        };
        assert_eq!(third.attempts, 2);

        assert_eq!(RetryDecision::after_failure(&third), RetryDecision::Drop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_acks_once() {
        let provider = FlakyProvider::new(0);
        let queue = ChannelQueue::new(Channel::Email, 10, 100).unwrap();
        queue.register_handler(Arc::new(RetryingHandler::new(provider.clone())));

        queue.enqueue(msg("hi"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(provider.call_count(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let provider = FlakyProvider::new(2);
        let queue = ChannelQueue::new(Channel::Email, 10, 100).unwrap();
        queue.register_handler(Arc::new(RetryingHandler::new(provider.clone())));

        queue.enqueue(msg("hi"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(provider.call_count(), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_after_three_failures() {
        let provider = FlakyProvider::new(usize::MAX);
        let queue = ChannelQueue::new(Channel::Email, 10, 100).unwrap();
        queue.register_handler(Arc::new(RetryingHandler::new(provider.clone())));

        queue.enqueue(msg("hi"));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(provider.call_count(), MAX_DELIVERY_ATTEMPTS as usize);
        assert!(queue.is_empty());
        assert!(!queue.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_goes_behind_fresh_messages() {
        let provider = FlakyProvider::new(1);
        let queue = ChannelQueue::new(Channel::Email, 10, 100).unwrap();
        queue.register_handler(Arc::new(RetryingHandler::new(provider.clone())));

        queue.enqueue(msg("first"));
        queue.enqueue(msg("second"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let bodies: Vec<String> = provider
            .calls
            .lock()
            .iter()
            .map(|(_, _, body)| body.clone())
            .collect();
        assert_eq!(bodies, vec!["first", "second", "first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let queue = ChannelQueue::new(Channel::Sms, 10, 100).unwrap();
        let handler = RetryingHandler::new(Arc::new(HungProvider))
            .with_timeout(Some(Duration::from_millis(50)));
        queue.register_handler(Arc::new(handler));

        queue.enqueue(NotificationMessage::new(Channel::Sms, "+1", "hi", 1));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(queue.pending()[0].attempts, 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_leaves_calls_unbounded() {
        let provider = Arc::new(YieldingProvider::default());
        let queue = ChannelQueue::new(Channel::Email, 10, 100).unwrap();
        let handler = RetryingHandler::new(provider.clone()).with_timeout(Some(Duration::ZERO));
        queue.register_handler(Arc::new(handler));

        queue.enqueue(msg("hi"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*provider.completed.lock(), 1);
        assert!(queue.is_empty());
    }
}
