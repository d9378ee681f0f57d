//! Dispatch orchestrator.
//!
//! Validates a notification request, resolves the target user through the
//! directory and queues one message per enabled channel that has a contact.
//! Delivery happens later, on the channel queues' timers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use relay_common::error::AppError;
use relay_common::types::{Channel, NotificationMessage, UserId};
use relay_notifier::{ChannelQueue, DeliveryProvider, RateLimit};

use crate::delivery::RetryingHandler;
use crate::directory::{SharedDirectory, UserFilter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Message is required")]
    MissingMessage,

    #[error("User ID, email, or telephone is required")]
    MissingIdentifier,

    #[error("User not found")]
    UserNotFound,
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MissingMessage | DispatchError::MissingIdentifier => {
                AppError::Validation(err.to_string())
            }
            DispatchError::UserNotFound => AppError::NotFound(err.to_string()),
        }
    }
}

/// Inbound notification request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl DispatchRequest {
    fn filter(&self) -> UserFilter {
        UserFilter {
            user_id: self.user_id,
            email: self.email.clone(),
            telephone: self.telephone.clone(),
        }
    }
}

/// Result of an accepted request: which channels got a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub user_id: UserId,
    pub channels: Vec<Channel>,
}

impl DispatchOutcome {
    /// True when the user has every channel disabled.
    pub fn is_noop(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Resolves requests to users and fans them out to the channel queues.
pub struct Dispatcher {
    directory: SharedDirectory,
    email: ChannelQueue,
    sms: ChannelQueue,
}

impl Dispatcher {
    pub fn new(directory: SharedDirectory, email: ChannelQueue, sms: ChannelQueue) -> Self {
        Self {
            directory,
            email,
            sms,
        }
    }

    /// Build both channel queues and register the retrying handler on each.
    /// Must be called inside a tokio runtime.
    pub fn start(
        directory: SharedDirectory,
        email_limit: RateLimit,
        sms_limit: RateLimit,
        provider: Arc<dyn DeliveryProvider>,
        delivery_timeout: Option<Duration>,
    ) -> Self {
        let email = ChannelQueue::with_limit(Channel::Email, email_limit);
        let sms = ChannelQueue::with_limit(Channel::Sms, sms_limit);

        let handler = Arc::new(RetryingHandler::new(provider).with_timeout(delivery_timeout));
        email.register_handler(handler.clone());
        sms.register_handler(handler);

        Self::new(directory, email, sms)
    }

    /// Accept a request and queue its messages. Returns before any delivery.
    pub fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        if request.message.is_empty() {
            return Err(DispatchError::MissingMessage);
        }

        let filter = request.filter();
        if filter.is_empty() {
            return Err(DispatchError::MissingIdentifier);
        }

        let user = self
            .directory
            .lock()
            .get_one(&filter)
            .cloned()
            .ok_or(DispatchError::UserNotFound)?;

        let mut channels = Vec::new();
        for channel in [Channel::Email, Channel::Sms] {
            if !user.preferences.enabled(channel) {
                continue;
            }
            let Some(recipient) = user.contact(channel) else {
                continue;
            };
            self.queue(channel).enqueue(NotificationMessage::new(
                channel,
                recipient,
                request.message.as_str(),
                user.user_id,
            ));
            channels.push(channel);
        }

        if channels.is_empty() {
            tracing::info!(user_id = user.user_id, "User has disabled all channels");
        }

        Ok(DispatchOutcome {
            user_id: user.user_id,
            channels,
        })
    }

    pub fn queue(&self, channel: Channel) -> &ChannelQueue {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
        }
    }

    pub fn directory(&self) -> &SharedDirectory {
        &self.directory
    }

    /// Stop both queue timers. Pending messages are kept.
    pub fn stop(&self) {
        self.email.stop();
        self.sms.stop();
    }
}
