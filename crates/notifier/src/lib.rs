//! Channel queues and delivery providers.
//!
//! A [`queue::ChannelQueue`] holds pending messages for one channel and drains
//! them at a fixed rate through a registered [`queue::MessageHandler`].
//! A [`provider::DeliveryProvider`] performs the actual send to the upstream
//! email/SMS service.

pub mod provider;
pub mod queue;

pub use provider::{DeliveryError, DeliveryProvider, HttpDeliveryProvider};
pub use queue::{Ack, ChannelQueue, MessageHandler, QueueError, RateLimit};
