//! Polymorphic notification senders.
//!
//! Each delivery channel implements [`NotificationSender`]; the
//! [`SenderRegistry`] maps a [`ChannelType`] to its sender. Adding a
//! channel means implementing the trait and registering it — the retry
//! and dead-letter logic in the dispatcher never changes.

pub mod email;
pub mod push;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::job::ChannelType;

pub use email::{EmailConfig, EmailSender};
pub use push::WebPushSender;

/// Error type for delivery attempt failures, across all channels.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The push gateway returned a non-2xx status code.
    #[error("Push gateway returned HTTP {0}")]
    HttpStatus(u16),

    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

/// One delivery channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Attempt a single delivery. The dispatcher owns retries and
    /// per-attempt timeouts; implementations should not retry internally.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), SendError>;
}

/// Maps channels to their registered senders.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<ChannelType, Arc<dyn NotificationSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the sender for a channel.
    pub fn register(&mut self, channel: ChannelType, sender: Arc<dyn NotificationSender>) {
        self.senders.insert(channel, sender);
    }

    /// Look up the sender for a channel.
    pub fn get(&self, channel: ChannelType) -> Option<Arc<dyn NotificationSender>> {
        self.senders.get(&channel).cloned()
    }

    /// Channels with a registered sender.
    pub fn channels(&self) -> Vec<ChannelType> {
        self.senders.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
