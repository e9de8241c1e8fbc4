//! Channel sender seam
//!
//! The engine treats message delivery as an opaque capability: given a
//! channel, recipient, tone, and message it either delivers or fails.
//! Real transports (email, SMS, phone, Slack) and template rendering
//! live behind this trait, outside the state machine's concern.

use crate::error::SenderError;
use crate::types::{Channel, Tone};

/// Outbound message handed to a sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Delivery channel
    pub channel: Channel,
    /// Recipient address
    pub recipient_email: String,
    /// Message register
    pub tone: Tone,
    /// Message body (template text or a composed default line)
    pub message: String,
}

/// Delivery capability consumed by the engine
#[async_trait::async_trait]
pub trait ChannelSender: Send + Sync {
    /// Attempt delivery of one message
    ///
    /// # Errors
    /// - `SenderError` on any transport failure; the engine logs it and
    ///   retries on a later tick
    async fn send(&self, message: OutboundMessage) -> Result<(), SenderError>;
}
