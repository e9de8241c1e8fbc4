//! Error types for the escalation engine
//!
//! Provides error handling for:
//! - Rule and step validation failures
//! - Unknown rule/chain/log lookups
//! - Channel delivery failures (recovered locally, visible via the log)

use crate::types::{LogId, RuleId};

/// Main escalation error type
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// Malformed rule or step - rejected before persistence
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown rule
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    /// Unknown chain for a (target, rule) pair
    #[error("no chain for target {target} under rule {rule_id}")]
    ChainNotFound {
        /// Rendered target reference
        target: String,
        /// Rule the chain would run under
        rule_id: RuleId,
    },

    /// Unknown log row
    #[error("log row not found: {0}")]
    LogNotFound(LogId),
}

/// Rule/step validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Active rule with no steps
    #[error("active rule must have at least one step")]
    EmptySteps,

    /// Step orders not strictly increasing from 1
    #[error("step orders must be strictly increasing from 1, got {0:?}")]
    BadStepOrder(Vec<u32>),

    /// `max_retries` outside [1, 20]
    #[error("max_retries {0} outside [1, 20]")]
    RetriesOutOfRange(u32),

    /// `cooldown_minutes` outside [0, 10080]
    #[error("cooldown_minutes {0} outside [0, 10080]")]
    CooldownOutOfRange(u32),

    /// Rule name empty
    #[error("rule name must not be empty")]
    EmptyName,
}

/// Channel sender errors
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// Transport rejected or dropped the message
    #[error("transport error: {0}")]
    Transport(String),

    /// Sender did not answer within the bounded timeout
    #[error("send timed out after {timeout_secs}s")]
    Timeout {
        /// Configured bound in seconds
        timeout_secs: u64,
    },

    /// Recipient cannot be reached on this channel
    #[error("recipient unreachable: {0}")]
    Unreachable(String),
}

impl SenderError {
    /// Whether a later attempt could still succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}
