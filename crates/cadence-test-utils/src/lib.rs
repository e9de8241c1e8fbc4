//! Testing utilities for the Cadence workspace
//!
//! Shared senders, rule fixtures, and time helpers.

#![allow(missing_docs)]

use cadence_escalation::{
    Channel, ChannelSender, EscalationRule, EscalationStep, OutboundMessage, SenderError, Tone,
    TriggerType,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Channel sender that records every message and can be scripted to
/// fail or to hold sends open
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_next: Mutex<u32>,
    unreachable_next: Mutex<u32>,
    send_delay: Mutex<std::time::Duration>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with a retryable transport error
    pub fn fail_next(&self, count: u32) {
        *self.fail_next.lock() = count;
    }

    /// Fail the next `count` sends as unreachable (not retryable)
    pub fn fail_unreachable_next(&self, count: u32) {
        *self.unreachable_next.lock() = count;
    }

    /// Hold every send open for `delay` before it completes
    pub fn set_send_delay(&self, delay: std::time::Duration) {
        *self.send_delay.lock() = delay;
    }

    /// Everything sent so far, in dispatch order
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Number of successful sends
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait::async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), SenderError> {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        {
            let mut remaining = self.unreachable_next.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SenderError::Unreachable("no route to recipient".to_string()));
            }
        }
        {
            let mut remaining = self.fail_next.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SenderError::Transport("scripted failure".to_string()));
            }
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

/// Install a compact subscriber so test runs honor `RUST_LOG`;
/// safe to call from every test, only the first call wins
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The two-step rule from the reference scenario:
/// EMAIL immediately, SMS after 60 minutes, cooldown 30, stop on response
pub fn two_step_rule() -> EscalationRule {
    EscalationRule::new("user-1", "overdue commitments", TriggerType::Overdue)
        .with_step(EscalationStep::new(1, Channel::Email, 0, Tone::Gentle))
        .with_step(EscalationStep::new(2, Channel::Sms, 60, Tone::Firm))
        .with_cooldown(30)
        .with_max_retries(1)
        .with_stop_on_response(true)
}

/// Single immediate email step, cooldown 30
pub fn single_step_rule() -> EscalationRule {
    EscalationRule::new("user-1", "single nag", TriggerType::NoAcknowledgment)
        .with_step(EscalationStep::new(1, Channel::Email, 0, Tone::Urgent))
        .with_cooldown(30)
        .with_max_retries(1)
}

/// Deterministic timestamp `minutes` after the epoch
pub fn ts(minutes: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(minutes * 60, 0).expect("valid timestamp")
}
