//! Cadence Escalation Engine
//!
//! Rule-driven, multi-step, multi-channel reminder escalation for the
//! Cadence productivity suite:
//! - Escalation rules with ordered steps, retry and cooldown policy
//! - One chain state machine per (target, rule) pair
//! - A periodic `advance` entry point driven by an external cron
//! - An append-only escalation log and analytics rollups
//!
//! Delivery transports, trigger detection, HTTP routing, and the UI are
//! external collaborators behind narrow interfaces.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence_escalation::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(sender: Arc<dyn ChannelSender>) -> Result<(), EscalationError> {
//! let engine = EscalationEngine::new(EngineConfig::default(), sender);
//!
//! let rule = EscalationRule::new("user-1", "overdue commitments", TriggerType::Overdue)
//!     .with_step(EscalationStep::new(1, Channel::Email, 0, Tone::Gentle))
//!     .with_step(EscalationStep::new(2, Channel::Sms, 60, Tone::Firm))
//!     .with_cooldown(30);
//! let rule_id = engine.create_rule(rule)?;
//!
//! let target = TargetRef::new(TargetType::Commitment, "commitment-42");
//! engine.start_chain(target, rule_id, "owner@example.com", chrono::Utc::now())?;
//!
//! // invoked by the cron driver
//! engine.advance(chrono::Utc::now()).await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod analytics;
pub mod chain;
pub mod engine;
pub mod error;
pub mod log;
pub mod rules;
pub mod sender;
pub mod types;

// Re-exports for convenience
pub use analytics::compute_analytics;
pub use chain::{ChainTracker, CooldownOutcome, StartOutcome};
pub use engine::EscalationEngine;
pub use error::{EscalationError, SenderError, ValidationError};
pub use log::{EscalationLogStore, LogFilter};
pub use rules::{validate_rule, RuleStore};
pub use sender::{ChannelSender, OutboundMessage};
pub use types::{
    ActiveChainView, Analytics, ChainKey, ChainStatus, Channel, EndReason, EngineConfig,
    EscalationChain, EscalationLog, EscalationRule, EscalationStep, LogId, LogStatus, RetryScope,
    RuleId, TargetRef, TargetType, Tone, TriggerType,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the escalation engine
    pub use crate::{
        ChainKey, ChainStatus, Channel, ChannelSender, EngineConfig, EscalationEngine,
        EscalationError, EscalationRule, EscalationStep, LogFilter, RetryScope, RuleId, StartOutcome,
        TargetRef, TargetType, Tone, TriggerType,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
