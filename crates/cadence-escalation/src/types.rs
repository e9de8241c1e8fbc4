//! Core types for the escalation engine
//!
//! Defines the fundamental types for the subsystem:
//! - Escalation rules and their ordered steps
//! - Runtime chains and their status
//! - Append-only log rows
//! - Engine configuration and analytics rollups

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Unique rule identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub Ulid);

impl RuleId {
    /// Generate new rule ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique escalation log row identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogId(pub Ulid);

impl LogId {
    /// Generate new log ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Condition that starts an escalation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    /// Commitment past its due time
    Overdue,
    /// Message or request never acknowledged
    NoAcknowledgment,
    /// Hard deadline missed
    MissedDeadline,
    /// Meeting pre-read not completed
    MissedPreRead,
    /// Nightly closeout not performed
    NightlyCloseout,
    /// Accountability score dropped below threshold
    ScoreDrop,
    /// Caller-defined trigger
    Custom,
}

/// Delivery channel for one escalation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Email message
    Email,
    /// SMS text message
    Sms,
    /// Automated phone call
    Phone,
    /// Slack direct message
    Slack,
}

impl Channel {
    /// Stable lowercase name for grouping and display
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Phone => "phone",
            Channel::Slack => "slack",
        }
    }
}

/// Message register, escalating in urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tone {
    /// Friendly nudge
    Gentle,
    /// Direct reminder
    Firm,
    /// Unmissable demand
    Urgent,
}

impl Tone {
    /// Stable lowercase name for grouping and display
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Gentle => "gentle",
            Tone::Firm => "firm",
            Tone::Urgent => "urgent",
        }
    }
}

/// Kind of entity being escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetType {
    /// A tracked commitment
    Commitment,
    /// A meeting action item
    ActionItem,
    /// Meeting preparation (pre-read, agenda)
    MeetingPrep,
    /// An acknowledgment request
    Acknowledgment,
}

impl TargetType {
    /// Stable lowercase name for grouping and display
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Commitment => "commitment",
            TargetType::ActionItem => "action_item",
            TargetType::MeetingPrep => "meeting_prep",
            TargetType::Acknowledgment => "acknowledgment",
        }
    }
}

/// Polymorphic escalation target
///
/// The core treats the target opaquely; only the trigger source and UI
/// need type-specific rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    /// Target kind
    pub target_type: TargetType,
    /// Identifier within that kind (commitment id, action item id, ...)
    pub target_id: String,
}

impl TargetRef {
    /// Create new target reference
    #[inline]
    #[must_use]
    pub fn new(target_type: TargetType, target_id: impl Into<String>) -> Self {
        Self {
            target_type,
            target_id: target_id.into(),
        }
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.target_type.as_str(), self.target_id)
    }
}

/// One rung of an escalation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStep {
    /// 1-based position in the rule, strictly increasing
    pub step_order: u32,
    /// Delivery channel
    pub channel: Channel,
    /// Minutes to wait before this step becomes due
    pub delay_minutes: u32,
    /// Message register
    pub tone: Tone,
    /// Optional message template; rendering is the sender's concern
    pub message_template: Option<String>,
}

impl EscalationStep {
    /// Create new step
    #[inline]
    #[must_use]
    pub fn new(step_order: u32, channel: Channel, delay_minutes: u32, tone: Tone) -> Self {
        Self {
            step_order,
            channel,
            delay_minutes,
            tone,
            message_template: None,
        }
    }

    /// With message template
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.message_template = Some(template.into());
        self
    }

    /// Delay before this step as a chrono duration
    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::minutes(i64::from(self.delay_minutes))
    }
}

/// Escalation rule - immutable-per-version configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    /// Rule identifier
    pub id: RuleId,
    /// Owning user
    pub user_id: String,
    /// Human-readable name
    pub name: String,
    /// Condition this rule reacts to
    pub trigger_type: TriggerType,
    /// Ordered escalation steps
    pub steps: Vec<EscalationStep>,
    /// Attempt ceiling, bounded to [1, 20]
    pub max_retries: u32,
    /// Minimum wait between attempts, bounded to [0, 10080] minutes
    pub cooldown_minutes: u32,
    /// Terminate the chain on the first recorded response
    pub stop_on_response: bool,
    /// Whether chains may be started under this rule
    pub is_active: bool,
}

impl EscalationRule {
    /// Create new rule with defaults (one week cooldown cap applies at validation)
    #[inline]
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            id: RuleId::new(),
            user_id: user_id.into(),
            name: name.into(),
            trigger_type,
            steps: Vec::new(),
            max_retries: 1,
            cooldown_minutes: 30,
            stop_on_response: true,
            is_active: true,
        }
    }

    /// With steps
    #[inline]
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<EscalationStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Append one step
    #[inline]
    #[must_use]
    pub fn with_step(mut self, step: EscalationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// With max retries
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// With cooldown minutes
    #[inline]
    #[must_use]
    pub fn with_cooldown(mut self, cooldown_minutes: u32) -> Self {
        self.cooldown_minutes = cooldown_minutes;
        self
    }

    /// With stop-on-response behavior
    #[inline]
    #[must_use]
    pub fn with_stop_on_response(mut self, stop: bool) -> Self {
        self.stop_on_response = stop;
        self
    }

    /// Mark rule inactive
    #[inline]
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Cooldown as a chrono duration
    #[inline]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(i64::from(self.cooldown_minutes))
    }

    /// Step at a 1-based position
    #[inline]
    #[must_use]
    pub fn step(&self, step_no: u32) -> Option<&EscalationStep> {
        if step_no == 0 {
            return None;
        }
        self.steps.get((step_no - 1) as usize)
    }
}

/// Scope of the `max_retries` bound
///
/// The relationship between retries and step advancement is explicit
/// configuration rather than an implicit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryScope {
    /// `max_retries` bounds attempts at each step before advancing
    PerStep,
    /// `max_retries` bounds attempts across the whole chain
    PerChain,
}

impl Default for RetryScope {
    fn default() -> Self {
        RetryScope::PerStep
    }
}

/// Engine configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How `max_retries` is interpreted
    pub retry_scope: RetryScope,
    /// Consecutive transport failures tolerated at one step before the
    /// chain is terminated
    pub max_transport_retries: u32,
    /// Upper bound on a single sender call, in seconds
    pub send_timeout_secs: u64,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retry scope
    #[inline]
    #[must_use]
    pub fn with_retry_scope(mut self, scope: RetryScope) -> Self {
        self.retry_scope = scope;
        self
    }

    /// With transport retry ceiling
    #[inline]
    #[must_use]
    pub fn with_max_transport_retries(mut self, max: u32) -> Self {
        self.max_transport_retries = max;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_scope: RetryScope::PerStep,
            max_transport_retries: 3,
            send_timeout_secs: 10,
        }
    }
}

/// Identity of one escalation chain: one target under one rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainKey {
    /// The entity being escalated
    pub target: TargetRef,
    /// The rule driving the escalation
    pub rule_id: RuleId,
}

impl ChainKey {
    /// Create new chain key
    #[inline]
    #[must_use]
    pub fn new(target: TargetRef, rule_id: RuleId) -> Self {
        Self { target, rule_id }
    }
}

impl std::fmt::Display for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.target, self.rule_id)
    }
}

/// Chain lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainStatus {
    /// Waiting for the current step to become due
    Pending,
    /// Current step dispatched, awaiting delivery/response
    Sent,
    /// Delivery confirmed, awaiting response
    Delivered,
    /// Terminated by a qualifying response
    Responded,
    /// Terminated by cancel, exhaustion, or delivery failure
    Cancelled,
    /// Frozen; time accounting suspended
    Paused,
}

impl ChainStatus {
    /// Whether this status ends the chain
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainStatus::Responded | ChainStatus::Cancelled)
    }

    /// Whether the chain has an outstanding dispatch awaiting response
    #[inline]
    #[must_use]
    pub fn is_awaiting_response(&self) -> bool {
        matches!(self, ChainStatus::Sent | ChainStatus::Delivered)
    }
}

/// Audit distinction for CANCELLED chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Explicitly cancelled by a caller
    Cancelled,
    /// All steps visited without a qualifying response
    Exhausted,
    /// Transport failed repeatedly at one step
    DeliveryFailed,
}

/// Runtime escalation chain - the authoritative in-flight unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationChain {
    /// Chain identity
    pub key: ChainKey,
    /// Lifecycle status
    pub status: ChainStatus,
    /// 1-based index into the rule's steps; never regresses
    pub current_step: u32,
    /// Successful dispatches at the current step
    pub attempts_at_current_step: u32,
    /// Successful dispatches across the whole chain
    pub total_attempts: u32,
    /// Consecutive transport failures at the current step
    pub transport_failures: u32,
    /// Recipient resolved by the trigger source
    pub recipient_email: String,
    /// When the chain was started
    pub started_at: DateTime<Utc>,
    /// Last successful dispatch time
    pub last_escalated_at: Option<DateTime<Utc>>,
    /// When the current step becomes due
    pub next_step_at: DateTime<Utc>,
    /// Set while paused
    pub paused_at: Option<DateTime<Utc>>,
    /// Status to restore on resume
    pub resume_status: Option<ChainStatus>,
    /// Why a CANCELLED chain ended
    pub end_reason: Option<EndReason>,
    /// Dispatch currently outside the lock; concurrent ticks skip
    pub in_flight: bool,
}

impl EscalationChain {
    /// Create new chain in PENDING at step 1
    #[inline]
    #[must_use]
    pub fn new(
        key: ChainKey,
        recipient_email: impl Into<String>,
        first_delay: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            status: ChainStatus::Pending,
            current_step: 1,
            attempts_at_current_step: 0,
            total_attempts: 0,
            transport_failures: 0,
            recipient_email: recipient_email.into(),
            started_at: now,
            last_escalated_at: None,
            next_step_at: now + first_delay,
            paused_at: None,
            resume_status: None,
            end_reason: None,
            in_flight: false,
        }
    }

    /// Whether the chain has ended
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Read-only chain projection for the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveChainView {
    /// Chain identity
    pub key: ChainKey,
    /// Lifecycle status
    pub status: ChainStatus,
    /// Current 1-based step
    pub current_step: u32,
    /// Attempts at the current step
    pub attempts_at_current_step: u32,
    /// When the current step becomes due
    pub next_step_at: DateTime<Utc>,
    /// Last successful dispatch time
    pub last_escalated_at: Option<DateTime<Utc>>,
    /// Recipient
    pub recipient_email: String,
}

impl From<&EscalationChain> for ActiveChainView {
    fn from(chain: &EscalationChain) -> Self {
        Self {
            key: chain.key.clone(),
            status: chain.status,
            current_step: chain.current_step,
            attempts_at_current_step: chain.attempts_at_current_step,
            next_step_at: chain.next_step_at,
            last_escalated_at: chain.last_escalated_at,
            recipient_email: chain.recipient_email.clone(),
        }
    }
}

/// Row-level dispatch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogStatus {
    /// Dispatch handed to the transport
    Sent,
    /// Transport reported failure; retried on a later tick
    Failed,
    /// Transport confirmed delivery
    Delivered,
    /// Recipient responded
    Responded,
}

/// Append-only record of one dispatch attempt
///
/// Never mutated except to fill `delivered_at` / `response_received_at`
/// on the same row when those events arrive later. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationLog {
    /// Row identifier
    pub id: LogId,
    /// Rule that produced this attempt
    pub escalation_rule_id: RuleId,
    /// 1-based step position at dispatch time
    pub step_order: u32,
    /// The escalated target
    pub target: TargetRef,
    /// Recipient
    pub recipient_email: String,
    /// Channel used
    pub channel: Channel,
    /// Tone used
    pub tone: Tone,
    /// Row-level outcome
    pub status: LogStatus,
    /// Dispatch time
    pub sent_at: DateTime<Utc>,
    /// Delivery confirmation time, if any
    pub delivered_at: Option<DateTime<Utc>>,
    /// Response time, if any
    pub response_received_at: Option<DateTime<Utc>>,
    /// Response body, if any
    pub response_content: Option<String>,
}

/// Analytics rollup over a log window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analytics {
    /// Dispatch attempts in the window
    pub total_escalations: u64,
    /// Attempt counts grouped by channel
    pub by_channel: BTreeMap<String, u64>,
    /// Attempt counts grouped by tone
    pub by_tone: BTreeMap<String, u64>,
    /// Attempt counts grouped by target type
    pub by_target_type: BTreeMap<String, u64>,
    /// Responded rows / total rows; 0 when the window is empty
    pub response_rate: f64,
    /// Mean minutes from dispatch to response over responded rows
    pub average_response_time_minutes: f64,
    /// Chains currently in a non-terminal status
    pub active_chains: u64,
    /// Chains that terminated via a qualifying response
    pub resolved_by_response: u64,
}
