//! Escalation engine facade
//!
//! Ties the rule store, chain tracker, escalation log, and channel
//! sender together behind the contract the API layer consumes:
//! rule CRUD, trigger/pause/resume/cancel, response recording, the
//! periodic `advance` entry point, and analytics.

use crate::analytics::compute_analytics;
use crate::chain::{ChainTracker, CooldownOutcome, StartOutcome};
use crate::error::{EscalationError, SenderError};
use crate::log::{EscalationLogStore, LogFilter};
use crate::rules::RuleStore;
use crate::sender::{ChannelSender, OutboundMessage};
use crate::types::{
    ActiveChainView, Analytics, ChainKey, ChainStatus, Channel, EndReason, EngineConfig,
    EscalationChain, EscalationLog, EscalationRule, LogId, LogStatus, RuleId, TargetRef, Tone,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// State copied out of the chain lock for one dispatch
struct DispatchPlan {
    rule_id: RuleId,
    step_order: u32,
    target: TargetRef,
    recipient_email: String,
    channel: Channel,
    tone: Tone,
    message: String,
}

/// The escalation engine
///
/// Owns rules, chains, and the audit log; delivery is injected as an
/// opaque capability. One instance serves every chain; a single chain's
/// failure never blocks others.
pub struct EscalationEngine {
    config: EngineConfig,
    rules: RuleStore,
    tracker: ChainTracker,
    log: EscalationLogStore,
    sender: Arc<dyn ChannelSender>,
}

impl EscalationEngine {
    /// Create new engine
    #[must_use]
    pub fn new(config: EngineConfig, sender: Arc<dyn ChannelSender>) -> Self {
        Self {
            config,
            rules: RuleStore::new(),
            tracker: ChainTracker::new(),
            log: EscalationLogStore::new(),
            sender,
        }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Rule CRUD -------------------------------------------------------

    /// Create a rule
    ///
    /// # Errors
    /// - `EscalationError::Validation` if the rule is malformed
    pub fn create_rule(&self, rule: EscalationRule) -> Result<RuleId, EscalationError> {
        self.rules.create(rule)
    }

    /// Replace a rule; running chains clamp at their next decision
    ///
    /// # Errors
    /// - `EscalationError::RuleNotFound` / `EscalationError::Validation`
    pub fn update_rule(&self, id: RuleId, rule: EscalationRule) -> Result<(), EscalationError> {
        self.rules.update(id, rule)
    }

    /// Delete a rule; running chains terminate at their next decision
    ///
    /// # Errors
    /// - `EscalationError::RuleNotFound` for an unknown id
    pub fn delete_rule(&self, id: RuleId) -> Result<(), EscalationError> {
        self.rules.delete(id)
    }

    /// Get one rule
    ///
    /// # Errors
    /// - `EscalationError::RuleNotFound` for an unknown id
    pub fn get_rule(&self, id: RuleId) -> Result<Arc<EscalationRule>, EscalationError> {
        self.rules.get(id)
    }

    /// All rules
    #[must_use]
    pub fn list_rules(&self) -> Vec<Arc<EscalationRule>> {
        self.rules.list()
    }

    // --- Chain control ---------------------------------------------------

    /// Start (or observe) the chain for `(target, rule)`
    ///
    /// Idempotent: while a non-terminal chain exists for the key, later
    /// calls are no-ops. The trigger source resolves the recipient.
    ///
    /// # Errors
    /// - `EscalationError::RuleNotFound` for an unknown rule
    pub fn start_chain(
        &self,
        target: TargetRef,
        rule_id: RuleId,
        recipient_email: &str,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome, EscalationError> {
        let rule = self.rules.get(rule_id)?;
        if !rule.is_active {
            tracing::debug!(rule_id = %rule_id, "start ignored: rule inactive");
            return Ok(StartOutcome::RuleInactive);
        }
        let first_delay = rule.steps.first().map_or_else(Duration::zero, |s| s.delay());
        let key = ChainKey::new(target, rule_id);
        let outcome = self.tracker.start(key.clone(), recipient_email, first_delay, now);
        if outcome == StartOutcome::Created {
            tracing::info!(chain = %key, "chain started");
        }
        Ok(outcome)
    }

    /// Pause the chain for `(target, rule)`
    ///
    /// # Errors
    /// - `EscalationError::ChainNotFound` for an unknown key
    pub fn pause(
        &self,
        target: TargetRef,
        rule_id: RuleId,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        self.tracker.pause(&ChainKey::new(target, rule_id), now)
    }

    /// Resume the chain for `(target, rule)`
    ///
    /// # Errors
    /// - `EscalationError::ChainNotFound` for an unknown key
    pub fn resume(
        &self,
        target: TargetRef,
        rule_id: RuleId,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        self.tracker.resume(&ChainKey::new(target, rule_id), now)
    }

    /// Cancel the chain for `(target, rule)`; idempotent
    ///
    /// # Errors
    /// - `EscalationError::ChainNotFound` for an unknown key
    pub fn cancel(&self, target: TargetRef, rule_id: RuleId) -> Result<(), EscalationError> {
        self.tracker.cancel(&ChainKey::new(target, rule_id))
    }

    // --- Inbound events --------------------------------------------------

    /// Record a delivery confirmation against a log row
    ///
    /// # Errors
    /// - `EscalationError::LogNotFound` for an unknown row
    pub fn mark_delivered(
        &self,
        log_id: LogId,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        let row = self.log.mark_delivered(log_id, now)?;
        let key = ChainKey::new(row.target, row.escalation_rule_id);
        if let Some(slot) = self.tracker.get(&key) {
            slot.lock().confirm_delivered(row.step_order);
        }
        Ok(())
    }

    /// Record a response against a log row
    ///
    /// Always closes the row for audit. If the owning rule stops on
    /// response, the chain terminates RESPONDED; otherwise its schedule
    /// is unaffected.
    ///
    /// # Errors
    /// - `EscalationError::LogNotFound` for an unknown row
    pub fn record_response(
        &self,
        log_id: LogId,
        content: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        let row = self.log.record_response(log_id, content, now)?;
        let stop = self
            .rules
            .snapshot(row.escalation_rule_id)
            .map_or(true, |r| r.stop_on_response);
        if !stop {
            return Ok(());
        }
        let key = ChainKey::new(row.target, row.escalation_rule_id);
        if let Some(slot) = self.tracker.get(&key) {
            let mut chain = slot.lock();
            if chain.respond() {
                tracing::info!(chain = %key, "chain resolved by response");
            }
        }
        Ok(())
    }

    // --- Scheduler entry point -------------------------------------------

    /// Advance every due chain; the periodic cron entry point
    ///
    /// Safe to call concurrently with itself; each chain is evaluated
    /// under its own lock and dispatched at most once per due time. A
    /// chain due several skipped ticks ago is processed once. Returns
    /// the number of successful dispatches.
    pub async fn advance(&self, now: DateTime<Utc>) -> usize {
        let keys = self.tracker.keys();
        let results =
            futures::future::join_all(keys.into_iter().map(|key| self.advance_chain(key, now)))
                .await;
        results.into_iter().filter(|sent| *sent).count()
    }

    /// Evaluate and possibly dispatch one chain; `true` if a send landed
    async fn advance_chain(&self, key: ChainKey, now: DateTime<Utc>) -> bool {
        let Some(slot) = self.tracker.get(&key) else {
            return false;
        };

        // Phase 1: decide under the chain lock
        let plan = {
            let mut chain = slot.lock();
            if chain.is_terminal() || chain.status == ChainStatus::Paused || chain.in_flight {
                return false;
            }

            let Some(rule) = self.rules.snapshot(chain.key.rule_id) else {
                chain.cancel(EndReason::Cancelled);
                tracing::warn!(chain = %key, "rule removed; chain cancelled");
                return false;
            };
            if !rule.is_active {
                chain.cancel(EndReason::Cancelled);
                tracing::info!(chain = %key, "rule deactivated; chain cancelled");
                return false;
            }

            if chain.cooldown_elapsed(&rule, now) {
                match chain.evaluate_cooldown(&rule, self.config.retry_scope, now) {
                    CooldownOutcome::Exhausted => {
                        tracing::info!(chain = %key, "chain exhausted");
                        return false;
                    }
                    CooldownOutcome::Advanced => {
                        tracing::debug!(chain = %key, step = chain.current_step, "advanced");
                    }
                    CooldownOutcome::Redispatch => {
                        tracing::debug!(chain = %key, step = chain.current_step, "retrying step");
                    }
                }
            }

            if !chain.is_due(now) {
                return false;
            }

            let step_count = rule.steps.len() as u32;
            if step_count == 0 {
                chain.cancel(EndReason::Exhausted);
                return false;
            }
            if chain.current_step > step_count {
                chain.current_step = step_count;
            }
            let Some(step) = rule.step(chain.current_step) else {
                return false;
            };

            let message = step.message_template.clone().unwrap_or_else(|| {
                format!(
                    "{} reminder: action needed on {}",
                    step.tone.as_str(),
                    chain.key.target
                )
            });
            chain.in_flight = true;
            DispatchPlan {
                rule_id: chain.key.rule_id,
                step_order: chain.current_step,
                target: chain.key.target.clone(),
                recipient_email: chain.recipient_email.clone(),
                channel: step.channel,
                tone: step.tone,
                message,
            }
        };

        // Phase 2: call the sender with the lock released
        let timeout = std::time::Duration::from_secs(self.config.send_timeout_secs);
        let send_result = match tokio::time::timeout(
            timeout,
            self.sender.send(OutboundMessage {
                channel: plan.channel,
                recipient_email: plan.recipient_email.clone(),
                tone: plan.tone,
                message: plan.message,
            }),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SenderError::Timeout {
                timeout_secs: self.config.send_timeout_secs,
            }),
        };

        // Phase 3: re-acquire and commit; a cancel or pause issued
        // mid-flight wins, but the attempt is still logged
        let mut chain = slot.lock();
        chain.in_flight = false;
        match send_result {
            Ok(()) => {
                self.log.append(
                    plan.rule_id,
                    plan.step_order,
                    plan.target,
                    &plan.recipient_email,
                    plan.channel,
                    plan.tone,
                    LogStatus::Sent,
                    now,
                );
                if chain.is_terminal() {
                    tracing::info!(chain = %key, "send landed on terminated chain; logged only");
                } else {
                    chain.commit_sent(now);
                    tracing::info!(
                        chain = %key,
                        step = plan.step_order,
                        channel = plan.channel.as_str(),
                        "escalation dispatched"
                    );
                }
                true
            }
            Err(err) => {
                self.log.append(
                    plan.rule_id,
                    plan.step_order,
                    plan.target,
                    &plan.recipient_email,
                    plan.channel,
                    plan.tone,
                    LogStatus::Failed,
                    now,
                );
                tracing::warn!(chain = %key, error = %err, "dispatch failed");
                if !chain.is_terminal()
                    && chain
                        .commit_send_failed(self.config.max_transport_retries, err.is_retryable())
                {
                    tracing::warn!(chain = %key, "transport retry ceiling hit; chain cancelled");
                }
                false
            }
        }
    }

    // --- Read side -------------------------------------------------------

    /// Analytics over the last `days` days
    #[must_use]
    pub fn analytics(&self, days: u32, now: DateTime<Utc>) -> Analytics {
        compute_analytics(&self.log, &self.tracker, days, now)
    }

    /// Projections of every non-terminal chain
    #[must_use]
    pub fn active_chains(&self) -> Vec<ActiveChainView> {
        self.tracker.active_views()
    }

    /// Filtered, paged log query
    #[must_use]
    pub fn logs(&self, filter: &LogFilter) -> Vec<EscalationLog> {
        self.log.query(filter)
    }

    /// One log row
    ///
    /// # Errors
    /// - `EscalationError::LogNotFound` for an unknown row
    pub fn log_row(&self, id: LogId) -> Result<EscalationLog, EscalationError> {
        self.log.get(id)
    }

    /// Clone of one chain's current state
    #[must_use]
    pub fn chain(&self, target: &TargetRef, rule_id: RuleId) -> Option<EscalationChain> {
        self.tracker
            .snapshot(&ChainKey::new(target.clone(), rule_id))
    }
}
