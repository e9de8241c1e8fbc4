//! Chain tracker - the per-target escalation state machine
//!
//! One `EscalationChain` exists per (target, rule) pair. The tracker
//! owns the chain map; `DashMap::entry` serializes creation so the first
//! writer creates and later callers observe the existing chain, and the
//! per-chain mutex serializes every mutation. The chain lock is never
//! held across a network call - dispatch copies state out, sends, then
//! re-acquires to commit - so a plain `parking_lot` mutex suffices.
//!
//! Invariant: the chain map is never touched while a chain lock is held.

use crate::error::EscalationError;
use crate::types::{
    ActiveChainView, ChainKey, ChainStatus, EndReason, EscalationChain, EscalationRule,
    RetryScope,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Outcome of a cooldown evaluation on a SENT/DELIVERED chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownOutcome {
    /// Retries remain at the current step; re-dispatch it
    Redispatch,
    /// Advanced to the next step
    Advanced,
    /// No steps left; chain terminated CANCELLED(Exhausted)
    Exhausted,
}

impl EscalationChain {
    /// Whether the current step is due for dispatch
    #[inline]
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ChainStatus::Pending && !self.in_flight && now >= self.next_step_at
    }

    /// Whether the post-dispatch cooldown has elapsed
    #[inline]
    #[must_use]
    pub fn cooldown_elapsed(&self, rule: &EscalationRule, now: DateTime<Utc>) -> bool {
        self.status.is_awaiting_response()
            && self
                .last_escalated_at
                .is_some_and(|t| now >= t + rule.cooldown())
    }

    /// Commit a successful dispatch
    ///
    /// A pause issued while the send was in flight stays in force: the
    /// outcome lands in `resume_status`, so resume picks up from SENT.
    pub fn commit_sent(&mut self, now: DateTime<Utc>) {
        self.last_escalated_at = Some(now);
        self.attempts_at_current_step += 1;
        self.total_attempts += 1;
        self.transport_failures = 0;
        if self.status == ChainStatus::Paused {
            self.resume_status = Some(ChainStatus::Sent);
        } else {
            self.status = ChainStatus::Sent;
        }
    }

    /// Commit a failed dispatch; returns `true` if the chain terminated
    ///
    /// Retryable failures count toward the transport ceiling; a
    /// non-retryable one terminates at once. A chain paused mid-flight
    /// only records the failure; termination waits until it runs again.
    pub fn commit_send_failed(&mut self, max_transport_retries: u32, retryable: bool) -> bool {
        self.transport_failures += 1;
        if self.status == ChainStatus::Paused {
            return false;
        }
        if !retryable || self.transport_failures >= max_transport_retries {
            self.cancel(EndReason::DeliveryFailed);
            return true;
        }
        // stays PENDING with the same due time; retried next tick
        false
    }

    /// Evaluate step retry/advance/exhaustion after cooldown
    ///
    /// Clamps `current_step` against the rule's current step list first,
    /// so shrinking an active rule never crashes a running chain.
    /// `current_step` never regresses below its clamped value.
    pub fn evaluate_cooldown(
        &mut self,
        rule: &EscalationRule,
        scope: RetryScope,
        now: DateTime<Utc>,
    ) -> CooldownOutcome {
        let step_count = rule.steps.len() as u32;
        if step_count == 0 {
            self.cancel(EndReason::Exhausted);
            return CooldownOutcome::Exhausted;
        }
        if self.current_step > step_count {
            self.current_step = step_count;
        }

        let retries_left = match scope {
            RetryScope::PerStep => self.attempts_at_current_step < rule.max_retries,
            RetryScope::PerChain => self.total_attempts < rule.max_retries,
        };

        if retries_left {
            self.status = ChainStatus::Pending;
            self.next_step_at = now;
            CooldownOutcome::Redispatch
        } else if self.current_step < step_count {
            self.current_step += 1;
            self.attempts_at_current_step = 0;
            self.transport_failures = 0;
            self.status = ChainStatus::Pending;
            // the next step waits out its own configured delay
            let delay = rule
                .step(self.current_step)
                .map_or_else(Duration::zero, |s| s.delay());
            self.next_step_at = now + delay;
            CooldownOutcome::Advanced
        } else {
            self.cancel(EndReason::Exhausted);
            CooldownOutcome::Exhausted
        }
    }

    /// Freeze the chain; returns `false` on terminal or already-paused chains
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_terminal() || self.status == ChainStatus::Paused {
            return false;
        }
        self.resume_status = Some(self.status);
        self.status = ChainStatus::Paused;
        self.paused_at = Some(now);
        true
    }

    /// Unfreeze the chain, excluding the paused span from all timing
    ///
    /// Both `next_step_at` and `last_escalated_at` shift forward by the
    /// paused duration, so the remaining delay (or cooldown) at pause
    /// time is restored exactly. The pre-pause status is restored so a
    /// paused SENT chain does not re-dispatch its current step.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != ChainStatus::Paused {
            return false;
        }
        let paused_at = self.paused_at.take().unwrap_or(now);
        let frozen = now - paused_at;
        self.next_step_at += frozen;
        if let Some(t) = self.last_escalated_at {
            self.last_escalated_at = Some(t + frozen);
        }
        self.status = self.resume_status.take().unwrap_or(ChainStatus::Pending);
        true
    }

    /// Terminate the chain; returns `false` if already terminal
    pub fn cancel(&mut self, reason: EndReason) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ChainStatus::Cancelled;
        self.end_reason = Some(reason);
        true
    }

    /// Terminate via qualifying response; returns `false` if already terminal
    pub fn respond(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ChainStatus::Responded;
        true
    }

    /// Record delivery confirmation; only meaningful while the chain is
    /// still SENT on the step the confirmation belongs to. A receipt
    /// arriving after the chain moved on patches the log row only.
    pub fn confirm_delivered(&mut self, step_order: u32) -> bool {
        if self.status == ChainStatus::Sent && self.current_step == step_order {
            self.status = ChainStatus::Delivered;
            return true;
        }
        false
    }
}

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// First writer created the chain
    Created,
    /// A non-terminal chain already exists; idempotent no-op
    AlreadyActive,
    /// The rule exists but is inactive; nothing started
    RuleInactive,
}

/// Owner of all escalation chains
#[derive(Debug, Default)]
pub struct ChainTracker {
    chains: DashMap<ChainKey, Arc<Mutex<EscalationChain>>>,
}

impl ChainTracker {
    /// Create empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            chains: DashMap::new(),
        }
    }

    /// Start a chain for `(target, rule)` if none is active
    ///
    /// Racing callers are serialized by the map entry: the first writer
    /// creates, the rest observe the existing chain. A terminal chain on
    /// the same key is replaced by a fresh episode.
    pub fn start(
        &self,
        key: ChainKey,
        recipient_email: &str,
        first_delay: Duration,
        now: DateTime<Utc>,
    ) -> StartOutcome {
        match self.chains.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let mut chain = occupied.get().lock();
                // a terminal chain keeps its slot while a send result is
                // still landing; the trigger retries on its next detection
                if chain.is_terminal() && !chain.in_flight {
                    *chain = EscalationChain::new(key, recipient_email, first_delay, now);
                    StartOutcome::Created
                } else {
                    StartOutcome::AlreadyActive
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(EscalationChain::new(
                    key,
                    recipient_email,
                    first_delay,
                    now,
                ))));
                StartOutcome::Created
            }
        }
    }

    /// Handle to a chain, if one exists
    #[must_use]
    pub fn get(&self, key: &ChainKey) -> Option<Arc<Mutex<EscalationChain>>> {
        self.chains.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Clone of a chain's current state
    #[must_use]
    pub fn snapshot(&self, key: &ChainKey) -> Option<EscalationChain> {
        self.get(key).map(|slot| slot.lock().clone())
    }

    /// Pause a chain; no-op on terminal chains
    ///
    /// # Errors
    /// - `EscalationError::ChainNotFound` for an unknown key
    pub fn pause(&self, key: &ChainKey, now: DateTime<Utc>) -> Result<(), EscalationError> {
        let slot = self.get(key).ok_or_else(|| not_found(key))?;
        let mut chain = slot.lock();
        if chain.pause(now) {
            tracing::info!(chain = %key, "chain paused");
        }
        Ok(())
    }

    /// Resume a paused chain; no-op otherwise
    ///
    /// # Errors
    /// - `EscalationError::ChainNotFound` for an unknown key
    pub fn resume(&self, key: &ChainKey, now: DateTime<Utc>) -> Result<(), EscalationError> {
        let slot = self.get(key).ok_or_else(|| not_found(key))?;
        let mut chain = slot.lock();
        if chain.resume(now) {
            tracing::info!(chain = %key, step = chain.current_step, "chain resumed");
        }
        Ok(())
    }

    /// Cancel a chain; idempotent
    ///
    /// # Errors
    /// - `EscalationError::ChainNotFound` for an unknown key
    pub fn cancel(&self, key: &ChainKey) -> Result<(), EscalationError> {
        let slot = self.get(key).ok_or_else(|| not_found(key))?;
        let mut chain = slot.lock();
        if chain.cancel(EndReason::Cancelled) {
            tracing::info!(chain = %key, "chain cancelled");
        }
        Ok(())
    }

    /// Keys of every tracked chain
    #[must_use]
    pub fn keys(&self) -> Vec<ChainKey> {
        self.chains.iter().map(|e| e.key().clone()).collect()
    }

    /// Projections of every non-terminal chain
    #[must_use]
    pub fn active_views(&self) -> Vec<ActiveChainView> {
        self.chains
            .iter()
            .filter_map(|entry| {
                let chain = entry.value().lock();
                (!chain.is_terminal()).then(|| ActiveChainView::from(&*chain))
            })
            .collect()
    }

    /// Count of non-terminal chains
    #[must_use]
    pub fn active_count(&self) -> u64 {
        self.chains
            .iter()
            .filter(|entry| !entry.value().lock().is_terminal())
            .count() as u64
    }

    /// Count of chains that terminated via response
    #[must_use]
    pub fn responded_count(&self) -> u64 {
        self.chains
            .iter()
            .filter(|entry| entry.value().lock().status == ChainStatus::Responded)
            .count() as u64
    }
}

fn not_found(key: &ChainKey) -> EscalationError {
    EscalationError::ChainNotFound {
        target: key.target.to_string(),
        rule_id: key.rule_id,
    }
}
