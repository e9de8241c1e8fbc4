//! Rule store and validation
//!
//! Holds escalation rule definitions. Read-mostly: chains take `Arc`
//! snapshots at decision time, so rule edits never contend with chain
//! locks. Mutation happens through validated create/update/delete.

use crate::error::{EscalationError, ValidationError};
use crate::types::{EscalationRule, RuleId};
use dashmap::DashMap;
use std::sync::Arc;

/// Validate a rule before it is stored
///
/// # Errors
/// - `ValidationError::EmptyName` if the name is blank
/// - `ValidationError::EmptySteps` if active with no steps
/// - `ValidationError::BadStepOrder` if step orders are not strictly
///   increasing from 1
/// - `ValidationError::RetriesOutOfRange` / `CooldownOutOfRange` for
///   out-of-bounds policy values
pub fn validate_rule(rule: &EscalationRule) -> Result<(), ValidationError> {
    if rule.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if rule.is_active && rule.steps.is_empty() {
        return Err(ValidationError::EmptySteps);
    }
    let orders: Vec<u32> = rule.steps.iter().map(|s| s.step_order).collect();
    for (idx, order) in orders.iter().enumerate() {
        if *order != idx as u32 + 1 {
            return Err(ValidationError::BadStepOrder(orders));
        }
    }
    if !(1..=20).contains(&rule.max_retries) {
        return Err(ValidationError::RetriesOutOfRange(rule.max_retries));
    }
    if rule.cooldown_minutes > 10_080 {
        return Err(ValidationError::CooldownOutOfRange(rule.cooldown_minutes));
    }
    Ok(())
}

/// Store of escalation rules
///
/// Rules are held as `Arc` so a running chain reads one consistent
/// version per decision, even while an update replaces the entry.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: DashMap<RuleId, Arc<EscalationRule>>,
}

impl RuleStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
        }
    }

    /// Create a rule
    ///
    /// # Errors
    /// - `EscalationError::Validation` if the rule is malformed
    pub fn create(&self, rule: EscalationRule) -> Result<RuleId, EscalationError> {
        validate_rule(&rule)?;
        let id = rule.id;
        tracing::info!(rule_id = %id, name = %rule.name, "rule created");
        self.rules.insert(id, Arc::new(rule));
        Ok(id)
    }

    /// Replace a rule in place
    ///
    /// Running chains are not rewritten; the chain tracker clamps its
    /// step pointer against the new step list at the next decision.
    ///
    /// # Errors
    /// - `EscalationError::RuleNotFound` for an unknown id
    /// - `EscalationError::Validation` if the replacement is malformed
    pub fn update(&self, id: RuleId, mut rule: EscalationRule) -> Result<(), EscalationError> {
        if !self.rules.contains_key(&id) {
            return Err(EscalationError::RuleNotFound(id));
        }
        rule.id = id;
        validate_rule(&rule)?;
        tracing::info!(rule_id = %id, name = %rule.name, "rule updated");
        self.rules.insert(id, Arc::new(rule));
        Ok(())
    }

    /// Delete a rule
    ///
    /// # Errors
    /// - `EscalationError::RuleNotFound` for an unknown id
    pub fn delete(&self, id: RuleId) -> Result<(), EscalationError> {
        if self.rules.remove(&id).is_none() {
            return Err(EscalationError::RuleNotFound(id));
        }
        tracing::info!(rule_id = %id, "rule deleted");
        Ok(())
    }

    /// Get a rule by id
    ///
    /// # Errors
    /// - `EscalationError::RuleNotFound` for an unknown id
    pub fn get(&self, id: RuleId) -> Result<Arc<EscalationRule>, EscalationError> {
        self.snapshot(id).ok_or(EscalationError::RuleNotFound(id))
    }

    /// Atomic rule snapshot, `None` if the rule no longer exists
    #[inline]
    #[must_use]
    pub fn snapshot(&self, id: RuleId) -> Option<Arc<EscalationRule>> {
        self.rules.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// All rules, unordered
    #[must_use]
    pub fn list(&self) -> Vec<Arc<EscalationRule>> {
        self.rules.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Number of stored rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
