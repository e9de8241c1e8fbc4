//! Analytics aggregation over the escalation log
//!
//! Read-only rollups; never mutates the log. Every division is guarded
//! against a zero denominator.

use crate::chain::ChainTracker;
use crate::log::EscalationLogStore;
use crate::types::Analytics;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Compute rollups over log rows in `[now - days, now]`
#[must_use]
pub fn compute_analytics(
    log: &EscalationLogStore,
    tracker: &ChainTracker,
    days: u32,
    now: DateTime<Utc>,
) -> Analytics {
    let cutoff = now - Duration::days(i64::from(days));
    let rows = log.scan_since(cutoff);

    let mut by_channel: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_tone: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_target_type: BTreeMap<String, u64> = BTreeMap::new();
    let mut responded = 0u64;
    let mut response_minutes_sum = 0f64;

    for row in &rows {
        *by_channel.entry(row.channel.as_str().to_string()).or_insert(0) += 1;
        *by_tone.entry(row.tone.as_str().to_string()).or_insert(0) += 1;
        *by_target_type
            .entry(row.target.target_type.as_str().to_string())
            .or_insert(0) += 1;
        if let Some(received) = row.response_received_at {
            responded += 1;
            response_minutes_sum += (received - row.sent_at).num_seconds() as f64 / 60.0;
        }
    }

    let total = rows.len() as u64;
    let response_rate = if total == 0 {
        0.0
    } else {
        responded as f64 / total as f64
    };
    let average_response_time_minutes = if responded == 0 {
        0.0
    } else {
        response_minutes_sum / responded as f64
    };

    Analytics {
        total_escalations: total,
        by_channel,
        by_tone,
        by_target_type,
        response_rate,
        average_response_time_minutes,
        active_chains: tracker.active_count(),
        resolved_by_response: tracker.responded_count(),
    }
}
