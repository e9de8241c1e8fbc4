//! Escalation log - the append-only audit trail
//!
//! One row per dispatch attempt. Rows are never deleted; the only
//! in-place mutation is closing a row with its delivery/response fields
//! when those events arrive later. Rows for a given chain are appended
//! in non-decreasing `sent_at` order, which analytics relies on.

use crate::error::EscalationError;
use crate::types::{
    Channel, EscalationLog, LogId, LogStatus, RuleId, TargetRef, TargetType, Tone,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Filter for paged log queries
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Restrict to one channel
    pub channel: Option<Channel>,
    /// Restrict to one row status
    pub status: Option<LogStatus>,
    /// Restrict to one target type
    pub target_type: Option<TargetType>,
    /// Rows to skip (newest first)
    pub offset: usize,
    /// Maximum rows returned; 0 means no limit
    pub limit: usize,
}

impl LogFilter {
    /// Create empty filter (everything, unpaged)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With channel restriction
    #[inline]
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// With status restriction
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: LogStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// With target type restriction
    #[inline]
    #[must_use]
    pub fn with_target_type(mut self, target_type: TargetType) -> Self {
        self.target_type = Some(target_type);
        self
    }

    /// With paging
    #[inline]
    #[must_use]
    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    fn matches(&self, row: &EscalationLog) -> bool {
        self.channel.map_or(true, |c| row.channel == c)
            && self.status.map_or(true, |s| row.status == s)
            && self
                .target_type
                .map_or(true, |t| row.target.target_type == t)
    }
}

/// In-memory append-only log store
#[derive(Debug, Default)]
pub struct EscalationLogStore {
    rows: RwLock<Vec<EscalationLog>>,
}

impl EscalationLogStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Append one dispatch attempt row
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        rule_id: RuleId,
        step_order: u32,
        target: TargetRef,
        recipient_email: &str,
        channel: Channel,
        tone: Tone,
        status: LogStatus,
        sent_at: DateTime<Utc>,
    ) -> LogId {
        let row = EscalationLog {
            id: LogId::new(),
            escalation_rule_id: rule_id,
            step_order,
            target,
            recipient_email: recipient_email.to_string(),
            channel,
            tone,
            status,
            sent_at,
            delivered_at: None,
            response_received_at: None,
            response_content: None,
        };
        let id = row.id;
        self.rows.write().push(row);
        id
    }

    /// Close a row with its delivery confirmation time
    ///
    /// # Errors
    /// - `EscalationError::LogNotFound` for an unknown id
    pub fn mark_delivered(
        &self,
        id: LogId,
        delivered_at: DateTime<Utc>,
    ) -> Result<EscalationLog, EscalationError> {
        let mut rows = self.rows.write();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EscalationError::LogNotFound(id))?;
        row.delivered_at = Some(delivered_at);
        if row.status == LogStatus::Sent {
            row.status = LogStatus::Delivered;
        }
        Ok(row.clone())
    }

    /// Close a row with its response
    ///
    /// # Errors
    /// - `EscalationError::LogNotFound` for an unknown id
    pub fn record_response(
        &self,
        id: LogId,
        content: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Result<EscalationLog, EscalationError> {
        let mut rows = self.rows.write();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EscalationError::LogNotFound(id))?;
        row.response_received_at = Some(received_at);
        row.response_content = content;
        row.status = LogStatus::Responded;
        Ok(row.clone())
    }

    /// One row by id
    ///
    /// # Errors
    /// - `EscalationError::LogNotFound` for an unknown id
    pub fn get(&self, id: LogId) -> Result<EscalationLog, EscalationError> {
        self.rows
            .read()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EscalationError::LogNotFound(id))
    }

    /// Filtered, paged query, newest first
    #[must_use]
    pub fn query(&self, filter: &LogFilter) -> Vec<EscalationLog> {
        let rows = self.rows.read();
        let matched = rows.iter().rev().filter(|r| filter.matches(r));
        if filter.limit == 0 {
            matched.skip(filter.offset).cloned().collect()
        } else {
            matched
                .skip(filter.offset)
                .take(filter.limit)
                .cloned()
                .collect()
        }
    }

    /// All rows with `sent_at >= cutoff`, oldest first
    #[must_use]
    pub fn scan_since(&self, cutoff: DateTime<Utc>) -> Vec<EscalationLog> {
        self.rows
            .read()
            .iter()
            .filter(|r| r.sent_at >= cutoff)
            .cloned()
            .collect()
    }

    /// Total row count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the log is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}
