//! Join-queue ordering rules.
//!
//! Entries live in the session store; these helpers decide positions and
//! which entries a cleanup pass expires or drops.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for a free seat.
    Pending,
    /// Admitted into the session.
    Approved,
    /// Turned down by the host.
    Rejected,
    /// Waited longer than the configured maximum.
    Expired,
}

/// A request to join a session that is waiting for a seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// Session the user asked to join.
    pub session_id: Uuid,
    /// Requesting user.
    pub user_id: String,
    /// Name the user will play under.
    pub player_name: String,
    /// Requested color.
    pub color: String,
    /// Current lifecycle status.
    pub status: QueueStatus,
    /// When the request was made.
    pub requested_at: SystemTime,
    /// 1-based FIFO position among pending entries.
    pub position: u32,
    /// Informational priority supplied by the caller.
    pub priority: i32,
}

/// Queue rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The session already holds the maximum number of entries.
    #[error("Queue is full")]
    Full {
        /// Configured capacity.
        max_size: usize,
    },
    /// Positions cannot be negative.
    #[error("Invalid queue position")]
    InvalidPosition(i64),
}

/// Position given to a newly queued entry: one past the highest pending position.
pub fn next_position(entries: &[QueueEntry]) -> u32 {
    entries
        .iter()
        .filter(|entry| entry.status == QueueStatus::Pending)
        .map(|entry| entry.position)
        .max()
        .unwrap_or(0)
        + 1
}

/// Whether `user_id` already waits in the queue.
pub fn has_pending(entries: &[QueueEntry], user_id: &str) -> bool {
    entries
        .iter()
        .any(|entry| entry.user_id == user_id && entry.status == QueueStatus::Pending)
}

/// Reject queueing once `max_size` entries are pending. Settled entries
/// waiting for cleanup do not count.
pub fn ensure_capacity(entries: &[QueueEntry], max_size: usize) -> Result<(), QueueError> {
    let pending = entries
        .iter()
        .filter(|entry| entry.status == QueueStatus::Pending)
        .count();
    if pending >= max_size {
        Err(QueueError::Full { max_size })
    } else {
        Ok(())
    }
}

/// Validate a requested position coming from a client.
pub fn validate_position(position: i64) -> Result<u32, QueueError> {
    u32::try_from(position).map_err(|_| QueueError::InvalidPosition(position))
}

/// Pending entries in queue order.
pub fn pending_in_order(entries: &[QueueEntry]) -> Vec<QueueEntry> {
    let mut pending = entries
        .iter()
        .filter(|entry| entry.status == QueueStatus::Pending)
        .cloned()
        .collect::<Vec<_>>();
    pending.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.requested_at.cmp(&b.requested_at))
    });
    pending
}

/// Renumber pending entries `1..` and return the ones whose position changed.
pub fn renumber(entries: &[QueueEntry]) -> Vec<QueueEntry> {
    pending_in_order(entries)
        .into_iter()
        .enumerate()
        .filter_map(|(index, mut entry)| {
            let position = index as u32 + 1;
            (entry.position != position).then(|| {
                entry.position = position;
                entry
            })
        })
        .collect()
}

/// Move the pending entry `id` to `position` (0 and 1 both mean the front),
/// shifting the others, and return every entry whose position changed.
pub fn reposition(entries: &[QueueEntry], id: Uuid, position: u32) -> Vec<QueueEntry> {
    let mut pending = pending_in_order(entries);
    let Some(current) = pending.iter().position(|entry| entry.id == id) else {
        return Vec::new();
    };
    let moved = pending.remove(current);
    let target = (position.max(1) as usize - 1).min(pending.len());
    pending.insert(target, moved);

    pending
        .into_iter()
        .enumerate()
        .filter_map(|(index, mut entry)| {
            let position = index as u32 + 1;
            (entry.position != position).then(|| {
                entry.position = position;
                entry
            })
        })
        .collect()
}

/// Work decided by a cleanup pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Pending entries that waited too long.
    pub expire: Vec<QueueEntry>,
    /// Settled entries old enough to drop.
    pub delete: Vec<Uuid>,
}

impl SweepPlan {
    /// Whether the pass found nothing to do.
    pub fn is_empty(&self) -> bool {
        self.expire.is_empty() && self.delete.is_empty()
    }
}

/// Decide which entries expire and which get deleted.
///
/// Pending entries older than `max_wait` become expired. Approved, rejected
/// and expired entries older than `max_wait` are deleted.
pub fn plan_sweep(entries: &[QueueEntry], now: SystemTime, max_wait: Duration) -> SweepPlan {
    let mut plan = SweepPlan::default();
    for entry in entries {
        let waited = now
            .duration_since(entry.requested_at)
            .unwrap_or(Duration::ZERO);
        if waited <= max_wait {
            continue;
        }
        match entry.status {
            QueueStatus::Pending => {
                let mut expired = entry.clone();
                expired.status = QueueStatus::Expired;
                plan.expire.push(expired);
            }
            QueueStatus::Approved | QueueStatus::Rejected | QueueStatus::Expired => {
                plan.delete.push(entry.id)
            }
        }
    }
    plan
}
