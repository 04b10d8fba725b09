//! In-memory presence map per session. Nothing here is persisted.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Status a connected client reports for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Actively looking at the session.
    #[default]
    Online,
    /// Connected but idle.
    Away,
    /// About to disconnect.
    Offline,
}

/// Presence entry for one user of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceState {
    /// Tracked user.
    pub user_id: String,
    /// When the user was first tracked on this connection.
    pub online_at: SystemTime,
    /// Last heartbeat or status change.
    pub last_seen_at: SystemTime,
    /// Reported status.
    pub status: PresenceStatus,
}

#[derive(Debug, Clone)]
struct Tracked {
    conn_id: Uuid,
    state: PresenceState,
}

/// Whether `track` created an entry or replaced one from another connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// First connection for the user.
    Joined,
    /// A newer connection took over an existing entry.
    Replaced,
}

/// Presence map keyed by session then user, preserving join order.
#[derive(Default)]
pub struct PresenceTracker {
    sessions: DashMap<Uuid, IndexMap<String, Tracked>>,
}

impl PresenceTracker {
    /// Build an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `user_id` for `session_id` on connection `conn_id`.
    pub fn track(
        &self,
        session_id: Uuid,
        user_id: &str,
        status: PresenceStatus,
        conn_id: Uuid,
        now: SystemTime,
    ) -> (PresenceState, TrackKind) {
        let mut members = self.sessions.entry(session_id).or_default();
        let state = PresenceState {
            user_id: user_id.to_owned(),
            online_at: now,
            last_seen_at: now,
            status,
        };
        let previous = members.insert(
            user_id.to_owned(),
            Tracked {
                conn_id,
                state: state.clone(),
            },
        );
        let kind = if previous.is_some() {
            TrackKind::Replaced
        } else {
            TrackKind::Joined
        };
        (state, kind)
    }

    /// Remove `user_id` if `conn_id` still owns the entry.
    pub fn untrack(&self, session_id: Uuid, user_id: &str, conn_id: Uuid) -> Option<PresenceState> {
        let removed = {
            let mut members = self.sessions.get_mut(&session_id)?;
            if members.get(user_id)?.conn_id != conn_id {
                return None;
            }
            members.shift_remove(user_id).map(|tracked| tracked.state)
        };
        self.sessions
            .remove_if(&session_id, |_, members| members.is_empty());
        removed
    }

    /// Update the reported status, refreshing `last_seen_at`.
    pub fn update_status(
        &self,
        session_id: Uuid,
        user_id: &str,
        conn_id: Uuid,
        status: PresenceStatus,
        now: SystemTime,
    ) -> Option<PresenceState> {
        self.touch(session_id, user_id, conn_id, now, |state| state.status = status)
    }

    /// Refresh `last_seen_at` without changing the status.
    pub fn heartbeat(
        &self,
        session_id: Uuid,
        user_id: &str,
        conn_id: Uuid,
        now: SystemTime,
    ) -> Option<PresenceState> {
        self.touch(session_id, user_id, conn_id, now, |_| {})
    }

    fn touch(
        &self,
        session_id: Uuid,
        user_id: &str,
        conn_id: Uuid,
        now: SystemTime,
        change: impl FnOnce(&mut PresenceState),
    ) -> Option<PresenceState> {
        let mut members = self.sessions.get_mut(&session_id)?;
        let tracked = members.get_mut(user_id)?;
        if tracked.conn_id != conn_id {
            return None;
        }
        change(&mut tracked.state);
        tracked.state.last_seen_at = now;
        Some(tracked.state.clone())
    }

    /// Current members of a session in join order.
    pub fn snapshot(&self, session_id: Uuid) -> Vec<PresenceState> {
        self.sessions
            .get(&session_id)
            .map(|members| members.values().map(|t| t.state.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop entries without a heartbeat for longer than `timeout`.
    pub fn sweep_stale(&self, now: SystemTime, timeout: Duration) -> Vec<(Uuid, PresenceState)> {
        let mut removed = Vec::new();
        for mut session in self.sessions.iter_mut() {
            let session_id = *session.key();
            session.retain(|_, tracked| {
                let idle = now
                    .duration_since(tracked.state.last_seen_at)
                    .unwrap_or(Duration::ZERO);
                let keep = idle <= timeout;
                if !keep {
                    removed.push((session_id, tracked.state.clone()));
                }
                keep
            });
        }
        self.sessions.retain(|_, members| !members.is_empty());
        removed
    }

    /// Forget every member of a finished session.
    pub fn clear_session(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_order_is_preserved() {
        let tracker = PresenceTracker::new();
        let session = Uuid::new_v4();
        let now = SystemTime::now();
        for user in ["carol", "alice", "bob"] {
            tracker.track(session, user, PresenceStatus::Online, Uuid::new_v4(), now);
        }
        let users = tracker
            .snapshot(session)
            .into_iter()
            .map(|p| p.user_id)
            .collect::<Vec<_>>();
        assert_eq!(users, vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn stale_connection_cannot_untrack_newer_one() {
        let tracker = PresenceTracker::new();
        let session = Uuid::new_v4();
        let now = SystemTime::now();
        let old_conn = Uuid::new_v4();
        let new_conn = Uuid::new_v4();

        let (_, kind) = tracker.track(session, "alice", PresenceStatus::Online, old_conn, now);
        assert_eq!(kind, TrackKind::Joined);
        let (_, kind) = tracker.track(session, "alice", PresenceStatus::Away, new_conn, now);
        assert_eq!(kind, TrackKind::Replaced);

        assert!(tracker.untrack(session, "alice", old_conn).is_none());
        assert_eq!(tracker.snapshot(session).len(), 1);
        assert!(tracker.untrack(session, "alice", new_conn).is_some());
        assert!(tracker.snapshot(session).is_empty());
    }

    #[test]
    fn status_updates_refresh_last_seen() {
        let tracker = PresenceTracker::new();
        let session = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let start = SystemTime::now();
        tracker.track(session, "bob", PresenceStatus::Online, conn, start);

        let later = start + Duration::from_secs(30);
        let state = tracker
            .update_status(session, "bob", conn, PresenceStatus::Away, later)
            .unwrap();
        assert_eq!(state.status, PresenceStatus::Away);
        assert_eq!(state.last_seen_at, later);
        assert_eq!(state.online_at, start);
    }

    #[test]
    fn sweep_removes_only_idle_members() {
        let tracker = PresenceTracker::new();
        let session = Uuid::new_v4();
        let start = SystemTime::now();
        let conn = Uuid::new_v4();
        tracker.track(session, "idle", PresenceStatus::Online, Uuid::new_v4(), start);
        tracker.track(session, "busy", PresenceStatus::Online, conn, start);

        let now = start + Duration::from_secs(90);
        tracker.heartbeat(session, "busy", conn, now);

        let removed = tracker.sweep_stale(now, Duration::from_secs(60));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].1.user_id, "idle");
        assert_eq!(tracker.snapshot(session).len(), 1);
    }
}
