// Observable race state — per-entity session snapshots and the write-once winner slot.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::remote::traits::Kinematics;

/// Lifecycle states of one entity's drive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Stopped,
    Starting,
    Driving,
    Finished,
    Failed,
}

impl SessionStatus {
    /// Whether the session takes no further automatic transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Stopped | SessionStatus::Finished | SessionStatus::Failed
        )
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Driving)
    }
}

/// Which controller call a failed session died on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Start,
    Drive,
}

/// Externally observable state of one drive session.
///
/// The drive duration is not stored: it is derived from `kinematics` and is
/// only meaningful once the session has reached `Driving`.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub kinematics: Option<Kinematics>,
    /// Captured when the session transitions to `Driving`. Presentation
    /// derives elapsed/remaining time from it.
    pub started_at: Option<Instant>,
    pub failure: Option<FailureKind>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Stopped,
            kinematics: None,
            started_at: None,
            failure: None,
        }
    }
}

impl SessionSnapshot {
    /// Fraction of the drive completed at `now`, clamped to [0, 1].
    pub fn progress(&self, now: Instant) -> f64 {
        match self.status {
            SessionStatus::Finished => 1.0,
            SessionStatus::Driving => match (self.kinematics, self.started_at) {
                (Some(kin), Some(started)) => {
                    let duration = kin.duration();
                    if duration.is_zero() {
                        1.0
                    } else {
                        (now.duration_since(started).as_secs_f64() / duration.as_secs_f64())
                            .min(1.0)
                    }
                }
                _ => 0.0,
            },
            _ => 0.0,
        }
    }
}

/// The race result. Written once per race by the first session to finish.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceWinner {
    pub entity_id: u32,
    pub name: String,
    pub time_seconds: f64,
}

/// A consistent point-in-time copy of the whole race state.
#[derive(Debug, Clone, Default)]
pub struct RaceSnapshot {
    pub sessions: HashMap<u32, SessionSnapshot>,
    pub winner: Option<RaceWinner>,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<u32, SessionSnapshot>,
    winner: Option<RaceWinner>,
}

/// The single externally observable `{ sessions, winner }` snapshot.
///
/// Mutated only by drive sessions and the coordinator; read by presentation.
/// Sessions run on a multi-threaded runtime, so every update happens under
/// the store's lock and a read always reflects the most recent completed
/// write.
pub struct RaceStateStore {
    inner: RwLock<StoreInner>,
}

impl RaceStateStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Register `id` with a fresh `Stopped` snapshot, replacing any prior one.
    pub fn reset_session(&self, id: u32) {
        self.inner
            .write()
            .sessions
            .insert(id, SessionSnapshot::default());
    }

    /// Apply `update` to the session's snapshot unless `guard` was cancelled.
    ///
    /// The cancellation check happens under the write lock, so a transition
    /// racing a concurrent `stop()` can never overwrite the forced `Stopped`
    /// state. Returns whether the update was applied.
    pub fn transition<F>(&self, id: u32, guard: &CancellationToken, update: F) -> bool
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        let mut inner = self.inner.write();
        if guard.is_cancelled() {
            return false;
        }
        let snapshot = inner.sessions.entry(id).or_default();
        update(snapshot);
        true
    }

    /// Unconditionally reset the session to `Stopped`, discarding kinematics.
    pub fn force_stopped(&self, id: u32) {
        self.inner
            .write()
            .sessions
            .insert(id, SessionSnapshot::default());
    }

    /// First-committer-wins claim on the winner slot. The check and the set
    /// happen under one lock acquisition.
    pub fn try_claim_winner(&self, entity_id: u32, name: &str, time_seconds: f64) -> bool {
        let mut inner = self.inner.write();
        if inner.winner.is_some() {
            return false;
        }
        inner.winner = Some(RaceWinner {
            entity_id,
            name: name.to_string(),
            time_seconds,
        });
        true
    }

    pub fn winner(&self) -> Option<RaceWinner> {
        self.inner.read().winner.clone()
    }

    pub fn status(&self, id: u32) -> Option<SessionStatus> {
        self.inner.read().sessions.get(&id).map(|s| s.status)
    }

    pub fn session(&self, id: u32) -> Option<SessionSnapshot> {
        self.inner.read().sessions.get(&id).cloned()
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        let inner = self.inner.read();
        RaceSnapshot {
            sessions: inner.sessions.clone(),
            winner: inner.winner.clone(),
        }
    }

    /// Discard every session and the winner.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.sessions.clear();
        inner.winner = None;
    }
}

impl Default for RaceStateStore {
    fn default() -> Self {
        Self::new()
    }
}
