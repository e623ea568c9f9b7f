// Entity drive session state machine — runs one entity's start/drive/finish protocol.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::{FailureKind, RaceStateStore, SessionSnapshot, SessionStatus};
use crate::remote::traits::{DriveController, Entity};

/// Terminal outcome of one `run()` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The completion timer fired: the entity finished its drive.
    Finished { duration: Duration },
    /// The controller rejected the start or the drive call.
    Failed(FailureKind),
    /// `stop()` cancelled the session before completion.
    Stopped,
    /// The session was already starting or driving; nothing was done.
    Rejected,
}

/// One entity's drive session.
///
/// A session owns no reference to any sibling; all cross-session
/// coordination happens through the coordinator's winner gate. Cancellation
/// is carried by a token tied 1:1 to the session.
pub struct EntityDriveSession {
    entity: Entity,
    controller: Arc<dyn DriveController>,
    store: Arc<RaceStateStore>,
    cancel: CancellationToken,
}

impl EntityDriveSession {
    pub fn new(
        entity: Entity,
        controller: Arc<dyn DriveController>,
        store: Arc<RaceStateStore>,
    ) -> Self {
        Self {
            entity,
            controller,
            store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Drive the start → drive → finish protocol to a terminal state.
    ///
    /// Every transition is published to the store before the next awaited
    /// call, so observers lag a live session by at most one suspension.
    /// Completion is a local timer derived from the reported kinematics; the
    /// controller's drive response only accepts the drive, it does not
    /// signal completion.
    pub async fn run(&self) -> DriveOutcome {
        let id = self.entity.id;

        if let Some(status) = self.store.status(id) {
            if status.is_in_flight() {
                debug!("session {} already {:?}, start ignored", id, status);
                return DriveOutcome::Rejected;
            }
        }

        let begun = self.store.transition(id, &self.cancel, |snapshot| {
            *snapshot = SessionSnapshot {
                status: SessionStatus::Starting,
                ..Default::default()
            };
        });
        if !begun {
            return DriveOutcome::Stopped;
        }

        let kinematics = match self.controller.start_entity(id).await {
            Ok(kin) if kin.is_drivable() => kin,
            Ok(kin) => {
                warn!(
                    "session {} start reported unusable kinematics distance={} velocity={}",
                    id, kin.distance, kin.velocity
                );
                return self.fail(FailureKind::Start);
            }
            Err(e) => {
                warn!("session {} start failed: {}", id, e);
                return self.fail(FailureKind::Start);
            }
        };

        let duration = kinematics.duration();
        let driving = self.store.transition(id, &self.cancel, |snapshot| {
            snapshot.status = SessionStatus::Driving;
            snapshot.kinematics = Some(kinematics);
            snapshot.started_at = Some(Instant::now());
        });
        if !driving {
            return DriveOutcome::Stopped;
        }
        debug!("session {} driving, completes in {}ms", id, duration.as_millis());

        if let Err(e) = self.controller.drive_entity(id).await {
            warn!("session {} drive failed: {}", id, e);
            return self.fail(FailureKind::Drive);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => return DriveOutcome::Stopped,
            _ = tokio::time::sleep(duration) => {}
        }

        let finished = self.store.transition(id, &self.cancel, |snapshot| {
            snapshot.status = SessionStatus::Finished;
        });
        if !finished {
            return DriveOutcome::Stopped;
        }
        debug!("session {} finished after {}ms", id, duration.as_millis());
        DriveOutcome::Finished { duration }
    }

    fn fail(&self, kind: FailureKind) -> DriveOutcome {
        let applied = self.store.transition(self.entity.id, &self.cancel, |snapshot| {
            snapshot.status = SessionStatus::Failed;
            snapshot.failure = Some(kind);
        });
        if applied {
            DriveOutcome::Failed(kind)
        } else {
            DriveOutcome::Stopped
        }
    }

    /// Cancel the session and force it to `Stopped`.
    ///
    /// Local state is final before the remote stop command is even issued;
    /// the command is fire-and-forget and its result is ignored, so a slow
    /// or failed remote stop never delays the transition. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.store.force_stopped(self.entity.id);

        let controller = Arc::clone(&self.controller);
        let id = self.entity.id;
        tokio::spawn(async move {
            if let Err(e) = controller.stop_entity(id).await {
                debug!("remote stop for entity {} failed: {}", id, e);
            }
        });
    }

    /// Abandon the session locally: cancel any pending work without issuing
    /// a remote stop command.
    pub fn abandon(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EntityDriveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
