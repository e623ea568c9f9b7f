// Race coordination — concurrent session fan-out and exactly-once winner detection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::session::{DriveOutcome, EntityDriveSession};
use super::store::RaceStateStore;
use crate::remote::traits::{DriveController, Entity, WinnerLedger};

/// Fans out one drive session per entity and decides the race winner
/// exactly once.
///
/// "First" means wall-clock arrival order of the `Finished` transitions as
/// the session tasks deliver them, not a priori duration. The winner slot
/// lives in the store and is claimed with a synchronous check-and-set, so
/// concurrent finishes race safely.
pub struct RaceCoordinator {
    controller: Arc<dyn DriveController>,
    ledger: Arc<dyn WinnerLedger>,
    store: Arc<RaceStateStore>,
    sessions: Mutex<HashMap<u32, Arc<EntityDriveSession>>>,
    race_active: AtomicBool,
}

impl RaceCoordinator {
    pub fn new(
        controller: Arc<dyn DriveController>,
        ledger: Arc<dyn WinnerLedger>,
        store: Arc<RaceStateStore>,
    ) -> Self {
        Self {
            controller,
            ledger,
            store,
            sessions: Mutex::new(HashMap::new()),
            race_active: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<RaceStateStore> {
        &self.store
    }

    /// True from `start_race` until every session has reached a terminal
    /// status or been stopped.
    pub fn race_active(&self) -> bool {
        self.race_active.load(Ordering::SeqCst)
    }

    /// Start one session per entity concurrently and wait for all of them
    /// to reach a terminal status. A session failure never halts or cancels
    /// its siblings; a race with zero finishers simply ends with no winner.
    pub async fn start_race(&self, entities: &[Entity]) {
        if self.race_active.swap(true, Ordering::SeqCst) {
            warn!("race already in progress, start ignored");
            return;
        }
        self.reset_race();
        info!("race started with {} entities", entities.len());

        // All sessions are registered and spawned before anything is
        // awaited: no ordering guarantee between their start requests.
        let mut handles = Vec::with_capacity(entities.len());
        for entity in entities {
            let session = Arc::new(EntityDriveSession::new(
                entity.clone(),
                Arc::clone(&self.controller),
                Arc::clone(&self.store),
            ));
            self.store.reset_session(entity.id);
            self.sessions.lock().insert(entity.id, Arc::clone(&session));

            let store = Arc::clone(&self.store);
            let ledger = Arc::clone(&self.ledger);
            let id = entity.id;
            let name = entity.name.clone();
            handles.push(tokio::spawn(async move {
                let outcome = session.run().await;
                if let DriveOutcome::Finished { duration } = outcome {
                    let time_seconds = duration.as_millis() as f64 / 1000.0;
                    // The claim is a single non-suspending check-and-set;
                    // every later finisher observes the slot taken.
                    if store.try_claim_winner(id, &name, time_seconds) {
                        info!("entity {} ({}) wins in {:.2}s", id, name, time_seconds);
                        if let Err(e) = ledger.record_winner(id, time_seconds).await {
                            warn!("winner ledger write failed: {}", e);
                        }
                    }
                }
                outcome
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("session task aborted: {}", e);
            }
        }

        self.race_active.store(false, Ordering::SeqCst);
        debug!("race over, winner={:?}", self.store.winner());
    }

    /// Run a single entity outside any race context: no winner gate
    /// participation, no ledger write.
    pub async fn start_solo(&self, entity: &Entity) -> DriveOutcome {
        if let Some(status) = self.store.status(entity.id) {
            if status.is_in_flight() {
                debug!("entity {} already {:?}, solo start ignored", entity.id, status);
                return DriveOutcome::Rejected;
            }
        }

        let session = Arc::new(EntityDriveSession::new(
            entity.clone(),
            Arc::clone(&self.controller),
            Arc::clone(&self.store),
        ));
        self.store.reset_session(entity.id);
        self.sessions.lock().insert(entity.id, Arc::clone(&session));
        session.run().await
    }

    /// Stop one entity's session: forces it to `Stopped` immediately and
    /// fire-and-forgets the remote stop command.
    pub fn stop_entity(&self, id: u32) {
        let session = self.sessions.lock().get(&id).cloned();
        match session {
            Some(session) => session.stop(),
            None => debug!("stop for entity {} with no live session", id),
        }
    }

    /// Discard all sessions and the winner unconditionally, regardless of
    /// their current status. In-flight controller calls are abandoned
    /// locally, not awaited and not stopped server-side.
    pub fn reset_race(&self) {
        let mut sessions = self.sessions.lock();
        for session in sessions.values() {
            session.abandon();
        }
        sessions.clear();
        drop(sessions);

        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::store::{FailureKind, SessionStatus};
    use crate::remote::traits::mocks::{MockController, MockLedger};
    use std::time::Duration;

    fn entity(id: u32, name: &str) -> Entity {
        Entity {
            id,
            name: name.to_string(),
            color: "#00aa00".to_string(),
        }
    }

    fn coordinator(
        controller: &Arc<MockController>,
        ledger: &Arc<MockLedger>,
    ) -> Arc<RaceCoordinator> {
        Arc::new(RaceCoordinator::new(
            Arc::clone(controller) as Arc<dyn DriveController>,
            Arc::clone(ledger) as Arc<dyn WinnerLedger>,
            Arc::new(RaceStateStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_fastest_session_wins_and_ledger_is_written_once() {
        let controller = Arc::new(MockController::new());
        controller.set_kinematics(1, 600.0, 15.0); // 40 ms
        controller.set_kinematics(2, 600.0, 30.0); // 20 ms
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        let entities = vec![entity(1, "Slow"), entity(2, "Fast")];
        coordinator.start_race(&entities).await;

        let winner = coordinator.store().winner().unwrap();
        assert_eq!(winner.entity_id, 2);
        assert_eq!(winner.name, "Fast");
        assert!((winner.time_seconds - 0.02).abs() < 1e-9);

        // Both sessions finished, but only the first claimed the slot.
        assert_eq!(coordinator.store().status(1), Some(SessionStatus::Finished));
        assert_eq!(coordinator.store().status(2), Some(SessionStatus::Finished));
        assert_eq!(ledger.records(), vec![(2, 0.02)]);
        assert!(!coordinator.race_active());
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_the_failed_session() {
        let controller = Arc::new(MockController::new());
        controller.fail_start(1);
        controller.set_kinematics(2, 600.0, 30.0);
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        coordinator
            .start_race(&[entity(1, "Broken"), entity(2, "Healthy")])
            .await;

        let snapshot = coordinator.store().snapshot();
        assert_eq!(snapshot.sessions[&1].status, SessionStatus::Failed);
        assert_eq!(snapshot.sessions[&1].failure, Some(FailureKind::Start));
        assert_eq!(snapshot.sessions[&2].status, SessionStatus::Finished);
        assert_eq!(snapshot.winner.unwrap().entity_id, 2);
        assert_eq!(ledger.records().len(), 1);
    }

    #[tokio::test]
    async fn test_race_with_no_finishers_has_no_winner() {
        let controller = Arc::new(MockController::new());
        controller.fail_start(1);
        controller.fail_drive(2);
        controller.set_kinematics(2, 600.0, 30.0);
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        coordinator
            .start_race(&[entity(1, "A"), entity(2, "B")])
            .await;

        assert!(coordinator.store().winner().is_none());
        assert!(ledger.records().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_session_never_becomes_winner_candidate() {
        let controller = Arc::new(MockController::new());
        controller.set_kinematics(1, 600.0, 10.0); // 60 ms, would win
        controller.set_kinematics(2, 600.0, 3.0); // 200 ms
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        let race = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator
                    .start_race(&[entity(1, "Leader"), entity(2, "Trailer")])
                    .await;
            }
        });

        // Stop the would-be winner mid-drive.
        tokio::time::sleep(Duration::from_millis(25)).await;
        coordinator.stop_entity(1);
        race.await.unwrap();

        let winner = coordinator.store().winner().unwrap();
        assert_eq!(winner.entity_id, 2);
        assert_eq!(coordinator.store().status(1), Some(SessionStatus::Stopped));
        assert_eq!(ledger.records(), vec![(2, 0.2)]);
    }

    #[tokio::test]
    async fn test_empty_race_completes_without_winner() {
        let controller = Arc::new(MockController::new());
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        coordinator.start_race(&[]).await;
        assert!(coordinator.store().winner().is_none());
        assert!(!coordinator.race_active());
    }

    #[tokio::test]
    async fn test_reset_race_clears_everything() {
        let controller = Arc::new(MockController::new());
        controller.set_kinematics(1, 600.0, 30.0);
        controller.set_kinematics(2, 600.0, 15.0);
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        coordinator
            .start_race(&[entity(1, "A"), entity(2, "B")])
            .await;
        assert!(coordinator.store().winner().is_some());

        coordinator.reset_race();
        let snapshot = coordinator.store().snapshot();
        assert!(snapshot.sessions.is_empty());
        assert!(snapshot.winner.is_none());
    }

    #[tokio::test]
    async fn test_reset_mid_race_abandons_in_flight_sessions() {
        let controller = Arc::new(MockController::new());
        controller.set_kinematics(1, 600.0, 2.0); // 300 ms
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        let race = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.start_race(&[entity(1, "A")]).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        coordinator.reset_race();
        race.await.unwrap();

        // The abandoned session produced no winner and no stale snapshot.
        assert!(coordinator.store().winner().is_none());
        assert!(coordinator.store().snapshot().sessions.is_empty());
        assert!(ledger.records().is_empty());
    }

    #[tokio::test]
    async fn test_solo_run_skips_the_winner_gate() {
        let controller = Arc::new(MockController::new());
        controller.set_kinematics(7, 600.0, 30.0);
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        let outcome = coordinator.start_solo(&entity(7, "Lone")).await;
        assert!(matches!(outcome, DriveOutcome::Finished { .. }));
        assert_eq!(coordinator.store().status(7), Some(SessionStatus::Finished));
        assert!(coordinator.store().winner().is_none());
        assert!(ledger.records().is_empty());
    }

    #[tokio::test]
    async fn test_failed_entity_can_be_manually_restarted() {
        let controller = Arc::new(MockController::new());
        controller.fail_start(3);
        let ledger = Arc::new(MockLedger::new());
        let coordinator = coordinator(&controller, &ledger);

        let outcome = coordinator.start_solo(&entity(3, "Flaky")).await;
        assert_eq!(outcome, DriveOutcome::Failed(FailureKind::Start));
        assert_eq!(coordinator.store().status(3), Some(SessionStatus::Failed));

        // Operator retry re-enters the protocol from scratch.
        controller.clear_failures(3);
        controller.set_kinematics(3, 600.0, 30.0);
        let outcome = coordinator.start_solo(&entity(3, "Flaky")).await;
        assert!(matches!(outcome, DriveOutcome::Finished { .. }));
        assert_eq!(coordinator.store().status(3), Some(SessionStatus::Finished));
    }
}
