use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An entity as stored by the remote registry. The core holds a transient,
/// possibly-stale copy for the duration of one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub name: String,
    /// RGB string, e.g. "#1a2b3c".
    pub color: String,
}

/// Fields for creating or updating a registry entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySpec {
    pub name: String,
    pub color: String,
}

/// Kinematic parameters reported by the drive controller on a successful
/// start command.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Kinematics {
    pub distance: f64,
    pub velocity: f64,
}

impl Kinematics {
    /// Expected drive duration: `round(distance / velocity)` milliseconds.
    pub fn duration(&self) -> Duration {
        Duration::from_millis((self.distance / self.velocity).round() as u64)
    }

    /// Whether the reported parameters yield a usable completion timer.
    pub fn is_drivable(&self) -> bool {
        self.velocity.is_finite()
            && self.velocity > 0.0
            && self.distance.is_finite()
            && self.distance >= 0.0
    }
}

/// One page of registry entities.
#[derive(Debug, Clone)]
pub struct EntityPage {
    pub entities: Vec<Entity>,
    pub total: usize,
}

/// A winner row as stored by the remote ledger.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WinnerRecord {
    pub id: u32,
    pub wins: u32,
    /// Best time in seconds.
    pub time: f64,
}

/// One page of ledger records.
#[derive(Debug, Clone)]
pub struct WinnerPage {
    pub winners: Vec<WinnerRecord>,
    pub total: usize,
}

/// Ledger sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Wins,
    Time,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Wins => "wins",
            SortField::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// The remote drive controller. Both commands are asynchronous operations
/// whose latency and outcome are outside the core's control.
#[async_trait]
pub trait DriveController: Send + Sync {
    /// Transition the entity's engine to "started" and report its kinematics.
    async fn start_entity(&self, id: u32) -> Result<Kinematics>;

    /// Commit the entity to driving. No payload on success.
    async fn drive_entity(&self, id: u32) -> Result<()>;

    /// Stop the entity's engine. Sessions ignore the result.
    async fn stop_entity(&self, id: u32) -> Result<()>;
}

/// The remote entity registry. The core only ever reads identity and
/// color/label through it; mutation is the garage roster's concern.
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// List one page of entities. Pages are 1-based.
    async fn list_entities(&self, page: usize, limit: usize) -> Result<EntityPage>;

    async fn create_entity(&self, spec: &EntitySpec) -> Result<Entity>;

    async fn update_entity(&self, id: u32, spec: &EntitySpec) -> Result<Entity>;

    async fn delete_entity(&self, id: u32) -> Result<()>;
}

/// The remote winner ledger.
#[async_trait]
pub trait WinnerLedger: Send + Sync {
    /// Record a race result. Best-effort: callers ignore failures and the
    /// write is never retried.
    async fn record_winner(&self, id: u32, time_seconds: f64) -> Result<()>;

    /// List one page of winner records, sorted server-side.
    async fn list_winners(
        &self,
        page: usize,
        limit: usize,
        sort: SortField,
        order: SortOrder,
    ) -> Result<WinnerPage>;
}

// =============================================================================
// TEST MOCKS
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_rounds_to_nearest_millisecond() {
        let kin = Kinematics {
            distance: 100.0,
            velocity: 3.0,
        };
        assert_eq!(kin.duration(), Duration::from_millis(33));

        let kin = Kinematics {
            distance: 600.0,
            velocity: 600.0,
        };
        assert_eq!(kin.duration(), Duration::from_millis(1));
    }

    #[test]
    fn test_drivable_rejects_degenerate_kinematics() {
        let ok = Kinematics {
            distance: 600.0,
            velocity: 300.0,
        };
        assert!(ok.is_drivable());

        let zero_velocity = Kinematics {
            distance: 600.0,
            velocity: 0.0,
        };
        assert!(!zero_velocity.is_drivable());

        let negative = Kinematics {
            distance: 600.0,
            velocity: -10.0,
        };
        assert!(!negative.is_drivable());

        let nan = Kinematics {
            distance: f64::NAN,
            velocity: 300.0,
        };
        assert!(!nan.is_drivable());
    }

    #[test]
    fn test_sort_params_match_wire_format() {
        assert_eq!(SortField::Wins.as_str(), "wins");
        assert_eq!(SortOrder::Desc.as_str(), "DESC");
        assert_eq!(SortOrder::Asc.flipped(), SortOrder::Desc);
        assert_eq!(SortOrder::Desc.flipped(), SortOrder::Asc);
    }
}
