use crate::world::ActorId;
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleObservation {
    /// Distance from the sensor to the obstacle in metres.
    pub distance: f64,
    pub actor_id: ActorId,
}

/// Single slot holding the latest obstacle detection.
///
/// The sensor side writes through an [ObstacleSink] from any thread. The
/// control step calls [ObstacleMonitor::consume] once per tick, which takes
/// the value out of the slot, so a detection is seen by at most one step.
#[derive(Debug, Default)]
pub struct ObstacleMonitor {
    slot: Arc<Mutex<Option<ObstacleObservation>>>,
}

/// Write end of an [ObstacleMonitor], handed to the sensor callback.
#[derive(Debug, Clone)]
pub struct ObstacleSink {
    slot: Arc<Mutex<Option<ObstacleObservation>>>,
}

impl ObstacleMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> ObstacleSink {
        ObstacleSink {
            slot: self.slot.clone(),
        }
    }

    pub fn on_detect(&self, distance: f64, actor_id: ActorId) {
        store(&self.slot, distance, actor_id);
    }

    pub fn consume(&self) -> Option<ObstacleObservation> {
        self.slot.lock().take()
    }
}

impl ObstacleSink {
    pub fn on_detect(&self, distance: f64, actor_id: ActorId) {
        store(&self.slot, distance, actor_id);
    }
}

fn store(slot: &Mutex<Option<ObstacleObservation>>, distance: f64, actor_id: ActorId) {
    if !distance.is_finite() || distance < 0.0 {
        warn!("dropping obstacle detection of actor {actor_id} with distance {distance}");
        return;
    }

    *slot.lock() = Some(ObstacleObservation { distance, actor_id });
}
