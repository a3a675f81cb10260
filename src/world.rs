//! Interfaces to the simulator the agent runs in.

use crate::{
    physics::VehicleState,
    route::{LaneSide, Waypoint},
    vehicle_control::ControlCommand,
};
use noisy_float::types::r64;

pub type ActorId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightState {
    Red,
    Yellow,
    Green,
    Off,
    Unknown,
}

impl LightState {
    pub fn requires_stop(self) -> bool {
        matches!(self, Self::Red | Self::Yellow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficLight {
    pub id: ActorId,
    pub state: LightState,
    /// Distance from the ego vehicle in metres.
    pub distance: f64,
}

/// Read access to the world around the ego vehicle.
pub trait WorldAccessor {
    fn vehicle_state(&self) -> VehicleState;

    /// The map waypoint closest to the ego vehicle.
    fn ego_waypoint(&self) -> Option<Waypoint>;

    /// Traffic lights currently affecting the ego vehicle.
    fn traffic_lights(&self) -> Vec<TrafficLight>;

    /// Speed of another actor in km/h.
    fn actor_speed(&self, actor_id: ActorId) -> Option<f64>;

    fn adjacent_waypoint(&self, waypoint: &Waypoint, side: LaneSide) -> Option<Waypoint>;
}

pub trait Actuator {
    fn apply_control(&mut self, command: &ControlCommand);
}

/// Picks the closest light among `lights`, skipping malformed distances.
pub fn nearest_traffic_light(lights: &[TrafficLight]) -> Option<TrafficLight> {
    lights
        .iter()
        .filter(|light| light.distance.is_finite())
        .min_by_key(|light| r64(light.distance))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_light_is_selected() {
        let lights = [
            TrafficLight {
                id: 1,
                state: LightState::Green,
                distance: 30.0,
            },
            TrafficLight {
                id: 2,
                state: LightState::Red,
                distance: f64::NAN,
            },
            TrafficLight {
                id: 3,
                state: LightState::Red,
                distance: 12.0,
            },
        ];
        assert_eq!(nearest_traffic_light(&lights).map(|light| light.id), Some(3));
        assert_eq!(nearest_traffic_light(&[]), None);
    }

    #[test]
    fn only_red_and_yellow_stop() {
        assert!(LightState::Red.requires_stop());
        assert!(LightState::Yellow.requires_stop());
        assert!(!LightState::Green.requires_stop());
        assert!(!LightState::Off.requires_stop());
        assert!(!LightState::Unknown.requires_stop());
    }
}
