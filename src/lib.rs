pub mod behavior;
#[cfg(feature = "carla")]
pub mod carla_bridge;
pub mod config;
pub mod constants;
pub mod error;
pub mod obstacle;
pub mod physics;
pub mod pid;
pub mod route;
pub mod speed_control;
pub mod steer_control;
pub mod traffic_light;
pub mod vehicle_control;
pub mod world;

pub use behavior::{AgentStatus, BehaviorAgent, Report, StatusTransition};
pub use config::AgentInit;
pub use error::{Error, Result};
pub use obstacle::{ObstacleObservation, ObstacleSink};
pub use physics::VehicleState;
pub use route::{LaneSide, RouteService, RouteTracker, Waypoint};
pub use vehicle_control::{ControlCommand, VehicleController, VehicleControllerInit};
pub use world::{Actuator, ActorId, LightState, TrafficLight, WorldAccessor};
