//! Per-step behavior arbitration.
//!
//! Every tick the agent classifies the situation with a fixed priority
//! order: red light, emergency stop, braking, following, cruising. The first
//! rule that matches decides the command.

use crate::{
    constants::DEFAULT_SOFT_STOP_BRAKE,
    error::{Error, Result},
    obstacle::{ObstacleMonitor, ObstacleObservation, ObstacleSink},
    physics::VehicleState,
    route::{LaneSide, RouteService, RouteTracker, Waypoint},
    traffic_light::TrafficLightMemory,
    vehicle_control::{ControlCommand, VehicleController},
    world::{nearest_traffic_light, ActorId, WorldAccessor},
};
use log::{debug, info, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speed dependent distance, in metres. Speeds are in km/h.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistanceModel {
    Fixed { distance: f64 },
    /// `base + per_kmh * speed`
    Linear { base: f64, per_kmh: f64 },
    /// `(speed / divisor)^2 / 2`
    Quadratic { divisor: f64 },
}

impl DistanceModel {
    pub fn at_speed(&self, speed: f64) -> f64 {
        match *self {
            Self::Fixed { distance } => distance,
            Self::Linear { base, per_kmh } => base + per_kmh * speed,
            Self::Quadratic { divisor } => (speed / divisor).powi(2) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopResponse {
    Emergency,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrakeResponse {
    /// Apply a constant partial brake.
    FixedBrake { brake: f64 },
    /// Keep driving the speed controller with a zero target.
    TrackZeroSpeed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorInit {
    pub emergency_brake_distance: f64,
    pub brake_distance: DistanceModel,
    pub tailgating_distance: DistanceModel,
    pub traffic_light_distance: DistanceModel,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Added to the lead vehicle speed when following it.
    pub follow_speed_margin: f64,
    pub soft_stop_brake: f64,
    pub red_light_response: StopResponse,
    pub brake_response: BrakeResponse,
    pub lane_change: bool,
    pub ignore_traffic_lights: bool,
}

impl BehaviorInit {
    pub fn thresholds(&self, speed: f64) -> Thresholds {
        let emergency = self.emergency_brake_distance;
        let brake = self.brake_distance.at_speed(speed).max(emergency);
        let tailgating = self.tailgating_distance.at_speed(speed).max(brake);
        let traffic_light = self.traffic_light_distance.at_speed(speed);

        Thresholds {
            emergency,
            brake,
            tailgating,
            traffic_light,
        }
    }

    pub fn cruise_speed(&self, speed_limit: Option<f64>) -> f64 {
        match speed_limit {
            Some(limit) => self.max_speed.min(limit),
            None => self.max_speed,
        }
    }

    /// Speed used behind a lead vehicle. Returns the speed and whether it
    /// was pinned to the minimum speed.
    pub fn follow_speed(&self, lead_speed: Option<f64>) -> (f64, bool) {
        let Self {
            min_speed,
            max_speed,
            follow_speed_margin,
            ..
        } = *self;

        let wanted = lead_speed.unwrap_or(0.0) + follow_speed_margin;
        let speed = wanted.max(min_speed).min(max_speed);
        (speed, wanted <= min_speed)
    }

    fn decide(
        &self,
        thresholds: &Thresholds,
        stop_for_light: bool,
        obstacle: Option<&ObstacleObservation>,
        lead_speed: Option<f64>,
        speed_limit: Option<f64>,
    ) -> Decision {
        if stop_for_light {
            return Decision::RedLight;
        }

        match obstacle {
            Some(obstacle) if obstacle.distance <= thresholds.emergency => Decision::EmergencyStop,
            Some(obstacle) if obstacle.distance <= thresholds.brake => Decision::Brake,
            Some(obstacle) if obstacle.distance <= thresholds.tailgating => {
                let (target_speed, at_min_speed) = self.follow_speed(lead_speed);
                Decision::Follow {
                    target_speed,
                    at_min_speed,
                }
            }
            obstacle => Decision::Cruise {
                target_speed: self.cruise_speed(speed_limit),
                approaching: obstacle.is_some(),
            },
        }
    }
}

impl Default for BehaviorInit {
    fn default() -> Self {
        Self {
            emergency_brake_distance: 1.0,
            brake_distance: DistanceModel::Fixed { distance: 5.0 },
            tailgating_distance: DistanceModel::Linear {
                base: 7.0,
                per_kmh: 0.1,
            },
            traffic_light_distance: DistanceModel::Fixed { distance: 30.0 },
            min_speed: 10.0,
            max_speed: 80.0,
            follow_speed_margin: 2.4,
            soft_stop_brake: DEFAULT_SOFT_STOP_BRAKE,
            red_light_response: StopResponse::Soft,
            brake_response: BrakeResponse::TrackZeroSpeed,
            lane_change: false,
            ignore_traffic_lights: false,
        }
    }
}

/// Distances evaluated at the current speed. Each band is at least as wide
/// as the one before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub emergency: f64,
    pub brake: f64,
    pub tailgating: f64,
    pub traffic_light: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    RedLight,
    EmergencyStop,
    Brake,
    Follow { target_speed: f64, at_min_speed: bool },
    Cruise { target_speed: f64, approaching: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentStatus {
    Normal,
    Following,
    Braking,
    EmergencyStop,
    RedLight,
    Tailgating,
    Approaching,
    LaneChanging,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Following => "following",
            Self::Braking => "braking",
            Self::EmergencyStop => "emergency stop",
            Self::RedLight => "red light",
            Self::Tailgating => "tailgating",
            Self::Approaching => "approaching",
            Self::LaneChanging => "lane changing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    /// `None` on the very first step.
    pub from: Option<AgentStatus>,
    pub to: AgentStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub status: AgentStatus,
    /// Set only on the step where the status changed.
    pub transition: Option<StatusTransition>,
    /// Speed handed to the speed controller, if it ran.
    pub target_speed: Option<f64>,
    pub obstacle: Option<ObstacleObservation>,
    pub rerouted: bool,
    pub remaining_waypoints: usize,
}

#[derive(Debug)]
pub struct BehaviorAgent {
    behavior: BehaviorInit,
    route: RouteTracker,
    controller: VehicleController,
    obstacles: ObstacleMonitor,
    light_memory: TrafficLightMemory,
    status: Option<AgentStatus>,
    last_lane_change_obstacle: Option<ActorId>,
}

impl BehaviorAgent {
    pub fn new(behavior: BehaviorInit, route: RouteTracker, controller: VehicleController) -> Self {
        Self {
            behavior,
            route,
            controller,
            obstacles: ObstacleMonitor::new(),
            light_memory: TrafficLightMemory::default(),
            status: None,
            last_lane_change_obstacle: None,
        }
    }

    /// Plans a route from `start` to `end` and makes it the current one.
    /// Returns the number of waypoints.
    pub fn set_destination<R>(
        &mut self,
        start: &Point3<f64>,
        end: &Point3<f64>,
        router: &mut R,
    ) -> Result<usize>
    where
        R: RouteService + ?Sized,
    {
        let waypoints = router
            .trace_route(start, end)
            .map_err(|err| Error::RouteService(Box::new(err)))?;
        let len = waypoints.len();

        self.route.replace(waypoints);
        self.route.set_destination(*end);
        self.last_lane_change_obstacle = None;
        info!("new route with {len} waypoints");

        Ok(len)
    }

    pub fn set_route(&mut self, waypoints: Vec<Waypoint>) {
        let destination = waypoints.last().map(|waypoint| waypoint.position);
        self.route.replace(waypoints);
        if let Some(destination) = destination {
            self.route.set_destination(destination);
        }
    }

    /// Handle for the obstacle sensor callback.
    pub fn obstacle_sink(&self) -> ObstacleSink {
        self.obstacles.sink()
    }

    pub fn route(&self) -> &RouteTracker {
        &self.route
    }

    pub fn status(&self) -> Option<AgentStatus> {
        self.status
    }

    pub fn is_arrived(&self) -> bool {
        self.route.is_arrived()
    }

    /// Forgets everything learned while driving: PID histories, the
    /// ignored light, the last passed obstacle, the status and any pending
    /// detection. The route is kept.
    pub fn reset(&mut self) {
        self.controller.reset();
        self.light_memory = TrafficLightMemory::default();
        self.status = None;
        self.last_lane_change_obstacle = None;
        self.obstacles.consume();
    }

    pub fn soft_stop(&self) -> ControlCommand {
        ControlCommand::soft_stop(self.behavior.soft_stop_brake)
    }

    pub fn emergency_stop(&self) -> ControlCommand {
        ControlCommand::emergency_stop()
    }

    /// Runs one control step.
    ///
    /// Fails with [Error::ExhaustedRoute] once no waypoint is left. The
    /// obstacle observation buffered since the previous step is consumed.
    pub fn step<W, R>(&mut self, world: &W, router: &mut R) -> Result<(ControlCommand, Report)>
    where
        W: WorldAccessor + ?Sized,
        R: RouteService + ?Sized,
    {
        self.route.head()?;

        let vehicle = world.vehicle_state();
        let obstacle = self.obstacles.consume();
        self.route.advance_if_reached(&vehicle.position);
        self.route.head()?;

        let speed = vehicle.speed();
        let thresholds = self.behavior.thresholds(speed);
        let ego_waypoint = world.ego_waypoint();
        let in_junction = ego_waypoint
            .as_ref()
            .is_some_and(|waypoint| waypoint.is_junction);

        let light = nearest_traffic_light(&world.traffic_lights());
        let light_ahead =
            self.light_memory
                .must_stop(light.as_ref(), in_junction, thresholds.traffic_light);
        let stop_for_light = light_ahead && !self.behavior.ignore_traffic_lights;

        if let Some(obstacle) = &obstacle {
            debug!(
                "actor {} is {:.2} m ahead",
                obstacle.actor_id, obstacle.distance
            );
        }
        let lead_speed = obstacle.and_then(|obstacle| world.actor_speed(obstacle.actor_id));

        let decision = self.behavior.decide(
            &thresholds,
            stop_for_light,
            obstacle.as_ref(),
            lead_speed,
            vehicle.speed_limit,
        );

        let mut rerouted = false;
        let (status, command, target_speed) = match decision {
            Decision::RedLight => {
                let command = match self.behavior.red_light_response {
                    StopResponse::Emergency => self.emergency_stop(),
                    StopResponse::Soft => self.soft_stop(),
                };
                (AgentStatus::RedLight, command, None)
            }
            Decision::EmergencyStop => (AgentStatus::EmergencyStop, self.emergency_stop(), None),
            Decision::Brake => match self.behavior.brake_response {
                BrakeResponse::FixedBrake { brake } => {
                    (AgentStatus::Braking, ControlCommand::soft_stop(brake), None)
                }
                BrakeResponse::TrackZeroSpeed => {
                    let command = self.drive(0.0, &vehicle)?;
                    (AgentStatus::Braking, command, Some(0.0))
                }
            },
            Decision::Follow {
                target_speed,
                at_min_speed,
            } => {
                if let Some(obstacle) = &obstacle {
                    rerouted =
                        self.try_lane_change(world, router, ego_waypoint.as_ref(), obstacle)?;
                }

                let status = if rerouted {
                    AgentStatus::LaneChanging
                } else if at_min_speed {
                    AgentStatus::Tailgating
                } else {
                    AgentStatus::Following
                };
                let command = self.drive(target_speed, &vehicle)?;
                (status, command, Some(target_speed))
            }
            Decision::Cruise {
                target_speed,
                approaching,
            } => {
                let status = if approaching {
                    AgentStatus::Approaching
                } else {
                    AgentStatus::Normal
                };
                let command = self.drive(target_speed, &vehicle)?;
                (status, command, Some(target_speed))
            }
        };

        let transition = self.transition(status);
        let report = Report {
            status,
            transition,
            target_speed,
            obstacle,
            rerouted,
            remaining_waypoints: self.route.len(),
        };

        Ok((command, report))
    }

    fn drive(&mut self, target_speed: f64, vehicle: &VehicleState) -> Result<ControlCommand> {
        let Self {
            route, controller, ..
        } = self;
        let target = route.head()?;
        Ok(controller.step(target_speed, target, vehicle))
    }

    /// Reroutes through an adjacent lane running the same way, at most once
    /// per obstacle. Returns whether the route was replaced.
    fn try_lane_change<W, R>(
        &mut self,
        world: &W,
        router: &mut R,
        ego_waypoint: Option<&Waypoint>,
        obstacle: &ObstacleObservation,
    ) -> Result<bool>
    where
        W: WorldAccessor + ?Sized,
        R: RouteService + ?Sized,
    {
        if !self.behavior.lane_change || self.last_lane_change_obstacle == Some(obstacle.actor_id)
        {
            return Ok(false);
        }
        self.last_lane_change_obstacle = Some(obstacle.actor_id);

        let (Some(ego_waypoint), Some(destination)) =
            (ego_waypoint, self.route.destination().copied())
        else {
            return Ok(false);
        };

        let adjacent = [LaneSide::Left, LaneSide::Right]
            .into_iter()
            .filter(|&side| ego_waypoint.shares_direction_with(side))
            .find_map(|side| {
                world
                    .adjacent_waypoint(ego_waypoint, side)
                    .map(|waypoint| (side, waypoint))
            });
        let Some((side, start)) = adjacent else {
            warn!(
                "no free lane to pass actor {}, staying behind it",
                obstacle.actor_id
            );
            return Ok(false);
        };

        let waypoints = router
            .trace_route(&start.position, &destination)
            .map_err(|err| Error::RouteService(Box::new(err)))?;
        if waypoints.is_empty() {
            warn!("empty route from the {side:?} lane, staying behind the obstacle");
            return Ok(false);
        }

        info!(
            "changing to the {side:?} lane to pass actor {}",
            obstacle.actor_id
        );
        self.route.replace(waypoints);
        Ok(true)
    }

    fn transition(&mut self, next: AgentStatus) -> Option<StatusTransition> {
        if self.status == Some(next) {
            return None;
        }

        let transition = StatusTransition {
            from: self.status,
            to: next,
        };
        match transition.from {
            Some(from) => info!("status {from} -> {next}"),
            None => info!("status {next}"),
        }
        self.status = Some(next);
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(distance: f64) -> ObstacleObservation {
        ObstacleObservation {
            distance,
            actor_id: 7,
        }
    }

    #[test]
    fn distance_models() {
        assert_eq!(DistanceModel::Fixed { distance: 5.0 }.at_speed(100.0), 5.0);
        let linear = DistanceModel::Linear {
            base: 7.0,
            per_kmh: 0.1,
        };
        assert!((linear.at_speed(30.0) - 10.0).abs() < 1e-9);
        let quadratic = DistanceModel::Quadratic { divisor: 7.0 };
        assert!((quadratic.at_speed(70.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn bands_stay_ordered() {
        let behavior = BehaviorInit {
            emergency_brake_distance: 3.0,
            brake_distance: DistanceModel::Quadratic { divisor: 7.0 },
            tailgating_distance: DistanceModel::Fixed { distance: 0.0 },
            ..BehaviorInit::default()
        };
        let thresholds = behavior.thresholds(0.0);
        assert_eq!(thresholds.brake, 3.0);
        assert_eq!(thresholds.tailgating, 3.0);
    }

    #[test]
    fn red_light_preempts_obstacles() {
        let behavior = BehaviorInit::default();
        let thresholds = behavior.thresholds(0.0);
        let decision = behavior.decide(&thresholds, true, Some(&observation(0.5)), None, None);
        assert_eq!(decision, Decision::RedLight);
    }

    #[test]
    fn obstacle_bands_use_inclusive_bounds() {
        let behavior = BehaviorInit::default();
        let thresholds = behavior.thresholds(0.0);
        let decide = |distance| {
            behavior.decide(&thresholds, false, Some(&observation(distance)), Some(30.0), None)
        };

        assert_eq!(decide(1.0), Decision::EmergencyStop);
        assert_eq!(decide(5.0), Decision::Brake);
        match decide(7.0) {
            Decision::Follow {
                target_speed,
                at_min_speed: false,
            } => assert!((target_speed - 32.4).abs() < 1e-9),
            other => panic!("expected to follow, got {other:?}"),
        }
        assert_eq!(
            decide(7.5),
            Decision::Cruise {
                target_speed: 80.0,
                approaching: true
            }
        );
    }

    #[test]
    fn follow_speed_is_clamped() {
        let behavior = BehaviorInit::default();
        assert_eq!(behavior.follow_speed(Some(2.0)), (10.0, true));
        assert_eq!(behavior.follow_speed(None), (10.0, true));
        assert_eq!(behavior.follow_speed(Some(200.0)), (80.0, false));
    }

    #[test]
    fn cruise_respects_speed_limit() {
        let behavior = BehaviorInit::default();
        assert_eq!(behavior.cruise_speed(Some(50.0)), 50.0);
        assert_eq!(behavior.cruise_speed(Some(120.0)), 80.0);
        assert_eq!(behavior.cruise_speed(None), 80.0);
    }
}
