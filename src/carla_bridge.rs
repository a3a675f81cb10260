//! Adapters between the agent and a live Carla server.

use crate::{
    physics::{planar_distance, speed_kmh, VehicleState},
    route::{LaneSide, Waypoint},
    vehicle_control::ControlCommand,
    world::{ActorId, Actuator, LightState, TrafficLight, WorldAccessor},
};
use carla::{
    client::{ActorBase, Map, Vehicle, World},
    rpc::{TrafficLightState, VehicleControl},
};
use nalgebra::{Isometry3, Point3, Translation3, Vector3};

/// How far ahead along the lane traffic lights are looked up, in metres.
const TRAFFIC_LIGHT_SEARCH_DISTANCE_M: f64 = 100.0;

/// World view centered on one ego vehicle.
///
/// Carla 0.6 does not expose the road speed limit, so
/// [VehicleState::speed_limit] is always `None` and the agent cruises at its
/// configured maximum speed.
pub struct CarlaWorld {
    world: World,
    map: Map,
    vehicle: Vehicle,
}

impl CarlaWorld {
    pub fn new(world: World, vehicle: Vehicle) -> Self {
        let map = world.map();
        Self {
            world,
            map,
            vehicle,
        }
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn vehicle_mut(&mut self) -> &mut Vehicle {
        &mut self.vehicle
    }

    fn ego_position(&self) -> Point3<f64> {
        to_point(&self.vehicle.transform())
    }

    fn ego_carla_waypoint(&self) -> Option<carla::client::Waypoint> {
        self.map.waypoint(&self.vehicle.transform().translation)
    }
}

impl WorldAccessor for CarlaWorld {
    fn vehicle_state(&self) -> VehicleState {
        let transform = self.vehicle.transform();
        let (_, _, yaw) = transform.rotation.euler_angles();
        let velocity = self.vehicle.velocity();

        VehicleState::new(
            to_point(&transform),
            Vector3::new(velocity.x as f64, velocity.y as f64, velocity.z as f64),
            (yaw as f64).to_degrees(),
        )
    }

    fn ego_waypoint(&self) -> Option<Waypoint> {
        let waypoint = self.ego_carla_waypoint()?;
        Some(from_carla_waypoint(&self.map, &waypoint))
    }

    fn traffic_lights(&self) -> Vec<TrafficLight> {
        let Some(waypoint) = self.ego_carla_waypoint() else {
            return vec![];
        };
        let ego_position = self.ego_position();
        let actors = self
            .world
            .traffic_lights_from_waypoint(&waypoint, TRAFFIC_LIGHT_SEARCH_DISTANCE_M);

        (0..actors.len())
            .filter_map(|index| actors.get(index))
            .filter_map(|actor| actor.into_kinds().try_into_traffic_light().ok())
            .map(|light| TrafficLight {
                id: light.id() as ActorId,
                state: light_state(light.state()),
                distance: planar_distance(&ego_position, &to_point(&light.transform())),
            })
            .collect()
    }

    fn actor_speed(&self, actor_id: ActorId) -> Option<f64> {
        let actor = self.world.actor(actor_id as _)?;
        let velocity = actor.velocity();
        let velocity = Vector3::new(velocity.x as f64, velocity.y as f64, velocity.z as f64);
        Some(speed_kmh(&velocity))
    }

    fn adjacent_waypoint(&self, waypoint: &Waypoint, side: LaneSide) -> Option<Waypoint> {
        let position = &waypoint.position;
        let location = Translation3::new(position.x as f32, position.y as f32, position.z as f32);
        let current = self.map.waypoint(&location)?;
        let adjacent = neighbour_lane(&self.map, &current, side)?;
        Some(from_carla_waypoint(&self.map, &adjacent))
    }
}

impl Actuator for Vehicle {
    fn apply_control(&mut self, command: &ControlCommand) {
        Vehicle::apply_control(
            self,
            &VehicleControl {
                throttle: command.throttle as f32,
                steer: command.steer as f32,
                brake: command.brake as f32,
                hand_brake: command.hand_brake,
                reverse: false,
                manual_gear_shift: false,
                gear: 0,
            },
        );
    }
}

pub fn from_carla_waypoint(map: &Map, waypoint: &carla::client::Waypoint) -> Waypoint {
    let transform = waypoint.transofrm();
    let (_, _, yaw) = transform.rotation.euler_angles();

    Waypoint {
        position: to_point(&transform),
        yaw_degrees: (yaw as f64).to_degrees(),
        is_junction: waypoint.is_junction(),
        lane_id: Some(waypoint.land_id()),
        left_lane_id: neighbour_lane(map, waypoint, LaneSide::Left).map(|left| left.land_id()),
        right_lane_id: neighbour_lane(map, waypoint, LaneSide::Right).map(|right| right.land_id()),
    }
}

/// Looks up the lane next to `waypoint` by projecting one lane width
/// sideways onto the map. `Waypoint::left()` and `right()` panic when there
/// is no neighbour, so they are not used.
fn neighbour_lane(
    map: &Map,
    waypoint: &carla::client::Waypoint,
    side: LaneSide,
) -> Option<carla::client::Waypoint> {
    let transform = waypoint.transofrm();
    let (_, _, yaw) = transform.rotation.euler_angles();
    let offset = lateral_offset(yaw, waypoint.lane_width() as f32, side);
    let location = Translation3::from(transform.translation.vector + offset);

    let neighbour = map.waypoint(&location)?;
    let same_road = neighbour.road_id() == waypoint.road_id();
    let other_lane = neighbour.land_id() != waypoint.land_id();
    (same_road && other_lane).then_some(neighbour)
}

/// Displacement of one lane width toward `side` for a heading of `yaw`
/// radians. Carla's y axis points to the right of the x axis.
fn lateral_offset(yaw: f32, lane_width: f32, side: LaneSide) -> Vector3<f32> {
    let right = Vector3::new(-yaw.sin(), yaw.cos(), 0.0);
    match side {
        LaneSide::Left => -right * lane_width,
        LaneSide::Right => right * lane_width,
    }
}

fn light_state(state: TrafficLightState) -> LightState {
    match state {
        TrafficLightState::Red => LightState::Red,
        TrafficLightState::Yellow => LightState::Yellow,
        TrafficLightState::Green => LightState::Green,
        TrafficLightState::Off => LightState::Off,
        _ => LightState::Unknown,
    }
}

fn to_point(transform: &Isometry3<f32>) -> Point3<f64> {
    let translation = transform.translation;
    Point3::new(
        translation.x as f64,
        translation.y as f64,
        translation.z as f64,
    )
}
