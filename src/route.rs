use crate::{
    constants::{DEFAULT_ARRIVAL_RADIUS_M, DEFAULT_ARRIVAL_THRESHOLD},
    error::{Error, Result},
    physics::planar_distance,
};
use log::debug;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A point on the road network, as handed out by the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub position: Point3<f64>,
    pub yaw_degrees: f64,
    pub is_junction: bool,
    pub lane_id: Option<i32>,
    pub left_lane_id: Option<i32>,
    pub right_lane_id: Option<i32>,
}

impl Waypoint {
    pub fn new(position: Point3<f64>, yaw_degrees: f64) -> Self {
        Self {
            position,
            yaw_degrees,
            is_junction: false,
            lane_id: None,
            left_lane_id: None,
            right_lane_id: None,
        }
    }

    pub fn adjacent_lane_id(&self, side: LaneSide) -> Option<i32> {
        match side {
            LaneSide::Left => self.left_lane_id,
            LaneSide::Right => self.right_lane_id,
        }
    }

    /// Whether the adjacent lane on `side` runs in the same direction as
    /// this one. Lane ids carry the driving direction in their sign.
    pub fn shares_direction_with(&self, side: LaneSide) -> bool {
        match (self.lane_id, self.adjacent_lane_id(side)) {
            (Some(own), Some(other)) => i64::from(own) * i64::from(other) > 0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneSide {
    Left,
    Right,
}

/// Global planner collaborator. Produces the ordered waypoints from `start`
/// to `end`.
pub trait RouteService {
    type Error: std::error::Error + Send + Sync + 'static;

    fn trace_route(
        &mut self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Result<Vec<Waypoint>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTrackerInit {
    /// A waypoint closer than this, in metres, counts as reached.
    pub arrival_radius: f64,
    /// The route is finished once this many waypoints or fewer remain.
    pub arrival_threshold: usize,
}

impl RouteTrackerInit {
    pub fn build(&self) -> RouteTracker {
        let Self {
            arrival_radius,
            arrival_threshold,
        } = *self;

        RouteTracker {
            waypoints: VecDeque::new(),
            destination: None,
            arrival_radius,
            arrival_threshold,
        }
    }
}

impl Default for RouteTrackerInit {
    fn default() -> Self {
        Self {
            arrival_radius: DEFAULT_ARRIVAL_RADIUS_M,
            arrival_threshold: DEFAULT_ARRIVAL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTracker {
    waypoints: VecDeque<Waypoint>,
    destination: Option<Point3<f64>>,
    arrival_radius: f64,
    arrival_threshold: usize,
}

impl RouteTracker {
    pub fn head(&self) -> Result<&Waypoint> {
        self.waypoints.front().ok_or(Error::ExhaustedRoute)
    }

    /// Pops the head if the vehicle is within the arrival radius of it.
    /// Returns whether a waypoint was popped.
    pub fn advance_if_reached(&mut self, position: &Point3<f64>) -> bool {
        let reached = match self.waypoints.front() {
            Some(head) => planar_distance(&head.position, position) <= self.arrival_radius,
            None => false,
        };

        if reached {
            self.waypoints.pop_front();
            debug!("waypoint reached, {} left", self.waypoints.len());
        }
        reached
    }

    /// Swaps in a new route as a whole.
    pub fn replace(&mut self, waypoints: Vec<Waypoint>) {
        self.waypoints = waypoints.into();
    }

    pub fn set_destination(&mut self, destination: Point3<f64>) {
        self.destination = Some(destination);
    }

    pub fn destination(&self) -> Option<&Point3<f64>> {
        self.destination.as_ref()
    }

    pub fn is_arrived(&self) -> bool {
        self.waypoints.len() <= self.arrival_threshold
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// The next `count` waypoints, head first.
    pub fn upcoming(&self, count: usize) -> impl Iterator<Item = &Waypoint> + '_ {
        self.waypoints.iter().take(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(radius: f64) -> RouteTracker {
        RouteTrackerInit {
            arrival_radius: radius,
            arrival_threshold: 1,
        }
        .build()
    }

    fn waypoint(x: f64, y: f64) -> Waypoint {
        Waypoint::new(Point3::new(x, y, 0.0), 0.0)
    }

    #[test]
    fn empty_route_is_exhausted() {
        let route = tracker(1.0);
        assert!(matches!(route.head(), Err(Error::ExhaustedRoute)));
        assert!(route.is_arrived());
    }

    #[test]
    fn reaching_head_moves_to_next() {
        let mut route = tracker(0.5);
        route.replace(vec![waypoint(0.0, 0.0), waypoint(5.0, 0.0)]);

        assert!(route.advance_if_reached(&Point3::new(0.1, 0.1, 3.0)));
        assert_eq!(route.head().unwrap(), &waypoint(5.0, 0.0));
    }

    #[test]
    fn pops_at_most_one_waypoint() {
        let mut route = tracker(4.0);
        route.replace(vec![waypoint(0.0, 0.0), waypoint(1.0, 0.0), waypoint(2.0, 0.0)]);

        assert!(route.advance_if_reached(&Point3::new(1.0, 0.0, 0.0)));
        assert_eq!(route.len(), 2);
    }

    #[test]
    fn radius_bound_is_inclusive() {
        let mut route = tracker(5.0);
        route.replace(vec![waypoint(3.0, 4.0), waypoint(10.0, 0.0)]);
        assert!(route.advance_if_reached(&Point3::origin()));

        let mut route = tracker(4.99);
        route.replace(vec![waypoint(3.0, 4.0), waypoint(10.0, 0.0)]);
        assert!(!route.advance_if_reached(&Point3::origin()));
        assert_eq!(route.len(), 2);
    }

    #[test]
    fn arrival_threshold_is_configurable() {
        let mut route = RouteTrackerInit {
            arrival_radius: 1.0,
            arrival_threshold: 5,
        }
        .build();
        route.replace((0..6).map(|x| waypoint(x as f64, 0.0)).collect());
        assert!(!route.is_arrived());
        route.advance_if_reached(&Point3::origin());
        assert!(route.is_arrived());
    }

    #[test]
    fn upcoming_lists_waypoints_from_the_head() {
        let mut route = tracker(1.0);
        route.replace((0..5).map(|x| waypoint(10.0 * x as f64, 0.0)).collect());
        route.advance_if_reached(&Point3::origin());

        let upcoming: Vec<_> = route.upcoming(2).collect();
        assert_eq!(upcoming, [&waypoint(10.0, 0.0), &waypoint(20.0, 0.0)]);
        assert_eq!(route.upcoming(10).count(), 4);
    }

    #[test]
    fn lane_direction_is_taken_from_id_sign() {
        let waypoint = Waypoint {
            lane_id: Some(-1),
            left_lane_id: Some(1),
            right_lane_id: Some(-2),
            ..waypoint(0.0, 0.0)
        };
        assert!(!waypoint.shares_direction_with(LaneSide::Left));
        assert!(waypoint.shares_direction_with(LaneSide::Right));
    }
}
