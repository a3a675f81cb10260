use crate::constants::MS_TO_KMH;
use nalgebra::{Point3, Vector3};

/// Snapshot of the ego vehicle taken at the start of a control step.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub position: Point3<f64>,
    /// Velocity in m/s.
    pub velocity: Vector3<f64>,
    /// Heading in degrees, counted the way the simulator counts yaw.
    pub yaw_degrees: f64,
    /// Speed limit of the current road in km/h, if the map knows one.
    pub speed_limit: Option<f64>,
}

impl VehicleState {
    pub fn new(position: Point3<f64>, velocity: Vector3<f64>, yaw_degrees: f64) -> Self {
        Self {
            position,
            velocity,
            yaw_degrees,
            speed_limit: None,
        }
    }

    pub fn with_speed_limit(self, speed_limit: f64) -> Self {
        Self {
            speed_limit: Some(speed_limit),
            ..self
        }
    }

    /// Speed in km/h.
    pub fn speed(&self) -> f64 {
        speed_kmh(&self.velocity)
    }

    /// Unit vector the vehicle is facing, in the ground plane.
    pub fn forward(&self) -> Vector3<f64> {
        let yaw = self.yaw_degrees.to_radians();
        Vector3::new(yaw.cos(), yaw.sin(), 0.0)
    }
}

pub fn speed_kmh(velocity: &Vector3<f64>) -> f64 {
    MS_TO_KMH * velocity.norm()
}

/// Distance between two points ignoring altitude.
pub fn planar_distance(lhs: &Point3<f64>, rhs: &Point3<f64>) -> f64 {
    (lhs.x - rhs.x).hypot(lhs.y - rhs.y)
}
