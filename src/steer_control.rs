use crate::pid::{PidInit, WindowedPid};
use nalgebra::{Point3, Vector3};

/// Lateral controller. Steers toward a target point using the signed angle
/// between the vehicle heading and the line of sight to the target.
#[derive(Debug, Clone)]
pub struct SteerController {
    heading_pid: WindowedPid,
}

impl SteerController {
    pub fn new(pid: &PidInit) -> Self {
        Self {
            heading_pid: pid.build(),
        }
    }

    /// Returns the raw steering output. Clamping to the steering range is
    /// left to the caller.
    pub fn step(
        &mut self,
        target: &Point3<f64>,
        position: &Point3<f64>,
        yaw_degrees: f64,
        dt: f64,
    ) -> f64 {
        let error = heading_error(target, position, yaw_degrees);
        self.heading_pid.next_control_output(error, dt)
    }

    pub fn reset(&mut self) {
        self.heading_pid.reset();
    }
}

/// Signed angle in radians from the vehicle heading to the target, measured
/// in the ground plane. Degenerate geometry yields zero.
pub fn heading_error(target: &Point3<f64>, position: &Point3<f64>, yaw_degrees: f64) -> f64 {
    let yaw = yaw_degrees.to_radians();
    let forward = Vector3::new(yaw.cos(), yaw.sin(), 0.0);
    let to_target = Vector3::new(target.x - position.x, target.y - position.y, 0.0);

    let norm_product = forward.norm() * to_target.norm();
    if !norm_product.is_finite() || norm_product <= f64::EPSILON {
        return 0.0;
    }

    let cos_angle = (forward.dot(&to_target) / norm_product).clamp(-1.0, 1.0);
    let angle = cos_angle.acos();

    if forward.cross(&to_target).z < 0.0 {
        -angle
    } else {
        angle
    }
}
