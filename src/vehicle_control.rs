use crate::{
    constants::{DEFAULT_CONTROL_DT_SEC, DEFAULT_EMERGENCY_BRAKE},
    physics::VehicleState,
    pid::PidInit,
    route::Waypoint,
    speed_control::SpeedController,
    steer_control::SteerController,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleControllerInit {
    pub longitudinal: PidInit,
    pub lateral: PidInit,
    pub max_throttle: f64,
    pub max_brake: f64,
    pub max_steer: f64,
    /// Control period in seconds used for the derivative and integral terms.
    pub dt: f64,
}

impl VehicleControllerInit {
    pub fn build(&self) -> VehicleController {
        let Self {
            ref longitudinal,
            ref lateral,
            max_throttle,
            max_brake,
            max_steer,
            dt,
        } = *self;

        VehicleController {
            speed_controller: SpeedController::new(longitudinal),
            steer_controller: SteerController::new(lateral),
            max_throttle,
            max_brake,
            max_steer,
            dt,
        }
    }
}

impl Default for VehicleControllerInit {
    fn default() -> Self {
        Self {
            longitudinal: PidInit {
                kp: 0.15,
                ki: 0.07,
                kd: 0.05,
            },
            lateral: PidInit {
                kp: 0.58,
                ki: 0.5,
                kd: 0.2,
            },
            max_throttle: 1.0,
            max_brake: 0.3,
            max_steer: 1.0,
            dt: DEFAULT_CONTROL_DT_SEC,
        }
    }
}

/// Actuation command for one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub steer: f64,
    pub throttle: f64,
    pub brake: f64,
    pub hand_brake: bool,
}

impl ControlCommand {
    /// Full brake, wheels straight.
    pub fn emergency_stop() -> Self {
        Self {
            steer: 0.0,
            throttle: 0.0,
            brake: DEFAULT_EMERGENCY_BRAKE,
            hand_brake: false,
        }
    }

    /// Partial brake, wheels straight.
    pub fn soft_stop(brake: f64) -> Self {
        Self {
            steer: 0.0,
            throttle: 0.0,
            brake,
            hand_brake: false,
        }
    }
}

impl Default for ControlCommand {
    fn default() -> Self {
        Self {
            steer: 0.0,
            throttle: 0.0,
            brake: 0.0,
            hand_brake: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VehicleController {
    speed_controller: SpeedController,
    steer_controller: SteerController,
    max_throttle: f64,
    max_brake: f64,
    max_steer: f64,
    dt: f64,
}

impl VehicleController {
    pub fn step(
        &mut self,
        target_speed: f64,
        target: &Waypoint,
        vehicle: &VehicleState,
    ) -> ControlCommand {
        let Self {
            ref mut speed_controller,
            ref mut steer_controller,
            max_throttle,
            max_brake,
            max_steer,
            dt,
        } = *self;

        let accel = speed_controller.step(target_speed, vehicle.speed(), dt);
        let steering = steer_controller.step(
            &target.position,
            &vehicle.position,
            vehicle.yaw_degrees,
            dt,
        );

        let (throttle, brake) = if accel >= 0.0 {
            (accel.abs().min(max_throttle), 0.0)
        } else {
            (0.0, accel.abs().min(max_brake))
        };

        let steer = if steering >= 0.0 {
            max_steer.min(steering)
        } else {
            (-max_steer).max(steering)
        };

        ControlCommand {
            steer,
            throttle,
            brake,
            hand_brake: false,
        }
    }

    pub fn reset(&mut self) {
        self.speed_controller.reset();
        self.steer_controller.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    fn waypoint_at(x: f64, y: f64) -> Waypoint {
        Waypoint::new(Point3::new(x, y, 0.0), 0.0)
    }

    #[test]
    fn accelerating_uses_throttle_only() {
        let mut controller = VehicleControllerInit::default().build();
        let vehicle = VehicleState::new(Point3::origin(), Vector3::zeros(), 0.0);

        let command = controller.step(30.0, &waypoint_at(10.0, 0.0), &vehicle);
        assert!(command.throttle > 0.0);
        assert!(command.throttle <= 1.0);
        assert_eq!(command.brake, 0.0);
        assert!(!command.hand_brake);
    }

    #[test]
    fn braking_is_limited_by_max_brake() {
        let mut controller = VehicleControllerInit::default().build();
        // 20 m/s = 72 km/h against a 0 km/h target
        let vehicle = VehicleState::new(Point3::origin(), Vector3::new(20.0, 0.0, 0.0), 0.0);

        let command = controller.step(0.0, &waypoint_at(10.0, 0.0), &vehicle);
        assert_eq!(command.throttle, 0.0);
        assert_eq!(command.brake, 0.3);
    }

    #[test]
    fn throttle_is_limited_by_max_throttle() {
        let mut controller = VehicleControllerInit {
            max_throttle: 0.75,
            ..VehicleControllerInit::default()
        }
        .build();
        let vehicle = VehicleState::new(Point3::origin(), Vector3::zeros(), 0.0);

        let command = controller.step(30.0, &waypoint_at(10.0, 0.0), &vehicle);
        assert_eq!(command.throttle, 0.75);
    }

    #[test]
    fn steering_is_clamped_both_ways() {
        let init = VehicleControllerInit {
            max_steer: 0.5,
            ..VehicleControllerInit::default()
        };
        let vehicle = VehicleState::new(Point3::origin(), Vector3::zeros(), 0.0);

        let mut controller = init.build();
        let command = controller.step(10.0, &waypoint_at(0.0, 10.0), &vehicle);
        assert_eq!(command.steer, 0.5);

        let mut controller = init.build();
        let command = controller.step(10.0, &waypoint_at(0.0, -10.0), &vehicle);
        assert_eq!(command.steer, -0.5);
    }

    #[test]
    fn reset_restores_a_cold_start() {
        let init = VehicleControllerInit::default();
        let target = waypoint_at(10.0, 2.0);
        let moving = VehicleState::new(Point3::origin(), Vector3::new(5.0, 0.0, 0.0), 0.0);
        let vehicle = VehicleState::new(Point3::origin(), Vector3::new(2.0, 0.0, 0.0), 0.0);

        let mut controller = init.build();
        for _ in 0..5 {
            controller.step(15.0, &target, &moving);
        }
        let warm = controller.step(15.0, &target, &vehicle);

        controller.reset();
        let cold = controller.step(15.0, &target, &vehicle);
        let fresh = init.build().step(15.0, &target, &vehicle);
        assert_eq!(cold, fresh);
        assert_ne!(warm, fresh);
    }
}
