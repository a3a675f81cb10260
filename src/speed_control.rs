use crate::pid::{PidInit, WindowedPid};

/// Longitudinal controller. Turns a speed error into a normalized
/// acceleration request in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct SpeedController {
    speed_pid: WindowedPid,
}

impl SpeedController {
    pub fn new(pid: &PidInit) -> Self {
        Self {
            speed_pid: pid.build(),
        }
    }

    pub fn step(&mut self, target_speed: f64, current_speed: f64, dt: f64) -> f64 {
        let error = target_speed - current_speed;
        let accel = self.speed_pid.next_control_output(error, dt);

        if accel.is_nan() {
            0.0
        } else {
            accel.clamp(-1.0, 1.0)
        }
    }

    pub fn reset(&mut self) {
        self.speed_pid.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn cruise_gains() -> PidInit {
        PidInit {
            kp: 0.15,
            ki: 0.07,
            kd: 0.05,
        }
    }

    #[test]
    fn first_step_from_standstill_saturates_forward() {
        let mut controller = SpeedController::new(&cruise_gains());
        let accel = controller.step(30.0, 0.0, 0.03);
        assert_eq!(accel, 1.0);
    }

    #[test]
    fn overspeed_requests_deceleration() {
        let mut controller = SpeedController::new(&cruise_gains());
        let accel = controller.step(0.0, 2.0, 0.03);
        assert!(accel < 0.0);
        assert!((accel + 0.3).abs() < 1e-9);
    }

    #[test]
    fn second_sample_adds_exact_derivative() {
        let gains = PidInit {
            kp: 0.0,
            ki: 0.0,
            kd: 0.01,
        };
        let mut controller = SpeedController::new(&gains);
        assert_eq!(controller.step(10.0, 0.0, 0.5), 0.0);
        // error 10 -> 4, derivative = -6 / 0.5 = -12
        let accel = controller.step(10.0, 6.0, 0.5);
        assert!((accel + 0.12).abs() < 1e-9);
    }

    #[test]
    fn output_stays_in_unit_range_for_any_gains() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let gains = PidInit {
                kp: rng.gen_range(-1e3..1e3),
                ki: rng.gen_range(-1e3..1e3),
                kd: rng.gen_range(-1e3..1e3),
            };
            let mut controller = SpeedController::new(&gains);

            for _ in 0..30 {
                let target = rng.gen_range(0.0..200.0);
                let current = rng.gen_range(0.0..200.0);
                let accel = controller.step(target, current, 0.03);
                assert!((-1.0..=1.0).contains(&accel), "accel {accel} out of range");
            }
        }
    }
}
