//! Agent configuration.
//!
//! Every tunable of the agent lives in [AgentInit]. It can be built from one
//! of the presets or loaded from a TOML file, e.g.
//!
//! ```toml
//! [controller]
//! max_throttle = 0.75
//! max_brake = 0.3
//! max_steer = 1.0
//! dt = 0.03
//! longitudinal = { kp = 0.15, ki = 0.07, kd = 0.05 }
//! lateral = { kp = 0.58, ki = 0.5, kd = 0.2 }
//!
//! [route]
//! arrival_radius = 4.0
//!
//! [behavior]
//! emergency_brake_distance = 3.0
//! brake_distance = { kind = "quadratic", divisor = 7.0 }
//! lane_change = true
//! ```

use crate::{
    behavior::{BehaviorAgent, BehaviorInit, BrakeResponse, DistanceModel, StopResponse},
    error::{Error, Result},
    pid::PidInit,
    route::RouteTrackerInit,
    vehicle_control::VehicleControllerInit,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInit {
    pub controller: VehicleControllerInit,
    pub route: RouteTrackerInit,
    pub behavior: BehaviorInit,
}

impl AgentInit {
    /// Follows any vehicle within sensor range, brakes within `speed / 3`
    /// metres and stops hard at red lights.
    pub fn follow_agent() -> Self {
        Self {
            controller: VehicleControllerInit::default(),
            route: RouteTrackerInit::default(),
            behavior: BehaviorInit {
                emergency_brake_distance: 1.5,
                brake_distance: DistanceModel::Linear {
                    base: 0.0,
                    per_kmh: 1.0 / 3.0,
                },
                tailgating_distance: DistanceModel::Fixed { distance: 20.0 },
                min_speed: 20.0,
                max_speed: 30.0,
                follow_speed_margin: 0.0,
                red_light_response: StopResponse::Emergency,
                brake_response: BrakeResponse::FixedBrake { brake: 0.65 },
                ..BehaviorInit::default()
            },
        }
    }

    /// Tailgates with a speed scaled gap, slows down through the speed
    /// controller and stops softly at red lights.
    pub fn behavior_agent() -> Self {
        Self::default()
    }

    /// Uses a quadratic stopping distance and tries to pass obstacles by
    /// rerouting through a neighbouring lane.
    pub fn lane_change_agent() -> Self {
        Self {
            controller: VehicleControllerInit {
                lateral: PidInit {
                    kp: 0.58,
                    ki: 0.5,
                    kd: 0.4,
                },
                ..VehicleControllerInit::default()
            },
            route: RouteTrackerInit::default(),
            behavior: BehaviorInit {
                emergency_brake_distance: 3.0,
                brake_distance: DistanceModel::Fixed { distance: 3.0 },
                tailgating_distance: DistanceModel::Quadratic { divisor: 7.0 },
                traffic_light_distance: DistanceModel::Quadratic { divisor: 7.0 },
                min_speed: 20.0,
                max_speed: 30.0,
                follow_speed_margin: 0.0,
                red_light_response: StopResponse::Emergency,
                brake_response: BrakeResponse::FixedBrake { brake: 0.65 },
                lane_change: true,
                ..BehaviorInit::default()
            },
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let init: Self = toml::from_str(text)?;
        init.validate()?;
        Ok(init)
    }

    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            controller,
            route,
            behavior,
        } = self;

        check_positive("controller.dt", controller.dt)?;
        check_gains("controller.longitudinal", &controller.longitudinal)?;
        check_gains("controller.lateral", &controller.lateral)?;
        check_unit("controller.max_throttle", controller.max_throttle)?;
        check_unit("controller.max_brake", controller.max_brake)?;
        check_unit("controller.max_steer", controller.max_steer)?;

        check_non_negative("route.arrival_radius", route.arrival_radius)?;

        check_non_negative(
            "behavior.emergency_brake_distance",
            behavior.emergency_brake_distance,
        )?;
        check_distance_model("behavior.brake_distance", &behavior.brake_distance)?;
        check_distance_model("behavior.tailgating_distance", &behavior.tailgating_distance)?;
        check_distance_model(
            "behavior.traffic_light_distance",
            &behavior.traffic_light_distance,
        )?;
        check_band_order(behavior)?;
        check_non_negative("behavior.min_speed", behavior.min_speed)?;
        check_non_negative("behavior.max_speed", behavior.max_speed)?;
        if behavior.min_speed > behavior.max_speed {
            return Err(Error::InvalidConfig(format!(
                "behavior.min_speed ({}) exceeds behavior.max_speed ({})",
                behavior.min_speed, behavior.max_speed
            )));
        }
        if !behavior.follow_speed_margin.is_finite() {
            return Err(Error::InvalidConfig(
                "behavior.follow_speed_margin must be finite".into(),
            ));
        }
        check_unit("behavior.soft_stop_brake", behavior.soft_stop_brake)?;
        if let BrakeResponse::FixedBrake { brake } = behavior.brake_response {
            check_unit("behavior.brake_response.brake", brake)?;
        }

        Ok(())
    }

    pub fn build(&self) -> BehaviorAgent {
        let Self {
            controller,
            route,
            behavior,
        } = self;
        BehaviorAgent::new(behavior.clone(), route.build(), controller.build())
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be a non-negative number, got {value}"
        )))
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must lie in [0, 1], got {value}"
        )))
    }
}

fn check_gains(name: &str, pid: &PidInit) -> Result<()> {
    let PidInit { kp, ki, kd } = *pid;
    if [kp, ki, kd].iter().all(|gain| gain.is_finite()) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} has a non-finite gain")))
    }
}

/// Only bands that do not depend on speed can be compared here. The others
/// are floored at run time.
fn check_band_order(behavior: &BehaviorInit) -> Result<()> {
    let emergency = behavior.emergency_brake_distance;
    let brake = match behavior.brake_distance {
        DistanceModel::Fixed { distance } => Some(distance),
        _ => None,
    };
    let tailgating = match behavior.tailgating_distance {
        DistanceModel::Fixed { distance } => Some(distance),
        _ => None,
    };

    if let Some(brake) = brake {
        if brake < emergency {
            return Err(Error::InvalidConfig(format!(
                "behavior.brake_distance ({brake}) is shorter than behavior.emergency_brake_distance ({emergency})"
            )));
        }
    }
    if let (Some(brake), Some(tailgating)) = (brake, tailgating) {
        if tailgating < brake {
            return Err(Error::InvalidConfig(format!(
                "behavior.tailgating_distance ({tailgating}) is shorter than behavior.brake_distance ({brake})"
            )));
        }
    }
    Ok(())
}

fn check_distance_model(name: &str, model: &DistanceModel) -> Result<()> {
    match *model {
        DistanceModel::Fixed { distance } => check_non_negative(name, distance),
        DistanceModel::Linear { base, per_kmh } => {
            check_non_negative(name, base)?;
            check_non_negative(name, per_kmh)
        }
        DistanceModel::Quadratic { divisor } => check_positive(name, divisor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for init in [
            AgentInit::follow_agent(),
            AgentInit::behavior_agent(),
            AgentInit::lane_change_agent(),
        ] {
            init.validate().unwrap();
        }
    }

    #[test]
    fn lane_change_preset_passes_inside_the_tailgating_band() {
        let behavior = AgentInit::lane_change_agent().behavior;
        assert_eq!(behavior.brake_distance, DistanceModel::Fixed { distance: 3.0 });
        assert!(behavior.lane_change);

        let thresholds = behavior.thresholds(70.0);
        assert_eq!(thresholds.emergency, 3.0);
        assert_eq!(thresholds.brake, 3.0);
        assert!((thresholds.tailgating - 50.0).abs() < 1e-9);
        assert!((thresholds.traffic_light - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(AgentInit::from_toml_str("").unwrap(), AgentInit::default());
    }

    #[test]
    fn toml_overrides_are_applied() {
        let text = r#"
            [controller]
            max_throttle = 0.75
            max_brake = 0.3
            max_steer = 0.8
            dt = 0.05
            longitudinal = { kp = 1.0, ki = 0.0, kd = 0.0 }
            lateral = { kp = 0.58, ki = 0.5, kd = 0.2 }

            [route]
            arrival_radius = 0.5
            arrival_threshold = 5

            [behavior]
            emergency_brake_distance = 3.0
            brake_distance = { kind = "quadratic", divisor = 7.0 }
            tailgating_distance = { kind = "linear", base = 7.0, per_kmh = 0.1 }
            traffic_light_distance = { kind = "fixed", distance = 12.0 }
            red_light_response = "emergency"
            brake_response = { kind = "fixed_brake", brake = 0.5 }
            lane_change = true
        "#;

        let init = AgentInit::from_toml_str(text).unwrap();
        assert_eq!(init.controller.max_throttle, 0.75);
        assert_eq!(init.controller.dt, 0.05);
        assert_eq!(init.controller.longitudinal.kp, 1.0);
        assert_eq!(init.route.arrival_radius, 0.5);
        assert_eq!(init.route.arrival_threshold, 5);
        assert_eq!(
            init.behavior.brake_distance,
            DistanceModel::Quadratic { divisor: 7.0 }
        );
        assert_eq!(
            init.behavior.tailgating_distance,
            DistanceModel::Linear {
                base: 7.0,
                per_kmh: 0.1
            }
        );
        assert_eq!(
            init.behavior.traffic_light_distance,
            DistanceModel::Fixed { distance: 12.0 }
        );
        assert_eq!(init.behavior.red_light_response, StopResponse::Emergency);
        assert_eq!(
            init.behavior.brake_response,
            BrakeResponse::FixedBrake { brake: 0.5 }
        );
        assert!(init.behavior.lane_change);
        assert_eq!(init.behavior.min_speed, BehaviorInit::default().min_speed);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut init = AgentInit::default();
        init.controller.dt = 0.0;
        assert!(matches!(init.validate(), Err(Error::InvalidConfig(_))));

        let mut init = AgentInit::default();
        init.behavior.min_speed = 100.0;
        assert!(matches!(init.validate(), Err(Error::InvalidConfig(_))));

        let mut init = AgentInit::default();
        init.behavior.brake_distance = DistanceModel::Quadratic { divisor: 0.0 };
        assert!(matches!(init.validate(), Err(Error::InvalidConfig(_))));

        let mut init = AgentInit::default();
        init.behavior.emergency_brake_distance = 8.0;
        assert!(matches!(init.validate(), Err(Error::InvalidConfig(_))));

        let mut init = AgentInit::default();
        init.controller.max_brake = 1.5;
        assert!(matches!(init.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = AgentInit::from_toml_str("[behavior]\nmin_speed = \"fast\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = AgentInit::load("/nonexistent/agent.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigRead(_)));
    }
}
