use anyhow::Result;
use carla_behavior_agent::{
    ActorId, Actuator, AgentInit, ControlCommand, Error, LaneSide, RouteService, TrafficLight,
    VehicleState, Waypoint, WorldAccessor,
};
use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};
use nalgebra::{Point3, Vector3};
use rand::prelude::*;
use std::{convert::Infallible, path::PathBuf};

const LEAD_ID: ActorId = 7;
const LEAD_SPEED_MS: f64 = 4.0;
const SENSOR_RANGE_M: f64 = 30.0;
const MAX_ACCEL_MS2: f64 = 3.0;
const MAX_DECEL_MS2: f64 = 8.0;
const MAX_YAW_RATE_DEG: f64 = 40.0;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Follow,
    Behavior,
    LaneChange,
}

#[derive(Parser)]
struct Opts {
    /// Number of control steps to simulate.
    #[clap(long, default_value_t = 3000)]
    pub steps: usize,
    /// TOML file overriding the preset.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(long, value_enum, default_value = "behavior")]
    pub preset: Preset,
    #[clap(long, default_value_t = 0)]
    pub seed: u64,
    /// Distance to the goal along +x in metres.
    #[clap(long, default_value_t = 300.0)]
    pub goal: f64,
}

/// Straight-line planner with a waypoint every two metres.
struct StraightPlanner;

impl RouteService for StraightPlanner {
    type Error = Infallible;

    fn trace_route(
        &mut self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Result<Vec<Waypoint>, Infallible> {
        let (start, end) = (*start, *end);
        let delta = end - start;
        let count = (delta.xy().norm() / 2.0).ceil().max(1.0) as usize;
        let yaw = delta.y.atan2(delta.x).to_degrees();

        let waypoints = (1..=count)
            .map(|step| {
                let t = step as f64 / count as f64;
                Waypoint {
                    lane_id: Some(-1),
                    ..Waypoint::new(start + delta * t, yaw)
                }
            })
            .collect();
        Ok(waypoints)
    }
}

/// Kinematic point-mass ego vehicle plus one slow lead vehicle on the road.
struct ToyWorld {
    position: Point3<f64>,
    speed: f64,
    yaw_degrees: f64,
    lead_position: Point3<f64>,
    dt: f64,
}

impl ToyWorld {
    fn advance_lead(&mut self) {
        self.lead_position.x += LEAD_SPEED_MS * self.dt;
    }

    fn lead_distance(&self) -> Option<f64> {
        let ahead = self.lead_position.x - self.position.x;
        let lateral = (self.lead_position.y - self.position.y).abs();
        (ahead > 0.0 && ahead <= SENSOR_RANGE_M && lateral < 1.75).then_some(ahead)
    }
}

impl WorldAccessor for ToyWorld {
    fn vehicle_state(&self) -> VehicleState {
        let heading = self.yaw_degrees.to_radians();
        let velocity = Vector3::new(heading.cos(), heading.sin(), 0.0) * self.speed;
        VehicleState::new(self.position, velocity, self.yaw_degrees).with_speed_limit(50.0)
    }

    fn ego_waypoint(&self) -> Option<Waypoint> {
        let lane_center = Point3::new(self.position.x, 0.0, 0.0);
        Some(Waypoint {
            lane_id: Some(-1),
            right_lane_id: Some(-2),
            ..Waypoint::new(lane_center, 0.0)
        })
    }

    fn traffic_lights(&self) -> Vec<TrafficLight> {
        vec![]
    }

    fn actor_speed(&self, actor_id: ActorId) -> Option<f64> {
        (actor_id == LEAD_ID).then_some(LEAD_SPEED_MS * 3.6)
    }

    fn adjacent_waypoint(&self, waypoint: &Waypoint, side: LaneSide) -> Option<Waypoint> {
        match side {
            LaneSide::Left => None,
            LaneSide::Right => Some(Waypoint {
                lane_id: Some(-2),
                left_lane_id: Some(-1),
                ..Waypoint::new(waypoint.position + Vector3::new(0.0, 3.5, 0.0), 0.0)
            }),
        }
    }
}

impl Actuator for ToyWorld {
    fn apply_control(&mut self, command: &ControlCommand) {
        let accel = command.throttle * MAX_ACCEL_MS2 - command.brake * MAX_DECEL_MS2;
        self.speed = (self.speed + accel * self.dt).max(0.0);
        self.yaw_degrees += command.steer * MAX_YAW_RATE_DEG * self.dt;

        let heading = self.yaw_degrees.to_radians();
        self.position += Vector3::new(heading.cos(), heading.sin(), 0.0) * self.speed * self.dt;
        self.advance_lead();
    }
}

fn setup_logger() -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

fn main() -> Result<()> {
    let Opts {
        steps,
        config,
        preset,
        seed,
        goal,
    } = Opts::parse();
    setup_logger()?;

    let init = match config {
        Some(path) => AgentInit::load(path)?,
        None => match preset {
            Preset::Follow => AgentInit::follow_agent(),
            Preset::Behavior => AgentInit::behavior_agent(),
            Preset::LaneChange => AgentInit::lane_change_agent(),
        },
    };
    let mut agent = init.build();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = ToyWorld {
        position: Point3::origin(),
        speed: 0.0,
        yaw_degrees: 0.0,
        lead_position: Point3::new(rng.gen_range(40.0..80.0), 0.0, 0.0),
        dt: init.controller.dt,
    };

    let mut planner = StraightPlanner;
    let count = agent.set_destination(&world.position, &Point3::new(goal, 0.0, 0.0), &mut planner)?;
    info!("planned {} waypoints, lead vehicle at {:.1} m", count, world.lead_position.x);

    let sink = agent.obstacle_sink();

    for step in 0..steps {
        if agent.is_arrived() {
            info!("arrived after {} steps", step);
            break;
        }

        if let Some(distance) = world.lead_distance() {
            sink.on_detect(distance, LEAD_ID);
        }

        let command = match agent.step(&world, &mut planner) {
            Ok((command, report)) => {
                if let Some(transition) = report.transition {
                    let ahead: Vec<_> = agent
                        .route()
                        .upcoming(3)
                        .map(|waypoint| {
                            format!("({:.1}, {:.1})", waypoint.position.x, waypoint.position.y)
                        })
                        .collect();
                    info!(
                        "step {}: {} at {:.1} km/h, {} waypoints left, next {}",
                        step,
                        transition.to,
                        world.speed * 3.6,
                        report.remaining_waypoints,
                        ahead.join(" ")
                    );
                }
                command
            }
            Err(Error::ExhaustedRoute) => {
                info!("route exhausted after {} steps", step);
                break;
            }
            Err(err) => return Err(err.into()),
        };

        world.apply_control(&command);
    }

    world.apply_control(&agent.emergency_stop());
    info!(
        "final position ({:.1}, {:.1}), status {:?}",
        world.position.x,
        world.position.y,
        agent.status()
    );
    Ok(())
}
