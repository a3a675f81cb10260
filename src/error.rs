use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// No waypoint is left to track. The mission is over and the driver
    /// should stop stepping the agent.
    #[error("route exhausted, no waypoint left to track")]
    ExhaustedRoute,

    #[error("route service failed: {0}")]
    RouteService(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("cannot read the agent configuration: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("cannot parse the agent configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid agent configuration: {0}")]
    InvalidConfig(String),
}
