/// Number of error samples kept by each PID axis.
pub const ERROR_HISTORY_CAPACITY: usize = 10;

/// Conversion factor from m/s to km/h.
pub const MS_TO_KMH: f64 = 3.6;

/// Fixed control period in seconds.
pub const DEFAULT_CONTROL_DT_SEC: f64 = 0.03;

pub const DEFAULT_ARRIVAL_RADIUS_M: f64 = 4.0;
pub const DEFAULT_ARRIVAL_THRESHOLD: usize = 1;

pub const DEFAULT_SOFT_STOP_BRAKE: f64 = 0.65;
pub const DEFAULT_EMERGENCY_BRAKE: f64 = 1.0;
