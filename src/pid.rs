use crate::constants::ERROR_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidInit {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidInit {
    pub fn build(&self) -> WindowedPid {
        let Self { kp, ki, kd } = *self;
        WindowedPid {
            kp,
            ki,
            kd,
            history: ErrorHistory::default(),
        }
    }
}

/// Ring buffer of the most recent error samples of one control axis.
///
/// The integral term is the sum over the buffer, not over the whole run, so
/// the integral action can never exceed `capacity * max_error * dt`.
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl ErrorHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, error: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(error);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Returns `(derivative, integral)`. Both are zero until two samples
    /// are buffered.
    pub fn terms(&self, dt: f64) -> (f64, f64) {
        let len = self.samples.len();
        if len < 2 {
            return (0.0, 0.0);
        }

        let derivative = (self.samples[len - 1] - self.samples[len - 2]) / dt;
        let integral = self.samples.iter().sum::<f64>() * dt;
        (derivative, integral)
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::with_capacity(ERROR_HISTORY_CAPACITY)
    }
}

/// PID law over an [ErrorHistory]. The output is not clamped.
#[derive(Debug, Clone)]
pub struct WindowedPid {
    kp: f64,
    ki: f64,
    kd: f64,
    history: ErrorHistory,
}

impl WindowedPid {
    pub fn next_control_output(&mut self, error: f64, dt: f64) -> f64 {
        let Self {
            kp,
            ki,
            kd,
            ref mut history,
        } = *self;

        history.push(error);
        let (derivative, integral) = history.terms(dt);
        kp * error + kd * derivative + ki * integral
    }

    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
