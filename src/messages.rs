// Message types exchanged over zenoh

use serde::{Deserialize, Serialize};

// Request from circle-client -> service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    pub velocity: f64,
    pub radius: f64,
}

/// Why a request can't be executed
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("velocity must be a nonzero finite number, got {0}")]
    Velocity(f64),

    #[error("radius must be a nonzero finite number, got {0}")]
    Radius(f64),
}

impl MotionRequest {
    pub fn new(velocity: f64, radius: f64) -> Self {
        Self { velocity, radius }
    }

    /// Both values end up as divisors, so zero (and NaN/inf) is refused here
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.velocity == 0.0 || !self.velocity.is_finite() {
            return Err(RequestError::Velocity(self.velocity));
        }
        if self.radius == 0.0 || !self.radius.is_finite() {
            return Err(RequestError::Radius(self.radius));
        }
        Ok(())
    }
}

// Reply from service -> circle-client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionResponse {
    pub sum: i64,
}

impl MotionResponse {
    /// The only acknowledgement the service ever sends
    pub const ACK: Self = Self { sum: 1 };
}

/// Body of an error reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

// Velocity output from service -> base
// Default is the stop command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct VelocityCommand {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

impl VelocityCommand {
    pub fn new(linear_x: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            linear_y: 0.0,
            angular_z,
        }
    }

    pub fn stop() -> Self {
        Self::default()
    }

    pub fn is_stop(&self) -> bool {
        self.linear_x == 0.0 && self.linear_y == 0.0 && self.angular_z == 0.0
    }
}

/// Transform as it travels on the tf topic: pose of `child_frame_id` in `frame_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub frame_id: String,
    pub child_frame_id: String,
    pub translation: [f64; 3],
    /// Quaternion as [x, y, z, w]
    pub rotation: [f64; 4],
    /// Seconds
    pub stamp: f64,
}

/// Service state published on every change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    #[default]
    Idle,
    Busy,
}
