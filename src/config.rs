// Rates, timings, topics and frames
use std::time::Duration;

// Velocity publish frequency
pub const RATE_HZ: f64 = 10.0;

// Wait between accepting a request and starting to move
pub const STARTUP_DELAY: Duration = Duration::from_secs(5);

// Full circles driven per request
pub const REVOLUTIONS: u32 = 10;

// Straight segments approximating one circle (closed-loop strategy)
pub const SEGMENTS_PER_REVOLUTION: u32 = 20;

// In-place turn speed for closed-loop turns (rad/s)
pub const TURN_SPEED: f64 = 0.75;

// Rotation readings below this are odometry noise (rad)
pub const ANGLE_NOISE_FLOOR: f64 = 1.0e-2;

// One-time wait for the odometry transform to show up
pub const TRANSFORM_WAIT: Duration = Duration::from_secs(1);

// Slack the client adds on top of the expected maneuver time
pub const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(60);

// Longest the client will ever wait for a reply (30 days)
pub const CLIENT_TIMEOUT_CAP: Duration = Duration::from_secs(30 * 24 * 3600);

// Zenoh keys
pub const SERVICE_KEY: &str = "robot_circle_moving"; // request/reply
pub const TOPIC_STATE: &str = "robot_circle_moving/state"; // idle/busy
pub const TOPIC_CMD_VEL: &str = "cmd_vel"; // velocity commands
pub const TOPIC_TF: &str = "tf"; // odometry transforms

// Frames
pub const ROBOT_FRAME: &str = "base_footprint";
pub const ODOM_FRAME: &str = "odom";

/// Parameters of the motion routines themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    pub rate_hz: f64,
    pub turn_speed: f64,
    pub angle_noise_floor: f64,
    pub transform_wait: Duration,
    pub robot_frame: String,
    pub odom_frame: String,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            rate_hz: RATE_HZ,
            turn_speed: TURN_SPEED,
            angle_noise_floor: ANGLE_NOISE_FLOOR,
            transform_wait: TRANSFORM_WAIT,
            robot_frame: ROBOT_FRAME.to_string(),
            odom_frame: ODOM_FRAME.to_string(),
        }
    }
}
