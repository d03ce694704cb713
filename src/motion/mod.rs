// Motion control for the circle-moving base
//
// Provides:
// - Velocity command output (trait + zenoh publisher)
// - Fixed-rate loop timing
// - Open-loop cyclic motion and closed-loop odometry segments
// - The strategy choosing between them

pub mod channel;
pub mod cyclic;
mod driver;
pub mod rate;
pub mod segment;
pub mod strategy;

pub use channel::{VelocityChannel, ZenohVelocityChannel};
pub use cyclic::{circle_command, tick_count};
pub use driver::{MotionError, RobotDriver};
pub use rate::Rate;
pub use segment::normalize_angle;
pub use strategy::CircleStrategy;
