// Simulated differential-drive base
//
// Every published velocity command is integrated over one rate period, and
// the resulting pose is served back as odometry. Used by --simulate and by
// the tests of the motion routines.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nalgebra::{Isometry3, Vector3};

use crate::config::{MotionConfig, ODOM_FRAME, ROBOT_FRAME};
use crate::messages::VelocityCommand;
use crate::motion::{MotionError, RobotDriver, VelocityChannel};
use crate::transform::{StampedTransform, TransformError, TransformSource};

#[derive(Debug, Default)]
struct SimState {
    x: f64,
    y: f64,
    yaw: f64,
    time: f64,
    published: Vec<VelocityCommand>,
    lookups: usize,
    fail_lookups_after: Option<usize>,
}

/// Shared handle to one simulated base
#[derive(Debug, Clone)]
pub struct SimulatedBase {
    state: Arc<Mutex<SimState>>,
    rate_hz: f64,
}

impl Default for SimulatedBase {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBase {
    pub fn new() -> Self {
        Self::with_rate(crate::config::RATE_HZ)
    }

    /// Each command moves the base for 1 / `rate_hz` seconds
    pub fn with_rate(rate_hz: f64) -> Self {
        Self {
            state: Arc::default(),
            rate_hz,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channel(&self) -> SimChannel {
        SimChannel { base: self.clone() }
    }

    pub fn odometry_source(&self) -> SimOdometry {
        SimOdometry { base: self.clone() }
    }

    /// Driver wired to this base, at the base's rate
    pub fn driver(&self) -> RobotDriver<SimChannel, SimOdometry> {
        self.driver_with(MotionConfig::default())
    }

    /// Driver wired to this base; the rate is always the base's own
    pub fn driver_with(&self, config: MotionConfig) -> RobotDriver<SimChannel, SimOdometry> {
        let config = MotionConfig {
            rate_hz: self.rate_hz,
            ..config
        };
        RobotDriver::with_config(self.channel(), self.odometry_source(), config)
    }

    /// Every command published so far
    pub fn published(&self) -> Vec<VelocityCommand> {
        self.lock().published.clone()
    }

    /// Number of transform lookups served or refused
    pub fn lookups(&self) -> usize {
        self.lock().lookups
    }

    /// Refuse every lookup once `n` have been made
    pub fn fail_lookups_after(&self, n: usize) {
        self.lock().fail_lookups_after = Some(n);
    }

    /// (x, y, yaw) in the odometry frame
    pub fn pose(&self) -> (f64, f64, f64) {
        let state = self.lock();
        (state.x, state.y, state.yaw)
    }

    /// Pose of the robot in the odometry frame
    pub fn odometry(&self) -> StampedTransform {
        let state = self.lock();
        let pose = Isometry3::new(Vector3::new(state.x, state.y, 0.0), Vector3::z() * state.yaw);
        StampedTransform::new(pose, state.time)
    }

    fn apply(&self, cmd: &VelocityCommand) {
        let dt = 1.0 / self.rate_hz;
        let mut state = self.lock();
        let (sin, cos) = state.yaw.sin_cos();
        state.x += (cmd.linear_x * cos - cmd.linear_y * sin) * dt;
        state.y += (cmd.linear_x * sin + cmd.linear_y * cos) * dt;
        state.yaw += cmd.angular_z * dt;
        state.time += dt;
        state.published.push(*cmd);
    }
}

/// Velocity sink of a [`SimulatedBase`]
pub struct SimChannel {
    base: SimulatedBase,
}

impl VelocityChannel for SimChannel {
    async fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), MotionError> {
        self.base.apply(cmd);
        Ok(())
    }
}

/// Odometry of a [`SimulatedBase`], serving `base_footprint` and `odom`
pub struct SimOdometry {
    base: SimulatedBase,
}

impl TransformSource for SimOdometry {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<StampedTransform, TransformError> {
        {
            let mut state = self.base.lock();
            state.lookups += 1;
            if let Some(limit) = state.fail_lookups_after {
                if state.lookups > limit {
                    return Err(TransformError::Source("simulated odometry dropout".into()));
                }
            }
        }

        let pose = self.base.odometry();
        match (target_frame, source_frame) {
            (ROBOT_FRAME, ODOM_FRAME) => Ok(pose.inverse()),
            (ODOM_FRAME, ROBOT_FRAME) => Ok(pose),
            _ => Err(TransformError::Unavailable {
                target_frame: target_frame.to_string(),
                source_frame: source_frame.to_string(),
            }),
        }
    }

    // Odometry exists from the start; waiting never touches the lookup count
    async fn wait_for_transform(
        &self,
        _target_frame: &str,
        _source_frame: &str,
        _timeout: Duration,
    ) -> Result<(), TransformError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_integrates_commands() {
        let base = SimulatedBase::with_rate(10.0);
        let mut channel = base.channel();
        for _ in 0..10 {
            channel.publish(&VelocityCommand::new(0.5, 0.0)).await.unwrap();
        }
        let (x, y, yaw) = base.pose();
        assert!((x - 0.5).abs() < 1e-9);
        assert!(y.abs() < 1e-9);
        assert_eq!(yaw, 0.0);
        assert_eq!(base.published().len(), 10);
    }

    #[test]
    fn test_lookup_is_inverse_pose() {
        let base = SimulatedBase::new();
        base.lock().x = 2.0;
        let odom = base.odometry_source();

        let robot_from_odom = odom.lookup_transform(ROBOT_FRAME, ODOM_FRAME).unwrap();
        assert!((robot_from_odom.transform.translation.vector.x + 2.0).abs() < 1e-9);
        assert!(odom.lookup_transform("map", ODOM_FRAME).is_err());
    }

    #[test]
    fn test_lookup_failure_injection() {
        let base = SimulatedBase::new();
        base.fail_lookups_after(1);
        let odom = base.odometry_source();

        assert!(odom.lookup_transform(ROBOT_FRAME, ODOM_FRAME).is_ok());
        assert!(matches!(
            odom.lookup_transform(ROBOT_FRAME, ODOM_FRAME),
            Err(TransformError::Source(_))
        ));
        assert_eq!(base.lookups(), 2);
    }
}
