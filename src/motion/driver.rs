// Robot driver: one velocity channel plus one transform source
//
// The motion routines themselves live next door (cyclic.rs, segment.rs) as
// further impl blocks on RobotDriver.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::channel::VelocityChannel;
use super::rate::Rate;
use crate::config::MotionConfig;
use crate::messages::{RequestError, VelocityCommand};
use crate::transform::{StampedTransform, TransformError, TransformSource};

/// Error types for motion routines
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Invalid motion request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Transform lookup failed: {0}")]
    Transform(#[from] TransformError),

    #[error("A circle needs at least 3 segments, got {0}")]
    InvalidSegments(u32),

    #[error("Publish rate must be a positive finite frequency, got {0}")]
    InvalidRate(f64),

    #[error("{times} circles of radius {radius}m at {velocity}m/s need more ticks than can be counted")]
    TooManyTicks {
        radius: f64,
        velocity: f64,
        times: u32,
    },

    #[error("Failed to publish velocity command: {0}")]
    Publish(String),

    #[error("Motion cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MotionError>;

/// Drives the base through a velocity channel, reading odometry from a transform source
pub struct RobotDriver<C, T> {
    channel: C,
    transforms: T,
    config: MotionConfig,
}

impl<C: VelocityChannel, T: TransformSource> RobotDriver<C, T> {
    pub fn new(channel: C, transforms: T) -> Self {
        Self::with_config(channel, transforms, MotionConfig::default())
    }

    pub fn with_config(channel: C, transforms: T, config: MotionConfig) -> Self {
        info!(
            "Robot driver ready: {}Hz, odometry {} <- {}",
            config.rate_hz, config.robot_frame, config.odom_frame
        );
        Self {
            channel,
            transforms,
            config,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn transforms(&self) -> &T {
        &self.transforms
    }

    /// Send one velocity command
    pub async fn publish(&mut self, cmd: &VelocityCommand) -> Result<()> {
        self.channel.publish(cmd).await
    }

    /// Send the zero command
    pub async fn stop(&mut self) -> Result<()> {
        self.channel.publish(&VelocityCommand::stop()).await
    }

    /// Stop, logging rather than returning a failure to do so
    pub(crate) async fn stop_quietly(&mut self) {
        if let Err(e) = self.stop().await {
            warn!("Failed to stop the base: {}", e);
        }
    }

    pub(crate) fn rate(&self) -> Result<Rate> {
        Rate::new(self.config.rate_hz)
    }

    /// Wait out one rate period; a cancellation stops the base instead
    pub(crate) async fn sleep_or_cancel(
        &mut self,
        rate: &mut Rate,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Motion cancelled, stopping the base");
                self.stop_quietly().await;
                Err(MotionError::Cancelled)
            }
            _ = rate.sleep() => Ok(()),
        }
    }

    /// Current robot <- odom transform
    pub(crate) fn lookup_odometry(&self) -> std::result::Result<StampedTransform, TransformError> {
        self.transforms
            .lookup_transform(&self.config.robot_frame, &self.config.odom_frame)
    }

    /// One-time bounded wait for odometry, then the starting snapshot
    pub(crate) async fn start_odometry(&mut self) -> Result<StampedTransform> {
        let wait = self.transforms.wait_for_transform(
            &self.config.robot_frame,
            &self.config.odom_frame,
            self.config.transform_wait,
        );
        if let Err(e) = wait.await {
            warn!("{}", e);
        }
        self.lookup_odometry().map_err(MotionError::from)
    }
}
