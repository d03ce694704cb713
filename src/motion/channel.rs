// Velocity command output

use std::future::Future;

use tracing::debug;

use super::driver::MotionError;
use crate::messages::VelocityCommand;

/// Sink for the velocity commands that move the base
pub trait VelocityChannel: Send {
    fn publish(
        &mut self,
        cmd: &VelocityCommand,
    ) -> impl Future<Output = Result<(), MotionError>> + Send;
}

/// Publishes JSON velocity commands on a zenoh key
pub struct ZenohVelocityChannel {
    publisher: zenoh::pubsub::Publisher<'static>,
}

impl ZenohVelocityChannel {
    pub async fn declare(session: &zenoh::Session, key: &str) -> Result<Self, zenoh::Error> {
        let publisher = session.declare_publisher(key.to_string()).await?;
        Ok(Self { publisher })
    }
}

impl VelocityChannel for ZenohVelocityChannel {
    async fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), MotionError> {
        debug!(
            "cmd_vel: linear_x={:.3}, angular_z={:.3}",
            cmd.linear_x, cmd.angular_z
        );
        let json = serde_json::to_string(cmd).map_err(|e| MotionError::Publish(e.to_string()))?;
        self.publisher
            .put(json)
            .await
            .map_err(|e| MotionError::Publish(e.to_string()))
    }
}
