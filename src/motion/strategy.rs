// How a circle request gets turned into motion

use std::fmt;

use tokio_util::sync::CancellationToken;

use super::channel::VelocityChannel;
use super::driver::{Result, RobotDriver};
use crate::config::SEGMENTS_PER_REVOLUTION;
use crate::messages::MotionRequest;
use crate::transform::TransformSource;

/// Ways of driving a circle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircleStrategy {
    /// Constant curvature command for a precomputed number of ticks
    #[default]
    OpenLoopCyclic,
    /// Polygon of odometry-checked straight drives and in-place turns
    ClosedLoopSegmented { segments: u32 },
}

impl CircleStrategy {
    pub fn segmented() -> Self {
        Self::ClosedLoopSegmented {
            segments: SEGMENTS_PER_REVOLUTION,
        }
    }

    /// Drive `revolutions` circles for `request`
    pub async fn execute<C: VelocityChannel, T: TransformSource>(
        &self,
        driver: &mut RobotDriver<C, T>,
        request: &MotionRequest,
        revolutions: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match *self {
            Self::OpenLoopCyclic => driver
                .move_cyclically(request.radius, request.velocity, revolutions, cancel)
                .await
                .map(|_| ()),
            Self::ClosedLoopSegmented { segments } => {
                driver
                    .move_segmented(
                        request.radius,
                        request.velocity,
                        revolutions,
                        segments,
                        cancel,
                    )
                    .await
            }
        }
    }
}

impl fmt::Display for CircleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenLoopCyclic => write!(f, "open-loop cyclic"),
            Self::ClosedLoopSegmented { segments } => {
                write!(f, "closed-loop segmented ({} segments)", segments)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedBase;

    #[tokio::test(start_paused = true)]
    async fn test_strategies_turn_the_same_way() {
        let request = MotionRequest::new(1.0, 2.0);
        let cancel = CancellationToken::new();

        let open = SimulatedBase::new();
        CircleStrategy::OpenLoopCyclic
            .execute(&mut open.driver(), &request, 1, &cancel)
            .await
            .unwrap();

        let closed = SimulatedBase::new();
        CircleStrategy::ClosedLoopSegmented { segments: 8 }
            .execute(&mut closed.driver(), &request, 1, &cancel)
            .await
            .unwrap();

        // Both published positive angular velocity and ended stopped
        for base in [&open, &closed] {
            let published = base.published();
            assert!(published.iter().any(|c| c.angular_z > 0.0));
            assert!(published.iter().all(|c| c.angular_z >= 0.0));
            assert!(published.last().unwrap().is_stop());
        }
        // Closed loop measured its way around; odometry was read
        assert_eq!(open.lookups(), 0);
        assert!(closed.lookups() > 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CircleStrategy::segmented().to_string(),
            "closed-loop segmented (20 segments)"
        );
    }
}
