// Open-loop circular motion
//
// A constant-curvature command (linear_x = v, angular_z = v / r) held for as
// many ticks as it takes to cover the requested number of circumferences.

use std::f64::consts::PI;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::channel::VelocityChannel;
use super::driver::{MotionError, Result, RobotDriver};
use crate::messages::{MotionRequest, VelocityCommand};
use crate::transform::TransformSource;

/// Number of commands needed for `times` circles at `rate_hz`
///
/// ticks per circle = floor(rate * circumference / speed). Magnitudes are used:
/// the sign of velocity or radius picks the direction, not the duration.
/// `None` when the count doesn't fit in a u64.
pub fn tick_count(radius: f64, velocity: f64, times: u32, rate_hz: f64) -> Option<u64> {
    let per_circle = (rate_hz * 2.0 * PI * radius.abs() / velocity.abs()).floor();
    // u64::MAX as f64 rounds up to 2^64, so the bound is exclusive
    if !per_circle.is_finite() || per_circle < 0.0 || per_circle >= u64::MAX as f64 {
        return None;
    }
    u64::from(times).checked_mul(per_circle as u64)
}

/// The command held for the whole maneuver
pub fn circle_command(radius: f64, velocity: f64) -> VelocityCommand {
    VelocityCommand::new(velocity, velocity / radius)
}

impl<C: VelocityChannel, T: TransformSource> RobotDriver<C, T> {
    /// Drive `times` full circles open loop, then stop
    ///
    /// Returns the number of non-zero commands published.
    pub async fn move_cyclically(
        &mut self,
        radius: f64,
        velocity: f64,
        times: u32,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        MotionRequest::new(velocity, radius).validate()?;

        let cmd = circle_command(radius, velocity);
        let rate_hz = self.config().rate_hz;
        let mut rate = self.rate()?;
        let ticks = tick_count(radius, velocity, times, rate_hz).ok_or(
            MotionError::TooManyTicks {
                radius,
                velocity,
                times,
            },
        )?;
        info!(
            "Moving in circles: radius={}m, velocity={}m/s, {} revolutions, {} ticks",
            radius, velocity, times, ticks
        );

        for _ in 0..ticks {
            if let Err(e) = self.publish(&cmd).await {
                self.stop_quietly().await;
                return Err(e);
            }
            self.sleep_or_cancel(&mut rate, cancel).await?;
        }

        self.stop().await?;
        info!("Circle motion complete");
        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionConfig;
    use crate::messages::MotionResponse;
    use crate::service::{MotionService, ServiceConfig};
    use crate::sim::SimulatedBase;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(1.0, 1.0, 1, Some(62))]
    #[case(5.0, 2.0, 1, Some(157))]
    #[case(5.0, 2.0, 10, Some(1570))]
    #[case(1.0, -1.0, 1, Some(62))]
    #[case(0.5, 1.0, 3, Some(93))]
    #[case(1.0, 1.0, 0, Some(0))]
    // Per-circle count saturates u64
    #[case(1e9, 1e-9, 10, None)]
    #[case(1e9, 1e-9, 0, None)]
    // Per-circle count fits, the revolution product doesn't
    #[case(1e9, 5e-9, 10, None)]
    #[case(f64::MAX, 1.0, 1, None)]
    fn test_tick_count(
        #[case] radius: f64,
        #[case] velocity: f64,
        #[case] times: u32,
        #[case] expected: Option<u64>,
    ) {
        assert_eq!(tick_count(radius, velocity, times, 10.0), expected);
    }

    #[test]
    fn test_circle_command() {
        let cmd = circle_command(5.0, 2.0);
        assert_eq!(cmd.linear_x, 2.0);
        assert_eq!(cmd.linear_y, 0.0);
        assert!((cmd.angular_z - 0.4).abs() < 1e-12);

        // Negative radius turns the other way
        assert!(circle_command(-5.0, 2.0).angular_z < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_ticks_then_single_stop() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();

        let ticks = driver
            .move_cyclically(1.0, 1.0, 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ticks, 62);

        let published = base.published();
        assert_eq!(published.len(), 63);
        for cmd in &published[..62] {
            assert_eq!(cmd.linear_x, 1.0);
            assert_eq!(cmd.angular_z, 1.0 / 1.0);
        }
        assert!(published[62].is_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_holds_rate() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();
        let start = tokio::time::Instant::now();

        driver
            .move_cyclically(1.0, 1.0, 1, &CancellationToken::new())
            .await
            .unwrap();

        // 62 periods of 100ms
        let elapsed = start.elapsed().as_secs_f64();
        assert!((elapsed - 6.2).abs() < 0.05, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_loop_never_reads_odometry() {
        let base = SimulatedBase::new();
        base.fail_lookups_after(0);
        let mut driver = base.driver();

        driver
            .move_cyclically(2.0, 0.5, 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(base.lookups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_zero_inputs() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();
        let cancel = CancellationToken::new();

        let err = driver.move_cyclically(0.0, 1.0, 1, &cancel).await.unwrap_err();
        assert!(matches!(err, MotionError::InvalidRequest(_)));
        let err = driver.move_cyclically(1.0, 0.0, 1, &cancel).await.unwrap_err();
        assert!(matches!(err, MotionError::InvalidRequest(_)));
        assert!(base.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_unrepresentable_tick_count() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();

        let err = driver
            .move_cyclically(1e9, 1e-9, 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::TooManyTicks { times: 10, .. }));
        assert!(base.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_survives_huge_circle() {
        let base = SimulatedBase::new();
        let service = MotionService::new(base.driver(), ServiceConfig::default());

        let response = service.handle(MotionRequest::new(1e-9, 1e9)).await.unwrap();
        assert_eq!(response, MotionResponse::ACK);
        assert!(base.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_bad_rate() {
        let config = MotionConfig {
            rate_hz: 0.0,
            ..MotionConfig::default()
        };
        let base = SimulatedBase::new();
        let mut driver = RobotDriver::with_config(base.channel(), base.odometry_source(), config);
        let err = driver
            .move_cyclically(1.0, 1.0, 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::InvalidRate(_)));
        assert!(base.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_base() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1050)).await;
            trigger.cancel();
        });

        let err = driver.move_cyclically(1.0, 1.0, 10, &cancel).await.unwrap_err();
        assert!(matches!(err, MotionError::Cancelled));

        let published = base.published();
        assert!(published.len() < 20);
        assert!(published.last().unwrap().is_stop());
    }
}
