// Closed-loop segments driven against odometry
//
// Both routines publish a constant command at the driver rate and poll the
// robot <- odom transform after every period until the measured displacement
// or rotation exceeds the goal. A lookup failure stops the base and aborts.

use std::f64::consts::PI;

use nalgebra::Vector3;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::channel::VelocityChannel;
use super::driver::{MotionError, Result, RobotDriver};
use crate::messages::{MotionRequest, VelocityCommand};
use crate::transform::{StampedTransform, TransformSource};

/// Wrap an angle into [0, 2π)
pub fn normalize_angle(radians: f64) -> f64 {
    let wrapped = radians.rem_euclid(2.0 * PI);
    // rem_euclid can round up to exactly 2π for tiny negative inputs
    if wrapped >= 2.0 * PI { 0.0 } else { wrapped }
}

/// Chord length and turn angle of one of `segments` sides of a circle
pub fn segment_geometry(radius: f64, segments: u32) -> (f64, f64) {
    let n = f64::from(segments);
    (2.0 * radius.abs() * (PI / n).sin(), 2.0 * PI / n)
}

impl<C: VelocityChannel, T: TransformSource> RobotDriver<C, T> {
    /// Publish, wait a period, then read odometry; stops the base on any failure
    async fn step_and_observe(
        &mut self,
        cmd: &VelocityCommand,
        rate: &mut super::rate::Rate,
        cancel: &CancellationToken,
    ) -> Result<StampedTransform> {
        if let Err(e) = self.publish(cmd).await {
            self.stop_quietly().await;
            return Err(e);
        }
        self.sleep_or_cancel(rate, cancel).await?;

        match self.lookup_odometry() {
            Ok(current) => Ok(current),
            Err(e) => {
                error!("{}", e);
                self.stop_quietly().await;
                Err(e.into())
            }
        }
    }

    /// Drive straight until odometry shows more than `distance` meters moved
    ///
    /// Returns the measured displacement.
    pub async fn drive_forward_odom(
        &mut self,
        distance: f64,
        velocity: f64,
        cancel: &CancellationToken,
    ) -> Result<f64> {
        let start = self.start_odometry().await.inspect_err(|e| error!("{}", e))?;
        let cmd = VelocityCommand::new(velocity, 0.0);
        let mut rate = self.rate()?;
        debug!("Driving {}m at {}m/s", distance, velocity);

        loop {
            let current = self.step_and_observe(&cmd, &mut rate, cancel).await?;
            let moved = start.relative_to(&current).translation.vector.norm();
            if moved > distance {
                return Ok(moved);
            }
        }
    }

    /// Turn in place until odometry shows more than `radians` turned
    ///
    /// The goal is wrapped into [0, 2π). Returns the measured angle.
    pub async fn turn_odom(
        &mut self,
        clockwise: bool,
        radians: f64,
        cancel: &CancellationToken,
    ) -> Result<f64> {
        let goal = normalize_angle(radians);
        let speed = self.config().turn_speed;
        let noise_floor = self.config().angle_noise_floor;

        let cmd = VelocityCommand::new(0.0, if clockwise { -speed } else { speed });
        // robot <- odom rotates opposite to the robot
        let desired_axis: Vector3<f64> = if clockwise {
            Vector3::z()
        } else {
            -Vector3::z()
        };

        let start = self.start_odometry().await.inspect_err(|e| error!("{}", e))?;
        let mut rate = self.rate()?;
        debug!("Turning {} rad, clockwise={}", goal, clockwise);

        loop {
            let current = self.step_and_observe(&cmd, &mut rate, cancel).await?;
            let relative = start.relative_to(&current);
            let Some((axis, mut turned)) = relative.rotation.axis_angle() else {
                continue;
            };
            if turned.abs() < noise_floor {
                continue;
            }
            // axis-angle is ambiguous past π; the axis tells which way we went
            if axis.dot(&desired_axis) < 0.0 {
                turned = 2.0 * PI - turned;
            }
            if turned > goal {
                return Ok(turned);
            }
        }
    }

    /// Approximate `times` circles with `segments` drive-then-turn steps each
    pub async fn move_segmented(
        &mut self,
        radius: f64,
        velocity: f64,
        times: u32,
        segments: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        MotionRequest::new(velocity, radius).validate()?;
        if segments < 3 {
            return Err(MotionError::InvalidSegments(segments));
        }

        let (chord, turn) = segment_geometry(radius, segments);
        // Same turning direction as the open-loop command v / r
        let clockwise = velocity / radius < 0.0;
        info!(
            "Moving in segmented circles: {} revolutions of {} segments ({:.3}m, {:.3}rad)",
            times, segments, chord, turn
        );

        for _ in 0..times {
            for _ in 0..segments {
                self.drive_forward_odom(chord, velocity, cancel).await?;
                self.turn_odom(clockwise, turn, cancel).await?;
            }
        }

        self.stop().await?;
        info!("Segmented circle motion complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionConfig;
    use crate::sim::SimulatedBase;
    use crate::transform::TransformError;

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-9);
        assert!((normalize_angle(-PI / 2.0) - 1.5 * PI).abs() < 1e-9);
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!(normalize_angle(2.0 * PI) < 1e-9);
        assert!(normalize_angle(-1e-18) < 2.0 * PI);
    }

    #[test]
    fn test_segment_geometry() {
        let (chord, turn) = segment_geometry(1.0, 4);
        assert!((chord - 2.0_f64.sqrt()).abs() < 1e-9);
        assert!((turn - PI / 2.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_forward_stops_at_first_exceedance() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();

        // 0.05m per tick: 19 ticks = 0.95, 20 ticks = 1.0
        let moved = driver
            .drive_forward_odom(0.98, 0.5, &CancellationToken::new())
            .await
            .unwrap();
        assert!(moved > 0.98 && moved < 1.01, "moved {moved}");

        let published = base.published();
        assert_eq!(published.len(), 20);
        assert!(published.iter().all(|c| c.linear_x == 0.5 && c.angular_z == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_forward_fails_on_lookup_error() {
        let base = SimulatedBase::new();
        // Start snapshot plus two readings succeed
        base.fail_lookups_after(3);
        let mut driver = base.driver();

        let err = driver
            .drive_forward_odom(10.0, 0.5, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MotionError::Transform(TransformError::Source(_))
        ));

        let published = base.published();
        assert_eq!(published.len(), 4);
        assert!(published[..3].iter().all(|c| c.linear_x == 0.5));
        assert!(published[3].is_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_forward_without_odometry() {
        let base = SimulatedBase::new();
        base.fail_lookups_after(0);
        let mut driver = base.driver();

        let err = driver
            .drive_forward_odom(1.0, 0.5, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::Transform(_)));
        assert!(base.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_counter_clockwise() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();

        // 0.075 rad per tick: 21 ticks to pass π/2
        let turned = driver
            .turn_odom(false, PI / 2.0, &CancellationToken::new())
            .await
            .unwrap();
        assert!((turned - 1.575).abs() < 1e-6, "turned {turned}");

        let published = base.published();
        assert_eq!(published.len(), 21);
        assert!(published.iter().all(|c| c.angular_z == 0.75));
        assert!(base.pose().2 > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_past_half_circle_uses_wrapped_goal() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();

        // 3π wraps to π; readings past π only count thanks to the axis check
        let turned = driver
            .turn_odom(true, 3.0 * PI, &CancellationToken::new())
            .await
            .unwrap();
        assert!((turned - 3.15).abs() < 1e-6, "turned {turned}");

        let published = base.published();
        assert_eq!(published.len(), 42);
        assert!(published.iter().all(|c| c.angular_z == -0.75));
        assert!(base.pose().2 < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_ignores_noise_floor() {
        let base = SimulatedBase::new();
        let config = MotionConfig {
            turn_speed: 0.04,
            ..MotionConfig::default()
        };
        let mut driver = base.driver_with(config);

        // Goal 0 is passed by the first reading above 1e-2: 0.004, 0.008, 0.012
        let turned = driver
            .turn_odom(false, 2.0 * PI, &CancellationToken::new())
            .await
            .unwrap();
        assert!(turned > 0.01);
        assert_eq!(base.published().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_fails_on_lookup_error() {
        let base = SimulatedBase::new();
        base.fail_lookups_after(5);
        let mut driver = base.driver();

        let err = driver
            .turn_odom(false, PI, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::Transform(_)));
        assert!(base.published().last().unwrap().is_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_segmented_square() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();

        // Per side: 15 ticks to pass √2 at 0.1m/tick, 21 ticks to pass π/2
        driver
            .move_segmented(1.0, 1.0, 1, 4, &CancellationToken::new())
            .await
            .unwrap();

        let published = base.published();
        assert_eq!(published.len(), 4 * (15 + 21) + 1);
        assert!(published.last().unwrap().is_stop());
        assert!(published[..15].iter().all(|c| c.linear_x == 1.0));
        assert!(published[15..36].iter().all(|c| c.angular_z == 0.75));
    }

    #[tokio::test(start_paused = true)]
    async fn test_segmented_rejects_degenerate_polygon() {
        let base = SimulatedBase::new();
        let mut driver = base.driver();

        let err = driver
            .move_segmented(1.0, 1.0, 1, 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::InvalidSegments(2)));
    }
}
