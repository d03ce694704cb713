use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use robot_circle_moving::config::{
    MotionConfig, RATE_HZ, REVOLUTIONS, SEGMENTS_PER_REVOLUTION, SERVICE_KEY, STARTUP_DELAY,
    TOPIC_CMD_VEL, TOPIC_STATE, TOPIC_TF,
};
use robot_circle_moving::motion::CircleStrategy;
use robot_circle_moving::runtime::{self, ServerOptions};
use robot_circle_moving::service::{BusyPolicy, ServiceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Strategy {
    /// Constant curvature, no feedback
    OpenLoop,
    /// Odometry-checked polygon
    Segmented,
}

/// Serve circle-moving requests for a wheeled base
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Seconds to wait after accepting a request before moving
    #[arg(long, default_value_t = Seconds(STARTUP_DELAY))]
    startup_delay: Seconds,

    /// Circles driven per request
    #[arg(long, default_value_t = REVOLUTIONS)]
    revolutions: u32,

    #[arg(long, value_enum, default_value_t = Strategy::OpenLoop)]
    strategy: Strategy,

    /// Polygon sides per circle for the segmented strategy
    #[arg(long, default_value_t = SEGMENTS_PER_REVOLUTION)]
    segments: u32,

    /// What to do with requests arriving mid-motion
    #[arg(long, value_enum, default_value_t = BusyPolicy::Queue)]
    busy_policy: BusyPolicy,

    /// Velocity publish rate (Hz)
    #[arg(long, default_value_t = RATE_HZ, value_parser = parse_rate)]
    rate: f64,

    /// Drive a simulated base and publish its odometry
    #[arg(long)]
    simulate: bool,

    #[arg(long, default_value = SERVICE_KEY)]
    service_key: String,

    #[arg(long, default_value = TOPIC_CMD_VEL)]
    cmd_vel_key: String,

    #[arg(long, default_value = TOPIC_TF)]
    tf_key: String,

    #[arg(long, default_value = TOPIC_STATE)]
    state_key: String,
}

/// A duration given on the command line as (fractional) seconds
#[derive(Debug, Clone, Copy, PartialEq)]
struct Seconds(Duration);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_secs_f64())
    }
}

impl FromStr for Seconds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
        Duration::try_from_secs_f64(secs)
            .map(Seconds)
            .map_err(|e| format!("{e}"))
    }
}

fn parse_rate(s: &str) -> Result<f64, String> {
    let hz: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if hz > 0.0 && hz.is_finite() {
        Ok(hz)
    } else {
        Err("rate must be positive".to_string())
    }
}

impl From<Args> for ServerOptions {
    fn from(args: Args) -> Self {
        let strategy = match args.strategy {
            Strategy::OpenLoop => CircleStrategy::OpenLoopCyclic,
            Strategy::Segmented => CircleStrategy::ClosedLoopSegmented {
                segments: args.segments,
            },
        };
        Self {
            service: ServiceConfig {
                startup_delay: args.startup_delay.0,
                revolutions: args.revolutions,
                strategy,
                busy_policy: args.busy_policy,
            },
            motion: MotionConfig {
                rate_hz: args.rate,
                ..MotionConfig::default()
            },
            service_key: args.service_key,
            cmd_vel_key: args.cmd_vel_key,
            tf_key: args.tf_key,
            state_key: args.state_key,
            simulate: args.simulate,
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(e) = runtime::run(args.into()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
