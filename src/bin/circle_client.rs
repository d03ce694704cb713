// Ask the server to drive circles: circle-client <velocity> <radius>
use std::time::Duration;

use clap::{CommandFactory, Parser, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use robot_circle_moving::client::{MotionClient, reply_timeout};
use robot_circle_moving::config::SERVICE_KEY;
use robot_circle_moving::messages::MotionRequest;

/// Request circular motion from the robot_circle_moving service
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Linear velocity in m/s; the sign picks the direction of travel
    #[arg(allow_negative_numbers = true)]
    velocity: f64,

    /// Circle radius in m
    #[arg(allow_negative_numbers = true)]
    radius: f64,

    #[arg(long, default_value = SERVICE_KEY)]
    service_key: String,

    /// Seconds to wait for the maneuver to finish [default: estimated from the request]
    #[arg(long)]
    timeout: Option<u64>,
}

impl Args {
    /// The request to send; bad values never leave the client
    fn request(&self) -> Result<MotionRequest, clap::Error> {
        let request = MotionRequest::new(self.velocity, self.radius);
        request
            .validate()
            .map_err(|e| Args::command().error(ErrorKind::ValueValidation, e))?;
        Ok(request)
    }

    fn timeout(&self, request: &MotionRequest) -> Duration {
        self.timeout
            .map_or_else(|| reply_timeout(request), Duration::from_secs)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let request = args.request().unwrap_or_else(|e| e.exit());
    let timeout = args.timeout(&request);

    let result = async {
        let client = MotionClient::connect(&args.service_key, timeout).await?;
        let response = client.invoke(request).await;
        client.close().await?;
        response
    }
    .await;

    match result {
        Ok(response) => println!("Sum: {}", response.sum),
        Err(e) => {
            eprintln!("Failed to call service {}: {}", args.service_key, e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_numeric_arguments_rejected() {
        let err = Args::try_parse_from(["circle-client", "abc", "5"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        let err = Args::try_parse_from(["circle-client", "2", "wide"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_missing_arguments_rejected() {
        let err = Args::try_parse_from(["circle-client", "2"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert!(Args::try_parse_from(["circle-client"]).is_err());
    }

    #[test]
    fn test_negative_velocity_parses() {
        let args = Args::try_parse_from(["circle-client", "-2", "5"]).unwrap();
        assert_eq!(args.request().unwrap(), MotionRequest::new(-2.0, 5.0));
        assert_eq!(args.service_key, SERVICE_KEY);
    }

    #[test]
    fn test_zero_values_stay_client_side() {
        let args = Args::try_parse_from(["circle-client", "0", "5"]).unwrap();
        assert_eq!(args.request().unwrap_err().kind(), ErrorKind::ValueValidation);
        let args = Args::try_parse_from(["circle-client", "2", "0"]).unwrap();
        assert_eq!(args.request().unwrap_err().kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_timeout_defaults_to_estimate() {
        let args = Args::try_parse_from(["circle-client", "1", "10"]).unwrap();
        let request = args.request().unwrap();
        assert_eq!(args.timeout(&request), reply_timeout(&request));
        assert!(args.timeout(&request) > Duration::from_secs(633));

        let args = Args::try_parse_from(["circle-client", "1", "10", "--timeout", "30"]).unwrap();
        assert_eq!(args.timeout(&request), Duration::from_secs(30));
    }
}
