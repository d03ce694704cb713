// One-shot caller of the circle-moving service

use std::time::Duration;

use tracing::info;

use crate::config::{
    CLIENT_TIMEOUT_CAP, CLIENT_TIMEOUT_MARGIN, RATE_HZ, REVOLUTIONS, STARTUP_DELAY,
};
use crate::messages::{ErrorReply, MotionRequest, MotionResponse, RequestError};
use crate::motion::tick_count;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Zenoh error: {0}")]
    Transport(String),

    #[error("No reply from {0} (is the server running?)")]
    NoReply(String),

    #[error("Service refused the request: {0}")]
    Rejected(String),

    #[error("Malformed reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// How long to wait for the reply to `request`
///
/// Covers the startup delay plus the open-loop maneuver at the server's default
/// settings, a quarter on top and a fixed margin. A call queued behind another
/// maneuver, or run with the segmented strategy, can outlast this: pass an
/// explicit timeout then.
pub fn reply_timeout(request: &MotionRequest) -> Duration {
    let maneuver = tick_count(request.radius, request.velocity, REVOLUTIONS, RATE_HZ)
        .map(|ticks| ticks as f64 / RATE_HZ)
        .unwrap_or(0.0);
    let expected = (STARTUP_DELAY.as_secs_f64() + maneuver) * 1.25;

    Duration::try_from_secs_f64(expected)
        .ok()
        .and_then(|expected| expected.checked_add(CLIENT_TIMEOUT_MARGIN))
        .map_or(CLIENT_TIMEOUT_CAP, |timeout| timeout.min(CLIENT_TIMEOUT_CAP))
}

/// Decode a successful reply
pub fn decode_response(payload: &[u8]) -> Result<MotionResponse, ClientError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Human-readable reason from an error reply
pub fn decode_rejection(payload: &[u8]) -> String {
    match serde_json::from_slice::<ErrorReply>(payload) {
        Ok(reply) => reply.error,
        Err(_) => String::from_utf8_lossy(payload).into_owned(),
    }
}

pub struct MotionClient {
    session: zenoh::Session,
    key: String,
    timeout: Duration,
}

impl MotionClient {
    pub fn new(session: zenoh::Session, key: &str, timeout: Duration) -> Self {
        Self {
            session,
            key: key.to_string(),
            timeout,
        }
    }

    /// Open a default zenoh session and target the service at `key`
    pub async fn connect(key: &str, timeout: Duration) -> Result<Self, ClientError> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self::new(session, key, timeout))
    }

    /// Send one request and wait for the service to finish it
    pub async fn invoke(&self, request: MotionRequest) -> Result<MotionResponse, ClientError> {
        request.validate()?;
        let payload = serde_json::to_string(&request)?;

        info!(
            "Calling {}: velocity={}, radius={}",
            self.key, request.velocity, request.radius
        );
        let replies = self
            .session
            .get(self.key.as_str())
            .payload(payload)
            .timeout(self.timeout)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let reply = replies
            .recv_async()
            .await
            .map_err(|_| ClientError::NoReply(self.key.clone()))?;
        match reply.result() {
            Ok(sample) => decode_response(&sample.payload().to_bytes()),
            Err(err) => Err(ClientError::Rejected(decode_rejection(
                &err.payload().to_bytes(),
            ))),
        }
    }

    pub async fn close(self) -> Result<(), ClientError> {
        self.session
            .close()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}
