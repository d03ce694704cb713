// Odometry transforms: lookup interface plus a zenoh-fed buffer
//
// Transforms follow the usual convention: looking up (target, source) yields the
// pose of the source frame expressed in the target frame.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::messages::TransformStamped;

/// Poll period while waiting for a transform to appear
const WAIT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("no transform {target_frame} <- {source_frame} available")]
    Unavailable {
        target_frame: String,
        source_frame: String,
    },

    #[error("timed out after {waited:?} waiting for transform {target_frame} <- {source_frame}")]
    Timeout {
        target_frame: String,
        source_frame: String,
        waited: Duration,
    },

    #[error("transform source failed: {0}")]
    Source(String),
}

/// A rigid-body transform snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedTransform {
    pub transform: Isometry3<f64>,
    /// Seconds
    pub stamp: f64,
}

impl StampedTransform {
    pub fn new(transform: Isometry3<f64>, stamp: f64) -> Self {
        Self { transform, stamp }
    }

    pub fn inverse(&self) -> Self {
        Self::new(self.transform.inverse(), self.stamp)
    }

    /// Transform taking `self` to `current`: self⁻¹ · current
    pub fn relative_to(&self, current: &StampedTransform) -> Isometry3<f64> {
        self.transform.inverse() * current.transform
    }

    pub fn to_message(&self, frame_id: &str, child_frame_id: &str) -> TransformStamped {
        let t = self.transform.translation.vector;
        let q = self.transform.rotation.quaternion();
        TransformStamped {
            frame_id: frame_id.to_string(),
            child_frame_id: child_frame_id.to_string(),
            translation: [t.x, t.y, t.z],
            rotation: [q.i, q.j, q.k, q.w],
            stamp: self.stamp,
        }
    }
}

impl From<&TransformStamped> for StampedTransform {
    fn from(msg: &TransformStamped) -> Self {
        let [x, y, z] = msg.translation;
        let [qx, qy, qz, qw] = msg.rotation;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz));
        Self::new(
            Isometry3::from_parts(Translation3::new(x, y, z), rotation),
            msg.stamp,
        )
    }
}

/// Where the closed-loop routines read the robot's pose from
pub trait TransformSource: Send + Sync {
    /// Latest transform of `source_frame` in `target_frame`
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<StampedTransform, TransformError>;

    /// Block until the transform can be looked up, or `timeout` passes
    fn wait_for_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransformError>> + Send {
        async move {
            let deadline = Instant::now() + timeout;
            loop {
                if self.lookup_transform(target_frame, source_frame).is_ok() {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(TransformError::Timeout {
                        target_frame: target_frame.to_string(),
                        source_frame: source_frame.to_string(),
                        waited: timeout,
                    });
                }
                sleep(WAIT_POLL).await;
            }
        }
    }
}

type FramePair = (String, String);

/// Keeps the latest transform per (parent, child) frame pair
#[derive(Debug, Clone, Default)]
pub struct TransformBuffer {
    latest: Arc<Mutex<HashMap<FramePair, StampedTransform>>>,
}

impl TransformBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `key` and feed every parsed transform into a new buffer
    pub async fn listen(session: &zenoh::Session, key: &str) -> Result<Self, zenoh::Error> {
        let subscriber = session.declare_subscriber(key.to_string()).await?;
        let buffer = Self::new();
        let feed = buffer.clone();
        info!("Listening for transforms on {}", key);

        tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<TransformStamped>(&payload) {
                    Ok(msg) => feed.insert(&msg),
                    Err(e) => warn!("Failed to parse transform: {}", e),
                }
            }
            debug!("Transform subscriber closed");
        });

        Ok(buffer)
    }

    pub fn insert(&self, msg: &TransformStamped) {
        let key = (msg.frame_id.clone(), msg.child_frame_id.clone());
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, StampedTransform::from(msg));
    }
}

impl TransformSource for TransformBuffer {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<StampedTransform, TransformError> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);

        let direct = (target_frame.to_string(), source_frame.to_string());
        if let Some(tf) = latest.get(&direct) {
            return Ok(*tf);
        }
        let reverse = (source_frame.to_string(), target_frame.to_string());
        if let Some(tf) = latest.get(&reverse) {
            return Ok(tf.inverse());
        }

        Err(TransformError::Unavailable {
            target_frame: target_frame.to_string(),
            source_frame: source_frame.to_string(),
        })
    }
}
