// Motion service: Idle/Busy state machine around the robot driver
//
// One motion runs at a time. Each accepted request is executed as its own
// tokio task holding the driver; the handler awaits the task and answers with
// the fixed acknowledgement whatever the motion's outcome.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{REVOLUTIONS, STARTUP_DELAY};
use crate::messages::{MotionRequest, MotionResponse, MotionState, RequestError};
use crate::motion::{CircleStrategy, MotionError, RobotDriver, VelocityChannel};
use crate::transform::TransformSource;

/// What to do with a request that arrives mid-motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BusyPolicy {
    /// Wait for the running motion to finish, then run
    #[default]
    Queue,
    /// Refuse immediately
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Pause between accepting a request and moving
    pub startup_delay: Duration,
    pub revolutions: u32,
    pub strategy: CircleStrategy,
    pub busy_policy: BusyPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            startup_delay: STARTUP_DELAY,
            revolutions: REVOLUTIONS,
            strategy: CircleStrategy::default(),
            busy_policy: BusyPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("A circle motion is already in progress")]
    Busy,
}

pub struct MotionService<C, T> {
    driver: Arc<Mutex<RobotDriver<C, T>>>,
    config: ServiceConfig,
    state: watch::Sender<MotionState>,
    shutdown: CancellationToken,
    current: std::sync::Mutex<Option<CancellationToken>>,
}

impl<C, T> MotionService<C, T>
where
    C: VelocityChannel + 'static,
    T: TransformSource + 'static,
{
    pub fn new(driver: RobotDriver<C, T>, config: ServiceConfig) -> Self {
        let (state, _) = watch::channel(MotionState::Idle);
        Self {
            driver: Arc::new(Mutex::new(driver)),
            config,
            state,
            shutdown: CancellationToken::new(),
            current: std::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> MotionState {
        *self.state.borrow()
    }

    /// Follow Idle/Busy transitions
    pub fn subscribe(&self) -> watch::Receiver<MotionState> {
        self.state.subscribe()
    }

    /// Execute one circle request to completion
    pub async fn handle(&self, request: MotionRequest) -> Result<MotionResponse, ServiceError> {
        request.validate()?;

        let driver = match self.config.busy_policy {
            BusyPolicy::Queue => self.driver.clone().lock_owned().await,
            BusyPolicy::Reject => self
                .driver
                .clone()
                .try_lock_owned()
                .map_err(|_| ServiceError::Busy)?,
        };

        let cancel = self.shutdown.child_token();
        self.set_current(Some(cancel.clone()));
        self.state.send_replace(MotionState::Busy);
        info!(
            "Accepted request: velocity={}m/s, radius={}m ({})",
            request.velocity, request.radius, self.config.strategy
        );

        let task = tokio::spawn(run_motion(driver, request, self.config.clone(), cancel));
        match task.await {
            Ok(Ok(())) => info!("Request finished"),
            Ok(Err(e)) => warn!("Motion did not complete: {}", e),
            Err(e) => error!("Motion task died: {}", e),
        }

        self.set_current(None);
        self.state.send_replace(MotionState::Idle);
        Ok(MotionResponse::ACK)
    }

    /// Abort the motion in progress, if any; the base is stopped
    pub fn cancel_current(&self) {
        if let Some(cancel) = self.current.lock().unwrap_or_else(PoisonError::into_inner).as_ref()
        {
            cancel.cancel();
        }
    }

    /// Abort the current motion and any queued or future one
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn set_current(&self, cancel: Option<CancellationToken>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = cancel;
    }
}

async fn run_motion<C, T>(
    mut driver: OwnedMutexGuard<RobotDriver<C, T>>,
    request: MotionRequest,
    config: ServiceConfig,
    cancel: CancellationToken,
) -> Result<(), MotionError>
where
    C: VelocityChannel,
    T: TransformSource,
{
    if !config.startup_delay.is_zero() {
        info!("Starting in {:?}", config.startup_delay);
        tokio::select! {
            _ = cancel.cancelled() => return Err(MotionError::Cancelled),
            _ = tokio::time::sleep(config.startup_delay) => {}
        }
    }

    config
        .strategy
        .execute(&mut *driver, &request, config.revolutions, &cancel)
        .await
}
