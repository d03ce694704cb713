// Zenoh side of the server: queryable for circle requests, state publisher,
// and (with --simulate) a simulated base publishing its odometry

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{MotionConfig, SERVICE_KEY, TOPIC_CMD_VEL, TOPIC_STATE, TOPIC_TF};
use crate::messages::{ErrorReply, MotionRequest, MotionState};
use crate::motion::{Rate, RobotDriver, VelocityChannel, ZenohVelocityChannel};
use crate::service::{MotionService, ServiceConfig};
use crate::sim::SimulatedBase;
use crate::transform::{TransformBuffer, TransformSource};

// How long a cancelled motion gets to publish its stop command on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Everything the server binary can be told
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub service: ServiceConfig,
    pub motion: MotionConfig,
    pub service_key: String,
    pub cmd_vel_key: String,
    pub tf_key: String,
    pub state_key: String,
    /// Drive a simulated base instead of publishing on cmd_vel
    pub simulate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            motion: MotionConfig::default(),
            service_key: SERVICE_KEY.to_string(),
            cmd_vel_key: TOPIC_CMD_VEL.to_string(),
            tf_key: TOPIC_TF.to_string(),
            state_key: TOPIC_STATE.to_string(),
            simulate: false,
        }
    }
}

/// Parse a query payload into a request
pub fn decode_request(payload: Option<&[u8]>) -> Result<MotionRequest, String> {
    let bytes = payload.ok_or_else(|| "missing request payload".to_string())?;
    serde_json::from_slice(bytes).map_err(|e| format!("malformed request: {}", e))
}

pub async fn run(options: ServerOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    if options.simulate {
        info!("Simulating the base; odometry published on {}", options.tf_key);
        let base = SimulatedBase::with_rate(options.motion.rate_hz);
        publish_simulated_odometry(&session, base.clone(), &options).await?;
        serve(&session, base.driver_with(options.motion.clone()), &options).await
    } else {
        info!("Setting up publishers and subscribers...");
        let channel = ZenohVelocityChannel::declare(&session, &options.cmd_vel_key).await?;
        let transforms = TransformBuffer::listen(&session, &options.tf_key).await?;
        info!("Publishing velocity commands to: {}", options.cmd_vel_key);
        let driver = RobotDriver::with_config(channel, transforms, options.motion.clone());
        serve(&session, driver, &options).await
    }
}

async fn serve<C, T>(
    session: &zenoh::Session,
    driver: RobotDriver<C, T>,
    options: &ServerOptions,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    C: VelocityChannel + 'static,
    T: TransformSource + 'static,
{
    let service = Arc::new(MotionService::new(driver, options.service.clone()));
    let queryable = session.declare_queryable(options.service_key.clone()).await?;
    let pub_state = session.declare_publisher(options.state_key.clone()).await?;

    // Publish the current state, then every transition
    let mut state_rx = service.subscribe();
    tokio::spawn(async move {
        loop {
            let state = *state_rx.borrow_and_update();
            match serde_json::to_string(&state) {
                Ok(json) => {
                    if let Err(e) = pub_state.put(json).await {
                        warn!("Failed to publish state: {}", e);
                    }
                }
                Err(e) => warn!("Failed to encode state: {}", e),
            }
            if state_rx.changed().await.is_err() {
                break;
            }
        }
    });

    info!(
        "Ready to move robot: service {}, {}, {} revolutions, {:?} startup delay",
        options.service_key,
        options.service.strategy,
        options.service.revolutions,
        options.service.startup_delay
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            query = queryable.recv_async() => {
                let query = match query {
                    Ok(query) => query,
                    Err(e) => {
                        warn!("Service queryable closed: {}", e);
                        break;
                    }
                };
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = answer(&service, query).await {
                        warn!("Failed to answer request: {}", e);
                    }
                });
            }
        }
    }

    // Let a running motion stop the base before the session goes away
    service.shutdown();
    let mut state_rx = service.subscribe();
    let idle = state_rx.wait_for(|state| *state == MotionState::Idle);
    if tokio::time::timeout(SHUTDOWN_GRACE, idle).await.is_err() {
        warn!("Motion still running after {:?}", SHUTDOWN_GRACE);
    }
    Ok(())
}

async fn answer<C, T>(
    service: &MotionService<C, T>,
    query: zenoh::query::Query,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    C: VelocityChannel + 'static,
    T: TransformSource + 'static,
{
    let payload = query.payload().map(|p| p.to_bytes());
    let outcome = match decode_request(payload.as_deref()) {
        Ok(request) => service.handle(request).await.map_err(|e| e.to_string()),
        Err(reason) => Err(reason),
    };

    match outcome {
        Ok(response) => {
            let json = serde_json::to_string(&response)?;
            query.reply(query.key_expr().clone(), json).await?;
        }
        Err(error) => {
            warn!("Refusing request: {}", error);
            let json = serde_json::to_string(&ErrorReply { error })?;
            query.reply_err(json).await?;
        }
    }
    Ok(())
}

async fn publish_simulated_odometry(
    session: &zenoh::Session,
    base: SimulatedBase,
    options: &ServerOptions,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let publisher = session.declare_publisher(options.tf_key.clone()).await?;
    let odom_frame = options.motion.odom_frame.clone();
    let robot_frame = options.motion.robot_frame.clone();
    let mut rate = Rate::new(options.motion.rate_hz)?;

    tokio::spawn(async move {
        loop {
            rate.sleep().await;
            let msg = base.odometry().to_message(&odom_frame, &robot_frame);
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode odometry: {}", e);
                    continue;
                }
            };
            if let Err(e) = publisher.put(json).await {
                debug!("Failed to publish odometry: {}", e);
            }
        }
    });
    Ok(())
}
