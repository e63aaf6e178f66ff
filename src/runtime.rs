// 100 Hz telemetry loop + event-driven command ingestion
//
// Three tasks share one `Controller`:
// - commands: cmd_vel / lift samples share one queue and are handled one at a
//   time in arrival order
// - control loop: polls the link every tick and hands the outcome on
// - publisher: turns each outcome into the four telemetry signals
// Link transactions are blocking serial I/O, so they run on tokio's blocking pool.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

// local imports
use crate::config::{LOOP_HZ, LinkSettings, RobotConfig, TOPIC_CMD_VEL, TOPIC_HEALTH, TOPIC_LIFT};
use crate::control::{Controller, PollOutcome};
use crate::messages::{InboundCommand, LiftRequest, RuntimeHealth, VelocityCommand};
use crate::motor::{ActuatorLink, DoroBus, LinkError, SimulatedLink};
use crate::telemetry::{TelemetryPublisher, TelemetrySignals};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The link type chosen at startup (serial board or simulation)
pub type BoxedLink = Box<dyn ActuatorLink + Send>;

// Poll outcomes waiting to be published; a slow bus delays the loop once full
const TELEMETRY_QUEUE: usize = 8;

/// Open the configured actuator link
pub fn open_link(settings: &LinkSettings) -> Result<BoxedLink, LinkError> {
    if settings.simulate {
        info!("Using simulated motor board");
        return Ok(Box::new(SimulatedLink::new()));
    }
    Ok(Box::new(DoroBus::open(settings)?))
}

/// Run one velocity command to completion on the blocking pool.
///
/// A failed write only drops this command; it is logged and not retried.
pub async fn handle_velocity<L>(
    controller: &Controller<L>,
    cmd: VelocityCommand,
) -> Result<(), JoinError>
where
    L: ActuatorLink + Send + 'static,
{
    let c = controller.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || c.on_velocity(cmd)).await? {
        warn!("Velocity command dropped: {}", e);
    }
    Ok(())
}

/// Record a lift request
pub async fn handle_lift<L>(
    controller: &Controller<L>,
    request: LiftRequest,
) -> Result<(), JoinError>
where
    L: ActuatorLink + Send + 'static,
{
    // Waits for any in-flight transaction, so keep it off the async workers
    let c = controller.clone();
    tokio::task::spawn_blocking(move || c.on_lift(request)).await
}

/// Parse samples of one topic and push them onto the shared command queue
fn forward_samples<T>(
    tx: mpsc::UnboundedSender<InboundCommand>,
    wrap: fn(T) -> InboundCommand,
) -> impl Fn(Sample) + Send + Sync + 'static
where
    T: DeserializeOwned + 'static,
{
    move |sample: Sample| {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<T>(&payload) {
            Ok(value) => {
                // Receiver only goes away during shutdown
                let _ = tx.send(wrap(value));
            }
            Err(e) => warn!("Failed to parse {} sample: {}", sample.key_expr(), e),
        }
    }
}

/// `cmd_vel` and `lift` subscribers feeding one queue in arrival order.
///
/// The subscribers are undeclared when this is dropped.
pub struct CommandIngress {
    pub commands: mpsc::UnboundedReceiver<InboundCommand>,
    _subscribers: [Subscriber<()>; 2],
}

impl CommandIngress {
    pub async fn declare(session: &Session) -> Result<Self, BoxError> {
        let (tx, commands) = mpsc::unbounded_channel();

        let cmd_vel = session
            .declare_subscriber(TOPIC_CMD_VEL)
            .callback(forward_samples(tx.clone(), InboundCommand::Velocity))
            .await?;
        let lift = session
            .declare_subscriber(TOPIC_LIFT)
            .callback(forward_samples(tx, InboundCommand::Lift))
            .await?;

        Ok(Self {
            commands,
            _subscribers: [cmd_vel, lift],
        })
    }
}

/// Handle inbound commands one at a time, in the order they arrived.
///
/// Returns once every sender is gone.
pub async fn ingest_commands<L>(
    controller: Controller<L>,
    commands: &mut mpsc::UnboundedReceiver<InboundCommand>,
) -> Result<(), BoxError>
where
    L: ActuatorLink + Send + 'static,
{
    while let Some(command) = commands.recv().await {
        match command {
            InboundCommand::Velocity(cmd) => handle_velocity(&controller, cmd).await?,
            InboundCommand::Lift(request) => handle_lift(&controller, request).await?,
        }
    }
    Ok(())
}

/// Poll the link every `period` and forward each outcome.
///
/// A failed poll still yields an outcome (carrying the last known state), so
/// downstream sees exactly one outcome per tick. A tick that overruns delays
/// the next one instead of bursting to catch up. Returns once the receiver
/// is dropped.
pub async fn control_loop<L>(
    controller: Controller<L>,
    period: Duration,
    tx: mpsc::Sender<PollOutcome>,
) -> Result<(), BoxError>
where
    L: ActuatorLink + Send + 'static,
{
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        let c = controller.clone();
        let outcome = tokio::task::spawn_blocking(move || c.poll()).await?;

        if tx.send(outcome).await.is_err() {
            debug!("Telemetry receiver closed, stopping control loop");
            return Ok(());
        }
    }
}

async fn publish_telemetry(
    mut rx: mpsc::Receiver<PollOutcome>,
    telemetry: TelemetryPublisher,
    pub_health: Publisher<'static>,
) -> Result<(), BoxError> {
    let mut health = RuntimeHealth::Ok;

    while let Some(outcome) = rx.recv().await {
        telemetry
            .publish(&TelemetrySignals::from(&outcome.state))
            .await?;

        if outcome.health != health {
            health = outcome.health;
            pub_health.put(serde_json::to_string(&health)?).await?;
        }
    }
    Ok(())
}

fn task_exit(name: &str, res: Result<Result<(), BoxError>, JoinError>) -> Result<(), BoxError> {
    match res {
        Ok(Ok(())) => {
            warn!("{} task exited", name);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(e) => Err(e.into()),
    }
}

pub async fn run(config: RobotConfig) -> Result<(), BoxError> {
    info!(
        "Wheel radius: {} m, wheel separation: {} m",
        config.geometry.wheel_radius(),
        config.geometry.wheel_separation()
    );
    let link = open_link(&config.link)?;
    let controller = Controller::new(link, config.geometry);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let ingress = CommandIngress::declare(&session).await?;
    let telemetry = TelemetryPublisher::declare(&session).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let (tx, rx) = mpsc::channel(TELEMETRY_QUEUE);
    let period = Duration::from_millis(1000 / LOOP_HZ);

    let mut control: JoinHandle<Result<(), BoxError>> =
        tokio::spawn(control_loop(controller.clone(), period, tx));
    let mut publisher = tokio::spawn(publish_telemetry(rx, telemetry, pub_health));
    let command_controller = controller.clone();
    let mut commands = tokio::spawn(async move {
        let mut ingress = ingress;
        ingest_commands(command_controller, &mut ingress.commands).await
    });

    info!("Runtime started: {}Hz telemetry loop", LOOP_HZ);
    info!("Subscribed to: {}, {}", TOPIC_CMD_VEL, TOPIC_LIFT);

    let result = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            res.map_err(BoxError::from)
        }
        res = &mut commands => task_exit("Command", res),
        res = &mut control => task_exit("Control loop", res),
        res = &mut publisher => task_exit("Telemetry publisher", res),
    };

    commands.abort();
    control.abort();
    publisher.abort();

    // Leave the base stationary on the way out
    let stopper = controller.clone();
    match tokio::task::spawn_blocking(move || stopper.stop()).await {
        Ok(Ok(())) => info!("Wheels stopped"),
        Ok(Err(e)) => warn!("Failed to stop wheels on shutdown: {}", e),
        Err(e) => warn!("Stop task failed: {}", e),
    }

    result
}
