// 100 Hz control loop with watchdog
//
// Each period: drain velocity commands from zenoh, fall back to zero when
// they go stale, run one driver cycle (read then write), publish joint state
// and health. The driver is moved onto a blocking worker for each cycle and
// handed back afterwards, so exactly one owner ever touches the serial link,
// and the recovery cooldown stalls the loop rather than the async executor.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{DriverConfig, CMD_TIMEOUT, LOOP_HZ, TOPIC_CMD_JOINTS, TOPIC_HEALTH, TOPIC_STATE_JOINTS};
use crate::kangaroo::{ControllerLink, DriverState, DualChannelDriver, FaultReport, KangarooSerial, Wait};
use crate::messages::{DriverHealth, JointState, JointVelocityCommand};

pub struct Runtime {
    latest_cmd: Option<JointVelocityCommand>,
    cmd_received_at: Instant,
    health: DriverHealth,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: DriverHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> DriverHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: JointVelocityCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Velocity to send this cycle, zero when the watchdog has tripped
    pub fn compute_command(&mut self) -> [f64; 2] {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            if self.health == DriverHealth::Ok {
                warn!("Command stale ({:?} old), stopping joints", cmd_age);
            }
            self.health = DriverHealth::CmdStale;
            [0.0, 0.0]
        } else if let Some(cmd) = self.latest_cmd {
            self.health = DriverHealth::Ok;
            cmd.velocity
        } else {
            self.health = DriverHealth::CmdStale;
            [0.0, 0.0]
        }
    }

    /// Fold the outcome of a driver cycle into the published health
    pub fn on_cycle(&mut self, outcome: &Result<DriverState, FaultReport>) {
        if outcome.is_err() {
            self.health = DriverHealth::Recovering;
        }
    }
}

/// One read/write pass over the driver
pub fn cycle<L: ControllerLink, W: Wait>(
    driver: &mut DualChannelDriver<L, W>,
    command: [f64; 2],
) -> Result<DriverState, FaultReport> {
    // A dropped command is tolerated; only the status queries trigger recovery
    if let Err(e) = driver.read(command) {
        debug!("Command not delivered this cycle: {}", e);
    }
    driver.write()?;
    Ok(driver.snapshot())
}

/// Wait for the next period; false once `shutdown` has resolved
///
/// `shutdown` is polled in place and must outlive the loop, so a signal that
/// arrives while a cycle is running is still seen at the next wait.
async fn next_cycle<F: Future + Unpin>(tick: &mut Interval, shutdown: &mut F) -> bool {
    tokio::select! {
        biased;
        _ = shutdown => {
            info!("Shutting down");
            false
        }
        _ = tick.tick() => true,
    }
}

pub async fn run(config: DriverConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;

    info!(
        "Opening Kangaroo on {} at {} baud",
        config.serial_port, config.baud_rate
    );
    let link = KangarooSerial::open(&config.serial_port, config.baud_rate)?;
    let ticks_per_rev = config.ticks_per_rev;
    let mut driver =
        tokio::task::spawn_blocking(move || DualChannelDriver::new(link, ticks_per_rev)).await??;

    let (returned, limits) = tokio::task::spawn_blocking(move || {
        let limits = driver.travel_limits();
        (driver, limits)
    })
    .await?;
    driver = returned;
    for (name, limit) in config.joint_names.iter().zip(limits) {
        match limit {
            Ok((lower, upper)) => info!("{} travel: {:.3} to {:.3} rad", name, lower, upper),
            Err(e) => warn!("{} travel limits unavailable: {}", name, e),
        }
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_JOINTS).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_JOINTS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    // After a cooldown, resume on schedule instead of bursting missed cycles
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Driver started: {}Hz loop, {}ms watchdog timeout, joints {:?}",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        config.joint_names
    );
    info!("Subscribed to: {}", TOPIC_CMD_JOINTS);
    info!("Publishing to: {}, {}", TOPIC_STATE_JOINTS, TOPIC_HEALTH);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    while next_cycle(&mut tick, &mut shutdown).await {

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<JointVelocityCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Compute command (includes watchdog logic)
        let command = runtime.compute_command();

        // 3. Drive the hardware on a blocking worker
        let (returned, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = cycle(&mut driver, command);
            (driver, outcome)
        })
        .await?;
        driver = returned;
        runtime.on_cycle(&outcome);

        // 4. Publish joint state
        let state = JointState::new(&config.joint_names, &driver.snapshot());
        pub_state.put(serde_json::to_string(&state)?).await?;

        // 5. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }

    // Dropping the driver commands both channels to zero
    tokio::task::spawn_blocking(move || drop(driver)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kangaroo::testing::ScriptedLink;
    use crate::kangaroo::{ChannelAddress, ControllerErrorKind};

    #[test]
    fn test_starts_stale() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.compute_command(), [0.0, 0.0]);
        assert_eq!(runtime.health(), DriverHealth::CmdStale);
    }

    #[test]
    fn test_fresh_command_passes_through() {
        let mut runtime = Runtime::new();
        runtime.on_command(JointVelocityCommand {
            velocity: [0.5, -0.5],
        });
        assert_eq!(runtime.compute_command(), [0.5, -0.5]);
        assert_eq!(runtime.health(), DriverHealth::Ok);
    }

    #[test]
    fn test_watchdog_zeroes_stale_command() {
        let mut runtime = Runtime::new();
        runtime.on_command(JointVelocityCommand {
            velocity: [1.0, 1.0],
        });
        runtime.cmd_received_at = Instant::now() - CMD_TIMEOUT - Duration::from_millis(1);

        assert_eq!(runtime.compute_command(), [0.0, 0.0]);
        assert_eq!(runtime.health(), DriverHealth::CmdStale);
    }

    #[test]
    fn test_cycle_reports_fault_as_recovering() {
        let link = ScriptedLink::new();
        link.push_value(ChannelAddress::ONE, 0);
        link.push_value(ChannelAddress::TWO, 0);
        let mut driver = DualChannelDriver::with_wait(link.clone(), 4096, link.wait()).unwrap();

        link.push_value(ChannelAddress::ONE, 1000);
        link.push_fault(ChannelAddress::TWO, ControllerErrorKind::SerialTimeout);

        let mut runtime = Runtime::new();
        runtime.on_command(JointVelocityCommand {
            velocity: [0.1, 0.1],
        });
        let command = runtime.compute_command();
        let outcome = cycle(&mut driver, command);
        runtime.on_cycle(&outcome);

        assert!(outcome.is_err());
        assert_eq!(runtime.health(), DriverHealth::Recovering);
    }

    #[test]
    fn test_cycle_returns_snapshot() {
        let link = ScriptedLink::new();
        link.push_value(ChannelAddress::ONE, 0);
        link.push_value(ChannelAddress::TWO, 0);
        let mut driver = DualChannelDriver::with_wait(link.clone(), 4096, link.wait()).unwrap();
        // position then velocity, per channel
        link.push_value(ChannelAddress::ONE, 2048);
        link.push_value(ChannelAddress::ONE, 0);
        link.push_value(ChannelAddress::TWO, 2048);
        link.push_value(ChannelAddress::TWO, 0);

        let state = cycle(&mut driver, [0.0, 0.0]).unwrap();
        assert!((state.position[0] - std::f64::consts::PI).abs() < 1e-9);
        assert!((state.position[1] + std::f64::consts::PI).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shutdown_during_cycle_stops_loop() {
        let (stop, mut shutdown) = tokio::sync::oneshot::channel::<()>();
        let mut tick = interval(Duration::from_secs(3600));

        // First tick is immediate
        assert!(next_cycle(&mut tick, &mut shutdown).await);

        // Signal lands while the cycle is busy, not while we are waiting
        stop.send(()).unwrap();
        assert!(!next_cycle(&mut tick, &mut shutdown).await);
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_ready_tick() {
        let (stop, mut shutdown) = tokio::sync::oneshot::channel::<()>();
        let mut tick = interval(Duration::from_millis(1));
        stop.send(()).unwrap();

        // The immediate first tick is ready too
        assert!(!next_cycle(&mut tick, &mut shutdown).await);
    }

    #[tokio::test]
    async fn test_pending_shutdown_keeps_ticking() {
        let (_stop, mut shutdown) = tokio::sync::oneshot::channel::<()>();
        let mut tick = interval(Duration::from_millis(1));
        for _ in 0..3 {
            assert!(next_cycle(&mut tick, &mut shutdown).await);
        }
    }
}
