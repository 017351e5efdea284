// Dual-channel driver for the Kangaroo x2
//
// Owns the serial link and both channel addresses. Each control cycle calls
// read() to push velocity commands out and write() to pull telemetry back.
// write() is also where faults are detected and recovered from: a failed
// status query holds the control thread for COOLDOWN, then restarts both
// channels.
//
// Channel 2 drives a mirrored axis, so its commands and telemetry are negated.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::channel::Channel;
use super::error::{outcome_name, ChannelResult, ControllerErrorKind, KangarooError};
use super::link::{ChannelAddress, ControllerLink};
use super::units::UnitConverter;
use crate::config::ConfigError;

/// Minimum hold between detecting a fault and restarting the channels.
///
/// Restarting immediately after a controller reset has burnt out a motor.
/// This is a hardware safety floor, not a tuning knob.
pub const COOLDOWN: Duration = Duration::from_secs(10);

/// Physical sign of each channel relative to the controller
const DIRECTION: [f64; 2] = [1.0, -1.0];

/// How the driver blocks during the cooldown
pub trait Wait {
    fn hold(&mut self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingWait;

impl Wait for BlockingWait {
    fn hold(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultState {
    #[default]
    Operational,
    Recovering,
}

/// Per-cycle joint snapshot, in radians and radians per second
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverState {
    pub position: [f64; 2],
    pub velocity: [f64; 2],
    pub commanded_velocity: [f64; 2],
}

/// What write() saw when a status query failed, and how the restart went
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "Kangaroo status not OK (motor 1: {}, motor 2: {}); restart (motor 1: {}, motor 2: {})",
    kind_name(.status[0]),
    kind_name(.status[1]),
    kind_name(.restart[0]),
    kind_name(.restart[1])
)]
pub struct FaultReport {
    /// Status query outcome per channel, None if that channel answered
    pub status: [Option<ControllerErrorKind>; 2],
    /// Restart outcome per channel, None if it started
    pub restart: [Option<ControllerErrorKind>; 2],
}

fn kind_name(kind: Option<ControllerErrorKind>) -> &'static str {
    kind.map_or(super::error::NO_ERROR_NAME, ControllerErrorKind::name)
}

pub struct DualChannelDriver<L: ControllerLink, W: Wait = BlockingWait> {
    link: L,
    addresses: [ChannelAddress; 2],
    units: UnitConverter,
    state: DriverState,
    fault: FaultState,
    wait: W,
}

impl<L: ControllerLink> DualChannelDriver<L> {
    /// Create a driver on an open link and start both channels
    pub fn new(link: L, ticks_per_rev: i32) -> Result<Self, ConfigError> {
        Self::with_wait(link, ticks_per_rev, BlockingWait)
    }
}

impl<L: ControllerLink, W: Wait> DualChannelDriver<L, W> {
    /// Like `new`, with a custom cooldown implementation
    ///
    /// A channel that fails to start here is only logged: the first write()
    /// will see the fault and go through the regular recovery path.
    pub fn with_wait(link: L, ticks_per_rev: i32, wait: W) -> Result<Self, ConfigError> {
        let units = UnitConverter::new(ticks_per_rev)?;

        let mut driver = Self {
            link,
            addresses: [ChannelAddress::ONE, ChannelAddress::TWO],
            units,
            state: DriverState::default(),
            fault: FaultState::Operational,
            wait,
        };
        driver.start_channels();
        Ok(driver)
    }

    /// Borrow channel `index` (0 or 1) on the shared link
    fn channel(&mut self, index: usize) -> Channel<'_, L> {
        Channel::new(&mut self.link, self.addresses[index])
    }

    pub fn snapshot(&self) -> DriverState {
        self.state
    }

    pub fn fault_state(&self) -> FaultState {
        self.fault
    }

    pub fn units(&self) -> &UnitConverter {
        &self.units
    }

    /// Send velocity commands (rad/s) to both channels
    ///
    /// Both commands are always attempted. A failure is returned but does not
    /// affect the fault state; only write() decides on recovery.
    pub fn read(&mut self, commanded_velocity: [f64; 2]) -> ChannelResult<()> {
        debug!(
            "Commands for joints: {}, {}",
            commanded_velocity[0], commanded_velocity[1]
        );
        self.state.commanded_velocity = commanded_velocity;

        let mut first_error = None;
        for (index, &velocity) in commanded_velocity.iter().enumerate() {
            let ticks = self.velocity_to_ticks(index, velocity);
            let result = self.channel(index).set_velocity(ticks);
            if let Err(e) = result {
                warn!(
                    "Dropped velocity command on channel {}: {}",
                    self.addresses[index], e
                );
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Query both channels and refresh the snapshot, or recover on a fault
    pub fn write(&mut self) -> Result<(), FaultReport> {
        let positions = self.query_both(|channel| channel.get_position());
        let (p1, p2) = match &positions {
            [Ok(p1), Ok(p2)] => (*p1, *p2),
            _ => return Err(self.recover(&positions)),
        };

        let velocities = self.query_both(|channel| channel.get_velocity());
        let (v1, v2) = match &velocities {
            [Ok(v1), Ok(v2)] => (*v1, *v2),
            _ => return Err(self.recover(&velocities)),
        };

        self.state.position = [
            DIRECTION[0] * self.units.to_physical_position(p1),
            DIRECTION[1] * self.units.to_physical_position(p2),
        ];
        self.state.velocity = [
            DIRECTION[0] * self.units.to_physical_velocity(v1),
            DIRECTION[1] * self.units.to_physical_velocity(v2),
        ];

        if self.fault == FaultState::Recovering {
            info!("Kangaroo channels recovered");
        }
        self.fault = FaultState::Operational;
        Ok(())
    }

    /// Command zero velocity on both channels
    pub fn stop(&mut self) -> ChannelResult<()> {
        info!("Stopping both channels");
        self.read([0.0, 0.0])
    }

    /// Travel range of each channel in radians, as (lower, upper)
    pub fn travel_limits(&mut self) -> [ChannelResult<(f64, f64)>; 2] {
        [0, 1].map(|index| -> ChannelResult<(f64, f64)> {
            let mut channel = self.channel(index);
            let min = channel.get_min_travel()?;
            let max = channel.get_max_travel()?;

            let a = DIRECTION[index] * self.units.to_physical_position(min);
            let b = DIRECTION[index] * self.units.to_physical_position(max);
            Ok((a.min(b), a.max(b)))
        })
    }

    fn velocity_to_ticks(&self, index: usize, radians_per_sec: f64) -> i32 {
        let ticks = self.units.to_controller_velocity(radians_per_sec);
        if DIRECTION[index] < 0.0 {
            ticks.saturating_neg()
        } else {
            ticks
        }
    }

    /// Run the same query on channel 1 then channel 2
    fn query_both<F>(&mut self, mut query: F) -> [ChannelResult<i32>; 2]
    where
        F: FnMut(&mut Channel<'_, L>) -> ChannelResult<i32>,
    {
        let first = query(&mut self.channel(0));
        let second = query(&mut self.channel(1));
        [first, second]
    }

    /// Enter Recovering, wait out the cooldown, restart both channels.
    ///
    /// The snapshot is left untouched. Both channels are restarted whichever
    /// one faulted, since a controller reset drops both out of started mode.
    fn recover(&mut self, status: &[ChannelResult<i32>; 2]) -> FaultReport {
        self.fault = FaultState::Recovering;

        error!(
            "Kangaroo status not OK. Motor 1 state: {}, Motor 2 state: {}",
            outcome_name(&status[0]),
            outcome_name(&status[1])
        );
        for (address, result) in self.addresses.iter().zip(status) {
            if let Err(e) = result {
                debug!("Channel {} fault detail: {}", address, e);
            }
        }

        info!("Holding {:?} before restarting channels", COOLDOWN);
        self.wait.hold(COOLDOWN);

        FaultReport {
            status: [kind_of(&status[0]), kind_of(&status[1])],
            restart: self.start_channels(),
        }
    }

    /// Start both channels without homing; returns each failure kind
    fn start_channels(&mut self) -> [Option<ControllerErrorKind>; 2] {
        info!("Starting Kangaroo channels");

        let mut outcome = [None, None];
        for (index, slot) in outcome.iter_mut().enumerate() {
            let result = self.channel(index).start(false);
            if let Err(e) = result {
                warn!("Channel {} failed to start: {}", self.addresses[index], e);
                *slot = Some(e.kind());
            }
        }
        outcome
    }
}

fn kind_of(result: &ChannelResult<i32>) -> Option<ControllerErrorKind> {
    result.as_ref().err().map(KangarooError::kind)
}

impl<L: ControllerLink, W: Wait> Drop for DualChannelDriver<L, W> {
    fn drop(&mut self) {
        // Leave the axes stationary when the driver goes away
        if let Err(e) = self.stop() {
            warn!("Failed to stop channels on drop: {}", e);
        }
    }
}
