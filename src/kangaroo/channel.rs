// One motion axis on the shared Kangaroo link
//
// A Channel mutably borrows the link for as long as it lives, so two channels
// can never have requests in flight at the same time.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::error::{ChannelResult, ControllerErrorKind, KangarooError};
use super::link::{ChannelAddress, Command, ControllerLink, Query};

/// Upper bound on waiting for a homing sequence to finish
pub const HOME_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between position polls while homing
const HOME_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Channel<'a, L: ControllerLink + ?Sized> {
    link: &'a mut L,
    address: ChannelAddress,
}

impl<'a, L: ControllerLink + ?Sized> Channel<'a, L> {
    pub fn new(link: &'a mut L, address: ChannelAddress) -> Self {
        Self { link, address }
    }

    /// Start the channel and wait until the controller confirms it
    ///
    /// Without homing, a channel that reports `NotHomed` is started: it accepts
    /// speed commands, just not absolute moves. With homing, this blocks until
    /// the homing move finishes or `HOME_TIMEOUT` passes.
    pub fn start(&mut self, auto_home: bool) -> ChannelResult<()> {
        info!("Starting channel {} (auto_home={})", self.address, auto_home);
        self.link.send(self.address, &Command::Start)?;
        if auto_home {
            self.link.send(self.address, &Command::Home)?;
        }

        let deadline = Instant::now() + HOME_TIMEOUT;
        loop {
            match self.link.query(self.address, Query::Position) {
                Ok(reply) if reply.done || !auto_home => {
                    debug!("Channel {} started at {} ticks", self.address, reply.value);
                    return Ok(());
                }
                Ok(reply) => {
                    debug!("Channel {} homing, at {} ticks", self.address, reply.value);
                }
                Err(e) if !auto_home && e.kind() == ControllerErrorKind::NotHomed => {
                    debug!("Channel {} started (not homed)", self.address);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(KangarooError::Timeout {
                    channel: self.address.as_char(),
                });
            }
            std::thread::sleep(HOME_POLL_INTERVAL);
        }
    }

    /// Command a velocity in ticks per second
    pub fn set_velocity(&mut self, ticks_per_sec: i32) -> ChannelResult<()> {
        self.link.send(self.address, &Command::Speed(ticks_per_sec))
    }

    /// Command an absolute position, optionally speed-limited
    pub fn set_position(&mut self, ticks: i32, speed_limit: Option<i32>) -> ChannelResult<()> {
        self.link.send(
            self.address,
            &Command::Position {
                position: ticks,
                speed: speed_limit,
            },
        )
    }

    /// Cut power to the motor; the channel has to be started again afterwards
    pub fn power_down(&mut self) -> ChannelResult<()> {
        self.link.send(self.address, &Command::PowerDown)
    }

    pub fn get_position(&mut self) -> ChannelResult<i32> {
        self.query_value(Query::Position)
    }

    pub fn get_velocity(&mut self) -> ChannelResult<i32> {
        self.query_value(Query::Speed)
    }

    pub fn get_min_travel(&mut self) -> ChannelResult<i32> {
        self.query_value(Query::Min)
    }

    pub fn get_max_travel(&mut self) -> ChannelResult<i32> {
        self.query_value(Query::Max)
    }

    fn query_value(&mut self, query: Query) -> ChannelResult<i32> {
        self.link.query(self.address, query).map(|reply| reply.value)
    }
}
