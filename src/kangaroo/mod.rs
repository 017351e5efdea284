// Kangaroo x2 motion controller support
//
// Provides:
// - Tick <-> radian conversion
// - Simplified-serial transport over a serial port
// - Channel proxies sharing one link
// - The dual-channel driver with fault recovery

pub mod channel;
mod driver;
pub mod error;
pub mod link;
pub mod serial;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::Channel;
pub use driver::{BlockingWait, DriverState, DualChannelDriver, FaultReport, FaultState, Wait, COOLDOWN};
pub use error::{ChannelResult, ControllerErrorKind, KangarooError};
pub use link::{ChannelAddress, Command, ControllerLink, Query, Reply};
pub use serial::{KangarooSerial, SerialStream};
pub use units::UnitConverter;
