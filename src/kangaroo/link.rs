// Typed request/response seam between channel proxies and the wire
//
// Anything that can carry a Command or a Query to the controller implements
// ControllerLink. Both methods take &mut self, so a link only ever has one
// request in flight.

use std::fmt;

use super::error::{ChannelResult, KangarooError};

/// Address of one channel on the controller ('1' or '2' on an x2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelAddress(char);

impl ChannelAddress {
    pub const ONE: Self = Self('1');
    pub const TWO: Self = Self('2');

    /// Channel names on the controller are single alphanumeric characters
    pub fn new(token: char) -> Option<Self> {
        token.is_ascii_alphanumeric().then_some(Self(token))
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands carry no reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Home,
    /// Velocity in ticks per second
    Speed(i32),
    /// Absolute move, optionally speed-limited (ticks, ticks per second)
    Position { position: i32, speed: Option<i32> },
    PowerDown,
}

/// Status queries; each produces exactly one Reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Position,
    Speed,
    Min,
    Max,
}

/// Successful reply to a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub value: i32,
    /// False while a move or homing sequence is still running
    pub done: bool,
}

pub trait ControllerLink {
    fn send(&mut self, address: ChannelAddress, command: &Command) -> ChannelResult<()>;

    fn query(&mut self, address: ChannelAddress, query: Query) -> ChannelResult<Reply>;
}

/// Shorthand for a controller-reported fault on `address`
pub(crate) fn controller_fault(
    address: ChannelAddress,
    kind: super::error::ControllerErrorKind,
) -> KangarooError {
    KangarooError::Controller {
        channel: address.as_char(),
        kind,
    }
}
