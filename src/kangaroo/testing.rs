// Test doubles: a scripted controller link and a cooldown that only records
//
// ScriptedLink is a cheap handle; clones share the same script and wire log,
// so a test can keep one while the driver owns another.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use super::driver::Wait;
use super::error::{ChannelResult, KangarooError};
use super::link::{ChannelAddress, Command, ControllerLink, Query, Reply};

/// Everything that crossed the link, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Wire {
    Send(ChannelAddress, Command),
    Query(ChannelAddress, Query),
    Hold(Duration),
}

#[derive(Default)]
struct Script {
    replies: HashMap<ChannelAddress, VecDeque<ChannelResult<Reply>>>,
    failing_sends: HashSet<ChannelAddress>,
    wire: Vec<Wire>,
}

#[derive(Clone, Default)]
pub struct ScriptedLink {
    script: Rc<RefCell<Script>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply to the next query on `address`; unscripted queries time out
    pub fn push_reply(&self, address: ChannelAddress, reply: ChannelResult<Reply>) {
        self.script
            .borrow_mut()
            .replies
            .entry(address)
            .or_default()
            .push_back(reply);
    }

    /// Queue a successful reply with `value`
    pub fn push_value(&self, address: ChannelAddress, value: i32) {
        self.push_reply(address, Ok(Reply { value, done: true }));
    }

    /// Queue a controller-reported fault
    pub fn push_fault(&self, address: ChannelAddress, kind: super::error::ControllerErrorKind) {
        self.push_reply(
            address,
            Err(KangarooError::Controller {
                channel: address.as_char(),
                kind,
            }),
        );
    }

    /// Make every command to `address` fail as if the port timed out
    pub fn fail_sends_to(&self, address: ChannelAddress) {
        self.script.borrow_mut().failing_sends.insert(address);
    }

    pub fn wire(&self) -> Vec<Wire> {
        self.script.borrow().wire.clone()
    }

    pub fn clear_wire(&self) {
        self.script.borrow_mut().wire.clear();
    }

    /// A cooldown that logs into this link's wire log instead of sleeping
    pub fn wait(&self) -> RecordingWait {
        RecordingWait {
            script: Rc::clone(&self.script),
        }
    }
}

impl ControllerLink for ScriptedLink {
    fn send(&mut self, address: ChannelAddress, command: &Command) -> ChannelResult<()> {
        let mut script = self.script.borrow_mut();
        script.wire.push(Wire::Send(address, *command));
        if script.failing_sends.contains(&address) {
            return Err(KangarooError::Timeout {
                channel: address.as_char(),
            });
        }
        Ok(())
    }

    fn query(&mut self, address: ChannelAddress, query: Query) -> ChannelResult<Reply> {
        let mut script = self.script.borrow_mut();
        script.wire.push(Wire::Query(address, query));
        script
            .replies
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(KangarooError::Timeout {
                    channel: address.as_char(),
                })
            })
    }
}

pub struct RecordingWait {
    script: Rc<RefCell<Script>>,
}

impl Wait for RecordingWait {
    fn hold(&mut self, duration: Duration) {
        self.script.borrow_mut().wire.push(Wire::Hold(duration));
    }
}
