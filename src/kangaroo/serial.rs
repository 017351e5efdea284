// Kangaroo x2 simplified-serial transport
//
// Line oriented ASCII, one request per line:
//   request: "<channel>,<command>\r\n"   e.g. "1,s500", "2,getp"
//   reply:   "<channel>,<letter><value>\r\n"   e.g. "1,P1200", "2,s-40"
//            "<channel>,E<code>\r\n" on error
// An uppercase reply letter means the move has finished, lowercase means it
// is still running. Commands produce no reply.
//
// A reply that shows up after its query timed out would otherwise be read as
// the answer to the next query. Input is discarded before every query, and a
// reply addressed to the other channel is skipped rather than returned.

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

use super::error::{ChannelResult, ControllerErrorKind, KangarooError};
use super::link::{controller_fault, ChannelAddress, Command, ControllerLink, Query, Reply};

/// Default serial configuration for the Kangaroo
pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Per-call response timeout
pub const SERIAL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Longest reply line we accept before giving up on it
const MAX_LINE: usize = 32;

/// Replies for the other channel skipped while waiting for our own
const MAX_STALE_REPLIES: usize = 4;

/// Byte stream under the link that can drop whatever is waiting to be read
pub trait SerialStream: Read + Write {
    fn discard_input(&mut self) -> ChannelResult<()>;
}

impl SerialStream for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> ChannelResult<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Kangaroo serial link - one request/response at a time over a byte stream
pub struct KangarooSerial<P = Box<dyn SerialPort>> {
    port: P,
}

impl KangarooSerial {
    /// Open a serial port with the fixed response timeout
    pub fn open(port_name: &str, baudrate: u32) -> ChannelResult<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(SERIAL_TIMEOUT)
            .open()?;

        Ok(Self::from_port(port))
    }
}

impl<P: SerialStream> KangarooSerial<P> {
    /// Wrap an already configured byte stream
    pub fn from_port(port: P) -> Self {
        Self { port }
    }

    fn send_line(&mut self, line: &str) -> ChannelResult<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\r\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, address: ChannelAddress) -> ChannelResult<u8> {
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte).map_err(|e| {
            if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::UnexpectedEof {
                KangarooError::Timeout {
                    channel: address.as_char(),
                }
            } else {
                KangarooError::Io(e)
            }
        })?;
        Ok(byte[0])
    }

    /// Read one non-empty reply line, without the terminator
    fn read_line(&mut self, address: ChannelAddress) -> ChannelResult<String> {
        let mut line = Vec::with_capacity(MAX_LINE);

        loop {
            match self.read_byte(address)? {
                b'\n' if line.is_empty() => continue,
                b'\n' => break,
                b'\r' => continue,
                b => line.push(b),
            }

            if line.len() > MAX_LINE {
                // Drop the rest of the line so the next read starts on a boundary
                while self.read_byte(address)? != b'\n' {}
                return Err(KangarooError::InvalidReply {
                    channel: address.as_char(),
                    reason: format!("Reply longer than {} bytes", MAX_LINE),
                });
            }
        }

        String::from_utf8(line).map_err(|_| KangarooError::InvalidReply {
            channel: address.as_char(),
            reason: "Reply is not ASCII".to_string(),
        })
    }
}

impl<P: SerialStream> ControllerLink for KangarooSerial<P> {
    fn send(&mut self, address: ChannelAddress, command: &Command) -> ChannelResult<()> {
        let line = encode_command(address, command);
        debug!("Kangaroo send: {}", line);
        self.send_line(&line)
    }

    fn query(&mut self, address: ChannelAddress, query: Query) -> ChannelResult<Reply> {
        let line = encode_query(address, query);
        debug!("Kangaroo query: {}", line);
        self.port.discard_input()?;
        self.send_line(&line)?;

        let mut skipped = 0;
        loop {
            let reply = self.read_line(address)?;
            debug!("Kangaroo reply: {}", reply);
            match parse_reply(address, &reply) {
                Err(KangarooError::ChannelMismatch { got, .. }) if skipped < MAX_STALE_REPLIES => {
                    debug!("Skipping late reply for channel {}", got);
                    skipped += 1;
                }
                result => return result,
            }
        }
    }
}

fn encode_command(address: ChannelAddress, command: &Command) -> String {
    let body = match *command {
        Command::Start => "start".to_string(),
        Command::Home => "home".to_string(),
        Command::Speed(speed) => format!("s{}", speed),
        Command::Position {
            position,
            speed: None,
        } => format!("p{}", position),
        Command::Position {
            position,
            speed: Some(speed),
        } => format!("p{}s{}", position, speed),
        Command::PowerDown => "powerdown".to_string(),
    };
    format!("{},{}", address, body)
}

fn encode_query(address: ChannelAddress, query: Query) -> String {
    let body = match query {
        Query::Position => "getp",
        Query::Speed => "gets",
        Query::Min => "getmin",
        Query::Max => "getmax",
    };
    format!("{},{}", address, body)
}

/// Parse a reply line addressed to `address`
fn parse_reply(address: ChannelAddress, line: &str) -> ChannelResult<Reply> {
    let invalid = |reason: String| KangarooError::InvalidReply {
        channel: address.as_char(),
        reason,
    };

    let (channel, body) = line
        .split_once(',')
        .ok_or_else(|| invalid(format!("Missing separator in {:?}", line)))?;

    let mut channel_chars = channel.trim().chars();
    let got = match (channel_chars.next(), channel_chars.next()) {
        (Some(c), None) => c,
        _ => return Err(invalid(format!("Bad channel field {:?}", channel))),
    };
    if got != address.as_char() {
        return Err(KangarooError::ChannelMismatch {
            expected: address.as_char(),
            got,
        });
    }

    let body = body.trim();
    let mut body_chars = body.chars();
    let letter = body_chars
        .next()
        .ok_or_else(|| invalid("Empty reply body".to_string()))?;
    let digits = body_chars.as_str();

    if letter.eq_ignore_ascii_case(&'e') {
        let code: u8 = digits
            .parse()
            .map_err(|_| invalid(format!("Bad error code {:?}", digits)))?;
        return Err(controller_fault(address, ControllerErrorKind::from_code(code)));
    }

    if !letter.is_ascii_alphabetic() {
        return Err(invalid(format!("Bad reply type {:?}", letter)));
    }

    let value: i32 = digits
        .parse()
        .map_err(|_| invalid(format!("Bad value {:?}", digits)))?;

    Ok(Reply {
        value,
        done: letter.is_ascii_uppercase(),
    })
}
