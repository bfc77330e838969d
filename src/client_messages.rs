//! Types to represent messages sent by the client

use std::borrow::Borrow;
use std::fmt;

use crate::errors::Error;
use crate::irc_constants::MAX_MESSAGE_LEN;

/// Messages sent from the client to the chat server. The `Display` impl
/// produces the wire format without the trailing CR-LF.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage<T: Borrow<str>> {
    PrivMsg { channel: T, message: T },
    Join(T),
    Part(T),
    Nick(T),
    Pass(T),
    CapRequest(Capability),
    Pong,
}

impl ClientMessage<String> {
    /// Build a channel message. Validates the payload length and rejects
    /// embedded terminators before anything touches the wire.
    pub fn privmsg(
        channel: impl Borrow<str>,
        message: impl Into<String> + Borrow<str>,
    ) -> Result<Self, Error> {
        let len = message.borrow().chars().count();
        if len > MAX_MESSAGE_LEN {
            return Err(Error::MessageTooLong(len));
        }
        reject_terminator(message.borrow(), "message")?;
        Ok(ClientMessage::PrivMsg {
            channel: normalize_channel(channel.borrow())?,
            message: message.into(),
        })
    }

    /// Build a channel join command
    pub fn join(channel: impl Borrow<str>) -> Result<Self, Error> {
        Ok(ClientMessage::Join(normalize_channel(channel.borrow())?))
    }

    /// Build a channel part command
    pub fn part(channel: impl Borrow<str>) -> Result<Self, Error> {
        Ok(ClientMessage::Part(normalize_channel(channel.borrow())?))
    }
}

impl<T: Borrow<str>> ClientMessage<T> {
    /// The full wire line, terminator included
    pub fn to_line(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl<T: Borrow<str>> fmt::Display for ClientMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            ClientMessage::PrivMsg { channel, message } => {
                write!(f, "PRIVMSG {} :{}", channel.borrow(), message.borrow())
            }
            ClientMessage::Join(channel) => write!(f, "JOIN {}", channel.borrow()),
            ClientMessage::Part(channel) => write!(f, "PART {}", channel.borrow()),
            ClientMessage::Nick(nick) => write!(f, "NICK {}", nick.borrow()),
            ClientMessage::Pass(pass) => write!(f, "PASS {}", pass.borrow()),
            ClientMessage::CapRequest(cap) => write!(f, "CAP REQ :{}", cap),
            ClientMessage::Pong => write!(f, "PONG :tmi.twitch.tv"),
        }
    }
}

/// Twitch client capabilities
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// twitch.tv/membership capability
    Membership,
    /// twitch.tv/tags capability
    Tags,
    /// twitch.tv/commands capability
    Commands,
}

impl Capability {
    /// Every capability the handshake requests, in the order requests are
    /// sent and acknowledgements are expected
    pub const ALL: [Capability; 3] = [Capability::Membership, Capability::Tags, Capability::Commands];

    /// The exact acknowledgement line the server must answer with
    pub fn ack_line(self) -> String {
        format!(":tmi.twitch.tv CAP * ACK :{}\r\n", self)
    }
}

impl From<Capability> for &'static str {
    fn from(cap: Capability) -> &'static str {
        match cap {
            Capability::Membership => "twitch.tv/membership",
            Capability::Tags => "twitch.tv/tags",
            Capability::Commands => "twitch.tv/commands",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let cap_as_str: &'static str = (*self).into();
        write!(f, "{}", cap_as_str)
    }
}

/// Prefix the token with `oauth:` if the prefix is absent
pub fn normalize_token(token: &str) -> Result<String, Error> {
    reject_terminator(token, "token")?;
    if token.starts_with("oauth:") {
        Ok(token.to_string())
    } else {
        Ok(format!("oauth:{}", token))
    }
}

/// Lower-case the nick
pub fn normalize_nick(nick: &str) -> Result<String, Error> {
    reject_terminator(nick, "nick")?;
    Ok(nick.to_lowercase())
}

/// Ensure the channel name carries its leading `#`
pub fn normalize_channel(channel: &str) -> Result<String, Error> {
    reject_terminator(channel, "channel")?;
    if channel.starts_with('#') {
        Ok(channel.to_string())
    } else {
        Ok(format!("#{}", channel))
    }
}

fn reject_terminator(value: &str, field: &'static str) -> Result<(), Error> {
    if value.contains("\r\n") {
        return Err(Error::EmbeddedTerminator(field));
    }
    Ok(())
}
