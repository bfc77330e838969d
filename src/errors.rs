use thiserror::Error;

use std::io;

/// Error type for tmi-client methods
#[derive(Debug, Error)]
pub enum Error {
    /// `connect` was called while a connection was already open
    #[error("Connection already open")]
    AlreadyConnected,
    /// The operation requires an open connection
    #[error("No connection open")]
    NotConnected,
    /// Establishing the TCP or TLS connection failed
    #[error("Connect failed: {0}")]
    ConnectFailed(#[source] io::Error),
    /// The server closed the connection
    #[error("Connection closed by server")]
    ConnectionClosed,
    /// I/O failure on an established connection
    #[error("Transport error: {0}")]
    Io(#[from] io::Error),
    /// `login` was called on a session that is already logged in
    #[error("Already logged in")]
    AlreadyLoggedIn,
    /// The operation requires a completed login
    #[error("Not logged in")]
    NotLoggedIn,
    /// No channel argument was given and no channel is joined
    #[error("No channel specified and none joined")]
    NoChannelSpecified,
    /// A reply received during the handshake did not match the expected line
    #[error("Unexpected reply during login: expected {expected:?}, got {got:?}")]
    UnexpectedReply {
        /// The exact line the handshake was waiting for
        expected: String,
        /// The line the server actually sent
        got: String,
    },
    /// Every login attempt was used up without completing the handshake
    #[error("Login failed after {tried} attempt(s) with {} handshake error(s)", .causes.len())]
    LoginFailed {
        /// Number of attempts made
        tried: u32,
        /// The non-fatal cause of each failed attempt
        causes: Vec<Error>,
    },
    /// A message payload exceeded the protocol limit
    #[error("Message payload is {0} characters, the limit is 500")]
    MessageTooLong(usize),
    /// A line terminator was embedded in a field that must not contain one
    #[error("Embedded line terminator in {0}")]
    EmbeddedTerminator(&'static str),
}

/// Broad failure classes. Lets a caller decide between fixing its inputs
/// (`State`, `Validation`), retrying at a higher level (`Transport`) and
/// giving up (`Login`) without matching every [`Error`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A received line did not match the documented exchange
    Protocol,
    /// The underlying connection failed; transient, may be retried externally
    Transport,
    /// An operation was invoked in the wrong session state
    State,
    /// An input failed validation before anything was sent
    Validation,
    /// Login gave up after using every attempt
    Login,
}

impl Error {
    /// The failure class this error belongs to
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::UnexpectedReply { .. } => ErrorClass::Protocol,
            Error::ConnectFailed(_) | Error::ConnectionClosed | Error::Io(_) => {
                ErrorClass::Transport
            }
            Error::AlreadyConnected
            | Error::NotConnected
            | Error::AlreadyLoggedIn
            | Error::NotLoggedIn
            | Error::NoChannelSpecified => ErrorClass::State,
            Error::MessageTooLong(_) | Error::EmbeddedTerminator(_) => ErrorClass::Validation,
            Error::LoginFailed { .. } => ErrorClass::Login,
        }
    }
}
