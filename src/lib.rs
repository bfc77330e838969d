//! Asynchronous connector to Twitch chat (TMI) over TCP and TLS.
//!
//! Handles the documented login handshake with capability negotiation and
//! retry, answers the server's liveness probes transparently, parses inbound
//! lines into [`Message`] values with normalized tags, and formats outbound
//! join/part/message commands.
//!
//! ```no_run
//! use tmi_client::{ClientConfig, TmiClient};
//!
//! # async fn run() -> Result<(), tmi_client::Error> {
//! let mut client = TmiClient::new(ClientConfig::default());
//! client.login_anonymous().await?;
//! client.join("forsen").await?;
//! loop {
//!     let message = client.recv_message().await?;
//!     println!("{}", message.raw());
//! }
//! # }
//! ```

mod buffer;
mod client;
mod client_messages;
mod config;
mod errors;
pub mod irc_constants;
mod message;
mod ping;
mod transport;

pub use buffer::*;
pub use client::*;
pub use client_messages::*;
pub use config::*;
pub use errors::*;
pub use message::*;
pub use transport::*;
