use derive_builder::Builder;

use crate::irc_constants::{TMI_PORT, TMI_SERVER, TMI_TLS_PORT};

/// Holds the available settings for a chat session
#[derive(Clone, Debug, Builder)]
pub struct ClientConfig {
    /// The chat server host, by default `irc.chat.twitch.tv`
    #[builder(default = "TMI_SERVER.to_string()")]
    pub host: String,

    /// Whether to wrap the connection in TLS (default: true)
    #[builder(default = "true")]
    pub tls: bool,

    /// Port override. When unset, the port follows the TLS flag (6697/6667).
    #[builder(default = "None", setter(strip_option))]
    pub port: Option<u16>,

    /// Maximum number of login attempts (default: 8)
    #[builder(default = "8")]
    pub max_retries: u32,

    /// Capacity of the inbound message buffer (default: 128)
    #[builder(default = "128")]
    pub buffer_capacity: usize,
}

impl ClientConfig {
    /// The effective port, honoring the override
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.tls { TMI_TLS_PORT } else { TMI_PORT })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::default()
            .build()
            .expect("every config field has a default")
    }
}
