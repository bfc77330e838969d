//! Protocol constants for the Twitch chat servers

/// Chat server host
pub const TMI_SERVER: &str = "irc.chat.twitch.tv";
/// Plaintext port
pub const TMI_PORT: u16 = 6667;
/// TLS port
pub const TMI_TLS_PORT: u16 = 6697;

/// Terminator of every protocol line
pub const TERMINATOR: &str = "\r\n";

/// Liveness probe sent by the server
pub const PING: &str = "PING :tmi.twitch.tv\r\n";
/// Reply the client must answer the probe with
pub const PONG: &str = "PONG :tmi.twitch.tv\r\n";

/// Maximum PRIVMSG payload length in characters
pub const MAX_MESSAGE_LEN: usize = 500;

/// The literal reply sequence the server sends after a successful PASS/NICK
/// exchange, in the order it must be received.
pub fn welcome_replies(nick: &str) -> [String; 7] {
    [
        format!(":tmi.twitch.tv 001 {} :Welcome, GLHF!\r\n", nick),
        format!(":tmi.twitch.tv 002 {} :Your host is tmi.twitch.tv\r\n", nick),
        format!(":tmi.twitch.tv 003 {} :This server is rather new\r\n", nick),
        format!(":tmi.twitch.tv 004 {} :-\r\n", nick),
        format!(":tmi.twitch.tv 375 {} :-\r\n", nick),
        format!(
            ":tmi.twitch.tv 372 {} :You are in a maze of twisty passages, all alike.\r\n",
            nick
        ),
        format!(":tmi.twitch.tv 376 {} :>\r\n", nick),
    ]
}
