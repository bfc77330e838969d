//! Session handling: login handshake with retry, channel membership and
//! message exchange over a single line transport

use std::borrow::Borrow;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use tokio::time::sleep;

use crate::buffer::{MessageBuffer, RingBuffer};
use crate::client_messages::{normalize_channel, normalize_nick, normalize_token};
use crate::client_messages::{Capability, ClientMessage};
use crate::config::ClientConfig;
use crate::errors::{Error, ErrorClass};
use crate::irc_constants::welcome_replies;
use crate::message::Message;
use crate::ping;
use crate::transport::{LineTransport, TcpTransport};

/// Stages of a session's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection, no login in progress
    Disconnected,
    /// Connection being established
    Connecting,
    /// Credentials and capabilities being negotiated
    Authenticating,
    /// Handshake complete, chat commands available
    Ready,
}

/// Login backoff counter. The first two failures add no delay; after that the
/// counter doubles on every failure and the delay is `counter / 1.5` seconds.
#[derive(Debug)]
struct RetryState {
    backoff: u32,
}

impl RetryState {
    fn new() -> Self {
        RetryState { backoff: 0 }
    }

    /// Advance past one failed attempt, returning the delay to wait before
    /// the next one
    fn advance(&mut self) -> Duration {
        if self.backoff <= 1 {
            self.backoff += 1;
            Duration::ZERO
        } else {
            self.backoff *= 2;
            Duration::from_secs_f64(f64::from(self.backoff) / 1.5)
        }
    }
}

/// A chat session over a line transport.
///
/// Owns exactly one connection, the tracked channel and the inbound buffer;
/// all state changes happen inside these methods. Create one with
/// [`TmiClient::new`] for the real servers, or [`TmiClient::with_transport`]
/// to supply a custom [`LineTransport`].
pub struct TmiClient<T: LineTransport = TcpTransport> {
    config: ClientConfig,
    transport: T,
    state: SessionState,
    joined: Option<String>,
    buffer: RingBuffer,
}

impl TmiClient<TcpTransport> {
    /// Create a client that connects over TCP, with TLS per the config
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(TcpTransport::new(), config)
    }
}

impl<T: LineTransport> TmiClient<T> {
    /// Create a client over a custom transport
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        let buffer = RingBuffer::new(config.buffer_capacity);
        TmiClient {
            config,
            transport,
            state: SessionState::Disconnected,
            joined: None,
            buffer,
        }
    }

    /// Current lifecycle stage
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the handshake has completed
    pub fn logged(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// The currently joined channel, if any
    pub fn joined(&self) -> Option<&str> {
        self.joined.as_deref()
    }

    /// Number of messages waiting in the inbound buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Log in with an OAuth token and nick.
    ///
    /// The token gets its `oauth:` prefix added when absent and the nick is
    /// lower-cased. Up to `max_retries` attempts are made: handshake
    /// mismatches are collected and retried with backoff, transport faults
    /// abort immediately. When every attempt is used up the collected causes
    /// are returned in [`Error::LoginFailed`].
    pub async fn login(&mut self, token: &str, nick: &str) -> Result<(), Error> {
        if self.state != SessionState::Disconnected {
            return Err(Error::AlreadyLoggedIn);
        }
        let token = normalize_token(token)?;
        let nick = normalize_nick(nick)?;

        let attempts = self.config.max_retries.max(1);
        let mut retry = RetryState::new();
        let mut causes = Vec::new();

        for attempt in 1..=attempts {
            match self.attempt_login(&token, &nick).await {
                Ok(()) => {
                    self.state = SessionState::Ready;
                    info!("logged in as {}", nick);
                    return Ok(());
                }
                Err(err) if err.class() == ErrorClass::Transport => {
                    self.state = SessionState::Disconnected;
                    if self.transport.connected() {
                        self.transport.disconnect().await.ok();
                    }
                    return Err(err);
                }
                Err(err) => {
                    warn!("login attempt {}/{} failed: {}", attempt, attempts, err);
                    causes.push(err);
                }
            }

            let delay = retry.advance();
            if attempt < attempts && !delay.is_zero() {
                sleep(delay).await;
            }
        }

        self.state = SessionState::Disconnected;
        if self.transport.connected() {
            self.transport.disconnect().await.ok();
        }
        Err(Error::LoginFailed {
            tried: attempts,
            causes,
        })
    }

    /// Log in with a throwaway identity, for read-only use
    pub async fn login_anonymous(&mut self) -> Result<(), Error> {
        let (token, nick) = anonymous_credentials();
        self.login(&token, &nick).await
    }

    async fn attempt_login(&mut self, token: &str, nick: &str) -> Result<(), Error> {
        self.state = SessionState::Connecting;
        if !self.transport.connected() {
            self.transport
                .connect(&self.config.host, self.config.port(), self.config.tls)
                .await?;
        }
        self.state = SessionState::Authenticating;

        self.write_message(&ClientMessage::Pass(token)).await?;
        self.write_message(&ClientMessage::Nick(nick)).await?;

        for expected in welcome_replies(nick) {
            self.expect_reply(&expected).await?;
        }

        for cap in Capability::ALL {
            self.write_message(&ClientMessage::<&str>::CapRequest(cap))
                .await?;
            self.expect_reply(&cap.ack_line()).await?;
        }
        Ok(())
    }

    async fn expect_reply(&mut self, expected: &str) -> Result<(), Error> {
        let line = self.transport.read().await?;
        if line != expected {
            return Err(Error::UnexpectedReply {
                expected: expected.to_string(),
                got: line,
            });
        }
        Ok(())
    }

    /// Part the joined channel if any, close the connection and reset the
    /// session
    pub async fn logout(&mut self) -> Result<(), Error> {
        self.require_logged()?;
        if self.joined.is_some() {
            self.part(None).await?;
        }
        self.transport.disconnect().await?;
        self.state = SessionState::Disconnected;
        info!("logged out");
        Ok(())
    }

    /// Join a channel and track it as the current one.
    ///
    /// Joining while another channel is joined overwrites the tracked name;
    /// no PART is sent for the old channel.
    pub async fn join(&mut self, channel: &str) -> Result<(), Error> {
        self.require_logged()?;
        let channel = normalize_channel(channel)?;
        self.write_message(&ClientMessage::Join(channel.as_str()))
            .await?;
        debug!("joined {}", channel);
        self.joined = Some(channel);
        Ok(())
    }

    /// Part a channel and clear the tracked one. Without an argument the
    /// tracked channel is parted; [`Error::NoChannelSpecified`] if there is
    /// none.
    pub async fn part(&mut self, channel: Option<&str>) -> Result<(), Error> {
        self.require_logged()?;
        let channel = match channel {
            Some(given) => normalize_channel(given)?,
            None => self.joined.clone().ok_or(Error::NoChannelSpecified)?,
        };
        self.write_message(&ClientMessage::Part(channel.as_str()))
            .await?;
        debug!("parted {}", channel);
        self.joined = None;
        Ok(())
    }

    /// Send a chat message to a channel, defaulting to the joined one.
    /// Validation failures ([`Error::MessageTooLong`],
    /// [`Error::EmbeddedTerminator`]) are reported before anything is
    /// written.
    pub async fn send_message(&mut self, text: &str, channel: Option<&str>) -> Result<(), Error> {
        self.require_logged()?;
        let channel = match channel {
            Some(given) => normalize_channel(given)?,
            None => self.joined.clone().ok_or(Error::NoChannelSpecified)?,
        };
        let message = ClientMessage::privmsg(channel, text)?;
        self.write_message(&message).await
    }

    /// Receive one raw line, terminator included. Liveness probes are
    /// answered transparently and never returned.
    pub async fn recv_raw(&mut self) -> Result<String, Error> {
        self.require_logged()?;
        ping::read_line(&mut self.transport).await
    }

    /// Receive one parsed message: the oldest buffered one if any, otherwise
    /// the next line from the connection
    pub async fn recv_message(&mut self) -> Result<Message, Error> {
        self.require_logged()?;
        if let Some(message) = self.buffer.pop() {
            return Ok(message);
        }
        let line = ping::read_line(&mut self.transport).await?;
        Ok(Message::parse(line))
    }

    /// Read one line into the inbound buffer. Lets a read loop stay
    /// responsive to liveness probes while the consumer lags; once the buffer
    /// is full the oldest backlog is dropped.
    pub async fn pump(&mut self) -> Result<(), Error> {
        self.require_logged()?;
        let line = ping::read_line(&mut self.transport).await?;
        self.buffer.push(Message::parse(line));
        Ok(())
    }

    async fn write_message<S: Borrow<str>>(
        &mut self,
        message: &ClientMessage<S>,
    ) -> Result<(), Error> {
        debug!("> {}", message);
        self.transport.write(message.to_line().as_bytes()).await
    }

    fn require_logged(&self) -> Result<(), Error> {
        if self.state != SessionState::Ready {
            return Err(Error::NotLoggedIn);
        }
        Ok(())
    }
}

/// Throwaway token and randomized guest nick for anonymous sessions
fn anonymous_credentials() -> (String, String) {
    let nick = format!("justinfan{}", rand::thread_rng().gen_range(12345..=67890));
    (String::from("random_string"), nick)
}

#[cfg(test)]
mod test {
    use std::io;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::config::ClientConfigBuilder;
    use crate::irc_constants::{PING, PONG};
    use crate::transport::testing::MockTransport;

    const NICK: &str = "somenick";

    fn handshake_script() -> Vec<String> {
        let mut script: Vec<String> = welcome_replies(NICK).to_vec();
        for cap in Capability::ALL {
            script.push(cap.ack_line());
        }
        script
    }

    fn config(max_retries: u32) -> ClientConfig {
        ClientConfigBuilder::default()
            .max_retries(max_retries)
            .build()
            .unwrap()
    }

    async fn ready_client(extra_lines: &[&str]) -> TmiClient<MockTransport> {
        let mut transport = MockTransport::default();
        transport.reads = handshake_script().into_iter().collect();
        for line in extra_lines {
            transport.reads.push_back(line.to_string());
        }
        let mut client = TmiClient::with_transport(transport, config(1));
        client.login("sometoken", "SomeNick").await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_login_first_attempt_without_backoff() {
        tokio::time::pause();
        let start = Instant::now();

        let client = ready_client(&[]).await;
        assert_eq!(client.state(), SessionState::Ready);
        assert!(client.logged());
        // success on the first attempt never touches the backoff timer
        assert_eq!(start.elapsed(), Duration::ZERO);

        let mut expected = vec![
            "PASS oauth:sometoken\r\n".to_string(),
            "NICK somenick\r\n".to_string(),
        ];
        for cap in Capability::ALL {
            expected.push(format!("CAP REQ :{}\r\n", cap));
        }
        assert_eq!(client.transport.writes, expected);
    }

    #[tokio::test]
    async fn test_handshake_mismatch_retries_then_fails() {
        tokio::time::pause();
        let start = Instant::now();

        let bad_lines: Vec<&str> = vec![":tmi.twitch.tv 421 somenick :corrupted\r\n"; 4];
        let transport = MockTransport::with_script(&bad_lines);
        let mut client = TmiClient::with_transport(transport, config(4));

        let err = client.login("sometoken", NICK).await.unwrap_err();
        match err {
            Error::LoginFailed { tried, causes } => {
                assert_eq!(tried, 4);
                assert_eq!(causes.len(), 4);
                assert!(causes
                    .iter()
                    .all(|cause| cause.class() == ErrorClass::Protocol));
            }
            other => panic!("expected LoginFailed, got {:?}", other),
        }
        assert_eq!(client.state(), SessionState::Disconnected);
        // zero delay after the first two failures, then 4 / 1.5 seconds;
        // no sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs_f64(4.0 / 1.5));
    }

    #[test]
    fn test_backoff_counter_sequence() {
        let mut retry = RetryState::new();
        let mut observed = Vec::new();
        let mut delays = Vec::new();
        for _ in 0..4 {
            observed.push(retry.backoff);
            delays.push(retry.advance());
        }
        assert_eq!(observed, vec![0, 1, 2, 4]);
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::ZERO,
                Duration::from_secs_f64(4.0 / 1.5),
                Duration::from_secs_f64(8.0 / 1.5),
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_fault_is_not_retried() {
        let mut transport = MockTransport::default();
        transport.fail_connect = Some(io::ErrorKind::ConnectionRefused);
        let mut client = TmiClient::with_transport(transport, config(8));

        let err = client.login("sometoken", NICK).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transport);
        assert_eq!(client.transport.connects, 0);
        assert!(client.transport.writes.is_empty());
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connection_reuse_between_attempts() {
        let mut script: Vec<String> = vec![":tmi.twitch.tv 421 somenick :corrupted\r\n".into()];
        script.extend(handshake_script());
        let mut transport = MockTransport::default();
        transport.reads = script.into_iter().collect();

        let mut client = TmiClient::with_transport(transport, config(2));
        client.login("sometoken", NICK).await.unwrap();
        // the connection left open by the failed attempt is reused
        assert_eq!(client.transport.connects, 1);
        assert!(client.logged());
    }

    #[tokio::test]
    async fn test_double_login_rejected() {
        let mut client = ready_client(&[]).await;
        let err = client.login("sometoken", NICK).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyLoggedIn));
    }

    #[tokio::test]
    async fn test_operations_require_login() {
        let mut client = TmiClient::with_transport(MockTransport::default(), config(1));
        assert!(matches!(
            client.join("chan").await.unwrap_err(),
            Error::NotLoggedIn
        ));
        assert!(matches!(
            client.part(None).await.unwrap_err(),
            Error::NotLoggedIn
        ));
        assert!(matches!(
            client.send_message("hi", None).await.unwrap_err(),
            Error::NotLoggedIn
        ));
        assert!(matches!(
            client.recv_message().await.unwrap_err(),
            Error::NotLoggedIn
        ));
        assert!(matches!(
            client.logout().await.unwrap_err(),
            Error::NotLoggedIn
        ));
    }

    #[tokio::test]
    async fn test_join_part_send_flow() {
        let mut client = ready_client(&[]).await;
        let handshake_writes = client.transport.writes.len();

        client.join("SomeChannel").await.unwrap();
        assert_eq!(client.joined(), Some("#SomeChannel"));

        client.send_message("hello there", None).await.unwrap();
        client.part(None).await.unwrap();
        assert_eq!(client.joined(), None);

        assert_eq!(
            client.transport.writes[handshake_writes..],
            [
                "JOIN #SomeChannel\r\n".to_string(),
                "PRIVMSG #SomeChannel :hello there\r\n".to_string(),
                "PART #SomeChannel\r\n".to_string(),
            ]
        );

        let err = client.part(None).await.unwrap_err();
        assert!(matches!(err, Error::NoChannelSpecified));
    }

    #[tokio::test]
    async fn test_join_overwrites_tracked_channel() {
        let mut client = ready_client(&[]).await;
        client.join("first").await.unwrap();
        client.join("second").await.unwrap();
        assert_eq!(client.joined(), Some("#second"));
        // no PART was sent for the first channel
        assert!(!client
            .transport
            .writes
            .iter()
            .any(|line| line.starts_with("PART")));
    }

    #[tokio::test]
    async fn test_oversized_message_writes_nothing() {
        let mut client = ready_client(&[]).await;
        client.join("chan").await.unwrap();
        let writes_before = client.transport.writes.len();

        let text = "x".repeat(501);
        let err = client.send_message(&text, None).await.unwrap_err();
        assert!(matches!(err, Error::MessageTooLong(501)));
        assert_eq!(client.transport.writes.len(), writes_before);
    }

    #[tokio::test]
    async fn test_keepalive_transparent_on_recv() {
        let chat_line = ":a!a@a.tmi.twitch.tv PRIVMSG #chan :hi\r\n";
        let mut client = ready_client(&[PING, chat_line]).await;

        let message = client.recv_message().await.unwrap();
        assert!(message.valid());
        assert_eq!(message.command(), Some("PRIVMSG #chan :hi"));
        assert_eq!(client.transport.writes.last().map(String::as_str), Some(PONG));
        assert_eq!(
            client
                .transport
                .writes
                .iter()
                .filter(|line| line.as_str() == PONG)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_recv_raw_returns_line_as_received() {
        let chat_line = ":a!a@a.tmi.twitch.tv PRIVMSG #chan :hi\r\n";
        let mut client = ready_client(&[PING, chat_line]).await;

        assert_eq!(client.recv_raw().await.unwrap(), chat_line);
        assert_eq!(client.transport.writes.last().map(String::as_str), Some(PONG));
    }

    #[tokio::test]
    async fn test_pump_buffers_in_order() {
        let first = ":a!a@a.tmi.twitch.tv PRIVMSG #chan :one\r\n";
        let second = ":b!b@b.tmi.twitch.tv PRIVMSG #chan :two\r\n";
        let mut client = ready_client(&[first, second]).await;

        client.pump().await.unwrap();
        client.pump().await.unwrap();
        assert_eq!(client.buffered(), 2);

        let one = client.recv_message().await.unwrap();
        let two = client.recv_message().await.unwrap();
        assert_eq!(one.command(), Some("PRIVMSG #chan :one"));
        assert_eq!(two.command(), Some("PRIVMSG #chan :two"));
        assert_eq!(client.buffered(), 0);
    }

    #[tokio::test]
    async fn test_logout_parts_joined_channel() {
        let mut client = ready_client(&[]).await;
        client.join("chan").await.unwrap();

        client.logout().await.unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(!client.transport.connected);
        assert!(client
            .transport
            .writes
            .iter()
            .any(|line| line == "PART #chan\r\n"));
    }

    #[test]
    fn test_anonymous_credentials_shape() {
        let (token, nick) = anonymous_credentials();
        assert_eq!(token, "random_string");
        let suffix: u32 = nick.strip_prefix("justinfan").unwrap().parse().unwrap();
        assert!((12345..=67890).contains(&suffix));
    }
}
