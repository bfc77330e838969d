//! Liveness probe handling on the inbound path

use log::debug;

use crate::errors::Error;
use crate::irc_constants::{PING, PONG};
use crate::transport::LineTransport;

/// Read one line, transparently answering liveness probes.
///
/// A probe line is answered immediately and never surfaced; the next
/// non-probe line is returned instead.
pub(crate) async fn read_line<T: LineTransport>(transport: &mut T) -> Result<String, Error> {
    loop {
        let line = transport.read().await?;
        if line == PING {
            debug!("liveness probe received, replying");
            transport.write(PONG.as_bytes()).await?;
            continue;
        }
        return Ok(line);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::testing::MockTransport;

    #[tokio::test]
    async fn test_probe_is_answered_and_hidden() {
        let mut transport = MockTransport::with_script(&[
            "PING :tmi.twitch.tv\r\n",
            ":a!a@a.tmi.twitch.tv PRIVMSG #chan :hi\r\n",
        ]);
        transport.connected = true;

        let line = read_line(&mut transport).await.unwrap();
        assert_eq!(line, ":a!a@a.tmi.twitch.tv PRIVMSG #chan :hi\r\n");
        assert_eq!(transport.writes, vec!["PONG :tmi.twitch.tv\r\n"]);
    }

    #[tokio::test]
    async fn test_non_probe_passes_through() {
        let mut transport =
            MockTransport::with_script(&[":a!a@a.tmi.twitch.tv PRIVMSG #chan :hi\r\n"]);
        transport.connected = true;

        read_line(&mut transport).await.unwrap();
        assert!(transport.writes.is_empty());
    }
}
