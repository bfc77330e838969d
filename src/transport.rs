//! Line-buffered transport over TCP, optionally wrapped in TLS
//!
//! The server speaks a line-oriented protocol, so framing is centralized here
//! once: every other component can assume one call means one logical line,
//! regardless of how the underlying connection chunks bytes.

use std::io;
use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::errors::Error;
use crate::irc_constants::TERMINATOR;

/// Line-oriented transport abstraction. One concrete implementation,
/// [`TcpTransport`], talks to the real servers; test doubles implement the
/// same trait.
#[allow(async_fn_in_trait)]
pub trait LineTransport {
    /// Open the connection. Fails with [`Error::AlreadyConnected`] while a
    /// connection is open, or [`Error::ConnectFailed`] on a network or TLS
    /// failure.
    async fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<(), Error>;

    /// Close the connection and release its resources. Fails with
    /// [`Error::NotConnected`] if none is open.
    async fn disconnect(&mut self) -> Result<(), Error>;

    /// Append bytes to the write buffer and flush the portion up to and
    /// including the first terminator. Unterminated remainders stay buffered
    /// for the next call, so whole lines reach the wire atomically even when
    /// callers submit fragments.
    async fn write(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Await one full terminated line, returned with its terminator. At end
    /// of stream a partially buffered line is returned as-is; with nothing
    /// buffered the result is [`Error::ConnectionClosed`].
    async fn read(&mut self) -> Result<String, Error>;

    /// Whether a connection is open. Never has side effects.
    fn connected(&self) -> bool;

    /// Whether the open connection is wrapped in TLS. False when no
    /// connection is open.
    fn uses_tls(&self) -> bool;
}

enum Conn {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

impl Conn {
    async fn write_line(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Conn::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
            Conn::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
        }
    }

    async fn read_until_lf(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            Conn::Plain(stream) => stream.read_until(b'\n', buf).await,
            Conn::Tls(stream) => stream.read_until(b'\n', buf).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Conn::Plain(stream) => stream.shutdown().await,
            Conn::Tls(stream) => stream.shutdown().await,
        }
    }
}

/// TCP implementation of [`LineTransport`] with optional TLS
#[derive(Default)]
pub struct TcpTransport {
    conn: Option<Conn>,
    write_buf: Vec<u8>,
}

impl TcpTransport {
    /// Create a transport with no connection open
    pub fn new() -> Self {
        TcpTransport {
            conn: None,
            write_buf: Vec::new(),
        }
    }
}

impl LineTransport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<(), Error> {
        if self.conn.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(Error::ConnectFailed)?;

        let conn = if tls {
            let connector = TlsConnector::from(Arc::new(tls_config()));
            let dns_name = ServerName::try_from(host.to_string()).map_err(|err| {
                Error::ConnectFailed(io::Error::new(io::ErrorKind::InvalidInput, err))
            })?;
            let stream = connector
                .connect(dns_name, tcp)
                .await
                .map_err(Error::ConnectFailed)?;
            Conn::Tls(Box::new(BufReader::new(stream)))
        } else {
            Conn::Plain(BufReader::new(tcp))
        };

        debug!("connected to {}:{} (tls: {})", host, port, tls);
        self.write_buf.clear();
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        let mut conn = self.conn.take().ok_or(Error::NotConnected)?;
        conn.shutdown().await?;
        debug!("disconnected");
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        self.write_buf.extend_from_slice(data);

        if let Some(pos) = find_terminator(&self.write_buf) {
            let line: Vec<u8> = self.write_buf.drain(..pos + TERMINATOR.len()).collect();
            if let Err(err) = conn.write_line(&line).await {
                self.conn = None;
                return Err(err.into());
            }
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<String, Error> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        let mut buf = Vec::new();
        match conn.read_until_lf(&mut buf).await {
            Err(err) => {
                self.conn = None;
                Err(err.into())
            }
            Ok(0) => {
                self.conn = None;
                Err(Error::ConnectionClosed)
            }
            Ok(_) => Ok(String::from_utf8_lossy(&buf).into_owned()),
        }
    }

    fn connected(&self) -> bool {
        self.conn.is_some()
    }

    fn uses_tls(&self) -> bool {
        matches!(self.conn, Some(Conn::Tls(_)))
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR.as_bytes())
}

fn tls_config() -> TlsConfig {
    let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    TlsConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}
