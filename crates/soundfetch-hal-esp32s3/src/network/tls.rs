//! TLS client transport over an embassy-net TCP socket.
//!
//! The session is set up without a CA chain, so the server certificate is
//! not verified.

use core::ffi::CStr;

use embassy_net::tcp::{self, TcpSocket};
use embassy_time::{Duration, WithTimeout};
use embedded_io_07::ErrorKind;
use embedded_io_async_07::{Read, Write};
use log::{debug, info};
use mbedtls_rs::{Certificates, Mode, Session, TlsError, TlsReference, TlsVersion};
use soundfetch_core::download::{BodySource, ReadStatus};

/// Longest host name accepted for SNI.
pub const MAX_SERVER_NAME_BYTES: usize = 96;

#[derive(Debug)]
pub enum TlsSetupError {
    ServerName,
    Session(TlsError),
    Handshake(TlsError),
}

/// NUL-terminates `host` into `buf` for the TLS server name.
pub fn server_name<'b>(
    host: &str,
    buf: &'b mut [u8; MAX_SERVER_NAME_BYTES + 1],
) -> Result<&'b CStr, TlsSetupError> {
    let bytes = host.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_SERVER_NAME_BYTES || bytes.contains(&0) {
        return Err(TlsSetupError::ServerName);
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    buf[bytes.len()] = 0;
    CStr::from_bytes_with_nul(&buf[..=bytes.len()]).map_err(|_| TlsSetupError::ServerName)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SocketError(pub tcp::Error);

impl embedded_io_07::Error for SocketError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ConnectionReset
    }
}

/// Exposes a connected [`TcpSocket`] through the byte-stream traits the TLS
/// session is generic over.
pub struct SocketIo<'s> {
    socket: TcpSocket<'s>,
}

impl<'s> SocketIo<'s> {
    pub fn new(socket: TcpSocket<'s>) -> Self {
        Self { socket }
    }
}

impl embedded_io_07::ErrorType for SocketIo<'_> {
    type Error = SocketError;
}

impl Read for SocketIo<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket.read(buf).await.map_err(SocketError)
    }
}

impl Write for SocketIo<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket.write(buf).await.map_err(SocketError)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket.flush().await.map_err(SocketError)
    }
}

/// Client TLS session that reads like a polled socket.
pub struct TlsStream<'a, 's> {
    session: Session<'a, SocketIo<'s>>,
    idle_poll: Duration,
}

impl<'a, 's> TlsStream<'a, 's> {
    /// Runs the TLS handshake on an already connected socket.
    pub async fn connect(
        socket: TcpSocket<'s>,
        server_name: &'a CStr,
        tls: TlsReference<'a>,
        idle_poll_ms: u64,
    ) -> Result<Self, TlsSetupError> {
        let mut session = Session::new(
            SocketIo::new(socket),
            Mode::Client {
                servername: server_name,
            },
            TlsVersion::Tls1_2,
            Certificates::default(),
            tls,
        )
        .map_err(TlsSetupError::Session)?;

        session
            .connect()
            .await
            .map_err(TlsSetupError::Handshake)?;
        info!("tls: handshake complete with {:?}", server_name);

        Ok(Self {
            session,
            idle_poll: Duration::from_millis(idle_poll_ms.max(1)),
        })
    }

    /// Sends `bytes` and flushes them out of the session.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TlsError> {
        Write::write_all(&mut self.session, bytes).await?;
        self.session.flush().await
    }
}

impl BodySource for TlsStream<'_, '_> {
    type Error = TlsError;

    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadStatus, Self::Error> {
        match self.session.read(buf).with_timeout(self.idle_poll).await {
            Err(_) => Ok(ReadStatus::Idle),
            Ok(Ok(0)) => {
                debug!("tls: peer closed");
                Ok(ReadStatus::Closed)
            }
            Ok(Ok(n)) => Ok(ReadStatus::Data(n)),
            Ok(Err(err)) => Err(err),
        }
    }
}
