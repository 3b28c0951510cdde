//! Stream types for mailbox connections.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::MailboxError;
use crate::config::Security;

/// Tag used for the one command we send before handing the stream over.
const STARTTLS_TAG: &str = "mf0";

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl fmt::Debug for ImapStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("ImapStream::Plain"),
            Self::Tls(_) => f.write_str("ImapStream::Tls"),
        }
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with default root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Opens a stream to `host:port` using the requested security mode.
///
/// For [`Security::StartTls`] the server greeting is consumed and `STARTTLS`
/// is negotiated before the TLS handshake, so the returned stream is ready
/// for `LOGIN`.
///
/// # Errors
///
/// Returns [`MailboxError::Connection`] if the TCP connection, the STARTTLS
/// exchange or the TLS handshake fails.
pub async fn connect(host: &str, port: u16, security: Security) -> Result<ImapStream, MailboxError> {
    let addr = format!("{host}:{port}");
    let mut tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| MailboxError::Connection(format!("{addr}: {e}")))?;

    match security {
        Security::None => Ok(ImapStream::Plain(tcp)),
        Security::Implicit => upgrade(tcp, host).await,
        Security::StartTls => {
            negotiate_starttls(&mut tcp).await?;
            upgrade(tcp, host).await
        }
    }
}

async fn upgrade(tcp: TcpStream, host: &str) -> Result<ImapStream, MailboxError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| MailboxError::Connection(format!("invalid server name {host}: {e}")))?;
    let tls = create_tls_connector()
        .connect(server_name, tcp)
        .await
        .map_err(|e| MailboxError::Connection(format!("TLS handshake failed: {e}")))?;
    Ok(ImapStream::Tls(Box::new(tls)))
}

/// Reads the greeting, sends `STARTTLS` and waits for the tagged `OK`.
async fn negotiate_starttls(tcp: &mut TcpStream) -> Result<(), MailboxError> {
    let mut reader = BufReader::new(tcp);
    let mut line = String::new();

    read_line(&mut reader, &mut line).await?;
    if !line.starts_with("* OK") && !line.starts_with("* PREAUTH") {
        return Err(MailboxError::Connection(format!(
            "unexpected greeting: {}",
            line.trim_end()
        )));
    }
    debug!(greeting = %line.trim_end(), "Negotiating STARTTLS");

    reader
        .get_mut()
        .write_all(format!("{STARTTLS_TAG} STARTTLS\r\n").as_bytes())
        .await
        .map_err(|e| MailboxError::Connection(e.to_string()))?;

    loop {
        line.clear();
        read_line(&mut reader, &mut line).await?;
        let Some(status) = line.strip_prefix(STARTTLS_TAG) else {
            continue;
        };
        return if status.trim_start().starts_with("OK") {
            Ok(())
        } else {
            Err(MailboxError::Connection(format!(
                "STARTTLS refused: {}",
                status.trim()
            )))
        };
    }
}

async fn read_line<R>(reader: &mut R, line: &mut String) -> Result<(), MailboxError>
where
    R: AsyncBufReadExt + Unpin,
{
    let read = reader
        .read_line(line)
        .await
        .map_err(|e| MailboxError::Connection(e.to_string()))?;
    if read == 0 {
        return Err(MailboxError::Connection(
            "server closed the connection".to_string(),
        ));
    }
    Ok(())
}
