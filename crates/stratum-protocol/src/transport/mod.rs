//! # Transport
//!
//! Opens the byte stream a client speaks Stratum over: plain TCP, or TLS
//! without certificate validation. Either way the stream is split into a
//! boxed read half for the read loop and a boxed write half kept under the
//! connection lock.

mod tls;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::info;

use crate::config::{ClientConfig, TransportSecurity};
use crate::domain::ClientError;

/// Read half of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Connect to the configured server.
pub async fn connect(config: &ClientConfig) -> Result<(BoxedReader, BoxedWriter), ClientError> {
    info!(server = %config.server, security = ?config.security, "Opening a socket");

    let tcp = TcpStream::connect(&config.server)
        .await
        .map_err(|e| ClientError::Io(format!("connect to {}: {}", config.server, e)))?;
    tcp.set_nodelay(true)?;

    match config.security {
        TransportSecurity::Plain => {
            let (reader, writer) = tokio::io::split(tcp);
            Ok((Box::new(reader), Box::new(writer)))
        }
        TransportSecurity::TlsAcceptAnyCertificate => {
            let stream = tls::connect_accept_any(tcp, config.host()).await?;
            let (reader, writer) = tokio::io::split(stream);
            Ok((Box::new(reader), Box::new(writer)))
        }
    }
}
