//! Client side of the issuance protocol.

use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tracing::debug;

use crate::cert::Certificate;
use crate::config::MAX_FRAME_BYTES;
use crate::csr::CertificateSigningRequest;
use crate::error::{CaError, Result};
use crate::protocol::{self, Response};

/// An open connection to an issuance server, reusable for several requests.
pub struct IssuanceClient {
    stream: TcpStream,
    io_timeout: Duration,
}

impl IssuanceClient {
    pub async fn connect(addr: impl ToSocketAddrs, io_timeout: Duration) -> Result<Self> {
        let stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| CaError::ConnectionError("timed out connecting".to_string()))??;
        Ok(Self { stream, io_timeout })
    }

    /// Sends a raw request payload and returns the decoded reply.
    pub async fn send_raw(&mut self, payload: &[u8]) -> Result<Response> {
        timeout(self.io_timeout, protocol::write_frame(&mut self.stream, payload))
            .await
            .map_err(|_| CaError::ConnectionError("timed out sending request".to_string()))??;

        let reply = timeout(
            self.io_timeout,
            protocol::read_frame(&mut self.stream, MAX_FRAME_BYTES),
        )
        .await
        .map_err(|_| CaError::ConnectionError("timed out waiting for response".to_string()))??
        .ok_or_else(|| {
            CaError::ConnectionError("server closed the connection without replying".to_string())
        })?;

        Response::decode(&reply)
    }

    /// Submits `csr` and returns the issued certificate.
    ///
    /// An error reply from the server becomes [`CaError::Rejected`]. The
    /// certificate is only decoded, not verified.
    pub async fn request(&mut self, csr: &CertificateSigningRequest) -> Result<Certificate> {
        let pem = csr.to_pem()?;
        match self.send_raw(pem.as_bytes()).await? {
            Response::Certificate(cert) => {
                debug!(serial = %cert.serial_hex(), "received certificate");
                Ok(cert)
            }
            Response::Error { code, message } => Err(CaError::Rejected { code, message }),
        }
    }
}

/// Opens a connection, submits a single request and returns the certificate.
pub async fn request_certificate(
    addr: impl ToSocketAddrs,
    csr: &CertificateSigningRequest,
    io_timeout: Duration,
) -> Result<Certificate> {
    let mut client = IssuanceClient::connect(addr, io_timeout).await?;
    client.request(csr).await
}
