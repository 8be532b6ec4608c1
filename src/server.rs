//! TCP issuance service.
//!
//! Each accepted connection runs on its own task and may carry any number of
//! request/response exchanges. Issuance itself is CPU bound and runs on the
//! blocking pool so the accept loop is never held up by a client.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::cert::Certificate;
use crate::codec;
use crate::config::{self, ServiceConfig};
use crate::error::{CaError, Result};
use crate::issuer;
use crate::protocol::{self, Response};
use crate::store::{self, CaIdentity};

/// Runtime limits of the issuance server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub io_timeout: Duration,
    pub max_request_bytes: usize,
    pub max_connections: usize,
    /// Lifetime of issued certificates.
    pub lifetime: time::Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for ServerSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            io_timeout: config.server.io_timeout(),
            max_request_bytes: config.server.max_request_bytes,
            max_connections: config.server.max_connections,
            lifetime: config.ca.lifetime(),
        }
    }
}

pub struct IssuanceServer {
    listener: TcpListener,
    ca: Arc<CaIdentity>,
    settings: Arc<ServerSettings>,
    connections: Arc<Semaphore>,
}

impl IssuanceServer {
    /// Binds a listener on `addr` for an already loaded CA.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        ca: CaIdentity,
        settings: ServerSettings,
    ) -> Result<Self> {
        if settings.max_connections == 0 || settings.max_request_bytes > config::MAX_FRAME_BYTES {
            return Err(CaError::ConfigError(format!(
                "invalid server settings {settings:?}"
            )));
        }
        let listener = TcpListener::bind(addr).await?;
        let connections = Arc::new(Semaphore::new(settings.max_connections));
        Ok(Self {
            listener,
            ca: Arc::new(ca),
            settings: Arc::new(settings),
            connections,
        })
    }

    /// Validates `config`, loads the CA and binds the listener.
    ///
    /// The CA is loaded first; if it cannot be loaded nothing is bound.
    pub async fn start(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        let ca = store::load_ca(&config.ca.key_path, &config.ca.cert_path)?;
        Self::bind(config.server.listen_addr()?, ca, ServerSettings::from(config)).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn ca(&self) -> &CaIdentity {
        &self.ca
    }

    /// Serves connections until the process exits.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// Connections already accepted are left to finish on their own.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = self.local_addr()?;
        info!(
            addr = %local_addr,
            ca = %self.ca.certificate().subject_dn(),
            max_connections = self.settings.max_connections,
            "issuance server listening"
        );

        tokio::pin!(shutdown);
        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.connections.clone().acquire_owned() => permit
                    .map_err(|e| CaError::ConnectionError(e.to_string()))?,
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            debug!(%peer, "accepted connection");
            let ca = self.ca.clone();
            let settings = self.settings.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, ca, settings).await {
                    warn!(%peer, error = %e, "connection closed with error");
                }
                drop(permit);
            });
        }

        info!(addr = %local_addr, "issuance server stopped accepting connections");
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ca: Arc<CaIdentity>,
    settings: Arc<ServerSettings>,
) -> Result<()> {
    loop {
        let read = timeout(
            settings.io_timeout,
            protocol::read_frame(&mut stream, settings.max_request_bytes),
        )
        .await;

        let frame = match read {
            Err(_) => {
                info!(%peer, timeout = ?settings.io_timeout, "timed out waiting for request");
                return Ok(());
            }
            Ok(Ok(None)) => {
                debug!(%peer, "client closed connection");
                return Ok(());
            }
            Ok(Ok(Some(frame))) => frame,
            Ok(Err(err @ CaError::RequestTooLarge { size, .. })) => {
                warn!(%peer, error = %err, "rejected request");
                send(&mut stream, &Response::from_error(&err), settings.io_timeout).await?;
                discard(&mut stream, peer, size, settings.io_timeout).await;
                return Ok(());
            }
            Ok(Err(e)) => return Err(e),
        };

        debug!(%peer, bytes = frame.len(), "received request");
        let response = match process_request(frame, ca.clone(), settings.lifetime).await {
            Ok(cert) => Response::Certificate(cert),
            Err(e) => {
                if e.is_client_error() {
                    warn!(%peer, code = e.code(), error = %e, "rejected request");
                } else {
                    error!(%peer, code = e.code(), error = %e, "issuance failed");
                }
                Response::from_error(&e)
            }
        };

        send(&mut stream, &response, settings.io_timeout).await?;
    }
}

async fn process_request(
    frame: Vec<u8>,
    ca: Arc<CaIdentity>,
    lifetime: time::Duration,
) -> Result<Certificate> {
    tokio::task::spawn_blocking(move || {
        let csr = codec::decode_csr(&frame)?;
        issuer::issue(&csr, &ca, lifetime)
    })
    .await
    .map_err(|e| CaError::SigningError(format!("issuance task failed: {e}")))?
}

async fn send(stream: &mut TcpStream, response: &Response, io_timeout: Duration) -> Result<()> {
    let payload = response.encode()?;
    timeout(io_timeout, protocol::write_frame(stream, &payload))
        .await
        .map_err(|_| CaError::ConnectionError("timed out sending response".to_string()))?
}

/// Reads and drops the unread body of a rejected frame so closing the socket
/// does not reset the connection before the client sees the response.
async fn discard(stream: &mut TcpStream, peer: SocketAddr, size: usize, io_timeout: Duration) {
    let mut body = (&mut *stream).take(size as u64);
    match timeout(io_timeout, tokio::io::copy(&mut body, &mut tokio::io::sink())).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(%peer, error = %e, "failed to drain rejected request"),
        Err(_) => info!(%peer, "timed out draining rejected request"),
    }
}
