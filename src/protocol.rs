//! Wire format shared by the issuance server and client.
//!
//! Every message is a frame: a 4-byte big-endian length followed by that many
//! payload bytes. Requests carry a PEM `CERTIFICATE REQUEST`; responses carry
//! either a PEM `CERTIFICATE` or a PEM `ISSUANCE ERROR` block whose body is
//! `<code>: <message>`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cert::Certificate;
use crate::codec::{self, CERTIFICATE_LABEL};
use crate::error::{CaError, Result};

pub const ERROR_LABEL: &str = "ISSUANCE ERROR";
pub const FRAME_HEADER_LEN: usize = 4;

/// Reads one frame.
///
/// Returns `Ok(None)` if the peer closed the stream before sending any byte of
/// a new frame. A frame announcing more than `limit` bytes fails with
/// [`CaError::RequestTooLarge`] without its payload being read.
pub async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CaError::ConnectionError(
                "connection closed inside a frame header".to_string(),
            ));
        }
        filled += n;
    }

    let size = u32::from_be_bytes(header) as usize;
    if size > limit {
        return Err(CaError::RequestTooLarge { size, limit });
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Writes `payload` as a single frame and flushes.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let size = u32::try_from(payload.len())
        .map_err(|_| CaError::InvalidInput(format!("frame of {} bytes", payload.len())))?;
    writer.write_all(&size.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// A server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Certificate(Certificate),
    Error { code: String, message: String },
}

impl Response {
    pub fn from_error(err: &CaError) -> Self {
        Response::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Response::Certificate(cert) => Ok(cert.to_pem()?.into_bytes()),
            Response::Error { code, message } => {
                let body = format!("{code}: {message}");
                Ok(codec::der_to_pem(body.as_bytes(), ERROR_LABEL).into_bytes())
            }
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let pem = codec::parse_pem(payload)?;
        match pem.tag() {
            CERTIFICATE_LABEL => Ok(Response::Certificate(Certificate::from_der(
                pem.contents(),
            )?)),
            ERROR_LABEL => {
                let body = std::str::from_utf8(pem.contents())
                    .map_err(|e| CaError::MalformedPem(format!("error body: {e}")))?;
                let (code, message) = body.split_once(": ").unwrap_or((body, ""));
                Ok(Response::Error {
                    code: code.to_string(),
                    message: message.to_string(),
                })
            }
            other => Err(CaError::MalformedPem(format!(
                "unexpected response block {other}"
            ))),
        }
    }
}
