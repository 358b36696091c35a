//! Line-delimited JSON transport between cluster nodes.
//!
//! Each exchange opens a fresh TCP connection, writes one message line and,
//! for request/response kinds, reads one response line. Every network step
//! runs under the configured request timeout. Public entry points never
//! return errors: failures are logged and surface as `false` / `None`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::protocol::{AtomPayload, ClusterMessage, ClusterResponse};
use crate::atom::Atom;
use crate::config::CompressionConfig;
use crate::error::{ClusterError, Result};

#[derive(Debug, Clone)]
pub struct ClusterTransport {
    compression: CompressionConfig,
    timeout: Duration,
}

impl ClusterTransport {
    pub fn new(compression: CompressionConfig, timeout: Duration) -> Self {
        Self {
            compression,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Serializes an atom, compressing bodies above the configured threshold.
    pub fn encode_atom(&self, atom: &Atom) -> Result<AtomPayload> {
        let json = serde_json::to_string(atom)?;
        if self.compression.enabled && json.len() > self.compression.threshold_bytes {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(json.as_bytes())?;
            let compressed = encoder.finish()?;
            return Ok(AtomPayload {
                atom_data: STANDARD.encode(compressed),
                compressed: true,
            });
        }
        Ok(AtomPayload {
            atom_data: json,
            compressed: false,
        })
    }

    /// Inverse of [`encode_atom`](Self::encode_atom); honours the `compressed`
    /// flag regardless of the local compression settings.
    pub fn decode_atom(payload: &AtomPayload) -> Result<Atom> {
        if !payload.compressed {
            return Ok(serde_json::from_str(&payload.atom_data)?);
        }
        let raw = STANDARD
            .decode(payload.atom_data.as_bytes())
            .map_err(|e| ClusterError::Compression(format!("invalid base64: {}", e)))?;
        let mut json = String::new();
        GzDecoder::new(raw.as_slice())
            .read_to_string(&mut json)
            .map_err(|e| ClusterError::Compression(format!("invalid gzip stream: {}", e)))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Fire-and-forget delivery. Returns whether the line was written.
    pub async fn send(&self, addr: &str, message: &ClusterMessage) -> bool {
        match self.try_send(addr, message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Send {} to {} failed: {}", message.kind(), addr, e);
                false
            }
        }
    }

    /// Request/response exchange. `None` on connect failure, timeout, closed
    /// connection or an unparseable reply.
    pub async fn request(&self, addr: &str, message: &ClusterMessage) -> Option<ClusterResponse> {
        match self.try_request(addr, message).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!("Request {} to {} failed: {}", message.kind(), addr, e);
                None
            }
        }
    }

    pub async fn try_send(&self, addr: &str, message: &ClusterMessage) -> Result<()> {
        let exchange = async {
            let mut stream = TcpStream::connect(addr).await?;
            write_frame(&mut stream, message).await?;
            stream.shutdown().await?;
            Ok(())
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClusterError::Timeout(format!("{} to {}", message.kind(), addr)))?
    }

    pub async fn try_request(&self, addr: &str, message: &ClusterMessage) -> Result<ClusterResponse> {
        let exchange = async {
            let stream = TcpStream::connect(addr).await?;
            let (read_half, mut write_half) = stream.into_split();
            write_frame(&mut write_half, message).await?;

            let mut reader = BufReader::new(read_half);
            read_frame::<_, ClusterResponse>(&mut reader)
                .await?
                .ok_or_else(|| ClusterError::NoResponse(addr.to_string()))
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClusterError::Timeout(format!("{} to {}", message.kind(), addr)))?
    }
}

/// Writes `value` as a single JSON line and flushes.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one JSON line. `Ok(None)` when the peer closed before sending anything.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}
