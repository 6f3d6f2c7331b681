//! The framing/codec adapter between the byte-level socket and the
//! message-level manager.
//!
//! The core owns a pipeline's lifetime (spawns it, stops it on every path
//! out of `Connected`) but not its internals: encoding, decoding and framing
//! are entirely this module's concern. A decode failure on a frame surfaces
//! as a [`PackageIn`] carrying a failure payload, never as a pipeline death.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::warn;

use crate::correlation::CorrelationId;
use crate::error::{ConnectError, FrameError};
use crate::message::{Credentials, Message, MessageFailure, PackageIn, PackageOut};

/// Wire envelope inside each length-delimited frame: a raw 16-byte
/// correlation id, followed by a bincode-encoded `Rest`. The id is framed
/// outside the bincode blob on purpose — `bincode::deserialize` gives no
/// partial result on failure, so if the id lived inside the same struct a
/// corrupt `body` would take the id down with it and every decode failure
/// would surface as an unmatchable stray. Splitting the id out means a
/// corrupt body still decodes to a failure the manager can route back to
/// the operation that sent it.
const CORRELATION_ID_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct Rest {
    credentials: Option<Credentials>,
    body: Message,
}

/// What the manager depends on from a pipeline: feed it outbound packages,
/// receive decoded inbound packages back, observe death.
pub trait Pipeline: Send {
    /// Encode and write a single outbound package.
    fn send(&mut self, pkg: PackageOut) -> Result<(), FrameError>;
}

/// Concrete length-delimited/bincode pipeline over a connected TCP socket.
///
/// Owns the socket outright; runs its read loop on a dedicated task that
/// forwards decoded [`PackageIn`] values (or, on a framing/decode failure, a
/// failure-carrying `PackageIn`) to `sink`. The task's exit — the `sink`
/// sender being dropped by this struct, or the socket erroring out — is how
/// the manager observes pipeline death: its receiving end simply closes.
pub struct TcpPipeline {
    writer: tokio::sync::mpsc::UnboundedSender<PackageOut>,
    _reader_task: tokio::task::JoinHandle<()>,
    _writer_task: tokio::task::JoinHandle<()>,
}

impl TcpPipeline {
    /// Connect with a bounded timeout, governed by `connectionTimeout`.
    pub async fn connect(address: SocketAddr, timeout: std::time::Duration) -> Result<TcpStream, ConnectError> {
        tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ConnectError::Timeout {
                address: address.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|source| ConnectError::Io {
                address: address.to_string(),
                source,
            })
    }

    /// Wrap a connected socket, spawning the read and write halves as
    /// separate tasks so a slow consumer on one side cannot stall the other.
    pub fn new(socket: TcpStream, inbound_sink: mpsc::UnboundedSender<PackageIn>) -> Self {
        let framed = Framed::new(socket, LengthDelimitedCodec::new());
        let (mut read_half, mut write_half) = framed.split();

        let reader_task = tokio::spawn(async move {
            while let Some(frame) = read_half.next().await {
                let pkg = match frame {
                    Ok(bytes) => decode(&bytes),
                    Err(e) => {
                        warn!(error = %e, "pipeline read error, treating as death");
                        break;
                    }
                };
                if inbound_sink.send(pkg).is_err() {
                    break;
                }
            }
        });

        let (writer, mut outbound_rx) = mpsc::unbounded_channel::<PackageOut>();
        let writer_task = tokio::spawn(async move {
            while let Some(pkg) = outbound_rx.recv().await {
                let bytes = encode(&pkg);
                if write_half.send(bytes).await.is_err() {
                    break;
                }
            }
        });

        Self {
            writer,
            _reader_task: reader_task,
            _writer_task: writer_task,
        }
    }
}

impl Pipeline for TcpPipeline {
    fn send(&mut self, pkg: PackageOut) -> Result<(), FrameError> {
        self.writer
            .send(pkg)
            .map_err(|_| FrameError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipeline writer closed")))
    }
}

/// Encode a single package into the bytes a length-delimited frame should
/// carry. Exposed so integration tests (and any out-of-process stand-in
/// server) can speak the same wire format without reaching into this
/// module's private `Rest` type, mirroring how this lineage's framed
/// protocol crates expose their frame codec as a public free function.
pub fn encode_frame(pkg: &PackageOut) -> bytes::Bytes {
    encode(pkg)
}

/// Decode the bytes of a single length-delimited frame into a `PackageIn`.
/// Never fails outwardly: a malformed frame decodes to a failure payload,
/// matching the pipeline's own behavior on the wire.
pub fn decode_frame(bytes: &[u8]) -> PackageIn {
    decode(&bytes::BytesMut::from(bytes))
}

fn encode(pkg: &PackageOut) -> bytes::Bytes {
    let rest = Rest {
        credentials: pkg.credentials.clone(),
        body: pkg.message.clone(),
    };
    match bincode::serialize(&rest) {
        Ok(rest_bytes) => {
            let mut out = bytes::BytesMut::with_capacity(CORRELATION_ID_LEN + rest_bytes.len());
            out.extend_from_slice(pkg.correlation_id.as_bytes());
            out.extend_from_slice(&rest_bytes);
            out.freeze()
        }
        Err(e) => {
            warn!(error = %e, "failed to encode outbound package");
            bytes::Bytes::new()
        }
    }
}

fn decode(bytes: &bytes::BytesMut) -> PackageIn {
    if bytes.len() < CORRELATION_ID_LEN {
        // Too short to even carry an id; nothing can be routed back.
        return PackageIn {
            correlation_id: CorrelationId::from_bytes([0; 16]),
            result: Err(MessageFailure::Decode("frame shorter than a correlation id".to_string())),
        };
    }

    let mut id_bytes = [0u8; CORRELATION_ID_LEN];
    id_bytes.copy_from_slice(&bytes[..CORRELATION_ID_LEN]);
    let correlation_id = CorrelationId::from_bytes(id_bytes);

    match bincode::deserialize::<Rest>(&bytes[CORRELATION_ID_LEN..]) {
        Ok(rest) => PackageIn {
            correlation_id,
            result: Ok(rest.body),
        },
        Err(e) => PackageIn {
            // The id decoded independently of the body, so even a corrupt
            // body still routes back to the operation that sent it.
            correlation_id,
            result: Err(MessageFailure::Decode(e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_then_decode_roundtrips_a_ping() {
        let id = CorrelationId::new();
        let pkg = PackageOut {
            message: Message::Ping,
            correlation_id: id,
            credentials: None,
        };
        let bytes = encode(&pkg);
        let decoded = decode(&bytes::BytesMut::from(&bytes[..]));
        assert_eq!(decoded.correlation_id, id);
        assert_eq!(decoded.result, Ok(Message::Ping));
    }

    #[test]
    fn a_corrupt_body_still_carries_its_real_correlation_id() {
        let id = CorrelationId::new();
        let pkg = PackageOut {
            message: Message::Ping,
            correlation_id: id,
            credentials: None,
        };
        let mut bytes = encode(&pkg).to_vec();
        // Mangle everything past the id so the body fails to decode while
        // the id prefix stays intact.
        for byte in bytes.iter_mut().skip(CORRELATION_ID_LEN) {
            *byte = 0xff;
        }
        let decoded = decode(&bytes::BytesMut::from(&bytes[..]));
        assert_eq!(decoded.correlation_id, id);
        assert!(decoded.result.is_err());
    }

    #[test]
    fn garbage_bytes_decode_to_a_failure_not_a_panic() {
        let garbage = bytes::BytesMut::from(&b"\x01\x02\x03"[..]);
        let decoded = decode(&garbage);
        assert!(decoded.result.is_err());
    }
}
