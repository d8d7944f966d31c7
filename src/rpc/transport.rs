//! Framing helpers shared by the RPC client and server: length-delimited
//! frames carrying `serde_json`-encoded envelopes (§4.I, §6 "Wire format").
//! Driven directly off `tokio_util`'s codec traits against a raw
//! `TcpStream`, so a single connection can be read and written from
//! separate call sites without wrapping it in a `Sink`/`Stream` adapter.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::errors::RpcError;

const READ_CHUNK: usize = 8 * 1024;

pub struct RpcTransport {
    stream: TcpStream,
    codec: LengthDelimitedCodec,
    read_buf: BytesMut,
}

impl RpcTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            codec: LengthDelimitedCodec::builder()
                .max_frame_length(64 * 1024 * 1024)
                .new_codec(),
            read_buf: BytesMut::new(),
        }
    }

    pub async fn send<T: serde::Serialize>(&mut self, value: &T) -> Result<(), RpcError> {
        let payload = serde_json::to_vec(value).map_err(|e| RpcError::Malformed {
            message: e.to_string(),
        })?;
        let mut encoded = BytesMut::new();
        self.codec
            .encode(Bytes::from(payload), &mut encoded)
            .map_err(|e| RpcError::Malformed {
                message: e.to_string(),
            })?;
        self.stream
            .write_all(&encoded)
            .await
            .map_err(|e| RpcError::ConnectionFailed {
                message: e.to_string(),
            })
    }

    /// Blocks until one full frame has arrived, decodes it as JSON.
    /// Returns `RpcError::Closed` if the peer hangs up mid-frame.
    pub async fn recv<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, RpcError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buf).map_err(|e| {
                RpcError::Malformed {
                    message: e.to_string(),
                }
            })? {
                return serde_json::from_slice(&frame).map_err(|e| RpcError::Malformed {
                    message: e.to_string(),
                });
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| RpcError::ConnectionFailed {
                    message: e.to_string(),
                })?;
            if n == 0 {
                return Err(RpcError::Closed);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}
