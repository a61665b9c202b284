use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{MxrpcError, Result};
use crate::protocol::{Request, Response};

/// Maximum frame size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// JSON codec for encoding/decoding RPC envelopes
///
/// # Example
///
/// ```
/// use mxrpc_common::transport::JsonCodec;
/// use mxrpc_common::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new("Worker.execute", json!({"operation": "transpose"}));
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Writes one frame: `[4-byte length as u32 big-endian] + [data]`.
///
/// # Errors
///
/// `InvalidRequest` if `data` exceeds [`MAX_MESSAGE_SIZE`], `Connection` if
/// the write fails.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(MxrpcError::InvalidRequest(format!(
            "Message too large: {} bytes (max {} bytes)",
            data.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = data.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| MxrpcError::Connection(format!("Failed to write length prefix: {}", e)))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| MxrpcError::Connection(format!("Failed to write data: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| MxrpcError::Connection(format!("Failed to flush stream: {}", e)))?;

    Ok(())
}

/// Reads one frame written by [`write_frame`].
///
/// Returns `Ok(None)` when the peer closes the stream cleanly between frames.
///
/// # Errors
///
/// `InvalidResponse` for a length prefix above [`MAX_MESSAGE_SIZE`],
/// `Connection` for a stream that ends mid-frame or fails.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(MxrpcError::Connection(format!("Failed to read length: {}", e)));
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(MxrpcError::InvalidResponse(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| MxrpcError::Connection(format!("Failed to read data: {}", e)))?;

    Ok(Some(buf))
}
