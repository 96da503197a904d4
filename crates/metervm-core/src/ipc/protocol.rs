//! Wire messages for remote targets.
//!
//! Frames are a 4-byte length (u32 LE) followed by an rkyv-encoded body.

use std::io::{Read, Write};

use rkyv::{Archive, Deserialize, Serialize};

use crate::engine::Operation;
use crate::error::{Error, Result};

/// Default upper bound for a framed message (100 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// An operation addressed to a target owned by another host.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RemoteRequest {
    /// Correlates the response with the caller's pending promise.
    pub id: u64,
    pub target: String,
    pub operation: Operation,
}

/// Reply to a [`RemoteRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub id: u64,
    /// Serialized `ExecutionResult`, forwarded to the promise untouched.
    pub payload: Vec<u8>,
}

/// Write one length-prefixed frame.
pub fn write_message<W: Write>(writer: &mut W, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| Error::Ipc(format!("IPC message too large: {} bytes", body.len())))?;

    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(body)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read one length-prefixed frame, rejecting bodies above `max_len`.
pub fn read_message<R: Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > max_len {
        return Err(Error::Ipc(format!(
            "IPC message too large: {} bytes (limit {})",
            len, max_len
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    Ok(body)
}

fn aligned(bytes: &[u8]) -> rkyv::util::AlignedVec<16> {
    let mut buf = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
    buf.extend_from_slice(bytes);
    buf
}

pub fn encode_request(request: &RemoteRequest) -> Result<Vec<u8>> {
    rkyv::to_bytes::<rkyv::rancor::Error>(request)
        .map(|b| b.to_vec())
        .map_err(|e| Error::Serialization(format!("Failed to encode request: {}", e)))
}

pub fn decode_request(bytes: &[u8]) -> Result<RemoteRequest> {
    rkyv::from_bytes::<RemoteRequest, rkyv::rancor::Error>(&aligned(bytes))
        .map_err(|e| Error::Deserialization(format!("Failed to decode request: {}", e)))
}

pub fn encode_response(response: &RemoteResponse) -> Result<Vec<u8>> {
    rkyv::to_bytes::<rkyv::rancor::Error>(response)
        .map(|b| b.to_vec())
        .map_err(|e| Error::Serialization(format!("Failed to encode response: {}", e)))
}

pub fn decode_response(bytes: &[u8]) -> Result<RemoteResponse> {
    rkyv::from_bytes::<RemoteResponse, rkyv::rancor::Error>(&aligned(bytes))
        .map_err(|e| Error::Deserialization(format!("Failed to decode response: {}", e)))
}
