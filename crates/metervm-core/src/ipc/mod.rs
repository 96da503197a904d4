//! Transport for remote targets.
//!
//! Provides length-prefixed rkyv framing, the request/response envelope,
//! and a [`RemoteLink`] that correlates responses with pending promises.

pub mod protocol;
mod remote;

pub use protocol::{
    DEFAULT_MAX_MESSAGE_SIZE, RemoteRequest, RemoteResponse, read_message, write_message,
};
pub use remote::{Delivery, ReceiveCallback, RemoteLink};
