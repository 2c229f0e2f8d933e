//! Work items carried by the node queues

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tether_core::{Charset, TetherError};

/// A hole-punch attempt queued for the punch worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunchRequest {
    /// Pipe the punch is for
    pub pipe_id: String,
    /// Index of the local interface to punch from
    pub interface_index: usize,
    /// Remote address to punch towards
    pub peer: SocketAddr,
}

/// An outbound signaling message.
///
/// On the wire it is a single text line: the node id and pipe id encoded
/// with the shared [`Charset`], then the free-form payload, separated by
/// spaces. Both ends must agree on the charset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Raw id of the sending node
    pub node_id: Vec<u8>,
    /// Raw id of the pipe the message belongs to
    pub pipe_id: Vec<u8>,
    /// Free-form text; may contain spaces
    pub payload: String,
}

impl SignalMessage {
    /// Message from `node_id` about `pipe_id`
    pub fn new(node_id: impl Into<Vec<u8>>, pipe_id: impl Into<Vec<u8>>, payload: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            pipe_id: pipe_id.into(),
            payload: payload.into(),
        }
    }

    /// Encode as one wire line.
    pub fn to_line(&self, charset: &Charset) -> String {
        format!(
            "{} {} {}",
            charset.encode(&self.node_id),
            charset.encode(&self.pipe_id),
            self.payload
        )
    }

    /// Parse a line produced by [`to_line`](Self::to_line).
    pub fn from_line(line: &str, charset: &Charset) -> Result<Self, TetherError> {
        let mut fields = line.splitn(3, ' ');
        let (Some(node_id), Some(pipe_id), Some(payload)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(TetherError::invalid(format!(
                "signal line needs node id, pipe id and payload: {line:?}"
            )));
        };

        Ok(Self {
            node_id: charset.decode(node_id)?,
            pipe_id: charset.decode(pipe_id)?,
            payload: payload.to_string(),
        })
    }
}
