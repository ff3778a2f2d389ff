//! Membership wire format (postcard).
//!
//! ```text
//! UDP datagram: Packet { from, messages: [bytes] }
//! TCP stream:   [LEN: u32 BE][StreamMessage]
//!
//! StreamMessage = PushPull { join, sender, members, user_state }
//!               | Gossip(Packet)
//! ```
//!
//! A push/pull is one frame each way: the initiator writes its frame, the
//! responder answers with a bare `PushPull`. A stream `Gossip` frame carries
//! broadcasts too large for a datagram and gets no answer.

use gossip_counter::membership::Member;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MembershipError;

/// Worst-case postcard length prefix for one message inside a [`Packet`].
pub(crate) const MESSAGE_OVERHEAD: usize = 5;

/// A batch of gossip broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Packet {
    pub from: String,
    pub messages: Vec<Vec<u8>>,
}

impl Packet {
    /// Encoded size of this packet with no messages, plus the worst-case
    /// length prefix of the message list.
    pub(crate) fn header_len(from: &str) -> usize {
        from.len() + 2 * MESSAGE_OVERHEAD
    }
}

/// One side of a full-state exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PushPull {
    pub join: bool,
    pub sender: Member,
    pub members: Vec<Member>,
    pub user_state: Vec<u8>,
}

/// First frame on every TCP connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum StreamMessage {
    PushPull(PushPull),
    Gossip(Packet),
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MembershipError> {
    Ok(postcard::to_allocvec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MembershipError> {
    Ok(postcard::from_bytes(bytes)?)
}

pub(crate) async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), MembershipError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode(value)?;
    let len = u32::try_from(bytes.len()).map_err(|_| MembershipError::FrameTooLarge {
        len: bytes.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_u32(len).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub(crate) async fn read_frame<R, T>(reader: &mut R, max: usize) -> Result<T, MembershipError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > max {
        return Err(MembershipError::FrameTooLarge { len, max });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    decode(&buf)
}
