//! Application-level messages produced by the receive loop.

use std::borrow::Cow;

use bytes::Bytes;

use crate::{frame::Opcode, registry::ConnectionId};

/// A complete data frame received from a client.
///
/// Only Text and Binary frames become messages; control frames are handled
/// by the connection itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Connection the message arrived on.
    pub client_id: ConnectionId,
    /// Either [`Opcode::Text`] or [`Opcode::Binary`].
    pub opcode: Opcode,
    /// Unmasked payload bytes.
    pub payload: Bytes,
}

impl Message {
    /// Create a message from its parts.
    #[must_use]
    pub fn new(client_id: ConnectionId, opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            client_id,
            opcode,
            payload: payload.into(),
        }
    }

    /// Whether the message came from a Text frame.
    #[must_use]
    pub fn is_text(&self) -> bool { self.opcode == Opcode::Text }

    /// View the payload as UTF-8, replacing invalid sequences.
    ///
    /// ```
    /// use wshub::{frame::Opcode, message::Message, registry::ConnectionId};
    ///
    /// let msg = Message::new(ConnectionId::new(1), Opcode::Text, "hi");
    /// assert_eq!(msg.text(), "hi");
    /// ```
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.payload) }
}
