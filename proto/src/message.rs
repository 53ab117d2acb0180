use crate::bin::NTBinaryMessage;
use crate::error::Result;
use crate::text::NTTextMessage;

/// A raw WebSocket data frame, before any NT4 decoding
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// The decoded contents of a single [`Frame`]
///
/// A text frame always holds a batch of control messages, a binary frame a batch of value updates.
///
/// [`Frame`]: ./enum.Frame.html
#[derive(Debug, PartialEq)]
pub enum NTMessage {
    Text(Vec<NTTextMessage>),
    Binary(Vec<NTBinaryMessage>),
}

impl NTMessage {
    pub fn single_text(msg: NTTextMessage) -> NTMessage {
        NTMessage::Text(vec![msg])
    }

    pub fn single_bin(msg: NTBinaryMessage) -> NTMessage {
        NTMessage::Binary(vec![msg])
    }

    /// Decodes a whole frame
    ///
    /// Text messages with an unrecognized method are kept as-is; they only fail once their body is requested
    /// with [`NTTextMessage::data`]. Binary updates with an unrecognized type index are skipped.
    /// Any other malformation rejects the whole frame.
    ///
    /// [`NTTextMessage::data`]: ./struct.NTTextMessage.html#method.data
    pub fn decode(frame: &Frame) -> Result<NTMessage> {
        match frame {
            Frame::Text(text) => Ok(NTMessage::Text(serde_json::from_str(text)?)),
            Frame::Binary(blob) => Ok(NTMessage::Binary(NTBinaryMessage::from_slice(&blob[..])?)),
        }
    }

    pub fn encode(&self) -> Result<Frame> {
        match self {
            NTMessage::Text(msgs) => Ok(Frame::Text(serde_json::to_string(msgs)?)),
            NTMessage::Binary(msgs) => {
                let mut blob = Vec::new();
                for msg in msgs {
                    blob.extend(rmp_serde::to_vec(msg)?);
                }
                Ok(Frame::Binary(blob))
            }
        }
    }
}
