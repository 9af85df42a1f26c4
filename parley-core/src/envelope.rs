//! Addressed transport envelope.
//!
//! The dialogue codec carries sequencing only. Transports move [`Envelope`]s,
//! which add the receiver, the sender and the protocol id around an encoded
//! message.

use prost::Message as _;

use crate::codec::{self, ProtocolCodec};
use crate::error::{DecodeError, DialogueError, ParleyError, ParleyResult};
use crate::message::Message;

/// Encoded message with its routing information.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub to: String,
    #[prost(string, tag = "2")]
    pub sender: String,
    #[prost(string, tag = "3")]
    pub protocol_specification_id: String,
    #[prost(bytes = "vec", tag = "4")]
    pub message: Vec<u8>,
}

impl Envelope {
    /// Wrap an addressed message for transport.
    pub fn wrap<P: ProtocolCodec>(message: &Message<P>) -> ParleyResult<Self> {
        let to = message.to().ok_or(DialogueError::MissingAddress("to"))?;
        let sender = message
            .sender()
            .ok_or(DialogueError::MissingAddress("sender"))?;
        Ok(Self {
            to: to.to_string(),
            sender: sender.to_string(),
            protocol_specification_id: P::PROTOCOL_ID.to_string(),
            message: codec::encode(message),
        })
    }

    /// Decode the carried message, stamping the envelope's addresses onto it.
    pub fn open<P: ProtocolCodec>(&self) -> ParleyResult<Message<P>> {
        if self.protocol_specification_id != P::PROTOCOL_ID {
            return Err(ParleyError::ProtocolMismatch {
                expected: P::PROTOCOL_ID.to_string(),
                found: self.protocol_specification_id.clone(),
            });
        }
        let message = codec::decode::<P>(&self.message)?;
        Ok(message
            .with_sender(self.sender.clone())
            .with_to(self.to.clone()))
    }

    /// Serialize for a byte-oriented transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Parse an envelope received from a transport.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::decode(bytes)?)
    }

    /// Address the envelope is destined for.
    pub fn destination(&self) -> &str {
        &self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::protocols::chatroom::{self, Chatroom, ChatroomContent};
    use crate::protocols::llm_chat_completion::LlmChatCompletion;

    fn request() -> Message<Chatroom> {
        let mut agent = chatroom::dialogues("agent");
        let (message, _) = agent
            .create(
                "server",
                ChatroomContent::Message {
                    chat_id: "lobby".to_string(),
                    text: "hi".to_string(),
                    id: None,
                    parse_mode: Some("HTML".to_string()),
                    reply_markup: None,
                    from_user: Some("alice".to_string()),
                    timestamp: Some(1_700_000_000),
                },
            )
            .unwrap();
        message
    }

    #[test]
    fn test_wrap_and_open_preserves_message() {
        let message = request();
        let envelope = Envelope::wrap(&message).unwrap();
        assert_eq!(envelope.destination(), "server");
        assert_eq!(envelope.protocol_specification_id, chatroom::PROTOCOL_ID);

        let parsed = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
        let opened = parsed.open::<Chatroom>().unwrap();
        assert_eq!(opened, message);
    }

    #[test]
    fn test_wrap_requires_addresses() {
        let message = Message::<Chatroom>::new(
            crate::DialogueReference::incomplete("n"),
            1,
            0,
            ChatroomContent::GetChannels {
                agent_id: "agent".to_string(),
            },
        )
        .unwrap();
        assert!(matches!(
            Envelope::wrap(&message),
            Err(ParleyError::Dialogue(DialogueError::MissingAddress("to")))
        ));
    }

    #[test]
    fn test_open_checks_protocol() {
        let envelope = Envelope::wrap(&request()).unwrap();
        assert!(matches!(
            envelope.open::<LlmChatCompletion>(),
            Err(ParleyError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn test_open_surfaces_codec_errors() {
        let mut envelope = Envelope::wrap(&request()).unwrap();
        envelope.message.truncate(3);
        assert!(matches!(
            envelope.open::<Chatroom>(),
            Err(ParleyError::Codec(CodecError::Decode(_)))
        ));
    }
}
