//! Binary codec for dialogue messages.
//!
//! Every protocol shares the same outer frame: a [`ProtocolMessage`] carrying
//! a [`DialogueEnvelope`] with the sequencing fields and the encoded
//! protocol-specific payload. Payloads select their performative through a
//! protobuf `oneof`; optional scalars travel with an explicit `*_is_set` flag.

use prost::Message as _;

use crate::content::ContentMap;
use crate::error::{CodecError, DecodeError};
use crate::message::{DialogueReference, Message};
use crate::protocol::Protocol;

/// Sequencing fields plus the encoded performative payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DialogueEnvelope {
    #[prost(int32, tag = "1")]
    pub message_id: i32,
    #[prost(string, tag = "2")]
    pub dialogue_starter_reference: String,
    #[prost(string, tag = "3")]
    pub dialogue_responder_reference: String,
    #[prost(int32, tag = "4")]
    pub target: i32,
    #[prost(bytes = "vec", tag = "5")]
    pub content: Vec<u8>,
}

/// Outer frame of every encoded message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtocolMessage {
    #[prost(message, optional, tag = "2")]
    pub dialogue_message: Option<DialogueEnvelope>,
}

/// Payload encoding for one protocol.
pub trait ProtocolCodec: Protocol {
    /// Encode the performative payload.
    fn encode_content(content: &Self::Content) -> Vec<u8>;

    /// Decode a payload into its performative and populated fields.
    ///
    /// The result is not yet validated; [`decode`] runs it through the
    /// validator before building the message.
    fn decode_content(
        bytes: &[u8],
    ) -> Result<(Self::Performative, ContentMap<Self::Custom>), DecodeError>;
}

/// Encode a message into its wire form.
///
/// Addresses are not part of the dialogue message; see
/// [`Envelope`](crate::envelope::Envelope) for the addressed frame.
pub fn encode<P: ProtocolCodec>(message: &Message<P>) -> Vec<u8> {
    let reference = message.dialogue_reference();
    let frame = ProtocolMessage {
        dialogue_message: Some(DialogueEnvelope {
            message_id: message.message_id(),
            dialogue_starter_reference: reference.starter.clone(),
            dialogue_responder_reference: reference.responder.clone(),
            target: message.target(),
            content: P::encode_content(message.content()),
        }),
    };
    frame.encode_to_vec()
}

/// Decode and validate a message.
pub fn decode<P: ProtocolCodec>(bytes: &[u8]) -> Result<Message<P>, CodecError> {
    let frame = ProtocolMessage::decode(bytes).map_err(DecodeError::from)?;
    let envelope = frame
        .dialogue_message
        .ok_or(DecodeError::MissingDialogueMessage)?;
    let (performative, fields) = P::decode_content(&envelope.content)?;

    let message = Message::from_fields(
        DialogueReference::new(
            envelope.dialogue_starter_reference,
            envelope.dialogue_responder_reference,
        ),
        envelope.message_id,
        envelope.target,
        performative,
        fields,
    )?;
    Ok(message)
}
