//! Error types for Parley.
//!
//! Validation, decoding and dialogue failures are kept apart so callers can
//! tell a malformed frame from a well-formed message that breaks its schema,
//! and both from a message that is valid but does not fit any dialogue.

use thiserror::Error;

use crate::dialogue::DialogueLabel;

/// A message whose content is inconsistent with its performative's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A declared required field is absent.
    #[error("required field '{field}' missing for performative '{performative}'")]
    MissingField {
        performative: &'static str,
        field: &'static str,
    },

    /// A field is present but holds the wrong kind of value.
    #[error("invalid type for content '{field}': expected '{expected}', found '{found}'")]
    InvalidType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Populated fields do not match the declared field list.
    #[error("field count for '{performative}': expected {expected}, found {found} {unexpected:?}")]
    ContentCount {
        performative: &'static str,
        expected: usize,
        found: usize,
        unexpected: Vec<String>,
    },

    /// Message ids start at 1.
    #[error("invalid 'message_id': expected a value >= 1, found {0}")]
    InvalidMessageId(i32),

    /// Target is negative, or non-zero on a first message.
    #[error("invalid 'target' {target} for message_id {message_id}")]
    InvalidTarget { message_id: i32, target: i32 },

    /// Correctly typed value outside the range the field allows.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Bytes that cannot be parsed into a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Truncated or otherwise malformed protobuf.
    #[error("malformed frame: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// The outer frame carries no dialogue message.
    #[error("frame carries no dialogue message")]
    MissingDialogueMessage,

    /// The payload does not select any performative.
    #[error("payload carries no performative")]
    MissingPerformative,

    /// An enum discriminant the protocol does not define.
    #[error("unknown {kind} value {value}")]
    UnknownEnumValue { kind: &'static str, value: i32 },

    /// A field whose wire representation cannot be interpreted.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

/// Failure of a decode call: either the bytes or the resulting message are bad.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A message that does not fit the dialogue it was offered to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogueError {
    /// The opening performative is not in the protocol's initial set.
    #[error("performative '{performative}' cannot open a dialogue")]
    InvalidInitialPerformative { performative: &'static str },

    /// The performative is not a valid reply to the one it targets.
    #[error("invalid transition: '{to}' is not a valid reply to '{from}'")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Message id breaks the +1 sequence.
    #[error("unexpected message_id: expected {expected}, found {found}")]
    UnexpectedMessageId { expected: i32, found: i32 },

    /// Target does not name a message of this dialogue.
    #[error("invalid target {target}: dialogue holds messages 1..={last}")]
    InvalidTarget { target: i32, last: i32 },

    /// The dialogue reached an end state.
    #[error("dialogue {0} is terminated")]
    Terminated(DialogueLabel),

    /// Reply requested before any message was exchanged.
    #[error("cannot reply in an empty dialogue")]
    EmptyDialogue,

    /// Reply without explicit target but nothing was received yet.
    #[error("no incoming message to reply to")]
    NoIncomingMessage,

    /// Reference or addresses do not match this dialogue.
    #[error("message does not belong to dialogue {0}")]
    ForeignMessage(DialogueLabel),

    /// Sender or receiver not set on the message.
    #[error("message has no {0} address")]
    MissingAddress(&'static str),

    /// The message is not addressed to the local party.
    #[error("message addressed to '{to}', expected '{expected}'")]
    NotAddressedToSelf { to: String, expected: String },

    /// A party cannot hold a dialogue with itself.
    #[error("counterparty '{0}' is the local address")]
    SelfAddressed(String),

    /// Both references empty, or an incomplete reference past the first message.
    #[error("invalid dialogue reference ('{starter}', '{responder}') for message_id {message_id}")]
    InvalidReference {
        starter: String,
        responder: String,
        message_id: i32,
    },

    /// A first message for a dialogue that already exists.
    #[error("dialogue {0} already exists")]
    DuplicateDialogue(DialogueLabel),

    /// No dialogue matches the message.
    #[error("no dialogue matches reference ('{starter}', '{responder}') from '{sender}'")]
    UnknownDialogue {
        starter: String,
        responder: String,
        sender: String,
    },

    /// No dialogue under the given label.
    #[error("no dialogue with label {0}")]
    NotFound(DialogueLabel),

    /// The reply could not be built as a valid message.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors surfaced by the transport-facing crates.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Transport error (connection, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// Bytes or message rejected by the codec.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Dialogue bookkeeping rejected a message.
    #[error("dialogue error: {0}")]
    Dialogue(#[from] DialogueError),

    /// No reply within the caller's deadline.
    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(std::time::Duration),

    /// Envelope carries a different protocol than expected.
    #[error("protocol mismatch: expected {expected}, found {found}")]
    ProtocolMismatch { expected: String, found: String },

    /// Invalid startup configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<DecodeError> for ParleyError {
    fn from(err: DecodeError) -> Self {
        Self::Codec(CodecError::Decode(err))
    }
}

impl From<ValidationError> for ParleyError {
    fn from(err: ValidationError) -> Self {
        Self::Codec(CodecError::Validation(err))
    }
}

/// Result type alias for Parley operations.
pub type ParleyResult<T> = Result<T, ParleyError>;
