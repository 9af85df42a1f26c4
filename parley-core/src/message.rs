//! Protocol messages.
//!
//! A [`Message`] is built once, validated on construction, and never mutated
//! afterwards. Addresses are stamped with the `with_*` builders before the
//! message leaves the local party.

use serde::{Deserialize, Serialize};

use crate::content::ContentMap;
use crate::error::ValidationError;
use crate::protocol::{Content, Performative, Protocol};
use crate::validate;

/// Address of a party taking part in dialogues.
pub type Address = String;

/// Reference pair naming one dialogue.
///
/// The starter reference is stamped by the party that opens the dialogue, the
/// responder reference by its counterparty. An empty string means "not yet
/// assigned".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DialogueReference {
    pub starter: String,
    pub responder: String,
}

impl DialogueReference {
    pub fn new(starter: impl Into<String>, responder: impl Into<String>) -> Self {
        Self {
            starter: starter.into(),
            responder: responder.into(),
        }
    }

    /// Reference as stamped by the starter before any reply.
    pub fn incomplete(starter: impl Into<String>) -> Self {
        Self::new(starter, "")
    }

    /// Check if both references are assigned.
    pub fn is_complete(&self) -> bool {
        !self.starter.is_empty() && !self.responder.is_empty()
    }

    /// Check if neither reference is assigned.
    pub fn is_empty(&self) -> bool {
        self.starter.is_empty() && self.responder.is_empty()
    }
}

/// One message of protocol `P`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<P: Protocol> {
    dialogue_reference: DialogueReference,
    message_id: i32,
    target: i32,
    content: P::Content,
    sender: Option<Address>,
    to: Option<Address>,
}

impl<P: Protocol> Message<P> {
    /// Id of the message that opens a dialogue.
    pub const STARTING_MESSAGE_ID: i32 = 1;

    /// Target of the message that opens a dialogue.
    pub const STARTING_TARGET: i32 = 0;

    /// Create a new message, validating it against the protocol schema.
    pub fn new(
        dialogue_reference: DialogueReference,
        message_id: i32,
        target: i32,
        content: P::Content,
    ) -> Result<Self, ValidationError> {
        let message = Self {
            dialogue_reference,
            message_id,
            target,
            content,
            sender: None,
            to: None,
        };
        validate::validate(&message)?;
        Ok(message)
    }

    /// Build a message from an untyped field map.
    ///
    /// The map is checked against the performative's declared fields before
    /// the typed record is built, so extra or mistyped fields are reported as
    /// validation errors rather than silently dropped.
    pub fn from_fields(
        dialogue_reference: DialogueReference,
        message_id: i32,
        target: i32,
        performative: P::Performative,
        fields: ContentMap<P::Custom>,
    ) -> Result<Self, ValidationError> {
        validate::validate_header(message_id, target)?;
        validate::validate_fields::<P>(performative, &fields)?;
        let content = P::Content::from_fields(performative, fields)?;
        Self::new(dialogue_reference, message_id, target, content)
    }

    /// Set the sender address.
    pub fn with_sender(mut self, sender: impl Into<Address>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Set the receiver address.
    pub fn with_to(mut self, to: impl Into<Address>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn dialogue_reference(&self) -> &DialogueReference {
        &self.dialogue_reference
    }

    pub fn message_id(&self) -> i32 {
        self.message_id
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn performative(&self) -> P::Performative {
        self.content.performative()
    }

    pub fn content(&self) -> &P::Content {
        &self.content
    }

    /// Populated content fields by name.
    pub fn fields(&self) -> ContentMap<P::Custom> {
        self.content.to_fields()
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    /// Check if this message opens a dialogue.
    pub fn is_first(&self) -> bool {
        self.message_id == Self::STARTING_MESSAGE_ID
    }

    /// Check if the performative is in the protocol's initial set.
    pub fn has_initial_performative(&self) -> bool {
        self.performative().is_initial()
    }
}

impl<P: Protocol> std::fmt::Display for Message<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Message(id={}, target={}, performative={}, reference=('{}', '{}'), sender={}, to={})",
            self.message_id,
            self.target,
            self.performative(),
            self.dialogue_reference.starter,
            self.dialogue_reference.responder,
            self.sender.as_deref().unwrap_or("-"),
            self.to.as_deref().unwrap_or("-"),
        )
    }
}
