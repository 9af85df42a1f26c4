//! Dialogue state machine.
//!
//! A [`Dialogue`] is one two-party conversation of a single protocol. It
//! accepts messages turn by turn, enforcing the sequencing rules and the
//! protocol's reply table, and moves to an absorbing end state once a
//! terminal performative is accepted.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DialogueError, ValidationError};
use crate::message::{Address, DialogueReference, Message};
use crate::protocol::{Performative, Protocol};

/// Identity of one dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueLabel {
    dialogue_reference: DialogueReference,
    starter_address: Address,
    responder_address: Address,
}

impl DialogueLabel {
    pub fn new(
        dialogue_reference: DialogueReference,
        starter_address: impl Into<Address>,
        responder_address: impl Into<Address>,
    ) -> Self {
        Self {
            dialogue_reference,
            starter_address: starter_address.into(),
            responder_address: responder_address.into(),
        }
    }

    pub fn dialogue_reference(&self) -> &DialogueReference {
        &self.dialogue_reference
    }

    pub fn starter_address(&self) -> &str {
        &self.starter_address
    }

    pub fn responder_address(&self) -> &str {
        &self.responder_address
    }

    /// Check if the responder reference has been assigned.
    pub fn is_complete(&self) -> bool {
        self.dialogue_reference.is_complete()
    }

    /// Same label with the responder reference cleared.
    pub fn incomplete_version(&self) -> Self {
        Self {
            dialogue_reference: DialogueReference::incomplete(
                self.dialogue_reference.starter.clone(),
            ),
            starter_address: self.starter_address.clone(),
            responder_address: self.responder_address.clone(),
        }
    }
}

impl fmt::Display for DialogueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.dialogue_reference.starter,
            self.dialogue_reference.responder,
            self.starter_address,
            self.responder_address
        )
    }
}

/// Dialogue state: open, or ended in one of the protocol's end states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogueState<E> {
    Open,
    Ended(E),
}

impl<E: Copy> DialogueState<E> {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended(_))
    }

    /// End state, if reached.
    pub fn end_state(&self) -> Option<E> {
        match self {
            Self::Open => None,
            Self::Ended(end) => Some(*end),
        }
    }
}

/// A conversation between the local party and one counterparty.
#[derive(Debug, Clone)]
pub struct Dialogue<P: Protocol> {
    label: DialogueLabel,
    self_address: Address,
    role: P::Role,
    messages: Vec<Message<P>>,
    state: DialogueState<P::EndState>,
}

impl<P: Protocol> Dialogue<P> {
    /// Create a new, empty dialogue.
    pub fn new(label: DialogueLabel, self_address: impl Into<Address>, role: P::Role) -> Self {
        Self {
            label,
            self_address: self_address.into(),
            role,
            messages: Vec::new(),
            state: DialogueState::Open,
        }
    }

    pub fn label(&self) -> &DialogueLabel {
        &self.label
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub fn role(&self) -> P::Role {
        self.role
    }

    pub fn state(&self) -> DialogueState<P::EndState> {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }

    /// Accepted messages in order.
    pub fn messages(&self) -> &[Message<P>] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Check if the local party opened this dialogue.
    pub fn is_self_initiated(&self) -> bool {
        self.label.starter_address == self.self_address
    }

    /// Address of the counterparty.
    pub fn opponent_address(&self) -> &str {
        if self.is_self_initiated() {
            &self.label.responder_address
        } else {
            &self.label.starter_address
        }
    }

    pub fn last_message(&self) -> Option<&Message<P>> {
        self.messages.last()
    }

    /// Last message sent by the counterparty.
    pub fn last_incoming_message(&self) -> Option<&Message<P>> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender() != Some(self.self_address.as_str()))
    }

    /// Last message sent by the local party.
    pub fn last_outgoing_message(&self) -> Option<&Message<P>> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender() == Some(self.self_address.as_str()))
    }

    /// Message with the given id, if accepted.
    pub fn get_message(&self, message_id: i32) -> Option<&Message<P>> {
        // Ids are dense from 1, so the id doubles as an index.
        let index = usize::try_from(message_id).ok()?.checked_sub(1)?;
        self.messages.get(index)
    }

    /// Offer a message to the dialogue.
    ///
    /// On rejection the dialogue is left exactly as it was.
    pub fn update(&mut self, message: &Message<P>) -> Result<(), DialogueError> {
        if self.is_terminated() {
            return Err(DialogueError::Terminated(self.label.clone()));
        }
        self.check_belongs(message)?;
        self.check_sequence(message)?;

        let reference = message.dialogue_reference();
        if self.label.dialogue_reference.responder.is_empty() && !reference.responder.is_empty()
        {
            debug!(
                "Completing dialogue {} with responder reference {}",
                self.label, reference.responder
            );
            self.label.dialogue_reference.responder = reference.responder.clone();
        }

        let performative = message.performative();
        self.messages.push(message.clone());

        if performative.is_terminal() {
            if let Some(end) = P::end_state(performative) {
                debug!("Dialogue {} ended with {}", self.label, performative);
                self.state = DialogueState::Ended(end);
            }
        }
        Ok(())
    }

    /// Build the local party's next message and record it.
    ///
    /// `target` defaults to the last message received from the counterparty.
    pub fn reply(
        &mut self,
        content: P::Content,
        target: Option<i32>,
    ) -> Result<Message<P>, DialogueError> {
        if self.is_terminated() {
            return Err(DialogueError::Terminated(self.label.clone()));
        }
        let last_id = self
            .last_message()
            .ok_or(DialogueError::EmptyDialogue)?
            .message_id();
        let target = match target {
            Some(target) => target,
            None => self
                .last_incoming_message()
                .ok_or(DialogueError::NoIncomingMessage)?
                .message_id(),
        };
        let message_id = last_id
            .checked_add(1)
            .ok_or(ValidationError::InvalidMessageId(last_id))?;

        let message = Message::new(
            self.label.dialogue_reference.clone(),
            message_id,
            target,
            content,
        )?
        .with_sender(self.self_address.clone())
        .with_to(self.opponent_address().to_string());

        self.update(&message)?;
        Ok(message)
    }

    fn check_belongs(&self, message: &Message<P>) -> Result<(), DialogueError> {
        let foreign = || DialogueError::ForeignMessage(self.label.clone());

        let sender = message.sender().ok_or(DialogueError::MissingAddress("sender"))?;
        let to = message.to().ok_or(DialogueError::MissingAddress("to"))?;
        let opponent = self.opponent_address();
        let addressed = (sender == self.self_address && to == opponent)
            || (sender == opponent && to == self.self_address);
        if !addressed {
            return Err(foreign());
        }

        let ours = &self.label.dialogue_reference;
        let theirs = message.dialogue_reference();
        if ours.starter != theirs.starter {
            return Err(foreign());
        }
        let responder_ok = ours.responder == theirs.responder
            || ours.responder.is_empty()
            || (theirs.responder.is_empty() && message.is_first());
        if !responder_ok {
            return Err(foreign());
        }
        Ok(())
    }

    fn check_sequence(&self, message: &Message<P>) -> Result<(), DialogueError> {
        let performative = message.performative();

        let Some(last) = self.last_message() else {
            if message.message_id() != Message::<P>::STARTING_MESSAGE_ID {
                return Err(DialogueError::UnexpectedMessageId {
                    expected: Message::<P>::STARTING_MESSAGE_ID,
                    found: message.message_id(),
                });
            }
            if message.target() != Message::<P>::STARTING_TARGET {
                return Err(DialogueError::InvalidTarget {
                    target: message.target(),
                    last: 0,
                });
            }
            if !performative.is_initial() {
                return Err(DialogueError::InvalidInitialPerformative {
                    performative: performative.as_str(),
                });
            }
            if message.sender() != Some(self.label.starter_address.as_str()) {
                return Err(DialogueError::ForeignMessage(self.label.clone()));
            }
            return Ok(());
        };

        let last_id = last.message_id();
        if message.message_id() != last_id + 1 {
            return Err(DialogueError::UnexpectedMessageId {
                expected: last_id + 1,
                found: message.message_id(),
            });
        }

        let target = message.target();
        let target_message = self
            .get_message(target)
            .ok_or(DialogueError::InvalidTarget {
                target,
                last: last_id,
            })?;

        let previous = target_message.performative();
        if !previous.can_reply_with(performative) {
            return Err(DialogueError::InvalidTransition {
                from: previous.as_str(),
                to: performative.as_str(),
            });
        }
        Ok(())
    }
}
