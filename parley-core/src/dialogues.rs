//! Dialogue registry.
//!
//! [`Dialogues`] correlates inbound messages with the dialogue they belong to,
//! creating dialogues lazily when a counterparty opens one, and owns the first
//! message of every dialogue the local party opens.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::dialogue::{Dialogue, DialogueLabel};
use crate::error::DialogueError;
use crate::message::{Address, DialogueReference, Message};
use crate::protocol::{Content, Performative, Protocol};

/// Assigns the local party's role when a dialogue is created.
pub trait RoleStrategy<P: Protocol>: Send + Sync {
    /// Role for the dialogue opened by `message` with `counterparty`.
    fn role(&self, message: &Message<P>, counterparty: &str) -> P::Role;
}

impl<P, F> RoleStrategy<P> for F
where
    P: Protocol,
    F: Fn(&Message<P>, &str) -> P::Role + Send + Sync,
{
    fn role(&self, message: &Message<P>, counterparty: &str) -> P::Role {
        self(message, counterparty)
    }
}

/// Registry of the local party's dialogues for one protocol.
pub struct Dialogues<P: Protocol> {
    self_address: Address,
    role_strategy: Box<dyn RoleStrategy<P>>,
    dialogues: HashMap<DialogueLabel, Dialogue<P>>,
    incomplete_to_complete: HashMap<DialogueLabel, DialogueLabel>,
    keep_terminal_state_dialogues: bool,
}

impl<P: Protocol> Dialogues<P> {
    /// Create a new registry using the protocol's retention default.
    pub fn new(
        self_address: impl Into<Address>,
        role_strategy: impl RoleStrategy<P> + 'static,
    ) -> Self {
        Self {
            self_address: self_address.into(),
            role_strategy: Box::new(role_strategy),
            dialogues: HashMap::new(),
            incomplete_to_complete: HashMap::new(),
            keep_terminal_state_dialogues: P::KEEP_TERMINAL_STATE_DIALOGUES,
        }
    }

    /// Set whether ended dialogues stay in the registry.
    pub fn with_keep_terminal_state_dialogues(mut self, keep: bool) -> Self {
        self.keep_terminal_state_dialogues = keep;
        self
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub fn keeps_terminal_state_dialogues(&self) -> bool {
        self.keep_terminal_state_dialogues
    }

    pub fn len(&self) -> usize {
        self.dialogues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogues.is_empty()
    }

    /// Labels of all registered dialogues.
    pub fn labels(&self) -> impl Iterator<Item = &DialogueLabel> {
        self.dialogues.keys()
    }

    /// Look up a dialogue, following completed labels.
    pub fn get(&self, label: &DialogueLabel) -> Option<&Dialogue<P>> {
        let label = self.resolve(label);
        self.dialogues.get(label)
    }

    /// Dialogue a message would be matched to, without updating it.
    pub fn get_dialogue(&self, message: &Message<P>) -> Option<&Dialogue<P>> {
        let sender = message.sender()?;
        let counterparty = if sender == self.self_address {
            message.to()?
        } else {
            sender
        };
        let reference = message.dialogue_reference().clone();
        let candidates = [
            DialogueLabel::new(reference.clone(), counterparty, self.self_address.clone()),
            DialogueLabel::new(reference, self.self_address.clone(), counterparty),
        ];
        candidates.iter().find_map(|label| self.get(label))
    }

    /// Open a dialogue with `counterparty`.
    ///
    /// Returns the first message, addressed and ready to send, together with
    /// a snapshot of the new dialogue.
    pub fn create(
        &mut self,
        counterparty: impl Into<Address>,
        content: P::Content,
    ) -> Result<(Message<P>, Dialogue<P>), DialogueError> {
        let counterparty = counterparty.into();
        if counterparty == self.self_address {
            return Err(DialogueError::SelfAddressed(counterparty));
        }
        let performative = content.performative();
        if !performative.is_initial() {
            return Err(DialogueError::InvalidInitialPerformative {
                performative: performative.as_str(),
            });
        }

        let reference = DialogueReference::incomplete(self.new_nonce());
        let message = Message::new(
            reference.clone(),
            Message::<P>::STARTING_MESSAGE_ID,
            Message::<P>::STARTING_TARGET,
            content,
        )?
        .with_sender(self.self_address.clone())
        .with_to(counterparty.clone());

        let label = DialogueLabel::new(reference, self.self_address.clone(), counterparty.clone());
        let role = self.role_strategy.role(&message, &counterparty);
        let mut dialogue = Dialogue::new(label.clone(), self.self_address.clone(), role);
        dialogue.update(&message)?;

        debug!("Created dialogue {} as {:?}", label, role);
        let snapshot = dialogue.clone();
        self.dialogues.insert(label.clone(), dialogue);
        self.settle(&label);
        Ok((message, snapshot))
    }

    /// Match an inbound message to its dialogue and advance it.
    ///
    /// Rejected messages are logged and dropped; the registry is left
    /// untouched.
    pub fn update(&mut self, message: &Message<P>) -> Option<Dialogue<P>> {
        match self.try_update(message) {
            Ok(dialogue) => Some(dialogue),
            Err(e) => {
                warn!("Dropping {}: {}", message, e);
                None
            }
        }
    }

    /// Like [`Dialogues::update`], reporting why a message was rejected.
    pub fn try_update(&mut self, message: &Message<P>) -> Result<Dialogue<P>, DialogueError> {
        let sender = message
            .sender()
            .ok_or(DialogueError::MissingAddress("sender"))?
            .to_string();
        let to = message.to().ok_or(DialogueError::MissingAddress("to"))?;
        if to != self.self_address {
            return Err(DialogueError::NotAddressedToSelf {
                to: to.to_string(),
                expected: self.self_address.clone(),
            });
        }
        if sender == self.self_address {
            return Err(DialogueError::SelfAddressed(sender));
        }

        let reference = message.dialogue_reference();
        let invalid_reference = || DialogueError::InvalidReference {
            starter: reference.starter.clone(),
            responder: reference.responder.clone(),
            message_id: message.message_id(),
        };
        if reference.starter.is_empty() {
            return Err(invalid_reference());
        }

        let label = if reference.responder.is_empty() {
            if !message.is_first() {
                return Err(invalid_reference());
            }
            self.open_from_counterparty(message, &sender)?
        } else {
            self.advance(message, &sender)?
        };

        let snapshot = self
            .dialogues
            .get(&label)
            .cloned()
            .ok_or_else(|| DialogueError::NotFound(label.clone()))?;
        self.settle(&label);
        Ok(snapshot)
    }

    /// Send the local party's next message in a dialogue.
    pub fn reply(
        &mut self,
        label: &DialogueLabel,
        content: P::Content,
        target: Option<i32>,
    ) -> Result<Message<P>, DialogueError> {
        let label = self.resolve(label).clone();
        let dialogue = self
            .dialogues
            .get_mut(&label)
            .ok_or_else(|| DialogueError::NotFound(label.clone()))?;
        let message = dialogue.reply(content, target)?;
        self.settle(&label);
        Ok(message)
    }

    fn open_from_counterparty(
        &mut self,
        message: &Message<P>,
        sender: &str,
    ) -> Result<DialogueLabel, DialogueError> {
        let incomplete = DialogueLabel::new(
            message.dialogue_reference().clone(),
            sender,
            self.self_address.clone(),
        );
        if self.incomplete_to_complete.contains_key(&incomplete)
            || self.dialogues.contains_key(&incomplete)
        {
            return Err(DialogueError::DuplicateDialogue(incomplete));
        }

        let reference = DialogueReference::new(
            message.dialogue_reference().starter.clone(),
            self.new_nonce(),
        );
        let label = DialogueLabel::new(reference, sender, self.self_address.clone());
        let role = self.role_strategy.role(message, sender);
        let mut dialogue = Dialogue::new(label.clone(), self.self_address.clone(), role);
        dialogue.update(message)?;

        debug!("Counterparty {} opened dialogue {} as {:?}", sender, label, role);
        self.dialogues.insert(label.clone(), dialogue);
        self.incomplete_to_complete.insert(incomplete, label.clone());
        Ok(label)
    }

    fn advance(
        &mut self,
        message: &Message<P>,
        sender: &str,
    ) -> Result<DialogueLabel, DialogueError> {
        let reference = message.dialogue_reference();
        let opened_by_them =
            DialogueLabel::new(reference.clone(), sender, self.self_address.clone());
        let opened_by_us =
            DialogueLabel::new(reference.clone(), self.self_address.clone(), sender);

        for label in [opened_by_them, opened_by_us] {
            if let Some(dialogue) = self.dialogues.get_mut(&label) {
                dialogue.update(message)?;
                return Ok(label);
            }
        }

        // First reply to a dialogue we opened: re-key under the complete label.
        let incomplete = DialogueLabel::new(
            DialogueReference::incomplete(reference.starter.clone()),
            self.self_address.clone(),
            sender,
        );
        let Some(dialogue) = self.dialogues.get_mut(&incomplete) else {
            return Err(DialogueError::UnknownDialogue {
                starter: reference.starter.clone(),
                responder: reference.responder.clone(),
                sender: sender.to_string(),
            });
        };
        dialogue.update(message)?;

        let complete = dialogue.label().clone();
        if let Some(dialogue) = self.dialogues.remove(&incomplete) {
            self.dialogues.insert(complete.clone(), dialogue);
        }
        self.incomplete_to_complete.insert(incomplete, complete.clone());
        Ok(complete)
    }

    /// Apply the retention policy to a dialogue that may have just ended.
    fn settle(&mut self, label: &DialogueLabel) {
        if self.keep_terminal_state_dialogues {
            return;
        }
        let ended = self
            .dialogues
            .get(label)
            .is_some_and(|dialogue| dialogue.is_terminated());
        if ended {
            debug!("Removing terminated dialogue {}", label);
            self.dialogues.remove(label);
            self.incomplete_to_complete
                .retain(|_, complete| complete != label);
        }
    }

    fn resolve<'a>(&'a self, label: &'a DialogueLabel) -> &'a DialogueLabel {
        if self.dialogues.contains_key(label) {
            return label;
        }
        self.incomplete_to_complete.get(label).unwrap_or(label)
    }

    fn new_nonce(&self) -> String {
        loop {
            let nonce = Uuid::new_v4().simple().to_string();
            let taken = self.dialogues.keys().any(|label| {
                let reference = label.dialogue_reference();
                reference.starter == nonce || reference.responder == nonce
            });
            if !taken {
                return nonce;
            }
        }
    }
}

impl<P: Protocol> std::fmt::Debug for Dialogues<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialogues")
            .field("self_address", &self.self_address)
            .field("dialogues", &self.dialogues.len())
            .field("keep_terminal_state_dialogues", &self.keep_terminal_state_dialogues)
            .finish()
    }
}

/// Registry shared between the inbound path and application handlers.
///
/// Every create, update and reply runs under one lock, so two messages racing
/// on the same label are applied one after the other.
pub struct SharedDialogues<P: Protocol> {
    inner: Arc<Mutex<Dialogues<P>>>,
}

impl<P: Protocol> Clone for SharedDialogues<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Protocol> SharedDialogues<P> {
    pub fn new(dialogues: Dialogues<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(dialogues)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Dialogues<P>> {
        // Registry operations leave it consistent even if a caller panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(
        &self,
        counterparty: impl Into<Address>,
        content: P::Content,
    ) -> Result<(Message<P>, Dialogue<P>), DialogueError> {
        self.lock().create(counterparty, content)
    }

    pub fn update(&self, message: &Message<P>) -> Option<Dialogue<P>> {
        self.lock().update(message)
    }

    pub fn try_update(&self, message: &Message<P>) -> Result<Dialogue<P>, DialogueError> {
        self.lock().try_update(message)
    }

    pub fn reply(
        &self,
        label: &DialogueLabel,
        content: P::Content,
        target: Option<i32>,
    ) -> Result<Message<P>, DialogueError> {
        self.lock().reply(label, content, target)
    }

    /// Snapshot of a dialogue.
    pub fn get(&self, label: &DialogueLabel) -> Option<Dialogue<P>> {
        self.lock().get(label).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` with exclusive access to the registry.
    pub fn with<R>(&self, f: impl FnOnce(&mut Dialogues<P>) -> R) -> R {
        f(&mut self.lock())
    }
}
