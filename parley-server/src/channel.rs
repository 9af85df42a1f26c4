//! Protocol channels: decode inbound envelopes, advance dialogues, and hand
//! messages to application handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use parley_core::{Dialogue, Dialogues, Envelope, Message, Protocol, ProtocolCodec, SharedDialogues};

/// Application logic for one protocol.
#[async_trait]
pub trait Handler<P: Protocol>: Send + Sync + 'static {
    /// React to a message accepted into `dialogue`.
    ///
    /// Returned content is sent back as the reply to `message`.
    async fn handle(&self, message: &Message<P>, dialogue: &Dialogue<P>) -> Option<P::Content>;
}

/// Object-safe view of a channel, used for routing by protocol id.
#[async_trait]
pub trait Channel: Send + Sync {
    fn protocol_id(&self) -> &'static str;

    async fn dispatch(&self, envelope: Envelope) -> Option<Envelope>;
}

/// Binds a dialogue registry to a handler for protocol `P`.
pub struct ProtocolChannel<P: Protocol, H> {
    dialogues: SharedDialogues<P>,
    handler: H,
}

impl<P: ProtocolCodec, H: Handler<P>> ProtocolChannel<P, H> {
    /// Create a new channel.
    pub fn new(dialogues: Dialogues<P>, handler: H) -> Self {
        Self {
            dialogues: SharedDialogues::new(dialogues),
            handler,
        }
    }

    pub fn dialogues(&self) -> &SharedDialogues<P> {
        &self.dialogues
    }

    /// Process one inbound envelope, returning the reply to send, if any.
    ///
    /// Envelopes that fail to decode or do not fit a dialogue are dropped.
    pub async fn receive(&self, envelope: Envelope) -> Option<Envelope> {
        let message = match envelope.open::<P>() {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping envelope from {}: {}", envelope.sender, e);
                return None;
            }
        };

        let dialogue = self.dialogues.update(&message)?;
        debug!("Received {} in {}", message, dialogue.label());

        let content = self.handler.handle(&message, &dialogue).await?;
        let reply = match self
            .dialogues
            .reply(dialogue.label(), content, Some(message.message_id()))
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Cannot reply in {}: {}", dialogue.label(), e);
                return None;
            }
        };

        match Envelope::wrap(&reply) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                error!("Failed to wrap reply {}: {}", reply, e);
                None
            }
        }
    }
}

#[async_trait]
impl<P: ProtocolCodec, H: Handler<P>> Channel for ProtocolChannel<P, H> {
    fn protocol_id(&self) -> &'static str {
        P::PROTOCOL_ID
    }

    async fn dispatch(&self, envelope: Envelope) -> Option<Envelope> {
        self.receive(envelope).await
    }
}

/// Routes envelopes to the channel registered for their protocol.
#[derive(Default)]
pub struct Router {
    channels: HashMap<&'static str, Arc<dyn Channel>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, replacing any previous one for the same protocol.
    pub fn with_channel(mut self, channel: impl Channel + 'static) -> Self {
        self.channels.insert(channel.protocol_id(), Arc::new(channel));
        self
    }

    pub fn protocol_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.channels.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn route(&self, envelope: Envelope) -> Option<Envelope> {
        match self.channels.get(envelope.protocol_specification_id.as_str()) {
            Some(channel) => channel.dispatch(envelope).await,
            None => {
                warn!(
                    "No channel for protocol {}, dropping envelope from {}",
                    envelope.protocol_specification_id, envelope.sender
                );
                None
            }
        }
    }
}
