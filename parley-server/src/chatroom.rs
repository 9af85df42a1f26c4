//! In-memory chatroom service.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use parley_core::protocols::chatroom::{Chatroom, ChatroomContent, ErrorCode};
use parley_core::{Address, Dialogue, Message};

use crate::channel::Handler;

#[derive(Debug, Default)]
struct Rooms {
    /// Chat ids each agent is subscribed to.
    subscriptions: HashMap<Address, BTreeSet<String>>,
    /// Last message id handed out per chat.
    sequences: HashMap<String, i32>,
}

/// Tracks subscriptions and acknowledges messages posted to subscribed chats.
#[derive(Debug, Default)]
pub struct ChatroomService {
    rooms: Mutex<Rooms>,
}

impl ChatroomService {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Chats `agent` is subscribed to, in order.
    pub fn channels_of(&self, agent: &str) -> Vec<String> {
        self.rooms()
            .subscriptions
            .get(agent)
            .map(|chats| chats.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn respond(&self, sender: &str, content: &ChatroomContent) -> Option<ChatroomContent> {
        let mut rooms = self.rooms();
        let reply = match content {
            ChatroomContent::Subscribe { chat_id } => {
                rooms
                    .subscriptions
                    .entry(sender.to_string())
                    .or_default()
                    .insert(chat_id.clone());
                ChatroomContent::SubscriptionResult {
                    chat_id: chat_id.clone(),
                    status: "subscribed".to_string(),
                }
            }
            ChatroomContent::Unsubscribe { chat_id } => {
                let removed = rooms
                    .subscriptions
                    .get_mut(sender)
                    .is_some_and(|chats| chats.remove(chat_id));
                if removed {
                    ChatroomContent::UnsubscriptionResult {
                        chat_id: chat_id.clone(),
                        status: "unsubscribed".to_string(),
                    }
                } else {
                    unknown_chat(chat_id)
                }
            }
            ChatroomContent::GetChannels { agent_id } => ChatroomContent::Channels {
                channels: rooms
                    .subscriptions
                    .get(agent_id)
                    .map(|chats| chats.iter().cloned().collect())
                    .unwrap_or_default(),
            },
            ChatroomContent::Message { chat_id, .. } => {
                let subscribed = rooms
                    .subscriptions
                    .get(sender)
                    .is_some_and(|chats| chats.contains(chat_id));
                if !subscribed {
                    return Some(unknown_chat(chat_id));
                }
                let sequence = rooms.sequences.entry(chat_id.clone()).or_insert(0);
                *sequence += 1;
                debug!("Message {} posted to {} by {}", sequence, chat_id, sender);
                ChatroomContent::MessageSent {
                    id: Some(*sequence),
                }
            }
            // Replies never open a dialogue, so they never reach a handler.
            ChatroomContent::MessageSent { .. }
            | ChatroomContent::Error { .. }
            | ChatroomContent::SubscriptionResult { .. }
            | ChatroomContent::UnsubscriptionResult { .. }
            | ChatroomContent::Channels { .. } => return None,
        };
        Some(reply)
    }
}

fn unknown_chat(chat_id: &str) -> ChatroomContent {
    ChatroomContent::Error {
        error_code: ErrorCode::UnknownChatId,
        error_msg: format!("not subscribed to chat {}", chat_id),
        error_data: BTreeMap::new(),
    }
}

#[async_trait]
impl Handler<Chatroom> for ChatroomService {
    async fn handle(
        &self,
        message: &Message<Chatroom>,
        dialogue: &Dialogue<Chatroom>,
    ) -> Option<ChatroomContent> {
        self.respond(dialogue.opponent_address(), message.content())
    }
}
