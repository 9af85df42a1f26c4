//! Chatroom protocol.
//!
//! Agents subscribe to chats, post messages to them and list the channels
//! they follow. Every exchange is a single request answered by a single
//! terminal reply.

mod content;
mod wire;

use std::fmt;

use crate::dialogues::Dialogues;
use crate::message::Message;
use crate::protocol::{FieldSpec, FieldType, Performative, Protocol};

pub use content::{ChatroomContent, ChatroomCustom, ErrorCode};

/// Protocol specification id.
pub const PROTOCOL_ID: &str = "eightballer/chatroom:0.1.0";

/// The chatroom protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chatroom;

/// Chatroom message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatroomPerformative {
    Channels,
    Error,
    GetChannels,
    Message,
    MessageSent,
    Subscribe,
    SubscriptionResult,
    Unsubscribe,
    UnsubscriptionResult,
}

/// Role of a party in a chatroom dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatroomRole {
    Agent,
}

/// How a chatroom dialogue ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatroomEndState {
    MessageSent,
    Error,
    SubscriptionResult,
    UnsubscriptionResult,
    Channels,
}

const MESSAGE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("chat_id", FieldType::Str),
    FieldSpec::required("text", FieldType::Str),
    FieldSpec::optional("id", FieldType::Int),
    FieldSpec::optional("parse_mode", FieldType::Str),
    FieldSpec::optional("reply_markup", FieldType::Str),
    FieldSpec::optional("from_user", FieldType::Str),
    FieldSpec::optional("timestamp", FieldType::Int),
];

const MESSAGE_SENT_FIELDS: &[FieldSpec] = &[FieldSpec::optional("id", FieldType::Int)];

const ERROR_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("error_code", FieldType::Custom("ErrorCode")),
    FieldSpec::required("error_msg", FieldType::Str),
    FieldSpec::required("error_data", FieldType::StrBytesMap),
];

const CHAT_ID_FIELDS: &[FieldSpec] = &[FieldSpec::required("chat_id", FieldType::Str)];

const GET_CHANNELS_FIELDS: &[FieldSpec] = &[FieldSpec::required("agent_id", FieldType::Str)];

const RESULT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("chat_id", FieldType::Str),
    FieldSpec::required("status", FieldType::Str),
];

const CHANNELS_FIELDS: &[FieldSpec] = &[FieldSpec::required("channels", FieldType::StrTuple)];

impl Performative for ChatroomPerformative {
    const ALL: &'static [Self] = &[
        Self::Channels,
        Self::Error,
        Self::GetChannels,
        Self::Message,
        Self::MessageSent,
        Self::Subscribe,
        Self::SubscriptionResult,
        Self::Unsubscribe,
        Self::UnsubscriptionResult,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Self::Channels => "channels",
            Self::Error => "error",
            Self::GetChannels => "get_channels",
            Self::Message => "message",
            Self::MessageSent => "message_sent",
            Self::Subscribe => "subscribe",
            Self::SubscriptionResult => "subscription_result",
            Self::Unsubscribe => "unsubscribe",
            Self::UnsubscriptionResult => "unsubscription_result",
        }
    }

    fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Channels => CHANNELS_FIELDS,
            Self::Error => ERROR_FIELDS,
            Self::GetChannels => GET_CHANNELS_FIELDS,
            Self::Message => MESSAGE_FIELDS,
            Self::MessageSent => MESSAGE_SENT_FIELDS,
            Self::Subscribe | Self::Unsubscribe => CHAT_ID_FIELDS,
            Self::SubscriptionResult | Self::UnsubscriptionResult => RESULT_FIELDS,
        }
    }

    fn is_initial(self) -> bool {
        matches!(
            self,
            Self::Message | Self::Subscribe | Self::Unsubscribe | Self::GetChannels
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::MessageSent
                | Self::Error
                | Self::SubscriptionResult
                | Self::UnsubscriptionResult
                | Self::Channels
        )
    }

    fn valid_replies(self) -> &'static [Self] {
        match self {
            Self::Message => &[Self::MessageSent, Self::Error],
            Self::Subscribe => &[Self::SubscriptionResult, Self::Error],
            Self::Unsubscribe => &[Self::UnsubscriptionResult, Self::Error],
            Self::GetChannels => &[Self::Channels, Self::Error],
            Self::MessageSent
            | Self::Error
            | Self::SubscriptionResult
            | Self::UnsubscriptionResult
            | Self::Channels => &[],
        }
    }
}

impl fmt::Display for ChatroomPerformative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Protocol for Chatroom {
    const PROTOCOL_ID: &'static str = PROTOCOL_ID;
    const KEEP_TERMINAL_STATE_DIALOGUES: bool = false;

    type Performative = ChatroomPerformative;
    type Custom = ChatroomCustom;
    type Content = ChatroomContent;
    type Role = ChatroomRole;
    type EndState = ChatroomEndState;

    fn end_state(performative: ChatroomPerformative) -> Option<ChatroomEndState> {
        match performative {
            ChatroomPerformative::MessageSent => Some(ChatroomEndState::MessageSent),
            ChatroomPerformative::Error => Some(ChatroomEndState::Error),
            ChatroomPerformative::SubscriptionResult => Some(ChatroomEndState::SubscriptionResult),
            ChatroomPerformative::UnsubscriptionResult => {
                Some(ChatroomEndState::UnsubscriptionResult)
            }
            ChatroomPerformative::Channels => Some(ChatroomEndState::Channels),
            ChatroomPerformative::Message
            | ChatroomPerformative::Subscribe
            | ChatroomPerformative::Unsubscribe
            | ChatroomPerformative::GetChannels => None,
        }
    }
}

/// Every party plays the agent role.
pub fn role_from_first_message(_message: &Message<Chatroom>, _counterparty: &str) -> ChatroomRole {
    ChatroomRole::Agent
}

/// Create a chatroom registry for `self_address`.
pub fn dialogues(self_address: impl Into<String>) -> Dialogues<Chatroom> {
    Dialogues::new(self_address, role_from_first_message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::content::Value;

    #[test]
    fn test_grammar_is_consistent() {
        for &p in ChatroomPerformative::ALL {
            assert_eq!(ChatroomPerformative::from_name(p.as_str()), Some(p));
            // Terminal performatives are exactly those with an end state and no replies.
            assert_eq!(p.is_terminal(), Chatroom::end_state(p).is_some());
            assert_eq!(p.is_terminal(), p.valid_replies().is_empty());
            assert!(!(p.is_initial() && p.is_terminal()));
        }
        assert_eq!(ChatroomPerformative::from_name("shout"), None);
    }

    #[test]
    fn test_subscribe_round_trip() {
        let mut agent = dialogues("agent");
        let (message, _) = agent
            .create(
                "server",
                ChatroomContent::Subscribe {
                    chat_id: "123".to_string(),
                },
            )
            .unwrap();
        assert_eq!(message.message_id(), 1);
        assert_eq!(message.target(), 0);

        let decoded = decode::<Chatroom>(&encode(&message)).unwrap();
        assert_eq!(
            decoded.fields().get("chat_id"),
            Some(&Value::Str("123".to_string()))
        );
        assert_eq!(decoded.content(), message.content());
        assert_eq!(decoded.dialogue_reference(), message.dialogue_reference());
    }

    #[test]
    fn test_every_performative_round_trips() {
        let mut error_data = std::collections::BTreeMap::new();
        error_data.insert("raw".to_string(), vec![0, 1, 2]);

        let samples = vec![
            ChatroomContent::Message {
                chat_id: "c".to_string(),
                text: "hello".to_string(),
                id: Some(0),
                parse_mode: None,
                reply_markup: Some(String::new()),
                from_user: Some("bob".to_string()),
                timestamp: None,
            },
            ChatroomContent::MessageSent { id: None },
            ChatroomContent::MessageSent { id: Some(0) },
            ChatroomContent::Error {
                error_code: ErrorCode::UnknownChatId,
                error_msg: "no such chat".to_string(),
                error_data,
            },
            ChatroomContent::GetChannels {
                agent_id: "agent".to_string(),
            },
            ChatroomContent::Unsubscribe {
                chat_id: "c".to_string(),
            },
            ChatroomContent::UnsubscriptionResult {
                chat_id: "c".to_string(),
                status: "unsubscribed".to_string(),
            },
            ChatroomContent::Channels {
                channels: vec!["a".to_string(), "b".to_string()],
            },
            ChatroomContent::Channels { channels: vec![] },
        ];

        for content in samples {
            let message = Message::<Chatroom>::new(
                crate::DialogueReference::new("s", "r"),
                3,
                2,
                content,
            )
            .unwrap();
            let decoded = decode::<Chatroom>(&encode(&message)).unwrap();
            assert_eq!(decoded, message);
        }
    }
}
