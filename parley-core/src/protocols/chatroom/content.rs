use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Chatroom, ChatroomPerformative};
use crate::content::{ContentMap, CustomValue, FieldReader, Value};
use crate::error::ValidationError;
use crate::protocol::{Content, Performative};

/// Reason a chatroom request failed.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    prost::Enumeration,
)]
#[repr(i32)]
pub enum ErrorCode {
    UnknownChatId = 0,
    ApiError = 1,
    InvalidMessageFormat = 2,
}

/// Chatroom-specific field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatroomCustom {
    ErrorCode(ErrorCode),
}

impl CustomValue for ChatroomCustom {
    fn type_name(&self) -> &'static str {
        match self {
            Self::ErrorCode(_) => "ErrorCode",
        }
    }
}

/// Content of a chatroom message, one variant per performative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "performative", rename_all = "snake_case")]
pub enum ChatroomContent {
    Message {
        chat_id: String,
        text: String,
        id: Option<i32>,
        parse_mode: Option<String>,
        reply_markup: Option<String>,
        from_user: Option<String>,
        timestamp: Option<i32>,
    },
    MessageSent {
        id: Option<i32>,
    },
    Error {
        error_code: ErrorCode,
        error_msg: String,
        error_data: BTreeMap<String, Vec<u8>>,
    },
    Subscribe {
        chat_id: String,
    },
    Unsubscribe {
        chat_id: String,
    },
    GetChannels {
        agent_id: String,
    },
    SubscriptionResult {
        chat_id: String,
        status: String,
    },
    UnsubscriptionResult {
        chat_id: String,
        status: String,
    },
    Channels {
        channels: Vec<String>,
    },
}

fn put_str(fields: &mut ContentMap<ChatroomCustom>, name: &str, value: &str) {
    fields.insert(name.to_string(), Value::Str(value.to_string()));
}

fn put_opt_str(fields: &mut ContentMap<ChatroomCustom>, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        put_str(fields, name, value);
    }
}

fn put_opt_int(fields: &mut ContentMap<ChatroomCustom>, name: &str, value: Option<i32>) {
    if let Some(value) = value {
        fields.insert(name.to_string(), Value::Int(i64::from(value)));
    }
}

impl Content<Chatroom> for ChatroomContent {
    fn performative(&self) -> ChatroomPerformative {
        match self {
            Self::Message { .. } => ChatroomPerformative::Message,
            Self::MessageSent { .. } => ChatroomPerformative::MessageSent,
            Self::Error { .. } => ChatroomPerformative::Error,
            Self::Subscribe { .. } => ChatroomPerformative::Subscribe,
            Self::Unsubscribe { .. } => ChatroomPerformative::Unsubscribe,
            Self::GetChannels { .. } => ChatroomPerformative::GetChannels,
            Self::SubscriptionResult { .. } => ChatroomPerformative::SubscriptionResult,
            Self::UnsubscriptionResult { .. } => ChatroomPerformative::UnsubscriptionResult,
            Self::Channels { .. } => ChatroomPerformative::Channels,
        }
    }

    fn to_fields(&self) -> ContentMap<ChatroomCustom> {
        let mut fields = ContentMap::new();
        match self {
            Self::Message {
                chat_id,
                text,
                id,
                parse_mode,
                reply_markup,
                from_user,
                timestamp,
            } => {
                put_str(&mut fields, "chat_id", chat_id);
                put_str(&mut fields, "text", text);
                put_opt_int(&mut fields, "id", *id);
                put_opt_str(&mut fields, "parse_mode", parse_mode);
                put_opt_str(&mut fields, "reply_markup", reply_markup);
                put_opt_str(&mut fields, "from_user", from_user);
                put_opt_int(&mut fields, "timestamp", *timestamp);
            }
            Self::MessageSent { id } => put_opt_int(&mut fields, "id", *id),
            Self::Error {
                error_code,
                error_msg,
                error_data,
            } => {
                fields.insert(
                    "error_code".to_string(),
                    Value::Custom(ChatroomCustom::ErrorCode(*error_code)),
                );
                put_str(&mut fields, "error_msg", error_msg);
                fields.insert(
                    "error_data".to_string(),
                    Value::StrBytesMap(error_data.clone()),
                );
            }
            Self::Subscribe { chat_id } | Self::Unsubscribe { chat_id } => {
                put_str(&mut fields, "chat_id", chat_id);
            }
            Self::GetChannels { agent_id } => put_str(&mut fields, "agent_id", agent_id),
            Self::SubscriptionResult { chat_id, status }
            | Self::UnsubscriptionResult { chat_id, status } => {
                put_str(&mut fields, "chat_id", chat_id);
                put_str(&mut fields, "status", status);
            }
            Self::Channels { channels } => {
                fields.insert("channels".to_string(), Value::StrTuple(channels.clone()));
            }
        }
        fields
    }

    fn from_fields(
        performative: ChatroomPerformative,
        fields: ContentMap<ChatroomCustom>,
    ) -> Result<Self, ValidationError> {
        let mut r = FieldReader::new(performative.as_str(), fields);
        let content = match performative {
            ChatroomPerformative::Message => Self::Message {
                chat_id: r.str("chat_id")?,
                text: r.str("text")?,
                id: r.opt_int32("id")?,
                parse_mode: r.opt_str("parse_mode")?,
                reply_markup: r.opt_str("reply_markup")?,
                from_user: r.opt_str("from_user")?,
                timestamp: r.opt_int32("timestamp")?,
            },
            ChatroomPerformative::MessageSent => Self::MessageSent {
                id: r.opt_int32("id")?,
            },
            ChatroomPerformative::Error => {
                let ChatroomCustom::ErrorCode(error_code) = r.custom("error_code")?;
                Self::Error {
                    error_code,
                    error_msg: r.str("error_msg")?,
                    error_data: r.str_bytes_map("error_data")?,
                }
            }
            ChatroomPerformative::Subscribe => Self::Subscribe {
                chat_id: r.str("chat_id")?,
            },
            ChatroomPerformative::Unsubscribe => Self::Unsubscribe {
                chat_id: r.str("chat_id")?,
            },
            ChatroomPerformative::GetChannels => Self::GetChannels {
                agent_id: r.str("agent_id")?,
            },
            ChatroomPerformative::SubscriptionResult => Self::SubscriptionResult {
                chat_id: r.str("chat_id")?,
                status: r.str("status")?,
            },
            ChatroomPerformative::UnsubscriptionResult => Self::UnsubscriptionResult {
                chat_id: r.str("chat_id")?,
                status: r.str("status")?,
            },
            ChatroomPerformative::Channels => Self::Channels {
                channels: r.str_tuple("channels")?,
            },
        };
        r.finish()?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_only_when_set() {
        let content = ChatroomContent::Message {
            chat_id: "c".to_string(),
            text: "t".to_string(),
            id: None,
            parse_mode: Some("MarkdownV2".to_string()),
            reply_markup: None,
            from_user: None,
            timestamp: Some(5),
        };
        let fields = content.to_fields();
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["chat_id", "parse_mode", "text", "timestamp"]);

        let rebuilt = ChatroomContent::from_fields(ChatroomPerformative::Message, fields).unwrap();
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(i32::from(ErrorCode::InvalidMessageFormat), 2);
        assert_eq!(ErrorCode::try_from(0), Ok(ErrorCode::UnknownChatId));
        assert!(ErrorCode::try_from(9).is_err());
    }

    #[test]
    fn test_serde_tagging() {
        let content = ChatroomContent::Subscribe {
            chat_id: "123".to_string(),
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["performative"], "subscribe");
        assert_eq!(json["chat_id"], "123");
    }
}
