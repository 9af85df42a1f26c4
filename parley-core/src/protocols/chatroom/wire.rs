//! Protobuf payload of chatroom messages.

use prost::Message as _;

use super::{Chatroom, ChatroomContent, ChatroomCustom, ChatroomPerformative, ErrorCode};
use crate::codec::ProtocolCodec;
use crate::content::{ContentMap, Value};
use crate::error::DecodeError;

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChatroomMessage {
    #[prost(oneof = "chatroom_message::Performative", tags = "5, 6, 7, 8, 9, 10, 11, 12, 13")]
    pub performative: Option<chatroom_message::Performative>,
}

pub mod chatroom_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Performative {
        #[prost(message, tag = "5")]
        Channels(super::ChannelsPerformative),
        #[prost(message, tag = "6")]
        Error(super::ErrorPerformative),
        #[prost(message, tag = "7")]
        GetChannels(super::GetChannelsPerformative),
        #[prost(message, tag = "8")]
        Message(super::MessagePerformative),
        #[prost(message, tag = "9")]
        MessageSent(super::MessageSentPerformative),
        #[prost(message, tag = "10")]
        Subscribe(super::ChatIdPerformative),
        #[prost(message, tag = "11")]
        SubscriptionResult(super::ResultPerformative),
        #[prost(message, tag = "12")]
        Unsubscribe(super::ChatIdPerformative),
        #[prost(message, tag = "13")]
        UnsubscriptionResult(super::ResultPerformative),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorCodeField {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub error_code: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MessagePerformative {
    #[prost(string, tag = "1")]
    pub chat_id: String,
    #[prost(string, tag = "2")]
    pub text: String,
    #[prost(int32, tag = "3")]
    pub id: i32,
    #[prost(bool, tag = "4")]
    pub id_is_set: bool,
    #[prost(string, tag = "5")]
    pub parse_mode: String,
    #[prost(bool, tag = "6")]
    pub parse_mode_is_set: bool,
    #[prost(string, tag = "7")]
    pub reply_markup: String,
    #[prost(bool, tag = "8")]
    pub reply_markup_is_set: bool,
    #[prost(string, tag = "9")]
    pub from_user: String,
    #[prost(bool, tag = "10")]
    pub from_user_is_set: bool,
    #[prost(int32, tag = "11")]
    pub timestamp: i32,
    #[prost(bool, tag = "12")]
    pub timestamp_is_set: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MessageSentPerformative {
    #[prost(int32, tag = "1")]
    pub id: i32,
    #[prost(bool, tag = "2")]
    pub id_is_set: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorPerformative {
    #[prost(message, optional, tag = "1")]
    pub error_code: Option<ErrorCodeField>,
    #[prost(string, tag = "2")]
    pub error_msg: String,
    #[prost(btree_map = "string, bytes", tag = "3")]
    pub error_data: std::collections::BTreeMap<String, Vec<u8>>,
}

/// Subscribe and Unsubscribe share this layout.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ChatIdPerformative {
    #[prost(string, tag = "1")]
    pub chat_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetChannelsPerformative {
    #[prost(string, tag = "1")]
    pub agent_id: String,
}

/// Subscription_Result and Unsubscription_Result share this layout.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ResultPerformative {
    #[prost(string, tag = "1")]
    pub chat_id: String,
    #[prost(string, tag = "2")]
    pub status: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChannelsPerformative {
    #[prost(string, repeated, tag = "1")]
    pub channels: Vec<String>,
}

fn flagged<T: Default>(value: Option<T>) -> (T, bool) {
    match value {
        Some(value) => (value, true),
        None => (T::default(), false),
    }
}

fn put(fields: &mut ContentMap<ChatroomCustom>, name: &str, value: Value<ChatroomCustom>) {
    fields.insert(name.to_string(), value);
}

fn put_if(
    fields: &mut ContentMap<ChatroomCustom>,
    set: bool,
    name: &str,
    value: Value<ChatroomCustom>,
) {
    if set {
        put(fields, name, value);
    }
}

impl ProtocolCodec for Chatroom {
    fn encode_content(content: &ChatroomContent) -> Vec<u8> {
        use chatroom_message::Performative as Pb;

        let performative = match content.clone() {
            ChatroomContent::Message {
                chat_id,
                text,
                id,
                parse_mode,
                reply_markup,
                from_user,
                timestamp,
            } => {
                let (id, id_is_set) = flagged(id);
                let (parse_mode, parse_mode_is_set) = flagged(parse_mode);
                let (reply_markup, reply_markup_is_set) = flagged(reply_markup);
                let (from_user, from_user_is_set) = flagged(from_user);
                let (timestamp, timestamp_is_set) = flagged(timestamp);
                Pb::Message(MessagePerformative {
                    chat_id,
                    text,
                    id,
                    id_is_set,
                    parse_mode,
                    parse_mode_is_set,
                    reply_markup,
                    reply_markup_is_set,
                    from_user,
                    from_user_is_set,
                    timestamp,
                    timestamp_is_set,
                })
            }
            ChatroomContent::MessageSent { id } => {
                let (id, id_is_set) = flagged(id);
                Pb::MessageSent(MessageSentPerformative { id, id_is_set })
            }
            ChatroomContent::Error {
                error_code,
                error_msg,
                error_data,
            } => Pb::Error(ErrorPerformative {
                error_code: Some(ErrorCodeField {
                    error_code: error_code.into(),
                }),
                error_msg,
                error_data,
            }),
            ChatroomContent::Subscribe { chat_id } => Pb::Subscribe(ChatIdPerformative { chat_id }),
            ChatroomContent::Unsubscribe { chat_id } => {
                Pb::Unsubscribe(ChatIdPerformative { chat_id })
            }
            ChatroomContent::GetChannels { agent_id } => {
                Pb::GetChannels(GetChannelsPerformative { agent_id })
            }
            ChatroomContent::SubscriptionResult { chat_id, status } => {
                Pb::SubscriptionResult(ResultPerformative { chat_id, status })
            }
            ChatroomContent::UnsubscriptionResult { chat_id, status } => {
                Pb::UnsubscriptionResult(ResultPerformative { chat_id, status })
            }
            ChatroomContent::Channels { channels } => {
                Pb::Channels(ChannelsPerformative { channels })
            }
        };

        ChatroomMessage {
            performative: Some(performative),
        }
        .encode_to_vec()
    }

    fn decode_content(
        bytes: &[u8],
    ) -> Result<(ChatroomPerformative, ContentMap<ChatroomCustom>), DecodeError> {
        use chatroom_message::Performative as Pb;

        let payload = ChatroomMessage::decode(bytes)?;
        let mut fields = ContentMap::new();

        let performative = match payload.performative.ok_or(DecodeError::MissingPerformative)? {
            Pb::Message(pb) => {
                put(&mut fields, "chat_id", Value::Str(pb.chat_id));
                put(&mut fields, "text", Value::Str(pb.text));
                put_if(&mut fields, pb.id_is_set, "id", Value::Int(pb.id.into()));
                put_if(&mut fields, pb.parse_mode_is_set, "parse_mode", Value::Str(pb.parse_mode));
                put_if(
                    &mut fields,
                    pb.reply_markup_is_set,
                    "reply_markup",
                    Value::Str(pb.reply_markup),
                );
                put_if(&mut fields, pb.from_user_is_set, "from_user", Value::Str(pb.from_user));
                put_if(
                    &mut fields,
                    pb.timestamp_is_set,
                    "timestamp",
                    Value::Int(pb.timestamp.into()),
                );
                ChatroomPerformative::Message
            }
            Pb::MessageSent(pb) => {
                put_if(&mut fields, pb.id_is_set, "id", Value::Int(pb.id.into()));
                ChatroomPerformative::MessageSent
            }
            Pb::Error(pb) => {
                // An absent nested code is left for the validator to report.
                if let Some(code) = pb.error_code {
                    let error_code = ErrorCode::try_from(code.error_code).map_err(|_| {
                        DecodeError::UnknownEnumValue {
                            kind: "ErrorCode",
                            value: code.error_code,
                        }
                    })?;
                    put(
                        &mut fields,
                        "error_code",
                        Value::Custom(ChatroomCustom::ErrorCode(error_code)),
                    );
                }
                put(&mut fields, "error_msg", Value::Str(pb.error_msg));
                put(&mut fields, "error_data", Value::StrBytesMap(pb.error_data));
                ChatroomPerformative::Error
            }
            Pb::Subscribe(pb) => {
                put(&mut fields, "chat_id", Value::Str(pb.chat_id));
                ChatroomPerformative::Subscribe
            }
            Pb::Unsubscribe(pb) => {
                put(&mut fields, "chat_id", Value::Str(pb.chat_id));
                ChatroomPerformative::Unsubscribe
            }
            Pb::GetChannels(pb) => {
                put(&mut fields, "agent_id", Value::Str(pb.agent_id));
                ChatroomPerformative::GetChannels
            }
            Pb::SubscriptionResult(pb) => {
                put(&mut fields, "chat_id", Value::Str(pb.chat_id));
                put(&mut fields, "status", Value::Str(pb.status));
                ChatroomPerformative::SubscriptionResult
            }
            Pb::UnsubscriptionResult(pb) => {
                put(&mut fields, "chat_id", Value::Str(pb.chat_id));
                put(&mut fields, "status", Value::Str(pb.status));
                ChatroomPerformative::UnsubscriptionResult
            }
            Pb::Channels(pb) => {
                put(&mut fields, "channels", Value::StrTuple(pb.channels));
                ChatroomPerformative::Channels
            }
        };
        Ok((performative, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, DialogueEnvelope, ProtocolMessage};
    use crate::error::{CodecError, ValidationError};

    fn frame(payload: ChatroomMessage) -> Vec<u8> {
        ProtocolMessage {
            dialogue_message: Some(DialogueEnvelope {
                message_id: 2,
                dialogue_starter_reference: "s".to_string(),
                dialogue_responder_reference: "r".to_string(),
                target: 1,
                content: payload.encode_to_vec(),
            }),
        }
        .encode_to_vec()
    }

    #[test]
    fn test_presence_flags_on_the_wire() {
        let bytes = Chatroom::encode_content(&ChatroomContent::MessageSent { id: Some(0) });
        let payload = ChatroomMessage::decode(bytes.as_slice()).unwrap();
        match payload.performative {
            Some(chatroom_message::Performative::MessageSent(pb)) => {
                assert!(pb.id_is_set);
                assert_eq!(pb.id, 0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_error_without_code_fails_validation() {
        let bytes = frame(ChatroomMessage {
            performative: Some(chatroom_message::Performative::Error(ErrorPerformative {
                error_code: None,
                error_msg: "boom".to_string(),
                error_data: Default::default(),
            })),
        });
        assert_eq!(
            codec::decode::<Chatroom>(&bytes),
            Err(CodecError::Validation(ValidationError::MissingField {
                performative: "error",
                field: "error_code"
            }))
        );
    }

    #[test]
    fn test_unknown_error_code_is_decode_error() {
        let bytes = frame(ChatroomMessage {
            performative: Some(chatroom_message::Performative::Error(ErrorPerformative {
                error_code: Some(ErrorCodeField { error_code: 42 }),
                error_msg: "boom".to_string(),
                error_data: Default::default(),
            })),
        });
        assert!(matches!(
            codec::decode::<Chatroom>(&bytes),
            Err(CodecError::Decode(DecodeError::UnknownEnumValue { value: 42, .. }))
        ));
    }
}
