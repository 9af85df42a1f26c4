//! Protobuf payload of completion messages.

use prost::Message as _;

use super::custom_types::{ChatRole, ChatTurn, ErrorCode, KwargValue, Kwargs, Primitive};
use super::{
    LlmChatCompletion, LlmChatCompletionContent, LlmChatCompletionCustom,
    LlmChatCompletionPerformative,
};
use crate::codec::ProtocolCodec;
use crate::content::{ContentMap, Value};
use crate::error::DecodeError;

#[derive(Clone, PartialEq, prost::Message)]
pub struct LlmChatCompletionMessage {
    #[prost(oneof = "llm_chat_completion_message::Performative", tags = "5, 6, 7, 8, 9, 10, 11")]
    pub performative: Option<llm_chat_completion_message::Performative>,
}

pub mod llm_chat_completion_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Performative {
        #[prost(message, tag = "5")]
        Create(super::CreatePerformative),
        #[prost(message, tag = "6")]
        Delete(super::CompletionIdPerformative),
        #[prost(message, tag = "7")]
        Error(super::ErrorPerformative),
        #[prost(message, tag = "8")]
        List(super::ListPerformative),
        #[prost(message, tag = "9")]
        Response(super::ResponsePerformative),
        #[prost(message, tag = "10")]
        Retrieve(super::CompletionIdPerformative),
        #[prost(message, tag = "11")]
        Update(super::CompletionIdPerformative),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorCodeField {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub error_code: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// One chat turn as ordered key/value pairs.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ChatMessage {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<KeyValue>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MessagesField {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PrimitiveValue {
    #[prost(oneof = "primitive_value::Kind", tags = "1, 2, 3, 4, 5")]
    pub kind: Option<primitive_value::Kind>,
}

pub mod primitive_value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(bool, tag = "1")]
        BoolValue(bool),
        #[prost(int64, tag = "2")]
        IntValue(i64),
        /// Decimal text.
        #[prost(string, tag = "3")]
        FloatValue(String),
        #[prost(string, tag = "4")]
        StrValue(String),
        #[prost(bytes = "vec", tag = "5")]
        BytesValue(Vec<u8>),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SequenceValue {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<PrimitiveValue>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct KwargsField {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<KwargsItem>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct KwargsItem {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(oneof = "kwargs_item::Value", tags = "2, 3, 4")]
    pub value: Option<kwargs_item::Value>,
}

pub mod kwargs_item {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "2")]
        Primitive(super::PrimitiveValue),
        #[prost(message, tag = "3")]
        Sequence(super::SequenceValue),
        #[prost(message, tag = "4")]
        Mapping(super::KwargsField),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreatePerformative {
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(message, optional, tag = "2")]
    pub messages: Option<MessagesField>,
    #[prost(message, optional, tag = "3")]
    pub kwargs: Option<KwargsField>,
}

/// Retrieve, Update and Delete share this layout.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CompletionIdPerformative {
    #[prost(string, tag = "1")]
    pub completion_id: String,
    #[prost(message, optional, tag = "2")]
    pub kwargs: Option<KwargsField>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListPerformative {
    #[prost(message, optional, tag = "1")]
    pub kwargs: Option<KwargsField>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResponsePerformative {
    #[prost(string, tag = "1")]
    pub data: String,
    #[prost(string, tag = "2")]
    pub model_class: String,
    #[prost(string, tag = "3")]
    pub model_module: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorPerformative {
    #[prost(message, optional, tag = "1")]
    pub error_code: Option<ErrorCodeField>,
    #[prost(string, tag = "2")]
    pub error_msg: String,
}

fn encode_primitive(value: &Primitive) -> PrimitiveValue {
    use primitive_value::Kind;

    let kind = match value {
        Primitive::Bool(b) => Kind::BoolValue(*b),
        Primitive::Int(i) => Kind::IntValue(*i),
        Primitive::Float(f) => Kind::FloatValue(f.to_string()),
        Primitive::Str(s) => Kind::StrValue(s.clone()),
        Primitive::Bytes(b) => Kind::BytesValue(b.clone()),
    };
    PrimitiveValue { kind: Some(kind) }
}

fn decode_primitive(key: &str, value: PrimitiveValue) -> Result<Primitive, DecodeError> {
    use primitive_value::Kind;

    let kind = value.kind.ok_or_else(|| DecodeError::InvalidField {
        field: format!("kwargs.{}", key),
        reason: "value carries no kind".to_string(),
    })?;
    Ok(match kind {
        Kind::BoolValue(b) => Primitive::Bool(b),
        Kind::IntValue(i) => Primitive::Int(i),
        Kind::FloatValue(text) => {
            let f = text.parse().map_err(|_| DecodeError::InvalidField {
                field: format!("kwargs.{}", key),
                reason: format!("'{}' is not a float", text),
            })?;
            Primitive::Float(f)
        }
        Kind::StrValue(s) => Primitive::Str(s),
        Kind::BytesValue(b) => Primitive::Bytes(b),
    })
}

fn encode_kwargs(kwargs: &Kwargs) -> KwargsField {
    use kwargs_item::Value as Item;

    let items = kwargs
        .iter()
        .map(|(key, value)| {
            let value = match value {
                KwargValue::Primitive(p) => Item::Primitive(encode_primitive(p)),
                KwargValue::Sequence(values) => Item::Sequence(SequenceValue {
                    values: values.iter().map(encode_primitive).collect(),
                }),
                KwargValue::Mapping(nested) => Item::Mapping(encode_kwargs(nested)),
            };
            KwargsItem {
                key: key.clone(),
                value: Some(value),
            }
        })
        .collect();
    KwargsField { items }
}

fn decode_kwargs(field: KwargsField) -> Result<Kwargs, DecodeError> {
    use kwargs_item::Value as Item;

    let mut kwargs = Kwargs::new();
    for item in field.items {
        let key = item.key;
        let invalid = |reason: &str| DecodeError::InvalidField {
            field: format!("kwargs.{}", key),
            reason: reason.to_string(),
        };
        if kwargs.get(&key).is_some() {
            return Err(invalid("duplicate key"));
        }
        let value = match item.value {
            Some(Item::Primitive(p)) => KwargValue::Primitive(decode_primitive(&key, p)?),
            Some(Item::Sequence(seq)) => KwargValue::Sequence(
                seq.values
                    .into_iter()
                    .map(|v| decode_primitive(&key, v))
                    .collect::<Result<_, _>>()?,
            ),
            Some(Item::Mapping(nested)) => KwargValue::Mapping(decode_kwargs(nested)?),
            None => return Err(invalid("item carries no value")),
        };
        kwargs.insert(key, value);
    }
    Ok(kwargs)
}

fn encode_messages(turns: &[ChatTurn]) -> MessagesField {
    let pair = |key: &str, value: &str| KeyValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let messages = turns
        .iter()
        .map(|turn| {
            let mut items = vec![pair("content", &turn.content), pair("role", turn.role.as_str())];
            if let Some(name) = &turn.name {
                items.push(pair("name", name));
            }
            ChatMessage { items }
        })
        .collect();
    MessagesField { messages }
}

fn decode_messages(field: MessagesField) -> Result<Vec<ChatTurn>, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidField {
        field: "messages".to_string(),
        reason,
    };

    field
        .messages
        .into_iter()
        .map(|message| {
            let mut content = None;
            let mut role = None;
            let mut name = None;
            for KeyValue { key, value } in message.items {
                let slot_taken = match key.as_str() {
                    "content" => content.replace(value).is_some(),
                    "role" => {
                        let parsed = ChatRole::from_name(&value)
                            .ok_or_else(|| invalid(format!("unknown role '{}'", value)))?;
                        role.replace(parsed).is_some()
                    }
                    "name" => name.replace(value).is_some(),
                    other => return Err(invalid(format!("unexpected key '{}'", other))),
                };
                if slot_taken {
                    return Err(invalid(format!("duplicate key '{}'", key)));
                }
            }
            Ok(ChatTurn {
                content: content.ok_or_else(|| invalid("turn without content".to_string()))?,
                role: role.ok_or_else(|| invalid("turn without role".to_string()))?,
                name,
            })
        })
        .collect()
}

type Fields = ContentMap<LlmChatCompletionCustom>;

fn put_str(fields: &mut Fields, name: &str, value: String) {
    fields.insert(name.to_string(), Value::Str(value));
}

fn put_custom(fields: &mut Fields, name: &str, value: LlmChatCompletionCustom) {
    fields.insert(name.to_string(), Value::Custom(value));
}

// Absent nested messages are left out of the field map so the validator
// reports them as missing.
fn put_kwargs(fields: &mut Fields, kwargs: Option<KwargsField>) -> Result<(), DecodeError> {
    if let Some(kwargs) = kwargs {
        put_custom(fields, "kwargs", LlmChatCompletionCustom::Kwargs(decode_kwargs(kwargs)?));
    }
    Ok(())
}

impl ProtocolCodec for LlmChatCompletion {
    fn encode_content(content: &LlmChatCompletionContent) -> Vec<u8> {
        use llm_chat_completion_message::Performative as Pb;

        let performative = match content {
            LlmChatCompletionContent::Create {
                model,
                messages,
                kwargs,
            } => Pb::Create(CreatePerformative {
                model: model.clone(),
                messages: Some(encode_messages(messages)),
                kwargs: Some(encode_kwargs(kwargs)),
            }),
            LlmChatCompletionContent::Retrieve {
                completion_id,
                kwargs,
            } => Pb::Retrieve(CompletionIdPerformative {
                completion_id: completion_id.clone(),
                kwargs: Some(encode_kwargs(kwargs)),
            }),
            LlmChatCompletionContent::Update {
                completion_id,
                kwargs,
            } => Pb::Update(CompletionIdPerformative {
                completion_id: completion_id.clone(),
                kwargs: Some(encode_kwargs(kwargs)),
            }),
            LlmChatCompletionContent::List { kwargs } => Pb::List(ListPerformative {
                kwargs: Some(encode_kwargs(kwargs)),
            }),
            LlmChatCompletionContent::Delete {
                completion_id,
                kwargs,
            } => Pb::Delete(CompletionIdPerformative {
                completion_id: completion_id.clone(),
                kwargs: Some(encode_kwargs(kwargs)),
            }),
            LlmChatCompletionContent::Response {
                data,
                model_class,
                model_module,
            } => Pb::Response(ResponsePerformative {
                data: data.clone(),
                model_class: model_class.clone(),
                model_module: model_module.clone(),
            }),
            LlmChatCompletionContent::Error {
                error_code,
                error_msg,
            } => Pb::Error(ErrorPerformative {
                error_code: Some(ErrorCodeField {
                    error_code: (*error_code).into(),
                }),
                error_msg: error_msg.clone(),
            }),
        };

        LlmChatCompletionMessage {
            performative: Some(performative),
        }
        .encode_to_vec()
    }

    fn decode_content(
        bytes: &[u8],
    ) -> Result<(LlmChatCompletionPerformative, Fields), DecodeError> {
        use llm_chat_completion_message::Performative as Pb;

        let payload = LlmChatCompletionMessage::decode(bytes)?;
        let mut fields = Fields::new();

        let performative = match payload.performative.ok_or(DecodeError::MissingPerformative)? {
            Pb::Create(pb) => {
                put_str(&mut fields, "model", pb.model);
                if let Some(messages) = pb.messages {
                    put_custom(
                        &mut fields,
                        "messages",
                        LlmChatCompletionCustom::Messages(decode_messages(messages)?),
                    );
                }
                put_kwargs(&mut fields, pb.kwargs)?;
                LlmChatCompletionPerformative::Create
            }
            Pb::Retrieve(pb) => {
                put_str(&mut fields, "completion_id", pb.completion_id);
                put_kwargs(&mut fields, pb.kwargs)?;
                LlmChatCompletionPerformative::Retrieve
            }
            Pb::Update(pb) => {
                put_str(&mut fields, "completion_id", pb.completion_id);
                put_kwargs(&mut fields, pb.kwargs)?;
                LlmChatCompletionPerformative::Update
            }
            Pb::List(pb) => {
                put_kwargs(&mut fields, pb.kwargs)?;
                LlmChatCompletionPerformative::List
            }
            Pb::Delete(pb) => {
                put_str(&mut fields, "completion_id", pb.completion_id);
                put_kwargs(&mut fields, pb.kwargs)?;
                LlmChatCompletionPerformative::Delete
            }
            Pb::Response(pb) => {
                put_str(&mut fields, "data", pb.data);
                put_str(&mut fields, "model_class", pb.model_class);
                put_str(&mut fields, "model_module", pb.model_module);
                LlmChatCompletionPerformative::Response
            }
            Pb::Error(pb) => {
                if let Some(code) = pb.error_code {
                    let error_code = ErrorCode::try_from(code.error_code).map_err(|_| {
                        DecodeError::UnknownEnumValue {
                            kind: "ErrorCode",
                            value: code.error_code,
                        }
                    })?;
                    put_custom(
                        &mut fields,
                        "error_code",
                        LlmChatCompletionCustom::ErrorCode(error_code),
                    );
                }
                put_str(&mut fields, "error_msg", pb.error_msg);
                LlmChatCompletionPerformative::Error
            }
        };
        Ok((performative, fields))
    }
}
