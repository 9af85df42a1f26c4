//! LLM chat completion protocol.
//!
//! A skill asks a connection to create, retrieve, update, list or delete
//! chat completions; the connection answers with a single response or error.

mod content;
mod custom_types;
mod wire;

use std::fmt;

use crate::dialogues::Dialogues;
use crate::message::Message;
use crate::protocol::{FieldSpec, FieldType, Performative, Protocol};

pub use content::{LlmChatCompletionContent, LlmChatCompletionCustom};
pub use custom_types::{ChatRole, ChatTurn, ErrorCode, KwargValue, Kwargs, Primitive};

/// Protocol specification id.
pub const PROTOCOL_ID: &str = "zarathustra/llm_chat_completion:0.1.0";

/// The chat completion protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmChatCompletion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmChatCompletionPerformative {
    Create,
    Delete,
    Error,
    List,
    Response,
    Retrieve,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmChatCompletionRole {
    Connection,
    Skill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmChatCompletionEndState {
    Response,
    Error,
}

const KWARGS: FieldType = FieldType::Custom("Kwargs");

const CREATE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("model", FieldType::Str),
    FieldSpec::required("messages", FieldType::Custom("Messages")),
    FieldSpec::required("kwargs", KWARGS),
];

const COMPLETION_ID_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("completion_id", FieldType::Str),
    FieldSpec::required("kwargs", KWARGS),
];

const LIST_FIELDS: &[FieldSpec] = &[FieldSpec::required("kwargs", KWARGS)];

const RESPONSE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("data", FieldType::Str),
    FieldSpec::required("model_class", FieldType::Str),
    FieldSpec::required("model_module", FieldType::Str),
];

const ERROR_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("error_code", FieldType::Custom("ErrorCode")),
    FieldSpec::required("error_msg", FieldType::Str),
];

const ANSWERS: &[LlmChatCompletionPerformative] = &[
    LlmChatCompletionPerformative::Response,
    LlmChatCompletionPerformative::Error,
];

impl Performative for LlmChatCompletionPerformative {
    const ALL: &'static [Self] = &[
        Self::Create,
        Self::Delete,
        Self::Error,
        Self::List,
        Self::Response,
        Self::Retrieve,
        Self::Update,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Error => "error",
            Self::List => "list",
            Self::Response => "response",
            Self::Retrieve => "retrieve",
            Self::Update => "update",
        }
    }

    fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Create => CREATE_FIELDS,
            Self::Retrieve | Self::Update | Self::Delete => COMPLETION_ID_FIELDS,
            Self::List => LIST_FIELDS,
            Self::Response => RESPONSE_FIELDS,
            Self::Error => ERROR_FIELDS,
        }
    }

    fn is_initial(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Retrieve | Self::Update | Self::List | Self::Delete
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Response | Self::Error)
    }

    fn valid_replies(self) -> &'static [Self] {
        match self {
            Self::Create | Self::Retrieve | Self::Update | Self::List | Self::Delete => ANSWERS,
            Self::Response | Self::Error => &[],
        }
    }
}

impl fmt::Display for LlmChatCompletionPerformative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Protocol for LlmChatCompletion {
    const PROTOCOL_ID: &'static str = PROTOCOL_ID;
    const KEEP_TERMINAL_STATE_DIALOGUES: bool = true;

    type Performative = LlmChatCompletionPerformative;
    type Custom = LlmChatCompletionCustom;
    type Content = LlmChatCompletionContent;
    type Role = LlmChatCompletionRole;
    type EndState = LlmChatCompletionEndState;

    fn end_state(performative: LlmChatCompletionPerformative) -> Option<LlmChatCompletionEndState> {
        match performative {
            LlmChatCompletionPerformative::Response => Some(LlmChatCompletionEndState::Response),
            LlmChatCompletionPerformative::Error => Some(LlmChatCompletionEndState::Error),
            LlmChatCompletionPerformative::Create
            | LlmChatCompletionPerformative::Delete
            | LlmChatCompletionPerformative::List
            | LlmChatCompletionPerformative::Retrieve
            | LlmChatCompletionPerformative::Update => None,
        }
    }
}

fn connection_role(_: &Message<LlmChatCompletion>, _: &str) -> LlmChatCompletionRole {
    LlmChatCompletionRole::Connection
}

fn skill_role(_: &Message<LlmChatCompletion>, _: &str) -> LlmChatCompletionRole {
    LlmChatCompletionRole::Skill
}

/// Registry for the side that serves completions.
pub fn connection_dialogues(self_address: impl Into<String>) -> Dialogues<LlmChatCompletion> {
    Dialogues::new(self_address, connection_role)
}

/// Registry for the side that requests completions.
pub fn skill_dialogues(self_address: impl Into<String>) -> Dialogues<LlmChatCompletion> {
    Dialogues::new(self_address, skill_role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::content::{ContentMap, Value};
    use crate::error::ValidationError;
    use crate::DialogueReference;

    fn kwargs() -> Kwargs {
        Kwargs::new()
            .with("temperature", Primitive::Float(0.7))
            .with("max_tokens", Primitive::Int(256))
            .with(
                "stop",
                KwargValue::Sequence(vec![
                    Primitive::Str("###".to_string()),
                    Primitive::Bytes(vec![0xff, 0x00]),
                ]),
            )
            .with(
                "extra",
                Kwargs::new()
                    .with("user", Primitive::Str("alice".to_string()))
                    .with("logprobs", Primitive::Bool(true)),
            )
    }

    #[test]
    fn test_grammar_is_consistent() {
        for &p in LlmChatCompletionPerformative::ALL {
            assert_eq!(LlmChatCompletionPerformative::from_name(p.as_str()), Some(p));
            assert_eq!(p.is_terminal(), LlmChatCompletion::end_state(p).is_some());
            assert_eq!(p.is_initial(), p.can_reply_with(LlmChatCompletionPerformative::Response));
        }
    }

    #[test]
    fn test_every_performative_round_trips() {
        let samples = vec![
            LlmChatCompletionContent::Create {
                model: "gpt-4o".to_string(),
                messages: ChatRole::ALL
                    .iter()
                    .map(|&role| ChatTurn::new(role, format!("you are {}", role)))
                    .chain([ChatTurn::new(ChatRole::User, "hi").with_name("alice")])
                    .collect(),
                kwargs: kwargs(),
            },
            LlmChatCompletionContent::Retrieve {
                completion_id: "cmpl-1".to_string(),
                kwargs: Kwargs::new(),
            },
            LlmChatCompletionContent::Update {
                completion_id: "cmpl-1".to_string(),
                kwargs: kwargs(),
            },
            LlmChatCompletionContent::List { kwargs: kwargs() },
            LlmChatCompletionContent::Delete {
                completion_id: "cmpl-1".to_string(),
                kwargs: Kwargs::new(),
            },
            LlmChatCompletionContent::Response {
                data: r#"{"id":"cmpl-1"}"#.to_string(),
                model_class: "ChatCompletion".to_string(),
                model_module: "openai.types.chat".to_string(),
            },
            LlmChatCompletionContent::Error {
                error_code: ErrorCode::OpenaiError,
                error_msg: "rate limited".to_string(),
            },
        ];

        for content in samples {
            let message = Message::<LlmChatCompletion>::new(
                DialogueReference::new("s", "r"),
                2,
                1,
                content,
            )
            .unwrap();
            assert_eq!(decode::<LlmChatCompletion>(&encode(&message)).unwrap(), message);
        }
    }

    #[test]
    fn test_create_with_wrong_kwargs_type() {
        let mut fields = ContentMap::new();
        fields.insert("model".to_string(), Value::Str("m".to_string()));
        fields.insert(
            "messages".to_string(),
            Value::Custom(LlmChatCompletionCustom::Messages(vec![])),
        );
        fields.insert("kwargs".to_string(), Value::Str("{}".to_string()));

        let result = Message::<LlmChatCompletion>::from_fields(
            DialogueReference::incomplete("s"),
            1,
            0,
            LlmChatCompletionPerformative::Create,
            fields,
        );
        assert_eq!(
            result.unwrap_err(),
            ValidationError::InvalidType {
                field: "kwargs".to_string(),
                expected: "Kwargs",
                found: "str"
            }
        );
    }
}
