use super::custom_types::{ChatTurn, ErrorCode, Kwargs};
use super::{LlmChatCompletion, LlmChatCompletionPerformative};
use crate::content::{ContentMap, CustomValue, FieldReader, Value};
use crate::error::ValidationError;
use crate::protocol::{Content, Performative};

/// Completion-specific field values.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmChatCompletionCustom {
    ErrorCode(ErrorCode),
    Messages(Vec<ChatTurn>),
    Kwargs(Kwargs),
}

impl CustomValue for LlmChatCompletionCustom {
    fn type_name(&self) -> &'static str {
        match self {
            Self::ErrorCode(_) => "ErrorCode",
            Self::Messages(_) => "Messages",
            Self::Kwargs(_) => "Kwargs",
        }
    }
}

/// Content of a completion message, one variant per performative.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmChatCompletionContent {
    Create {
        model: String,
        messages: Vec<ChatTurn>,
        kwargs: Kwargs,
    },
    Retrieve {
        completion_id: String,
        kwargs: Kwargs,
    },
    Update {
        completion_id: String,
        kwargs: Kwargs,
    },
    List {
        kwargs: Kwargs,
    },
    Delete {
        completion_id: String,
        kwargs: Kwargs,
    },
    Response {
        data: String,
        model_class: String,
        model_module: String,
    },
    Error {
        error_code: ErrorCode,
        error_msg: String,
    },
}

type Fields = ContentMap<LlmChatCompletionCustom>;

fn put_str(fields: &mut Fields, name: &str, value: &str) {
    fields.insert(name.to_string(), Value::Str(value.to_string()));
}

fn put_kwargs(fields: &mut Fields, kwargs: &Kwargs) {
    fields.insert(
        "kwargs".to_string(),
        Value::Custom(LlmChatCompletionCustom::Kwargs(kwargs.clone())),
    );
}

fn mismatch(
    field: &str,
    expected: &'static str,
    found: &LlmChatCompletionCustom,
) -> ValidationError {
    ValidationError::InvalidType {
        field: field.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn take_kwargs(r: &mut FieldReader<LlmChatCompletionCustom>) -> Result<Kwargs, ValidationError> {
    match r.custom("kwargs")? {
        LlmChatCompletionCustom::Kwargs(kwargs) => Ok(kwargs),
        other => Err(mismatch("kwargs", "Kwargs", &other)),
    }
}

fn take_messages(
    r: &mut FieldReader<LlmChatCompletionCustom>,
) -> Result<Vec<ChatTurn>, ValidationError> {
    match r.custom("messages")? {
        LlmChatCompletionCustom::Messages(messages) => Ok(messages),
        other => Err(mismatch("messages", "Messages", &other)),
    }
}

fn take_error_code(
    r: &mut FieldReader<LlmChatCompletionCustom>,
) -> Result<ErrorCode, ValidationError> {
    match r.custom("error_code")? {
        LlmChatCompletionCustom::ErrorCode(code) => Ok(code),
        other => Err(mismatch("error_code", "ErrorCode", &other)),
    }
}

impl Content<LlmChatCompletion> for LlmChatCompletionContent {
    fn performative(&self) -> LlmChatCompletionPerformative {
        match self {
            Self::Create { .. } => LlmChatCompletionPerformative::Create,
            Self::Retrieve { .. } => LlmChatCompletionPerformative::Retrieve,
            Self::Update { .. } => LlmChatCompletionPerformative::Update,
            Self::List { .. } => LlmChatCompletionPerformative::List,
            Self::Delete { .. } => LlmChatCompletionPerformative::Delete,
            Self::Response { .. } => LlmChatCompletionPerformative::Response,
            Self::Error { .. } => LlmChatCompletionPerformative::Error,
        }
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        match self {
            Self::Create {
                model,
                messages,
                kwargs,
            } => {
                put_str(&mut fields, "model", model);
                fields.insert(
                    "messages".to_string(),
                    Value::Custom(LlmChatCompletionCustom::Messages(messages.clone())),
                );
                put_kwargs(&mut fields, kwargs);
            }
            Self::Retrieve {
                completion_id,
                kwargs,
            }
            | Self::Update {
                completion_id,
                kwargs,
            }
            | Self::Delete {
                completion_id,
                kwargs,
            } => {
                put_str(&mut fields, "completion_id", completion_id);
                put_kwargs(&mut fields, kwargs);
            }
            Self::List { kwargs } => put_kwargs(&mut fields, kwargs),
            Self::Response {
                data,
                model_class,
                model_module,
            } => {
                put_str(&mut fields, "data", data);
                put_str(&mut fields, "model_class", model_class);
                put_str(&mut fields, "model_module", model_module);
            }
            Self::Error {
                error_code,
                error_msg,
            } => {
                fields.insert(
                    "error_code".to_string(),
                    Value::Custom(LlmChatCompletionCustom::ErrorCode(*error_code)),
                );
                put_str(&mut fields, "error_msg", error_msg);
            }
        }
        fields
    }

    fn from_fields(
        performative: LlmChatCompletionPerformative,
        fields: Fields,
    ) -> Result<Self, ValidationError> {
        use LlmChatCompletionPerformative as Perf;

        let mut r = FieldReader::new(performative.as_str(), fields);
        let content = match performative {
            Perf::Create => Self::Create {
                model: r.str("model")?,
                messages: take_messages(&mut r)?,
                kwargs: take_kwargs(&mut r)?,
            },
            Perf::Retrieve => Self::Retrieve {
                completion_id: r.str("completion_id")?,
                kwargs: take_kwargs(&mut r)?,
            },
            Perf::Update => Self::Update {
                completion_id: r.str("completion_id")?,
                kwargs: take_kwargs(&mut r)?,
            },
            Perf::List => Self::List {
                kwargs: take_kwargs(&mut r)?,
            },
            Perf::Delete => Self::Delete {
                completion_id: r.str("completion_id")?,
                kwargs: take_kwargs(&mut r)?,
            },
            Perf::Response => Self::Response {
                data: r.str("data")?,
                model_class: r.str("model_class")?,
                model_module: r.str("model_module")?,
            },
            Perf::Error => Self::Error {
                error_code: take_error_code(&mut r)?,
                error_msg: r.str("error_msg")?,
            },
        };
        r.finish()?;
        Ok(content)
    }
}
