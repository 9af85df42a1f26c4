//! Structural validation of messages against their protocol schema.
//!
//! Validation is pure: it reads the message or field map it is given and
//! returns the first inconsistency found.

use crate::content::ContentMap;
use crate::error::ValidationError;
use crate::message::Message;
use crate::protocol::{Content, Performative, Protocol};

/// Validate a complete message.
pub fn validate<P: Protocol>(message: &Message<P>) -> Result<(), ValidationError> {
    validate_header(message.message_id(), message.target())?;

    let performative = message.performative();
    let fields = message.content().to_fields();
    validate_fields::<P>(performative, &fields)
}

/// Validate the sequencing fields shared by every performative.
pub fn validate_header(message_id: i32, target: i32) -> Result<(), ValidationError> {
    if message_id < 1 {
        return Err(ValidationError::InvalidMessageId(message_id));
    }
    if target < 0 {
        return Err(ValidationError::InvalidTarget { message_id, target });
    }
    // The first message of a dialogue addresses nothing.
    if message_id == 1 && target != 0 {
        return Err(ValidationError::InvalidTarget { message_id, target });
    }
    Ok(())
}

/// Validate populated content fields against a performative's declared list.
pub fn validate_fields<P: Protocol>(
    performative: P::Performative,
    fields: &ContentMap<P::Custom>,
) -> Result<(), ValidationError> {
    let declared = performative.fields();
    let mut optional_set = 0;

    for spec in declared {
        match fields.get(spec.name) {
            Some(value) => {
                if !value.matches(spec.ty) {
                    return Err(ValidationError::InvalidType {
                        field: spec.name.to_string(),
                        expected: spec.ty.name(),
                        found: value.type_name(),
                    });
                }
                if !spec.required {
                    optional_set += 1;
                }
            }
            None if spec.required => {
                return Err(ValidationError::MissingField {
                    performative: performative.as_str(),
                    field: spec.name,
                });
            }
            None => {}
        }
    }

    let expected = performative.required_count() + optional_set;
    if fields.len() != expected {
        let unexpected = fields
            .keys()
            .filter(|name| !declared.iter().any(|spec| spec.name == name.as_str()))
            .cloned()
            .collect();
        return Err(ValidationError::ContentCount {
            performative: performative.as_str(),
            expected,
            found: fields.len(),
            unexpected,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Value;
    use crate::protocols::chatroom::{
        Chatroom, ChatroomContent, ChatroomCustom, ChatroomPerformative, ErrorCode,
    };
    use crate::DialogueReference;

    fn first_reference() -> DialogueReference {
        DialogueReference::incomplete("nonce")
    }

    fn message_fields() -> ContentMap<ChatroomCustom> {
        let mut fields = ContentMap::new();
        fields.insert("chat_id".to_string(), Value::Str("42".to_string()));
        fields.insert("text".to_string(), Value::Str("hello".to_string()));
        fields
    }

    #[test]
    fn test_header_rules() {
        assert!(validate_header(1, 0).is_ok());
        assert!(validate_header(5, 3).is_ok());
        assert_eq!(
            validate_header(0, 0),
            Err(ValidationError::InvalidMessageId(0))
        );
        assert_eq!(
            validate_header(1, 1),
            Err(ValidationError::InvalidTarget {
                message_id: 1,
                target: 1
            })
        );
        assert!(validate_header(3, -1).is_err());
    }

    #[test]
    fn test_first_message_with_target_rejected() {
        let content = ChatroomContent::Subscribe {
            chat_id: "123".to_string(),
        };
        let result = Message::<Chatroom>::new(first_reference(), 1, 4, content);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidTarget { target: 4, .. })
        ));
    }

    #[test]
    fn test_valid_fields_with_optional() {
        let mut fields = message_fields();
        fields.insert("parse_mode".to_string(), Value::Str("HTML".to_string()));
        assert!(validate_fields::<Chatroom>(ChatroomPerformative::Message, &fields).is_ok());
    }

    #[test]
    fn test_extra_field_is_content_count_mismatch() {
        let mut fields = message_fields();
        fields.insert("colour".to_string(), Value::Str("red".to_string()));

        let err = validate_fields::<Chatroom>(ChatroomPerformative::Message, &fields).unwrap_err();
        match err {
            ValidationError::ContentCount {
                expected,
                found,
                unexpected,
                ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
                assert_eq!(unexpected, vec!["colour".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_missing_error_msg() {
        let mut fields = ContentMap::new();
        fields.insert(
            "error_code".to_string(),
            Value::Custom(ChatroomCustom::ErrorCode(ErrorCode::ApiError)),
        );
        fields.insert("error_data".to_string(), Value::StrBytesMap(Default::default()));

        let result = Message::<Chatroom>::from_fields(
            DialogueReference::new("a", "b"),
            2,
            1,
            ChatroomPerformative::Error,
            fields,
        );
        assert_eq!(
            result,
            Err(ValidationError::MissingField {
                performative: "error",
                field: "error_msg"
            })
        );
    }

    #[test]
    fn test_wrong_type_reported() {
        let mut fields = message_fields();
        fields.insert("id".to_string(), Value::Str("seven".to_string()));

        let err = validate_fields::<Chatroom>(ChatroomPerformative::Message, &fields).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidType {
                field: "id".to_string(),
                expected: "int",
                found: "str"
            }
        );
    }
}
