//! Dynamic content values.
//!
//! Untyped message bodies are carried as a map from field name to [`Value`].
//! Decoders produce them, the validator checks them against the declared
//! field list, and [`FieldReader`] turns them into typed records.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::ValidationError;
use crate::protocol::FieldType;

/// Protocol-specific value carried in a content field.
pub trait CustomValue: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Name matched against [`FieldType::Custom`].
    fn type_name(&self) -> &'static str;
}

/// Content field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<C> {
    Str(String),
    Int(i64),
    StrTuple(Vec<String>),
    StrBytesMap(BTreeMap<String, Vec<u8>>),
    Custom(C),
}

impl<C: CustomValue> Value<C> {
    /// Name of the value's kind, in the vocabulary of [`FieldType::name`].
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Int(_) => "int",
            Self::StrTuple(_) => "tuple[str]",
            Self::StrBytesMap(_) => "dict[str, bytes]",
            Self::Custom(c) => c.type_name(),
        }
    }

    /// Check if this value satisfies the declared type.
    pub fn matches(&self, ty: FieldType) -> bool {
        match (self, ty) {
            (Self::Str(_), FieldType::Str)
            | (Self::Int(_), FieldType::Int)
            | (Self::StrTuple(_), FieldType::StrTuple)
            | (Self::StrBytesMap(_), FieldType::StrBytesMap) => true,
            (Self::Custom(c), FieldType::Custom(name)) => c.type_name() == name,
            _ => false,
        }
    }
}

/// Populated content fields of one message.
pub type ContentMap<C> = BTreeMap<String, Value<C>>;

/// Takes typed values out of a validated field map.
///
/// Each accessor removes the field it reads; [`FieldReader::finish`] fails if
/// anything undeclared is left over.
pub struct FieldReader<C> {
    performative: &'static str,
    fields: ContentMap<C>,
}

impl<C: CustomValue> FieldReader<C> {
    pub fn new(performative: &'static str, fields: ContentMap<C>) -> Self {
        Self {
            performative,
            fields,
        }
    }

    fn take(&mut self, name: &'static str) -> Result<Value<C>, ValidationError> {
        self.fields
            .remove(name)
            .ok_or(ValidationError::MissingField {
                performative: self.performative,
                field: name,
            })
    }

    fn mismatch(name: &str, expected: FieldType, found: &Value<C>) -> ValidationError {
        ValidationError::InvalidType {
            field: name.to_string(),
            expected: expected.name(),
            found: found.type_name(),
        }
    }

    pub fn str(&mut self, name: &'static str) -> Result<String, ValidationError> {
        match self.take(name)? {
            Value::Str(s) => Ok(s),
            other => Err(Self::mismatch(name, FieldType::Str, &other)),
        }
    }

    pub fn opt_str(&mut self, name: &'static str) -> Result<Option<String>, ValidationError> {
        if self.fields.contains_key(name) {
            self.str(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Integer field that travels as a 32-bit value on the wire.
    pub fn int32(&mut self, name: &'static str) -> Result<i32, ValidationError> {
        match self.take(name)? {
            Value::Int(i) => i32::try_from(i).map_err(|_| ValidationError::InvalidValue {
                field: name.to_string(),
                reason: format!("{} does not fit in 32 bits", i),
            }),
            other => Err(Self::mismatch(name, FieldType::Int, &other)),
        }
    }

    pub fn opt_int32(&mut self, name: &'static str) -> Result<Option<i32>, ValidationError> {
        if self.fields.contains_key(name) {
            self.int32(name).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn str_tuple(&mut self, name: &'static str) -> Result<Vec<String>, ValidationError> {
        match self.take(name)? {
            Value::StrTuple(items) => Ok(items),
            other => Err(Self::mismatch(name, FieldType::StrTuple, &other)),
        }
    }

    pub fn str_bytes_map(
        &mut self,
        name: &'static str,
    ) -> Result<BTreeMap<String, Vec<u8>>, ValidationError> {
        match self.take(name)? {
            Value::StrBytesMap(map) => Ok(map),
            other => Err(Self::mismatch(name, FieldType::StrBytesMap, &other)),
        }
    }

    pub fn custom(&mut self, name: &'static str) -> Result<C, ValidationError> {
        match self.take(name)? {
            Value::Custom(c) => Ok(c),
            other => Err(ValidationError::InvalidType {
                field: name.to_string(),
                expected: "custom",
                found: other.type_name(),
            }),
        }
    }

    /// Fail if fields remain that the record does not declare.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.fields.is_empty() {
            return Ok(());
        }
        let unexpected: Vec<String> = self.fields.keys().cloned().collect();
        Err(ValidationError::ContentCount {
            performative: self.performative,
            expected: 0,
            found: unexpected.len(),
            unexpected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Code(i32);

    impl CustomValue for Code {
        fn type_name(&self) -> &'static str {
            "Code"
        }
    }

    #[test]
    fn value_matches_declared_type() {
        let v: Value<Code> = Value::Str("x".into());
        assert!(v.matches(FieldType::Str));
        assert!(!v.matches(FieldType::Int));

        let tuple: Value<Code> = Value::StrTuple(vec!["a".into()]);
        assert!(tuple.matches(FieldType::StrTuple));
        assert!(!tuple.matches(FieldType::Str));
        assert_eq!(tuple.type_name(), FieldType::StrTuple.name());

        let map: Value<Code> = Value::StrBytesMap(BTreeMap::new());
        assert!(map.matches(FieldType::StrBytesMap));
        assert!(!map.matches(FieldType::Custom("Code")));

        let c: Value<Code> = Value::Custom(Code(1));
        assert!(c.matches(FieldType::Custom("Code")));
        assert!(!c.matches(FieldType::Custom("Other")));
    }

    #[test]
    fn reader_takes_and_finishes() {
        let mut fields: ContentMap<Code> = ContentMap::new();
        fields.insert("chat_id".into(), Value::Str("1".into()));
        fields.insert("id".into(), Value::Int(7));

        let mut reader = FieldReader::new("message", fields);
        assert_eq!(reader.str("chat_id").unwrap(), "1");
        assert_eq!(reader.opt_int32("id").unwrap(), Some(7));
        assert_eq!(reader.opt_str("parse_mode").unwrap(), None);
        reader.finish().unwrap();
    }

    #[test]
    fn reader_reports_missing_and_out_of_range() {
        let mut fields: ContentMap<Code> = ContentMap::new();
        fields.insert("id".into(), Value::Int(i64::from(i32::MAX) + 1));

        let mut reader = FieldReader::new("message", fields);
        assert!(matches!(
            reader.str("chat_id"),
            Err(ValidationError::MissingField { field: "chat_id", .. })
        ));
        assert!(matches!(
            reader.int32("id"),
            Err(ValidationError::InvalidValue { .. })
        ));
    }
}
