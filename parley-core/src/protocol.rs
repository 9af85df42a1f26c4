//! Protocol schema definitions.
//!
//! A protocol is a closed set of performatives plus the grammar that governs
//! them: which performatives may open a dialogue, which end it, what may
//! follow each one, and the declared field list of every performative.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::content::{ContentMap, CustomValue};
use crate::error::ValidationError;

/// Kind of value a content field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    /// Ordered sequence of strings.
    StrTuple,
    /// Mapping of string to bytes.
    StrBytesMap,
    /// Protocol-specific type, named.
    Custom(&'static str),
}

impl FieldType {
    /// Name used in validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::StrTuple => "tuple[str]",
            Self::StrBytesMap => "dict[str, bytes]",
            Self::Custom(name) => name,
        }
    }
}

/// Declared content field of a performative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
        }
    }
}

/// Closed set of message kinds of one protocol.
///
/// Implementations answer every question with an exhaustive `match`, so
/// adding a performative forces every rule to be revisited.
pub trait Performative: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Every performative of the protocol.
    const ALL: &'static [Self];

    /// Wire name, also the payload discriminator.
    fn as_str(self) -> &'static str;

    /// Declared content fields, required and optional.
    fn fields(self) -> &'static [FieldSpec];

    /// Whether this performative may open a dialogue.
    fn is_initial(self) -> bool;

    /// Whether this performative ends a dialogue.
    fn is_terminal(self) -> bool;

    /// Performatives allowed in reply to this one.
    fn valid_replies(self) -> &'static [Self];

    /// Look up a performative by wire name.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == name)
    }

    /// Check if `next` may reply to this performative.
    fn can_reply_with(self, next: Self) -> bool {
        self.valid_replies().contains(&next)
    }

    /// Number of declared required fields.
    fn required_count(self) -> usize {
        self.fields().iter().filter(|f| f.required).count()
    }
}

/// A typed message protocol.
pub trait Protocol: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Protocol specification id, e.g. `eightballer/chatroom:0.1.0`.
    const PROTOCOL_ID: &'static str;

    /// Whether dialogues that reached an end state stay in the registry.
    const KEEP_TERMINAL_STATE_DIALOGUES: bool;

    type Performative: Performative;

    /// Protocol-specific field values (error codes, structured payloads).
    type Custom: CustomValue;

    /// One record per performative.
    type Content: Content<Self>;

    /// Role a party plays in a dialogue.
    type Role: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// One end state per terminal performative.
    type EndState: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// End state reached by accepting `performative`, if it is terminal.
    fn end_state(performative: Self::Performative) -> Option<Self::EndState>;
}

/// Performative-specific content record.
///
/// Typed records cannot be inconsistent with their performative; the dynamic
/// field map is the boundary where untyped input enters and is validated.
pub trait Content<P: Protocol>: Clone + Debug + PartialEq + Send + Sync + 'static {
    fn performative(&self) -> P::Performative;

    /// Populated fields, keyed by declared name.
    fn to_fields(&self) -> ContentMap<P::Custom>;

    /// Build the record from fields already checked by the validator.
    fn from_fields(
        performative: P::Performative,
        fields: ContentMap<P::Custom>,
    ) -> Result<Self, ValidationError>;
}
