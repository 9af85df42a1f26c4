//! # parley-core
//!
//! Core library for typed dialogue protocols.
//!
//! This crate provides the protocol schema traits, message validation, the
//! dialogue state machine and registry, the binary codec, and the concrete
//! chatroom and chat completion protocols shared by Parley clients and
//! servers.

pub mod codec;
pub mod content;
pub mod dialogue;
pub mod dialogues;
pub mod envelope;
pub mod error;
pub mod message;
pub mod protocol;
pub mod protocols;
pub mod validate;

pub use codec::{decode, encode, DialogueEnvelope, ProtocolCodec, ProtocolMessage};
pub use content::{ContentMap, CustomValue, FieldReader, Value};
pub use dialogue::{Dialogue, DialogueLabel, DialogueState};
pub use dialogues::{Dialogues, RoleStrategy, SharedDialogues};
pub use envelope::Envelope;
pub use error::{
    CodecError, DecodeError, DialogueError, ParleyError, ParleyResult, ValidationError,
};
pub use message::{Address, DialogueReference, Message};
pub use protocol::{Content, FieldSpec, FieldType, Performative, Protocol};
pub use validate::validate;
