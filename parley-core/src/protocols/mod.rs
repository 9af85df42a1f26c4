//! Concrete protocols.

pub mod chatroom;
pub mod llm_chat_completion;
