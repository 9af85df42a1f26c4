//! Echo backend for the chat completion protocol.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use parley_core::protocols::llm_chat_completion::{
    ChatRole, ChatTurn, ErrorCode, Kwargs, LlmChatCompletion, LlmChatCompletionContent,
};
use parley_core::{Dialogue, Message};

use crate::channel::Handler;

/// Answers every create with a completion that repeats the last user turn.
#[derive(Debug, Clone, Default)]
pub struct EchoCompletions;

impl EchoCompletions {
    fn complete(model: &str, messages: &[ChatTurn], kwargs: &Kwargs) -> LlmChatCompletionContent {
        let echoed = messages
            .iter()
            .rev()
            .find(|turn| turn.role == ChatRole::User)
            .map(|turn| turn.content.as_str())
            .unwrap_or_default();

        let data = json!({
            "id": format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            "object": "chat.completion",
            "created": chrono::Utc::now().timestamp(),
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": ChatRole::Assistant, "content": echoed},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": messages.len(),
                "completion_tokens": 1,
                "total_tokens": messages.len() + 1
            },
            "kwargs": kwargs.to_json()
        });

        LlmChatCompletionContent::Response {
            data: data.to_string(),
            model_class: "ChatCompletion".to_string(),
            model_module: "openai.types.chat".to_string(),
        }
    }
}

#[async_trait]
impl Handler<LlmChatCompletion> for EchoCompletions {
    async fn handle(
        &self,
        message: &Message<LlmChatCompletion>,
        _dialogue: &Dialogue<LlmChatCompletion>,
    ) -> Option<LlmChatCompletionContent> {
        let reply = match message.content() {
            LlmChatCompletionContent::Create {
                model,
                messages,
                kwargs,
            } => {
                debug!("Completing {} turns with {}", messages.len(), model);
                Self::complete(model, messages, kwargs)
            }
            LlmChatCompletionContent::Retrieve { .. }
            | LlmChatCompletionContent::Update { .. }
            | LlmChatCompletionContent::List { .. }
            | LlmChatCompletionContent::Delete { .. } => LlmChatCompletionContent::Error {
                error_code: ErrorCode::OtherException,
                error_msg: format!("{} is not supported", message.performative()),
            },
            LlmChatCompletionContent::Response { .. } | LlmChatCompletionContent::Error { .. } => {
                return None
            }
        };
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ProtocolChannel;
    use parley_core::protocols::llm_chat_completion::{
        connection_dialogues, skill_dialogues, Primitive,
    };
    use parley_core::Envelope;

    async fn ask(content: LlmChatCompletionContent) -> LlmChatCompletionContent {
        let channel = ProtocolChannel::new(connection_dialogues("openai"), EchoCompletions);
        let mut skill = skill_dialogues("skill");
        let (request, _) = skill.create("openai", content).unwrap();

        let reply = channel
            .receive(Envelope::wrap(&request).unwrap())
            .await
            .unwrap()
            .open::<LlmChatCompletion>()
            .unwrap();
        let dialogue = skill.try_update(&reply).unwrap();
        assert!(dialogue.is_terminated());
        // Completion dialogues are retained once finished.
        assert_eq!(channel.dialogues().len(), 1);
        reply.content().clone()
    }

    #[tokio::test]
    async fn test_create_echoes_last_user_turn() {
        let reply = ask(LlmChatCompletionContent::Create {
            model: "echo-1".to_string(),
            messages: vec![
                ChatTurn::new(ChatRole::System, "be brief"),
                ChatTurn::new(ChatRole::User, "ping"),
            ],
            kwargs: Kwargs::new().with("temperature", Primitive::Float(0.0)),
        })
        .await;

        let (data, model_class) = match reply {
            LlmChatCompletionContent::Response {
                data, model_class, ..
            } => (data, model_class),
            other => panic!("expected a response, got {:?}", other),
        };
        assert_eq!(model_class, "ChatCompletion");

        let data: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(data["model"], "echo-1");
        assert_eq!(data["choices"][0]["message"]["content"], "ping");
        assert_eq!(data["choices"][0]["message"]["role"], "assistant");
        assert_eq!(data["kwargs"]["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_other_operations_are_refused() {
        let reply = ask(LlmChatCompletionContent::Delete {
            completion_id: "chatcmpl-1".to_string(),
            kwargs: Kwargs::new(),
        })
        .await;

        assert_eq!(
            reply,
            LlmChatCompletionContent::Error {
                error_code: ErrorCode::OtherException,
                error_msg: "delete is not supported".to_string(),
            }
        );
    }
}
