//! Quick test client for a Parley server

use std::net::SocketAddr;

use parley_client::{ClientConfig, ConnectionConfig, ParleyClient};
use parley_core::protocols::chatroom::{self, ChatroomContent};
use parley_core::protocols::llm_chat_completion::{
    self, ChatRole, ChatTurn, Kwargs, LlmChatCompletionContent, Primitive,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9000".to_string())
        .parse()?;
    let connection = ConnectionConfig::new(addr);
    println!("Connecting to Parley server at {}...", addr);

    let mut chat =
        ParleyClient::connect(&connection, ClientConfig::default(), chatroom::dialogues).await?;
    println!("Connected as {}\n", chat.address());

    let (reply, _) = chat
        .request(ChatroomContent::Subscribe {
            chat_id: "123".to_string(),
        })
        .await?;
    println!("subscribe -> {}", reply);

    let (reply, _) = chat
        .request(ChatroomContent::Message {
            chat_id: "123".to_string(),
            text: "hello world".to_string(),
            id: None,
            parse_mode: None,
            reply_markup: None,
            from_user: Some(chat.address().to_string()),
            timestamp: None,
        })
        .await?;
    println!("message -> {}", reply);

    let mut skill = ParleyClient::connect(
        &connection,
        ClientConfig::default(),
        llm_chat_completion::skill_dialogues,
    )
    .await?;
    let (reply, _) = skill
        .request(LlmChatCompletionContent::Create {
            model: "echo-1".to_string(),
            messages: vec![
                ChatTurn::new(ChatRole::System, "You are a helpful assistant."),
                ChatTurn::new(ChatRole::User, "echo hello world"),
            ],
            kwargs: Kwargs::new().with("temperature", Primitive::Float(0.2)),
        })
        .await?;

    if let LlmChatCompletionContent::Response { data, .. } = reply.content() {
        let data: serde_json::Value = serde_json::from_str(data)?;
        println!("\ncreate -> {}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("\ncreate -> {}", reply);
    }

    Ok(())
}
