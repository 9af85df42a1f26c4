//! Parley Server - serves the chatroom and chat completion protocols over TCP.
//!
//! Usage: `parley-server [bind_addr] [keep|purge]`. Finished dialogues are
//! purged unless `keep` is given.

mod channel;
mod chatroom;
mod completion;
mod config;
mod server;

pub use channel::{Channel, Handler, ProtocolChannel, Router};
pub use chatroom::ChatroomService;
pub use completion::EchoCompletions;
pub use config::ServerConfig;
pub use server::Server;

use std::net::SocketAddr;

use parley_core::protocols::chatroom::{self as chatroom_protocol, Chatroom};
use parley_core::protocols::llm_chat_completion::{self, LlmChatCompletion};
use parley_core::{Dialogues, ParleyError, ParleyResult, Protocol};
use tracing_subscriber::EnvFilter;

/// Build the server config from `[bind_addr] [keep|purge]`.
fn config_from_args(mut args: impl Iterator<Item = String>) -> ParleyResult<ServerConfig> {
    let bind_addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:9000".to_string())
        .parse()
        .map_err(|e| ParleyError::Config(format!("Invalid bind address: {}", e)))?;

    let keep = match args.next().as_deref() {
        None | Some("purge") => false,
        Some("keep") => true,
        Some(other) => {
            return Err(ParleyError::Config(format!(
                "Invalid retention '{}': expected keep or purge",
                other
            )))
        }
    };

    Ok(ServerConfig::with_addr(bind_addr).with_keep_terminal_state_dialogues(keep))
}

/// Apply the configured retention override, if any.
fn retention<P: Protocol>(dialogues: Dialogues<P>, config: &ServerConfig) -> Dialogues<P> {
    match config.keep_terminal_state_dialogues {
        Some(keep) => dialogues.with_keep_terminal_state_dialogues(keep),
        None => dialogues,
    }
}

fn chatroom_channel(config: &ServerConfig) -> ProtocolChannel<Chatroom, ChatroomService> {
    ProtocolChannel::new(
        retention(chatroom_protocol::dialogues(config.address.clone()), config),
        ChatroomService::new(),
    )
}

fn completion_channel(
    config: &ServerConfig,
) -> ProtocolChannel<LlmChatCompletion, EchoCompletions> {
    ProtocolChannel::new(
        retention(llm_chat_completion::connection_dialogues(config.address.clone()), config),
        EchoCompletions,
    )
}

#[tokio::main]
async fn main() -> ParleyResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config_from_args(std::env::args().skip(1))?;
    let router = Router::new()
        .with_channel(chatroom_channel(&config))
        .with_channel(completion_channel(&config));

    tracing::info!("Starting Parley server on {}", config.bind_addr);
    tracing::info!("Registered protocols: {:?}", router.protocol_ids());

    let server = Server::new(config, router);
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::protocols::llm_chat_completion::{
        skill_dialogues, ChatRole, ChatTurn, Kwargs, LlmChatCompletionContent,
    };
    use parley_core::Envelope;

    fn args(items: &[&str]) -> impl Iterator<Item = String> {
        items
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_args_default_to_purge() {
        let config = config_from_args(args(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.keep_terminal_state_dialogues, Some(false));
    }

    #[test]
    fn test_args_keep() {
        let config = config_from_args(args(&["0.0.0.0:7000", "keep"])).unwrap();
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.keep_terminal_state_dialogues, Some(true));
    }

    #[test]
    fn test_args_rejected() {
        assert!(matches!(
            config_from_args(args(&["not-an-address"])),
            Err(ParleyError::Config(_))
        ));
        assert!(matches!(
            config_from_args(args(&["127.0.0.1:9000", "forever"])),
            Err(ParleyError::Config(_))
        ));
    }

    async fn complete_requests(config: &ServerConfig, count: usize) -> usize {
        let channel = completion_channel(config);
        assert_eq!(
            channel.dialogues().with(|d| d.keeps_terminal_state_dialogues()),
            config.keep_terminal_state_dialogues.unwrap_or(true)
        );

        let mut skill = skill_dialogues("skill");
        for i in 0..count {
            let (request, _) = skill
                .create(
                    config.address.clone(),
                    LlmChatCompletionContent::Create {
                        model: "echo-1".to_string(),
                        messages: vec![ChatTurn::new(ChatRole::User, format!("ping {}", i))],
                        kwargs: Kwargs::new(),
                    },
                )
                .unwrap();
            let reply = channel.receive(Envelope::wrap(&request).unwrap()).await;
            assert!(reply.is_some());
        }
        channel.dialogues().len()
    }

    #[tokio::test]
    async fn test_completion_channel_purges_by_default() {
        let config = config_from_args(args(&[])).unwrap();
        assert_eq!(complete_requests(&config, 50).await, 0);
    }

    #[tokio::test]
    async fn test_completion_channel_keeps_on_request() {
        let config = config_from_args(args(&["127.0.0.1:9000", "keep"])).unwrap();
        assert_eq!(complete_requests(&config, 5).await, 5);

        let unset = ServerConfig::default();
        assert_eq!(complete_requests(&unset, 2).await, 2);
    }

    #[tokio::test]
    async fn test_chatroom_channel_follows_override() {
        let config = ServerConfig::default().with_keep_terminal_state_dialogues(true);
        let channel = chatroom_channel(&config);
        assert!(channel.dialogues().with(|d| d.keeps_terminal_state_dialogues()));
    }
}
