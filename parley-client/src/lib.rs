//! Parley Client SDK - open dialogues with a Parley server and await replies.
//!
//! # Example
//!
//! ```no_run
//! use parley_client::{ClientConfig, ConnectionConfig, ParleyClient};
//! use parley_core::protocols::chatroom::{self, ChatroomContent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = ParleyClient::connect(
//!         &ConnectionConfig::default(),
//!         ClientConfig::default(),
//!         chatroom::dialogues,
//!     )
//!     .await?;
//!
//!     let subscribe = ChatroomContent::Subscribe { chat_id: "123".to_string() };
//!     let (reply, _dialogue) = client.request(subscribe).await?;
//!     println!("Reply: {}", reply);
//!
//!     Ok(())
//! }
//! ```

mod connection;

pub use connection::{Connection, ConnectionConfig};

use std::time::Duration;

use tokio::time::timeout;

use parley_core::{
    Address, Dialogue, DialogueLabel, Dialogues, Envelope, Message, ParleyError, ParleyResult,
    ProtocolCodec,
};

/// Client identity and reply policy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Agent address this client speaks as.
    pub address: Address,
    /// Agent address of the server.
    pub server_address: Address,
    /// How long `request` waits for the reply.
    pub reply_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: format!("client_{}", uuid::Uuid::new_v4().simple()),
            server_address: "parley/server".to_string(),
            reply_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn with_address(mut self, address: impl Into<Address>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_server_address(mut self, address: impl Into<Address>) -> Self {
        self.server_address = address.into();
        self
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }
}

/// High-level Parley client for one protocol.
pub struct ParleyClient<P: ProtocolCodec> {
    connection: Connection,
    dialogues: Dialogues<P>,
    config: ClientConfig,
}

impl<P: ProtocolCodec> ParleyClient<P> {
    /// Connect to a Parley server.
    ///
    /// `dialogues` builds the local registry for the configured address.
    pub async fn connect(
        connection: &ConnectionConfig,
        config: ClientConfig,
        dialogues: impl FnOnce(Address) -> Dialogues<P>,
    ) -> ParleyResult<Self> {
        let connection = Connection::connect(connection).await?;
        Ok(Self {
            connection,
            dialogues: dialogues(config.address.clone()),
            config,
        })
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Local dialogue registry.
    pub fn dialogues(&self) -> &Dialogues<P> {
        &self.dialogues
    }

    /// Open a dialogue with the server and wait for its first reply.
    ///
    /// When the reply does not arrive within the configured timeout this
    /// returns [`ParleyError::Timeout`]; the dialogue stays open locally.
    pub async fn request(
        &mut self,
        content: P::Content,
    ) -> ParleyResult<(Message<P>, Dialogue<P>)> {
        let (message, dialogue) = self
            .dialogues
            .create(self.config.server_address.clone(), content)?;
        tracing::debug!("Sending {} in {}", message, dialogue.label());
        self.connection.send(&Envelope::wrap(&message)?).await?;

        let label = dialogue.label().clone();
        let deadline = self.config.reply_timeout;
        timeout(deadline, self.await_reply(&label))
            .await
            .map_err(|_| ParleyError::Timeout(deadline))?
    }

    /// Receive until a message advances the dialogue labelled `label`.
    async fn await_reply(
        &mut self,
        label: &DialogueLabel,
    ) -> ParleyResult<(Message<P>, Dialogue<P>)> {
        loop {
            let envelope = self.connection.recv().await?;
            let message = match envelope.open::<P>() {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Dropping envelope from {}: {}", envelope.sender, e);
                    continue;
                }
            };

            match self.dialogues.try_update(&message) {
                Ok(dialogue) if &dialogue.label().incomplete_version() == label => {
                    return Ok((message, dialogue));
                }
                Ok(dialogue) => {
                    tracing::debug!("Message {} for other dialogue {}", message, dialogue.label())
                }
                Err(e) => tracing::warn!("Dropping {}: {}", message, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::protocols::chatroom::{self, Chatroom, ChatroomContent};
    use parley_core::DialogueState;
    use tokio::net::{TcpListener, TcpStream};

    async fn read_envelope(stream: &mut TcpStream) -> Envelope {
        use tokio::io::AsyncReadExt;
        let len = stream.read_u32().await.unwrap() as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        Envelope::from_bytes(&buf).unwrap()
    }

    async fn write_envelope(stream: &mut TcpStream, envelope: &Envelope) {
        use tokio::io::AsyncWriteExt;
        let bytes = envelope.to_bytes();
        stream.write_u32(bytes.len() as u32).await.unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    async fn client(listener: &TcpListener, reply_timeout: Duration) -> ParleyClient<Chatroom> {
        let connection = ConnectionConfig::new(listener.local_addr().unwrap());
        let config = ClientConfig::default()
            .with_address("agent")
            .with_server_address("hub")
            .with_reply_timeout(reply_timeout);
        ParleyClient::connect(&connection, config, chatroom::dialogues)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_returns_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = client(&listener, Duration::from_secs(5)).await;
        let (mut stream, _) = listener.accept().await.unwrap();

        let hub = tokio::spawn(async move {
            let mut dialogues = chatroom::dialogues("hub");
            let request = read_envelope(&mut stream).await.open::<Chatroom>().unwrap();
            let dialogue = dialogues.try_update(&request).unwrap();
            let reply = dialogues
                .reply(
                    dialogue.label(),
                    ChatroomContent::SubscriptionResult {
                        chat_id: "123".to_string(),
                        status: "subscribed".to_string(),
                    },
                    None,
                )
                .unwrap();
            write_envelope(&mut stream, &Envelope::wrap(&reply).unwrap()).await;
        });

        let (reply, dialogue) = client
            .request(ChatroomContent::Subscribe {
                chat_id: "123".to_string(),
            })
            .await
            .unwrap();
        hub.await.unwrap();

        assert_eq!(reply.message_id(), 2);
        assert_eq!(reply.sender(), Some("hub"));
        assert!(matches!(dialogue.state(), DialogueState::Ended(_)));
        assert!(dialogue.label().is_complete());
        assert!(client.dialogues().is_empty());
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = client(&listener, Duration::from_millis(50)).await;
        let (_silent, _) = listener.accept().await.unwrap();

        let result = client
            .request(ChatroomContent::GetChannels {
                agent_id: "agent".to_string(),
            })
            .await;

        assert!(matches!(result, Err(ParleyError::Timeout(_))));
        assert_eq!(client.dialogues().len(), 1);
    }
}
