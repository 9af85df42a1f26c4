//! TCP connection handling for the Parley server.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;

use parley_core::{Envelope, ParleyError, ParleyResult};

use crate::channel::Router;
use crate::config::ServerConfig;

/// Parley server.
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
}

impl Server {
    /// Create a new server.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            config,
            router: Arc::new(router),
        }
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> ParleyResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| ParleyError::Transport(format!("Failed to bind: {}", e)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// On shutdown every open connection is aborted and awaited.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> ParleyResult<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ParleyError::Transport(format!("Failed to read local address: {}", e)))?;
        tracing::info!("Parley server {} listening on {}", self.config.address, local_addr);

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, addr) = accepted
                        .map_err(|e| ParleyError::Transport(format!("Accept failed: {}", e)))?;
                    tracing::debug!("Connection from {}", addr);

                    let config = self.config.clone();
                    let router = Arc::clone(&self.router);
                    connections.spawn(async move {
                        if let Err(e) = handle_stream(stream, &config, &router).await {
                            tracing::error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    log_finished(finished);
                }
            }
        }

        tracing::info!("Shutting down, closing {} connections", connections.len());
        connections.abort_all();
        while let Some(finished) = connections.join_next().await {
            log_finished(finished);
        }
        Ok(())
    }
}

fn log_finished(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => tracing::debug!("Connection task cancelled"),
        Err(e) => tracing::error!("Connection task failed: {}", e),
    }
}

/// Handle the envelope stream of one connection.
///
/// Replies go back on the connection the request arrived on.
pub async fn handle_stream<S>(
    mut stream: S,
    config: &ServerConfig,
    router: &Router,
) -> ParleyResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let next = read_frame(&mut stream, config.max_message_size);
        let frame = match timeout(config.read_timeout, next).await {
            Ok(frame) => frame?,
            Err(_) => {
                tracing::debug!("Connection idle for {:?}, closing", config.read_timeout);
                break;
            }
        };
        let Some(bytes) = frame else {
            tracing::debug!("Client disconnected");
            break;
        };

        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Dropping undecodable envelope: {}", e);
                continue;
            }
        };
        tracing::debug!(
            "Envelope {} -> {} ({})",
            envelope.sender,
            envelope.destination(),
            envelope.protocol_specification_id
        );

        if let Some(reply) = router.route(envelope).await {
            timeout(config.write_timeout, write_frame(&mut stream, &reply.to_bytes()))
                .await
                .map_err(|_| ParleyError::Timeout(config.write_timeout))??;
        }
    }

    Ok(())
}

/// Read one length-prefixed frame; `None` on a clean end of stream.
async fn read_frame<S>(stream: &mut S, max_message_size: usize) -> ParleyResult<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    // Length prefix: 4 bytes, big-endian.
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ParleyError::Transport(format!("Read error: {}", e))),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_message_size {
        return Err(ParleyError::Transport(format!(
            "Message too large: {} > {}",
            len, max_message_size
        )));
    }

    let mut msg_buf = vec![0u8; len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .map_err(|e| ParleyError::Transport(format!("Read error: {}", e)))?;
    Ok(Some(msg_buf))
}

async fn write_frame<S>(stream: &mut S, bytes: &[u8]) -> ParleyResult<()>
where
    S: AsyncWrite + Unpin,
{
    let len = u32::try_from(bytes.len())
        .map_err(|_| ParleyError::Transport(format!("Message too large: {}", bytes.len())))?;

    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| ParleyError::Transport(format!("Write error: {}", e)))?;
    stream
        .write_all(bytes)
        .await
        .map_err(|e| ParleyError::Transport(format!("Write error: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| ParleyError::Transport(format!("Flush error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::channel::ProtocolChannel;
    use crate::chatroom::ChatroomService;
    use parley_core::protocols::chatroom::{self, Chatroom, ChatroomContent};
    use tokio::io::duplex;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn router(address: &str) -> Router {
        Router::new().with_channel(ProtocolChannel::new(
            chatroom::dialogues(address),
            ChatroomService::new(),
        ))
    }

    fn subscribe(agent: &mut parley_core::Dialogues<Chatroom>, to: &str) -> Envelope {
        let (message, _) = agent
            .create(
                to,
                ChatroomContent::Subscribe {
                    chat_id: "123".to_string(),
                },
            )
            .unwrap();
        Envelope::wrap(&message).unwrap()
    }

    async fn exchange<S>(stream: &mut S, envelope: &Envelope) -> Envelope
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        write_frame(stream, &envelope.to_bytes()).await.unwrap();
        let bytes = read_frame(stream, 1024).await.unwrap().unwrap();
        Envelope::from_bytes(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let config = ServerConfig::default();
        let (mut client, server) = duplex(4096);
        let handle = tokio::spawn(async move {
            let router = router(&config.address);
            handle_stream(server, &config, &router).await
        });

        let mut agent = chatroom::dialogues("agent");
        let reply = exchange(&mut client, &subscribe(&mut agent, "parley/server")).await;
        let message = reply.open::<Chatroom>().unwrap();
        assert_eq!(
            message.content(),
            &ChatroomContent::SubscriptionResult {
                chat_id: "123".to_string(),
                status: "subscribed".to_string()
            }
        );
        assert!(agent.update(&message).is_some());

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_garbage_frame_is_skipped() {
        let config = ServerConfig::default();
        let (mut client, server) = duplex(4096);
        let handle = tokio::spawn(async move {
            let router = router(&config.address);
            handle_stream(server, &config, &router).await
        });

        write_frame(&mut client, &[0xff, 0xff, 0xff]).await.unwrap();
        let mut agent = chatroom::dialogues("agent");
        let reply = exchange(&mut client, &subscribe(&mut agent, "parley/server")).await;
        assert_eq!(reply.to, "agent");

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let config = ServerConfig::default().with_max_message_size(8);
        let (mut client, server) = duplex(4096);
        let handle = tokio::spawn(async move {
            let router = router(&config.address);
            handle_stream(server, &config, &router).await
        });

        write_frame(&mut client, &[0u8; 16]).await.unwrap();
        assert!(matches!(
            handle.await.unwrap(),
            Err(ParleyError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_connection_closes_after_read_timeout() {
        let config = ServerConfig::default()
            .with_timeouts(Duration::from_millis(50), Duration::from_secs(1));
        let (_client, server) = duplex(4096);
        let router = router(&config.address);

        let served = timeout(
            Duration::from_secs(5),
            handle_stream(server, &config, &router),
        )
        .await;
        assert!(matches!(served, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let server = Server::new(ServerConfig::default().with_address("hub"), router("hub"));
        let serving = tokio::spawn(server.serve(listener, async move {
            let _ = stopped.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut agent = chatroom::dialogues("agent");
        let reply = exchange(&mut stream, &subscribe(&mut agent, "hub")).await;
        assert_eq!(reply.sender, "hub");

        // The connection is still open; shutdown must abort it.
        stop.send(()).unwrap();
        serving.await.unwrap().unwrap();
    }
}
