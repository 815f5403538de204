use crate::exchange::{ ExchangeController, SubmitOutcome };
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::validation::validate_message;

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::net::TcpListener;
use tokio::sync::{ mpsc, Mutex };

use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ accept_async, WebSocketStream };

use futures::{ Sink, SinkExt, StreamExt };
use log::{ error, info, warn };
use uuid::Uuid;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

type WsError = tokio_tungstenite::tungstenite::Error;

pub async fn start_ws_server(
    addr: &str,
    controller: Arc<Mutex<ExchangeController>>,
    stream_responses: bool
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Incoming connection from: {}", peer);
        let controller_clone = Arc::clone(&controller);

        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(ws) => handle_connection(peer, ws, controller_clone, stream_responses).await,
                Err(e) => error!("WebSocket handshake failed for {}: {}", peer, e),
            }
        });
    }
}

async fn send_message<W>(tx: &mut W, message: &ServerMessage) -> Result<(), WsError>
    where W: Sink<Message, Error = WsError> + Unpin
{
    match serde_json::to_string(message) {
        Ok(json) => tx.send(Message::Text(json)).await,
        Err(e) => {
            error!("Failed to encode server message: {}", e);
            Ok(())
        }
    }
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    controller: Arc<Mutex<ExchangeController>>,
    stream_responses: bool
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let (mut tx, mut rx) = websocket.split();
    let connection_id = Uuid::new_v4().to_string();
    info!("Assigned connection ID {} to {}", connection_id, peer);

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    | WsError::ConnectionClosed
                    | WsError::Protocol(_)
                    | WsError::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            let error_msg = ServerMessage::Error {
                message: "Message too large".to_string(),
            };
            if send_message(&mut tx, &error_msg).await.is_err() {
                error!("Failed to send size limit error to {}", peer);
            }
            break;
        }

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                if tx.send(Message::Pong(ping_data)).await.is_err() {
                    error!("Failed to send pong to {}", peer);
                    break;
                }
                continue;
            }
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
                continue;
            }
            Message::Pong(_) | Message::Frame(_) => {
                continue;
            }
        };

        let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to parse message from {}: {}", peer, e);
                let error_msg = ServerMessage::Error {
                    message: format!("Failed to parse message: {}", e),
                };
                if send_message(&mut tx, &error_msg).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let sent = match client_msg {
            ClientMessage::Chat { content } => {
                handle_chat(&mut tx, &controller, &content, stream_responses).await
            }
            ClientMessage::History => {
                let turns = controller.lock().await.conversation().turns.clone();
                send_message(&mut tx, &ServerMessage::History { turns }).await
            }
            ClientMessage::Clear => {
                controller.lock().await.clear().await;
                send_message(&mut tx, &ServerMessage::Cleared).await
            }
            ClientMessage::Status => {
                let status = status_message(&controller).await;
                send_message(&mut tx, &status).await
            }
            ClientMessage::Reinitialize => {
                controller.lock().await.reinitialize().await;
                let status = status_message(&controller).await;
                send_message(&mut tx, &status).await
            }
        };

        if let Err(e) = sent {
            error!("Error sending message to {}: {}", peer, e);
            break;
        }
    }
    info!("WebSocket connection closed for {} (Conn ID: {})", peer, connection_id);
}

async fn status_message(controller: &Arc<Mutex<ExchangeController>>) -> ServerMessage {
    let guard = controller.lock().await;
    let service = guard.service();
    ServerMessage::Status {
        configured: service.is_initialized().await,
        message: service.status().await.to_string(),
    }
}

async fn handle_chat<W>(
    tx: &mut W,
    controller: &Arc<Mutex<ExchangeController>>,
    content: &str,
    stream_responses: bool
) -> Result<(), WsError>
    where W: Sink<Message, Error = WsError> + Unpin
{
    // Rejected text gets a single error frame, never `processing`.
    if validate_message(content).valid {
        send_message(tx, &ServerMessage::Processing).await?;
    }

    let mut guard = controller.lock().await;
    let outcome = if stream_responses {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
        let submit = guard.submit_streaming(content, move |chunk| {
            let _ = chunk_tx.send(chunk.to_string());
        });
        let forward = async {
            while let Some(chunk) = chunk_rx.recv().await {
                send_message(tx, &ServerMessage::Chunk { content: chunk }).await?;
            }
            Ok::<(), WsError>(())
        };
        let (outcome, forwarded) = tokio::join!(submit, forward);
        forwarded?;
        outcome
    } else {
        guard.submit(content).await
    };

    drop(guard);

    let reply = match outcome {
        SubmitOutcome::Rejected(message) => ServerMessage::Error { message },
        SubmitOutcome::Answered(turn) | SubmitOutcome::Failed(turn) =>
            ServerMessage::Response {
                content: turn.content,
                timestamp: turn.timestamp.timestamp(),
            },
    };
    send_message(tx, &reply).await
}
