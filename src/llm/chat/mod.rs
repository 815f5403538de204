pub mod gemini;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::{ debug, warn };
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmError };
use self::gemini::GeminiChatClient;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<CompletionResponse, LlmError>;

    /// Yields text chunks in arrival order. Errors that happen before the
    /// first byte are returned directly rather than through the stream.
    async fn complete_stream(&self, prompt: &str) -> Result<ChunkStream, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = Arc::new(GeminiChatClient::from_config(config)?);
    Ok(client)
}

/// Maps one complete line of a streamed body to a text chunk, an error
/// that ends the stream, or nothing.
pub type LineParser = fn(&str) -> Option<Result<String, LlmError>>;

/// Posts `payload` and turns the newline-delimited reply body into a chunk
/// stream. Lines are reassembled across network reads before `line_parser`
/// sees them. The first error, from the transport or from the body itself,
/// is the last item.
pub async fn http_stream_generate(
    http: reqwest::Client,
    url: String,
    payload: impl serde::Serialize + Send + 'static,
    line_parser: LineParser
) -> Result<ChunkStream, LlmError> {
    let resp = http.post(&url).json(&payload).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(LlmError::from_response(status, &body));
    }

    // Capacity 1: at most one chunk waits for the consumer.
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut bytes = resp.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    buffer.extend_from_slice(&buf);
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        if !forward_line(&tx, &line, line_parser).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(LlmError::Request(e))).await;
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            forward_line(&tx, &buffer, line_parser).await;
        }
        debug!("stream from {} finished", url.split('?').next().unwrap_or_default());
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

// Returns false once the stream should end: the receiver has gone away or
// an error was forwarded.
async fn forward_line(
    tx: &mpsc::Sender<Result<String, LlmError>>,
    line: &[u8],
    line_parser: LineParser
) -> bool {
    let text = match std::str::from_utf8(line) {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in stream: {}", e);
            return true;
        }
    };
    match line_parser(text) {
        Some(Ok(tok)) => tx.send(Ok(tok)).await.is_ok(),
        Some(Err(e)) => {
            warn!("Error event in stream: {}", e);
            let _ = tx.send(Err(e)).await;
            false
        }
        None => true,
    }
}
