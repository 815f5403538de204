use serde::{ Serialize, Deserialize };

use super::chat::Turn;

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "history")]
    History,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "reinitialize")]
    Reinitialize,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "response")] Response {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "chunk")] Chunk {
        content: String,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "history")] History {
        turns: Vec<Turn>,
    },
    #[serde(rename = "status")] Status {
        configured: bool,
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "cleared")]
    Cleared,
}
