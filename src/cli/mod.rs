pub mod interactive;

use clap::Parser;

use crate::history::DEFAULT_HISTORY_KEY;
use crate::llm::{ DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL };
use crate::service::{ ApiKeySource, ServiceConfig };
use crate::validation::API_KEY_ENV;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Google Generative Language API key. When passed on the command line it is
    /// pinned; otherwise it is re-read from the environment on every reload.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Model name for chat completion (e.g., gemini-pro, gemini-1.5-flash)
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// Base URL of the Generative Language API
    #[arg(long, env = "CHAT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub chat_base_url: String,

    /// Stream responses chunk by chunk instead of waiting for the full text.
    #[arg(long, env = "STREAM", default_value = "false")]
    pub stream: bool,

    // --- History Store Args ---
    /// Directory holding the persisted conversation.
    #[arg(long, env = "HISTORY_DIR", default_value = ".chat-history")]
    pub history_dir: String,

    /// Name of the slot the conversation is stored under.
    #[arg(long, env = "HISTORY_KEY", default_value = DEFAULT_HISTORY_KEY)]
    pub history_key: String,

    // --- General App Args ---
    /// Chat on stdin/stdout instead of serving WebSocket clients.
    #[arg(short = 'i', long, env = "INTERACTIVE", default_value = "false")]
    pub interactive: bool,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn service_config(&self) -> ServiceConfig {
        let api_key = match &self.api_key {
            Some(key) => ApiKeySource::Fixed(Some(key.clone())),
            None => ApiKeySource::Env(API_KEY_ENV.to_string()),
        };
        ServiceConfig {
            api_key,
            completion_model: Some(self.chat_model.clone()),
            base_url: Some(self.chat_base_url.clone()),
        }
    }
}
