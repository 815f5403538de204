pub mod cli;
pub mod exchange;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod service;
pub mod validation;

use cli::Args;
use exchange::ExchangeController;
use history::{ ConversationStore, FileSlotStorage };
use log::info;
use server::Server;
use service::AiService;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Composition root: builds the service, the store and the controller once
/// and hands them to the selected front end.
pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("API Key Source: {}", if args.api_key.is_some() { "command line" } else { "environment" });
    info!("History Dir: {}", args.history_dir);
    info!("History Key: {}", args.history_key);
    info!("Streaming: {}", args.stream);
    info!("Mode: {}", if args.interactive { "interactive" } else { "websocket" });
    info!("-------------------------");

    let service = Arc::new(AiService::gemini(args.service_config()));
    info!("API Status: {}", service.status().await);

    let storage = Arc::new(FileSlotStorage::new(&args.history_dir));
    let store = ConversationStore::new(storage, args.history_key.clone());
    let mut controller = ExchangeController::new(store, service);
    controller.load().await;

    if args.interactive {
        return cli::interactive::run_interactive(&mut controller, args.stream).await;
    }

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, Arc::new(Mutex::new(controller)), args.stream);
    server.run().await?;

    Ok(())
}
