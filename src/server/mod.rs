pub mod websocket;

use crate::exchange::ExchangeController;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct Server {
    addr: String,
    controller: Arc<Mutex<ExchangeController>>,
    stream: bool,
}

impl Server {
    pub fn new(addr: String, controller: Arc<Mutex<ExchangeController>>, stream: bool) -> Self {
        Self {
            addr,
            controller,
            stream,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(&self.addr, self.controller.clone(), self.stream).await
    }
}
