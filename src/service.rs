use futures::stream::{ self, BoxStream, StreamExt };
use log::{ error, info, warn };
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::llm::chat::{ new_client, ChatClient, ChunkStream };
use crate::llm::{ FailureKind, LlmConfig, LlmError };
use crate::models::generation::GenerationResult;
use crate::validation::validate_api_key;

pub const NOT_INITIALIZED_MESSAGE: &str =
    "AI service not initialized. Please check your API key configuration.";
pub const INVALID_API_KEY_MESSAGE: &str = "Invalid API key. Please check your configuration.";
pub const QUOTA_EXCEEDED_MESSAGE: &str = "API quota exceeded. Please try again later.";
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate response. Please try again.";

pub type ClientFactory = Arc<
    dyn Fn(&LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> + Send + Sync
>;

/// Where the API key comes from each time the service initializes.
#[derive(Debug, Clone)]
pub enum ApiKeySource {
    /// Re-read from this environment variable on every initialization.
    Env(String),
    /// Pinned at startup (command line or tests).
    Fixed(Option<String>),
}

impl ApiKeySource {
    pub fn read(&self) -> Option<String> {
        match self {
            ApiKeySource::Env(name) => env::var(name).ok(),
            ApiKeySource::Fixed(key) => key.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: ApiKeySource,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

/// Wraps the remote generation endpoint. Every entry point returns a
/// `GenerationResult`; transport errors never escape.
pub struct AiService {
    config: ServiceConfig,
    factory: ClientFactory,
    client: RwLock<Option<Arc<dyn ChatClient>>>,
}

impl AiService {
    pub fn new(config: ServiceConfig, factory: ClientFactory) -> Self {
        let client = Self::initialize(&config, &factory);
        Self {
            config,
            factory,
            client: RwLock::new(client),
        }
    }

    pub fn gemini(config: ServiceConfig) -> Self {
        Self::new(config, Arc::new(new_client))
    }

    fn initialize(config: &ServiceConfig, factory: &ClientFactory) -> Option<Arc<dyn ChatClient>> {
        let api_key = config.api_key.read();
        let validation = validate_api_key(api_key.as_deref());
        if !validation.valid {
            error!(
                "Failed to initialize AI service: {}",
                validation.error.unwrap_or_default()
            );
            return None;
        }

        let llm_config = LlmConfig {
            api_key,
            completion_model: config.completion_model.clone(),
            base_url: config.base_url.clone(),
        };
        match factory(&llm_config) {
            Ok(client) => {
                info!(
                    "AI service initialized: model={} base_url={:?}",
                    client.get_model(),
                    client.get_base_url()
                );
                Some(client)
            }
            Err(e) => {
                error!("Failed to initialize AI service: {}", e);
                None
            }
        }
    }

    /// Re-runs initialization. A request already in flight keeps the client
    /// it started with.
    pub async fn reinitialize(&self) {
        let client = Self::initialize(&self.config, &self.factory);
        *self.client.write().await = client;
    }

    pub async fn is_initialized(&self) -> bool {
        self.client.read().await.is_some()
    }

    pub async fn status(&self) -> &'static str {
        if self.is_initialized().await { "Connected" } else { "Not configured" }
    }

    async fn current_client(&self) -> Option<Arc<dyn ChatClient>> {
        self.client.read().await.clone()
    }

    pub async fn generate(&self, message: &str) -> GenerationResult {
        let client = match self.current_client().await {
            Some(c) => c,
            None => {
                return GenerationResult::failure(NOT_INITIALIZED_MESSAGE);
            }
        };

        match client.complete(message).await {
            Ok(resp) => GenerationResult::completed(resp.response),
            Err(e) => {
                error!("AI API Error: {}", e);
                GenerationResult::failure(failure_message(&e))
            }
        }
    }

    /// Lazy sequence: nothing is sent until the first poll. Yields one
    /// result per chunk, then a final result with the accumulated text. An
    /// error ends the sequence with a single failure result.
    pub async fn generate_streaming(&self, message: &str) -> BoxStream<'static, GenerationResult> {
        let state = StreamState::Start {
            client: self.current_client().await,
            prompt: message.to_string(),
        };

        stream
            ::unfold(state, |state| async move {
                match state {
                    StreamState::Start { client: None, .. } => {
                        Some((GenerationResult::failure(NOT_INITIALIZED_MESSAGE), StreamState::Done))
                    }
                    StreamState::Start { client: Some(client), prompt } => {
                        match client.complete_stream(&prompt).await {
                            Ok(chunks) => next_chunk(chunks, String::new()).await,
                            Err(e) => {
                                error!("AI Streaming Error: {}", e);
                                Some((
                                    GenerationResult::failure(failure_message(&e)),
                                    StreamState::Done,
                                ))
                            }
                        }
                    }
                    StreamState::Streaming { chunks, full_text } => {
                        next_chunk(chunks, full_text).await
                    }
                    StreamState::Done => None,
                }
            })
            .boxed()
    }
}

enum StreamState {
    Start {
        client: Option<Arc<dyn ChatClient>>,
        prompt: String,
    },
    Streaming {
        chunks: ChunkStream,
        full_text: String,
    },
    Done,
}

async fn next_chunk(
    mut chunks: ChunkStream,
    mut full_text: String
) -> Option<(GenerationResult, StreamState)> {
    match chunks.next().await {
        Some(Ok(text)) => {
            full_text.push_str(&text);
            Some((GenerationResult::chunk(text), StreamState::Streaming { chunks, full_text }))
        }
        Some(Err(e)) => {
            warn!("AI Streaming Error after {} characters: {}", full_text.chars().count(), e);
            Some((GenerationResult::failure(failure_message(&e)), StreamState::Done))
        }
        None => Some((GenerationResult::finished(full_text), StreamState::Done)),
    }
}

pub fn failure_message(err: &LlmError) -> &'static str {
    match err.kind() {
        FailureKind::InvalidApiKey => INVALID_API_KEY_MESSAGE,
        FailureKind::QuotaExceeded => QUOTA_EXCEEDED_MESSAGE,
        FailureKind::Other => GENERATION_FAILED_MESSAGE,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::{ Arc, Mutex };

    use super::*;
    use crate::llm::chat::CompletionResponse;

    #[derive(Clone)]
    pub enum Script {
        Reply(String),
        Fail(fn() -> LlmError),
        Chunks(Vec<String>),
        ChunksThenFail(Vec<String>, fn() -> LlmError),
    }

    /// Stand-in for the remote endpoint. Records every prompt it receives.
    pub struct FakeChatClient {
        script: Script,
        pub prompts: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl FakeChatClient {
        pub fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn record(&self, prompt: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
        }
    }

    #[async_trait]
    impl ChatClient for FakeChatClient {
        async fn complete(&self, prompt: &str) -> Result<CompletionResponse, LlmError> {
            self.record(prompt);
            match &self.script {
                Script::Reply(text) => Ok(CompletionResponse { response: text.clone() }),
                Script::Chunks(parts) => Ok(CompletionResponse { response: parts.concat() }),
                Script::Fail(make) | Script::ChunksThenFail(_, make) => Err(make()),
            }
        }

        async fn complete_stream(&self, prompt: &str) -> Result<ChunkStream, LlmError> {
            self.record(prompt);
            let items: Vec<Result<String, LlmError>> = match &self.script {
                Script::Reply(text) => vec![Ok(text.clone())],
                Script::Chunks(parts) => parts.iter().cloned().map(Ok).collect(),
                Script::Fail(make) => {
                    return Err(make());
                }
                Script::ChunksThenFail(parts, make) => {
                    let mut items: Vec<_> = parts.iter().cloned().map(Ok).collect();
                    items.push(Err(make()));
                    items
                }
            };
            Ok(Box::pin(stream::iter(items)))
        }

        fn get_model(&self) -> String {
            "fake-model".to_string()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    pub fn fixed_config(key: Option<&str>) -> ServiceConfig {
        ServiceConfig {
            api_key: ApiKeySource::Fixed(key.map(str::to_string)),
            completion_model: None,
            base_url: None,
        }
    }

    pub fn service_with(client: Arc<FakeChatClient>) -> AiService {
        let factory: ClientFactory = Arc::new(move |_: &LlmConfig| Ok(client.clone() as Arc<dyn ChatClient>));
        AiService::new(fixed_config(Some("test-api-key-123")), factory)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use std::sync::atomic::Ordering;

    use super::testing::*;
    use super::*;

    fn quota_error() -> LlmError {
        LlmError::QuotaExceeded("Resource has been exhausted".into())
    }

    fn key_error() -> LlmError {
        LlmError::InvalidApiKey("API key not valid".into())
    }

    fn server_error() -> LlmError {
        LlmError::Http { status: 500, message: "internal".into() }
    }

    #[tokio::test]
    async fn generate_returns_remote_text() {
        let service = service_with(FakeChatClient::new(Script::Reply("Hi there".into())));
        let result = service.generate("Hello").await;
        assert_eq!(result, GenerationResult::completed("Hi there"));
    }

    #[tokio::test]
    async fn generate_classifies_failures_by_kind() {
        let cases: [(fn() -> LlmError, &str); 3] = [
            (key_error, INVALID_API_KEY_MESSAGE),
            (quota_error, QUOTA_EXCEEDED_MESSAGE),
            (server_error, GENERATION_FAILED_MESSAGE),
        ];
        for (make, expected) in cases {
            let service = service_with(FakeChatClient::new(Script::Fail(make)));
            let result = service.generate("Hello").await;
            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some(expected));
            assert_eq!(result.content, None);
        }
    }

    #[tokio::test]
    async fn uninitialized_service_never_calls_the_network() {
        let fake = FakeChatClient::new(Script::Reply("unused".into()));
        let captured = fake.clone();
        let factory: ClientFactory = Arc::new(move |_: &LlmConfig| Ok(captured.clone() as Arc<dyn ChatClient>));
        let service = AiService::new(fixed_config(Some("short")), factory);

        assert!(!service.is_initialized().await);
        assert_eq!(service.status().await, "Not configured");

        let result = service.generate("Hello").await;
        assert_eq!(result.error.as_deref(), Some(NOT_INITIALIZED_MESSAGE));

        let streamed: Vec<_> = service.generate_streaming("Hello").await.collect().await;
        assert_eq!(streamed, vec![GenerationResult::failure(NOT_INITIALIZED_MESSAGE)]);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn factory_error_leaves_service_uninitialized() {
        let factory: ClientFactory = Arc::new(|_: &LlmConfig| Err(LlmError::MissingApiKey));
        let service = AiService::new(fixed_config(Some("test-api-key-123")), factory);
        assert!(!service.is_initialized().await);
    }

    #[tokio::test]
    async fn streaming_yields_chunks_then_accumulated_text() {
        let service = service_with(
            FakeChatClient::new(Script::Chunks(vec!["A".into(), "B".into()]))
        );
        let results: Vec<_> = service.generate_streaming("Hello").await.collect().await;
        assert_eq!(
            results,
            vec![
                GenerationResult::chunk("A"),
                GenerationResult::chunk("B"),
                GenerationResult::finished("AB")
            ]
        );
        assert_eq!(results[2].complete, Some(true));
    }

    #[tokio::test]
    async fn streaming_error_before_first_chunk_yields_single_failure() {
        let service = service_with(FakeChatClient::new(Script::Fail(quota_error)));
        let results: Vec<_> = service.generate_streaming("Hello").await.collect().await;
        assert_eq!(results, vec![GenerationResult::failure(QUOTA_EXCEEDED_MESSAGE)]);
    }

    #[tokio::test]
    async fn streaming_error_mid_stream_stops_without_final_result() {
        let service = service_with(
            FakeChatClient::new(Script::ChunksThenFail(vec!["A".into()], server_error))
        );
        let results: Vec<_> = service.generate_streaming("Hello").await.collect().await;
        assert_eq!(
            results,
            vec![GenerationResult::chunk("A"), GenerationResult::failure(GENERATION_FAILED_MESSAGE)]
        );
    }

    #[tokio::test]
    async fn streaming_is_lazy_and_each_call_is_a_new_request() {
        let fake = FakeChatClient::new(Script::Chunks(vec!["x".into()]));
        let service = service_with(fake.clone());

        let pending = service.generate_streaming("Hello").await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        let _: Vec<_> = pending.collect().await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        let _: Vec<_> = service.generate_streaming("Hello").await.collect().await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reinitialize_picks_up_key_from_environment() {
        let var = "GEMINI_CHAT_TEST_REINIT_KEY";
        env::remove_var(var);

        let fake = FakeChatClient::new(Script::Reply("ok".into()));
        let captured = fake.clone();
        let factory: ClientFactory = Arc::new(move |_: &LlmConfig| Ok(captured.clone() as Arc<dyn ChatClient>));
        let service = AiService::new(
            ServiceConfig {
                api_key: ApiKeySource::Env(var.to_string()),
                completion_model: None,
                base_url: None,
            },
            factory
        );
        assert!(!service.is_initialized().await);

        env::set_var(var, "a-valid-looking-key");
        service.reinitialize().await;
        service.reinitialize().await;
        assert!(service.is_initialized().await);
        assert_eq!(service.status().await, "Connected");
        assert_eq!(service.generate("ping").await, GenerationResult::completed("ok"));

        env::remove_var(var);
    }
}
