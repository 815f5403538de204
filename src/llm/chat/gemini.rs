use async_trait::async_trait;
use log::{ debug, info };
use reqwest::header::{ HeaderMap, HeaderValue, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, ChatClient, ChunkStream, CompletionResponse };
use crate::llm::{ LlmConfig, LlmError, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL };

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

impl GeminiRequest {
    fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

impl GoogleChunk {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text)
    }
}

/// Parses one server-sent-event line of `streamGenerateContent?alt=sse`.
fn parse_gemini_line(line: &str) -> Option<Result<String, LlmError>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if let Some(err) = LlmError::from_stream_event(data) {
        return Some(Err(err));
    }
    serde_json
        ::from_str::<GoogleChunk>(data)
        .ok()
        .and_then(|gc| gc.text())
        .filter(|t| !t.is_empty())
        .map(Ok)
}

pub struct GeminiChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, LlmError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key_value = HeaderValue::from_str(&api_key).map_err(|_|
            LlmError::InvalidApiKey("API key contains characters not allowed in a header".into())
        )?;
        key_value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key_value);

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            model: chat_model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or(LlmError::MissingApiKey)?;
        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url.trim_end_matches('/'), self.model, method)
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(&self, prompt: &str) -> Result<CompletionResponse, LlmError> {
        info!("GeminiChatClient::complete() → model={} base_url={}", self.model, self.base_url);

        let resp = self.http
            .post(self.endpoint("generateContent"))
            .json(&GeminiRequest::from_prompt(prompt))
            .send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(LlmError::from_response(status, &body));
        }

        let chunk: GoogleChunk = serde_json::from_str(&body)?;
        let text = chunk.text().ok_or(LlmError::EmptyResponse)?;
        debug!("Gemini returned {} characters", text.chars().count());
        Ok(CompletionResponse { response: text })
    }

    async fn complete_stream(&self, prompt: &str) -> Result<ChunkStream, LlmError> {
        info!(
            "GeminiChatClient::complete_stream() → model={} base_url={}",
            self.model,
            self.base_url
        );

        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        http_stream_generate(
            self.http.clone(),
            url,
            GeminiRequest::from_prompt(prompt),
            parse_gemini_line
        ).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
