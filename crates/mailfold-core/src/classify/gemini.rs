//! Gemini `generateContent` client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Oracle, OracleError};
use crate::config::OracleConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";
const GENERATE_METHOD: &str = "generateContent";
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Oracle backed by the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiOracle {
    http: Client,
    config: OracleConfig,
}

/// A model advertised by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Resource name, e.g. `models/gemini-2.0-flash`.
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// API methods the model supports.
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiOracle {
    /// Creates a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Http`] if the HTTP client cannot be built.
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// The configured primary model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Lists models that support content generation.
    ///
    /// # Errors
    ///
    /// Returns an [`OracleError`] if the request fails.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, OracleError> {
        let url = format!("{}/v1beta/models", self.base());
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .header(API_KEY_HEADER, &self.config.api_key);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = request.send().await.map_err(|e| self.map_transport(&e))?;
            let status = response.status();
            let body = response.text().await.map_err(|e| self.map_transport(&e))?;
            if !status.is_success() {
                return Err(map_status(status, &body, "models"));
            }

            let page: ModelList =
                serde_json::from_str(&body).map_err(|e| OracleError::Decode(e.to_string()))?;
            models.extend(page.models.into_iter().filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_METHOD)
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String, OracleError> {
        let url = format!(
            "{}/v1beta/{}:{GENERATE_METHOD}",
            self.base(),
            resource_name(model)
        );
        let request = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 64,
            },
        };

        debug!(model, "Sending classification request");
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport(&e))?;
        if !status.is_success() {
            return Err(map_status(status, &body, model));
        }

        parse_generate_response(&body)
    }

    fn base(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn map_transport(&self, e: &reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout(self.config.timeout)
        } else {
            OracleError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        match self.generate(&self.config.model, prompt).await {
            Err(OracleError::ModelNotFound(model)) => {
                let Some(fallback) = self.config.fallback_model.as_deref() else {
                    return Err(OracleError::ModelNotFound(model));
                };
                if resource_name(fallback) == resource_name(&model) {
                    return Err(OracleError::ModelNotFound(model));
                }
                warn!(%model, fallback, "Model unavailable, retrying with fallback");
                self.generate(fallback, prompt).await
            }
            other => other,
        }
    }
}

fn resource_name(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn map_status(status: StatusCode, body: &str, model: &str) -> OracleError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let message = detail
        .as_ref()
        .map_or_else(|| body.trim().to_string(), |d| d.message.clone());

    if status == StatusCode::TOO_MANY_REQUESTS
        || detail.as_ref().is_some_and(|d| d.status == RESOURCE_EXHAUSTED)
    {
        return OracleError::RateLimited(message);
    }
    if status == StatusCode::NOT_FOUND {
        return OracleError::ModelNotFound(model.to_string());
    }
    OracleError::Status {
        status: status.as_u16(),
        message,
    }
}

fn parse_generate_response(body: &str) -> Result<String, OracleError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| OracleError::Decode(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(endpoint: String) -> OracleConfig {
        OracleConfig {
            api_key: "test-key".to_string(),
            model: "models/primary".to_string(),
            fallback_model: Some("models/fallback".to_string()),
            endpoint,
            timeout: Duration::from_secs(5),
        }
    }

    /// Serves one canned response per connection and returns the request lines.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                seen.push(request.lines().next().unwrap_or_default().to_string());
                assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));

                let reply = format!(
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            seen
        });

        (endpoint, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if data.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    const ANSWER: &str =
        r#"{"candidates":[{"content":{"parts":[{"text":"Finances/Invoices\n"}],"role":"model"}}]}"#;

    #[test]
    fn test_parse_generate_response() {
        assert_eq!(parse_generate_response(ANSWER).unwrap(), "Finances/Invoices\n");
        assert_eq!(
            parse_generate_response(r#"{"candidates":[]}"#),
            Err(OracleError::EmptyResponse)
        );
        assert!(matches!(
            parse_generate_response("not json"),
            Err(OracleError::Decode(_))
        ));
    }

    #[test]
    fn test_map_status() {
        let quota = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            map_status(StatusCode::TOO_MANY_REQUESTS, quota, "m"),
            OracleError::RateLimited("Quota exceeded".to_string())
        );
        assert!(map_status(StatusCode::BAD_REQUEST, quota, "m").is_rate_limited());
        assert_eq!(
            map_status(StatusCode::NOT_FOUND, "{}", "models/x"),
            OracleError::ModelNotFound("models/x".to_string())
        );
        assert_eq!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, "boom", "m"),
            OracleError::Status {
                status: 500,
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("gemini-2.0-flash"), "models/gemini-2.0-flash");
        assert_eq!(resource_name("models/gemini-2.0-flash"), "models/gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let (endpoint, server) = serve(vec![(200, ANSWER)]).await;
        let oracle = GeminiOracle::new(config(endpoint)).unwrap();

        let text = oracle.complete("prompt").await.unwrap();

        assert_eq!(text.trim(), "Finances/Invoices");
        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /v1beta/models/primary:generateContent"));
    }

    #[tokio::test]
    async fn test_complete_falls_back_on_unknown_model() {
        let missing = r#"{"error":{"code":404,"message":"not found","status":"NOT_FOUND"}}"#;
        let (endpoint, server) = serve(vec![(404, missing), (200, ANSWER)]).await;
        let oracle = GeminiOracle::new(config(endpoint)).unwrap();

        let text = oracle.complete("prompt").await.unwrap();

        assert_eq!(text.trim(), "Finances/Invoices");
        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("POST /v1beta/models/fallback:generateContent"));
    }

    #[tokio::test]
    async fn test_complete_reports_rate_limit() {
        let quota = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let (endpoint, _server) = serve(vec![(429, quota)]).await;
        let oracle = GeminiOracle::new(config(endpoint)).unwrap();

        let err = oracle.complete("prompt").await.unwrap_err();

        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_list_models_filters_generators() {
        let body = r#"{"models":[
            {"name":"models/gemini-2.0-flash","displayName":"Flash","supportedGenerationMethods":["generateContent","countTokens"]},
            {"name":"models/embedding-001","supportedGenerationMethods":["embedContent"]}
        ]}"#;
        let (endpoint, _server) = serve(vec![(200, body)]).await;
        let oracle = GeminiOracle::new(config(endpoint)).unwrap();

        let models = oracle.list_models().await.unwrap();

        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "models/gemini-2.0-flash");
        assert_eq!(models[0].display_name.as_deref(), Some("Flash"));
    }
}
