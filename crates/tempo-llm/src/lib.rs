//! AI classifier gateway for the tempo activity tracker.
//!
//! Turns a capture context (active app, window title, screenshot) into a
//! [`TaskAnalysis`] describing what the user was doing and which project
//! the time belongs to.
//!
//! The gateway never fails: any transport or parse problem degrades to a
//! local heuristic analysis so the sampler is never blocked or crashed by
//! the classifier. Each call is a single attempt bounded only by the
//! HTTP client's timeout.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tempo_core::{AppCategory, Category, Confidence};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLASSIFY_MAX_TOKENS: u32 = 500;
const CLASSIFY_TEMPERATURE: f32 = 0.2;

/// In-flight cap for batch classification.
const BATCH_SIZE: usize = 3;
/// Pause between batches to avoid rate-limit bursts.
const BATCH_DELAY: Duration = Duration::from_millis(500);

/// Classifier transport errors.
///
/// These never escape [`Classifier::classify`]; they are logged and
/// replaced by the fallback analysis.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// The proxy URL was invalid.
    #[error("invalid proxy URL: {reason}")]
    InvalidProxyUrl { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A project the classifier may attribute time to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
}

/// Capture context handed to the classifier.
#[derive(Debug, Clone)]
pub struct ClassifyContext {
    pub app_name: String,
    pub window_title: String,
    pub app_category: AppCategory,
    pub projects: Vec<ProjectRef>,
    pub screenshot_path: Option<PathBuf>,
}

/// Classifier output for one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub task_description: String,
    pub suggested_project_id: Option<String>,
    pub category: Category,
    pub confidence: Confidence,
    pub notes: Option<String>,
}

/// Classifier gateway over an interchangeable backend.
///
/// # Thread Safety
///
/// The classifier is cheap to clone and safe to share across tasks.
/// Clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Classifier {
    backend: Arc<Backend>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match self.backend.as_ref() {
            Backend::Anthropic { .. } => "anthropic",
            Backend::Proxy { .. } => "proxy",
        };
        f.debug_struct("Classifier")
            .field("backend", &backend)
            .finish_non_exhaustive()
    }
}

enum Backend {
    Anthropic {
        http: reqwest::Client,
        api_key: String,
        model: String,
    },
    Proxy {
        http: reqwest::Client,
        url: String,
    },
}

impl Classifier {
    /// Creates a gateway over the hosted Anthropic messages API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or
    /// if the HTTP client fails to build.
    pub fn anthropic(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        Ok(Self {
            backend: Arc::new(Backend::Anthropic {
                http: build_http_client()?,
                api_key,
                model: model.into(),
            }),
        })
    }

    /// Creates a gateway over an HTTP proxy endpoint.
    ///
    /// The proxy receives `{prompt, screenshot_ref}` as JSON and replies
    /// with the model's raw text.
    pub fn proxy(url: impl Into<String>) -> Result<Self, LlmError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(LlmError::InvalidProxyUrl {
                reason: "proxy URL cannot be empty",
            });
        }
        Ok(Self {
            backend: Arc::new(Backend::Proxy {
                http: build_http_client()?,
                url,
            }),
        })
    }

    /// Classifies one capture. Single attempt, never fails.
    ///
    /// On any transport or parse failure the result degrades to
    /// [`fallback_analysis`].
    pub async fn classify(&self, ctx: &ClassifyContext) -> TaskAnalysis {
        let prompt = build_prompt(ctx);
        match self
            .backend
            .complete(&prompt, ctx.screenshot_path.as_deref())
            .await
        {
            Ok(text) => analysis_from_text(&text, ctx),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    app = %ctx.app_name,
                    "classification failed, using fallback"
                );
                fallback_analysis(ctx)
            }
        }
    }

    /// Classifies a batch of pending entries.
    ///
    /// Runs at most [`BATCH_SIZE`] calls in flight at once with a fixed
    /// delay between batches. A failure for one entry degrades that
    /// entry to the fallback without aborting the rest.
    pub async fn classify_batch(
        &self,
        pending: Vec<(i64, ClassifyContext)>,
    ) -> HashMap<i64, TaskAnalysis> {
        let mut results = HashMap::with_capacity(pending.len());
        let mut remaining = pending.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<(i64, ClassifyContext)> =
                remaining.by_ref().take(BATCH_SIZE).collect();

            let mut in_flight = tokio::task::JoinSet::new();
            for (entry_id, ctx) in batch {
                let classifier = self.clone();
                in_flight.spawn(async move { (entry_id, classifier.classify(&ctx).await) });
            }
            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok((entry_id, analysis)) => {
                        results.insert(entry_id, analysis);
                    }
                    Err(err) => tracing::warn!(error = %err, "classification task panicked"),
                }
            }

            if remaining.peek().is_some() {
                tokio::time::sleep(BATCH_DELAY).await;
            }
        }

        results
    }
}

fn build_http_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(LlmError::ClientBuild)
}

impl Backend {
    async fn complete(
        &self,
        prompt: &str,
        screenshot: Option<&Path>,
    ) -> Result<String, LlmError> {
        match self {
            Self::Anthropic {
                http,
                api_key,
                model,
            } => complete_anthropic(http, api_key, model, prompt, screenshot).await,
            Self::Proxy { http, url } => complete_proxy(http, url, prompt, screenshot).await,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
}

async fn complete_anthropic(
    http: &reqwest::Client,
    api_key: &str,
    model: &str,
    prompt: &str,
    screenshot: Option<&Path>,
) -> Result<String, LlmError> {
    let mut content = Vec::new();
    if let Some(path) = screenshot {
        // A missing or unreadable screenshot degrades to a text-only
        // request rather than failing the call.
        match std::fs::read(path) {
            Ok(bytes) => content.push(ContentPart::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: "image/png",
                    data: BASE64.encode(bytes),
                },
            }),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "screenshot unreadable");
            }
        }
    }
    content.push(ContentPart::Text {
        text: prompt.to_string(),
    });

    let request = MessageRequest {
        model: model.to_string(),
        max_tokens: CLASSIFY_MAX_TOKENS,
        temperature: CLASSIFY_TEMPERATURE,
        messages: vec![Message {
            role: "user",
            content,
        }],
    };

    let response = http
        .post(ANTHROPIC_API_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(parse_api_error(&body).unwrap_or_else(|| LlmError::Api {
            message: format!("status {status}: {body}"),
        }));
    }

    let payload: MessageResponse =
        serde_json::from_str(&body).map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
    extract_text(payload.content)
}

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot_ref: Option<String>,
}

async fn complete_proxy(
    http: &reqwest::Client,
    url: &str,
    prompt: &str,
    screenshot: Option<&Path>,
) -> Result<String, LlmError> {
    let request = ProxyRequest {
        prompt,
        screenshot_ref: screenshot.map(|p| p.display().to_string()),
    };

    let response = http.post(url).json(&request).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(LlmError::Api {
            message: format!("status {status}: {body}"),
        });
    }
    Ok(body)
}

fn extract_text(blocks: Vec<ContentBlock>) -> Result<String, LlmError> {
    let mut pieces = Vec::new();
    for block in blocks {
        let ContentBlock::Text { text } = block;
        pieces.push(text);
    }
    if pieces.is_empty() {
        return Err(LlmError::InvalidResponse(
            "missing text content".to_string(),
        ));
    }
    Ok(pieces.join("\n"))
}

fn parse_api_error(body: &str) -> Option<LlmError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| LlmError::Api {
            message: payload.error.message,
        })
}

fn build_prompt(ctx: &ClassifyContext) -> String {
    let mut lines = Vec::new();
    lines.push(
        "You are a time-tracking assistant. Describe what the user is working on.".to_string(),
    );
    lines.push(
        "Return strict JSON: {\"task_description\":\"...\",\"suggested_project_id\":\"...\"|null,\"category\":\"...\",\"confidence\":0.0-1.0,\"notes\":\"...\"}"
            .to_string(),
    );
    lines.push(
        "Valid categories: coding, research, communication, design, writing, other.".to_string(),
    );
    lines.push(String::new());
    lines.push(format!("app: {}", ctx.app_name));
    lines.push(format!("window_title: {}", ctx.window_title));
    if !ctx.projects.is_empty() {
        let rendered = ctx
            .projects
            .iter()
            .map(|p| format!("{} ({})", p.id, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("known_projects: {rendered}"));
    }
    lines.join("\n")
}

/// Parses the model's raw text into an analysis.
///
/// The text is scanned for the first brace-delimited JSON object; its
/// fields are used with per-field defaults. If no parseable object is
/// found, degrades to the fallback analysis.
fn analysis_from_text(text: &str, ctx: &ClassifyContext) -> TaskAnalysis {
    #[derive(Deserialize)]
    struct RawAnalysis {
        task_description: Option<String>,
        #[serde(alias = "project_id")]
        suggested_project_id: Option<String>,
        category: Option<String>,
        confidence: Option<f32>,
        notes: Option<String>,
    }

    let Some(object) = extract_json_object(text) else {
        tracing::debug!("no JSON object in classifier output, using fallback");
        return fallback_analysis(ctx);
    };
    let Ok(raw) = serde_json::from_str::<RawAnalysis>(object) else {
        tracing::debug!("unparseable classifier output, using fallback");
        return fallback_analysis(ctx);
    };

    TaskAnalysis {
        task_description: raw
            .task_description
            .unwrap_or_else(|| "Unknown activity".to_string()),
        suggested_project_id: raw.suggested_project_id,
        category: raw
            .category
            .map_or(Category::Other, |c| Category::normalize(&c)),
        confidence: Confidence::clamped(raw.confidence.unwrap_or(0.5)),
        notes: raw.notes,
    }
}

/// Local heuristic analysis used when the classifier is unavailable.
#[must_use]
pub fn fallback_analysis(ctx: &ClassifyContext) -> TaskAnalysis {
    TaskAnalysis {
        task_description: format!("Working in {}", ctx.app_name),
        suggested_project_id: None,
        category: ctx.app_category.fallback_category(),
        confidence: Confidence::clamped(0.3),
        notes: Some("Fallback analysis - AI unavailable".to_string()),
    }
}

/// Returns the first brace-delimited JSON object in `text`, honoring
/// string literals and escapes so braces inside values do not confuse
/// the scan.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_ctx() -> ClassifyContext {
        ClassifyContext {
            app_name: "Zed".to_string(),
            window_title: "main.rs".to_string(),
            app_category: AppCategory::Editor,
            projects: vec![ProjectRef {
                id: "tempo".to_string(),
                name: "Tempo tracker".to_string(),
            }],
            screenshot_path: None,
        }
    }

    #[test]
    fn classifier_rejects_empty_api_key() {
        assert!(matches!(
            Classifier::anthropic("", "claude-3-5-haiku-latest"),
            Err(LlmError::InvalidApiKey { .. })
        ));
        assert!(matches!(
            Classifier::anthropic("   ", "claude-3-5-haiku-latest"),
            Err(LlmError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn classifier_rejects_empty_proxy_url() {
        assert!(matches!(
            Classifier::proxy(""),
            Err(LlmError::InvalidProxyUrl { .. })
        ));
    }

    #[test]
    fn extract_json_object_finds_embedded_object() {
        let text = "Sure, here is the analysis:\n{\"category\": \"coding\"}\nHope it helps!";
        assert_eq!(extract_json_object(text), Some("{\"category\": \"coding\"}"));
    }

    #[test]
    fn extract_json_object_handles_nesting_and_strings() {
        let text = r#"{"a": {"b": "va}lue"}, "c": "d"} trailing {"ignored": 1}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": {"b": "va}lue"}, "c": "d"}"#)
        );
    }

    #[test]
    fn extract_json_object_handles_escaped_quotes() {
        let text = r#"{"a": "quote \" and brace }"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn extract_json_object_none_without_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{unterminated"), None);
    }

    #[test]
    fn analysis_uses_model_fields() {
        let text = r#"{"task_description":"Refactoring the store","suggested_project_id":"tempo","category":"coding","confidence":0.9,"notes":"clear screenshot"}"#;
        let analysis = analysis_from_text(text, &editor_ctx());
        assert_eq!(analysis.task_description, "Refactoring the store");
        assert_eq!(analysis.suggested_project_id.as_deref(), Some("tempo"));
        assert_eq!(analysis.category, Category::Coding);
        assert!((analysis.confidence.value() - 0.9).abs() < f32::EPSILON);
        assert_eq!(analysis.notes.as_deref(), Some("clear screenshot"));
    }

    #[test]
    fn analysis_applies_per_field_defaults() {
        let analysis = analysis_from_text("{}", &editor_ctx());
        assert_eq!(analysis.task_description, "Unknown activity");
        assert_eq!(analysis.suggested_project_id, None);
        assert_eq!(analysis.category, Category::Other);
        assert!((analysis.confidence.value() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn analysis_normalizes_unrecognized_category() {
        let text = r#"{"category":"procrastinating"}"#;
        let analysis = analysis_from_text(text, &editor_ctx());
        assert_eq!(analysis.category, Category::Other);
    }

    #[test]
    fn analysis_without_json_falls_back() {
        let analysis = analysis_from_text("I could not tell.", &editor_ctx());
        assert_eq!(analysis, fallback_analysis(&editor_ctx()));
    }

    #[test]
    fn fallback_for_editor_is_coding() {
        let analysis = fallback_analysis(&editor_ctx());
        assert_eq!(analysis.task_description, "Working in Zed");
        assert_eq!(analysis.suggested_project_id, None);
        assert_eq!(analysis.category, Category::Coding);
        assert!((analysis.confidence.value() - 0.3).abs() < f32::EPSILON);
        assert_eq!(
            analysis.notes.as_deref(),
            Some("Fallback analysis - AI unavailable")
        );
    }

    #[test]
    fn build_prompt_includes_context_fields() {
        let prompt = build_prompt(&editor_ctx());
        assert!(prompt.contains("app: Zed"));
        assert!(prompt.contains("window_title: main.rs"));
        assert!(prompt.contains("known_projects: tempo (Tempo tracker)"));
        assert!(prompt.contains("coding, research, communication, design, writing, other"));
    }

    #[tokio::test]
    async fn classify_never_errors_when_backend_unreachable() {
        // Port 1 is never listening; the request fails immediately and
        // the gateway must degrade instead of propagating.
        let classifier = Classifier::proxy("http://127.0.0.1:1/classify").unwrap();
        let analysis = classifier.classify(&editor_ctx()).await;
        assert_eq!(analysis.category, Category::Coding);
        assert!((analysis.confidence.value() - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn batch_failures_do_not_abort_other_entries() {
        let classifier = Classifier::proxy("http://127.0.0.1:1/classify").unwrap();
        let pending: Vec<(i64, ClassifyContext)> =
            (1..=4).map(|id| (id, editor_ctx())).collect();

        let results = classifier.classify_batch(pending).await;
        assert_eq!(results.len(), 4);
        for id in 1..=4 {
            assert_eq!(results[&id].category, Category::Coding);
        }
    }
}
