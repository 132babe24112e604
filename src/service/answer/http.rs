//! HTTP client for the question-answering API.
//!
//! The API takes the question plus the prior exchanges, encoded as a JSON
//! string of `{prompt, response}` pairs, and replies with `{answer}`. It may
//! also return a `conversation_id`, which is sent back with the next question.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::base::{
    config::Config,
    error::{ApiError, ApiResult},
    types::{Res, Turn},
};

use super::{Answer, AnswerClient, GenericAnswerClient};

/// Path of the answer endpoint, relative to the API base.
const ANSWER_PATH: &str = "/api/answer";
const RETRY_DELAY_MS: u64 = 1000;

// Extra methods on `AnswerClient` applied by the http implementation.

impl AnswerClient {
    pub fn http(config: &Config) -> Res<Self> {
        let client = HttpAnswerClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }
}

// Wire types.

/// One prior exchange, as the API expects it.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct HistoryPair<'a> {
    prompt: &'a str,
    response: &'a str,
}

/// Request body for the answer endpoint.
#[derive(Debug, Serialize)]
struct AnswerRequest<'a> {
    question: &'a str,
    api_key: &'a str,
    /// JSON-encoded list of [`HistoryPair`].
    history: String,
    conversation_id: Option<&'a str>,
}

// Specific implementations.

/// HTTP answer client implementation.
#[derive(Clone)]
pub struct HttpAnswerClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl HttpAnswerClient {
    /// Create a new HTTP answer client.
    #[instrument(name = "HttpAnswerClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(config.api_timeout_secs)).build()?;

        if config.api_key.is_empty() {
            warn!("API key is not set! Answer API calls will fail.");
        }

        Ok(Self {
            client,
            url: answer_url(&config.api_base),
            api_key: config.api_key.clone(),
            max_retries: config.api_max_retries,
        })
    }

    /// Send one request and interpret the response.
    async fn post_once(&self, body: &AnswerRequest<'_>) -> ApiResult<Answer> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        parse_answer(status, &text)
    }
}

#[async_trait]
impl GenericAnswerClient for HttpAnswerClient {
    #[instrument(name = "HttpAnswerClient::ask", skip_all, fields(context_turns = context.len()))]
    async fn ask(&self, question: &str, context: &[Turn]) -> ApiResult<Answer> {
        if self.api_key.is_empty() {
            return Err(ApiError::NotConfigured);
        }

        let body = build_request(question, &self.api_key, context)?;

        let mut retries = 0;

        loop {
            match self.post_once(&body).await {
                Ok(mut answer) => {
                    info!("Answer API call succeeded after {} attempts", retries + 1);

                    // Keep the current conversation when the API does not name one.
                    if answer.conversation_id.is_none() {
                        answer.conversation_id = body.conversation_id.map(str::to_string);
                    }

                    return Ok(answer);
                }
                Err(err) if err.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    warn!("Answer API call failed, retrying {retries}/{}: {err}", self.max_retries);

                    let delay = Duration::from_millis(RETRY_DELAY_MS * 2_u64.pow(retries - 1));
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// Helpers.

/// Join the API base and the answer path.
fn answer_url(base: &str) -> String {
    format!("{}{ANSWER_PATH}", base.trim_end_matches('/'))
}

/// Build the request body, encoding the context turns as a JSON string.
///
/// The conversation ID comes from the newest context turn.
fn build_request<'a>(question: &'a str, api_key: &'a str, context: &'a [Turn]) -> ApiResult<AnswerRequest<'a>> {
    let pairs = context
        .iter()
        .map(|turn| HistoryPair {
            prompt: &turn.question,
            response: &turn.answer,
        })
        .collect::<Vec<_>>();

    let history = serde_json::to_string(&pairs).map_err(|e| ApiError::MalformedResponse(format!("failed to encode history: {e}")))?;

    Ok(AnswerRequest {
        question,
        api_key,
        history,
        conversation_id: context.last().and_then(|turn| turn.conversation_id.as_deref()),
    })
}

/// Interpret a status and body from the answer endpoint.
fn parse_answer(status: StatusCode, body: &str) -> ApiResult<Answer> {
    if status != StatusCode::OK {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("detail").map(|d| d.as_str().map(str::to_string).unwrap_or_else(|| d.to_string())))
            .unwrap_or_else(|| body.to_string());

        return Err(ApiError::Status { status: status.as_u16(), detail });
    }

    let value = serde_json::from_str::<Value>(body).map_err(|e| ApiError::MalformedResponse(e.to_string()))?;

    let text = value
        .get("answer")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::MalformedResponse("response has no `answer` string".to_string()))?;

    Ok(Answer {
        text: text.to_string(),
        conversation_id: value.get("conversation_id").and_then(Value::as_str).map(str::to_string),
    })
}

// Tests.
