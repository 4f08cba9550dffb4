//! OpenAI-compatible chat completion client

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::retry::{self, RetryPolicy};
use super::{Completer, Completion};
use crate::conversation::Turn;
use crate::{Error, Result};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

/// A failed attempt and whether it may be retried
struct Failure {
    error: Error,
    recoverable: bool,
    retry_after: Option<Duration>,
}

impl Failure {
    fn fatal(error: Error) -> Self {
        Self {
            error,
            recoverable: false,
            retry_after: None,
        }
    }
}

/// Chat completion client for `/v1/chat/completions`
pub struct OpenAiChatClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl OpenAiChatClient {
    /// Create a new chat client
    ///
    /// `max_tokens` is the output ceiling sent with every request.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(
        api_key: SecretString,
        model: String,
        base_url: Option<String>,
        max_tokens: u32,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("API key required for chat completion".to_string()));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn attempt(
        &self,
        request: &ChatRequest<'_>,
        attempt: u32,
    ) -> std::result::Result<Completion, Failure> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| Failure {
                recoverable: retry::is_recoverable_transport(&e),
                error: Error::Http(e),
                retry_after: None,
            })?;

        let status = response.status();
        tracing::debug!(status = %status, attempt, "completion response");

        if !status.is_success() {
            let retry_after = retry::parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(Failure {
                error: Error::Completion(format!("chat API error {status}: {body}")),
                recoverable: retry::is_recoverable(status),
                retry_after,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Failure::fatal(Error::Http(e)))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                Failure::fatal(Error::Completion(
                    "no choices in chat API response".to_string(),
                ))
            })?
            .message
            .content
            .unwrap_or_default();

        Ok(Completion {
            reply,
            total_tokens: parsed.usage.total_tokens,
        })
    }
}

#[async_trait]
impl Completer for OpenAiChatClient {
    async fn complete(&self, turns: &[Turn]) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: turns,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            turns = turns.len(),
            max_tokens = self.max_tokens,
            "requesting completion"
        );

        let mut attempt = 0;
        loop {
            match self.attempt(&request, attempt).await {
                Ok(completion) => {
                    tracing::debug!(
                        total_tokens = completion.total_tokens,
                        reply_len = completion.reply.len(),
                        "completion received"
                    );
                    return Ok(completion);
                }
                Err(failure) if failure.recoverable && attempt < self.retry.max_retries => {
                    let delay =
                        retry::delay_for_attempt(&self.retry, attempt, failure.retry_after);
                    tracing::warn!(
                        error = %failure.error,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    tracing::error!(error = %failure.error, attempt, "completion failed");
                    return Err(failure.error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_key() {
        let result = OpenAiChatClient::new(
            SecretString::from(String::new()),
            "gpt-3.5-turbo".to_string(),
            None,
            50,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = OpenAiChatClient::new(
            SecretString::from("sk-test".to_string()),
            "gpt-3.5-turbo".to_string(),
            Some("http://localhost:9000/".to_string()),
            50,
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn test_request_shape() {
        let turns = [Turn::system("be kind"), Turn::user("hello")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &turns,
            max_tokens: 50,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["max_tokens"], 50);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }
}
