//! Ordered provider failover.
//!
//! Routes are tried in configuration order. The first route that answers wins
//! and is remembered for `status()`. A quota error skips straight to the next
//! route; every other error is logged and also moves on.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Serialize;

use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, LlmError};

/// One entry in the failover chain.
#[derive(Clone)]
pub struct ProviderRoute {
    name: String,
    client: Arc<dyn LlmClient>,
    /// Model override. When `None` the caller's model is used.
    model: Option<String>,
}

impl ProviderRoute {
    pub fn new(name: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.into(),
            client,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Snapshot of the failover chain.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FallbackStatus {
    pub providers_configured: usize,
    pub provider_names: Vec<String>,
    pub last_successful: Option<String>,
}

/// LLM client that fails over across several routes.
pub struct FallbackClient {
    routes: Vec<ProviderRoute>,
    last_successful: Mutex<Option<String>>,
}

impl FallbackClient {
    pub fn new(routes: Vec<ProviderRoute>) -> Self {
        Self {
            routes,
            last_successful: Mutex::new(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn status(&self) -> FallbackStatus {
        FallbackStatus {
            providers_configured: self.routes.len(),
            provider_names: self.routes.iter().map(|r| r.name.clone()).collect(),
            last_successful: self
                .last_successful
                .lock()
                .ok()
                .and_then(|guard| guard.clone()),
        }
    }

    fn remember(&self, name: &str) {
        if let Ok(mut guard) = self.last_successful.lock() {
            *guard = Some(name.to_string());
        }
    }
}

#[async_trait]
impl LlmClient for FallbackClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> anyhow::Result<ChatResponse> {
        self.chat_completion_with_options(model, messages, ChatOptions::default())
            .await
    }

    async fn chat_completion_with_options(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> anyhow::Result<ChatResponse> {
        let mut last_error = None;

        for route in &self.routes {
            let route_model = route.model.as_deref().unwrap_or(model);
            match route
                .client
                .chat_completion_with_options(route_model, messages, options.clone())
                .await
            {
                Ok(response) => {
                    self.remember(&route.name);
                    return Ok(response);
                }
                Err(error) => {
                    let quota = error
                        .downcast_ref::<LlmError>()
                        .map(|e| e.is_quota_exhausted())
                        .unwrap_or(false);
                    if quota {
                        tracing::warn!(
                            component = "provider",
                            route = %route.name,
                            "Quota exhausted, trying next provider"
                        );
                    } else {
                        tracing::warn!(
                            component = "provider",
                            route = %route.name,
                            "Provider failed: {}",
                            error
                        );
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No LLM providers configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient {
        reply: Option<&'static str>,
        quota: bool,
        calls: AtomicUsize,
        seen_model: Mutex<Option<String>>,
    }

    impl FakeClient {
        fn ok(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply),
                quota: false,
                calls: AtomicUsize::new(0),
                seen_model: Mutex::new(None),
            })
        }

        fn failing(quota: bool) -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                quota,
                calls: AtomicUsize::new(0),
                seen_model: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmClient for FakeClient {
        async fn chat_completion(
            &self,
            model: &str,
            _messages: &[ChatMessage],
        ) -> anyhow::Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_model.lock().unwrap() = Some(model.to_string());
            match self.reply {
                Some(text) => Ok(ChatResponse {
                    content: Some(text.to_string()),
                    finish_reason: Some("stop".into()),
                    usage: None,
                    model: Some(model.to_string()),
                }),
                None if self.quota => {
                    Err(LlmError::from_status(402, "insufficient credits".into(), None).into())
                }
                None => Err(LlmError::from_status(500, "boom".into(), None).into()),
            }
        }
    }

    #[tokio::test]
    async fn test_first_healthy_route_wins() {
        let broke = FakeClient::failing(true);
        let good = FakeClient::ok("hello");
        let unused = FakeClient::ok("never");
        let client = FallbackClient::new(vec![
            ProviderRoute::new("primary", broke.clone()),
            ProviderRoute::new("secondary", good.clone()).with_model("other/model"),
            ProviderRoute::new("tertiary", unused.clone()),
        ]);

        let response = client
            .chat_completion("base/model", &[ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("hello"));
        assert_eq!(broke.seen_model.lock().unwrap().as_deref(), Some("base/model"));
        assert_eq!(good.seen_model.lock().unwrap().as_deref(), Some("other/model"));
        assert_eq!(unused.calls.load(Ordering::SeqCst), 0);

        let status = client.status();
        assert_eq!(status.providers_configured, 3);
        assert_eq!(status.last_successful.as_deref(), Some("secondary"));
    }

    #[tokio::test]
    async fn test_all_routes_failing_returns_last_error() {
        let client = FallbackClient::new(vec![
            ProviderRoute::new("a", FakeClient::failing(false)),
            ProviderRoute::new("b", FakeClient::failing(true)),
        ]);
        let err = client
            .chat_completion("m", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient credits"));
        assert_eq!(client.status().last_successful, None);
    }

    #[tokio::test]
    async fn test_empty_chain_errors() {
        let client = FallbackClient::new(Vec::new());
        assert!(client.is_empty());
        assert!(client.chat_completion("m", &[]).await.is_err());
    }
}
