//! Process-scoped cache of constructed model clients.

use crate::llm::client::{LLMClient, LlmType};
use crate::types::{AppError, Result};
use crate::utils::toml_config::ModelsConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds each model client once per [`LlmType`] and hands out shared
/// references afterwards. Entries are never evicted; `reset` clears them
/// and `insert` injects a client directly.
pub struct ModelRegistry {
    models: ModelsConfig,
    clients: RwLock<HashMap<LlmType, Arc<dyn LLMClient>>>,
}

impl ModelRegistry {
    pub fn new(models: ModelsConfig) -> Self {
        Self {
            models,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Client for an LLM type, constructing it from its model section on
    /// first use. Types without a section use the basic model.
    pub async fn get(&self, llm_type: LlmType) -> Result<Arc<dyn LLMClient>> {
        let cached = self.clients.read().get(&llm_type).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let model = self
            .models
            .get(llm_type)
            .or(self.models.basic.as_ref())
            .ok_or_else(|| {
                AppError::Configuration(format!("No model configured for LLM type '{}'", llm_type))
            })?;
        let provider = model.provider()?;
        tracing::info!(
            llm_type = %llm_type,
            provider = provider.name(),
            model = %model.model,
            "Creating model client"
        );
        let client = provider.create_client().await?;

        let mut clients = self.clients.write();
        Ok(Arc::clone(clients.entry(llm_type).or_insert(client)))
    }

    /// Register a ready-made client, replacing any cached one.
    pub fn insert(&self, llm_type: LlmType, client: Arc<dyn LLMClient>) {
        self.clients.write().insert(llm_type, client);
    }

    /// Drop every cached client.
    pub fn reset(&self) {
        self.clients.write().clear();
    }

    pub fn is_cached(&self, llm_type: LlmType) -> bool {
        self.clients.read().contains_key(&llm_type)
    }

    /// Context window of the model behind an LLM type, if one is configured.
    pub fn token_limit(&self, llm_type: LlmType) -> Option<usize> {
        self.models
            .get(llm_type)
            .or(self.models.basic.as_ref())
            .map(|model| model.token_limit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::{ContentStream, LLMResponse};
    use crate::types::{Message, ToolDefinition};
    use async_trait::async_trait;

    struct FixedClient(&'static str);

    #[async_trait]
    impl LLMClient for FixedClient {
        async fn invoke(&self, _messages: &[Message]) -> Result<Message> {
            Ok(Message::ai(self.0))
        }

        async fn invoke_with_tools(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<LLMResponse> {
            Ok(LLMResponse {
                content: self.0.to_string(),
                tool_calls: vec![],
                finish_reason: "stop".to_string(),
            })
        }

        async fn stream(&self, _messages: &[Message]) -> Result<ContentStream> {
            Ok(Box::new(futures::stream::iter(vec![Ok(self.0.to_string())])))
        }

        fn model_name(&self) -> &str {
            self.0
        }
    }

    #[tokio::test]
    async fn test_inserted_client_is_returned() {
        let registry = ModelRegistry::new(ModelsConfig::default());
        registry.insert(LlmType::Reasoning, Arc::new(FixedClient("thinker")));

        let client = registry.get(LlmType::Reasoning).await.unwrap();
        assert_eq!(client.model_name(), "thinker");
        assert!(registry.is_cached(LlmType::Reasoning));

        registry.reset();
        assert!(!registry.is_cached(LlmType::Reasoning));
    }

    #[test]
    fn test_token_limit_uses_basic_fallback() {
        let registry = ModelRegistry::new(ModelsConfig::default());
        assert_eq!(registry.token_limit(LlmType::Code), Some(100_000));
    }

    #[tokio::test]
    async fn test_missing_model_is_configuration_error() {
        let registry = ModelRegistry::new(ModelsConfig {
            basic: None,
            reasoning: None,
            vision: None,
            code: None,
        });
        assert!(matches!(
            registry.get(LlmType::Basic).await,
            Err(AppError::Configuration(_))
        ));
    }
}
