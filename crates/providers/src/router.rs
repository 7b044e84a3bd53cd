//! Provider router: selects the configured LLM backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parley_core::provider::Provider;

use crate::ollama::{OllamaProvider, DEFAULT_OLLAMA_URL};
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` table is registered, and the selected
/// `provider` is always present even without a table of its own.
pub fn build_from_config(config: &parley_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.provider);

    // Transport-level ceiling. The orchestrator applies its own per-call
    // timeout, which is what users normally hit.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default();

    let mut names: Vec<&String> = config.providers.keys().collect();
    if !config.providers.contains_key(&config.provider) {
        names.push(&config.provider);
    }

    for name in names {
        let provider_config = config.providers.get(name);
        let api_url = provider_config.and_then(|p| p.api_url.clone());
        let api_key = provider_config
            .and_then(|p| p.api_key.clone())
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let provider: Arc<dyn Provider> = if name == "ollama" {
            Arc::new(
                OllamaProvider::new(api_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()))
                    .with_client(client.clone()),
            )
        } else {
            let base_url = api_url.unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key).with_client(client.clone()))
        };

        tracing::debug!(provider = %name, "Registered provider");
        router.register(name.clone(), provider);
    }

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
