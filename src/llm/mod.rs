//! LLM provider abstraction layer
//!
//! Provider-agnostic completion interface with OpenAI and Anthropic backends.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;

use crate::config::LlmSection;
use std::sync::Arc;
use std::time::Duration;

/// Build the provider named in the `llm` section
pub fn create_provider(
    section: &LlmSection,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let timeout = Duration::from_secs(section.timeout_secs);

    match section.provider.as_str() {
        "openai" => {
            let mut config = OpenAiConfig {
                api_key,
                timeout,
                ..Default::default()
            };
            if let Some(base_url) = &section.base_url {
                config.base_url = base_url.trim_end_matches('/').to_string();
            }
            Ok(Arc::new(OpenAiProvider::new(config)?))
        }
        "anthropic" => {
            let mut config = AnthropicConfig {
                api_key,
                timeout,
                ..Default::default()
            };
            if let Some(base_url) = &section.base_url {
                config.base_url = base_url.trim_end_matches('/').to_string();
            }
            Ok(Arc::new(AnthropicProvider::new(config)?))
        }
        other => Err(LlmError::NotConfigured(format!(
            "unsupported LLM provider: {other}"
        ))),
    }
}
